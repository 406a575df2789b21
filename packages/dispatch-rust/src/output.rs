//! Callable return values.
//!
//! `Output` is a closed set of shapes a callable body may return. Wrapper
//! variants (`Many`, `Iter`, `Redirect`, `Delegate`) steer routing; leaf
//! variants (`Value`, `Message`, `Bundle`) become outgoing payloads. See
//! `flatten` for how each shape is turned into routed results.

use std::fmt;

use fastmsg_core::{Message, MessageBundle};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::callable::{Callable, CallableId};

// ---------------------------------------------------------------------------
// Target / Delegation
// ---------------------------------------------------------------------------

/// Identifies a registered callable: by channel name or by the callable itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Channel(String),
    Callable(CallableId),
}

impl From<&str> for Target {
    fn from(channel: &str) -> Self {
        Self::Channel(channel.to_string())
    }
}

impl From<String> for Target {
    fn from(channel: String) -> Self {
        Self::Channel(channel)
    }
}

impl From<CallableId> for Target {
    fn from(id: CallableId) -> Self {
        Self::Callable(id)
    }
}

impl From<&Callable> for Target {
    fn from(callable: &Callable) -> Self {
        Self::Callable(callable.id())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(channel) => f.write_str(channel),
            Self::Callable(id) => write!(f, "{id}"),
        }
    }
}

/// A request to route a payload as if it were the direct input of another
/// registered callable. The fields are validated against that callable's
/// schema; the callable itself is never invoked.
#[derive(Debug, Clone, PartialEq)]
pub struct Delegation {
    pub target: Target,
    pub fields: Value,
}

impl Delegation {
    /// Delegation with no fields yet.
    #[must_use]
    pub fn new(target: impl Into<Target>) -> Self {
        Self {
            target: target.into(),
            fields: Value::Object(Map::new()),
        }
    }

    /// Delegation carrying a whole field object (normally built with `json!`).
    #[must_use]
    pub fn with_fields(target: impl Into<Target>, fields: Value) -> Self {
        Self {
            target: target.into(),
            fields,
        }
    }

    /// Adds one field. Replaces a non-object `fields` value.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        if !self.fields.is_object() {
            self.fields = Value::Object(Map::new());
        }
        if let Value::Object(fields) = &mut self.fields {
            fields.insert(name.into(), value.into());
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Everything a callable body can return.
pub enum Output {
    /// No output when it is the callable's whole return value, even if an
    /// output channel is set. Nested inside `Many`, `Iter` or `Redirect`, or
    /// yielded by a stream, it is an ordinary leaf encoded as `null`.
    None,
    /// A structured value, encoded with the dispatcher's wire format.
    Value(Value),
    /// A ready message, routed unmodified.
    Message(Message),
    /// A ready bundle, routed unmodified.
    Bundle(MessageBundle),
    /// Several independent results, routed in order.
    Many(Vec<Output>),
    /// Several independent results produced lazily, routed in order.
    Iter(Box<dyn Iterator<Item = Output> + Send>),
    /// Route `value` to `channel` instead of the default output channel.
    Redirect { channel: String, value: Box<Output> },
    /// Route fields as input of another callable.
    Delegate(Delegation),
}

impl Output {
    /// Serialize any value into a leaf.
    ///
    /// # Errors
    ///
    /// Fails if `value` cannot be represented as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<Self> {
        Ok(Self::Value(serde_json::to_value(value)?))
    }

    /// Several results, each routed independently.
    pub fn many<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Output>,
    {
        Self::Many(items.into_iter().map(Into::into).collect())
    }

    /// Lazily produced results, each routed independently.
    pub fn lazy<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::IntoIter: Send + 'static,
        I::Item: Into<Output> + 'static,
    {
        Self::Iter(Box::new(items.into_iter().map(Into::into)))
    }

    /// Route `value` (and everything nested in it) to `channel`.
    pub fn redirect(channel: impl Into<String>, value: impl Into<Output>) -> Self {
        Self::Redirect {
            channel: channel.into(),
            value: Box::new(value.into()),
        }
    }

    /// Hand `fields` to another callable's channel, validated by its schema.
    pub fn delegate(target: impl Into<Target>, fields: Value) -> Self {
        Self::Delegate(Delegation::with_fields(target, fields))
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Message(message) => f.debug_tuple("Message").field(message).finish(),
            Self::Bundle(bundle) => f.debug_tuple("Bundle").field(bundle).finish(),
            Self::Many(items) => f.debug_tuple("Many").field(items).finish(),
            Self::Iter(_) => f.write_str("Iter(..)"),
            Self::Redirect { channel, value } => f
                .debug_struct("Redirect")
                .field("channel", channel)
                .field("value", value)
                .finish(),
            Self::Delegate(delegation) => f.debug_tuple("Delegate").field(delegation).finish(),
        }
    }
}

impl From<()> for Output {
    fn from((): ()) -> Self {
        Self::None
    }
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Message> for Output {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

impl From<MessageBundle> for Output {
    fn from(bundle: MessageBundle) -> Self {
        Self::Bundle(bundle)
    }
}

impl From<Delegation> for Output {
    fn from(delegation: Delegation) -> Self {
        Self::Delegate(delegation)
    }
}

impl<T: Into<Output>> From<Option<T>> for Output {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::None, Into::into)
    }
}

impl<T: Into<Output>> From<Vec<T>> for Output {
    fn from(items: Vec<T>) -> Self {
        Self::many(items)
    }
}

impl From<String> for Output {
    fn from(value: String) -> Self {
        Self::Value(Value::String(value))
    }
}

impl From<&str> for Output {
    fn from(value: &str) -> Self {
        Self::Value(Value::String(value.to_string()))
    }
}

impl From<i64> for Output {
    fn from(value: i64) -> Self {
        Self::Value(value.into())
    }
}

impl From<f64> for Output {
    fn from(value: f64) -> Self {
        Self::Value(value.into())
    }
}

impl From<bool> for Output {
    fn from(value: bool) -> Self {
        Self::Value(value.into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
