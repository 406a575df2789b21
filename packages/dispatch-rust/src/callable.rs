//! Callable declarations.
//!
//! A `Callable` is an ordinary Rust closure plus an explicit parameter list. The
//! parameter list plays the role a reflected function signature would: it
//! names the payload fields the closure consumes, their types and defaults,
//! and which parameters the framework injects (channel name, message, bundle,
//! validator handle). The list is analysed once, at registration.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use fastmsg_core::{FieldType, Message, MessageBundle};
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::output::Output;
use crate::validator::MethodValidator;

// ---------------------------------------------------------------------------
// Body types
// ---------------------------------------------------------------------------

/// Future returned by an async callable body.
pub type OutputFuture = Pin<Box<dyn Future<Output = anyhow::Result<Output>> + Send>>;

/// Stream returned by a streaming callable body.
pub type OutputStream = Pin<Box<dyn Stream<Item = anyhow::Result<Output>> + Send>>;

type SyncFn = dyn Fn(CallArgs) -> anyhow::Result<Output> + Send + Sync;
type AsyncFn = dyn Fn(CallArgs) -> OutputFuture + Send + Sync;
type StreamingFn = dyn Fn(CallArgs) -> OutputStream + Send + Sync;

#[derive(Clone)]
pub(crate) enum CallableBody {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
    Streaming(Arc<StreamingFn>),
}

// ---------------------------------------------------------------------------
// Parameter declarations
// ---------------------------------------------------------------------------

/// Framework-recognised parameter types whose values are injected, never read
/// from the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextMarker {
    /// Name of the channel the message was read from.
    ChannelName,
    /// The raw `Message` (payload bytes and message headers).
    RawMessage,
    /// The full `MessageBundle`, including channel headers.
    MessageBundle,
    /// A `MethodValidator` handle for checking arguments of other callables.
    Validator,
}

impl fmt::Display for ContextMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ChannelName => "ChannelName",
            Self::RawMessage => "Message",
            Self::MessageBundle => "MessageBundle",
            Self::Validator => "MethodValidator",
        })
    }
}

/// Declared type of a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// A payload field of the given type.
    Field(FieldType),
    /// An injected context value.
    Context(ContextMarker),
    /// An injected context value declared as optional; still injected.
    OptionalContext(ContextMarker),
}

impl Annotation {
    /// The context marker, if this annotation requests injection.
    #[must_use]
    pub fn context_marker(&self) -> Option<ContextMarker> {
        match self {
            Self::Context(marker) | Self::OptionalContext(marker) => Some(*marker),
            Self::Field(_) => None,
        }
    }
}

impl From<FieldType> for Annotation {
    fn from(ty: FieldType) -> Self {
        Self::Field(ty)
    }
}

impl From<ContextMarker> for Annotation {
    fn from(marker: ContextMarker) -> Self {
        Self::Context(marker)
    }
}

/// How a parameter binds to arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Bound by name. The only kind payload fields can map to.
    Keyword,
    /// Bound by position only.
    PositionalOnly,
    /// Captures extra positional arguments.
    VarPositional,
    /// Captures extra named arguments.
    VarKeyword,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Keyword => "keyword",
            Self::PositionalOnly => "positional-only",
            Self::VarPositional => "variadic positional",
            Self::VarKeyword => "variadic keyword",
        })
    }
}

/// A parameter exactly as declared, before analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredParam {
    pub name: String,
    pub kind: ParamKind,
    /// `None` means unannotated, which resolves to `FieldType::Any`.
    pub annotation: Option<Annotation>,
    /// `None` means the parameter has no default.
    pub default: Option<Value>,
}

impl DeclaredParam {
    /// An unannotated keyword parameter without default.
    #[must_use]
    pub fn keyword(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Keyword,
            annotation: None,
            default: None,
        }
    }

    #[must_use]
    pub fn annotated(mut self, annotation: impl Into<Annotation>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ParamKind) -> Self {
        self.kind = kind;
        self
    }
}

// ---------------------------------------------------------------------------
// CallableId
// ---------------------------------------------------------------------------

static NEXT_CALLABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a `Callable`, shared by its clones.
///
/// This is what "delegate to that function" refers to: the dispatcher keeps a
/// reverse mapping from id to channel name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallableId(u64);

impl CallableId {
    fn next() -> Self {
        Self(NEXT_CALLABLE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for CallableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callable#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Callable
// ---------------------------------------------------------------------------

/// A function body together with its declared parameter list.
///
/// ```ignore
/// let f = Callable::sync("f", |args| {
///     let x: i64 = args.get("x")?;
///     let y: String = args.get("y")?;
///     Ok(json!({ "x": x, "y": y }))
/// })
/// .param("x", FieldType::Int)
/// .param_default("y", FieldType::Str, "a");
/// ```
#[derive(Clone)]
pub struct Callable {
    id: CallableId,
    name: Option<String>,
    params: Vec<DeclaredParam>,
    body: CallableBody,
}

impl Callable {
    fn with_body(name: impl Into<String>, body: CallableBody) -> Self {
        Self {
            id: CallableId::next(),
            name: Some(name.into()),
            params: Vec::new(),
            body,
        }
    }

    /// A callable whose body runs directly on the dispatching thread.
    pub fn sync<F, R>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CallArgs) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<Output>,
    {
        let body: Arc<SyncFn> = Arc::new(move |args: CallArgs| -> anyhow::Result<Output> {
            f(args).map(Into::<Output>::into)
        });
        Self::with_body(name, CallableBody::Sync(body))
    }

    /// A callable whose body is a future, driven to completion on the
    /// dispatcher's run-loop.
    pub fn asynchronous<F, Fut, R>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<Output> + 'static,
    {
        let body: Arc<AsyncFn> = Arc::new(move |args: CallArgs| -> OutputFuture {
            let fut = f(args);
            Box::pin(async move { fut.await.map(Into::<Output>::into) })
        });
        Self::with_body(name, CallableBody::Async(body))
    }

    /// A callable whose body produces an asynchronous sequence of results,
    /// pulled one element at a time on the dispatcher's run-loop.
    pub fn streaming<F, S, R>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CallArgs) -> S + Send + Sync + 'static,
        S: Stream<Item = anyhow::Result<R>> + Send + 'static,
        R: Into<Output> + 'static,
    {
        let body: Arc<StreamingFn> = Arc::new(move |args: CallArgs| -> OutputStream {
            Box::pin(f(args).map(|item| item.map(Into::<Output>::into)))
        });
        Self::with_body(name, CallableBody::Streaming(body))
    }

    /// Drops the callable's name. Registering it then requires an explicit
    /// channel.
    #[must_use]
    pub fn without_name(mut self) -> Self {
        self.name = None;
        self
    }

    /// Declares a required payload field.
    #[must_use]
    pub fn param(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.declare(DeclaredParam::keyword(name).annotated(ty))
    }

    /// Declares a payload field with a default value.
    #[must_use]
    pub fn param_default(
        self,
        name: impl Into<String>,
        ty: FieldType,
        default: impl Into<Value>,
    ) -> Self {
        self.declare(DeclaredParam::keyword(name).annotated(ty).with_default(default))
    }

    /// Declares an unannotated (any-typed) required payload field.
    #[must_use]
    pub fn untyped(self, name: impl Into<String>) -> Self {
        self.declare(DeclaredParam::keyword(name))
    }

    /// Declares a parameter injected by the framework.
    #[must_use]
    pub fn context(self, name: impl Into<String>, marker: ContextMarker) -> Self {
        self.declare(DeclaredParam::keyword(name).annotated(marker))
    }

    /// Declares a keyword capture: undeclared payload keys are accepted and
    /// passed through as extra fields.
    #[must_use]
    pub fn kwargs(self, name: impl Into<String>) -> Self {
        self.declare(DeclaredParam::keyword(name).with_kind(ParamKind::VarKeyword))
    }

    /// Declares a parameter verbatim.
    #[must_use]
    pub fn declare(mut self, param: DeclaredParam) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn id(&self) -> CallableId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Parameters in declaration order.
    #[must_use]
    pub fn params(&self) -> &[DeclaredParam] {
        &self.params
    }

    pub(crate) fn body(&self) -> &CallableBody {
        &self.body
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match self.body {
            CallableBody::Sync(_) => "sync",
            CallableBody::Async(_) => "async",
            CallableBody::Streaming(_) => "streaming",
        };
        f.debug_struct("Callable")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("body", &body)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CallArgs
// ---------------------------------------------------------------------------

/// A value injected into a context parameter.
#[derive(Debug, Clone)]
pub enum ContextValue {
    ChannelName(String),
    Message(Message),
    Bundle(MessageBundle),
    Validator(MethodValidator),
}

/// Arguments assembled for one invocation: validated payload fields plus
/// injected context values, addressed by parameter name.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    fields: Map<String, Value>,
    extra: Map<String, Value>,
    context: HashMap<String, ContextValue>,
}

impl CallArgs {
    pub(crate) fn new(
        fields: Map<String, Value>,
        extra: Map<String, Value>,
        context: HashMap<String, ContextValue>,
    ) -> Self {
        Self {
            fields,
            extra,
            context,
        }
    }

    /// Deserialize a single field (declared or extra).
    ///
    /// # Errors
    ///
    /// Fails if the field is absent or does not deserialize into `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self
            .value(name)
            .with_context(|| format!("no argument named '{name}'"))?;
        serde_json::from_value(value.clone())
            .with_context(|| format!("argument '{name}' has an unexpected shape"))
    }

    /// Raw value of a field (declared or extra).
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).or_else(|| self.extra.get(name))
    }

    /// Deserialize all payload fields (declared and extra) into one struct.
    ///
    /// # Errors
    ///
    /// Fails if the fields do not deserialize into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        let mut object = self.fields.clone();
        for (key, value) in &self.extra {
            object.entry(key.clone()).or_insert_with(|| value.clone());
        }
        serde_json::from_value(Value::Object(object))
            .context("payload fields have an unexpected shape")
    }

    /// Declared payload fields, defaults applied.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Undeclared payload keys captured by a keyword capture parameter.
    #[must_use]
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Injected value of a context parameter.
    #[must_use]
    pub fn context(&self, name: &str) -> Option<&ContextValue> {
        self.context.get(name)
    }

    /// Injected channel name.
    ///
    /// # Errors
    ///
    /// Fails if `name` is not a `ChannelName` context parameter.
    pub fn channel_name(&self, name: &str) -> anyhow::Result<&str> {
        match self.context.get(name) {
            Some(ContextValue::ChannelName(channel)) => Ok(channel),
            _ => Err(not_injected(name, ContextMarker::ChannelName)),
        }
    }

    /// Injected raw message.
    ///
    /// # Errors
    ///
    /// Fails if `name` is not a `RawMessage` context parameter.
    pub fn message(&self, name: &str) -> anyhow::Result<&Message> {
        match self.context.get(name) {
            Some(ContextValue::Message(message)) => Ok(message),
            _ => Err(not_injected(name, ContextMarker::RawMessage)),
        }
    }

    /// Injected message bundle.
    ///
    /// # Errors
    ///
    /// Fails if `name` is not a `MessageBundle` context parameter.
    pub fn bundle(&self, name: &str) -> anyhow::Result<&MessageBundle> {
        match self.context.get(name) {
            Some(ContextValue::Bundle(bundle)) => Ok(bundle),
            _ => Err(not_injected(name, ContextMarker::MessageBundle)),
        }
    }

    /// Injected validator handle.
    ///
    /// # Errors
    ///
    /// Fails if `name` is not a `Validator` context parameter.
    pub fn validator(&self, name: &str) -> anyhow::Result<&MethodValidator> {
        match self.context.get(name) {
            Some(ContextValue::Validator(validator)) => Ok(validator),
            _ => Err(not_injected(name, ContextMarker::Validator)),
        }
    }
}

fn not_injected(name: &str, marker: ContextMarker) -> anyhow::Error {
    anyhow::anyhow!("parameter '{name}' is not an injected {marker}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
