//! Result flattening.
//!
//! Turns one `Output` into an ordered sequence of `RoutedResult`s. The walk is
//! an explicit stack of frames, one per open `Many`/`Iter`/`Redirect`/
//! `Delegate` layer, so arbitrarily deep nesting never recurses and lazily
//! produced sequences are only advanced as results are pulled.

use std::fmt;
use std::iter;

use fastmsg_core::{MessageBundle, RoutedResult, WireFormat};
use serde_json::Value;
use tracing::warn;

use crate::config::{DispatcherConfig, MissingOutputPolicy};
use crate::error::DispatchError;
use crate::output::Output;
use crate::validator::MethodValidator;

/// Flattening context of one dispatch: where delegations resolve, which
/// channel produced the value, and how leaves are encoded.
#[derive(Clone)]
pub(crate) struct ResultFlattener {
    validator: MethodValidator,
    source_channel: String,
    missing_output: MissingOutputPolicy,
    wire_format: WireFormat,
}

impl ResultFlattener {
    pub(crate) fn new(
        validator: MethodValidator,
        source_channel: impl Into<String>,
        config: &DispatcherConfig,
    ) -> Self {
        Self {
            validator,
            source_channel: source_channel.into(),
            missing_output: config.missing_output,
            wire_format: config.wire_format,
        }
    }

    /// Flatten `value` eagerly.
    ///
    /// # Errors
    ///
    /// The first error met while walking; results before it are discarded.
    #[cfg(test)]
    pub(crate) fn flatten(
        &self,
        value: Output,
        default_channel: Option<&str>,
    ) -> Result<Vec<RoutedResult>, DispatchError> {
        self.iter(value, default_channel.map(str::to_string)).collect()
    }

    /// Flatten `value` lazily under `default_channel`.
    pub(crate) fn iter(&self, value: Output, default_channel: Option<String>) -> Flatten {
        Flatten {
            flattener: self.clone(),
            stack: vec![Frame {
                items: Box::new(iter::once(value)),
                channel: default_channel,
            }],
        }
    }

    /// Destination of a leaf, applying the missing-output policy.
    fn destination(&self, channel: Option<String>) -> Result<Option<String>, DispatchError> {
        match (channel, self.missing_output) {
            (Some(channel), _) => Ok(Some(channel)),
            (None, MissingOutputPolicy::Drop) => {
                warn!(
                    channel = %self.source_channel,
                    "callback returned a value but is not mapped to an output channel; dropping it"
                );
                Ok(None)
            }
            (None, MissingOutputPolicy::Error) => Err(DispatchError::NoOutputChannel {
                channel: self.source_channel.clone(),
            }),
        }
    }

    fn route(
        &self,
        channel: Option<String>,
        leaf: impl FnOnce(WireFormat) -> Result<MessageBundle, DispatchError>,
    ) -> Result<Option<RoutedResult>, DispatchError> {
        let Some(channel) = self.destination(channel)? else {
            return Ok(None);
        };
        Ok(Some(RoutedResult::new(channel, leaf(self.wire_format)?)))
    }
}

impl fmt::Debug for ResultFlattener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultFlattener")
            .field("source_channel", &self.source_channel)
            .field("missing_output", &self.missing_output)
            .field("wire_format", &self.wire_format)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Flatten
// ---------------------------------------------------------------------------

struct Frame {
    items: Box<dyn Iterator<Item = Output> + Send>,
    channel: Option<String>,
}

/// Lazy flattening walk. Yields results in depth-first order; stops after
/// the first error.
pub(crate) struct Flatten {
    flattener: ResultFlattener,
    stack: Vec<Frame>,
}

impl Flatten {
    fn push(&mut self, items: Box<dyn Iterator<Item = Output> + Send>, channel: Option<String>) {
        self.stack.push(Frame { items, channel });
    }

    /// Handle one item: open a new frame for wrappers, route leaves.
    fn step(
        &mut self,
        item: Output,
        channel: Option<String>,
    ) -> Result<Option<RoutedResult>, DispatchError> {
        match item {
            // Only a callable's own `None` return means "no output"; the
            // dispatcher filters that case before flattening starts.
            Output::None => self.flattener.route(channel, |format| {
                Ok(MessageBundle::from_bytes(format.encode(&Value::Null)?))
            }),
            Output::Many(items) => {
                self.push(Box::new(items.into_iter()), channel);
                Ok(None)
            }
            Output::Iter(items) => {
                self.push(items, channel);
                Ok(None)
            }
            Output::Redirect { channel, value } => {
                self.push(Box::new(iter::once(*value)), Some(channel));
                Ok(None)
            }
            Output::Delegate(delegation) => {
                let (target_channel, validated) = self
                    .flattener
                    .validator
                    .resolve_and_validate(&delegation.target, delegation.fields)?;
                let payload = Output::Value(Value::Object(validated.into_object()));
                self.push(Box::new(iter::once(payload)), Some(target_channel));
                Ok(None)
            }
            Output::Bundle(bundle) => self.flattener.route(channel, |_| Ok(bundle)),
            Output::Message(message) => {
                self.flattener.route(channel, |_| Ok(MessageBundle::new(message)))
            }
            Output::Value(value) => self.flattener.route(channel, |format| {
                Ok(MessageBundle::from_bytes(format.encode(&value)?))
            }),
        }
    }
}

impl Iterator for Flatten {
    type Item = Result<RoutedResult, DispatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let Some(item) = frame.items.next() else {
                self.stack.pop();
                continue;
            };
            let channel = frame.channel.clone();
            match self.step(item, channel) {
                Ok(Some(routed)) => return Some(Ok(routed)),
                Ok(None) => {}
                Err(error) => {
                    self.stack.clear();
                    return Some(Err(error));
                }
            }
        }
    }
}

impl fmt::Debug for Flatten {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flatten")
            .field("flattener", &self.flattener)
            .field("depth", &self.stack.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
