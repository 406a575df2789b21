use fastmsg_core::{UnknownFieldPolicy, WireFormat};

/// What to do with a computed value when its callable has no output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingOutputPolicy {
    /// Log a warning and drop the value; sibling results are still routed.
    #[default]
    Drop,
    /// Fail the dispatch with `DispatchError::NoOutputChannel`.
    Error,
}

/// Dispatcher-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    /// Output channel for registrations that don't name one. `None` means
    /// such callables route nowhere unless they redirect or delegate.
    pub default_output_channel: Option<String>,
    /// Unknown-key policy for callables without a keyword capture.
    pub unknown_fields: UnknownFieldPolicy,
    /// Handling of values that have no destination channel.
    pub missing_output: MissingOutputPolicy,
    /// Payload encoding for both validation and outgoing leaf values.
    pub wire_format: WireFormat,
}

impl DispatcherConfig {
    /// Config with a default output channel and everything else at defaults.
    #[must_use]
    pub fn with_default_output(channel: impl Into<String>) -> Self {
        Self {
            default_output_channel: Some(channel.into()),
            ..Self::default()
        }
    }
}
