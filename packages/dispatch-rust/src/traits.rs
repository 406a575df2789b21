use fastmsg_core::{InputChannel, MessageBundle};

use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::routed::Routed;

/// What the surrounding pipeline runtime calls for every bundle it reads.
/// Implementations: `Dispatcher`, test doubles.
pub trait PipelineHandler: Send + Sync {
    /// Handle one bundle read from `input`.
    ///
    /// # Errors
    ///
    /// Implementation-defined; `Dispatcher` documents its own.
    fn handle_message(
        &self,
        input: &InputChannel,
        bundle: MessageBundle,
    ) -> Result<Routed, DispatchError>;

    /// Input channels the runtime should consume.
    fn input_channels(&self) -> Vec<String>;
}

impl PipelineHandler for Dispatcher {
    fn handle_message(
        &self,
        input: &InputChannel,
        bundle: MessageBundle,
    ) -> Result<Routed, DispatchError> {
        Dispatcher::handle_message(self, input, bundle)
    }

    fn input_channels(&self) -> Vec<String> {
        Dispatcher::input_channels(self)
    }
}
