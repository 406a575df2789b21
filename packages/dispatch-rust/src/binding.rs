//! Per-callable registration unit.
//!
//! A `CallableBinding` ties a callable to its input channel, its default
//! output channel, its analysed signature and its payload schema. Bindings are
//! built once at registration and never mutated afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use fastmsg_core::{
    InputChannel, MessageBundle, UnknownFieldPolicy, ValidatedFields, ValidationFailure,
    ValidationSchema, WireFormat,
};

use crate::callable::{CallArgs, Callable, CallableBody, ContextMarker, ContextValue, OutputStream};
use crate::error::{DispatchError, RegistrationError};
use crate::output::Output;
use crate::runloop::RunLoop;
use crate::signature::{CallableSignature, ExecutionKind};
use crate::validator::MethodValidator;

/// What an invocation produced.
pub(crate) enum Invocation {
    /// A sync or async callable returned.
    Complete(Output),
    /// A streaming callable started; elements are pulled on demand.
    Stream(OutputStream),
}

/// A callable bound to a channel.
pub struct CallableBinding {
    channel: String,
    callable: Callable,
    output_channel: Option<String>,
    signature: CallableSignature,
    schema: Arc<ValidationSchema>,
}

impl CallableBinding {
    /// Analyse `callable` and build its schema.
    ///
    /// # Errors
    ///
    /// Returns the `RegistrationError` raised by signature analysis.
    pub fn new(
        callable: Callable,
        channel: impl Into<String>,
        output_channel: Option<String>,
        unknown_fields: UnknownFieldPolicy,
    ) -> Result<Self, RegistrationError> {
        let channel = channel.into();
        let signature = CallableSignature::analyze(&callable)?;
        let schema = signature.build_schema(callable.name(), &channel, unknown_fields)?;
        Ok(Self {
            channel,
            callable,
            output_channel,
            signature,
            schema: Arc::new(schema),
        })
    }

    /// Input channel this binding consumes.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    #[must_use]
    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    /// Default destination of the callable's results.
    #[must_use]
    pub fn output_channel(&self) -> Option<&str> {
        self.output_channel.as_deref()
    }

    #[must_use]
    pub fn signature(&self) -> &CallableSignature {
        &self.signature
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<ValidationSchema> {
        &self.schema
    }

    #[must_use]
    pub fn execution_kind(&self) -> ExecutionKind {
        self.signature.execution_kind()
    }

    /// Validate the bundle's payload against this binding's schema.
    pub(crate) fn validate(
        &self,
        bundle: &MessageBundle,
        format: WireFormat,
    ) -> Result<ValidatedFields, ValidationFailure> {
        self.schema.validate_bytes(bundle.message.bytes(), format)
    }

    /// Merge validated fields with injected context values.
    pub(crate) fn call_args(
        &self,
        validated: ValidatedFields,
        input: &InputChannel,
        bundle: &MessageBundle,
        validator: &MethodValidator,
    ) -> CallArgs {
        let context: HashMap<String, ContextValue> = self
            .signature
            .context_params()
            .map(|(name, marker)| {
                let value = match marker {
                    ContextMarker::ChannelName => ContextValue::ChannelName(input.name().to_string()),
                    ContextMarker::RawMessage => ContextValue::Message(bundle.message.clone()),
                    ContextMarker::MessageBundle => ContextValue::Bundle(bundle.clone()),
                    ContextMarker::Validator => ContextValue::Validator(validator.clone()),
                };
                (name.to_string(), value)
            })
            .collect();

        CallArgs::new(validated.declared, validated.extra, context)
    }

    /// Run the callable under its execution kind.
    ///
    /// Sync bodies run on the calling thread; async bodies block the calling
    /// thread on the run-loop; streaming bodies are only started here.
    pub(crate) fn invoke(
        &self,
        args: CallArgs,
        runloop: &RunLoop,
    ) -> Result<Invocation, DispatchError> {
        match self.callable.body() {
            CallableBody::Sync(body) => body(args)
                .map(Invocation::Complete)
                .map_err(DispatchError::from_handler),
            CallableBody::Async(body) => runloop
                .block_on(body(args))?
                .map(Invocation::Complete)
                .map_err(DispatchError::from_handler),
            CallableBody::Streaming(body) => Ok(Invocation::Stream(runloop.enter(|| body(args))?)),
        }
    }
}

impl fmt::Debug for CallableBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableBinding")
            .field("channel", &self.channel)
            .field("callable", &self.callable)
            .field("output_channel", &self.output_channel)
            .field("schema", &self.schema.name())
            .field("execution_kind", &self.execution_kind())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
