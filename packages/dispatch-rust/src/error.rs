//! Error taxonomy.
//!
//! `RegistrationError` is raised while building bindings and is never offered
//! to the validation-error hook. `DispatchError` is raised while handling a
//! message; only `DispatchError::Validation` coming from a binding's own
//! payload check is recoverable through the hook.

use fastmsg_core::{CodecError, SchemaError, ValidationFailure};

use crate::callable::{ContextMarker, ParamKind};
use crate::runloop::RunLoopError;

/// Errors raised by `Dispatcher::register`.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("param '{param}' is of {kind} kind; only keyword params and a keyword capture are allowed")]
    NotAllowedParameterKind { param: String, kind: ParamKind },
    #[error("param '{param}' is of special type '{marker}' but has a default value")]
    SpecialDefaultValue {
        param: String,
        marker: ContextMarker,
    },
    #[error("can't register more than one callback on channel '{channel}'")]
    DuplicateCallback { channel: String },
    #[error("callable has no name and no channel was given")]
    UnnamedCallable,
    #[error("param '{param}' is declared more than once")]
    DuplicateParameter { param: String },
    #[error(transparent)]
    InvalidSchema(#[from] SchemaError),
}

/// Errors raised while dispatching a message.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No callable is registered for the channel or delegation target.
    #[error("no callback registered for '{target}'")]
    MissingCallback { target: String },
    /// The incoming payload failed the binding's schema.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    /// Fields handed to another callable failed that callable's schema.
    #[error("arguments for '{target}' are invalid: {failure}")]
    MethodValidation {
        target: String,
        #[source]
        failure: ValidationFailure,
    },
    /// A value was produced but there is nowhere to route it
    /// (only under `MissingOutputPolicy::Error`).
    #[error("callback for channel '{channel}' returned a value but is not mapped to an output channel")]
    NoOutputChannel { channel: String },
    /// The callable body failed.
    #[error("callback failed: {0}")]
    Handler(#[source] anyhow::Error),
    #[error("failed to encode result: {0}")]
    Encode(#[from] CodecError),
    #[error(transparent)]
    RunLoop(#[from] RunLoopError),
}

impl DispatchError {
    /// Classify an error returned by a callable body.
    ///
    /// A `DispatchError` propagated out of the body with `?` (for example a
    /// `MethodValidation` from `MethodValidator::validate_and_return`) keeps
    /// its identity; anything else becomes `Handler`.
    pub(crate) fn from_handler(error: anyhow::Error) -> Self {
        match error.downcast::<DispatchError>() {
            Ok(dispatch) => dispatch,
            Err(other) => Self::Handler(other),
        }
    }

    /// The payload validation failure, if this is a plain `Validation` error.
    #[must_use]
    pub fn validation_failure(&self) -> Option<&ValidationFailure> {
        match self {
            Self::Validation(failure) => Some(failure),
            _ => None,
        }
    }
}
