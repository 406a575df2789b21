//! `fastmsg`: binds callables to pipeline channels.
//!
//! A [`Dispatcher`] owns the channel registry. Each registered [`Callable`]
//! gets a [`CallableBinding`] with a payload schema derived from its declared
//! parameters. Incoming bundles are validated against that schema, the
//! callable runs (sync, async or streaming), and its [`Output`] is flattened
//! into zero or more [`fastmsg_core::RoutedResult`]s.

pub mod binding;
pub mod callable;
pub mod config;
pub mod dispatcher;
pub mod error;
pub(crate) mod flatten;
pub(crate) mod registry;
pub mod output;
pub mod routed;
pub mod runloop;
pub mod signature;
pub mod telemetry;
pub mod traits;
pub mod validator;

pub use binding::CallableBinding;
pub use callable::{
    Annotation, CallArgs, Callable, CallableId, ContextMarker, ContextValue, DeclaredParam,
    OutputFuture, OutputStream, ParamKind,
};
pub use config::{DispatcherConfig, MissingOutputPolicy};
pub use dispatcher::{Dispatcher, OutputRoute, RegisterOptions, ValidationErrorHandler};
pub use error::{DispatchError, RegistrationError};
pub use output::{Delegation, Output, Target};
pub use routed::Routed;
pub use runloop::{RunLoop, RunLoopError};
pub use signature::{CallableSignature, ExecutionKind, ParamRole, ParameterDescriptor};
pub use telemetry::{init_tracing, LogFormat};
pub use traits::PipelineHandler;
pub use validator::MethodValidator;
