//! `fastmsg` core: message bundles, the wire codec, and the payload schema engine.
//!
//! This crate knows nothing about callables or dispatch. It defines what travels
//! through a pipeline (`Message`, `MessageBundle`, `RoutedResult`), how payload
//! bytes map to structured values (`WireFormat`), and how a structured payload is
//! checked against a declared field list (`ValidationSchema`).

pub mod codec;
pub mod messages;
pub mod schema;
pub mod types;

pub use codec::{CodecError, WireFormat};
pub use messages::{Headers, InputChannel, Message, MessageBundle, RoutedResult};
pub use schema::{
    FieldDefault, FieldError, FieldErrorKind, FieldSpec, SchemaError, UnknownFieldPolicy,
    ValidatedFields, ValidationFailure, ValidationSchema,
};
pub use types::FieldType;
