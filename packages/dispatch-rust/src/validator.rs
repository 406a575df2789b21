//! Cross-callable validation.
//!
//! A `MethodValidator` lets one callable check arguments meant for another
//! registered callable against that callable's schema, without invoking it.
//! Callables receive one through a `ContextMarker::Validator` parameter; the
//! flattener uses the same logic to resolve `Output::Delegate`.

use std::fmt;
use std::sync::Arc;

use fastmsg_core::{ValidatedFields, ValidationSchema};
use serde::Serialize;
use serde_json::Value;

use crate::error::DispatchError;
use crate::output::{Output, Target};
use crate::registry::Registry;

/// Handle for validating arguments of other registered callables.
#[derive(Clone)]
pub struct MethodValidator {
    registry: Arc<Registry>,
}

impl MethodValidator {
    pub(crate) fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Resolve `target` and validate `fields` against its schema.
    ///
    /// Returns the target's channel name and the validated fields.
    ///
    /// # Errors
    ///
    /// - `MissingCallback` if the target is not registered
    /// - `MethodValidation` if the fields fail the target's schema
    pub fn resolve_and_validate(
        &self,
        target: &Target,
        fields: Value,
    ) -> Result<(String, ValidatedFields), DispatchError> {
        let binding = self.registry.resolve(target)?;
        let validated = binding.schema().validate_value(fields).map_err(|failure| {
            DispatchError::MethodValidation {
                target: target.to_string(),
                failure,
            }
        })?;
        Ok((binding.channel().to_string(), validated))
    }

    /// Validate `fields` for `target` and return an output routed to the
    /// target's channel, ready to be returned from a callable body.
    ///
    /// # Errors
    ///
    /// - `Encode` if `fields` cannot be serialized
    /// - `MissingCallback` if the target is not registered
    /// - `MethodValidation` if the fields fail the target's schema
    pub fn validate_and_return<T>(
        &self,
        target: impl Into<Target>,
        fields: &T,
    ) -> Result<Output, DispatchError>
    where
        T: Serialize + ?Sized,
    {
        let fields = serde_json::to_value(fields).map_err(fastmsg_core::CodecError::from)?;
        let (channel, validated) = self.resolve_and_validate(&target.into(), fields)?;
        Ok(Output::redirect(
            channel,
            Value::Object(validated.into_object()),
        ))
    }

    /// The payload schema of `target`.
    ///
    /// # Errors
    ///
    /// Returns `MissingCallback` if the target is not registered.
    pub fn schema(&self, target: impl Into<Target>) -> Result<Arc<ValidationSchema>, DispatchError> {
        let binding = self.registry.resolve(&target.into())?;
        Ok(Arc::clone(binding.schema()))
    }
}

impl fmt::Debug for MethodValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodValidator")
            .field("channels", &self.registry.channels())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use fastmsg_core::{FieldErrorKind, FieldType, UnknownFieldPolicy};
    use serde_json::json;

    use super::*;
    use crate::binding::CallableBinding;
    use crate::callable::Callable;

    fn setup() -> (MethodValidator, Callable) {
        let registry = Arc::new(Registry::new());
        let h = Callable::sync("h", |_args| Ok(Output::None))
            .param("x", FieldType::Int)
            .param("y", FieldType::Str);
        registry
            .insert(
                CallableBinding::new(h.clone(), "h_channel", None, UnknownFieldPolicy::Reject)
                    .unwrap(),
            )
            .unwrap();
        (MethodValidator::new(registry), h)
    }

    #[test]
    fn validates_by_channel_name() {
        let (validator, _) = setup();
        let (channel, fields) = validator
            .resolve_and_validate(&Target::from("h_channel"), json!({"x": 3, "y": "hello"}))
            .unwrap();
        assert_eq!(channel, "h_channel");
        assert_eq!(fields.get("y"), Some(&json!("hello")));
    }

    #[test]
    fn validate_and_return_by_reference_redirects_to_target_channel() {
        let (validator, h) = setup();
        let output = validator
            .validate_and_return(&h, &json!({"x": 3, "y": "hello"}))
            .unwrap();
        match output {
            Output::Redirect { channel, value } => {
                assert_eq!(channel, "h_channel");
                assert!(matches!(*value, Output::Value(ref v) if *v == json!({"x": 3, "y": "hello"})));
            }
            other => panic!("expected Redirect, got {other:?}"),
        }
    }

    #[test]
    fn missing_field_is_a_method_validation_error() {
        let (validator, _) = setup();
        let err = validator
            .validate_and_return("h_channel", &json!({"x": 3}))
            .unwrap_err();
        match err {
            DispatchError::MethodValidation { target, failure } => {
                assert_eq!(target, "h_channel");
                assert_eq!(failure.errors.len(), 1);
                assert_eq!(failure.errors[0].location, "y");
                assert_eq!(failure.errors[0].kind, FieldErrorKind::Missing);
            }
            other => panic!("expected MethodValidation, got {other:?}"),
        }
    }

    #[test]
    fn unregistered_target_is_missing_callback() {
        let (validator, _) = setup();
        let ghost = Callable::sync("ghost", |_args| Ok(Output::None));
        assert!(matches!(
            validator.validate_and_return(&ghost, &json!({})),
            Err(DispatchError::MissingCallback { .. })
        ));
    }

    #[test]
    fn non_object_fields_fail_target_schema() {
        let (validator, _) = setup();
        assert!(matches!(
            validator.validate_and_return("h_channel", &json!([1, 2])),
            Err(DispatchError::MethodValidation { .. })
        ));
    }

    #[test]
    fn exposes_target_schema() {
        let (validator, h) = setup();
        let schema = validator.schema(&h).unwrap();
        assert_eq!(schema.name(), "model_h_h_channel");
        assert_eq!(schema.required_fields().count(), 2);
    }
}
