//! Payload schema engine.
//!
//! A `ValidationSchema` is a named structural type: an ordered list of fields,
//! each required or carrying a default, plus a policy for keys the schema does
//! not declare. Validation decodes a payload, checks every field, applies
//! defaults, and either returns the validated fields or a `ValidationFailure`
//! listing every violation found (validation never stops at the first error).

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Number, Value};

use crate::codec::WireFormat;
use crate::types::{json_kind, FieldType};

// ---------------------------------------------------------------------------
// Schema definition
// ---------------------------------------------------------------------------

/// Default of a schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    /// The field must be present in every payload.
    Required,
    /// Used verbatim when the field is absent. Defaults are not type-checked.
    Value(Value),
}

/// Single field definition within a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    pub default: FieldDefault,
}

impl FieldSpec {
    #[must_use]
    pub fn required(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: FieldDefault::Required,
        }
    }

    /// A field with a default value.
    ///
    /// A `null` default makes the field nullable: a payload may then send an
    /// explicit `null` for it even if `ty` itself does not admit null.
    #[must_use]
    pub fn with_default(name: impl Into<String>, ty: FieldType, default: Value) -> Self {
        let ty = if default.is_null() && !ty.is_nullable() {
            FieldType::optional(ty)
        } else {
            ty
        };
        Self {
            name: name.into(),
            ty,
            default: FieldDefault::Value(default),
        }
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        matches!(self.default, FieldDefault::Required)
    }
}

/// What to do with payload keys the schema does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFieldPolicy {
    /// Report each unknown key as a validation error.
    #[default]
    Reject,
    /// Silently drop unknown keys.
    Ignore,
    /// Keep unknown keys and pass them through as extra fields.
    Allow,
}

/// A schema could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("schema '{name}' could not be compiled: {message}")]
pub struct SchemaError {
    pub name: String,
    pub message: String,
}

/// A named structural type used to validate payloads.
///
/// Field values are checked by a JSON Schema compiled from the field types;
/// presence, defaults and unknown keys are handled here around it.
#[derive(Clone)]
pub struct ValidationSchema {
    name: String,
    fields: Vec<FieldSpec>,
    unknown_fields: UnknownFieldPolicy,
    validator: Arc<jsonschema::Validator>,
}

impl ValidationSchema {
    /// Compile a schema.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if the JSON Schema derived from `fields` is
    /// rejected by the schema compiler.
    pub fn new(
        name: impl Into<String>,
        fields: Vec<FieldSpec>,
        unknown_fields: UnknownFieldPolicy,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        let properties: Map<String, Value> = fields
            .iter()
            .map(|f| (f.name.clone(), f.ty.json_schema()))
            .collect();
        let document = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "title": name,
            "type": "object",
            "properties": properties,
        });
        let validator = jsonschema::validator_for(&document).map_err(|e| SchemaError {
            name: name.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            name,
            fields,
            unknown_fields,
            validator: Arc::new(validator),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn unknown_fields(&self) -> UnknownFieldPolicy {
        self.unknown_fields
    }

    /// Names of the fields that have no default.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.name.as_str())
    }

    /// Decode payload bytes and validate the result.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailure` if the bytes cannot be decoded, do not
    /// decode to an object, or the object violates the schema.
    pub fn validate_bytes(
        &self,
        bytes: &[u8],
        format: WireFormat,
    ) -> Result<ValidatedFields, ValidationFailure> {
        let value = format.decode(bytes).map_err(|e| {
            self.failure(vec![FieldError::root(FieldErrorKind::Malformed(
                e.to_string(),
            ))])
        })?;
        self.validate_value(value)
    }

    /// Validate an already decoded payload.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailure` if the value is not an object or violates
    /// the schema.
    pub fn validate_value(&self, value: Value) -> Result<ValidatedFields, ValidationFailure> {
        match value {
            Value::Object(object) => self.validate_object(object),
            other => Err(self.failure(vec![FieldError::root(FieldErrorKind::NotAnObject {
                found: json_kind(&other),
            })])),
        }
    }

    /// Validate a field mapping: check declared fields, apply defaults, and
    /// apply the unknown-field policy.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailure` carrying every violation found.
    pub fn validate_object(
        &self,
        mut object: Map<String, Value>,
    ) -> Result<ValidatedFields, ValidationFailure> {
        let mut errors = Vec::new();
        let mut declared = Map::new();
        let mut present = Map::new();

        for spec in &self.fields {
            match object.remove(&spec.name) {
                Some(value) => {
                    present.insert(spec.name.clone(), value);
                }
                None => match &spec.default {
                    FieldDefault::Value(default) => {
                        declared.insert(spec.name.clone(), default.clone());
                    }
                    FieldDefault::Required => {
                        errors.push(FieldError::new(spec.name.clone(), FieldErrorKind::Missing));
                    }
                },
            }
        }

        let present = Value::Object(present);
        let before = errors.len();
        errors.extend(
            self.validator
                .iter_errors(&present)
                .map(|error| self.type_error(&error)),
        );
        if errors.len() == before {
            if let Value::Object(present) = present {
                for (name, mut value) in present {
                    if let Some(spec) = self.field(&name) {
                        normalize(&spec.ty, &mut value, &name, &mut errors);
                    }
                    declared.insert(name, value);
                }
            }
        }

        let extra = match self.unknown_fields {
            UnknownFieldPolicy::Reject => {
                errors.extend(
                    object
                        .keys()
                        .map(|key| FieldError::new(key.clone(), FieldErrorKind::Unknown)),
                );
                Map::new()
            }
            UnknownFieldPolicy::Ignore => Map::new(),
            UnknownFieldPolicy::Allow => object,
        };

        if errors.is_empty() {
            Ok(ValidatedFields { declared, extra })
        } else {
            tracing::trace!(schema = %self.name, errors = errors.len(), "payload failed validation");
            Err(self.failure(errors))
        }
    }

    /// Translate a JSON Schema violation into a field error at a dotted path.
    fn type_error(&self, error: &jsonschema::ValidationError<'_>) -> FieldError {
        let pointer = error.instance_path.to_string();
        let segments: Vec<String> = pointer
            .split('/')
            .skip(1)
            .map(|s| s.replace("~1", "/").replace("~0", "~"))
            .collect();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        let expected = segments
            .split_first()
            .and_then(|(field, rest)| self.field(field)?.ty.at_path(rest))
            .map_or_else(|| "a valid value".to_string(), ToString::to_string);
        FieldError::new(
            segments.join("."),
            FieldErrorKind::WrongType {
                expected,
                found: json_kind(&error.instance),
            },
        )
    }

    fn failure(&self, errors: Vec<FieldError>) -> ValidationFailure {
        ValidationFailure {
            schema: self.name.clone(),
            errors,
        }
    }
}

// ---------------------------------------------------------------------------
// Validated output
// ---------------------------------------------------------------------------

/// Fields that passed validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidatedFields {
    /// Declared fields, with defaults applied and numbers normalised.
    pub declared: Map<String, Value>,
    /// Undeclared keys kept under `UnknownFieldPolicy::Allow`.
    pub extra: Map<String, Value>,
}

impl ValidatedFields {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.declared.get(name).or_else(|| self.extra.get(name))
    }

    /// Merge declared and extra fields into a single object.
    #[must_use]
    pub fn into_object(self) -> Map<String, Value> {
        let Self { mut declared, extra } = self;
        for (key, value) in extra {
            declared.entry(key).or_insert(value);
        }
        declared
    }
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

/// Why a single location failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldErrorKind {
    #[error("field required")]
    Missing,
    #[error("expected {expected}, found {found}")]
    WrongType {
        expected: String,
        found: &'static str,
    },
    #[error("unknown field")]
    Unknown,
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("integer out of range")]
    OutOfRange,
    #[error("payload must be an object, found {found}")]
    NotAnObject { found: &'static str },
}

/// A violation at a dotted location (`tags.2`, `meta.owner`); the empty
/// location denotes the payload root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub location: String,
    pub kind: FieldErrorKind,
}

impl FieldError {
    #[must_use]
    pub fn new(location: impl Into<String>, kind: FieldErrorKind) -> Self {
        Self {
            location: location.into(),
            kind,
        }
    }

    #[must_use]
    pub fn root(kind: FieldErrorKind) -> Self {
        Self::new(String::new(), kind)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.is_empty() {
            write!(f, "<payload>: {}", self.kind)
        } else {
            write!(f, "{}: {}", self.location, self.kind)
        }
    }
}

/// A payload failed its schema. Carries field-level detail for every violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Name of the schema that rejected the payload.
    pub schema: String,
    pub errors: Vec<FieldError>,
}

impl ValidationFailure {
    /// Whether any error is located at `location`.
    #[must_use]
    pub fn has_error_at(&self, location: &str) -> bool {
        self.errors.iter().any(|e| e.location == location)
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.errors.len() == 1 { "" } else { "s" };
        write!(
            f,
            "{} validation error{plural} for {}",
            self.errors.len(),
            self.schema
        )?;
        for error in &self.errors {
            write!(f, "; {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

// ---------------------------------------------------------------------------
// Debug / equality
// ---------------------------------------------------------------------------

impl fmt::Debug for ValidationSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationSchema")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("unknown_fields", &self.unknown_fields)
            .finish_non_exhaustive()
    }
}

/// The compiled validator is derived from the fields, so it is not compared.
impl PartialEq for ValidationSchema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.fields == other.fields
            && self.unknown_fields == other.unknown_fields
    }
}

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

/// 2^63 and 2^64: the exclusive upper bounds of `i64` and `u64` as floats.
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;
const U64_LIMIT: f64 = 18_446_744_073_709_551_616.0;

fn child(location: &str, key: &str) -> String {
    if location.is_empty() {
        key.to_string()
    } else {
        format!("{location}.{key}")
    }
}

/// Rewrite integral floats under `Int` as integers, walking containers.
/// Runs on values that already passed the structural check.
fn normalize(ty: &FieldType, value: &mut Value, location: &str, errors: &mut Vec<FieldError>) {
    match (ty, value) {
        (FieldType::Optional(inner), value) => normalize(inner, value, location, errors),
        (FieldType::Int, Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                return;
            }
            match n.as_f64().and_then(integral) {
                Some(int) => *n = int,
                None => errors.push(FieldError::new(location, FieldErrorKind::OutOfRange)),
            }
        }
        (FieldType::List(item), Value::Array(items)) => {
            for (i, v) in items.iter_mut().enumerate() {
                normalize(item, v, &child(location, &i.to_string()), errors);
            }
        }
        (FieldType::Map(inner), Value::Object(entries)) => {
            for (k, v) in entries.iter_mut() {
                normalize(inner, v, &child(location, k), errors);
            }
        }
        _ => {}
    }
}

/// Integer value of an integral float, if it fits `i64` or `u64`.
#[allow(
    clippy::float_cmp,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn integral(f: f64) -> Option<Number> {
    if !f.is_finite() || f.fract() != 0.0 {
        return None;
    }
    if (-I64_LIMIT..I64_LIMIT).contains(&f) {
        Some(Number::from(f as i64))
    } else if (0.0..U64_LIMIT).contains(&f) {
        Some(Number::from(f as u64))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
