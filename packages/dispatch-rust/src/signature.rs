//! Signature analysis and schema construction.
//!
//! Runs once per registration: the declared parameter list of a `Callable`
//! is classified into payload (domain) parameters and framework-injected
//! (context) parameters, and the domain parameters become the binding's
//! `ValidationSchema`. Nothing here runs on the dispatch path.

use std::collections::HashSet;
use std::fmt;

use fastmsg_core::{FieldDefault, FieldSpec, FieldType, UnknownFieldPolicy, ValidationSchema};

use crate::callable::{Annotation, Callable, CallableBody, ContextMarker, ParamKind};
use crate::error::RegistrationError;

/// How a callable is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    /// Called directly on the dispatching thread.
    Sync,
    /// A future driven to completion on the run-loop.
    Async,
    /// An asynchronous sequence pulled element by element on the run-loop.
    Streaming,
}

impl fmt::Display for ExecutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sync => "sync",
            Self::Async => "async",
            Self::Streaming => "streaming",
        })
    }
}

/// Where a parameter's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRole {
    /// Read from the validated payload.
    Domain,
    /// Injected by the framework.
    Context(ContextMarker),
}

/// A classified parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub name: String,
    /// Resolved annotation; unannotated parameters resolve to `FieldType::Any`.
    pub annotation: Annotation,
    pub default: FieldDefault,
    pub role: ParamRole,
}

/// The analysed, immutable form of a callable's parameter list.
#[derive(Debug, Clone, PartialEq)]
pub struct CallableSignature {
    params: Vec<ParameterDescriptor>,
    accepts_extra_fields: bool,
    execution_kind: ExecutionKind,
}

impl CallableSignature {
    /// Classify the parameters of `callable`.
    ///
    /// # Errors
    ///
    /// - `NotAllowedParameterKind` for positional-only or variadic positional
    ///   parameters
    /// - `SpecialDefaultValue` for a context parameter declaring a default
    /// - `DuplicateParameter` if a name is declared twice
    pub fn analyze(callable: &Callable) -> Result<Self, RegistrationError> {
        let mut params = Vec::with_capacity(callable.params().len());
        let mut seen = HashSet::new();
        let mut accepts_extra_fields = false;

        for declared in callable.params() {
            if !seen.insert(declared.name.as_str()) {
                return Err(RegistrationError::DuplicateParameter {
                    param: declared.name.clone(),
                });
            }

            match declared.kind {
                ParamKind::PositionalOnly | ParamKind::VarPositional => {
                    return Err(RegistrationError::NotAllowedParameterKind {
                        param: declared.name.clone(),
                        kind: declared.kind,
                    });
                }
                ParamKind::VarKeyword => {
                    accepts_extra_fields = true;
                    continue;
                }
                ParamKind::Keyword => {}
            }

            let annotation = declared
                .annotation
                .clone()
                .unwrap_or(Annotation::Field(FieldType::Any));

            let role = match annotation.context_marker() {
                Some(marker) => {
                    if declared.default.is_some() {
                        return Err(RegistrationError::SpecialDefaultValue {
                            param: declared.name.clone(),
                            marker,
                        });
                    }
                    ParamRole::Context(marker)
                }
                None => ParamRole::Domain,
            };

            let default = declared
                .default
                .clone()
                .map_or(FieldDefault::Required, FieldDefault::Value);

            params.push(ParameterDescriptor {
                name: declared.name.clone(),
                annotation,
                default,
                role,
            });
        }

        let execution_kind = match callable.body() {
            CallableBody::Sync(_) => ExecutionKind::Sync,
            CallableBody::Async(_) => ExecutionKind::Async,
            CallableBody::Streaming(_) => ExecutionKind::Streaming,
        };

        Ok(Self {
            params,
            accepts_extra_fields,
            execution_kind,
        })
    }

    /// All classified parameters, in declaration order.
    #[must_use]
    pub fn params(&self) -> &[ParameterDescriptor] {
        &self.params
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn domain_params(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.params.iter().filter(|p| p.role == ParamRole::Domain)
    }

    /// Context parameters paired with the marker they request.
    pub fn context_params(&self) -> impl Iterator<Item = (&str, ContextMarker)> {
        self.params.iter().filter_map(|p| match p.role {
            ParamRole::Context(marker) => Some((p.name.as_str(), marker)),
            ParamRole::Domain => None,
        })
    }

    /// Whether the callable declared a keyword capture.
    #[must_use]
    pub fn accepts_extra_fields(&self) -> bool {
        self.accepts_extra_fields
    }

    #[must_use]
    pub fn execution_kind(&self) -> ExecutionKind {
        self.execution_kind
    }

    /// Build the payload schema from the domain parameters.
    ///
    /// The schema is named `model_<callable>_<channel>` so that the same
    /// callable registered on several channels gets distinct schemas.
    /// Undeclared keys are passed through when the callable has a keyword
    /// capture; otherwise `unknown_fields` applies.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` if the derived schema does not compile.
    pub fn build_schema(
        &self,
        callable_name: Option<&str>,
        channel: &str,
        unknown_fields: UnknownFieldPolicy,
    ) -> Result<ValidationSchema, RegistrationError> {
        let fields = self
            .domain_params()
            .map(|p| {
                let ty = match &p.annotation {
                    Annotation::Field(ty) => ty.clone(),
                    Annotation::Context(_) | Annotation::OptionalContext(_) => FieldType::Any,
                };
                match &p.default {
                    FieldDefault::Required => FieldSpec::required(p.name.clone(), ty),
                    FieldDefault::Value(default) => {
                        FieldSpec::with_default(p.name.clone(), ty, default.clone())
                    }
                }
            })
            .collect();

        let policy = if self.accepts_extra_fields {
            UnknownFieldPolicy::Allow
        } else {
            unknown_fields
        };

        let name = format!("model_{}_{channel}", callable_name.unwrap_or("anonymous"));
        Ok(ValidationSchema::new(name, fields, policy)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
