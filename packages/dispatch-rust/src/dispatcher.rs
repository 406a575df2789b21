//! The dispatcher: channel registry and single entry point for messages.

use std::sync::Arc;

use fastmsg_core::{InputChannel, MessageBundle, RoutedResult, ValidationFailure};
use parking_lot::RwLock;
use tracing::{debug, info_span};

use crate::binding::{CallableBinding, Invocation};
use crate::callable::Callable;
use crate::config::DispatcherConfig;
use crate::error::{DispatchError, RegistrationError};
use crate::flatten::ResultFlattener;
use crate::output::Output;
use crate::registry::Registry;
use crate::routed::Routed;
use crate::runloop::RunLoop;
use crate::validator::MethodValidator;

/// Recovery hook for payloads that fail their binding's schema. Its results
/// replace the dispatch result.
pub type ValidationErrorHandler =
    dyn Fn(&InputChannel, &MessageBundle, &ValidationFailure) -> Vec<RoutedResult> + Send + Sync;

// ---------------------------------------------------------------------------
// RegisterOptions
// ---------------------------------------------------------------------------

/// Output routing of a registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputRoute {
    /// Use `DispatcherConfig::default_output_channel`.
    #[default]
    Default,
    /// No output channel; plain values are dropped (or rejected, per config).
    None,
    Channel(String),
}

/// Optional parameters of `Dispatcher::register`.
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Input channel; defaults to the callable's name.
    pub channel: Option<String>,
    pub output: OutputRoute,
}

impl RegisterOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    #[must_use]
    pub fn output(mut self, channel: impl Into<String>) -> Self {
        self.output = OutputRoute::Channel(channel.into());
        self
    }

    #[must_use]
    pub fn no_output(mut self) -> Self {
        self.output = OutputRoute::None;
        self
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Maps input channels to callables and turns incoming bundles into routed
/// results.
///
/// Registration is expected to finish before concurrent dispatch starts.
/// Async and streaming callables share one run-loop; callers must not drive
/// it from more than one thread at a time.
pub struct Dispatcher {
    registry: Arc<Registry>,
    runloop: Arc<RunLoop>,
    config: DispatcherConfig,
    validation_hook: RwLock<Option<Arc<ValidationErrorHandler>>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            runloop: Arc::new(RunLoop::new()),
            config,
            validation_hook: RwLock::new(None),
        }
    }

    /// Builder-style variant of `register_validation_error_handler`.
    #[must_use]
    pub fn with_validation_error_handler<F>(self, hook: F) -> Self
    where
        F: Fn(&InputChannel, &MessageBundle, &ValidationFailure) -> Vec<RoutedResult>
            + Send
            + Sync
            + 'static,
    {
        self.register_validation_error_handler(hook);
        self
    }

    /// Install (or replace) the validation-error recovery hook.
    pub fn register_validation_error_handler<F>(&self, hook: F)
    where
        F: Fn(&InputChannel, &MessageBundle, &ValidationFailure) -> Vec<RoutedResult>
            + Send
            + Sync
            + 'static,
    {
        *self.validation_hook.write() = Some(Arc::new(hook));
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Bind `callable` to an input channel.
    ///
    /// # Errors
    ///
    /// - `UnnamedCallable` if no channel is given and the callable has no name
    /// - `DuplicateCallback` if the channel is already bound
    /// - signature errors (`NotAllowedParameterKind`, `SpecialDefaultValue`,
    ///   `DuplicateParameter`)
    pub fn register(
        &self,
        callable: Callable,
        options: RegisterOptions,
    ) -> Result<Arc<CallableBinding>, RegistrationError> {
        let channel = options
            .channel
            .or_else(|| callable.name().map(str::to_string))
            .ok_or(RegistrationError::UnnamedCallable)?;
        if self.registry.contains(&channel) {
            return Err(RegistrationError::DuplicateCallback { channel });
        }
        let output_channel = match options.output {
            OutputRoute::Default => self.config.default_output_channel.clone(),
            OutputRoute::None => None,
            OutputRoute::Channel(channel) => Some(channel),
        };

        let binding =
            CallableBinding::new(callable, channel, output_channel, self.config.unknown_fields)?;
        let binding = self.registry.insert(binding)?;
        debug!(
            channel = binding.channel(),
            output = ?binding.output_channel(),
            kind = %binding.execution_kind(),
            "registered callback"
        );
        Ok(binding)
    }

    /// Register `callable` under its own name and hand it back.
    ///
    /// # Errors
    ///
    /// Same as `register`.
    pub fn map(&self, callable: Callable) -> Result<Callable, RegistrationError> {
        self.map_with(callable, RegisterOptions::default())
    }

    /// Register `callable` with `options` and hand it back.
    ///
    /// # Errors
    ///
    /// Same as `register`.
    pub fn map_with(
        &self,
        callable: Callable,
        options: RegisterOptions,
    ) -> Result<Callable, RegistrationError> {
        self.register(callable.clone(), options)?;
        Ok(callable)
    }

    /// Registered input channels, in registration order.
    #[must_use]
    pub fn input_channels(&self) -> Vec<String> {
        self.registry.channels()
    }

    #[must_use]
    pub fn binding(&self, channel: &str) -> Option<Arc<CallableBinding>> {
        self.registry.get(channel)
    }

    /// A validator over this dispatcher's registrations.
    #[must_use]
    pub fn validator(&self) -> MethodValidator {
        MethodValidator::new(Arc::clone(&self.registry))
    }

    /// Handle one bundle read from `input`.
    ///
    /// Validation and invocation happen here; flattening (and, for streaming
    /// callables, pulling further elements) happens as the returned `Routed`
    /// is iterated.
    ///
    /// # Errors
    ///
    /// - `MissingCallback` if nothing is bound to the channel
    /// - `Validation` if the payload fails the schema and no hook is installed
    /// - `Handler`, or a `DispatchError` propagated by the callable body
    /// - `RunLoop` for async and streaming callables after `shutdown()`
    pub fn handle_message(
        &self,
        input: &InputChannel,
        bundle: MessageBundle,
    ) -> Result<Routed, DispatchError> {
        let binding = self
            .registry
            .get(input.name())
            .ok_or_else(|| DispatchError::MissingCallback {
                target: input.name().to_string(),
            })?;
        let span = info_span!(
            "dispatch",
            channel = input.name(),
            kind = %binding.execution_kind()
        );
        let _guard = span.enter();

        let validated = match binding.validate(&bundle, self.config.wire_format) {
            Ok(validated) => validated,
            Err(failure) => {
                let hook = self.validation_hook.read().clone();
                return match hook {
                    Some(hook) => {
                        debug!(
                            errors = failure.errors.len(),
                            "payload rejected; running validation error handler"
                        );
                        Ok(Routed::from_results(hook(input, &bundle, &failure)))
                    }
                    None => Err(failure.into()),
                };
            }
        };

        let validator = self.validator();
        let args = binding.call_args(validated, input, &bundle, &validator);
        let flattener = ResultFlattener::new(validator, binding.channel(), &self.config);
        let default_channel = binding.output_channel().map(str::to_string);

        match binding.invoke(args, &self.runloop)? {
            Invocation::Complete(Output::None) => {
                debug!("callback returned no output");
                Ok(Routed::empty())
            }
            Invocation::Complete(output) => {
                debug!("callback returned");
                Ok(Routed::from_output(flattener.iter(output, default_channel)))
            }
            Invocation::Stream(stream) => {
                debug!("callback started streaming");
                Ok(Routed::from_stream(
                    stream,
                    Arc::clone(&self.runloop),
                    default_channel,
                    flattener,
                ))
            }
        }
    }

    /// Shorthand for `handle_message` with a bare channel name.
    ///
    /// # Errors
    ///
    /// Same as `handle_message`.
    pub fn dispatch(&self, channel: &str, bundle: MessageBundle) -> Result<Routed, DispatchError> {
        self.handle_message(&InputChannel::new(channel), bundle)
    }

    /// Release the run-loop. Async and streaming dispatch fails afterwards;
    /// sync dispatch keeps working.
    pub fn shutdown(&self) {
        self.runloop.shutdown();
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("channels", &self.registry.channels())
            .field("runloop", &self.runloop)
            .field("config", &self.config)
            .field("validation_hook", &self.validation_hook.read().is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use fastmsg_core::{FieldErrorKind, FieldType, Message};
    use futures_util::stream;
    use serde_json::{json, Value};

    use super::*;
    use crate::callable::ContextMarker;
    use crate::config::MissingOutputPolicy;
    use crate::output::Delegation;

    fn payload(value: &Value) -> MessageBundle {
        MessageBundle::from_bytes(serde_json::to_vec(value).unwrap())
    }

    fn decoded(result: &RoutedResult) -> Value {
        serde_json::from_slice(result.payload()).unwrap()
    }

    fn noop(name: &str) -> Callable {
        Callable::sync(name, |_args| Ok(Output::None))
    }

    fn f() -> Callable {
        Callable::sync("f", |args| {
            Ok(json!({"x": args.get::<i64>("x")?, "y": args.get::<String>("y")?}))
        })
        .param("x", FieldType::Int)
        .param_default("y", FieldType::Str, "a")
    }

    #[test]
    fn defaults_fill_omitted_fields() {
        let dispatcher = Dispatcher::default();
        dispatcher
            .register(f(), RegisterOptions::new().output("out"))
            .unwrap();

        let results = dispatcher
            .dispatch("f", payload(&json!({"x": 1})))
            .unwrap()
            .collect_results()
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].output_channel, "out");
        assert_eq!(decoded(&results[0]), json!({"x": 1, "y": "a"}));
    }

    #[test]
    fn registry_default_output_channel_applies() {
        let dispatcher = Dispatcher::new(DispatcherConfig::with_default_output("default_out"));
        dispatcher.register(f(), RegisterOptions::new()).unwrap();
        dispatcher
            .register(noop("g"), RegisterOptions::new().no_output())
            .unwrap();

        assert_eq!(
            dispatcher.binding("f").unwrap().output_channel(),
            Some("default_out")
        );
        assert_eq!(dispatcher.binding("g").unwrap().output_channel(), None);
    }

    #[test]
    fn delegation_with_missing_field_is_method_validation_error() {
        let dispatcher = Dispatcher::default();
        dispatcher
            .register(
                Callable::sync("g", |_args| Ok(Delegation::new("h").field("x", 3))),
                RegisterOptions::new().output("out"),
            )
            .unwrap();
        dispatcher
            .register(
                noop("h").param("x", FieldType::Int).param("y", FieldType::Str),
                RegisterOptions::new(),
            )
            .unwrap();

        let err = dispatcher
            .dispatch("g", payload(&json!({})))
            .and_then(Routed::collect_results)
            .unwrap_err();
        let DispatchError::MethodValidation { target, failure } = err else {
            panic!("expected MethodValidation, got {err:?}");
        };
        assert_eq!(target, "h");
        assert!(failure.has_error_at("y"));

        // The same payload sent directly is a plain validation error.
        let direct = dispatcher.dispatch("h", payload(&json!({"x": 3}))).unwrap_err();
        assert!(direct.validation_failure().is_some());
    }

    #[test]
    fn delegation_by_reference_routes_to_target_channel() {
        let dispatcher = Dispatcher::default();
        let h = dispatcher
            .map_with(
                noop("h").param("x", FieldType::Int),
                RegisterOptions::new().channel("h_in"),
            )
            .unwrap();
        dispatcher
            .register(
                Callable::sync("g", move |_args| Ok(Output::delegate(&h, json!({"x": 3})))),
                RegisterOptions::new(),
            )
            .unwrap();

        let results = dispatcher
            .dispatch("g", payload(&json!({})))
            .unwrap()
            .collect_results()
            .unwrap();
        assert_eq!(results[0].output_channel, "h_in");
        assert_eq!(decoded(&results[0]), json!({"x": 3}));
    }

    #[test]
    fn validator_error_from_body_keeps_identity() {
        let dispatcher = Dispatcher::default();
        dispatcher
            .register(noop("h").param("y", FieldType::Str), RegisterOptions::new())
            .unwrap();
        dispatcher
            .register(
                Callable::sync("g", |args| {
                    Ok(args.validator("v")?.validate_and_return("h", &json!({}))?)
                })
                .context("v", ContextMarker::Validator),
                RegisterOptions::new(),
            )
            .unwrap();

        let err = dispatcher.dispatch("g", payload(&json!({}))).unwrap_err();
        assert!(matches!(err, DispatchError::MethodValidation { .. }));
    }

    #[test]
    fn none_return_produces_nothing_even_with_output_channel() {
        let dispatcher = Dispatcher::default();
        dispatcher
            .register(noop("n"), RegisterOptions::new().output("out"))
            .unwrap();
        let results = dispatcher
            .dispatch("n", payload(&json!({})))
            .unwrap()
            .collect_results()
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn none_elements_of_a_stream_are_routed_as_null() {
        let dispatcher = Dispatcher::default();
        dispatcher
            .register(
                Callable::streaming("maybe", |_args| {
                    stream::iter([Some(1_i64), None, Some(3)].map(Ok::<_, anyhow::Error>))
                }),
                RegisterOptions::new().output("out"),
            )
            .unwrap();

        let results = dispatcher
            .dispatch("maybe", payload(&json!({})))
            .unwrap()
            .collect_results()
            .unwrap();
        let values: Vec<_> = results.iter().map(decoded).collect();
        assert_eq!(values, vec![json!(1), Value::Null, json!(3)]);
    }

    #[test]
    fn none_inside_many_is_routed_as_null() {
        let dispatcher = Dispatcher::default();
        dispatcher
            .register(
                Callable::sync("pair", |_args| Ok(vec![Some(1_i64), None])),
                RegisterOptions::new().output("out"),
            )
            .unwrap();

        let results = dispatcher
            .dispatch("pair", payload(&json!({})))
            .unwrap()
            .collect_results()
            .unwrap();
        let values: Vec<_> = results.iter().map(decoded).collect();
        assert_eq!(values, vec![json!(1), Value::Null]);
    }

    #[test]
    fn all_default_params_accept_an_empty_payload() {
        let dispatcher = Dispatcher::default();
        dispatcher
            .register(
                Callable::sync("defaults", |args| Ok(Value::Object(args.fields().clone())))
                    .param_default("x", FieldType::Int, 7)
                    .param_default("y", FieldType::Str, "a")
                    .param_default("z", FieldType::list(FieldType::Int), Value::Null),
                RegisterOptions::new().output("out"),
            )
            .unwrap();

        let results = dispatcher
            .dispatch("defaults", payload(&json!({})))
            .unwrap()
            .collect_results()
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(decoded(&results[0]), json!({"x": 7, "y": "a", "z": null}));
    }

    #[test]
    fn async_callable_is_awaited() {
        let dispatcher = Dispatcher::default();
        dispatcher
            .register(
                Callable::asynchronous("double", |args| async move {
                    tokio::task::yield_now().await;
                    Ok::<_, anyhow::Error>(json!(args.get::<i64>("x")? * 2))
                })
                .param("x", FieldType::Int),
                RegisterOptions::new().output("out"),
            )
            .unwrap();

        for x in 0..3 {
            let results = dispatcher
                .dispatch("double", payload(&json!({"x": x})))
                .unwrap()
                .collect_results()
                .unwrap();
            assert_eq!(decoded(&results[0]), json!(x * 2));
        }
    }

    #[test]
    fn streaming_callable_yields_each_element_in_order() {
        let dispatcher = Dispatcher::default();
        dispatcher
            .register(
                Callable::streaming("three", |_args| {
                    stream::iter(["a", "b", "c"].map(|s| Ok::<_, anyhow::Error>(json!(s))))
                }),
                RegisterOptions::new().output("out"),
            )
            .unwrap();

        let results = dispatcher
            .dispatch("three", payload(&json!({})))
            .unwrap()
            .collect_results()
            .unwrap();
        let values: Vec<_> = results.iter().map(decoded).collect();
        assert_eq!(values, vec![json!("a"), json!("b"), json!("c")]);
        assert!(results.iter().all(|r| r.output_channel == "out"));
    }

    #[test]
    fn infinite_stream_is_pulled_lazily() {
        let dispatcher = Dispatcher::default();
        dispatcher
            .register(
                Callable::streaming("naturals", |_args| {
                    stream::iter((0_i64..).map(|i| Ok::<_, anyhow::Error>(json!(i))))
                }),
                RegisterOptions::new().output("out"),
            )
            .unwrap();

        let routed = dispatcher.dispatch("naturals", payload(&json!({}))).unwrap();
        assert!(routed.is_streaming());
        let first: Vec<_> = routed.take(4).map(|r| decoded(&r.unwrap())).collect();
        assert_eq!(first, vec![json!(0), json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn duplicate_channel_fails_but_second_channel_succeeds() {
        let dispatcher = Dispatcher::default();
        let f = f();
        dispatcher.register(f.clone(), RegisterOptions::new()).unwrap();
        assert!(matches!(
            dispatcher.register(noop("f"), RegisterOptions::new()),
            Err(RegistrationError::DuplicateCallback { channel }) if channel == "f"
        ));
        dispatcher
            .register(f, RegisterOptions::new().channel("f2"))
            .unwrap();
        assert_eq!(dispatcher.input_channels(), vec!["f", "f2"]);
    }

    #[test]
    fn context_param_with_default_fails_registration() {
        let dispatcher = Dispatcher::default();
        let callable = noop("c").declare(
            crate::callable::DeclaredParam::keyword("d")
                .annotated(ContextMarker::ChannelName)
                .with_default("x"),
        );
        assert!(matches!(
            dispatcher.register(callable, RegisterOptions::new()),
            Err(RegistrationError::SpecialDefaultValue { .. })
        ));
        assert!(dispatcher.input_channels().is_empty());
    }

    #[test]
    fn unnamed_callable_needs_a_channel() {
        let dispatcher = Dispatcher::default();
        assert!(matches!(
            dispatcher.register(noop("x").without_name(), RegisterOptions::new()),
            Err(RegistrationError::UnnamedCallable)
        ));
        dispatcher
            .register(noop("x").without_name(), RegisterOptions::new().channel("anon"))
            .unwrap();
        assert_eq!(dispatcher.binding("anon").unwrap().schema().name(), "model_anonymous_anon");
    }

    #[test]
    fn unknown_channel_is_missing_callback() {
        let dispatcher = Dispatcher::default();
        assert!(matches!(
            dispatcher.dispatch("nope", payload(&json!({}))),
            Err(DispatchError::MissingCallback { target }) if target == "nope"
        ));
    }

    #[test]
    fn validation_hook_replaces_failed_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let dispatcher = Dispatcher::default().with_validation_error_handler(
            move |input, bundle, failure| {
                seen.fetch_add(1, Ordering::SeqCst);
                assert!(failure.has_error_at("x"));
                vec![RoutedResult::new(
                    format!("{}_errors", input.name()),
                    bundle.clone(),
                )]
            },
        );
        dispatcher.register(f(), RegisterOptions::new()).unwrap();

        let bad = payload(&json!({"x": "not a number"}));
        let results = dispatcher
            .dispatch("f", bad.clone())
            .unwrap()
            .collect_results()
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results, vec![RoutedResult::new("f_errors", bad)]);
    }

    #[test]
    fn hook_does_not_see_delegation_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let dispatcher = Dispatcher::default();
        dispatcher.register_validation_error_handler(move |_, _, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        });
        dispatcher
            .register(noop("h").param("y", FieldType::Str), RegisterOptions::new())
            .unwrap();
        dispatcher
            .register(
                Callable::sync("g", |_args| Ok(Output::delegate("h", json!({})))),
                RegisterOptions::new(),
            )
            .unwrap();

        let result = dispatcher
            .dispatch("g", payload(&json!({})))
            .and_then(Routed::collect_results);
        assert!(matches!(result, Err(DispatchError::MethodValidation { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_fields_rejected_unless_kwargs_declared() {
        let dispatcher = Dispatcher::default();
        dispatcher
            .register(noop("strict").param("x", FieldType::Int), RegisterOptions::new())
            .unwrap();
        dispatcher
            .register(
                Callable::sync("open", |args| Ok(Value::Object(args.extra().clone())))
                    .param("x", FieldType::Int)
                    .kwargs("rest"),
                RegisterOptions::new().output("out"),
            )
            .unwrap();

        let err = dispatcher
            .dispatch("strict", payload(&json!({"x": 1, "z": 2})))
            .unwrap_err();
        let failure = err.validation_failure().unwrap();
        assert_eq!(failure.errors[0].kind, FieldErrorKind::Unknown);

        let results = dispatcher
            .dispatch("open", payload(&json!({"x": 1, "z": 2})))
            .unwrap()
            .collect_results()
            .unwrap();
        assert_eq!(decoded(&results[0]), json!({"z": 2}));
    }

    #[test]
    fn context_values_are_injected() {
        let dispatcher = Dispatcher::default();
        dispatcher
            .register(
                Callable::sync("ctx", |args| {
                    let bundle = args.bundle("b")?;
                    Ok(json!({
                        "channel": args.channel_name("c")?,
                        "queue": bundle.channel_headers.get("queue"),
                        "raw_len": args.message("m")?.bytes().len(),
                    }))
                })
                .context("c", ContextMarker::ChannelName)
                .context("b", ContextMarker::MessageBundle)
                .context("m", ContextMarker::RawMessage),
                RegisterOptions::new().output("out"),
            )
            .unwrap();

        let mut headers = fastmsg_core::Headers::new();
        headers.insert("queue".into(), "q1".into());
        let bundle = MessageBundle::with_channel_headers(Message::new("{}"), headers);
        let results = dispatcher
            .dispatch("ctx", bundle)
            .unwrap()
            .collect_results()
            .unwrap();
        assert_eq!(
            decoded(&results[0]),
            json!({"channel": "ctx", "queue": "q1", "raw_len": 2})
        );
    }

    #[test]
    fn missing_output_error_policy() {
        let dispatcher = Dispatcher::new(DispatcherConfig {
            missing_output: MissingOutputPolicy::Error,
            ..DispatcherConfig::default()
        });
        dispatcher.register(f(), RegisterOptions::new()).unwrap();
        let result = dispatcher
            .dispatch("f", payload(&json!({"x": 1})))
            .and_then(Routed::collect_results);
        assert!(matches!(result, Err(DispatchError::NoOutputChannel { channel }) if channel == "f"));
    }

    #[test]
    fn handler_error_is_wrapped() {
        let dispatcher = Dispatcher::default();
        dispatcher
            .register(
                Callable::sync("bad", |_args| -> anyhow::Result<Output> {
                    anyhow::bail!("nope")
                }),
                RegisterOptions::new(),
            )
            .unwrap();
        let err = dispatcher.dispatch("bad", payload(&json!({}))).unwrap_err();
        assert!(matches!(err, DispatchError::Handler(_)));
        assert_eq!(err.to_string(), "callback failed: nope");
    }

    #[test]
    fn shutdown_closes_async_paths_but_not_sync() {
        let dispatcher = Dispatcher::default();
        dispatcher
            .register(
                Callable::asynchronous("a", |_args| async { Ok::<_, anyhow::Error>(Output::None) }),
                RegisterOptions::new(),
            )
            .unwrap();
        dispatcher
            .register(f(), RegisterOptions::new().output("out"))
            .unwrap();

        dispatcher.dispatch("a", payload(&json!({}))).unwrap();
        dispatcher.shutdown();

        assert!(matches!(
            dispatcher.dispatch("a", payload(&json!({}))),
            Err(DispatchError::RunLoop(_))
        ));
        let results = dispatcher
            .dispatch("f", payload(&json!({"x": 1})))
            .unwrap()
            .collect_results()
            .unwrap();
        assert_eq!(results.len(), 1);
    }
}
