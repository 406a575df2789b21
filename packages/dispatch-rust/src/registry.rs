use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::binding::CallableBinding;
use crate::callable::CallableId;
use crate::error::{DispatchError, RegistrationError};
use crate::output::Target;

/// Channel-name and callable-identity lookup of bindings.
///
/// Append-only: bindings are inserted during setup and read afterwards.
/// The reverse mapping is maintained explicitly at insertion time; when the
/// same callable is bound to several channels, delegation by reference
/// resolves to the most recent registration.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    /// Channel name -> binding.
    bindings: DashMap<String, Arc<CallableBinding>>,
    /// Callable identity -> channel name.
    by_callable: DashMap<CallableId, String>,
    /// Registration order, for deterministic channel listings.
    order: RwLock<Vec<String>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn contains(&self, channel: &str) -> bool {
        self.bindings.contains_key(channel)
    }

    /// Insert a binding under its channel.
    pub(crate) fn insert(
        &self,
        binding: CallableBinding,
    ) -> Result<Arc<CallableBinding>, RegistrationError> {
        let channel = binding.channel().to_string();
        let id = binding.callable().id();
        let binding = Arc::new(binding);

        match self.bindings.entry(channel.clone()) {
            Entry::Occupied(_) => return Err(RegistrationError::DuplicateCallback { channel }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&binding));
            }
        }
        self.by_callable.insert(id, channel.clone());
        self.order.write().push(channel);
        Ok(binding)
    }

    pub(crate) fn get(&self, channel: &str) -> Option<Arc<CallableBinding>> {
        self.bindings.get(channel).map(|entry| Arc::clone(entry.value()))
    }

    /// Resolve a delegation target to its binding.
    pub(crate) fn resolve(&self, target: &Target) -> Result<Arc<CallableBinding>, DispatchError> {
        let channel = match target {
            Target::Channel(channel) => Some(channel.clone()),
            Target::Callable(id) => self.by_callable.get(id).map(|entry| entry.value().clone()),
        };
        channel
            .and_then(|channel| self.get(&channel))
            .ok_or_else(|| DispatchError::MissingCallback {
                target: target.to_string(),
            })
    }

    /// Registered channel names in registration order.
    pub(crate) fn channels(&self) -> Vec<String> {
        self.order.read().clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use fastmsg_core::UnknownFieldPolicy;

    use super::*;
    use crate::callable::Callable;
    use crate::output::Output;

    fn binding(callable: &Callable, channel: &str) -> CallableBinding {
        CallableBinding::new(callable.clone(), channel, None, UnknownFieldPolicy::Reject).unwrap()
    }

    fn noop(name: &str) -> Callable {
        Callable::sync(name, |_args| Ok(Output::None))
    }

    #[test]
    fn insert_and_get_by_channel() {
        let registry = Registry::new();
        let f = noop("f");
        registry.insert(binding(&f, "f")).unwrap();

        assert!(registry.contains("f"));
        assert_eq!(registry.get("f").unwrap().channel(), "f");
        assert!(registry.get("g").is_none());
    }

    #[test]
    fn duplicate_channel_rejected() {
        let registry = Registry::new();
        registry.insert(binding(&noop("f"), "f")).unwrap();
        let err = registry.insert(binding(&noop("other"), "f")).unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateCallback { channel } if channel == "f"));
        assert_eq!(registry.channels(), vec!["f"]);
    }

    #[test]
    fn resolve_by_channel_and_by_callable() {
        let registry = Registry::new();
        let f = noop("f");
        registry.insert(binding(&f, "f_channel")).unwrap();

        let by_name = registry.resolve(&Target::from("f_channel")).unwrap();
        let by_ref = registry.resolve(&Target::from(&f)).unwrap();
        assert!(Arc::ptr_eq(&by_name, &by_ref));
    }

    #[test]
    fn resolve_unknown_target_fails() {
        let registry = Registry::new();
        let unregistered = noop("ghost");
        assert!(matches!(
            registry.resolve(&Target::from("nope")),
            Err(DispatchError::MissingCallback { target }) if target == "nope"
        ));
        assert!(matches!(
            registry.resolve(&Target::from(&unregistered)),
            Err(DispatchError::MissingCallback { .. })
        ));
    }

    #[test]
    fn same_callable_on_two_channels_resolves_to_latest() {
        let registry = Registry::new();
        let f = noop("f");
        registry.insert(binding(&f, "first")).unwrap();
        registry.insert(binding(&f, "second")).unwrap();

        assert_eq!(registry.resolve(&Target::from(&f)).unwrap().channel(), "second");
        assert_eq!(registry.channels(), vec!["first", "second"]);
    }
}
