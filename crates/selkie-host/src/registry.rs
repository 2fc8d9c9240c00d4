//! Host-local instance registry
//!
//! Running instances advertise themselves under their public key in a
//! process-local registry. The same key may map to multiple live instances;
//! registrations are released automatically when the owning instance task
//! drops its guard.
//!
//! Introspection queries read only the instance state cells and return
//! documented defaults when no instance is registered for a key.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use selkie_core::claims::Claims;

use crate::state::{CurrentInvocation, StateCell};

/// Instance id reported for a public key with no live instance
pub const INSTANCE_ID_UNKNOWN: &str = "??";

/// Image reference reported for a public key with no live instance
pub const IMAGE_REF_UNKNOWN: &str = "n/a";

/// Process-local registry of running instances keyed by public key
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    inner: RwLock<HashMap<String, Vec<Arc<StateCell>>>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running instance; duplicates per key are permitted
    ///
    /// The returned guard releases the registration when dropped.
    pub fn register(self: &Arc<Self>, state: Arc<StateCell>) -> RegistrationGuard {
        let public_key = state.public_key().to_string();
        let instance_id = state.instance_id().to_string();

        {
            let mut inner = self.inner.write().expect("registry lock poisoned");
            inner.entry(public_key.clone()).or_default().push(state);
        }

        RegistrationGuard {
            registry: Arc::downgrade(self),
            public_key,
            instance_id,
        }
    }

    /// All live instances registered under a public key
    pub fn instances(&self, public_key: &str) -> Vec<Arc<StateCell>> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .get(public_key)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of live instances registered under a public key
    pub fn count(&self, public_key: &str) -> usize {
        self.instances(public_key).len()
    }

    fn first(&self, public_key: &str) -> Option<Arc<StateCell>> {
        self.instances(public_key).into_iter().next()
    }

    // =========================================================================
    // Introspection queries (read only C1, never external services)
    // =========================================================================

    /// Claims of the first registered instance; empty claims when absent
    pub fn claims(&self, public_key: &str) -> Claims {
        self.first(public_key)
            .map(|s| s.meta().claims.clone())
            .unwrap_or_default()
    }

    /// Instance id of the first registered instance; `"??"` when absent
    pub fn instance_id(&self, public_key: &str) -> String {
        self.first(public_key)
            .map(|s| s.instance_id().to_string())
            .unwrap_or_else(|| INSTANCE_ID_UNKNOWN.to_string())
    }

    /// Image reference of the first registered instance; `"n/a"` when absent
    pub fn image_ref(&self, public_key: &str) -> String {
        self.first(public_key)
            .and_then(|s| s.meta().image_ref.clone())
            .unwrap_or_else(|| IMAGE_REF_UNKNOWN.to_string())
    }

    /// Annotations of the first registered instance; empty when absent
    pub fn annotations(&self, public_key: &str) -> HashMap<String, String> {
        self.first(public_key)
            .map(|s| s.meta().annotations.clone())
            .unwrap_or_default()
    }

    /// The invocation currently processed by the first registered instance
    pub async fn current_invocation(&self, public_key: &str) -> Option<CurrentInvocation> {
        match self.first(public_key) {
            Some(state) => state.current_invocation().await,
            None => None,
        }
    }

    fn release(&self, public_key: &str, instance_id: &str) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(entries) = inner.get_mut(public_key) {
            entries.retain(|s| s.instance_id() != instance_id);
            if entries.is_empty() {
                inner.remove(public_key);
            }
        }
    }
}

/// RAII registration handle held by the owning instance task
///
/// Dropping the guard (task exit, normal or not) releases the entry.
#[derive(Debug)]
pub struct RegistrationGuard {
    registry: Weak<InstanceRegistry>,
    public_key: String,
    instance_id: String,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release(&self.public_key, &self.instance_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ArtifactRef;
    use crate::state::InstanceMeta;

    fn cell(instance_id: &str, public_key: &str) -> Arc<StateCell> {
        let meta = InstanceMeta::new(
            instance_id,
            Claims {
                public_key: public_key.into(),
                issuer: "AISSUER".into(),
                ..Default::default()
            },
            Some("registry.example.com/echo:0.1".into()),
            HashMap::new(),
            "NHOST",
            "default",
        );
        Arc::new(StateCell::new(meta, ArtifactRef::new(1)))
    }

    #[test]
    fn test_register_and_release() {
        let registry = Arc::new(InstanceRegistry::new());

        let guard = registry.register(cell("iid-1", "MACTOR"));
        assert_eq!(registry.count("MACTOR"), 1);
        assert_eq!(registry.instance_id("MACTOR"), "iid-1");

        drop(guard);
        assert_eq!(registry.count("MACTOR"), 0);
    }

    #[test]
    fn test_duplicate_keys_permitted() {
        let registry = Arc::new(InstanceRegistry::new());

        let _g1 = registry.register(cell("iid-1", "MACTOR"));
        let _g2 = registry.register(cell("iid-2", "MACTOR"));
        assert_eq!(registry.count("MACTOR"), 2);

        // Dropping one leaves the other registered
        drop(_g1);
        assert_eq!(registry.count("MACTOR"), 1);
        assert_eq!(registry.instance_id("MACTOR"), "iid-2");
    }

    #[test]
    fn test_absent_key_defaults() {
        let registry = Arc::new(InstanceRegistry::new());

        assert_eq!(registry.instance_id("MGHOST"), INSTANCE_ID_UNKNOWN);
        assert_eq!(registry.image_ref("MGHOST"), IMAGE_REF_UNKNOWN);
        assert_eq!(registry.claims("MGHOST"), Claims::default());
        assert!(registry.annotations("MGHOST").is_empty());
    }

    #[tokio::test]
    async fn test_current_invocation_query() {
        let registry = Arc::new(InstanceRegistry::new());
        let state = cell("iid-1", "MACTOR");
        let _guard = registry.register(state.clone());

        assert!(registry.current_invocation("MACTOR").await.is_none());

        state.begin_invocation("inv-1", "Echo").await;
        let current = registry.current_invocation("MACTOR").await.unwrap();
        assert_eq!(current.operation, "Echo");
    }
}
