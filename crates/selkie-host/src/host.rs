//! Host context
//!
//! One `HostContext` per host process: the validated configuration plus
//! handles to every shared collaborator service. Instances hold it behind
//! an `Arc`; all services are concurrent-safe.

use std::sync::Arc;

use selkie_core::error::{Error, Result};
use selkie_core::io::{TimeProvider, WallClockTime};

use crate::config::HostConfig;
use crate::events::EventPublisher;
use crate::mem::{
    InMemoryChunkStore, InMemoryClaimsStore, InMemoryReferenceMap, NoopSubscriptions,
    RecordingEventBus, StaticPolicy,
};
use crate::registry::InstanceRegistry;
use crate::services::{
    ChunkStore, ClaimsStore, EventBus, PolicyEvaluator, ReferenceMap, RpcSubscriptions,
    WasmRuntime,
};

/// Shared per-host state and collaborator handles
pub struct HostContext {
    pub config: HostConfig,
    pub runtime: Arc<dyn WasmRuntime>,
    pub chunks: Arc<dyn ChunkStore>,
    pub claims: Arc<dyn ClaimsStore>,
    pub policy: Arc<dyn PolicyEvaluator>,
    pub bus: Arc<dyn EventBus>,
    pub references: Arc<dyn ReferenceMap>,
    pub subscriptions: Arc<dyn RpcSubscriptions>,
    pub registry: Arc<InstanceRegistry>,
    pub time: Arc<dyn TimeProvider>,
}

impl HostContext {
    /// Start building a host context for the given configuration
    pub fn builder(config: HostConfig) -> HostContextBuilder {
        HostContextBuilder::new(config)
    }

    /// An event publisher bound to this host's identity and lattice
    pub fn event_publisher(&self) -> EventPublisher {
        EventPublisher::new(
            self.bus.clone(),
            self.time.clone(),
            self.config.host_id.clone(),
            self.config.lattice_prefix.clone(),
        )
    }
}

/// Builder for [`HostContext`]
///
/// The wasm runtime is required; every other collaborator defaults to its
/// in-memory implementation, which is what local hosts and tests run on.
pub struct HostContextBuilder {
    config: HostConfig,
    runtime: Option<Arc<dyn WasmRuntime>>,
    chunks: Option<Arc<dyn ChunkStore>>,
    claims: Option<Arc<dyn ClaimsStore>>,
    policy: Option<Arc<dyn PolicyEvaluator>>,
    bus: Option<Arc<dyn EventBus>>,
    references: Option<Arc<dyn ReferenceMap>>,
    subscriptions: Option<Arc<dyn RpcSubscriptions>>,
    registry: Option<Arc<InstanceRegistry>>,
    time: Option<Arc<dyn TimeProvider>>,
}

impl HostContextBuilder {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            runtime: None,
            chunks: None,
            claims: None,
            policy: None,
            bus: None,
            references: None,
            subscriptions: None,
            registry: None,
            time: None,
        }
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn WasmRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_chunks(mut self, chunks: Arc<dyn ChunkStore>) -> Self {
        self.chunks = Some(chunks);
        self
    }

    pub fn with_claims(mut self, claims: Arc<dyn ClaimsStore>) -> Self {
        self.claims = Some(claims);
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyEvaluator>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_references(mut self, references: Arc<dyn ReferenceMap>) -> Self {
        self.references = Some(references);
        self
    }

    pub fn with_subscriptions(mut self, subscriptions: Arc<dyn RpcSubscriptions>) -> Self {
        self.subscriptions = Some(subscriptions);
        self
    }

    pub fn with_registry(mut self, registry: Arc<InstanceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_time(mut self, time: Arc<dyn TimeProvider>) -> Self {
        self.time = Some(time);
        self
    }

    /// Build the context
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or no runtime was
    /// provided.
    pub fn build(self) -> Result<Arc<HostContext>> {
        self.config.validate()?;

        let runtime = self.runtime.ok_or_else(|| Error::InvalidConfiguration {
            field: "runtime".into(),
            reason: "a wasm runtime is required".into(),
        })?;

        Ok(Arc::new(HostContext {
            config: self.config,
            runtime,
            chunks: self.chunks.unwrap_or_else(|| Arc::new(InMemoryChunkStore::new())),
            claims: self.claims.unwrap_or_else(|| Arc::new(InMemoryClaimsStore::new())),
            policy: self.policy.unwrap_or_else(|| Arc::new(StaticPolicy::disabled())),
            bus: self.bus.unwrap_or_else(|| Arc::new(RecordingEventBus::new())),
            references: self
                .references
                .unwrap_or_else(|| Arc::new(InMemoryReferenceMap::new())),
            subscriptions: self
                .subscriptions
                .unwrap_or_else(|| Arc::new(NoopSubscriptions::new())),
            registry: self.registry.unwrap_or_default(),
            time: self.time.unwrap_or_else(|| Arc::new(WallClockTime::new())),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRuntime;

    #[test]
    fn test_build_requires_runtime() {
        let result = HostContext::builder(HostConfig::new("NHOST")).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_with_defaults() {
        let host = HostContext::builder(HostConfig::new("NHOST"))
            .with_runtime(Arc::new(MockRuntime::new()))
            .build()
            .unwrap();

        assert_eq!(host.config.host_id, "NHOST");
        assert_eq!(host.event_publisher().lifecycle_topic(), "wasmbus.evt.default");
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let result = HostContext::builder(HostConfig::default())
            .with_runtime(Arc::new(MockRuntime::new()))
            .build();
        assert!(result.is_err());
    }
}
