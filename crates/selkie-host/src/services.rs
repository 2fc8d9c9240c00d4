//! Collaborator service contracts
//!
//! The instance controller composes several host- or lattice-wide services
//! it does not own: the wasm runtime, the chunked object store, the claims
//! store, the policy evaluator, the cloud-event bus, the reference map, and
//! the actor-RPC subscription supervisor. Each is consumed through the
//! narrow trait defined here; all implementations must be safe for
//! concurrent calls from many instances.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use selkie_core::claims::Claims;
use selkie_core::error::Result;

/// Opaque handle to a precompiled wasm artifact
///
/// The runtime owns the bytes; instances hold a non-owning reference and
/// return it via [`WasmRuntime::release`] when it is superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArtifactRef(u64);

impl ArtifactRef {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "artifact-{}", self.0)
    }
}

/// The host-wide wasm runtime service
///
/// Shared across all instances on a host; `invoke` must be safe for
/// concurrent calls with distinct artifact references.
#[async_trait]
pub trait WasmRuntime: Send + Sync {
    /// Precompile raw module bytes into an executable artifact
    async fn precompile(&self, bytes: Bytes) -> Result<ArtifactRef>;

    /// Invoke an operation on a precompiled artifact
    ///
    /// `trace_blob` is the serialised trace context, opaque to the runtime.
    async fn invoke(
        &self,
        artifact: &ArtifactRef,
        operation: &str,
        payload: Bytes,
        trace_blob: Bytes,
    ) -> Result<Bytes>;

    /// Validate the signature on a raw invocation body against the trusted
    /// cluster issuer keys
    async fn validate_anti_forgery(&self, body: &[u8], trusted_issuers: &[String]) -> Result<()>;

    /// Release a precompiled artifact the host no longer references
    async fn release(&self, artifact: ArtifactRef) -> Result<()>;
}

/// The lattice-wide chunked object store
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Store an externalised payload under the given key
    async fn chunk(&self, key: &str, bytes: Bytes) -> Result<()>;

    /// Fetch the externalised request payload for an invocation id
    async fn dechunk(&self, invocation_id: &str) -> Result<Bytes>;
}

/// The lattice-wide claims store
#[async_trait]
pub trait ClaimsStore: Send + Sync {
    /// Persist claims for a module running on this host
    async fn put(&self, host_id: &str, lattice_prefix: &str, claims: &Claims) -> Result<()>;

    /// Look up claims by subject public key
    async fn lookup(&self, lattice_prefix: &str, public_key: &str) -> Result<Claims>;
}

/// One party of a policy decision, derived from its claims
#[derive(Debug, Clone, Serialize)]
pub struct PolicyEntity {
    pub public_key: String,
    pub issuer: String,
    pub capabilities: Vec<String>,
}

impl From<&Claims> for PolicyEntity {
    fn from(claims: &Claims) -> Self {
        Self {
            public_key: claims.public_key.clone(),
            issuer: claims.issuer.clone(),
            capabilities: claims.caps.clone(),
        }
    }
}

/// A request to the policy evaluator
#[derive(Debug, Clone, Serialize)]
pub struct PolicyRequest {
    pub host_id: String,
    pub lattice_prefix: String,
    pub labels: HashMap<String, String>,
    pub source: PolicyEntity,
    pub target: PolicyEntity,
    pub action: String,
}

/// Outcome of a policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyVerdict {
    Permitted,
    Denied,
    /// Policy evaluation is disabled on this lattice; treated as permitted
    EvaluationDisabled,
}

/// The lattice policy evaluator
///
/// An `Err` from `evaluate` denies the invocation.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn evaluate(&self, request: PolicyRequest) -> Result<PolicyVerdict>;
}

/// The cloud-event publisher
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;
}

/// The host reference map from registry image references to public keys
#[async_trait]
pub trait ReferenceMap: Send + Sync {
    async fn put_reference(&self, image_ref: &str, public_key: &str) -> Result<()>;
}

/// The actor-RPC subscription supervisor
///
/// Ensures a bus subscription delivering invocations for the given
/// `(lattice_prefix, public_key)` pair exists; idempotent.
#[async_trait]
pub trait RpcSubscriptions: Send + Sync {
    async fn ensure_actor_subscription(&self, lattice_prefix: &str, public_key: &str)
        -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_ref_identity() {
        let a = ArtifactRef::new(7);
        let b = ArtifactRef::new(7);
        assert_eq!(a, b);
        assert_eq!(a.id(), 7);
        assert_eq!(a.to_string(), "artifact-7");
    }

    #[test]
    fn test_policy_entity_from_claims() {
        let claims = Claims {
            public_key: "MACTOR".into(),
            issuer: "AISSUER".into(),
            caps: vec!["wasmcloud:keyvalue".into()],
            ..Default::default()
        };
        let entity = PolicyEntity::from(&claims);
        assert_eq!(entity.public_key, "MACTOR");
        assert_eq!(entity.issuer, "AISSUER");
        assert_eq!(entity.capabilities.len(), 1);
    }
}
