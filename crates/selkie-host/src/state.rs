//! Per-instance state store
//!
//! One cell per running instance. Identity fixed at start lives in an
//! immutable, `Arc`-shared snapshot so introspection never contends with
//! invocation processing; the few fields the lifecycle may change sit
//! behind a single RwLock written only by the owning instance task.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use selkie_core::claims::Claims;
use selkie_core::constants::INSTANCE_API_VERSION;

use crate::services::ArtifactRef;

/// Identity and startup metadata, immutable for the instance's lifetime
#[derive(Debug, Clone)]
pub struct InstanceMeta {
    /// Freshly generated UUID v4, unique per instance
    pub instance_id: String,
    /// Claims extracted from the signed artifact
    pub claims: Claims,
    /// Registry reference the module was loaded from, if any
    pub image_ref: Option<String>,
    /// Opaque annotations attached by the supervisor
    pub annotations: HashMap<String, String>,
    /// Public key of the enclosing host
    pub host_id: String,
    /// Logical network prefix
    pub lattice_prefix: String,
    /// Instance API version advertised to callers
    pub api_version: u32,
}

impl InstanceMeta {
    pub fn new(
        instance_id: impl Into<String>,
        claims: Claims,
        image_ref: Option<String>,
        annotations: HashMap<String, String>,
        host_id: impl Into<String>,
        lattice_prefix: impl Into<String>,
    ) -> Self {
        let instance_id = instance_id.into();
        debug_assert!(!instance_id.is_empty(), "instance id must not be empty");
        debug_assert!(
            !claims.public_key.is_empty(),
            "claims must carry a public key"
        );

        Self {
            instance_id,
            claims,
            image_ref,
            annotations,
            host_id: host_id.into(),
            lattice_prefix: lattice_prefix.into(),
            api_version: INSTANCE_API_VERSION,
        }
    }
}

/// The invocation currently being processed by an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentInvocation {
    pub invocation_id: String,
    pub operation: String,
}

#[derive(Debug)]
struct MutableState {
    actor_reference: ArtifactRef,
    current_invocation: Option<CurrentInvocation>,
    healthy: bool,
}

/// Serialised-access cell over one instance's runtime state
///
/// Reads of the immutable snapshot are lock-free; reads of mutable fields
/// take a shared lock and never block behind other readers. Only the
/// owning instance task writes.
#[derive(Debug)]
pub struct StateCell {
    meta: Arc<InstanceMeta>,
    inner: RwLock<MutableState>,
}

impl StateCell {
    pub fn new(meta: InstanceMeta, actor_reference: ArtifactRef) -> Self {
        Self {
            meta: Arc::new(meta),
            inner: RwLock::new(MutableState {
                actor_reference,
                current_invocation: None,
                healthy: true,
            }),
        }
    }

    /// The immutable startup snapshot
    pub fn meta(&self) -> &Arc<InstanceMeta> {
        &self.meta
    }

    pub fn instance_id(&self) -> &str {
        &self.meta.instance_id
    }

    pub fn public_key(&self) -> &str {
        &self.meta.claims.public_key
    }

    /// The artifact currently backing this instance
    pub async fn actor_reference(&self) -> ArtifactRef {
        self.inner.read().await.actor_reference
    }

    /// Atomically replace the backing artifact, returning the prior one
    ///
    /// Only the live-update protocol calls this.
    pub async fn replace_artifact(&self, new: ArtifactRef) -> ArtifactRef {
        let mut inner = self.inner.write().await;
        std::mem::replace(&mut inner.actor_reference, new)
    }

    /// Record the invocation now being processed
    pub async fn begin_invocation(&self, invocation_id: &str, operation: &str) {
        let mut inner = self.inner.write().await;
        debug_assert!(
            inner.current_invocation.is_none(),
            "instance processes one invocation at a time"
        );
        inner.current_invocation = Some(CurrentInvocation {
            invocation_id: invocation_id.to_string(),
            operation: operation.to_string(),
        });
    }

    /// Clear the in-flight invocation record
    pub async fn clear_invocation(&self) {
        self.inner.write().await.current_invocation = None;
    }

    /// The invocation currently being processed, if any
    pub async fn current_invocation(&self) -> Option<CurrentInvocation> {
        self.inner.read().await.current_invocation.clone()
    }

    /// Whether the most recent runtime invocation succeeded
    ///
    /// True until a runtime invocation fails; reset by the next success.
    pub async fn healthy(&self) -> bool {
        self.inner.read().await.healthy
    }

    pub async fn set_healthy(&self, healthy: bool) {
        self.inner.write().await.healthy = healthy;
    }
}
