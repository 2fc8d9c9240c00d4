//! In-memory collaborator implementations
//!
//! Backing services for local hosts and tests. Each implementation is
//! concurrent-safe and keeps simple call counters so callers can observe
//! how the controller exercised it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use selkie_core::claims::Claims;
use selkie_core::error::{Error, Result};

use crate::events::CloudEvent;
use crate::services::{
    ChunkStore, ClaimsStore, EventBus, PolicyEvaluator, PolicyRequest, PolicyVerdict,
    ReferenceMap, RpcSubscriptions,
};

// =============================================================================
// Claims Store
// =============================================================================

/// Claims store backed by a process-local map
#[derive(Debug, Default)]
pub struct InMemoryClaimsStore {
    // key: (lattice_prefix, public_key)
    inner: RwLock<HashMap<(String, String), Claims>>,
}

impl InMemoryClaimsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed claims directly, bypassing the host path
    pub fn insert(&self, lattice_prefix: &str, claims: Claims) {
        self.inner
            .write()
            .expect("claims lock poisoned")
            .insert((lattice_prefix.to_string(), claims.public_key.clone()), claims);
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("claims lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ClaimsStore for InMemoryClaimsStore {
    async fn put(&self, _host_id: &str, lattice_prefix: &str, claims: &Claims) -> Result<()> {
        self.insert(lattice_prefix, claims.clone());
        Ok(())
    }

    async fn lookup(&self, lattice_prefix: &str, public_key: &str) -> Result<Claims> {
        self.inner
            .read()
            .expect("claims lock poisoned")
            .get(&(lattice_prefix.to_string(), public_key.to_string()))
            .cloned()
            .ok_or_else(|| Error::claims_lookup_failed(public_key, "no claims stored"))
    }
}

// =============================================================================
// Chunk Store
// =============================================================================

/// Chunked object store backed by a process-local map
///
/// Write and read failures can be injected to exercise the controller's
/// best-effort paths.
#[derive(Debug, Default)]
pub struct InMemoryChunkStore {
    objects: RwLock<HashMap<String, Bytes>>,
    chunk_count: AtomicUsize,
    dechunk_count: AtomicUsize,
    fail_chunks: AtomicBool,
    fail_dechunks: AtomicBool,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an externalised request payload under an invocation id
    pub fn insert(&self, key: &str, bytes: Bytes) {
        self.objects
            .write()
            .expect("chunk lock poisoned")
            .insert(key.to_string(), bytes);
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects
            .read()
            .expect("chunk lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn set_fail_chunks(&self, fail: bool) {
        self.fail_chunks.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_dechunks(&self, fail: bool) {
        self.fail_dechunks.store(fail, Ordering::SeqCst);
    }

    /// Total `chunk` calls observed
    pub fn chunk_count(&self) -> usize {
        self.chunk_count.load(Ordering::SeqCst)
    }

    /// Total `dechunk` calls observed
    pub fn dechunk_count(&self) -> usize {
        self.dechunk_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn chunk(&self, key: &str, bytes: Bytes) -> Result<()> {
        self.chunk_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_chunks.load(Ordering::SeqCst) {
            return Err(Error::chunk_store_failed(key, "injected chunk failure"));
        }
        self.insert(key, bytes);
        Ok(())
    }

    async fn dechunk(&self, invocation_id: &str) -> Result<Bytes> {
        self.dechunk_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_dechunks.load(Ordering::SeqCst) {
            return Err(Error::chunk_store_failed(
                invocation_id,
                "injected dechunk failure",
            ));
        }
        self.get(invocation_id)
            .ok_or_else(|| Error::chunk_store_failed(invocation_id, "no object stored"))
    }
}

// =============================================================================
// Reference Map
// =============================================================================

/// Image-reference map backed by a process-local map
#[derive(Debug, Default)]
pub struct InMemoryReferenceMap {
    inner: RwLock<HashMap<String, String>>,
}

impl InMemoryReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, image_ref: &str) -> Option<String> {
        self.inner
            .read()
            .expect("refmap lock poisoned")
            .get(image_ref)
            .cloned()
    }
}

#[async_trait]
impl ReferenceMap for InMemoryReferenceMap {
    async fn put_reference(&self, image_ref: &str, public_key: &str) -> Result<()> {
        self.inner
            .write()
            .expect("refmap lock poisoned")
            .insert(image_ref.to_string(), public_key.to_string());
        Ok(())
    }
}

// =============================================================================
// Event Bus
// =============================================================================

/// Event bus that records every published cloud event
#[derive(Debug, Default)]
pub struct RecordingEventBus {
    published: Mutex<Vec<(String, Bytes)>>,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// All published events, decoded from their envelopes, in order
    pub fn events(&self) -> Vec<(String, CloudEvent)> {
        self.published
            .lock()
            .expect("bus lock poisoned")
            .iter()
            .filter_map(|(topic, payload)| {
                serde_json::from_slice::<CloudEvent>(payload)
                    .ok()
                    .map(|event| (topic.clone(), event))
            })
            .collect()
    }

    /// Event types in publication order
    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|(_, e)| e.event_type).collect()
    }

    pub fn len(&self) -> usize {
        self.published.lock().expect("bus lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        self.published
            .lock()
            .expect("bus lock poisoned")
            .push((topic.to_string(), payload));
        Ok(())
    }
}

// =============================================================================
// Policy Evaluator
// =============================================================================

/// Policy evaluator that returns a fixed verdict
#[derive(Debug)]
pub struct StaticPolicy {
    verdict: Mutex<PolicyVerdict>,
    fail_evaluations: AtomicBool,
    eval_count: AtomicUsize,
}

impl StaticPolicy {
    pub fn new(verdict: PolicyVerdict) -> Self {
        Self {
            verdict: Mutex::new(verdict),
            fail_evaluations: AtomicBool::new(false),
            eval_count: AtomicUsize::new(0),
        }
    }

    /// Evaluation disabled: every invocation is permitted
    pub fn disabled() -> Self {
        Self::new(PolicyVerdict::EvaluationDisabled)
    }

    pub fn permit_all() -> Self {
        Self::new(PolicyVerdict::Permitted)
    }

    pub fn deny_all() -> Self {
        Self::new(PolicyVerdict::Denied)
    }

    pub fn set_verdict(&self, verdict: PolicyVerdict) {
        *self.verdict.lock().expect("policy lock poisoned") = verdict;
    }

    /// Make `evaluate` return an error (which the controller treats as deny)
    pub fn set_fail_evaluations(&self, fail: bool) {
        self.fail_evaluations.store(fail, Ordering::SeqCst);
    }

    /// Total `evaluate` calls observed
    pub fn eval_count(&self) -> usize {
        self.eval_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyEvaluator for StaticPolicy {
    async fn evaluate(&self, _request: PolicyRequest) -> Result<PolicyVerdict> {
        self.eval_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_evaluations.load(Ordering::SeqCst) {
            return Err(Error::internal("injected policy evaluator failure"));
        }
        Ok(*self.verdict.lock().expect("policy lock poisoned"))
    }
}

// =============================================================================
// RPC Subscriptions
// =============================================================================

/// Subscription supervisor that records ensure calls
#[derive(Debug, Default)]
pub struct NoopSubscriptions {
    ensured: Mutex<Vec<(String, String)>>,
}

impl NoopSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensured(&self) -> Vec<(String, String)> {
        self.ensured.lock().expect("subs lock poisoned").clone()
    }
}

#[async_trait]
impl RpcSubscriptions for NoopSubscriptions {
    async fn ensure_actor_subscription(
        &self,
        lattice_prefix: &str,
        public_key: &str,
    ) -> Result<()> {
        self.ensured
            .lock()
            .expect("subs lock poisoned")
            .push((lattice_prefix.to_string(), public_key.to_string()));
        Ok(())
    }
}
