//! Scripted wasm runtime for tests
//!
//! Mirrors the collaborator contract of the real runtime service: artifacts
//! are minted on precompile, invocations echo their payload unless a fixed
//! response or failure is scripted, and every call is recorded so tests can
//! assert on what reached the runtime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use selkie_core::error::{Error, Result};

use crate::services::{ArtifactRef, WasmRuntime};

/// One recorded `invoke` call
#[derive(Debug, Clone)]
pub struct RecordedInvocation {
    pub artifact: ArtifactRef,
    pub operation: String,
    pub payload: Bytes,
    pub trace_blob: Bytes,
}

/// Scripted wasm runtime
#[derive(Debug, Default)]
pub struct MockRuntime {
    next_artifact: AtomicU64,
    precompile_failure: Mutex<Option<String>>,
    invoke_failure: Mutex<Option<String>>,
    anti_forgery_failure: Mutex<Option<String>>,
    fixed_response: Mutex<Option<Bytes>>,
    invocations: Mutex<Vec<RecordedInvocation>>,
    precompiled: Mutex<Vec<ArtifactRef>>,
    released: Mutex<Vec<ArtifactRef>>,
}

impl MockRuntime {
    /// A runtime that echoes invocation payloads
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a fixed response for every invocation
    pub fn set_response(&self, bytes: Bytes) {
        *self.fixed_response.lock().expect("mock lock poisoned") = Some(bytes);
    }

    /// Script precompile to fail with the given reason
    pub fn set_precompile_failure(&self, reason: impl Into<String>) {
        *self.precompile_failure.lock().expect("mock lock poisoned") = Some(reason.into());
    }

    /// Let precompile succeed again
    pub fn clear_precompile_failure(&self) {
        *self.precompile_failure.lock().expect("mock lock poisoned") = None;
    }

    /// Script invocations to fail with the given reason
    pub fn set_invoke_failure(&self, reason: impl Into<String>) {
        *self.invoke_failure.lock().expect("mock lock poisoned") = Some(reason.into());
    }

    /// Let invocations succeed again
    pub fn clear_invoke_failure(&self) {
        *self.invoke_failure.lock().expect("mock lock poisoned") = None;
    }

    /// Script anti-forgery validation to fail with the given reason
    pub fn set_anti_forgery_failure(&self, reason: impl Into<String>) {
        *self.anti_forgery_failure.lock().expect("mock lock poisoned") = Some(reason.into());
    }

    /// All recorded invocations, in order
    pub fn invocations(&self) -> Vec<RecordedInvocation> {
        self.invocations.lock().expect("mock lock poisoned").clone()
    }

    pub fn invoke_count(&self) -> usize {
        self.invocations.lock().expect("mock lock poisoned").len()
    }

    /// Artifacts minted by precompile, in order
    pub fn precompiled(&self) -> Vec<ArtifactRef> {
        self.precompiled.lock().expect("mock lock poisoned").clone()
    }

    /// Artifacts released by the controller, in order
    pub fn released(&self) -> Vec<ArtifactRef> {
        self.released.lock().expect("mock lock poisoned").clone()
    }
}

#[async_trait]
impl WasmRuntime for MockRuntime {
    async fn precompile(&self, bytes: Bytes) -> Result<ArtifactRef> {
        debug_assert!(!bytes.is_empty(), "module bytes must not be empty");

        if let Some(reason) = self.precompile_failure.lock().expect("mock lock poisoned").clone() {
            return Err(Error::runtime(reason));
        }

        let artifact = ArtifactRef::new(self.next_artifact.fetch_add(1, Ordering::SeqCst) + 1);
        self.precompiled
            .lock()
            .expect("mock lock poisoned")
            .push(artifact);
        Ok(artifact)
    }

    async fn invoke(
        &self,
        artifact: &ArtifactRef,
        operation: &str,
        payload: Bytes,
        trace_blob: Bytes,
    ) -> Result<Bytes> {
        self.invocations
            .lock()
            .expect("mock lock poisoned")
            .push(RecordedInvocation {
                artifact: *artifact,
                operation: operation.to_string(),
                payload: payload.clone(),
                trace_blob,
            });

        if let Some(reason) = self.invoke_failure.lock().expect("mock lock poisoned").clone() {
            return Err(Error::runtime(reason));
        }

        let fixed = self.fixed_response.lock().expect("mock lock poisoned").clone();
        Ok(fixed.unwrap_or(payload))
    }

    async fn validate_anti_forgery(
        &self,
        _body: &[u8],
        _trusted_issuers: &[String],
    ) -> Result<()> {
        match self.anti_forgery_failure.lock().expect("mock lock poisoned").clone() {
            Some(reason) => Err(Error::runtime(reason)),
            None => Ok(()),
        }
    }

    async fn release(&self, artifact: ArtifactRef) -> Result<()> {
        self.released
            .lock()
            .expect("mock lock poisoned")
            .push(artifact);
        Ok(())
    }
}
