//! Error types for Selkie
//!
//! TigerStyle: Explicit error types with context, using thiserror.
//!
//! The invocation pipeline replies with error *strings* on the bus, so the
//! `Display` text of the gate variants is part of the wire contract and must
//! not change casually.

use thiserror::Error;

/// Result type alias for Selkie operations
pub type Result<T> = std::result::Result<T, Error>;

/// Selkie error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Invocation Gate Errors (Display text is the bus reply)
    // =========================================================================
    #[error("Failed to deserialize invocation")]
    InvocationDeserialization,

    #[error("Anti-forgery check failed: {reason}")]
    AntiForgery { reason: String },

    #[error("Invocation source does not have the required capability claim {contract_id}")]
    CapabilityMismatch { contract_id: String },

    #[error("Policy evaluation rejected invocation attempt")]
    PolicyDenied,

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    /// Error surfaced verbatim from the wasm runtime. The runtime's own
    /// message is the reply and event payload, so no context is prepended.
    #[error("{reason}")]
    Runtime { reason: String },

    #[error("Precompilation failed: {reason}")]
    PrecompileFailed { reason: String },

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    #[error("Claims lookup failed for {public_key}: {reason}")]
    ClaimsLookupFailed { public_key: String, reason: String },

    #[error("Chunk store operation failed for {key}: {reason}")]
    ChunkStoreFailed { key: String, reason: String },

    #[error("Event publication failed on {topic}: {reason}")]
    EventPublishFailed { topic: String, reason: String },

    // =========================================================================
    // Instance Errors
    // =========================================================================
    #[error("Instance is not running")]
    InstanceStopped,

    #[error("Instance mailbox full: {depth} messages (limit: {limit})")]
    MailboxFull { depth: usize, limit: usize },

    #[error("Operation timed out after {timeout_ms}ms: {operation}")]
    OperationTimedOut { operation: String, timeout_ms: u64 },

    // =========================================================================
    // Configuration / Internal Errors
    // =========================================================================
    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Serialization failed: {reason}")]
    SerializationFailed { reason: String },

    #[error("Internal error: {reason}")]
    Internal { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an anti-forgery failure
    pub fn anti_forgery(reason: impl Into<String>) -> Self {
        Self::AntiForgery {
            reason: reason.into(),
        }
    }

    /// Create a capability mismatch for the given contract id
    pub fn capability_mismatch(contract_id: impl Into<String>) -> Self {
        Self::CapabilityMismatch {
            contract_id: contract_id.into(),
        }
    }

    /// Create a verbatim runtime error
    pub fn runtime(reason: impl Into<String>) -> Self {
        Self::Runtime {
            reason: reason.into(),
        }
    }

    /// Create a claims lookup failure
    pub fn claims_lookup_failed(
        public_key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ClaimsLookupFailed {
            public_key: public_key.into(),
            reason: reason.into(),
        }
    }

    /// Create a chunk store failure
    pub fn chunk_store_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ChunkStoreFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a serialization failure
    pub fn serialization_failed(reason: impl Into<String>) -> Self {
        Self::SerializationFailed {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Check if this error denies an invocation before it reaches the runtime
    pub fn is_gate_denial(&self) -> bool {
        matches!(
            self,
            Self::InvocationDeserialization
                | Self::AntiForgery { .. }
                | Self::CapabilityMismatch { .. }
                | Self::PolicyDenied
        )
    }
}
