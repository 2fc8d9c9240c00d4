//! Invocation wire records
//!
//! Invocations and their responses travel on the lattice bus as msgpack
//! with named fields (`rmp_serde::to_vec_named`), so the format is
//! self-describing and tolerant of field additions. Binary payloads above
//! [`CHUNK_THRESHOLD_BYTES`](crate::constants::CHUNK_THRESHOLD_BYTES) are
//! externalised to the chunked object store and travel out of band.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::constants::{
    INVOCATION_ID_LENGTH_BYTES_MAX, OPERATION_LENGTH_BYTES_MAX, RESPONSE_CHUNK_KEY_SUFFIX,
};
use crate::error::{Error, Result};

/// One side of an invocation: either an actor or a capability provider
///
/// An origin with neither `contract_id` nor `link_name` is another actor.
/// Different bus encodings produce different absents, so `None` and the
/// empty string are both accepted as "not present".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub public_key: String,
    #[serde(default)]
    pub contract_id: Option<String>,
    #[serde(default)]
    pub link_name: Option<String>,
}

impl EntityRef {
    /// Reference an actor by public key
    pub fn actor(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            contract_id: None,
            link_name: None,
        }
    }

    /// Reference a capability provider
    pub fn provider(
        public_key: impl Into<String>,
        contract_id: impl Into<String>,
        link_name: impl Into<String>,
    ) -> Self {
        Self {
            public_key: public_key.into(),
            contract_id: Some(contract_id.into()),
            link_name: Some(link_name.into()),
        }
    }

    /// True when this entity is an actor rather than a capability provider
    pub fn is_actor(&self) -> bool {
        self.contract_id().is_none() && self.link_name().is_none()
    }

    /// The contract id, normalised: empty strings read as absent
    pub fn contract_id(&self) -> Option<&str> {
        self.contract_id.as_deref().filter(|c| !c.is_empty())
    }

    /// The link name, normalised: empty strings read as absent
    pub fn link_name(&self) -> Option<&str> {
        self.link_name.as_deref().filter(|l| !l.is_empty())
    }
}

/// A signed RPC invocation received from the lattice bus
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Invocation {
    /// Unique invocation id; also the object-store key for chunked requests
    pub id: String,
    pub origin: EntityRef,
    pub target: EntityRef,
    pub operation: String,
    /// Inline payload; empty when the real payload lives in the object store
    #[serde(default)]
    pub msg: Bytes,
    /// True payload size; greater than `msg.len()` when chunked
    #[serde(default)]
    pub content_length: u64,
}

impl Invocation {
    /// Decode an invocation from its msgpack wire form
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|_| Error::InvocationDeserialization)
    }

    /// Encode this invocation to its msgpack wire form
    pub fn to_msgpack(&self) -> Result<Bytes> {
        let buf = rmp_serde::to_vec_named(self)
            .map_err(|e| Error::serialization_failed(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    /// True when the payload was externalised and must be dechunked
    pub fn needs_dechunk(&self) -> bool {
        self.content_length > self.msg.len() as u64
    }

    /// Validate the envelope fields
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() || self.id.len() > INVOCATION_ID_LENGTH_BYTES_MAX {
            return Err(Error::InvocationDeserialization);
        }
        if self.operation.is_empty() || self.operation.len() > OPERATION_LENGTH_BYTES_MAX {
            return Err(Error::InvocationDeserialization);
        }
        if self.target.public_key.is_empty() {
            return Err(Error::InvocationDeserialization);
        }
        Ok(())
    }
}

/// The reply produced for every accepted invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvocationResponse {
    pub invocation_id: String,
    pub instance_id: String,
    /// Inline payload; blanked when externalised under `"{invocation_id}-r"`
    #[serde(default)]
    pub msg: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True payload size, preserved even when `msg` was externalised
    #[serde(default)]
    pub content_length: u64,
}

impl InvocationResponse {
    /// A successful response carrying the runtime's payload
    pub fn success(
        invocation_id: impl Into<String>,
        instance_id: impl Into<String>,
        msg: Bytes,
    ) -> Self {
        let content_length = msg.len() as u64;
        Self {
            invocation_id: invocation_id.into(),
            instance_id: instance_id.into(),
            msg,
            error: None,
            content_length,
        }
    }

    /// A failure response carrying an error string and no payload
    pub fn failure(
        invocation_id: impl Into<String>,
        instance_id: impl Into<String>,
        error: impl ToString,
    ) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            instance_id: instance_id.into(),
            msg: Bytes::new(),
            error: Some(error.to_string()),
            content_length: 0,
        }
    }

    /// Decode a response from its msgpack wire form
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|_| Error::InvocationDeserialization)
    }

    /// Encode this response to its msgpack wire form
    pub fn to_msgpack(&self) -> Result<Bytes> {
        let buf = rmp_serde::to_vec_named(self)
            .map_err(|e| Error::serialization_failed(e.to_string()))?;
        Ok(Bytes::from(buf))
    }
}

/// Object-store key under which a chunked response payload is stored
pub fn response_chunk_key(invocation_id: &str) -> String {
    debug_assert!(!invocation_id.is_empty(), "invocation id must not be empty");
    format!("{invocation_id}{RESPONSE_CHUNK_KEY_SUFFIX}")
}
