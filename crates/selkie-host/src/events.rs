//! Cloud-event publication
//!
//! Domain events are shaped into the standard cloud-event envelope and
//! published on lattice-scoped topics: lifecycle events on the default
//! prefix, invocation-result events on the dedicated rpc-event prefix.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use selkie_core::claims::Claims;
use selkie_core::constants::{CLOUD_EVENT_SPEC_VERSION, LIFECYCLE_EVENT_PREFIX, RPC_EVENT_PREFIX};
use selkie_core::error::Result;
use selkie_core::invocation::EntityRef;
use selkie_core::io::TimeProvider;

use crate::services::EventBus;

// Event types emitted by the instance controller
pub const ACTOR_STARTED: &str = "actor_started";
pub const ACTOR_STOPPED: &str = "actor_stopped";
pub const ACTOR_UPDATED: &str = "actor_updated";
pub const ACTOR_UPDATE_FAILED: &str = "actor_update_failed";
pub const ACTOR_START_FAILED: &str = "actor_start_failed";
pub const INVOCATION_SUCCEEDED: &str = "invocation_succeeded";
pub const INVOCATION_FAILED: &str = "invocation_failed";

/// The standard cloud-event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudEvent {
    pub specversion: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// The publishing host's id
    pub source: String,
    pub id: String,
    /// RFC 3339 timestamp
    pub time: String,
    pub data: Value,
}

impl CloudEvent {
    fn new(event_type: &str, host_id: &str, now_ms: u64, data: Value) -> Self {
        let time = chrono::DateTime::from_timestamp_millis(now_ms as i64)
            .unwrap_or_default()
            .to_rfc3339();

        Self {
            specversion: CLOUD_EVENT_SPEC_VERSION.to_string(),
            event_type: event_type.to_string(),
            source: host_id.to_string(),
            id: Uuid::new_v4().to_string(),
            time,
            data,
        }
    }
}

fn entity_record(entity: &EntityRef) -> Value {
    json!({
        "public_key": entity.public_key,
        "contract_id": entity.contract_id(),
        "link_name": entity.link_name(),
    })
}

/// Shapes domain events into cloud events and publishes them on the bus
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    time: Arc<dyn TimeProvider>,
    host_id: String,
    lattice_prefix: String,
}

impl EventPublisher {
    pub fn new(
        bus: Arc<dyn EventBus>,
        time: Arc<dyn TimeProvider>,
        host_id: impl Into<String>,
        lattice_prefix: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            time,
            host_id: host_id.into(),
            lattice_prefix: lattice_prefix.into(),
        }
    }

    /// Topic for lifecycle events
    pub fn lifecycle_topic(&self) -> String {
        format!("{LIFECYCLE_EVENT_PREFIX}.{}", self.lattice_prefix)
    }

    /// Topic for invocation-result events
    pub fn rpc_topic(&self) -> String {
        format!("{RPC_EVENT_PREFIX}.{}", self.lattice_prefix)
    }

    async fn publish(&self, topic: String, event_type: &str, data: Value) -> Result<()> {
        let event = CloudEvent::new(event_type, &self.host_id, self.time.now_ms(), data);
        let payload = serde_json::to_vec(&event)
            .map_err(|e| selkie_core::Error::serialization_failed(e.to_string()))?;
        self.bus.publish(&topic, Bytes::from(payload)).await
    }

    async fn publish_lifecycle(&self, event_type: &str, data: Value) -> Result<()> {
        self.publish(self.lifecycle_topic(), event_type, data).await
    }

    async fn publish_rpc(&self, event_type: &str, data: Value) -> Result<()> {
        self.publish(self.rpc_topic(), event_type, data).await
    }

    // =========================================================================
    // Lifecycle events
    // =========================================================================

    /// An instance started; carries the full public claims bundle
    pub async fn actor_started(
        &self,
        claims: &Claims,
        instance_id: &str,
        image_ref: Option<&str>,
        annotations: &std::collections::HashMap<String, String>,
    ) -> Result<()> {
        self.publish_lifecycle(
            ACTOR_STARTED,
            json!({
                "public_key": claims.public_key,
                "instance_id": instance_id,
                "image_ref": image_ref,
                "annotations": annotations,
                "claims": claims.public_record(),
            }),
        )
        .await
    }

    pub async fn actor_stopped(
        &self,
        public_key: &str,
        instance_id: &str,
        annotations: &std::collections::HashMap<String, String>,
    ) -> Result<()> {
        self.publish_lifecycle(
            ACTOR_STOPPED,
            json!({
                "public_key": public_key,
                "instance_id": instance_id,
                "annotations": annotations,
            }),
        )
        .await
    }

    pub async fn actor_updated(
        &self,
        public_key: &str,
        revision: i32,
        instance_id: &str,
    ) -> Result<()> {
        self.publish_lifecycle(
            ACTOR_UPDATED,
            json!({
                "public_key": public_key,
                "revision": revision,
                "instance_id": instance_id,
            }),
        )
        .await
    }

    pub async fn actor_update_failed(
        &self,
        public_key: &str,
        instance_id: &str,
        reason: &str,
    ) -> Result<()> {
        self.publish_lifecycle(
            ACTOR_UPDATE_FAILED,
            json!({
                "public_key": public_key,
                "instance_id": instance_id,
                "reason": reason,
            }),
        )
        .await
    }

    pub async fn actor_start_failed(&self, public_key: &str, reason: &str) -> Result<()> {
        self.publish_lifecycle(
            ACTOR_START_FAILED,
            json!({
                "public_key": public_key,
                "reason": reason,
            }),
        )
        .await
    }

    // =========================================================================
    // Invocation-result events
    // =========================================================================

    /// One result event per accepted invocation; `request_bytes` is the byte
    /// length of the request payload.
    pub async fn invocation_result(
        &self,
        source: &EntityRef,
        target: &EntityRef,
        operation: &str,
        request_bytes: u64,
        error: Option<&str>,
    ) -> Result<()> {
        let event_type = if error.is_none() {
            INVOCATION_SUCCEEDED
        } else {
            INVOCATION_FAILED
        };

        self.publish_rpc(
            event_type,
            json!({
                "source": entity_record(source),
                "dest": entity_record(target),
                "operation": operation,
                "bytes": request_bytes,
                "error": error,
            }),
        )
        .await
    }
}
