//! End-to-end invocation tests
//!
//! Frames delivered to a running instance through its mailbox, asserting
//! the reply records, gate behavior, chunk handling, and result events.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use selkie_core::claims::Claims;
use selkie_core::constants::CHUNK_THRESHOLD_BYTES;
use selkie_core::invocation::{EntityRef, Invocation, InvocationResponse};
use selkie_core::io::ManualTime;
use selkie_host::events::{INVOCATION_FAILED, INVOCATION_SUCCEEDED};
use selkie_host::mem::{InMemoryChunkStore, InMemoryClaimsStore, RecordingEventBus, StaticPolicy};
use selkie_host::mock::MockRuntime;
use selkie_host::{ActorInstance, HostConfig, HostContext, PolicyVerdict, StartActor};

struct Harness {
    instance: ActorInstance,
    runtime: Arc<MockRuntime>,
    bus: Arc<RecordingEventBus>,
    chunks: Arc<InMemoryChunkStore>,
    claims_store: Arc<InMemoryClaimsStore>,
    policy: Arc<StaticPolicy>,
    time: Arc<ManualTime>,
}

fn claims_for(public_key: &str, caps: &[&str]) -> Claims {
    Claims {
        public_key: public_key.into(),
        issuer: "AISSUER".into(),
        caps: caps.iter().map(|c| c.to_string()).collect(),
        revision: 1,
        ..Default::default()
    }
}

async fn harness() -> Harness {
    let runtime = Arc::new(MockRuntime::new());
    let bus = Arc::new(RecordingEventBus::new());
    let chunks = Arc::new(InMemoryChunkStore::new());
    let claims_store = Arc::new(InMemoryClaimsStore::new());
    let policy = Arc::new(StaticPolicy::permit_all());
    let time = Arc::new(ManualTime::starting_at(1_700_000_000_000));

    let host = HostContext::builder(HostConfig::new("NHOST"))
        .with_runtime(runtime.clone())
        .with_bus(bus.clone())
        .with_chunks(chunks.clone())
        .with_claims(claims_store.clone())
        .with_policy(policy.clone())
        .with_time(time.clone())
        .build()
        .unwrap();

    // The caller's claims; the target's own claims are stored by start()
    claims_store.insert("default", claims_for("MCALLER", &[]));

    let instance = ActorInstance::start(
        host,
        StartActor {
            claims: claims_for("MTARGET", &["wasmcloud:keyvalue"]),
            bytes: Bytes::from_static(b"\0asm module"),
            image_ref: None,
            annotations: HashMap::new(),
        },
    )
    .await
    .unwrap();

    Harness {
        instance,
        runtime,
        bus,
        chunks,
        claims_store,
        policy,
        time,
    }
}

fn invocation(id: &str, origin: EntityRef, msg: &'static [u8]) -> Invocation {
    Invocation {
        id: id.into(),
        origin,
        target: EntityRef::actor("MTARGET"),
        operation: "Echo".into(),
        msg: Bytes::from_static(msg),
        content_length: msg.len() as u64,
    }
}

async fn deliver(h: &Harness, inv: &Invocation) -> InvocationResponse {
    let reply = h
        .instance
        .invoke(inv.to_msgpack().unwrap(), Vec::new())
        .await
        .unwrap();
    InvocationResponse::from_msgpack(&reply).unwrap()
}

fn result_events(h: &Harness) -> Vec<(String, selkie_host::CloudEvent)> {
    h.bus
        .events()
        .into_iter()
        .filter(|(_, e)| {
            e.event_type == INVOCATION_SUCCEEDED || e.event_type == INVOCATION_FAILED
        })
        .collect()
}

#[tokio::test]
async fn test_happy_path_invocation() {
    let h = harness().await;

    let inv = invocation("inv-1", EntityRef::actor("MCALLER"), b"hello");
    let response = deliver(&h, &inv).await;

    // Scenario 1: the reply carries what the runtime returned
    assert!(response.error.is_none());
    assert_eq!(response.msg, Bytes::from_static(b"hello"));
    assert_eq!(response.content_length, 5);
    assert_eq!(response.invocation_id, "inv-1");
    assert_eq!(response.instance_id, h.instance.instance_id());

    let events = result_events(&h);
    assert_eq!(events.len(), 1);
    let (topic, event) = &events[0];
    assert_eq!(topic, "wasmbus.rpcevt.default");
    assert_eq!(event.event_type, INVOCATION_SUCCEEDED);
    assert_eq!(event.data["bytes"], 5);
    assert_eq!(event.data["operation"], "Echo");
    assert_eq!(event.data["source"]["public_key"], "MCALLER");
    assert_eq!(event.data["dest"]["public_key"], "MTARGET");
}

#[tokio::test]
async fn test_chunked_request_reaches_runtime_in_full() {
    let h = harness().await;
    h.chunks.insert("inv-big", Bytes::from(vec![0x42; 2_000_000]));

    // Scenario 2: inline msg empty, content_length names the true size
    let mut inv = invocation("inv-big", EntityRef::actor("MCALLER"), b"");
    inv.content_length = 2_000_000;
    let response = deliver(&h, &inv).await;

    assert!(response.error.is_none());
    assert_eq!(h.runtime.invocations()[0].payload.len(), 2_000_000);
    assert_eq!(result_events(&h)[0].1.data["bytes"], 2_000_000);
}

#[tokio::test]
async fn test_chunked_response_is_externalised() {
    let h = harness().await;
    h.runtime.set_response(Bytes::from(vec![0x42; 1_500_000]));

    let inv = invocation("inv-1", EntityRef::actor("MCALLER"), b"hello");
    let response = deliver(&h, &inv).await;

    // Scenario 3 / P3: stored under "{id}-r", inline blank, size preserved
    assert!(response.error.is_none());
    assert!(response.msg.is_empty());
    assert_eq!(response.content_length, 1_500_000);
    assert_eq!(h.chunks.get("inv-1-r").unwrap().len(), 1_500_000);
    assert!(1_500_000 > CHUNK_THRESHOLD_BYTES);
}

#[tokio::test]
async fn test_capability_denied_provider_origin() {
    let h = harness().await;
    h.claims_store.insert("default", claims_for("VHTTP", &[]));

    let origin = EntityRef::provider("VHTTP", "wasmcloud:httpserver", "default");
    let inv = invocation("inv-1", origin, b"hello");
    let response = deliver(&h, &inv).await;

    // Scenario 4: exact error string, runtime never called
    assert_eq!(
        response.error.as_deref(),
        Some("Invocation source does not have the required capability claim wasmcloud:httpserver")
    );
    assert_eq!(h.runtime.invoke_count(), 0);
    assert_eq!(result_events(&h)[0].1.event_type, INVOCATION_FAILED);
}

#[tokio::test]
async fn test_provider_origin_with_claimed_contract_passes() {
    let h = harness().await;
    h.claims_store.insert("default", claims_for("VKV", &[]));

    let origin = EntityRef::provider("VKV", "wasmcloud:keyvalue", "default");
    let inv = invocation("inv-1", origin, b"hello");
    let response = deliver(&h, &inv).await;

    // P5: permitted iff the target claims the contract
    assert!(response.error.is_none());
    assert_eq!(h.runtime.invoke_count(), 1);
}

#[tokio::test]
async fn test_policy_denial_emits_failed_event() {
    let h = harness().await;
    h.policy.set_verdict(PolicyVerdict::Denied);

    let inv = invocation("inv-1", EntityRef::actor("MCALLER"), b"hello");
    let response = deliver(&h, &inv).await;

    // Scenario 5
    assert_eq!(
        response.error.as_deref(),
        Some("Policy evaluation rejected invocation attempt")
    );
    assert_eq!(h.runtime.invoke_count(), 0);
    assert_eq!(result_events(&h)[0].1.event_type, INVOCATION_FAILED);
}

#[tokio::test]
async fn test_expired_source_claims_denied() {
    let h = harness().await;
    let mut expired = claims_for("MCALLER", &[]);
    expired.expires_ms = Some(1_700_000_000_000);
    h.claims_store.insert("default", expired);

    // The clock sits exactly at the expiry instant
    let inv = invocation("inv-1", EntityRef::actor("MCALLER"), b"hello");
    let response = deliver(&h, &inv).await;

    // P6: denied even though the evaluator would permit
    assert!(response.error.is_some());
    assert_eq!(h.policy.eval_count(), 0);
    assert_eq!(h.runtime.invoke_count(), 0);

    // Rewind below the expiry and the same invocation passes
    h.time.set_ms(1_699_999_999_000);
    let response = deliver(&h, &inv).await;
    assert!(response.error.is_none());
}

#[tokio::test]
async fn test_anti_forgery_failure() {
    let h = harness().await;
    h.runtime.set_anti_forgery_failure("signature mismatch");

    let inv = invocation("inv-1", EntityRef::actor("MCALLER"), b"hello");
    let response = deliver(&h, &inv).await;

    assert_eq!(
        response.error.as_deref(),
        Some("Anti-forgery check failed: signature mismatch")
    );
    assert_eq!(h.runtime.invoke_count(), 0);
}

#[tokio::test]
async fn test_undecodable_frame_still_replies_and_emits_event() {
    let h = harness().await;

    let reply = h
        .instance
        .invoke(Bytes::from_static(b"\xc1junk"), Vec::new())
        .await
        .unwrap();
    let response = InvocationResponse::from_msgpack(&reply).unwrap();

    // P2: one reply and one result event even for garbage frames
    assert_eq!(
        response.error.as_deref(),
        Some("Failed to deserialize invocation")
    );
    assert_eq!(result_events(&h).len(), 1);
    assert_eq!(result_events(&h)[0].1.event_type, INVOCATION_FAILED);
}

#[tokio::test]
async fn test_runtime_error_reply_and_event() {
    let h = harness().await;
    h.runtime.set_invoke_failure("guest trapped");

    let inv = invocation("inv-1", EntityRef::actor("MCALLER"), b"hello");
    let response = deliver(&h, &inv).await;

    assert_eq!(response.error.as_deref(), Some("guest trapped"));
    assert_eq!(response.content_length, 0);
    assert_eq!(result_events(&h)[0].1.event_type, INVOCATION_FAILED);
}

#[tokio::test]
async fn test_reply_totality_across_mixed_outcomes() {
    let h = harness().await;

    // P2: every delivered frame produces exactly one reply and one event
    let ok = invocation("inv-1", EntityRef::actor("MCALLER"), b"hello");
    deliver(&h, &ok).await;

    h.runtime.set_invoke_failure("guest trapped");
    let failed = invocation("inv-2", EntityRef::actor("MCALLER"), b"hello");
    deliver(&h, &failed).await;

    h.policy.set_verdict(PolicyVerdict::Denied);
    let denied = invocation("inv-3", EntityRef::actor("MCALLER"), b"hello");
    deliver(&h, &denied).await;

    let events = result_events(&h);
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].1.event_type, INVOCATION_SUCCEEDED);
    assert_eq!(events[1].1.event_type, INVOCATION_FAILED);
    assert_eq!(events[2].1.event_type, INVOCATION_FAILED);
}

#[tokio::test]
async fn test_current_invocation_cleared_between_frames() {
    let h = harness().await;

    assert!(h.instance.current_invocation().await.is_none());

    let inv = invocation("inv-1", EntityRef::actor("MCALLER"), b"hello");
    deliver(&h, &inv).await;

    // The in-flight record does not outlive the invocation
    assert!(h.instance.current_invocation().await.is_none());
}

#[tokio::test]
async fn test_trace_headers_flow_to_runtime_blob() {
    let h = harness().await;

    let inv = invocation("inv-1", EntityRef::actor("MCALLER"), b"hello");
    let headers = vec![(
        "traceparent".to_string(),
        "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01".to_string(),
    )];
    let reply = h
        .instance
        .invoke(inv.to_msgpack().unwrap(), headers)
        .await
        .unwrap();
    assert!(InvocationResponse::from_msgpack(&reply).unwrap().error.is_none());

    // The runtime received a serialised context carrying the trace id
    let blob = h.runtime.invocations()[0].trace_blob.clone();
    let decoded = selkie_host::trace::headers_from_blob(&blob);
    let traceparent = decoded
        .iter()
        .find(|(k, _)| k == "traceparent")
        .map(|(_, v)| v.clone())
        .unwrap();
    assert!(traceparent.contains("0af7651916cd43dd8448eb211c80319c"));

    // Without headers the blob carries no context
    let inv2 = invocation("inv-2", EntityRef::actor("MCALLER"), b"hello");
    deliver(&h, &inv2).await;
    let blob2 = h.runtime.invocations()[1].trace_blob.clone();
    assert!(selkie_host::trace::headers_from_blob(&blob2).is_empty());
}
