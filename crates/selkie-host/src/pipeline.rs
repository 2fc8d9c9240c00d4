//! Invocation pipeline
//!
//! A fixed-stage pipeline over each inbound RPC frame: unpack, anti-forgery,
//! source/target capability, policy, dechunk, invoke, response chunking.
//! Stages thread `Result<_, InvocationResponse>` so the first failed gate
//! short-circuits the rest; a response is produced on every path and the
//! runtime is only reached when all three gates passed.

use bytes::Bytes;
use opentelemetry::Context;
use tracing::{debug, warn};

use selkie_core::claims::Claims;
use selkie_core::constants::{CHUNK_THRESHOLD_BYTES, POLICY_ACTION_PERFORM_INVOCATION};
use selkie_core::error::Error;
use selkie_core::invocation::{response_chunk_key, EntityRef, Invocation, InvocationResponse};

use crate::host::HostContext;
use crate::services::{PolicyRequest, PolicyVerdict};
use crate::state::StateCell;
use crate::trace;

/// What the result event needs to know about an invocation
///
/// Defaults cover frames that failed to decode: the result event is still
/// published, with empty entities.
#[derive(Debug, Clone, Default)]
pub(crate) struct InvocationMeta {
    pub origin: EntityRef,
    pub target: EntityRef,
    pub operation: String,
    pub request_bytes: u64,
}

impl From<&Invocation> for InvocationMeta {
    fn from(inv: &Invocation) -> Self {
        Self {
            origin: inv.origin.clone(),
            target: inv.target.clone(),
            operation: inv.operation.clone(),
            request_bytes: inv.content_length.max(inv.msg.len() as u64),
        }
    }
}

/// Run one frame through the pipeline
///
/// Always returns a response; the caller publishes the result event and
/// replies on the bus.
pub(crate) async fn dispatch(
    host: &HostContext,
    state: &StateCell,
    body: &Bytes,
    parent_cx: &Context,
) -> (InvocationResponse, InvocationMeta) {
    let instance_id = state.instance_id();

    // S1: unpack the self-describing binary body
    let mut inv = match unpack(body) {
        Ok(inv) => inv,
        Err(e) => {
            warn!(instance_id, error = %e, "Dropped undecodable invocation frame");
            return (
                InvocationResponse::failure("", instance_id, e),
                InvocationMeta::default(),
            );
        }
    };

    tracing::Span::current().record("invocation_id", tracing::field::display(&inv.id));
    let meta = InvocationMeta::from(&inv);
    state.begin_invocation(&inv.id, &inv.operation).await;

    let response = match run_gated(host, state, body, &mut inv, parent_cx).await {
        Ok(response) | Err(response) => response,
    };

    state.clear_invocation().await;
    (response, meta)
}

/// Gates and invocation; an `Err` is the short-circuited failure reply
async fn run_gated(
    host: &HostContext,
    state: &StateCell,
    body: &Bytes,
    inv: &mut Invocation,
    parent_cx: &Context,
) -> Result<InvocationResponse, InvocationResponse> {
    check_anti_forgery(host, state, body, inv).await?;
    check_source_capability(state, inv)?;
    check_policy(host, state, inv).await?;

    // S5: dechunk is only reached once every gate passed
    materialize_payload(host, inv).await;

    Ok(invoke_runtime(host, state, inv, parent_cx).await)
}

fn unpack(body: &Bytes) -> Result<Invocation, Error> {
    let inv = Invocation::from_msgpack(body)?;
    inv.validate()?;
    Ok(inv)
}

/// S2: signature validation against the trusted cluster issuers
async fn check_anti_forgery(
    host: &HostContext,
    state: &StateCell,
    body: &Bytes,
    inv: &Invocation,
) -> Result<(), InvocationResponse> {
    match host
        .runtime
        .validate_anti_forgery(body, &host.config.cluster_issuers)
        .await
    {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!(invocation_id = %inv.id, error = %e, "Anti-forgery validation failed");
            Err(InvocationResponse::failure(
                &inv.id,
                state.instance_id(),
                Error::anti_forgery(e.to_string()),
            ))
        }
    }
}

/// S3: a capability-provider origin must be claimed by the target actor
///
/// An origin carrying neither contract id nor link name is another actor
/// and passes unconditionally.
fn check_source_capability(
    state: &StateCell,
    inv: &Invocation,
) -> Result<(), InvocationResponse> {
    if inv.origin.is_actor() {
        return Ok(());
    }

    // A provider origin without a contract id (link name only) cannot match
    // any claim and is rejected with an empty contract in the reply.
    let claimed = match inv.origin.contract_id() {
        Some(contract_id) => state.meta().claims.has_capability(contract_id),
        None => false,
    };
    let contract_id = inv.origin.contract_id().unwrap_or_default();

    if claimed {
        return Ok(());
    }

    debug!(
        invocation_id = %inv.id,
        contract_id,
        "Origin capability not claimed by target actor"
    );
    Err(InvocationResponse::failure(
        &inv.id,
        state.instance_id(),
        Error::capability_mismatch(contract_id),
    ))
}

/// S4: claims lookups, source expiry, and the policy evaluator
///
/// Lookup failures, expired source claims, evaluator errors, and explicit
/// denials all produce the same policy rejection reply.
async fn check_policy(
    host: &HostContext,
    state: &StateCell,
    inv: &Invocation,
) -> Result<(), InvocationResponse> {
    let denied = || {
        InvocationResponse::failure(&inv.id, state.instance_id(), Error::PolicyDenied)
    };

    let prefix = &host.config.lattice_prefix;

    let source_claims: Claims = match host.claims.lookup(prefix, &inv.origin.public_key).await {
        Ok(claims) => claims,
        Err(e) => {
            warn!(invocation_id = %inv.id, error = %e, "Source claims lookup failed");
            return Err(denied());
        }
    };

    let target_claims: Claims = match host.claims.lookup(prefix, &inv.target.public_key).await {
        Ok(claims) => claims,
        Err(e) => {
            warn!(invocation_id = %inv.id, error = %e, "Target claims lookup failed");
            return Err(denied());
        }
    };

    if source_claims.is_expired(host.time.now_ms()) {
        warn!(
            invocation_id = %inv.id,
            source = %inv.origin.public_key,
            "Source claims expired"
        );
        return Err(denied());
    }

    let request = PolicyRequest {
        host_id: host.config.host_id.clone(),
        lattice_prefix: prefix.clone(),
        labels: host.config.labels.clone(),
        source: (&source_claims).into(),
        target: (&target_claims).into(),
        action: POLICY_ACTION_PERFORM_INVOCATION.to_string(),
    };

    match host.policy.evaluate(request).await {
        Ok(PolicyVerdict::Permitted) | Ok(PolicyVerdict::EvaluationDisabled) => Ok(()),
        Ok(PolicyVerdict::Denied) => {
            debug!(invocation_id = %inv.id, "Policy evaluator denied invocation");
            Err(denied())
        }
        Err(e) => {
            warn!(invocation_id = %inv.id, error = %e, "Policy evaluator errored, denying");
            Err(denied())
        }
    }
}

/// S5: fetch an externalised request payload from the object store
///
/// Best-effort: on failure the payload is substituted with empty bytes and
/// the runtime's resulting error is the observable outcome.
async fn materialize_payload(host: &HostContext, inv: &mut Invocation) {
    if !inv.needs_dechunk() {
        return;
    }

    match host.chunks.dechunk(&inv.id).await {
        Ok(bytes) => {
            debug!(
                invocation_id = %inv.id,
                bytes = bytes.len(),
                "Materialized chunked request payload"
            );
            inv.msg = bytes;
        }
        Err(e) => {
            warn!(
                invocation_id = %inv.id,
                error = %e,
                "Dechunk failed, proceeding with empty payload"
            );
            inv.msg = Bytes::new();
        }
    }
}

/// S6: call the runtime and apply the response chunk rule
async fn invoke_runtime(
    host: &HostContext,
    state: &StateCell,
    inv: &Invocation,
    parent_cx: &Context,
) -> InvocationResponse {
    let artifact = state.actor_reference().await;
    let trace_blob = trace::serialize_context(parent_cx);

    // The instance health flag tracks the most recent runtime outcome;
    // host-side gate denials never touch it.
    match host
        .runtime
        .invoke(&artifact, &inv.operation, inv.msg.clone(), trace_blob)
        .await
    {
        Ok(bytes) => {
            state.set_healthy(true).await;
            let mut response = InvocationResponse::success(&inv.id, state.instance_id(), bytes);
            chunk_response(host, &mut response).await;
            response
        }
        Err(e) => {
            state.set_healthy(false).await;
            InvocationResponse::failure(&inv.id, state.instance_id(), e)
        }
    }
}

/// Externalise an oversized response payload
///
/// A store failure leaves the payload inline; `content_length` always keeps
/// the true size.
async fn chunk_response(host: &HostContext, response: &mut InvocationResponse) {
    if response.msg.len() <= CHUNK_THRESHOLD_BYTES {
        return;
    }

    let key = response_chunk_key(&response.invocation_id);
    match host.chunks.chunk(&key, response.msg.clone()).await {
        Ok(()) => {
            debug!(
                invocation_id = %response.invocation_id,
                bytes = response.content_length,
                "Externalized oversized response payload"
            );
            response.msg = Bytes::new();
        }
        Err(e) => {
            warn!(
                invocation_id = %response.invocation_id,
                error = %e,
                "Failed to externalize response payload, leaving inline"
            );
        }
    }
}
