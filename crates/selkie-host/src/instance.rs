//! Actor instance controller
//!
//! One controller per running wasm module: a tokio task owning a bounded
//! command mailbox. Invocations, live updates, and halt are processed
//! strictly one at a time in arrival order; introspection reads the shared
//! state cell and never queues behind the mailbox.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, info_span, warn, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;
use uuid::Uuid;

use selkie_core::claims::Claims;
use selkie_core::constants::{INSTANCE_MAILBOX_DEPTH_MAX, LIVE_UPDATE_TIMEOUT_MS};
use selkie_core::error::{Error, Result};

use crate::events::EventPublisher;
use crate::host::HostContext;
use crate::pipeline;
use crate::registry::RegistrationGuard;
use crate::state::{CurrentInvocation, InstanceMeta, StateCell};
use crate::trace;

/// Everything a supervisor provides to start an actor
#[derive(Debug, Clone)]
pub struct StartActor {
    /// Claims extracted from the signed module
    pub claims: Claims,
    /// Raw wasm module bytes
    pub bytes: Bytes,
    /// Registry reference the module was loaded from, if any
    pub image_ref: Option<String>,
    /// Opaque annotations, passed through to lifecycle events
    pub annotations: HashMap<String, String>,
}

/// A request to replace the running module's bytecode
#[derive(Debug, Clone)]
pub struct LiveUpdate {
    /// Raw replacement module bytes
    pub bytes: Bytes,
    /// Claims of the replacement module (used for the revision in events)
    pub claims: Claims,
    /// Registry reference of the replacement, if any
    pub image_ref: Option<String>,
    /// Trace headers propagated from the control interface
    pub trace_headers: Vec<(String, String)>,
}

enum InstanceCommand {
    Invoke {
        body: Bytes,
        headers: Vec<(String, String)>,
        reply_tx: oneshot::Sender<Bytes>,
    },
    LiveUpdate {
        update: Box<LiveUpdate>,
        reply_tx: oneshot::Sender<()>,
    },
    Halt {
        reply_tx: oneshot::Sender<()>,
    },
}

/// Handle to a running actor instance
///
/// Cloneable; the instance task exits when halted. Introspection accessors
/// read the shared state cell directly.
#[derive(Clone)]
pub struct ActorInstance {
    command_tx: mpsc::Sender<InstanceCommand>,
    state: Arc<StateCell>,
}

impl ActorInstance {
    /// Start an actor instance
    ///
    /// Precompiles the module, persists claims, ensures the RPC
    /// subscription, records the reference-map entry, publishes
    /// `actor_started`, registers the instance, and spawns the mailbox
    /// loop. The started event is published before the instance accepts
    /// any invocation.
    ///
    /// # Errors
    /// On precompile failure an `actor_start_failed` event is published and
    /// no instance remains.
    pub async fn start(host: Arc<HostContext>, start: StartActor) -> Result<Self> {
        let public_key = start.claims.public_key.clone();
        if public_key.is_empty() {
            return Err(Error::internal("actor claims carry no public key"));
        }

        let config = &host.config;
        let lattice_prefix = config.lattice_prefix.clone();
        let events = host.event_publisher();

        let artifact = match host.runtime.precompile(start.bytes.clone()).await {
            Ok(artifact) => artifact,
            Err(e) => {
                error!(public_key = %public_key, error = %e, "Module precompilation failed");
                let _ = events.actor_start_failed(&public_key, &e.to_string()).await;
                return Err(e);
            }
        };

        let instance_id = Uuid::new_v4().to_string();

        host.claims
            .put(&config.host_id, &lattice_prefix, &start.claims)
            .await?;

        host.subscriptions
            .ensure_actor_subscription(&lattice_prefix, &public_key)
            .await?;

        if let Some(image_ref) = start.image_ref.as_deref().filter(|r| !r.is_empty()) {
            host.references.put_reference(image_ref, &public_key).await?;
        }

        events
            .actor_started(&start.claims, &instance_id, start.image_ref.as_deref(), &start.annotations)
            .await?;

        let meta = InstanceMeta::new(
            instance_id,
            start.claims,
            start.image_ref,
            start.annotations,
            config.host_id.clone(),
            lattice_prefix,
        );
        let state = Arc::new(StateCell::new(meta, artifact));
        let registration = host.registry.register(state.clone());

        let (command_tx, command_rx) = mpsc::channel(INSTANCE_MAILBOX_DEPTH_MAX);

        let inner = InstanceInner {
            host,
            state: state.clone(),
            events,
            _registration: registration,
        };
        tokio::spawn(run(inner, command_rx));

        info!(
            public_key = %public_key,
            instance_id = %state.instance_id(),
            "Actor instance started"
        );

        Ok(Self { command_tx, state })
    }

    /// Deliver a raw invocation frame and wait for the msgpack reply
    ///
    /// A full mailbox is reported immediately rather than queueing without
    /// bound.
    pub async fn invoke(&self, body: Bytes, headers: Vec<(String, String)>) -> Result<Bytes> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .try_send(InstanceCommand::Invoke {
                body,
                headers,
                reply_tx,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => Error::MailboxFull {
                    depth: INSTANCE_MAILBOX_DEPTH_MAX,
                    limit: INSTANCE_MAILBOX_DEPTH_MAX,
                },
                mpsc::error::TrySendError::Closed(_) => Error::InstanceStopped,
            })?;

        reply_rx.await.map_err(|_| Error::InstanceStopped)
    }

    /// Replace the running module's bytecode
    ///
    /// Blocks the mailbox for the duration of the update and always replies
    /// success once processed: a failed precompile keeps the prior artifact
    /// and publishes `actor_update_failed` instead of crashing. The outer
    /// deadline is 30 seconds.
    pub async fn live_update(&self, update: LiveUpdate) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        let deliver = async {
            self.command_tx
                .send(InstanceCommand::LiveUpdate {
                    update: Box::new(update),
                    reply_tx,
                })
                .await
                .map_err(|_| Error::InstanceStopped)?;
            reply_rx.await.map_err(|_| Error::InstanceStopped)
        };

        match tokio::time::timeout(Duration::from_millis(LIVE_UPDATE_TIMEOUT_MS), deliver).await {
            Ok(result) => result,
            Err(_) => Err(Error::OperationTimedOut {
                operation: "live_update".into(),
                timeout_ms: LIVE_UPDATE_TIMEOUT_MS,
            }),
        }
    }

    /// Stop the instance
    ///
    /// Publishes `actor_stopped` before the mailbox drains, then the task
    /// exits, releasing the registry entry and failing queued senders.
    /// Halting an instance that already stopped is a no-op.
    pub async fn halt(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        if self
            .command_tx
            .send(InstanceCommand::Halt { reply_tx })
            .await
            .is_err()
        {
            // Already stopped
            return Ok(());
        }

        let _ = reply_rx.await;
        Ok(())
    }

    // =========================================================================
    // Introspection (reads only the state cell)
    // =========================================================================

    pub fn instance_id(&self) -> &str {
        self.state.instance_id()
    }

    pub fn public_key(&self) -> &str {
        self.state.public_key()
    }

    pub fn claims(&self) -> &Claims {
        &self.state.meta().claims
    }

    pub fn image_ref(&self) -> Option<&str> {
        self.state.meta().image_ref.as_deref()
    }

    pub fn annotations(&self) -> &HashMap<String, String> {
        &self.state.meta().annotations
    }

    pub async fn current_invocation(&self) -> Option<CurrentInvocation> {
        self.state.current_invocation().await
    }

    pub async fn healthy(&self) -> bool {
        self.state.healthy().await
    }

    pub fn is_running(&self) -> bool {
        !self.command_tx.is_closed()
    }
}

struct InstanceInner {
    host: Arc<HostContext>,
    state: Arc<StateCell>,
    events: EventPublisher,
    _registration: RegistrationGuard,
}

async fn run(inner: InstanceInner, mut command_rx: mpsc::Receiver<InstanceCommand>) {
    while let Some(command) = command_rx.recv().await {
        match command {
            InstanceCommand::Invoke {
                body,
                headers,
                reply_tx,
            } => {
                let reply = handle_invocation(&inner, body, &headers).await;
                let _ = reply_tx.send(reply);
            }
            InstanceCommand::LiveUpdate { update, reply_tx } => {
                perform_live_update(&inner, *update).await;
                let _ = reply_tx.send(());
            }
            InstanceCommand::Halt { reply_tx } => {
                // Stopped event goes out before the mailbox drains
                if let Err(e) = inner
                    .events
                    .actor_stopped(
                        inner.state.public_key(),
                        inner.state.instance_id(),
                        &inner.state.meta().annotations,
                    )
                    .await
                {
                    warn!(
                        instance_id = %inner.state.instance_id(),
                        error = %e,
                        "Failed to publish stopped event"
                    );
                }
                let _ = reply_tx.send(());
                break;
            }
        }
    }

    info!(
        public_key = %inner.state.public_key(),
        instance_id = %inner.state.instance_id(),
        "Actor instance stopped"
    );
}

/// Process one invocation frame end to end
///
/// A reply is produced on every path and exactly one invocation-result
/// event is published.
async fn handle_invocation(
    inner: &InstanceInner,
    body: Bytes,
    headers: &[(String, String)],
) -> Bytes {
    let parent_cx = trace::context_from_headers(headers);

    let span = info_span!(
        "Handle Invocation",
        instance_id = %inner.state.instance_id(),
        public_key = %inner.state.public_key(),
        invocation_id = tracing::field::Empty,
    );
    span.set_parent(parent_cx.clone());

    async {
        let (response, meta) =
            pipeline::dispatch(&inner.host, &inner.state, &body, &parent_cx).await;

        if let Err(e) = inner
            .events
            .invocation_result(
                &meta.origin,
                &meta.target,
                &meta.operation,
                meta.request_bytes,
                response.error.as_deref(),
            )
            .await
        {
            warn!(error = %e, "Failed to publish invocation result event");
        }

        match response.to_msgpack() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Failed to encode invocation response");
                Bytes::new()
            }
        }
    }
    .instrument(span)
    .await
}

/// Swap the running artifact for freshly precompiled bytes
///
/// The mailbox is blocked for the duration. On failure the prior artifact
/// is retained and an `actor_update_failed` event is published; the command
/// still completes normally.
async fn perform_live_update(inner: &InstanceInner, update: LiveUpdate) {
    let parent_cx = trace::context_from_headers(&update.trace_headers);

    let span = info_span!(
        "Perform Live Update",
        public_key = %inner.state.public_key(),
        actor_ref = update.image_ref.as_deref().unwrap_or_default(),
        instance_id = %inner.state.instance_id(),
    );
    span.set_parent(parent_cx);

    async {
        let public_key = inner.state.public_key();
        let instance_id = inner.state.instance_id();

        if !inner.host.config.allow_live_updates {
            warn!(public_key, "Live updates are not allowed on this host");
            let _ = inner
                .events
                .actor_update_failed(
                    public_key,
                    instance_id,
                    "live updates are not allowed on this host",
                )
                .await;
            return;
        }

        match inner.host.runtime.precompile(update.bytes.clone()).await {
            Ok(new_artifact) => {
                let old = inner.state.replace_artifact(new_artifact).await;
                if let Err(e) = inner.host.runtime.release(old).await {
                    warn!(error = %e, %old, "Failed to release superseded artifact");
                }

                info!(
                    public_key,
                    instance_id,
                    revision = update.claims.revision,
                    "Live update applied"
                );
                let _ = inner
                    .events
                    .actor_updated(public_key, update.claims.revision, instance_id)
                    .await;
            }
            Err(e) => {
                error!(public_key, instance_id, error = %e, "Live update failed");
                let _ = inner
                    .events
                    .actor_update_failed(public_key, instance_id, &e.to_string())
                    .await;
            }
        }
    }
    .instrument(span)
    .await
}
