//! Selkie Host
//!
//! The actor instance controller: per-module tasks that receive signed RPC
//! invocations from the lattice bus, gate them through anti-forgery,
//! capability, and policy checks, materialise chunked payloads, invoke the
//! shared wasm runtime, and publish lifecycle and invocation-result cloud
//! events.
//!
//! # Architecture
//!
//! ```text
//!  bus frame ──> trace bridge ──> pipeline ──┬──> wasm runtime
//!                                   │        └──> chunk store
//!                              state cell
//!                                   │
//!  lifecycle cmds ──> instance mailbox ──> event publisher ──> bus topics
//! ```
//!
//! Each instance is a single mailbox-serialised task; introspection reads a
//! shared state cell so queries never queue behind invocations. External
//! collaborators (runtime, stores, policy, bus) are consumed through the
//! traits in [`services`], with in-memory implementations in [`mem`] for
//! local hosts and tests.

pub mod config;
pub mod events;
pub mod host;
pub mod instance;
pub mod mem;
pub mod mock;
pub(crate) mod pipeline;
pub mod registry;
pub mod services;
pub mod state;
pub mod trace;

pub use config::HostConfig;
pub use events::{CloudEvent, EventPublisher};
pub use host::{HostContext, HostContextBuilder};
pub use instance::{ActorInstance, LiveUpdate, StartActor};
pub use registry::{InstanceRegistry, RegistrationGuard, IMAGE_REF_UNKNOWN, INSTANCE_ID_UNKNOWN};
pub use services::{
    ArtifactRef, ChunkStore, ClaimsStore, EventBus, PolicyEntity, PolicyEvaluator, PolicyRequest,
    PolicyVerdict, ReferenceMap, RpcSubscriptions, WasmRuntime,
};
pub use state::{CurrentInvocation, InstanceMeta, StateCell};
