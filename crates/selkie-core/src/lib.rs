//! Selkie Core
//!
//! Core types, errors, and constants for the Selkie actor host.
//!
//! # Overview
//!
//! Selkie hosts signed WebAssembly actors on a lattice: a logical network
//! over which invocations, claims, and lifecycle events travel. This crate
//! carries everything the host and its collaborators agree on at the wire
//! level — the claims bundle embedded in signed modules, the msgpack
//! invocation records, the error vocabulary, and the explicit limits.
//!
//! # TigerStyle
//!
//! This crate follows [TigerStyle](https://github.com/tigerbeetle/tigerbeetle/blob/main/docs/TIGER_STYLE.md)
//! engineering principles:
//! - Safety > Performance > Developer Experience
//! - Explicit limits with big-endian naming (e.g., `CHUNK_THRESHOLD_BYTES`)
//! - Errors are returned, never panics, outside tests

pub mod claims;
pub mod constants;
pub mod error;
pub mod invocation;
pub mod io;
pub mod telemetry;

pub use claims::Claims;
pub use constants::*;
pub use error::{Error, Result};
pub use invocation::{response_chunk_key, EntityRef, Invocation, InvocationResponse};
pub use io::{ManualTime, TimeProvider, WallClockTime};
pub use telemetry::{Telemetry, TelemetryGuard, TraceExport};
