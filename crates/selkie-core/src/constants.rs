//! TigerStyle constants for Selkie
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Payload Limits
// =============================================================================

/// Threshold above which a payload is externalised to the chunked object
/// store instead of travelling inline on the bus (900 KiB).
pub const CHUNK_THRESHOLD_BYTES: usize = 900 * 1024;

/// Suffix appended to an invocation id to form the response chunk key.
pub const RESPONSE_CHUNK_KEY_SUFFIX: &str = "-r";

/// Maximum length of an invocation operation name in bytes
pub const OPERATION_LENGTH_BYTES_MAX: usize = 256;

/// Maximum length of an invocation id in bytes
pub const INVOCATION_ID_LENGTH_BYTES_MAX: usize = 128;

// =============================================================================
// Instance Limits
// =============================================================================

/// Maximum depth of an instance mailbox
pub const INSTANCE_MAILBOX_DEPTH_MAX: usize = 1024;

/// Hard deadline for a live update, enforced on the outer caller (30 sec)
pub const LIVE_UPDATE_TIMEOUT_MS: u64 = 30 * 1000;

/// API version advertised by instances started by this host
pub const INSTANCE_API_VERSION: u32 = 1;

// =============================================================================
// Bus Conventions
// =============================================================================

/// Topic prefix for lifecycle cloud events
pub const LIFECYCLE_EVENT_PREFIX: &str = "wasmbus.evt";

/// Topic prefix for invocation-result cloud events
pub const RPC_EVENT_PREFIX: &str = "wasmbus.rpcevt";

/// Cloud-event envelope spec version
pub const CLOUD_EVENT_SPEC_VERSION: &str = "1.0";

/// Policy action string for invocation authorisation
pub const POLICY_ACTION_PERFORM_INVOCATION: &str = "perform_invocation";

// Compile-time assertions for constant validity
const _: () = {
    assert!(CHUNK_THRESHOLD_BYTES == 921_600);
    assert!(LIVE_UPDATE_TIMEOUT_MS >= 1000);
    assert!(INSTANCE_MAILBOX_DEPTH_MAX > 0);
    assert!(OPERATION_LENGTH_BYTES_MAX >= 64);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_threshold_is_900_kib() {
        assert_eq!(CHUNK_THRESHOLD_BYTES, 921_600);
    }

    #[test]
    fn test_limits_have_units_in_names() {
        // This test documents the naming convention:
        // byte limits end in _BYTES_, time limits in _MS_, depths in _MAX.
        let _: usize = CHUNK_THRESHOLD_BYTES;
        let _: u64 = LIVE_UPDATE_TIMEOUT_MS;
        let _: usize = INSTANCE_MAILBOX_DEPTH_MAX;
    }
}
