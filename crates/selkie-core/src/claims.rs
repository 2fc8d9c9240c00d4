//! Signed actor claims
//!
//! Claims are the metadata embedded in a signed wasm artifact: the module's
//! subject public key, the issuer that signed it, the capability contracts
//! it may be invoked with, and its validity window. The host extracts them
//! at start and treats them as immutable for the instance's lifetime.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Signed metadata extracted from a wasm artifact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject public key of the module
    pub public_key: String,
    /// Public key of the issuing account
    pub issuer: String,
    /// Friendly module name
    #[serde(default)]
    pub name: Option<String>,
    /// Optional call alias registered for this module
    #[serde(default)]
    pub call_alias: Option<String>,
    /// Capability contract ids this module may be linked against
    #[serde(default)]
    pub caps: Vec<String>,
    /// Arbitrary tags carried by the signature
    #[serde(default)]
    pub tags: Vec<String>,
    /// Monotonic revision of the signed artifact
    #[serde(default)]
    pub revision: i32,
    /// Human-readable version string
    #[serde(default)]
    pub version: Option<String>,
    /// Validity window start, milliseconds since epoch
    #[serde(default)]
    pub not_before_ms: Option<u64>,
    /// Validity window end, milliseconds since epoch
    #[serde(default)]
    pub expires_ms: Option<u64>,
}

impl Claims {
    /// Check whether this module claims the given capability contract
    pub fn has_capability(&self, contract_id: &str) -> bool {
        debug_assert!(!contract_id.is_empty(), "contract_id must not be empty");
        self.caps.iter().any(|c| c == contract_id)
    }

    /// Check whether the claims have expired at the given instant
    ///
    /// An expiry exactly at `now_ms` counts as expired.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.expires_ms {
            Some(exp) => exp <= now_ms,
            None => false,
        }
    }

    /// Check whether the claims are within their validity window
    pub fn is_valid_at(&self, now_ms: u64) -> bool {
        let started = self.not_before_ms.map(|nbf| nbf <= now_ms).unwrap_or(true);
        started && !self.is_expired(now_ms)
    }

    /// The public claims bundle published in lifecycle events
    ///
    /// Carries only public material. Seeds and other private key material
    /// never enter this type, so nothing needs redacting here; the explicit
    /// field list keeps it that way if the type grows.
    pub fn public_record(&self) -> serde_json::Value {
        json!({
            "public_key": self.public_key,
            "issuer": self.issuer,
            "name": self.name,
            "call_alias": self.call_alias,
            "caps": self.caps,
            "tags": self.tags,
            "revision": self.revision,
            "version": self.version,
            "not_before_ms": self.not_before_ms,
            "expires_ms": self.expires_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Claims {
        Claims {
            public_key: "MACTOR".into(),
            issuer: "AISSUER".into(),
            name: Some("echo".into()),
            caps: vec!["wasmcloud:keyvalue".into()],
            revision: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_has_capability() {
        let claims = sample();
        assert!(claims.has_capability("wasmcloud:keyvalue"));
        assert!(!claims.has_capability("wasmcloud:httpserver"));
    }

    #[test]
    fn test_expiry_boundary() {
        let mut claims = sample();
        assert!(!claims.is_expired(u64::MAX));

        claims.expires_ms = Some(1000);
        assert!(!claims.is_expired(999));
        // An expiry at exactly now counts as expired
        assert!(claims.is_expired(1000));
        assert!(claims.is_expired(1001));
    }

    #[test]
    fn test_validity_window() {
        let mut claims = sample();
        claims.not_before_ms = Some(500);
        claims.expires_ms = Some(1500);

        assert!(!claims.is_valid_at(499));
        assert!(claims.is_valid_at(500));
        assert!(claims.is_valid_at(1499));
        assert!(!claims.is_valid_at(1500));
    }

    #[test]
    fn test_public_record_fields() {
        let record = sample().public_record();
        assert_eq!(record["public_key"], "MACTOR");
        assert_eq!(record["issuer"], "AISSUER");
        assert_eq!(record["revision"], 3);
        assert_eq!(record["caps"][0], "wasmcloud:keyvalue");
    }
}
