//! Distributed trace-context bridge
//!
//! Inbound bus frames may carry a W3C `traceparent` header; when present,
//! the remote context becomes the parent of this instance's handler span,
//! otherwise any ambient context is cleared. The context is re-serialised
//! into an opaque blob for the wasm runtime call so guest-side calls can
//! continue the trace.

use std::collections::HashMap;

use bytes::Bytes;
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::Context;
use opentelemetry_sdk::propagation::TraceContextPropagator;

/// Header key that carries the W3C trace context
pub const TRACEPARENT_HEADER: &str = "traceparent";

struct HeaderExtractor<'a>(&'a [(String, String)]);

impl<'a> Extractor for HeaderExtractor<'a> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.iter().map(|(k, _)| k.as_str()).collect()
    }
}

struct MapInjector(HashMap<String, String>);

impl Injector for MapInjector {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }
}

/// Reconstitute the trace context carried by a frame's header list
///
/// Returns the empty (cleared) context when no `traceparent` header is
/// present, so stale ambient context never leaks across invocations.
pub fn context_from_headers(headers: &[(String, String)]) -> Context {
    let has_traceparent = headers
        .iter()
        .any(|(k, _)| k.eq_ignore_ascii_case(TRACEPARENT_HEADER));

    if !has_traceparent {
        return Context::new();
    }

    TraceContextPropagator::new().extract(&HeaderExtractor(headers))
}

/// Serialise a trace context into the opaque blob passed to the runtime
pub fn serialize_context(cx: &Context) -> Bytes {
    let mut injector = MapInjector(HashMap::new());
    TraceContextPropagator::new().inject_context(cx, &mut injector);

    match rmp_serde::to_vec(&injector.0) {
        Ok(buf) => Bytes::from(buf),
        Err(_) => Bytes::new(),
    }
}

/// Decode a serialised trace blob back into header pairs
///
/// Used by runtime implementations and tests; the controller itself only
/// produces blobs.
pub fn headers_from_blob(blob: &[u8]) -> Vec<(String, String)> {
    let map: HashMap<String, String> = match rmp_serde::from_slice(blob) {
        Ok(map) => map,
        Err(_) => return Vec::new(),
    };
    map.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::TraceContextExt;

    const SAMPLE_TRACEPARENT: &str = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

    #[test]
    fn test_extracts_remote_context() {
        let headers = vec![(TRACEPARENT_HEADER.to_string(), SAMPLE_TRACEPARENT.to_string())];
        let cx = context_from_headers(&headers);
        assert!(cx.span().span_context().is_valid());
        assert_eq!(
            cx.span().span_context().trace_id().to_string(),
            "0af7651916cd43dd8448eb211c80319c"
        );
    }

    #[test]
    fn test_header_key_is_case_insensitive() {
        let headers = vec![("TraceParent".to_string(), SAMPLE_TRACEPARENT.to_string())];
        let cx = context_from_headers(&headers);
        assert!(cx.span().span_context().is_valid());
    }

    #[test]
    fn test_absent_traceparent_clears_context() {
        let headers = vec![("content-type".to_string(), "application/msgpack".to_string())];
        let cx = context_from_headers(&headers);
        assert!(!cx.span().span_context().is_valid());

        let cx = context_from_headers(&[]);
        assert!(!cx.span().span_context().is_valid());
    }

    #[test]
    fn test_context_blob_roundtrip() {
        let headers = vec![(TRACEPARENT_HEADER.to_string(), SAMPLE_TRACEPARENT.to_string())];
        let cx = context_from_headers(&headers);

        let blob = serialize_context(&cx);
        assert!(!blob.is_empty());

        let decoded = headers_from_blob(&blob);
        let traceparent = decoded
            .iter()
            .find(|(k, _)| k == TRACEPARENT_HEADER)
            .map(|(_, v)| v.as_str())
            .unwrap();
        assert!(traceparent.contains("0af7651916cd43dd8448eb211c80319c"));
    }

    #[test]
    fn test_empty_context_blob() {
        let blob = serialize_context(&Context::new());
        // An empty context injects no headers
        assert!(headers_from_blob(&blob).is_empty());
    }
}
