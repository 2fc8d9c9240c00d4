//! Telemetry bootstrap
//!
//! Structured logging for host processes: a tracing-subscriber pipeline
//! with an env-driven filter, plus optional OTLP span export behind the
//! `otel` feature. Trace *propagation* does not go through this module —
//! the host extracts and injects per-invocation context whether or not an
//! exporter is installed.

use crate::error::{Error, Result};

/// Where exported spans go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceExport {
    /// Log locally only; no span export
    None,
    /// Export spans over OTLP gRPC to the given endpoint
    Otlp { endpoint: String },
}

impl TraceExport {
    /// Resolve the export target from `OTEL_EXPORTER_OTLP_ENDPOINT`
    pub fn from_env() -> Self {
        match std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            Ok(endpoint) if !endpoint.is_empty() => Self::Otlp { endpoint },
            _ => Self::None,
        }
    }
}

/// Telemetry bootstrap for a host process
///
/// ```rust,ignore
/// let _guard = Telemetry::from_env().install()?;
/// ```
#[derive(Debug, Clone)]
pub struct Telemetry {
    service_name: String,
    export: TraceExport,
    default_filter: String,
}

impl Telemetry {
    /// Local-only telemetry for the given service
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            export: TraceExport::None,
            default_filter: "info".to_string(),
        }
    }

    /// Resolve service name (`OTEL_SERVICE_NAME`) and export target from
    /// the environment
    pub fn from_env() -> Self {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "selkie".to_string());
        Self {
            export: TraceExport::from_env(),
            ..Self::new(service_name)
        }
    }

    /// Set the span export target
    pub fn with_export(mut self, export: TraceExport) -> Self {
        self.export = export;
        self
    }

    /// Filter directives used when `RUST_LOG` is unset
    pub fn with_default_filter(mut self, directives: impl Into<String>) -> Self {
        self.default_filter = directives.into();
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn export(&self) -> &TraceExport {
        &self.export
    }

    /// Install the global subscriber
    ///
    /// Returns a guard that flushes exported spans on drop. Requesting OTLP
    /// export without the `otel` feature compiled in is a configuration
    /// error, not a silent downgrade.
    pub fn install(self) -> Result<TelemetryGuard> {
        match self.export.clone() {
            TraceExport::None => self.install_local(),
            TraceExport::Otlp { endpoint } => self.install_exporting(endpoint),
        }
    }

    fn filter(&self) -> tracing_subscriber::EnvFilter {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.default_filter))
    }

    fn install_local(&self) -> Result<TelemetryGuard> {
        use tracing_subscriber::prelude::*;

        tracing_subscriber::registry()
            .with(self.filter())
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| Error::internal(format!("subscriber install failed: {e}")))?;

        Ok(TelemetryGuard { exporting: false })
    }

    #[cfg(feature = "otel")]
    fn install_exporting(&self, endpoint: String) -> Result<TelemetryGuard> {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::propagation::TraceContextPropagator;
        use tracing_subscriber::prelude::*;

        // W3C context propagation for everything downstream of this host
        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

        let resource = opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
            "service.name",
            self.service_name.clone(),
        )]);

        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(&endpoint),
            )
            .with_trace_config(
                opentelemetry_sdk::trace::Config::default().with_resource(resource),
            )
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .map_err(|e| Error::internal(format!("OTLP pipeline install failed: {e}")))?;

        tracing_subscriber::registry()
            .with(self.filter())
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .try_init()
            .map_err(|e| Error::internal(format!("subscriber install failed: {e}")))?;

        tracing::info!(
            service = %self.service_name,
            endpoint = %endpoint,
            "Span export enabled"
        );

        Ok(TelemetryGuard { exporting: true })
    }

    #[cfg(not(feature = "otel"))]
    fn install_exporting(&self, endpoint: String) -> Result<TelemetryGuard> {
        let _ = endpoint;
        Err(Error::InvalidConfiguration {
            field: "export".into(),
            reason: "OTLP span export requires the `otel` feature".into(),
        })
    }
}

/// Flushes exported spans when dropped
#[derive(Debug)]
pub struct TelemetryGuard {
    exporting: bool,
}

impl TelemetryGuard {
    /// Whether an OTLP exporter is attached to this guard
    pub fn is_exporting(&self) -> bool {
        self.exporting
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        if self.exporting {
            opentelemetry::global::shutdown_tracer_provider();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_by_default() {
        let telemetry = Telemetry::new("selkie-host");
        assert_eq!(telemetry.service_name(), "selkie-host");
        assert_eq!(telemetry.export(), &TraceExport::None);
    }

    #[test]
    fn test_builder() {
        let telemetry = Telemetry::new("selkie-host")
            .with_export(TraceExport::Otlp {
                endpoint: "http://localhost:4317".into(),
            })
            .with_default_filter("debug");

        assert_eq!(
            telemetry.export(),
            &TraceExport::Otlp {
                endpoint: "http://localhost:4317".into()
            }
        );
    }

    #[test]
    fn test_local_install_yields_non_exporting_guard() {
        let guard = Telemetry::new("selkie-test").install().unwrap();
        assert!(!guard.is_exporting());
    }

    #[cfg(not(feature = "otel"))]
    #[test]
    fn test_otlp_without_feature_is_a_config_error() {
        let result = Telemetry::new("selkie-test")
            .with_export(TraceExport::Otlp {
                endpoint: "http://localhost:4317".into(),
            })
            .install();
        assert!(result.is_err());
    }
}
