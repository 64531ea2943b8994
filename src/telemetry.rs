//! Logging setup and optional OTLP export.
//!
//! `CONCIERGE_LOG` takes an `EnvFilter` directive (default `info`).
//! `CONCIERGE_LOG_FORMAT=json` switches stderr output to JSON lines.
//! With the `otel` feature, traces and logs are also exported when
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

use std::fmt::Write as _;

use sha2::{Digest, Sha256};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

#[cfg(feature = "otel")]
use opentelemetry_sdk::{logs::SdkLoggerProvider, trace::SdkTracerProvider};

pub const LOG_ENV: &str = "CONCIERGE_LOG";
pub const LOG_FORMAT_ENV: &str = "CONCIERGE_LOG_FORMAT";
const SERVICE_NAME: &str = "concierge";

/// Flushes and shuts down exporters on drop. Hold it for the life of `main`.
#[must_use]
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    tracer: Option<SdkTracerProvider>,
    #[cfg(feature = "otel")]
    logger: Option<SdkLoggerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        {
            if let Some(provider) = self.tracer.take()
                && let Err(e) = provider.shutdown()
            {
                eprintln!("concierge: trace export shutdown failed: {e}");
            }
            if let Some(provider) = self.logger.take()
                && let Err(e) = provider.shutdown()
            {
                eprintln!("concierge: log export shutdown failed: {e}");
            }
        }
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// leave the first subscriber in place.
pub fn init() -> TelemetryGuard {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let output = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };
    let registry = tracing_subscriber::registry().with(output).with(filter);

    #[cfg(feature = "otel")]
    {
        use opentelemetry::trace::TracerProvider as _;
        use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;

        let (tracer, logger) = otlp_providers();
        let spans = tracer
            .as_ref()
            .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(SERVICE_NAME)));
        let records = logger.as_ref().map(OpenTelemetryTracingBridge::new);
        let _ = registry.with(spans).with(records).try_init();
        return TelemetryGuard { tracer, logger };
    }

    #[cfg(not(feature = "otel"))]
    {
        let _ = registry.try_init();
        TelemetryGuard {}
    }
}

#[cfg(feature = "otel")]
fn otlp_providers() -> (Option<SdkTracerProvider>, Option<SdkLoggerProvider>) {
    use opentelemetry_otlp::{LogExporter, SpanExporter};
    use opentelemetry_sdk::Resource;

    if std::env::var_os("OTEL_EXPORTER_OTLP_ENDPOINT").is_none() {
        return (None, None);
    }
    let resource = Resource::builder().with_service_name(SERVICE_NAME).build();

    let tracer = match SpanExporter::builder().with_http().build() {
        Ok(exporter) => Some(
            SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(resource.clone())
                .build(),
        ),
        Err(e) => {
            eprintln!("concierge: OTLP span exporter unavailable: {e}");
            None
        }
    };
    let logger = match LogExporter::builder().with_http().build() {
        Ok(exporter) => Some(
            SdkLoggerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(resource)
                .build(),
        ),
        Err(e) => {
            eprintln!("concierge: OTLP log exporter unavailable: {e}");
            None
        }
    };
    (tracer, logger)
}

/// Short stable tag for a contact id, so logs never carry phone numbers.
pub fn redact(contact: &str) -> String {
    let digest = Sha256::digest(contact.as_bytes());
    let mut tag = String::with_capacity(8);
    for byte in &digest[..4] {
        let _ = write!(tag, "{byte:02x}");
    }
    tag
}
