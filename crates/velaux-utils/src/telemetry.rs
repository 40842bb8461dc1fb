/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # VelaUX Telemetry Module
//!
//! Installs the global `tracing` subscriber and, when enabled, an OpenTelemetry
//! OTLP exporter.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use velaux_utils::{telemetry, Settings};
//!
//! let settings = Settings::new(None)?;
//! telemetry::init(&settings.telemetry.resolve(), &settings.log.level, &settings.log.format)?;
//!
//! tracing::info!("sync service started");
//! ```

use crate::config::ResolvedTelemetry;
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::Sampler;
use opentelemetry_sdk::{runtime, Resource};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Error type for telemetry initialization
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to create OTLP exporter
    #[error("OTLP exporter error: {0}")]
    ExporterError(String),
    /// Failed to set global subscriber
    #[error("Subscriber error: {0}")]
    SubscriberError(String),
}

/// Maps a sampling rate onto the sampler the SDK should use.
fn sampler_for(rate: f64) -> Sampler {
    if rate >= 1.0 {
        Sampler::AlwaysOn
    } else if rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(rate)
    }
}

/// Initialize tracing with the given configuration.
///
/// If telemetry is disabled in the config, only the formatting subscriber is
/// installed.
///
/// # Arguments
/// * `config` - Resolved telemetry configuration
/// * `log_level` - Log level filter string (e.g., "info", "debug"); `RUST_LOG` wins when set
/// * `log_format` - Log format ("text" or "json")
pub fn init(
    config: &ResolvedTelemetry,
    log_level: &str,
    log_format: &str,
) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let json = log_format.eq_ignore_ascii_case("json");

    if !config.enabled {
        let subscriber = tracing_subscriber::registry().with(env_filter);
        let result = if json {
            subscriber
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
        } else {
            subscriber.with(tracing_subscriber::fmt::layer()).try_init()
        };
        return result.map_err(|e| TelemetryError::SubscriberError(e.to_string()));
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()
        .map_err(|e| TelemetryError::ExporterError(e.to_string()))?;

    let tracer_provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_sampler(sampler_for(config.sampling_rate))
        .with_resource(Resource::new(vec![
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                config.service_name.clone(),
            ),
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            ),
        ]))
        .build();

    let tracer = tracer_provider.tracer(config.service_name.clone());
    opentelemetry::global::set_tracer_provider(tracer_provider);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    let result = if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        subscriber.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| TelemetryError::SubscriberError(e.to_string()))
}

/// Shutdown OpenTelemetry, flushing any pending traces.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}

/// Re-export tracing macros for convenience
pub mod prelude {
    pub use tracing::Instrument;
    pub use tracing::{debug, error, info, trace, warn};
    pub use tracing::{instrument, span, Level};
}
