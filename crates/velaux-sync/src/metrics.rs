/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Metrics Module
//!
//! Prometheus metrics for the sync workers: event handling, pipeline latency,
//! cache size, queue depth and workflow record polling.

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all sync metrics
static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Application events handled by the consumer
/// Labels: kind (apply/delete), result (synced/deleted/skipped/error)
pub fn events_total() -> &'static CounterVec {
    static COUNTER: OnceLock<CounterVec> = OnceLock::new();
    COUNTER.get_or_init(|| {
        let opts = Opts::new(
            "velaux_sync_events_total",
            "Total number of Application events handled by the sync",
        );
        let counter = CounterVec::new(opts, &["kind", "result"])
            .expect("Failed to create sync events counter");
        registry()
            .register(Box::new(counter.clone()))
            .expect("Failed to register sync events counter");
        counter
    })
}

/// Duration of one convert-and-persist pipeline run
pub fn sync_duration_seconds() -> &'static HistogramVec {
    static HISTOGRAM: OnceLock<HistogramVec> = OnceLock::new();
    HISTOGRAM.get_or_init(|| {
        let opts = HistogramOpts::new(
            "velaux_sync_duration_seconds",
            "Application sync latency distribution in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]);
        let histogram =
            HistogramVec::new(opts, &[]).expect("Failed to create sync duration histogram");
        registry()
            .register(Box::new(histogram.clone()))
            .expect("Failed to register sync duration histogram");
        histogram
    })
}

/// Entries in the change-suppression cache
pub fn sync_cache_entries() -> &'static Gauge {
    static GAUGE: OnceLock<Gauge> = OnceLock::new();
    GAUGE.get_or_init(|| {
        let opts = Opts::new(
            "velaux_sync_cache_entries",
            "Number of applications in the sync cache",
        );
        let gauge = Gauge::with_opts(opts).expect("Failed to create sync cache gauge");
        registry()
            .register(Box::new(gauge.clone()))
            .expect("Failed to register sync cache gauge");
        gauge
    })
}

/// Apply events waiting in the queue
pub fn sync_queue_depth() -> &'static Gauge {
    static GAUGE: OnceLock<Gauge> = OnceLock::new();
    GAUGE.get_or_init(|| {
        let opts = Opts::new(
            "velaux_sync_queue_depth",
            "Number of Application events waiting to be synced",
        );
        let gauge = Gauge::with_opts(opts).expect("Failed to create queue depth gauge");
        registry()
            .register(Box::new(gauge.clone()))
            .expect("Failed to register queue depth gauge");
        gauge
    })
}

/// Workflow records visited by the record poller
/// Labels: result (updated/terminated/failed/error)
pub fn workflow_records_synced_total() -> &'static CounterVec {
    static COUNTER: OnceLock<CounterVec> = OnceLock::new();
    COUNTER.get_or_init(|| {
        let opts = Opts::new(
            "velaux_workflow_records_synced_total",
            "Total number of workflow records synced from the cluster",
        );
        let counter = CounterVec::new(opts, &["result"])
            .expect("Failed to create workflow record counter");
        registry()
            .register(Box::new(counter.clone()))
            .expect("Failed to register workflow record counter");
        counter
    })
}

/// Encodes all registered metrics in Prometheus text format
///
/// # Returns
///
/// Returns a String containing all metrics in Prometheus exposition format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
