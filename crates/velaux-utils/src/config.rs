/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # VelaUX Config Module
//! This module provides the configuration framework shared by the VelaUX crates.
//!
//! # Variable Naming Convention
//!
//! - Struct fields use snake_case (e.g., `datastore`, `queue_capacity`)
//! - Environment variables use SCREAMING_SNAKE_CASE and are prefixed with "VELAUX__"
//!   (e.g., `VELAUX__DATASTORE__TYPE`)
//! - Configuration file keys use snake_case (e.g., `datastore.type`, `log.level`)
//!
//! # Configuration Overriding
//!
//! The configuration values are loaded and overridden in the following order (later sources take precedence):
//!
//! 1. Default values from the embedded `default.toml` file
//! 2. Values from an optional external configuration file (if provided)
//! 3. Environment variables
//!
//! # Available Environment Variables
//!
//! - `VELAUX__LOG__LEVEL`: Log level. Default: "info"
//! - `VELAUX__LOG__FORMAT`: "text" or "json". Default: "text"
//! - `VELAUX__DATASTORE__TYPE`: One of "kubeapi", "postgres", "memory". Default: "kubeapi"
//! - `VELAUX__DATASTORE__NAMESPACE`: Namespace holding the ConfigMap records of the kubeapi driver.
//!   Default: "vela-system"
//! - `VELAUX__DATASTORE__URL`: Connection URL of the postgres driver
//! - `VELAUX__DATASTORE__SCHEMA`: Optional PostgreSQL schema for the postgres driver
//! - `VELAUX__KUBERNETES__KUBECONFIG_PATH`: Optional kubeconfig path, in-cluster config otherwise
//! - `VELAUX__SYNC__QUEUE_CAPACITY`: Capacity of the application sync queue. Default: 1024
//! - `VELAUX__SYNC__CLUSTER_TIMEOUT_SECONDS`: Bound on cluster look-ups during conversion. Default: 30
//! - `VELAUX__SYNC__WATCH_NAMESPACE`: Restrict the watch to one namespace. Default: all namespaces
//! - `VELAUX__WORKFLOW_RECORD_SYNC__INTERVAL_SECONDS`: Poll interval of the workflow record sync. Default: 10
//! - `VELAUX__HEALTH__PORT`: Port of the health and metrics server. Default: 8080

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

// Include the default settings file as a string constant
const DEFAULT_SETTINGS: &str = include_str!("../default.toml");

/// Represents the main settings structure for the application
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Logging configuration
    pub log: Log,
    /// Telemetry (OpenTelemetry) configuration
    pub telemetry: Telemetry,
    /// Datastore driver selection and connection settings
    pub datastore: Datastore,
    /// Kubernetes client configuration
    #[serde(default)]
    pub kubernetes: Kubernetes,
    /// Application sync worker configuration
    pub sync: AppSync,
    /// Workflow record sync worker configuration
    pub workflow_record_sync: WorkflowRecordSync,
    /// Health and metrics server configuration
    pub health: Health,
}

/// Represents the logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Log {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,
    /// Log format: "text" for human-readable, "json" for structured JSON
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Represents the telemetry (OpenTelemetry) configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Telemetry {
    /// Whether telemetry is enabled
    #[serde(default)]
    pub enabled: bool,
    /// OTLP endpoint for trace export (gRPC)
    #[serde(default = "default_otlp_endpoint")]
    pub otlp_endpoint: String,
    /// Service name for traces
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Sampling rate (0.0 to 1.0)
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
}

/// Telemetry configuration handed to [`crate::telemetry::init`]
#[derive(Debug, Clone)]
pub struct ResolvedTelemetry {
    pub enabled: bool,
    pub otlp_endpoint: String,
    pub service_name: String,
    pub sampling_rate: f64,
}

impl Telemetry {
    /// Resolves the telemetry settings, clamping the sampling rate into `[0.0, 1.0]`.
    pub fn resolve(&self) -> ResolvedTelemetry {
        ResolvedTelemetry {
            enabled: self.enabled,
            otlp_endpoint: self.otlp_endpoint.clone(),
            service_name: self.service_name.clone(),
            sampling_rate: self.sampling_rate.clamp(0.0, 1.0),
        }
    }
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "velaux-sync".to_string()
}

fn default_sampling_rate() -> f64 {
    0.1
}

/// The datastore driver backing the UX metadata
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatastoreKind {
    /// One ConfigMap per record in the cluster
    KubeApi,
    /// A single JSONB document table in PostgreSQL
    Postgres,
    /// Process-local maps, lost on restart
    Memory,
}

/// Represents the datastore configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Datastore {
    /// Which driver to use
    #[serde(rename = "type")]
    pub kind: DatastoreKind,
    /// Namespace for the kubeapi driver
    pub namespace: String,
    /// Connection URL for the postgres driver
    pub url: String,
    /// Optional schema name for the postgres driver
    pub schema: Option<String>,
    /// Maximum pooled connections for the postgres driver
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// Represents the Kubernetes client configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Kubernetes {
    /// Path to a kubeconfig file, in-cluster configuration when absent
    pub kubeconfig_path: Option<String>,
}

/// Represents the application sync worker configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppSync {
    /// Whether the watch worker runs
    pub enabled: bool,
    /// Bounded capacity of the add/update queue
    pub queue_capacity: usize,
    /// Timeout applied to cluster look-ups made during conversion
    pub cluster_timeout_seconds: u64,
    /// Namespace to watch, all namespaces when absent
    pub watch_namespace: Option<String>,
}

/// Represents the workflow record sync worker configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowRecordSync {
    /// Whether the poller runs
    pub enabled: bool,
    /// Seconds between two polls
    pub interval_seconds: u64,
}

/// Represents the health server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Health {
    /// Port serving /healthz, /readyz and /metrics
    pub port: u16,
}

impl Settings {
    /// Creates a new `Settings` instance
    ///
    /// # Arguments
    ///
    /// * `file` - An optional path to a configuration file
    ///
    /// # Returns
    ///
    /// Returns a `Result` containing the `Settings` instance or a `ConfigError`
    pub fn new(file: Option<String>) -> Result<Self, ConfigError> {
        // Start with default settings from the embedded TOML file
        let mut s = Config::builder()
            .add_source(File::from_str(DEFAULT_SETTINGS, config::FileFormat::Toml));

        // If a configuration file is provided, add it as a source
        s = match file {
            Some(x) => s.add_source(File::with_name(x.as_str())),
            None => s,
        };

        s = s.add_source(Environment::with_prefix("VELAUX").separator("__"));

        s.build()?.try_deserialize()
    }
}
