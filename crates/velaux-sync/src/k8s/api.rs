/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Kubernetes API Module
//!
//! Client construction and the retry policy shared by every cluster call.
//!
//! ## Retries
//!
//! ```rust,ignore
//! let app = with_retries(|| async { api.get_opt("example").await }, RetryConfig::default()).await?;
//! ```
//! Throttling and server-side unavailability are retried with exponential
//! backoff; every other error is returned immediately.

use backoff::ExponentialBackoffBuilder;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ListParams;
use kube::{Api, Client, Error as KubeError};
use std::time::Duration;
use velaux_utils::telemetry::prelude::*;

/// Retry configuration for Kubernetes operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_elapsed_time: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_elapsed_time: Duration::from_secs(30),
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Retry policy whose retries give up after `limit`.
    pub fn bounded(limit: Duration) -> Self {
        Self {
            max_elapsed_time: limit,
            ..Self::default()
        }
    }
}

/// Determines if a Kubernetes error is retryable
pub fn is_retryable_error(error: &KubeError) -> bool {
    match error {
        KubeError::Api(api_err) => {
            matches!(api_err.code, 429 | 500 | 503 | 504)
                || matches!(
                    api_err.reason.as_str(),
                    "ServiceUnavailable" | "InternalError" | "Timeout"
                )
        }
        _ => false,
    }
}

/// Executes a Kubernetes operation with retries
pub async fn with_retries<F, Fut, T>(operation: F, config: RetryConfig) -> Result<T, KubeError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, KubeError>>,
{
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(config.initial_interval)
        .with_max_interval(config.max_interval)
        .with_multiplier(config.multiplier)
        .with_max_elapsed_time(Some(config.max_elapsed_time))
        .build();

    let operation_with_backoff = || async {
        match operation().await {
            Ok(value) => Ok(value),
            Err(error) => {
                if is_retryable_error(&error) {
                    warn!("Retryable error encountered: {}", error);
                    Err(backoff::Error::Transient {
                        err: error,
                        retry_after: None,
                    })
                } else {
                    Err(backoff::Error::Permanent(error))
                }
            }
        }
    };

    backoff::future::retry(backoff, operation_with_backoff).await
}

/// Creates a Kubernetes client.
///
/// # Arguments
/// * `kubeconfig_path` - Optional path to a kubeconfig file; the in-cluster or
///   default configuration is inferred otherwise
///
/// The connection is verified by listing a single namespace.
pub async fn create_k8s_client(kubeconfig_path: Option<&str>) -> Result<Client, KubeError> {
    if let Some(path) = kubeconfig_path {
        info!("Using kubeconfig from {}", path);
        std::env::set_var("KUBECONFIG", path);
    }

    let client = Client::try_default().await?;

    let namespaces: Api<Namespace> = Api::all(client.clone());
    namespaces.list(&ListParams::default().limit(1)).await?;
    info!("Successfully connected to Kubernetes cluster");

    Ok(client)
}
