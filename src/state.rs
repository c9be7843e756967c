//! # Application State Management
//!
//! Shared state handed to every HTTP handler through `web::Data<AppState>`.
//!
//! ## What lives here:
//! - **config**: immutable after startup, so a plain `Arc`
//! - **metrics**: request counters updated by middleware on every request
//! - **jobs**: the job store polled by status/download/export handlers
//! - **storage**: upload and output locations on disk
//! - **runner**: schedules background transformation jobs
//! - **extractor**: feature extraction used by the upload handler
//!
//! Every field is cheap to clone (`Arc` or `Instant`), so actix can clone the
//! state into each worker.

use crate::analysis::FeatureExtractor;
use crate::config::AppConfig;
use crate::jobs::{InMemoryJobStore, JobRunner, JobStore};
use crate::pipeline::TransformationPipeline;
use crate::storage::AssetStore;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// Performance metrics, written by the metrics middleware
    pub metrics: Arc<RwLock<AppMetrics>>,

    pub jobs: Arc<dyn JobStore>,

    pub storage: Arc<AssetStore>,

    pub runner: JobRunner,

    pub extractor: Arc<FeatureExtractor>,

    /// When the server started (never changes)
    pub start_time: Instant,
}

/// Request metrics collected across all HTTP requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of error responses since server start
    pub error_count: u64,

    /// Per-endpoint statistics keyed by `"<METHOD> <route>"`, with
    /// the matched route pattern (e.g. `"GET /api/status/{task_id}"`)
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
///
/// ## Derived values:
/// - **Average response time**: total_duration_ms / request_count
/// - **Error rate**: error_count / request_count
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    pub error_count: u64,
}

impl AppState {
    /// Build the state with an in-memory job store and storage rooted at the
    /// configured directories.
    pub fn new(config: AppConfig) -> Self {
        Self::with_job_store(config, Arc::new(InMemoryJobStore::new()))
    }

    /// Build the state around a caller-provided job store.
    pub fn with_job_store(config: AppConfig, jobs: Arc<dyn JobStore>) -> Self {
        let storage = Arc::new(AssetStore::from_config(&config.storage));
        let pipeline = TransformationPipeline::new(config.audio.target_sample_rate);
        let runner = JobRunner::new(jobs.clone(), storage.clone(), pipeline);

        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            jobs,
            storage,
            runner,
            extractor: Arc::new(FeatureExtractor::default()),
            start_time: Instant::now(),
        }
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.request_count += 1;
    }

    /// Increment the total error counter (4xx and 5xx responses).
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    ///
    /// The first time an endpoint is seen a zeroed `EndpointMetric` is
    /// created for it.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// The data is cloned so the lock is not held while the response is
    /// serialized.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap_or_else(PoisonError::into_inner);
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed, from 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_metrics_accumulate() {
        let state = AppState::new(AppConfig::default());
        state.increment_request_count();
        state.increment_request_count();
        state.increment_error_count();
        state.record_endpoint_request("GET /api/status/{task_id}", 10, false);
        state.record_endpoint_request("GET /api/status/{task_id}", 30, true);

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.error_count, 1);

        let metric = &snapshot.endpoint_metrics["GET /api/status/{task_id}"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_empty_endpoint_metric() {
        let metric = EndpointMetric::default();
        assert_eq!(metric.average_duration_ms(), 0.0);
        assert_eq!(metric.error_rate(), 0.0);
    }
}
