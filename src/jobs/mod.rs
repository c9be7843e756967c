//! # Job Tracking
//!
//! Records the lifecycle of background transformation jobs so that HTTP
//! callers can poll progress and fetch results.
//!
//! ## Job Lifecycle:
//! 1. **Processing**: created at progress 0 when the job is scheduled
//! 2. **Completed**: output written, progress 100 (terminal)
//! 3. **Error**: a stage failed, progress stays at the last checkpoint (terminal)
//!
//! Each job has exactly one writer, the runner task that owns it. The store
//! lock only protects the map itself; ordering rules are enforced by the
//! guarded transitions on [`Job`].

pub mod runner;

pub use runner::JobRunner;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

/// Current status of a transformation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

/// A single transformation job.
#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: String,
    /// Upload this job transforms
    pub asset_id: String,
    pub status: JobStatus,
    /// Percentage in [0, 100], never decreases
    pub progress: u8,
    pub message: String,
    /// Set only when `status` is `Error`
    pub error: Option<String>,
    /// Set only when `status` is `Completed`
    pub output_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(job_id: String, asset_id: String) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            asset_id,
            status: JobStatus::Processing,
            progress: 0,
            message: "Starting transformation...".to_string(),
            error: None,
            output_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a progress checkpoint.
    ///
    /// Ignored once the job is terminal. Progress is clamped so it never
    /// moves backwards; the message always takes the latest value.
    pub fn advance(&mut self, progress: u8, message: &str) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.progress = self.progress.max(progress.min(100));
        self.message = message.to_string();
        self.updated_at = Utc::now();
        true
    }

    /// Mark the job completed with its output. Only the first terminal call wins.
    pub fn complete(&mut self, output_path: PathBuf, message: &str) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.message = message.to_string();
        self.output_path = Some(output_path);
        self.updated_at = Utc::now();
        true
    }

    /// Mark the job failed. Progress is left at the last checkpoint.
    pub fn fail(&mut self, error: String) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Error;
        self.message = format!("Transformation failed: {}", error);
        self.error = Some(error);
        self.updated_at = Utc::now();
        true
    }
}

/// Summary of tracked jobs for health reporting.
#[derive(Debug, Default, Serialize)]
pub struct JobStoreSummary {
    pub total_jobs: usize,
    pub status_counts: HashMap<String, usize>,
}

/// Storage for job records.
///
/// Callers must respect the single-writer-per-key precondition: only the
/// runner task that created a job updates it.
pub trait JobStore: Send + Sync {
    /// Insert a new job. Returns false if the id is already taken.
    fn create(&self, job: Job) -> bool;

    /// Snapshot of a job.
    fn get(&self, job_id: &str) -> Option<Job>;

    /// Apply `update` to the stored job. Returns false for unknown ids.
    fn update(&self, job_id: &str, update: &mut dyn FnMut(&mut Job)) -> bool;

    fn summary(&self) -> JobStoreSummary;
}

/// Process-local job store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, job: Job) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(&job.job_id) {
            return false;
        }
        jobs.insert(job.job_id.clone(), job);
        true
    }

    fn get(&self, job_id: &str) -> Option<Job> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(job_id).cloned()
    }

    fn update(&self, job_id: &str, update: &mut dyn FnMut(&mut Job)) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        match jobs.get_mut(job_id) {
            Some(job) => {
                update(job);
                true
            }
            None => false,
        }
    }

    fn summary(&self) -> JobStoreSummary {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let mut status_counts = HashMap::new();
        for job in jobs.values() {
            *status_counts.entry(job.status.as_str().to_string()).or_insert(0) += 1;
        }
        JobStoreSummary {
            total_jobs: jobs.len(),
            status_counts,
        }
    }
}
