//! Background execution of transformation jobs.
//!
//! Every scheduled job runs on its own tokio task and always ends in a
//! terminal state: `completed` when the output is on disk, `error` otherwise.
//! A task that panics before either is recorded leaves its job stuck in
//! `processing`; nothing watches for that.

use super::{Job, JobStore};
use crate::pipeline::{ProgressSink, Stage, TransformationPipeline, TransformationSpec};
use crate::storage::AssetStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Forwards pipeline checkpoints into the job store.
struct JobProgress {
    job_id: String,
    store: Arc<dyn JobStore>,
}

impl ProgressSink for JobProgress {
    fn checkpoint(&self, stage: Stage) {
        info!(job_id = %self.job_id, progress = stage.progress(), "{}", stage.message());
        self.store.update(&self.job_id, &mut |job| {
            job.advance(stage.progress(), stage.message());
        });
    }
}

#[derive(Clone)]
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    storage: Arc<AssetStore>,
    pipeline: Arc<TransformationPipeline>,
}

impl JobRunner {
    pub fn new(store: Arc<dyn JobStore>, storage: Arc<AssetStore>, pipeline: TransformationPipeline) -> Self {
        Self {
            store,
            storage,
            pipeline: Arc::new(pipeline),
        }
    }

    /// Register a job for `asset_id` and start it in the background.
    ///
    /// Returns the new job id immediately; the job is already visible in the
    /// store as `processing` at progress 0.
    pub fn schedule(&self, asset_id: &str, input: PathBuf, spec: TransformationSpec) -> String {
        let job_id = Uuid::new_v4().to_string();
        self.store.create(Job::new(job_id.clone(), asset_id.to_string()));

        info!(job_id = %job_id, asset_id, intention = %spec.intention, "Scheduled transformation job");

        let runner = self.clone();
        let task_job_id = job_id.clone();
        tokio::spawn(async move {
            runner.execute(task_job_id, input, spec).await;
        });

        job_id
    }

    async fn execute(&self, job_id: String, input: PathBuf, spec: TransformationSpec) {
        let output = self.storage.output_path(&job_id);
        let sink = Arc::new(JobProgress {
            job_id: job_id.clone(),
            store: self.store.clone(),
        });

        match self.pipeline.run(&input, &output, &spec, sink).await {
            Ok(path) => {
                info!(job_id = %job_id, output = %path.display(), "Transformation completed");
                self.store.update(&job_id, &mut |job| {
                    job.complete(path.clone(), Stage::Completed.message());
                });
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!(job_id = %job_id, error = %message, "Transformation failed");
                self.store.update(&job_id, &mut |job| {
                    job.fail(message.clone());
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encode::write_wav_file;
    use crate::audio::Waveform;
    use crate::jobs::{InMemoryJobStore, JobStatus};
    use std::time::Duration;

    fn spec() -> TransformationSpec {
        serde_json::from_str(
            r#"{"tuning":432.0,"binaural_beat":{"enabled":true,"type":"alpha","volume":0.3},"therapeutic_frequency":7.83}"#,
        )
        .unwrap()
    }

    fn setup() -> (Arc<InMemoryJobStore>, Arc<AssetStore>, JobRunner) {
        let root = std::env::temp_dir().join(format!("harmonia-runner-{}", uuid::Uuid::new_v4()));
        let storage = Arc::new(AssetStore::new(root.join("uploads"), root.join("processed")));
        storage.ensure_dirs().unwrap();
        let store = Arc::new(InMemoryJobStore::new());
        let runner = JobRunner::new(store.clone(), storage.clone(), TransformationPipeline::new(8_000));
        (store, storage, runner)
    }

    async fn wait_for_terminal(store: &InMemoryJobStore, job_id: &str) -> Job {
        for _ in 0..500 {
            let job = store.get(job_id).unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {} never reached a terminal state", job_id);
    }

    #[tokio::test]
    async fn test_job_completes_with_output() {
        let (store, storage, runner) = setup();
        let input = storage.upload_path("asset", "tone.wav");
        let samples: Vec<f32> = (0..8_000)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 8_000.0).sin() * 0.5)
            .collect();
        write_wav_file(&input, &Waveform::new(samples, 8_000)).unwrap();

        let job_id = runner.schedule("asset", input, spec());
        let fresh = store.get(&job_id).unwrap();
        assert_eq!(fresh.asset_id, "asset");
        assert_eq!(fresh.status, JobStatus::Processing);
        assert_eq!(fresh.progress, 0);
        assert!(fresh.error.is_none());
        assert!(fresh.output_path.is_none());

        let job = wait_for_terminal(&store, &job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.error.is_none());

        let output = job.output_path.unwrap();
        assert_eq!(output, storage.output_path(&job_id));
        let written = crate::audio::encode::read_wav_file(&output).unwrap();
        assert_eq!(written.sample_rate, 8_000);
        assert_eq!(written.len(), 8_000);
    }

    #[tokio::test]
    async fn test_missing_input_fails_at_loading_checkpoint() {
        let (store, storage, runner) = setup();
        let job_id = runner.schedule("asset", storage.upload_path("asset", "gone.wav"), spec());

        let job = wait_for_terminal(&store, &job_id).await;
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.progress, 10);
        assert!(job.error.unwrap().contains("Failed to open audio file"));
        assert!(job.output_path.is_none());
    }
}
