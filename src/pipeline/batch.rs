//! Batch execution

use super::Pipeline;
use crate::error::Error;
use crate::types::{BatchResult, Credential, Event, JobResult, JobSpec};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

impl Pipeline {
    /// Acquire one recording and report the outcome
    ///
    /// Never fails: errors are folded into the returned [`JobResult`].
    pub async fn resolve_and_acquire(
        &self,
        url: &str,
        credential: Option<Credential>,
        output_name: Option<&str>,
    ) -> JobResult {
        let spec = JobSpec {
            url: url.to_string(),
            credential,
            output_name: output_name.map(str::to_string),
        };
        self.run_job(0, spec, &CancellationToken::new()).await
    }

    /// Run `jobs` with at most `batch.fetch_concurrency` in flight
    ///
    /// Results come back in input order, one per job. Once `cancel` fires no
    /// further job starts (each reports `cancelled`) and running jobs stop at
    /// their next checkpoint.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use connect_dl::{CancellationToken, Config, JobSpec, Pipeline, cancel_on_signal};
    ///
    /// # async fn example() -> connect_dl::Result<()> {
    /// let pipeline = Pipeline::new(Config::default()).await?;
    /// let cancel = CancellationToken::new();
    /// cancel_on_signal(cancel.clone());
    ///
    /// let jobs = vec![
    ///     JobSpec::new("https://connect.example.edu/p1a2b3c4d5e/"),
    ///     JobSpec::from_row("https://connect.example.edu/p9z8y7x6w5v/", Some("BREEZESESSION=abc"), Some("Week 2")),
    /// ];
    /// let batch = pipeline.run_batch(jobs, cancel).await;
    /// println!("{} of {} succeeded", batch.succeeded(), batch.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_batch(&self, jobs: Vec<JobSpec>, cancel: CancellationToken) -> BatchResult {
        let total = jobs.len();
        let concurrency = self.config.batch.fetch_concurrency.max(1);
        tracing::info!(jobs = total, concurrency, "batch started");

        let results: Vec<JobResult> = stream::iter(jobs.into_iter().enumerate())
            .map(|(index, spec)| {
                let cancel = cancel.clone();
                async move { self.run_job(index, spec, &cancel).await }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let batch = BatchResult { results };
        tracing::info!(
            jobs = total,
            succeeded = batch.succeeded(),
            failed = batch.failed(),
            "batch finished"
        );
        batch
    }

    async fn run_job(&self, index: usize, spec: JobSpec, cancel: &CancellationToken) -> JobResult {
        if cancel.is_cancelled() {
            return self.fail(index, spec.url, &Error::Cancelled);
        }

        self.emit(Event::JobStarted {
            job: index,
            url: spec.url.clone(),
        });

        match self.acquire(index, &spec, cancel).await {
            Ok(path) => {
                self.emit(Event::JobComplete {
                    job: index,
                    path: path.clone(),
                });
                JobResult::succeeded(spec.url, path)
            }
            Err(e) => self.fail(index, spec.url, &e),
        }
    }

    fn fail(&self, index: usize, url: String, error: &Error) -> JobResult {
        tracing::warn!(job = index, %url, code = error.error_code(), error = %error, "job failed");
        self.emit(Event::JobFailed {
            job: index,
            kind: error.kind(),
            error: error.to_string(),
        });
        JobResult::failed(url, error)
    }
}
