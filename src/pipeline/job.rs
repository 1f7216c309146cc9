//! One recording: resolve, fetch, extract, align, mux, place

use super::Pipeline;
use crate::encoder::{EncodingStrategy, MuxJob};
use crate::error::{Error, Result};
use crate::extraction::{ExtractedStreams, extract_streams};
use crate::resolver::resolve;
use crate::sync::SyncPlan;
use crate::types::{Credential, Event, JobSpec, ResolvedSession};
use crate::utils::{OutputTarget, move_file, output_file_name, resolve_output_path};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Name of the downloaded archive inside a job workspace
const ARCHIVE_FILE: &str = "asset.zip";
/// Directory receiving extracted segments inside a job workspace
const STREAMS_DIR: &str = "streams";

impl Pipeline {
    /// Run one job and return the path of the finished recording
    ///
    /// `job` is the index reported in [`Event`]s. The job works in a private
    /// directory under the configured workspace root, which is removed when
    /// the job ends whatever the outcome. The output file only appears in
    /// `output_dir` after the encode succeeded.
    ///
    /// # Errors
    ///
    /// Whatever stage failed first. Once `cancel` fires every error is
    /// reported as [`Error::Cancelled`].
    pub async fn acquire(
        &self,
        job: usize,
        spec: &JobSpec,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        match self.run_stages(job, spec, cancel).await {
            Err(e) if cancel.is_cancelled() && !matches!(e, Error::Cancelled) => {
                debug!(job, error = %e, "stage interrupted by cancellation");
                Err(Error::Cancelled)
            }
            other => other,
        }
    }

    async fn run_stages(
        &self,
        job: usize,
        spec: &JobSpec,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let session = resolve(&spec.url)?;
        info!(job, session = %session.id, origin = %session.origin, "session resolved");
        self.emit(Event::Resolved {
            job,
            session: session.id.clone(),
        });
        checkpoint(cancel)?;

        let file_name = output_file_name(spec.output_name.as_deref(), &session.id);
        let destination = self.config.batch.output_dir.join(&file_name);
        if let OutputTarget::Existing(path) =
            resolve_output_path(&destination, self.config.batch.file_collision)?
        {
            info!(job, ?path, "output already exists, skipping");
            return Ok(path);
        }

        let root = self.config.batch.workspace_root();
        tokio::fs::create_dir_all(&root).await?;
        let workspace = tempfile::Builder::new()
            .prefix("connect-dl-")
            .tempdir_in(&root)?;
        debug!(job, workspace = ?workspace.path(), "workspace created");

        let archive = self
            .download(job, &session, spec.credential.as_ref(), workspace.path(), cancel)
            .await?;
        checkpoint(cancel)?;

        let streams = extract_streams(&archive, &workspace.path().join(STREAMS_DIR), &self.config.sync)
            .await?;
        self.emit(Event::Extracted {
            job,
            audio_offset_ms: streams.audio.start_offset.as_millis() as u64,
            video_offset_ms: streams.video.start_offset.as_millis() as u64,
        });
        checkpoint(cancel)?;

        let plan = SyncPlan::compute(
            streams.audio.start_offset,
            streams.video.start_offset,
            self.config.sync.drift_threshold,
        );
        if let Some(lagging) = plan.lagging {
            info!(job, %lagging, delay_ms = plan.delay.as_millis() as u64, "correcting stream drift");
        } else {
            debug!(job, drift_ms = plan.drift.as_millis() as u64, "drift within threshold");
        }

        let staged = workspace.path().join(&file_name);
        self.encode(job, &streams, &plan, workspace.path(), &staged, cancel)
            .await?;
        checkpoint(cancel)?;

        self.place(&staged, &destination).await
    }

    /// Try manifest candidates in order until one yields an archive
    async fn download(
        &self,
        job: usize,
        session: &ResolvedSession,
        credential: Option<&Credential>,
        workspace: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let manifest = cancellable(cancel, self.fetcher.fetch_manifest(session, credential)).await?;
        let dest = workspace.join(ARCHIVE_FILE);

        let mut missing = 0usize;
        for entry in &manifest.entries {
            checkpoint(cancel)?;
            let url = session.url_for(&entry.path);
            self.emit(Event::Downloading {
                job,
                url: url.clone(),
            });

            let fetched =
                cancellable(cancel, self.fetcher.fetch_asset(session, entry, credential, &dest)).await;
            match fetched {
                Ok(raw) => {
                    let (path, size) = raw.into_archive(&url)?;
                    debug!(job, %url, size, "archive selected");
                    return Ok(path);
                }
                Err(e) if e.is_not_found() => {
                    debug!(job, %url, "candidate not found, trying next");
                    missing += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::Fetch {
            url: session.page_url(),
            status: Some(404),
            reason: format!("no archive found among {} candidates", missing),
        })
    }

    /// Mux with the pipeline's strategy, retrying once in software if hardware fails
    async fn encode(
        &self,
        job: usize,
        streams: &ExtractedStreams,
        plan: &SyncPlan,
        workspace: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mux_job = MuxJob {
            audio: &streams.audio,
            video: &streams.video,
            plan,
            workspace,
            output,
        };

        match self.mux_with(job, &self.strategy, &mux_job, cancel).await {
            Err(e @ Error::MuxFailure { .. }) if self.strategy.is_hardware() && !cancel.is_cancelled() => {
                warn!(job, encoder = self.strategy.name(), error = %e, "hardware encode failed, falling back to software");
                self.emit(Event::EncoderFallback {
                    job,
                    from: self.strategy.name().to_string(),
                    error: e.to_string(),
                });
                let software = EncodingStrategy::software(self.config.encoder.quality);
                self.mux_with(job, &software, &mux_job, cancel).await
            }
            other => other,
        }
    }

    async fn mux_with(
        &self,
        job: usize,
        strategy: &EncodingStrategy,
        mux_job: &MuxJob<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _permit = cancellable(cancel, self.locks.acquire(strategy)).await?;
        self.emit(Event::Encoding {
            job,
            encoder: strategy.name().to_string(),
        });
        self.muxer.mux(strategy, mux_job, cancel).await
    }

    /// Move the staged recording into `output_dir`
    ///
    /// The collision policy is applied again here; another job of the batch
    /// may have written the same name in the meantime.
    async fn place(&self, staged: &Path, destination: &Path) -> Result<PathBuf> {
        match resolve_output_path(destination, self.config.batch.file_collision)? {
            OutputTarget::Write(path) => {
                move_file(staged, &path).await?;
                info!(?path, "recording saved");
                Ok(path)
            }
            OutputTarget::Existing(path) => {
                warn!(?path, "output appeared while encoding, keeping existing file");
                Ok(path)
            }
        }
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Drive `fut` unless `cancel` fires first
async fn cancellable<T>(cancel: &CancellationToken, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        result = fut => result,
        _ = cancel.cancelled() => Err(Error::Cancelled),
    }
}
