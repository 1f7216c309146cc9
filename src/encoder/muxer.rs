//! ffmpeg invocation that merges the two streams into one MP4

use super::probe::stderr_tail;
use super::strategy::EncodingStrategy;
use crate::config::EncoderConfig;
use crate::error::{Error, Result};
use crate::sync::SyncPlan;
use crate::types::StreamFile;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Inputs and destination of one mux
#[derive(Clone, Copy, Debug)]
pub struct MuxJob<'a> {
    /// Audio stream
    pub audio: &'a StreamFile,
    /// Video stream
    pub video: &'a StreamFile,
    /// Start alignment
    pub plan: &'a SyncPlan,
    /// Scratch directory for segment lists
    pub workspace: &'a Path,
    /// File to produce
    pub output: &'a Path,
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Runs ffmpeg for a [`MuxJob`] with a given [`EncodingStrategy`]
#[derive(Clone, Debug)]
pub struct Muxer {
    ffmpeg: PathBuf,
    ffprobe: Option<PathBuf>,
    audio_bitrate: String,
    timeout: Duration,
    probe_timeout: Duration,
}

impl Muxer {
    /// Muxer for an explicit ffmpeg binary, without output verification
    pub fn new(ffmpeg: PathBuf) -> Self {
        let defaults = EncoderConfig::default();
        Self {
            ffmpeg,
            ffprobe: None,
            audio_bitrate: defaults.audio_bitrate,
            timeout: defaults.encode_timeout,
            probe_timeout: defaults.probe_timeout,
        }
    }

    /// Muxer configured from [`EncoderConfig`]
    ///
    /// ffprobe verification is enabled when `verify_output` is set and an
    /// ffprobe binary can be found.
    pub fn from_config(config: &EncoderConfig) -> Result<Self> {
        let ffprobe = if config.verify_output {
            let found = config.resolve_ffprobe();
            if found.is_none() {
                tracing::warn!("ffprobe not found, output verification disabled");
            }
            found
        } else {
            None
        };

        Ok(Self {
            ffmpeg: config.resolve_ffmpeg()?,
            ffprobe,
            audio_bitrate: config.audio_bitrate.clone(),
            timeout: config.encode_timeout,
            probe_timeout: config.probe_timeout,
        })
    }

    /// Verify finished files with this ffprobe binary
    pub fn with_ffprobe(mut self, ffprobe: Option<PathBuf>) -> Self {
        self.ffprobe = ffprobe;
        self
    }

    /// Kill encodes that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Encode and mux `job` with `strategy`
    ///
    /// The encoder is killed when the timeout expires or `cancel` fires. Any
    /// partial output is removed on failure.
    ///
    /// # Errors
    ///
    /// [`Error::MuxFailure`] for a failed, killed or unverifiable encode;
    /// [`Error::ExternalTool`] if ffmpeg cannot be started.
    pub async fn mux(
        &self,
        strategy: &EncodingStrategy,
        job: &MuxJob<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let result = self.run(strategy, job, cancel).await;
        if result.is_err()
            && let Err(e) = tokio::fs::remove_file(job.output).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(output = ?job.output, error = %e, "failed to remove partial output");
        }
        result
    }

    async fn run(
        &self,
        strategy: &EncodingStrategy,
        job: &MuxJob<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let failure = |reason: String| Error::MuxFailure {
            encoder: strategy.name().to_string(),
            reason,
        };

        let video_input = input_args(job.video, job.workspace).await?;
        let audio_input = input_args(job.audio, job.workspace).await?;
        let args = self.build_args(strategy, &video_input, &audio_input, job.plan, job.output);

        tracing::debug!(encoder = strategy.name(), ?args, "running ffmpeg");

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("failed to execute ffmpeg: {}", e)))?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = tokio::time::sleep(self.timeout) => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        let status = match outcome {
            Outcome::Exited(status) => status.map_err(|e| failure(format!("wait failed: {}", e)))?,
            Outcome::TimedOut => {
                kill_encoder(&mut child, stderr_task).await;
                tracing::warn!(encoder = strategy.name(), timeout = ?self.timeout, "ffmpeg timed out");
                return Err(failure(format!("timed out after {:?}", self.timeout)));
            }
            Outcome::Cancelled => {
                kill_encoder(&mut child, stderr_task).await;
                tracing::info!(encoder = strategy.name(), "ffmpeg cancelled");
                return Err(failure("cancelled".to_string()));
            }
        };

        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        if !status.success() {
            return Err(failure(format!("{}: {}", status, stderr_tail(&stderr))));
        }

        match tokio::fs::metadata(job.output).await {
            Ok(meta) if meta.len() > 0 => {}
            Ok(_) => return Err(failure("ffmpeg produced an empty output".to_string())),
            Err(_) => return Err(failure("ffmpeg produced no output".to_string())),
        }

        if let Some(ffprobe) = &self.ffprobe {
            self.verify(ffprobe, job.output).await.map_err(failure)?;
        }

        tracing::info!(encoder = strategy.name(), output = ?job.output, "mux complete");
        Ok(())
    }

    /// Full ffmpeg argument list; the output path is always last
    pub fn build_args(
        &self,
        strategy: &EncodingStrategy,
        video_input: &[String],
        audio_input: &[String],
        plan: &SyncPlan,
        output: &Path,
    ) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-y", "-loglevel", "error"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.extend(strategy.global_args());
        args.extend_from_slice(video_input);
        args.extend_from_slice(audio_input);
        args.extend([
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
            "-vf".to_string(),
            format!("{},{}", plan.video_filter(), strategy.pixel_filter()),
            "-af".to_string(),
            plan.audio_filter(),
        ]);
        args.extend(strategy.video_args());
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
            output.to_string_lossy().into_owned(),
        ]);
        args
    }

    // Err carries the reason for MuxFailure
    async fn verify(&self, ffprobe: &Path, output: &Path) -> std::result::Result<(), String> {
        let child = Command::new(ffprobe)
            .args(["-v", "error", "-show_entries", "stream=codec_type", "-of", "json"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(error = %e, "failed to execute ffprobe, skipping verification");
                return Ok(());
            }
        };

        let result = match tokio::time::timeout(self.probe_timeout, child.wait_with_output()).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => return Err(format!("ffprobe failed: {}", e)),
            Err(_) => return Err("ffprobe timed out".to_string()),
        };

        if !result.status.success() {
            return Err(format!(
                "ffprobe rejected output: {}",
                stderr_tail(&result.stderr)
            ));
        }

        let (video, audio) = count_tracks(&result.stdout)?;
        if video != 1 || audio != 1 {
            return Err(format!(
                "expected 1 video and 1 audio track, found {} video and {} audio",
                video, audio
            ));
        }

        tracing::debug!(?output, "output verified");
        Ok(())
    }
}

async fn kill_encoder(child: &mut Child, stderr_task: Option<JoinHandle<Vec<u8>>>) {
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "failed to kill ffmpeg");
    }
    if let Some(task) = stderr_task {
        task.abort();
    }
}

#[derive(Deserialize)]
struct ProbeReport {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
}

/// `(video, audio)` track counts from ffprobe's JSON report
fn count_tracks(json: &[u8]) -> std::result::Result<(usize, usize), String> {
    let report: ProbeReport =
        serde_json::from_slice(json).map_err(|e| format!("unreadable ffprobe report: {}", e))?;
    let count = |kind: &str| {
        report
            .streams
            .iter()
            .filter(|s| s.codec_type.as_deref() == Some(kind))
            .count()
    };
    Ok((count("video"), count("audio")))
}

/// Input arguments for one stream: the file itself or a concat list
async fn input_args(stream: &StreamFile, workspace: &Path) -> Result<Vec<String>> {
    match stream.segments.as_slice() {
        [] => Err(Error::IncompleteAsset {
            archive: workspace.to_path_buf(),
            reason: format!("{} stream has no segments", stream.kind),
        }),
        [single] => Ok(vec!["-i".to_string(), single.to_string_lossy().into_owned()]),
        segments => {
            let list = workspace.join(format!("{}_segments.ffconcat", stream.kind));
            tokio::fs::write(&list, concat_list(segments)).await?;
            Ok(vec![
                "-f".to_string(),
                "concat".to_string(),
                "-safe".to_string(),
                "0".to_string(),
                "-i".to_string(),
                list.to_string_lossy().into_owned(),
            ])
        }
    }
}

/// ffconcat script listing `segments` in order
pub(crate) fn concat_list(segments: &[PathBuf]) -> String {
    let mut script = String::from("ffconcat version 1.0\n");
    for segment in segments {
        let escaped = segment.to_string_lossy().replace('\'', r"'\''");
        script.push_str(&format!("file '{}'\n", escaped));
    }
    script
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Quality;
    use crate::types::StreamKind;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const WRITE_LAST_ARG: &str = r#"for last; do :; done
printf '%s\n' "$@" > "$(dirname "$last")/args.txt"
printf 'fake mp4 payload' > "$last""#;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn stream(kind: StreamKind, segments: Vec<PathBuf>, offset_ms: u64) -> StreamFile {
        StreamFile {
            kind,
            segments,
            start_offset: Duration::from_millis(offset_ms),
        }
    }

    struct Fixture {
        dir: TempDir,
        audio: StreamFile,
        video: StreamFile,
        plan: SyncPlan,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let audio = stream(StreamKind::Audio, vec![dir.path().join("cameraVoip_1_1.flv")], 0);
            let video = stream(StreamKind::Video, vec![dir.path().join("screenshare_1_1.flv")], 500);
            let plan = SyncPlan::compute(
                audio.start_offset,
                video.start_offset,
                Duration::from_millis(100),
            );
            Self {
                dir,
                audio,
                video,
                plan,
            }
        }

        fn output(&self) -> PathBuf {
            self.dir.path().join("out.mp4")
        }

        fn job<'a>(&'a self, output: &'a Path) -> MuxJob<'a> {
            MuxJob {
                audio: &self.audio,
                video: &self.video,
                plan: &self.plan,
                workspace: self.dir.path(),
                output,
            }
        }
    }

    fn software() -> EncodingStrategy {
        EncodingStrategy::software(Quality::Medium)
    }

    #[test]
    fn args_map_one_track_of_each_kind() {
        let muxer = Muxer::new(PathBuf::from("ffmpeg"));
        let plan = SyncPlan::compute(Duration::ZERO, Duration::from_millis(500), Duration::from_millis(100));
        let args = muxer.build_args(
            &software(),
            &["-i".to_string(), "v.flv".to_string()],
            &["-i".to_string(), "a.flv".to_string()],
            &plan,
            Path::new("/out/rec.mp4"),
        );

        let joined = args.join(" ");
        assert!(joined.contains("-i v.flv -i a.flv"));
        assert!(joined.contains("-map 0:v:0 -map 1:a:0"));
        assert!(joined.contains("-vf setpts=PTS-STARTPTS+0.500/TB,format=yuv420p"));
        assert!(joined.contains("-af asetpts=PTS-STARTPTS"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-c:a aac -b:a 128k"));
        assert!(joined.contains("-movflags +faststart"));
        assert_eq!(args.last().unwrap(), "/out/rec.mp4");
    }

    #[test]
    fn vaapi_device_precedes_inputs() {
        let muxer = Muxer::new(PathBuf::from("ffmpeg"));
        let plan = SyncPlan::compute(Duration::ZERO, Duration::ZERO, Duration::from_millis(100));
        let vaapi = EncodingStrategy::vaapi("/dev/dri/renderD128".into(), Quality::Medium);
        let args = muxer.build_args(
            &vaapi,
            &["-i".to_string(), "v.flv".to_string()],
            &["-i".to_string(), "a.flv".to_string()],
            &plan,
            Path::new("o.mp4"),
        );

        let device = args.iter().position(|a| a == "-vaapi_device").unwrap();
        let first_input = args.iter().position(|a| a == "-i").unwrap();
        assert!(device < first_input);
        assert!(args.contains(&"setpts=PTS-STARTPTS,format=nv12,hwupload".to_string()));
    }

    #[test]
    fn concat_list_quotes_paths() {
        let list = concat_list(&[
            PathBuf::from("/w/screenshare_1_1.flv"),
            PathBuf::from("/w/it's_2.flv"),
        ]);
        assert_eq!(
            list,
            "ffconcat version 1.0\nfile '/w/screenshare_1_1.flv'\nfile '/w/it'\\''s_2.flv'\n"
        );
    }

    #[tokio::test]
    async fn multi_segment_stream_uses_concat_demuxer() {
        let dir = TempDir::new().unwrap();
        let video = stream(
            StreamKind::Video,
            vec![dir.path().join("s_1.flv"), dir.path().join("s_2.flv")],
            0,
        );
        let args = input_args(&video, dir.path()).await.unwrap();
        assert_eq!(args[..4].to_vec(), vec!["-f", "concat", "-safe", "0"]);
        let list = std::fs::read_to_string(dir.path().join("video_segments.ffconcat")).unwrap();
        assert!(list.contains("s_1.flv"));
        assert!(list.find("s_1.flv") < list.find("s_2.flv"));
    }

    #[tokio::test]
    async fn successful_encode_produces_output() {
        let fx = Fixture::new();
        let ffmpeg = script(fx.dir.path(), "ffmpeg", WRITE_LAST_ARG);
        let output = fx.output();

        Muxer::new(ffmpeg)
            .mux(&software(), &fx.job(&output), &CancellationToken::new())
            .await
            .unwrap();

        assert!(std::fs::metadata(&output).unwrap().len() > 0);
        let args = std::fs::read_to_string(fx.dir.path().join("args.txt")).unwrap();
        assert!(args.contains("setpts=PTS-STARTPTS+0.500/TB"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_mux_failure_with_stderr() {
        let fx = Fixture::new();
        let ffmpeg = script(
            fx.dir.path(),
            "ffmpeg",
            "echo 'Invalid data found when processing input' >&2\nexit 1",
        );
        let output = fx.output();

        let err = Muxer::new(ffmpeg)
            .mux(&software(), &fx.job(&output), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            Error::MuxFailure { encoder, reason } => {
                assert_eq!(encoder, "software");
                assert!(reason.contains("Invalid data found"));
            }
            other => panic!("expected MuxFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_output_is_mux_failure() {
        let fx = Fixture::new();
        let ffmpeg = script(fx.dir.path(), "ffmpeg", "for last; do :; done\n: > \"$last\"");
        let output = fx.output();

        let err = Muxer::new(ffmpeg)
            .mux(&software(), &fx.job(&output), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MuxFailure { .. }));
        assert!(!output.exists(), "partial output must be removed");
    }

    #[tokio::test]
    async fn hung_encoder_is_killed_on_timeout() {
        let fx = Fixture::new();
        let ffmpeg = script(fx.dir.path(), "ffmpeg", "exec sleep 30");
        let output = fx.output();

        let started = std::time::Instant::now();
        let err = Muxer::new(ffmpeg)
            .with_timeout(Duration::from_millis(200))
            .mux(&software(), &fx.job(&output), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(10));
        match err {
            Error::MuxFailure { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("expected MuxFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_kills_encoder() {
        let fx = Fixture::new();
        let ffmpeg = script(fx.dir.path(), "ffmpeg", "exec sleep 30");
        let output = fx.output();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = Muxer::new(ffmpeg)
            .mux(&software(), &fx.job(&output), &cancel)
            .await
            .unwrap_err();
        match err {
            Error::MuxFailure { reason, .. } => assert_eq!(reason, "cancelled"),
            other => panic!("expected MuxFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn verification_requires_one_track_of_each_kind() {
        let fx = Fixture::new();
        let ffmpeg = script(fx.dir.path(), "ffmpeg", WRITE_LAST_ARG);
        let good_probe = script(
            fx.dir.path(),
            "ffprobe-good",
            r#"printf '{"streams":[{"codec_type":"video"},{"codec_type":"audio"}]}'"#,
        );
        let bad_probe = script(
            fx.dir.path(),
            "ffprobe-bad",
            r#"printf '{"streams":[{"codec_type":"video"},{"codec_type":"audio"},{"codec_type":"audio"}]}'"#,
        );
        let output = fx.output();

        Muxer::new(ffmpeg.clone())
            .with_ffprobe(Some(good_probe))
            .mux(&software(), &fx.job(&output), &CancellationToken::new())
            .await
            .unwrap();

        let err = Muxer::new(ffmpeg)
            .with_ffprobe(Some(bad_probe))
            .mux(&software(), &fx.job(&output), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            Error::MuxFailure { reason, .. } => assert!(reason.contains("2 audio")),
            other => panic!("expected MuxFailure, got {other:?}"),
        }
        assert!(!output.exists());
    }

    #[test]
    fn track_counting() {
        assert_eq!(
            count_tracks(br#"{"streams":[{"codec_type":"video"},{"codec_type":"data"}]}"#).unwrap(),
            (1, 0)
        );
        assert_eq!(count_tracks(b"{}").unwrap(), (0, 0));
        assert!(count_tracks(b"not json").is_err());
    }
}
