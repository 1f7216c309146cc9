//! Hardware encoder capability probing

use super::strategy::EncodingStrategy;
use crate::config::EncoderConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Trait for checking whether an encoding strategy works on this machine
///
/// Implementations return `Ok(())` when the strategy can encode and an error
/// describing why not otherwise. The selector treats every error as "try the
/// next candidate".
///
/// # Examples
///
/// ```no_run
/// use connect_dl::encoder::{EncoderProbe, EncodingStrategy, FfmpegProbe};
/// use connect_dl::config::{EncoderConfig, Quality};
///
/// # async fn example() -> connect_dl::Result<()> {
/// let probe = FfmpegProbe::from_config(&EncoderConfig::default())?;
/// if probe.probe(&EncodingStrategy::nvenc(Quality::Medium)).await.is_ok() {
///     println!("NVENC available");
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait EncoderProbe: Send + Sync {
    /// Check that `candidate` can encode
    ///
    /// # Errors
    ///
    /// Any error means the candidate is unavailable.
    async fn probe(&self, candidate: &EncodingStrategy) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Probe that asks the local ffmpeg binary
///
/// A candidate passes when ffmpeg lists its codec and a one-frame synthetic
/// encode succeeds. Both commands run under the probe timeout.
pub struct FfmpegProbe {
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl FfmpegProbe {
    /// Create a probe for an explicit ffmpeg binary
    pub fn new(ffmpeg: PathBuf, timeout: Duration) -> Self {
        Self { ffmpeg, timeout }
    }

    /// Create a probe using the configured (or PATH) ffmpeg
    pub fn from_config(config: &EncoderConfig) -> Result<Self> {
        Ok(Self::new(config.resolve_ffmpeg()?, config.probe_timeout))
    }

    async fn run(&self, args: &[String]) -> Result<std::process::Output> {
        let child = Command::new(&self.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("failed to execute ffmpeg: {}", e)))?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(Error::ExternalTool(format!("ffmpeg probe failed: {}", e))),
            Err(_) => Err(Error::ExternalTool(format!(
                "ffmpeg probe timed out after {:?}",
                self.timeout
            ))),
        }
    }

    async fn lists_encoder(&self, codec: &str) -> Result<()> {
        let output = self
            .run(&["-hide_banner".to_string(), "-encoders".to_string()])
            .await?;

        let listing = String::from_utf8_lossy(&output.stdout);
        let listed = listing
            .lines()
            .any(|line| line.split_whitespace().nth(1) == Some(codec));

        if listed {
            Ok(())
        } else {
            Err(Error::ExternalTool(format!("ffmpeg does not list {}", codec)))
        }
    }

    async fn test_encode(&self, candidate: &EncodingStrategy) -> Result<()> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];
        args.extend(candidate.global_args());
        args.extend([
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            "color=c=black:s=256x256:r=1:d=1".to_string(),
            "-vf".to_string(),
            candidate.pixel_filter().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
        ]);
        args.extend(candidate.video_args());
        args.extend(["-f".to_string(), "null".to_string(), "-".to_string()]);

        let output = self.run(&args).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::ExternalTool(format!(
                "{} test encode failed: {}",
                candidate.codec(),
                stderr_tail(&output.stderr)
            )))
        }
    }
}

#[async_trait]
impl EncoderProbe for FfmpegProbe {
    async fn probe(&self, candidate: &EncodingStrategy) -> Result<()> {
        if let EncodingStrategy::HardwareVaapi { device, .. } = candidate
            && !device.exists()
        {
            return Err(Error::ExternalTool(format!(
                "VA-API device {} does not exist",
                device.display()
            )));
        }

        self.lists_encoder(candidate.codec()).await?;
        self.test_encode(candidate).await
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Last few lines of a process's stderr, for error messages
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    const TAIL_LINES: usize = 5;

    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(TAIL_LINES);
    let tail = lines[start..].join(" | ");
    if tail.is_empty() {
        "no diagnostics".to_string()
    } else {
        tail
    }
}
