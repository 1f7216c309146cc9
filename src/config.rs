//! Configuration types for connect-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// HTTP behavior for page and archive retrieval
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    ///
    /// Some hosts serve a stripped-down page to unknown agents, so the default
    /// mimics a desktop browser.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Check free space in the workspace before streaming an archive (default: true)
    #[serde(default = "default_true")]
    pub check_disk_space: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
            check_disk_space: true,
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Encoding quality preset
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Small files, fast encode
    Low,
    /// Balanced (default)
    #[default]
    Medium,
    /// Near-transparent, slow encode
    High,
}

impl Quality {
    /// Constant rate factor for libx264 (lower is better)
    pub fn crf(&self) -> u8 {
        match self {
            Quality::Low => 28,
            Quality::Medium => 23,
            Quality::High => 18,
        }
    }

    /// Constant quality value for NVENC (`-cq`)
    pub fn nvenc_cq(&self) -> u8 {
        match self {
            Quality::Low => 30,
            Quality::Medium => 25,
            Quality::High => 19,
        }
    }

    /// Quantizer for VAAPI (`-qp`)
    pub fn vaapi_qp(&self) -> u8 {
        match self {
            Quality::Low => 30,
            Quality::Medium => 24,
            Quality::High => 19,
        }
    }

    /// libx264 preset name
    pub fn x264_preset(&self) -> &'static str {
        match self {
            Quality::Low => "veryfast",
            Quality::Medium => "medium",
            Quality::High => "slow",
        }
    }

    /// NVENC preset name (p1 fastest .. p7 best)
    pub fn nvenc_preset(&self) -> &'static str {
        match self {
            Quality::Low => "p2",
            Quality::Medium => "p4",
            Quality::High => "p6",
        }
    }
}

/// Hardware encoder families that can be probed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareEncoder {
    /// NVIDIA NVENC (`h264_nvenc`)
    Nvenc,
    /// VA-API (`h264_vaapi`), Intel/AMD on Linux
    Vaapi,
}

/// Encoder discovery, selection and invocation settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Path to ffprobe executable (auto-detected if None)
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    /// Whether to search PATH for binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Probe hardware encoders before falling back to software (default: true)
    #[serde(default = "default_true")]
    pub prefer_hardware: bool,

    /// Hardware encoders that must never be selected
    #[serde(default)]
    pub disabled: Vec<HardwareEncoder>,

    /// VA-API render node (default: /dev/dri/renderD128)
    #[serde(default = "default_vaapi_device")]
    pub vaapi_device: PathBuf,

    /// Encoding quality preset
    #[serde(default)]
    pub quality: Quality,

    /// AAC bitrate for the output audio track (default: "128k")
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Maximum wall time for one encode before the process is killed (default: 4 hours)
    #[serde(default = "default_encode_timeout", with = "duration_serde")]
    pub encode_timeout: Duration,

    /// Maximum wall time for one hardware capability probe (default: 15 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,

    /// Concurrent software encodes allowed (default: 1)
    #[serde(default = "default_software_encode_slots")]
    pub software_encode_slots: usize,

    /// Check the finished container with ffprobe when available (default: true)
    #[serde(default = "default_true")]
    pub verify_output: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            search_path: true,
            prefer_hardware: true,
            disabled: Vec::new(),
            vaapi_device: default_vaapi_device(),
            quality: Quality::default(),
            audio_bitrate: default_audio_bitrate(),
            encode_timeout: default_encode_timeout(),
            probe_timeout: default_probe_timeout(),
            software_encode_slots: default_software_encode_slots(),
            verify_output: true,
        }
    }
}

impl EncoderConfig {
    /// Resolve the ffmpeg binary from config or PATH
    pub fn resolve_ffmpeg(&self) -> Result<PathBuf> {
        resolve_binary("ffmpeg", self.ffmpeg_path.as_ref(), self.search_path).ok_or_else(|| {
            Error::ExternalTool(
                "ffmpeg not found: set encoder.ffmpeg_path or add ffmpeg to PATH".to_string(),
            )
        })
    }

    /// Resolve the ffprobe binary from config or PATH, if any
    pub fn resolve_ffprobe(&self) -> Option<PathBuf> {
        resolve_binary("ffprobe", self.ffprobe_path.as_ref(), self.search_path)
    }

    /// Whether a hardware family is allowed by configuration
    pub fn allows(&self, encoder: HardwareEncoder) -> bool {
        self.prefer_hardware && !self.disabled.contains(&encoder)
    }
}

fn resolve_binary(name: &str, explicit: Option<&PathBuf>, search_path: bool) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.clone()),
        None if search_path => which::which(name).ok(),
        None => None,
    }
}

/// Stream synchronization settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Start-offset difference tolerated without correction (default: 100 ms)
    #[serde(default = "default_drift_threshold", with = "duration_millis_serde")]
    pub drift_threshold: Duration,

    /// Maximum FLV tags scanned when looking for a stream's first timestamp (default: 4096)
    #[serde(default = "default_flv_scan_tags")]
    pub flv_scan_tags: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drift_threshold: default_drift_threshold(),
            flv_scan_tags: default_flv_scan_tags(),
        }
    }
}

/// File collision handling strategy for finished recordings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename
    Rename,
    /// Overwrite existing file
    Overwrite,
    /// Keep the existing file and report the job as done (default)
    #[default]
    Skip,
}

/// Batch execution and output placement
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Directory receiving finished recordings (default: "./recordings")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Parent directory for per-job workspaces (system temp dir if None)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Jobs fetched and extracted concurrently (default: 2)
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// What to do when the output file already exists
    #[serde(default)]
    pub file_collision: FileCollisionAction,

    /// Capacity of the event broadcast channel (default: 256)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            temp_dir: None,
            fetch_concurrency: default_fetch_concurrency(),
            file_collision: FileCollisionAction::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl BatchConfig {
    /// Parent directory for job workspaces
    pub fn workspace_root(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Main configuration for [`Pipeline`](crate::Pipeline)
///
/// Fields are organized into sub-configs:
/// - [`fetch`](FetchConfig) — HTTP timeouts and headers
/// - [`retry`](RetryConfig) — backoff for transient network failures
/// - [`encoder`](EncoderConfig) — ffmpeg discovery, hardware probing, quality
/// - [`sync`](SyncConfig) — drift threshold
/// - [`batch`](BatchConfig) — concurrency and output placement
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Retry settings for transient network failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Encoder settings
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Synchronization settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Batch settings
    #[serde(default)]
    pub batch: BatchConfig,
}

impl Config {
    /// Check values that would otherwise fail deep inside a job
    pub fn validate(&self) -> Result<()> {
        if self.batch.fetch_concurrency == 0 {
            return Err(config_error(
                "fetch_concurrency must be at least 1",
                "batch.fetch_concurrency",
            ));
        }
        if self.encoder.software_encode_slots == 0 {
            return Err(config_error(
                "software_encode_slots must be at least 1",
                "encoder.software_encode_slots",
            ));
        }
        if self.batch.event_capacity == 0 {
            return Err(config_error(
                "event_capacity must be at least 1",
                "batch.event_capacity",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(config_error(
                "backoff_multiplier must be >= 1.0",
                "retry.backoff_multiplier",
            ));
        }
        if self.fetch.request_timeout.is_zero() {
            return Err(config_error(
                "request_timeout must be non-zero",
                "fetch.request_timeout",
            ));
        }
        if self.encoder.encode_timeout.is_zero() {
            return Err(config_error(
                "encode_timeout must be non-zero",
                "encoder.encode_timeout",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_vaapi_device() -> PathBuf {
    PathBuf::from("/dev/dri/renderD128")
}

fn default_audio_bitrate() -> String {
    "128k".to_string()
}

fn default_encode_timeout() -> Duration {
    Duration::from_secs(4 * 60 * 60)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_software_encode_slots() -> usize {
    1
}

fn default_drift_threshold() -> Duration {
    Duration::from_millis(100)
}

fn default_flv_scan_tags() -> usize {
    4096
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./recordings")
}

fn default_fetch_concurrency() -> usize {
    2
}

fn default_event_capacity() -> usize {
    256
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
