//! Encoding strategies and their ffmpeg parameters

use crate::config::{HardwareEncoder, Quality};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the video track is compressed
///
/// Each variant carries the concrete parameters passed to ffmpeg. Audio is
/// always AAC regardless of strategy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EncodingStrategy {
    /// NVIDIA NVENC (`h264_nvenc`)
    HardwareNvenc {
        /// NVENC preset (p1..p7)
        preset: String,
        /// Constant quality value
        cq: u8,
    },
    /// VA-API (`h264_vaapi`)
    HardwareVaapi {
        /// DRM render node
        device: PathBuf,
        /// Constant QP value
        qp: u8,
    },
    /// CPU encoding with libx264; always available
    Software {
        /// x264 preset
        preset: String,
        /// Constant rate factor
        crf: u8,
    },
}

/// Physical encoder a strategy occupies while running
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeviceKey {
    /// The NVENC engine
    Nvenc,
    /// One VA-API render node
    Vaapi(PathBuf),
    /// CPU
    Software,
}

impl EncodingStrategy {
    /// NVENC with parameters for a quality profile
    pub fn nvenc(quality: Quality) -> Self {
        Self::HardwareNvenc {
            preset: quality.nvenc_preset().to_string(),
            cq: quality.nvenc_cq(),
        }
    }

    /// VA-API on `device` with parameters for a quality profile
    pub fn vaapi(device: PathBuf, quality: Quality) -> Self {
        Self::HardwareVaapi {
            device,
            qp: quality.vaapi_qp(),
        }
    }

    /// libx264 with parameters for a quality profile
    pub fn software(quality: Quality) -> Self {
        Self::Software {
            preset: quality.x264_preset().to_string(),
            crf: quality.crf(),
        }
    }

    /// Short name used in logs, events and errors
    pub fn name(&self) -> &'static str {
        match self {
            Self::HardwareNvenc { .. } => "nvenc",
            Self::HardwareVaapi { .. } => "vaapi",
            Self::Software { .. } => "software",
        }
    }

    /// ffmpeg video codec
    pub fn codec(&self) -> &'static str {
        match self {
            Self::HardwareNvenc { .. } => "h264_nvenc",
            Self::HardwareVaapi { .. } => "h264_vaapi",
            Self::Software { .. } => "libx264",
        }
    }

    /// Hardware family, `None` for software
    pub fn hardware(&self) -> Option<HardwareEncoder> {
        match self {
            Self::HardwareNvenc { .. } => Some(HardwareEncoder::Nvenc),
            Self::HardwareVaapi { .. } => Some(HardwareEncoder::Vaapi),
            Self::Software { .. } => None,
        }
    }

    /// True for NVENC and VA-API
    pub fn is_hardware(&self) -> bool {
        self.hardware().is_some()
    }

    /// The device whose lock must be held while this strategy encodes
    pub fn device_key(&self) -> DeviceKey {
        match self {
            Self::HardwareNvenc { .. } => DeviceKey::Nvenc,
            Self::HardwareVaapi { device, .. } => DeviceKey::Vaapi(device.clone()),
            Self::Software { .. } => DeviceKey::Software,
        }
    }

    /// Options that must precede the inputs
    pub(crate) fn global_args(&self) -> Vec<String> {
        match self {
            Self::HardwareVaapi { device, .. } => vec![
                "-vaapi_device".to_string(),
                device.to_string_lossy().into_owned(),
            ],
            _ => Vec::new(),
        }
    }

    /// Filter appended to the video chain to get frames onto the encoder
    pub(crate) fn pixel_filter(&self) -> &'static str {
        match self {
            Self::HardwareVaapi { .. } => "format=nv12,hwupload",
            _ => "format=yuv420p",
        }
    }

    /// Video codec options
    pub(crate) fn video_args(&self) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.codec().to_string()];
        match self {
            Self::HardwareNvenc { preset, cq } => {
                args.extend([
                    "-preset".to_string(),
                    preset.clone(),
                    "-rc".to_string(),
                    "vbr".to_string(),
                    "-cq".to_string(),
                    cq.to_string(),
                    "-b:v".to_string(),
                    "0".to_string(),
                ]);
            }
            Self::HardwareVaapi { qp, .. } => {
                args.extend(["-qp".to_string(), qp.to_string()]);
            }
            Self::Software { preset, crf } => {
                args.extend([
                    "-preset".to_string(),
                    preset.clone(),
                    "-crf".to_string(),
                    crf.to_string(),
                ]);
            }
        }
        args
    }
}

impl std::fmt::Display for EncodingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
