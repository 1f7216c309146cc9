//! Encoder selection and muxing
//!
//! The pipeline picks one [`EncodingStrategy`] at startup with
//! [`select_strategy`], then every job muxes through [`Muxer`] while holding
//! the matching [`DeviceLocks`] permit. Hardware strategies are probed with
//! an [`EncoderProbe`]; the default [`FfmpegProbe`] asks the local ffmpeg.

mod locks;
mod muxer;
mod probe;
mod selector;
mod strategy;

pub use locks::DeviceLocks;
pub use muxer::{MuxJob, Muxer};
pub use probe::{EncoderProbe, FfmpegProbe};
pub use selector::{hardware_candidates, select_strategy};
pub use strategy::{DeviceKey, EncodingStrategy};
