//! Encoder selection

use super::probe::EncoderProbe;
use super::strategy::EncodingStrategy;
use crate::config::{EncoderConfig, HardwareEncoder};

/// Hardware candidates allowed by `config`, in priority order
///
/// NVENC before VA-API. Empty when hardware is not preferred.
pub fn hardware_candidates(config: &EncoderConfig) -> Vec<EncodingStrategy> {
    let mut candidates = Vec::new();
    if config.allows(HardwareEncoder::Nvenc) {
        candidates.push(EncodingStrategy::nvenc(config.quality));
    }
    if config.allows(HardwareEncoder::Vaapi) {
        candidates.push(EncodingStrategy::vaapi(
            config.vaapi_device.clone(),
            config.quality,
        ));
    }
    candidates
}

/// Pick the first working strategy: NVENC, then VA-API, then software
///
/// Probe failures are logged and never fatal; software is always returned
/// as the last resort.
pub async fn select_strategy(probe: &dyn EncoderProbe, config: &EncoderConfig) -> EncodingStrategy {
    for candidate in hardware_candidates(config) {
        match probe.probe(&candidate).await {
            Ok(()) => {
                tracing::info!(encoder = candidate.name(), probe = probe.name(), "hardware encoder selected");
                return candidate;
            }
            Err(e) => {
                tracing::info!(
                    encoder = candidate.name(),
                    probe = probe.name(),
                    error = %e,
                    "hardware encoder unavailable, trying next"
                );
            }
        }
    }

    let software = EncodingStrategy::software(config.quality);
    tracing::info!(encoder = software.name(), "software encoder selected");
    software
}
