//! Audio/video start alignment
//!
//! Recording hosts start each stream when its publisher connects, so the
//! audio and video of one session rarely share a zero point. The plan below
//! rebases both streams to zero and delays whichever one started later.

use crate::types::StreamKind;
use std::time::Duration;

/// Timing correction applied while muxing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncPlan {
    /// `|video start - audio start|`
    pub drift: Duration,
    /// The stream that started later, when the drift exceeds the threshold
    pub lagging: Option<StreamKind>,
    /// Delay inserted before the lagging stream (zero when uncorrected)
    pub delay: Duration,
}

impl SyncPlan {
    /// Plan the correction for two stream start offsets
    ///
    /// A drift within `threshold` is left alone. Otherwise the later stream
    /// is delayed by the full drift.
    ///
    /// # Examples
    ///
    /// ```
    /// use connect_dl::sync::SyncPlan;
    /// use connect_dl::StreamKind;
    /// use std::time::Duration;
    ///
    /// let plan = SyncPlan::compute(
    ///     Duration::ZERO,
    ///     Duration::from_millis(500),
    ///     Duration::from_millis(100),
    /// );
    /// assert_eq!(plan.lagging, Some(StreamKind::Video));
    /// assert_eq!(plan.delay, Duration::from_millis(500));
    /// ```
    pub fn compute(audio_offset: Duration, video_offset: Duration, threshold: Duration) -> Self {
        let (drift, later) = if video_offset >= audio_offset {
            (video_offset - audio_offset, StreamKind::Video)
        } else {
            (audio_offset - video_offset, StreamKind::Audio)
        };

        if drift <= threshold {
            return Self {
                drift,
                lagging: None,
                delay: Duration::ZERO,
            };
        }

        Self {
            drift,
            lagging: Some(later),
            delay: drift,
        }
    }

    /// Whether any stream is shifted
    pub fn is_corrected(&self) -> bool {
        self.lagging.is_some()
    }

    /// Delay applied to `kind`
    pub fn delay_for(&self, kind: StreamKind) -> Duration {
        if self.lagging == Some(kind) {
            self.delay
        } else {
            Duration::ZERO
        }
    }

    /// ffmpeg video filter: rebase to zero, then shift if video lags
    pub fn video_filter(&self) -> String {
        let delay = self.delay_for(StreamKind::Video);
        if delay.is_zero() {
            "setpts=PTS-STARTPTS".to_string()
        } else {
            format!("setpts=PTS-STARTPTS+{:.3}/TB", delay.as_secs_f64())
        }
    }

    /// ffmpeg audio filter: rebase to zero, then pad with silence if audio lags
    pub fn audio_filter(&self) -> String {
        let delay = self.delay_for(StreamKind::Audio);
        if delay.is_zero() {
            "asetpts=PTS-STARTPTS".to_string()
        } else {
            format!("asetpts=PTS-STARTPTS,adelay={}:all=1", delay.as_millis())
        }
    }
}
