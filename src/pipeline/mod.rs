//! Acquisition pipeline (decomposed into focused submodules)
//!
//! A [`Pipeline`] owns everything shared by the jobs of a run: the HTTP
//! client, the encoder strategy chosen at construction, the per-device encode
//! locks and the event channel. Jobs are driven by:
//! - [`job`]: one recording from URL to finished MP4
//! - [`batch`]: ordered, bounded-concurrency execution of many jobs

mod batch;
mod job;

use crate::config::Config;
use crate::encoder::{DeviceLocks, EncoderProbe, EncodingStrategy, FfmpegProbe, Muxer, select_strategy};
use crate::error::Result;
use crate::fetch::HttpFetcher;
use crate::types::Event;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Recording acquisition pipeline (cloneable - all shared state is Arc-wrapped)
#[derive(Clone)]
pub struct Pipeline {
    /// Configuration (wrapped in Arc for sharing across jobs)
    pub(crate) config: Arc<Config>,
    /// HTTP client shared by every job
    pub(crate) fetcher: HttpFetcher,
    /// ffmpeg runner
    pub(crate) muxer: Muxer,
    /// Strategy selected once at construction
    pub(crate) strategy: EncodingStrategy,
    /// Encode permits per physical device
    pub(crate) locks: Arc<DeviceLocks>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("strategy", &self.strategy)
            .field("output_dir", &self.config.batch.output_dir)
            .field("subscribers", &self.event_tx.receiver_count())
            .finish()
    }
}

impl Pipeline {
    /// Create a pipeline, probing the local ffmpeg for hardware encoders
    ///
    /// # Errors
    ///
    /// [`Error::Config`](crate::Error::Config) for invalid settings,
    /// [`Error::ExternalTool`](crate::Error::ExternalTool) if ffmpeg cannot be
    /// found.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use connect_dl::{Config, Pipeline};
    ///
    /// # async fn example() -> connect_dl::Result<()> {
    /// let pipeline = Pipeline::new(Config::default()).await?;
    /// let result = pipeline
    ///     .resolve_and_acquire("https://connect.example.edu/p1a2b3c4d5e/", None, Some("Lecture 1"))
    ///     .await;
    /// println!("{:?}", result.output_path);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let probe = FfmpegProbe::from_config(&config.encoder)?;
        Self::with_probe(config, &probe).await
    }

    /// Create a pipeline whose encoder is chosen by a custom probe
    pub async fn with_probe(config: Config, probe: &dyn EncoderProbe) -> Result<Self> {
        config.validate()?;
        let strategy = select_strategy(probe, &config.encoder).await;
        let muxer = Muxer::from_config(&config.encoder)?;
        Self::from_parts(config, strategy, muxer)
    }

    /// Create a pipeline with an already chosen strategy and muxer
    pub fn from_parts(config: Config, strategy: EncodingStrategy, muxer: Muxer) -> Result<Self> {
        config.validate()?;
        let fetcher = HttpFetcher::new(&config.fetch, &config.retry)?;
        let (event_tx, _) = broadcast::channel(config.batch.event_capacity);
        let locks = Arc::new(DeviceLocks::new(config.encoder.software_encode_slots));

        tracing::info!(
            encoder = strategy.name(),
            output_dir = ?config.batch.output_dir,
            fetch_concurrency = config.batch.fetch_concurrency,
            "pipeline ready"
        );

        Ok(Self {
            config: Arc::new(config),
            fetcher,
            muxer,
            strategy,
            locks,
            event_tx,
        })
    }

    /// Subscribe to job events
    ///
    /// Multiple subscribers are supported. A subscriber that falls more than
    /// `batch.event_capacity` events behind receives
    /// `RecvError::Lagged` and continues from the oldest retained event.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use connect_dl::{Config, Pipeline};
    /// # async fn example() -> connect_dl::Result<()> {
    /// let pipeline = Pipeline::new(Config::default()).await?;
    /// let mut events = pipeline.subscribe();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         tracing::info!(?event, "pipeline event");
    ///     }
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Encoding strategy every job starts with
    pub fn strategy(&self) -> &EncodingStrategy {
        &self.strategy
    }

    /// Current configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    ///
    /// Events are dropped when nobody is subscribed.
    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
