//! # connect-dl
//!
//! Library for archiving web-conference recordings as single MP4 files.
//!
//! A recording URL is resolved to its session identifier, the session's
//! archive is downloaded with the caller's cookies, the separate audio and
//! video streams are pulled out of it, their start times are aligned, and
//! ffmpeg muxes them into one file (on NVENC or VA-API hardware when it
//! works, in software otherwise).
//!
//! ## Quick Start
//!
//! ```no_run
//! use connect_dl::{CancellationToken, Config, Credential, JobSpec, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.batch.output_dir = "recordings".into();
//!
//!     let pipeline = Pipeline::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let cookie = Credential::parse("BREEZESESSION=breezbreez123").ok_or("bad cookie")?;
//!     let jobs = vec![
//!         JobSpec::new("https://connect.example.edu/p1a2b3c4d5e/").with_credential(cookie),
//!     ];
//!     let batch = pipeline.run_batch(jobs, CancellationToken::new()).await;
//!     for result in batch {
//!         println!("{} -> {:?} {:?}", result.url, result.output_path, result.error);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Encoder probing, selection and muxing
pub mod encoder;
/// Error types
pub mod error;
/// Archive unpacking and stream discovery
pub mod extraction;
/// HTTP page and archive retrieval
pub mod fetch;
/// Job orchestration
pub mod pipeline;
/// Session identifier resolution
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Audio/video start alignment
pub mod sync;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, FileCollisionAction, Quality};
pub use encoder::EncodingStrategy;
pub use error::{Error, ErrorKind, Result};
pub use pipeline::Pipeline;
pub use tokio_util::sync::CancellationToken;
pub use types::{
    BatchResult, Credential, Event, JobResult, JobSpec, ResolvedSession, SessionId, StreamKind,
};

/// Cancel `token` when the process receives a termination signal
///
/// Spawns a task that waits for the signal; jobs already running stop at
/// their next checkpoint and no new job starts. The task ends early if the
/// token is cancelled some other way.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Must be called from within a Tokio runtime.
///
/// # Example
///
/// ```no_run
/// use connect_dl::{CancellationToken, Config, Pipeline, cancel_on_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = Pipeline::new(Config::default()).await?;
///     let cancel = CancellationToken::new();
///     cancel_on_signal(cancel.clone());
///
///     let batch = pipeline.run_batch(Vec::new(), cancel).await;
///     println!("{} jobs", batch.len());
///     Ok(())
/// }
/// ```
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            received = wait_for_signal() => {
                if received {
                    tracing::info!("cancelling running jobs");
                    token.cancel();
                }
            }
            _ = token.cancelled() => {}
        }
    })
}

/// Resolves once a signal arrives; `false` if no handler could be installed
#[cfg(unix)]
async fn wait_for_signal() -> bool {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
            true
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
                true
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.is_ok()
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
                true
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.is_ok()
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> bool {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            false
        }
    }
}
