//! Archive unpacking into elementary streams
//!
//! A recording archive holds FLV segments per stream (`screenshare_*` for
//! video, `cameraVoip_*` for audio) plus XML metadata. This module writes the
//! media segments into the job workspace, groups them by name prefix into
//! exactly one audio and one video stream, and reads each stream's start
//! offset from its first segment.

mod flv;
mod zip;

pub use self::flv::first_timestamp;
pub use self::zip::ZipStreamExtractor;

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::types::{StreamFile, StreamKind};
use self::zip::StreamGroups;
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::info;

/// The audio and video streams of one recording
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedStreams {
    /// Audio stream
    pub audio: StreamFile,
    /// Video stream
    pub video: StreamFile,
}

/// Unpack `archive` into `dest` and discover its two streams
///
/// Runs on the blocking pool.
///
/// # Errors
///
/// - [`Error::CorruptAsset`] if the ZIP cannot be parsed or a media entry is not FLV
/// - [`Error::IncompleteAsset`] if a stream kind is missing or ambiguous
///
/// # Example
/// ```no_run
/// use connect_dl::extraction::extract_streams;
/// use connect_dl::config::SyncConfig;
/// use std::path::Path;
///
/// # async fn example() -> connect_dl::Result<()> {
/// let streams = extract_streams(
///     Path::new("/tmp/job/asset.zip"),
///     Path::new("/tmp/job/streams"),
///     &SyncConfig::default(),
/// ).await?;
/// println!("video starts at {:?}", streams.video.start_offset);
/// # Ok(())
/// # }
/// ```
pub async fn extract_streams(
    archive: &Path,
    dest: &Path,
    config: &SyncConfig,
) -> Result<ExtractedStreams> {
    let archive_owned = archive.to_path_buf();
    let dest_owned = dest.to_path_buf();
    let scan_tags = config.flv_scan_tags;

    let streams = spawn_blocking(move || extract_blocking(&archive_owned, &dest_owned, scan_tags))
        .await
        .map_err(|e| Error::CorruptAsset {
            path: archive.to_path_buf(),
            reason: format!("extraction task panicked: {}", e),
        })??;

    info!(
        ?archive,
        audio_segments = streams.audio.segments.len(),
        video_segments = streams.video.segments.len(),
        audio_offset_ms = streams.audio.start_offset.as_millis() as u64,
        video_offset_ms = streams.video.start_offset.as_millis() as u64,
        "streams extracted"
    );

    Ok(streams)
}

fn extract_blocking(archive: &Path, dest: &Path, scan_tags: usize) -> Result<ExtractedStreams> {
    let mut groups = ZipStreamExtractor::extract(archive, dest)?;

    let video = take_stream(&mut groups, StreamKind::Video, archive, scan_tags)?;
    let audio = take_stream(&mut groups, StreamKind::Audio, archive, scan_tags)?;

    Ok(ExtractedStreams { audio, video })
}

fn take_stream(
    groups: &mut StreamGroups,
    kind: StreamKind,
    archive: &Path,
    scan_tags: usize,
) -> Result<StreamFile> {
    let keys: Vec<_> = groups.keys().filter(|(k, _)| *k == kind).cloned().collect();

    let key = match keys.as_slice() {
        [] => {
            return Err(Error::IncompleteAsset {
                archive: archive.to_path_buf(),
                reason: format!("no {} stream", kind),
            });
        }
        [key] => key.clone(),
        many => {
            let names: Vec<&str> = many.iter().map(|(_, group)| group.as_str()).collect();
            return Err(Error::IncompleteAsset {
                archive: archive.to_path_buf(),
                reason: format!(
                    "{} {} streams, expected one: {}",
                    many.len(),
                    kind,
                    names.join(", ")
                ),
            });
        }
    };

    let segments: Vec<PathBuf> = groups
        .remove(&key)
        .unwrap_or_default()
        .into_iter()
        .map(|(_, path)| path)
        .collect();

    let Some(first) = segments.first() else {
        return Err(Error::IncompleteAsset {
            archive: archive.to_path_buf(),
            reason: format!("{} stream has no segments", kind),
        });
    };

    let start_offset = first_timestamp(first, kind, scan_tags)?;

    Ok(StreamFile {
        kind,
        segments,
        start_offset,
    })
}
