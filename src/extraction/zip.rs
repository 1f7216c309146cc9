use crate::error::{Error, Result};
use crate::types::StreamKind;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A media entry name split into its parts
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StreamName {
    pub kind: StreamKind,
    /// Lowercased name prefix (`screenshare`, `cameravoip`); identifies one stream
    pub group: String,
    pub seq: u64,
}

/// Recognize `<kind>_<stream…>_<seq>.flv` entry names
///
/// `screenshare*` is video and `cameravoip*` is audio (case-insensitive).
/// Every segment sharing a prefix belongs to the same stream whatever its
/// stream id, so a share that was stopped and restarted stays one stream. A
/// missing or non-numeric sequence number sorts first.
pub(crate) fn parse_stream_name(file_name: &str) -> Option<StreamName> {
    let lower = file_name.to_ascii_lowercase();
    let stem = lower.strip_suffix(".flv")?;
    let parts: Vec<&str> = stem.split('_').collect();

    let prefix = parts.first().copied()?;
    let kind = if prefix.starts_with("screenshare") {
        StreamKind::Video
    } else if prefix.starts_with("cameravoip") {
        StreamKind::Audio
    } else {
        return None;
    };

    let seq = match parts.as_slice() {
        [_, .., last] => last.parse::<u64>().unwrap_or(0),
        _ => 0,
    };

    Some(StreamName {
        kind,
        group: prefix.to_string(),
        seq,
    })
}

/// Segments of one stream, sorted by sequence number then file name
pub(crate) type StreamGroups = BTreeMap<(StreamKind, String), Vec<(u64, PathBuf)>>;

/// Media stream extractor for recording archives
pub struct ZipStreamExtractor;

impl ZipStreamExtractor {
    /// Write every recognized media entry of `archive_path` into `dest_path`
    ///
    /// Entries are flattened into `dest_path` by file name. Unrecognized
    /// entries are skipped without being written.
    pub(crate) fn extract(archive_path: &Path, dest_path: &Path) -> Result<StreamGroups> {
        let corrupt = |reason: String| Error::CorruptAsset {
            path: archive_path.to_path_buf(),
            reason,
        };

        let file = std::fs::File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| corrupt(format!("failed to open ZIP archive: {}", e)))?;

        std::fs::create_dir_all(dest_path)?;

        let mut groups = StreamGroups::new();
        let mut written: HashSet<String> = HashSet::new();
        let mut skipped = 0usize;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| corrupt(format!("failed to read ZIP entry {}: {}", i, e)))?;

            if entry.is_dir() {
                continue;
            }

            let file_name = match entry
                .enclosed_name()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
            {
                Some(name) => name.to_string(),
                None => {
                    warn!(entry = entry.name(), "skipping entry with unsafe path");
                    continue;
                }
            };

            let Some(name) = parse_stream_name(&file_name) else {
                skipped += 1;
                continue;
            };

            if !written.insert(file_name.to_ascii_lowercase()) {
                warn!(entry = entry.name(), "skipping duplicate media entry");
                continue;
            }

            let out_path = dest_path.join(&file_name);
            let mut outfile = std::fs::File::create(&out_path)?;
            std::io::copy(&mut entry, &mut outfile).map_err(|e| match e.kind() {
                std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
                    corrupt(format!("failed to extract {}: {}", file_name, e))
                }
                _ => Error::Io(e),
            })?;

            debug!(entry = %file_name, kind = %name.kind, group = %name.group, seq = name.seq, "extracted media entry");

            groups
                .entry((name.kind, name.group))
                .or_default()
                .push((name.seq, out_path));
        }

        for segments in groups.values_mut() {
            segments.sort();
        }

        debug!(
            groups = groups.len(),
            skipped,
            "scanned archive for media streams"
        );

        Ok(groups)
    }
}
