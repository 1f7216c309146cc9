//! Minimal FLV container reader
//!
//! Only what is needed to find when a stream starts: the file header and the
//! tag headers. Tag payloads are skipped, never decoded.

use crate::error::{Error, Result};
use crate::types::StreamKind;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

const SIGNATURE: &[u8; 3] = b"FLV";
const HEADER_LEN: usize = 9;
const TAG_HEADER_LEN: usize = 11;
const PREVIOUS_TAG_SIZE_LEN: i64 = 4;

const TAG_AUDIO: u8 = 8;
const TAG_VIDEO: u8 = 9;

fn tag_type_for(kind: StreamKind) -> u8 {
    match kind {
        StreamKind::Audio => TAG_AUDIO,
        StreamKind::Video => TAG_VIDEO,
    }
}

/// Timestamp of the first tag of `kind` in an FLV file
///
/// At most `scan_tags` tags are inspected. A valid file without such a tag
/// within the budget, or one that ends early, starts at zero.
///
/// # Errors
///
/// [`Error::CorruptAsset`] when the file does not start with an FLV header.
pub fn first_timestamp(path: &Path, kind: StreamKind, scan_tags: usize) -> Result<Duration> {
    let corrupt = |reason: &str| Error::CorruptAsset {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let mut reader = BufReader::new(File::open(path)?);

    let mut header = [0u8; HEADER_LEN];
    if let Err(e) = reader.read_exact(&mut header) {
        return Err(match e.kind() {
            ErrorKind::UnexpectedEof => corrupt("file is shorter than an FLV header"),
            _ => Error::Io(e),
        });
    }
    if &header[..3] != SIGNATURE {
        return Err(corrupt("missing FLV signature"));
    }

    let data_offset = u32::from_be_bytes([header[5], header[6], header[7], header[8]]);
    if (data_offset as usize) < HEADER_LEN {
        return Err(corrupt("FLV header declares an invalid data offset"));
    }

    let wanted = tag_type_for(kind);
    reader.seek(SeekFrom::Start(u64::from(data_offset)))?;
    reader.seek_relative(PREVIOUS_TAG_SIZE_LEN)?;

    let mut tag = [0u8; TAG_HEADER_LEN];
    for _ in 0..scan_tags {
        match reader.read_exact(&mut tag) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(Error::Io(e)),
        }

        // Low five bits; bit 5 marks encrypted (filtered) payloads
        let tag_type = tag[0] & 0x1F;
        let data_size = u32::from_be_bytes([0, tag[1], tag[2], tag[3]]);
        let timestamp = u32::from_be_bytes([tag[7], tag[4], tag[5], tag[6]]);

        if tag_type == wanted {
            return Ok(Duration::from_millis(u64::from(timestamp)));
        }

        reader.seek_relative(i64::from(data_size) + PREVIOUS_TAG_SIZE_LEN)?;
    }

    tracing::debug!(?path, %kind, scan_tags, "no matching FLV tag found, assuming zero offset");
    Ok(Duration::ZERO)
}
