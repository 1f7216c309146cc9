//! Recording archives, landing pages and stand-in encoder binaries

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// FLV tag type carrying audio
pub const AUDIO_TAG: u8 = 8;
/// FLV tag type carrying video
pub const VIDEO_TAG: u8 = 9;
/// FLV tag type carrying script data
pub const SCRIPT_TAG: u8 = 18;

/// What the host serves to a browser without a valid session
pub const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head><title>Sign In</title></head>
  <body>
    <form action="/system/login" method="post">
      <input name="login"/><input name="password" type="password"/>
    </form>
  </body>
</html>"#;

/// FLV bytes holding one tag per `(tag type, timestamp ms)` pair
pub fn flv_bytes(tags: &[(u8, u32)]) -> Vec<u8> {
    let mut out = b"FLV\x01\x05\x00\x00\x00\x09".to_vec();
    out.extend_from_slice(&0u32.to_be_bytes());
    for &(tag_type, ts) in tags {
        let payload = [0x55u8; 16];
        let size = payload.len() as u32;
        out.push(tag_type);
        out.extend_from_slice(&size.to_be_bytes()[1..]);
        out.extend_from_slice(&ts.to_be_bytes()[1..]);
        out.push((ts >> 24) as u8);
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(&payload);
        out.extend_from_slice(&(size + 11).to_be_bytes());
    }
    out
}

/// ZIP archive (stored, uncompressed) holding the given entries
pub fn zip_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A recording with one audio and one video stream starting at the given offsets
pub fn recording_zip(audio_offset_ms: u32, video_offset_ms: u32) -> Vec<u8> {
    zip_bytes(&[
        ("indexstream.xml", b"<root><Message/></root>".to_vec()),
        (
            "cameraVoip_1_3.flv",
            flv_bytes(&[(SCRIPT_TAG, 0), (AUDIO_TAG, audio_offset_ms)]),
        ),
        (
            "screenshare_2_5.flv",
            flv_bytes(&[(SCRIPT_TAG, 0), (VIDEO_TAG, video_offset_ms)]),
        ),
    ])
}

/// A recording whose audio track never made it into the archive
pub fn video_only_zip() -> Vec<u8> {
    zip_bytes(&[
        ("indexstream.xml", b"<root/>".to_vec()),
        ("screenshare_2_5.flv", flv_bytes(&[(VIDEO_TAG, 0)])),
    ])
}

/// Write an executable shell script
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// How the stand-in ffmpeg behaves
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FfmpegBehavior {
    /// Write a small payload to the output path (last argument)
    Succeed,
    /// Fail every NVENC encode, succeed otherwise
    NoNvenc,
    /// Never finish
    Hang,
}

/// Stand-in ffmpeg appending each invocation's arguments to `log`
///
/// Invocations are separated by a `--` line.
pub fn fake_ffmpeg(dir: &Path, log: &Path, behavior: FfmpegBehavior) -> PathBuf {
    let record = format!(
        "printf '%s\\n' \"$@\" >> '{log}'\necho -- >> '{log}'",
        log = log.display()
    );
    let finish = match behavior {
        FfmpegBehavior::Succeed => "for last; do :; done\nprintf 'fake mp4 payload' > \"$last\"",
        FfmpegBehavior::NoNvenc => {
            "case \" $* \" in *\" h264_nvenc \"*) echo 'No NVENC capable devices found' >&2; exit 1;; esac\nfor last; do :; done\nprintf 'fake mp4 payload' > \"$last\""
        }
        FfmpegBehavior::Hang => "exec sleep 30",
    };
    script(dir, "ffmpeg", &format!("{}\n{}", record, finish))
}

/// Stand-in ffprobe reporting one video and one audio track
pub fn fake_ffprobe(dir: &Path) -> PathBuf {
    script(
        dir,
        "ffprobe",
        r#"printf '{"streams":[{"codec_type":"video"},{"codec_type":"audio"}]}'"#,
    )
}

/// Recorded ffmpeg invocations, one argument list each
pub fn ffmpeg_calls(log: &Path) -> Vec<Vec<String>> {
    let content = std::fs::read_to_string(log).unwrap_or_default();
    content
        .split("--\n")
        .filter(|call| !call.trim().is_empty())
        .map(|call| call.lines().map(str::to_string).collect())
        .collect()
}
