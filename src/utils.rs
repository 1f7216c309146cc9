//! Utility functions for output naming, file placement and disk space

use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use crate::types::SessionId;
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Extension every finished recording carries
pub const OUTPUT_EXTENSION: &str = "mp4";

/// Where a job should put its output
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputTarget {
    /// Produce the recording at this path
    Write(PathBuf),
    /// A previous run already produced it; nothing to do
    Existing(PathBuf),
}

/// Replace characters that are unsafe in file names on common filesystems
///
/// Path separators, reserved Windows characters and control characters become
/// `_`; leading/trailing dots and spaces are trimmed. Never returns an empty
/// string.
///
/// # Examples
///
/// ```
/// use connect_dl::utils::safe_filename;
///
/// assert_eq!(safe_filename("Week 3: Intro/Overview?"), "Week 3_ Intro_Overview_");
/// ```
#[must_use]
pub fn safe_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "recording".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Output file name for a job: the caller's name or `recording_{session}.mp4`
///
/// `.mp4` is appended when the name does not already end with it
/// (case-insensitive).
#[must_use]
pub fn output_file_name(requested: Option<&str>, session: &SessionId) -> String {
    let base = match requested.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => format!("recording_{}", session),
    };
    let suffix = format!(".{}", OUTPUT_EXTENSION);
    let name = if base.to_ascii_lowercase().ends_with(&suffix) {
        base
    } else {
        format!("{}{}", base, suffix)
    };
    safe_filename(&name)
}

/// Decide the final output path according to the collision policy
///
/// # Examples
///
/// ```
/// use connect_dl::utils::{resolve_output_path, OutputTarget};
/// use connect_dl::config::FileCollisionAction;
/// use std::path::Path;
///
/// let target = resolve_output_path(Path::new("/nonexistent/dir/a.mp4"), FileCollisionAction::Skip).unwrap();
/// assert_eq!(target, OutputTarget::Write("/nonexistent/dir/a.mp4".into()));
/// ```
pub fn resolve_output_path(path: &Path, action: FileCollisionAction) -> Result<OutputTarget> {
    match action {
        FileCollisionAction::Overwrite => Ok(OutputTarget::Write(path.to_path_buf())),
        FileCollisionAction::Skip => {
            if path.exists() {
                Ok(OutputTarget::Existing(path.to_path_buf()))
            } else {
                Ok(OutputTarget::Write(path.to_path_buf()))
            }
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(OutputTarget::Write(path.to_path_buf()));
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| invalid_path(path, "cannot extract file stem"))?;
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path
                .parent()
                .ok_or_else(|| invalid_path(path, "cannot extract parent directory"))?;

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{} ({}).{}", stem, i, ext),
                    None => format!("{} ({})", stem, i),
                };
                let new_path = parent.join(new_name);
                if !new_path.exists() {
                    return Ok(OutputTarget::Write(new_path));
                }
            }

            Err(invalid_path(
                path,
                "could not find unique filename after 9999 attempts",
            ))
        }
    }
}

fn invalid_path(path: &Path, reason: &str) -> Error {
    Error::Io(std::io::Error::other(format!(
        "invalid output path {}: {}",
        path.display(),
        reason
    )))
}

/// Move a finished file into place
///
/// Tries a rename first; across filesystems falls back to copy + remove. The
/// destination's parent directory is created if needed.
pub async fn move_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    if tokio::fs::rename(source, dest).await.is_ok() {
        return Ok(());
    }

    tracing::debug!(?source, ?dest, "rename failed, copying across filesystems");
    tokio::fs::copy(source, dest).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!(
                "failed to move {} to {}: {}",
                source.display(),
                dest.display(),
                e
            ),
        ))
    })?;
    if let Err(e) = tokio::fs::remove_file(source).await {
        tracing::warn!(?source, error = %e, "failed to remove source after copy");
    }
    Ok(())
}

/// Get available disk space for a given path
///
/// Uses platform-specific APIs to query filesystem statistics:
/// - Linux/macOS: statvfs
/// - Windows: GetDiskFreeSpaceExW
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid, null-terminated C string, stat is zeroed
        // before the call and only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail: blocks available to unprivileged users
            #[allow(clippy::unnecessary_cast)]
            let available_bytes = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
            Ok(available_bytes)
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is null-terminated and every output pointer refers
        // to a live, aligned u64 that is only read after a successful call.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut _total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut _total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}

/// Fail with [`Error::InsufficientSpace`] if `dir` has less than `required` bytes free
///
/// A failing space query is logged and treated as "enough space".
pub fn ensure_space(dir: &Path, required: u64) -> Result<()> {
    match get_available_space(dir) {
        Ok(available) if available < required => {
            Err(Error::InsufficientSpace {
                required,
                available,
            })
        }
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!(?dir, error = %e, "could not check disk space, continuing");
            Ok(())
        }
    }
}
