//! Path translation between the driver and the backend.
//!
//! The driver hands out absolute, backslash-separated UTF-16 paths rooted at
//! the volume (`\dir\file.txt`). Backends want relative, slash-separated
//! paths with `"."` for the root.

use fsbridge_core::{FsError, Result};
use std::path::{Path, PathBuf};
use widestring::{U16CStr, U16CString};

/// Backend marker for the volume root
pub const ROOT: &str = ".";

/// Convert a native path to a backend path.
pub fn normalize(native: &str) -> Result<String> {
    let slashed = native.replace('\\', "/");
    let trimmed = slashed.trim_start_matches('/').trim_end_matches('/');

    if trimmed.is_empty() {
        return Ok(ROOT.to_string());
    }

    if trimmed
        .split('/')
        .any(|component| component.is_empty() || component == "..")
    {
        return Err(FsError::invalid_path(native));
    }

    Ok(trimmed.to_string())
}

/// Convert a UTF-16 native path to a backend path.
pub fn normalize_wide(native: &U16CStr) -> Result<String> {
    let decoded = native
        .to_string()
        .map_err(|_| FsError::invalid_path(native.to_string_lossy()))?;
    normalize(&decoded)
}

/// The native absolute path of a backend path on a mounted volume, used for
/// change notifications.
pub fn native_path(mount_point: &str, relative: &str) -> Result<U16CString> {
    let relative = normalize(relative)?;
    let mut full = mount_point.trim_end_matches('\\').to_string();
    if relative != ROOT {
        full.push('\\');
        full.push_str(&relative.replace('/', "\\"));
    } else {
        full.push('\\');
    }
    U16CString::from_str(&full).map_err(|_| FsError::invalid_path(full))
}

/// Resolve a user-supplied mount point.
///
/// A bare drive letter (`X` or `X:`) becomes `X:\`. Other relative paths are
/// made absolute against the current directory.
pub fn resolve_mount_point(raw: &str) -> Result<String> {
    let bytes = raw.as_bytes();
    let is_letter = |b: u8| b.is_ascii_alphabetic();

    match bytes {
        [letter] if is_letter(*letter) => return Ok(format!("{}:\\", raw)),
        [letter, b':'] if is_letter(*letter) => return Ok(format!("{}\\", raw)),
        [letter, b':', b'\\'] | [letter, b':', b'/'] if is_letter(*letter) => {
            return Ok(format!("{}:\\", *letter as char))
        }
        [] => return Err(FsError::invalid_path(raw)),
        _ => {}
    }

    if is_absolute(raw) {
        return Ok(raw.to_string());
    }

    let cwd: PathBuf = std::env::current_dir()?;
    Ok(cwd.join(Path::new(raw)).to_string_lossy().into_owned())
}

fn is_absolute(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let drive_rooted = bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/');
    drive_rooted || raw.starts_with("\\\\") || Path::new(raw).is_absolute()
}
