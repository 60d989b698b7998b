//! Error types for the Dokan adapter.

use fsbridge_core::FsError;
use thiserror::Error;

/// Result type alias using MountError
pub type Result<T> = std::result::Result<T, MountError>;

/// Errors raised while loading the driver, mounting or unmounting.
#[derive(Error, Debug)]
pub enum MountError {
    /// dokan2.dll could not be loaded or an entry point is missing
    #[error("Dokan driver unavailable: {reason}")]
    DriverUnavailable { reason: String },

    /// The installed library is older than the adapter supports
    #[error("Dokan version {found} is older than the minimum supported {required}")]
    VersionMismatch { found: u32, required: u32 },

    /// DokanCreateFileSystem failed without a more specific reason
    #[error("failed to mount (code {code})")]
    Generic { code: i32 },

    /// The drive letter is invalid or already taken
    #[error("bad drive letter")]
    BadDriveLetter,

    /// The kernel driver could not be installed
    #[error("Dokan driver install error")]
    DriverInstall,

    /// The driver reported a start failure
    #[error("Dokan start error")]
    Start,

    /// The volume could not be attached to the mount point
    #[error("Dokan mount failed")]
    Mount,

    /// The mount point is malformed or unusable
    #[error("mount point is invalid: {mount_point}")]
    BadMountPoint { mount_point: String },

    /// The driver never confirmed the mount
    #[error("timed out after {secs}s waiting for {mount_point} to mount")]
    MountTimeout { mount_point: String, secs: u64 },

    /// The native close call failed
    #[error("failed to close mount {mount_point}: {reason}")]
    Close { mount_point: String, reason: String },

    /// The driver refused a change notification
    #[error("failed to send {kind} notification for {path}")]
    Notify { kind: &'static str, path: String },

    /// Windows API error
    #[error("Windows API error: {function} failed with code {code}: {message}")]
    WinApi {
        function: String,
        code: u32,
        message: String,
    },

    /// Backend failure surfaced outside a callback
    #[error(transparent)]
    Backend(#[from] FsError),
}

impl MountError {
    /// Map a DokanCreateFileSystem return code to an error.
    pub fn from_create_code(code: i32, mount_point: &str) -> Self {
        match code {
            -2 => MountError::BadDriveLetter,
            -3 => MountError::DriverInstall,
            -4 => MountError::Start,
            -5 => MountError::Mount,
            -6 => MountError::BadMountPoint {
                mount_point: mount_point.to_string(),
            },
            -7 => MountError::VersionMismatch {
                found: 0,
                required: crate::ffi::DOKAN_MINIMUM_COMPATIBLE_VERSION,
            },
            code => MountError::Generic { code },
        }
    }

    /// Create an unavailable-driver error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        MountError::DriverUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a WinAPI error from the last Windows error
    #[cfg(windows)]
    pub fn from_win32(function: &str) -> Self {
        use windows::Win32::Foundation::GetLastError;

        let code = unsafe { GetLastError().0 };
        MountError::WinApi {
            function: function.to_string(),
            code,
            message: format_win32_error(code),
        }
    }

    /// Check if this error means the driver is not usable at all
    pub fn is_driver_unavailable(&self) -> bool {
        matches!(
            self,
            MountError::DriverUnavailable { .. }
                | MountError::VersionMismatch { .. }
                | MountError::DriverInstall
        )
    }
}

/// Format a Win32 error code to a human-readable message
#[cfg(windows)]
fn format_win32_error(code: u32) -> String {
    use windows::core::PWSTR;
    use windows::Win32::System::Diagnostics::Debug::{
        FormatMessageW, FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS,
    };

    let mut buffer = [0u16; 512];
    let len = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            None,
            code,
            0,
            PWSTR(buffer.as_mut_ptr()),
            buffer.len() as u32,
            None,
        )
    };

    if len == 0 {
        return format!("Unknown error ({})", code);
    }

    String::from_utf16_lossy(&buffer[..len as usize])
        .trim()
        .to_string()
}
