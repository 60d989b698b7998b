//! NTSTATUS values and the backend error mapping.

use fsbridge_core::FsError;
use std::fmt;
use std::io;

/// An NTSTATUS result code as returned to the driver.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NtStatus(pub i32);

impl NtStatus {
    pub const SUCCESS: NtStatus = NtStatus(0);
    pub const INVALID_PARAMETER: NtStatus = NtStatus(0xC000_000Du32 as i32);
    pub const END_OF_FILE: NtStatus = NtStatus(0xC000_0011u32 as i32);
    pub const ACCESS_DENIED: NtStatus = NtStatus(0xC000_0022u32 as i32);
    pub const OBJECT_NAME_NOT_FOUND: NtStatus = NtStatus(0xC000_0034u32 as i32);
    pub const OBJECT_NAME_COLLISION: NtStatus = NtStatus(0xC000_0035u32 as i32);
    pub const FILE_IS_A_DIRECTORY: NtStatus = NtStatus(0xC000_00BAu32 as i32);
    pub const NOT_SUPPORTED: NtStatus = NtStatus(0xC000_00BBu32 as i32);
    pub const DIRECTORY_NOT_EMPTY: NtStatus = NtStatus(0xC000_0101u32 as i32);
    pub const NOT_A_DIRECTORY: NtStatus = NtStatus(0xC000_0103u32 as i32);

    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// Symbolic name, for logs
    pub fn name(self) -> &'static str {
        match self {
            NtStatus::SUCCESS => "STATUS_SUCCESS",
            NtStatus::INVALID_PARAMETER => "STATUS_INVALID_PARAMETER",
            NtStatus::END_OF_FILE => "STATUS_END_OF_FILE",
            NtStatus::ACCESS_DENIED => "STATUS_ACCESS_DENIED",
            NtStatus::OBJECT_NAME_NOT_FOUND => "STATUS_OBJECT_NAME_NOT_FOUND",
            NtStatus::OBJECT_NAME_COLLISION => "STATUS_OBJECT_NAME_COLLISION",
            NtStatus::FILE_IS_A_DIRECTORY => "STATUS_FILE_IS_A_DIRECTORY",
            NtStatus::NOT_SUPPORTED => "STATUS_NOT_SUPPORTED",
            NtStatus::DIRECTORY_NOT_EMPTY => "STATUS_DIRECTORY_NOT_EMPTY",
            NtStatus::NOT_A_DIRECTORY => "STATUS_NOT_A_DIRECTORY",
            _ => "STATUS_UNKNOWN",
        }
    }

    /// Collapse a dispatch result into the status handed to the driver
    pub fn from_result<T>(result: std::result::Result<T, NtStatus>) -> NtStatus {
        match result {
            Ok(_) => NtStatus::SUCCESS,
            Err(status) => status,
        }
    }
}

impl fmt::Debug for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:08X})", self.name(), self.0 as u32)
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<&FsError> for NtStatus {
    fn from(err: &FsError) -> Self {
        match err {
            FsError::NotFound { .. } => NtStatus::OBJECT_NAME_NOT_FOUND,
            FsError::AlreadyExists { .. } => NtStatus::OBJECT_NAME_COLLISION,
            FsError::PermissionDenied { .. } => NtStatus::ACCESS_DENIED,
            FsError::InvalidPath { .. } | FsError::InvalidArgument { .. } => {
                NtStatus::INVALID_PARAMETER
            }
            FsError::IsADirectory { .. } => NtStatus::FILE_IS_A_DIRECTORY,
            FsError::NotADirectory { .. } => NtStatus::NOT_A_DIRECTORY,
            FsError::DirectoryNotEmpty { .. } => NtStatus::DIRECTORY_NOT_EMPTY,
            FsError::EndOfFile => NtStatus::END_OF_FILE,
            FsError::Unsupported { .. } => NtStatus::NOT_SUPPORTED,
            FsError::Io(inner) => NtStatus::from(inner),
            FsError::Config { .. } => NtStatus::ACCESS_DENIED,
        }
    }
}

impl From<FsError> for NtStatus {
    fn from(err: FsError) -> Self {
        NtStatus::from(&err)
    }
}

impl From<&io::Error> for NtStatus {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => NtStatus::OBJECT_NAME_NOT_FOUND,
            io::ErrorKind::AlreadyExists => NtStatus::OBJECT_NAME_COLLISION,
            io::ErrorKind::PermissionDenied => NtStatus::ACCESS_DENIED,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                NtStatus::INVALID_PARAMETER
            }
            io::ErrorKind::UnexpectedEof => NtStatus::END_OF_FILE,
            io::ErrorKind::IsADirectory => NtStatus::FILE_IS_A_DIRECTORY,
            io::ErrorKind::NotADirectory => NtStatus::NOT_A_DIRECTORY,
            io::ErrorKind::DirectoryNotEmpty => NtStatus::DIRECTORY_NOT_EMPTY,
            io::ErrorKind::Unsupported => NtStatus::NOT_SUPPORTED,
            _ => NtStatus::ACCESS_DENIED,
        }
    }
}

impl From<io::Error> for NtStatus {
    fn from(err: io::Error) -> Self {
        NtStatus::from(&err)
    }
}
