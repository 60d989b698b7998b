//! Create-request negotiation.
//!
//! Turns the (access mask, disposition, options) triple of a `ZwCreateFile`
//! request into backend open flags. The table below is the whole contract:
//!
//! | disposition    | create | truncate | exclusive |
//! |----------------|--------|----------|-----------|
//! | SUPERSEDE      | yes    | yes      | no        |
//! | OPEN           | no     | no       | no        |
//! | CREATE         | yes    | no       | yes       |
//! | OPEN_IF        | yes    | no       | no        |
//! | OVERWRITE      | no     | yes      | no        |
//! | OVERWRITE_IF   | yes    | yes      | no        |
//!
//! The modifiers only reach the open flags for read-write and write-only
//! opens; read-only and append opens never carry them.

use crate::ffi::{
    FILE_APPEND_DATA, FILE_CREATE, FILE_DELETE_ON_CLOSE, FILE_DIRECTORY_FILE,
    FILE_NON_DIRECTORY_FILE, FILE_OPEN, FILE_OPEN_IF, FILE_OVERWRITE, FILE_OVERWRITE_IF,
    FILE_READ_DATA, FILE_SUPERSEDE, FILE_WRITE_DATA,
};
use crate::status::NtStatus;
use fsbridge_core::OpenFlags;

/// The create disposition of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Supersede,
    Open,
    Create,
    OpenIf,
    Overwrite,
    OverwriteIf,
}

impl Disposition {
    /// Create the entry when it is missing
    pub fn creates(self) -> bool {
        matches!(
            self,
            Disposition::Supersede
                | Disposition::Create
                | Disposition::OpenIf
                | Disposition::OverwriteIf
        )
    }

    /// Open with zero length
    pub fn truncates(self) -> bool {
        matches!(
            self,
            Disposition::Supersede | Disposition::Overwrite | Disposition::OverwriteIf
        )
    }

    /// Fail when the entry already exists
    pub fn exclusive(self) -> bool {
        self == Disposition::Create
    }
}

impl TryFrom<u32> for Disposition {
    type Error = NtStatus;

    fn try_from(value: u32) -> Result<Self, NtStatus> {
        match value {
            FILE_SUPERSEDE => Ok(Disposition::Supersede),
            FILE_OPEN => Ok(Disposition::Open),
            FILE_CREATE => Ok(Disposition::Create),
            FILE_OPEN_IF => Ok(Disposition::OpenIf),
            FILE_OVERWRITE => Ok(Disposition::Overwrite),
            FILE_OVERWRITE_IF => Ok(Disposition::OverwriteIf),
            _ => Err(NtStatus::INVALID_PARAMETER),
        }
    }
}

/// Backend open mode derived from the access mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
    Append,
}

impl AccessMode {
    /// Read+write wins over either single direction; append only applies
    /// when no data bit is set.
    pub fn from_access(access: u32) -> Self {
        let read = access & FILE_READ_DATA != 0;
        let write = access & FILE_WRITE_DATA != 0;

        if read && write {
            AccessMode::ReadWrite
        } else if read {
            AccessMode::ReadOnly
        } else if write {
            AccessMode::WriteOnly
        } else if access & FILE_APPEND_DATA != 0 {
            AccessMode::Append
        } else {
            AccessMode::ReadOnly
        }
    }
}

/// A decoded create request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateRequest {
    pub disposition: Disposition,
    pub mode: AccessMode,
    /// FILE_DIRECTORY_FILE
    pub directory: bool,
    /// FILE_NON_DIRECTORY_FILE
    pub non_directory: bool,
    pub delete_on_close: bool,
}

impl CreateRequest {
    pub fn parse(access: u32, disposition: u32, options: u32) -> Result<Self, NtStatus> {
        Ok(CreateRequest {
            disposition: Disposition::try_from(disposition)?,
            mode: AccessMode::from_access(access),
            directory: options & FILE_DIRECTORY_FILE != 0,
            non_directory: options & FILE_NON_DIRECTORY_FILE != 0,
            delete_on_close: options & FILE_DELETE_ON_CLOSE != 0,
        })
    }

    pub fn create(&self) -> bool {
        self.disposition.creates()
    }

    pub fn truncate(&self) -> bool {
        self.disposition.truncates()
    }

    pub fn exclusive(&self) -> bool {
        self.disposition.exclusive()
    }

    /// Open flags handed to the backend's writer
    pub fn open_flags(&self) -> OpenFlags {
        let base = match self.mode {
            AccessMode::ReadOnly => return OpenFlags::READ_ONLY,
            AccessMode::Append => return OpenFlags::append(),
            AccessMode::WriteOnly => OpenFlags::write_only(),
            AccessMode::ReadWrite => OpenFlags::read_write(),
        };
        base.with_create(self.create())
            .with_truncate(self.truncate())
            .with_exclusive(self.exclusive())
    }
}
