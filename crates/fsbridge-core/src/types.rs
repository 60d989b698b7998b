//! Core data types shared by backends and the adapter.
//!
//! These types are deliberately POSIX-flavoured: they describe what a
//! backend knows about its entries, not how Windows wants to see them.
//! Translation to native structures happens in the adapter crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a backend reports about one entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    /// True if this is a directory, false for files
    pub is_dir: bool,

    /// File size in bytes (0 for directories)
    pub size: u64,

    /// Last modification time, if the backend tracks one
    pub modified: Option<DateTime<Utc>>,

    /// Whether writes to the entry are refused
    pub readonly: bool,
}

impl Metadata {
    /// Metadata for a regular file of the given size
    pub fn file(size: u64) -> Self {
        Metadata {
            is_dir: false,
            size,
            modified: None,
            readonly: false,
        }
    }

    /// Metadata for a directory
    pub fn dir() -> Self {
        Metadata {
            is_dir: true,
            size: 0,
            modified: None,
            readonly: false,
        }
    }

    /// Set the modification time
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Mark the entry read-only
    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }
}

impl From<&std::fs::Metadata> for Metadata {
    fn from(meta: &std::fs::Metadata) -> Self {
        Metadata {
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            readonly: meta.permissions().readonly(),
        }
    }
}

/// One entry of a directory listing.
///
/// `metadata` is optional: a listing may name an entry whose details could
/// not be fetched, and the entry is still reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name without any directory component
    pub name: String,

    /// Entry details, when available
    pub metadata: Option<Metadata>,
}

impl DirEntry {
    /// Create a new directory entry
    pub fn new(name: impl Into<String>, metadata: Metadata) -> Self {
        DirEntry {
            name: name.into(),
            metadata: Some(metadata),
        }
    }

    /// Whether the entry is a directory (unknown entries count as files)
    pub fn is_dir(&self) -> bool {
        self.metadata.as_ref().map(|m| m.is_dir).unwrap_or(false)
    }
}

/// Capacity numbers for a volume, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiskSpace {
    /// Total size of the volume
    pub total: u64,

    /// Bytes available to the calling user
    pub available: u64,

    /// Total free bytes on the volume
    pub free: u64,
}

impl DiskSpace {
    /// Capacity where every free byte is available to the caller
    pub fn new(total: u64, available: u64) -> Self {
        DiskSpace {
            total,
            available,
            free: available,
        }
    }
}

/// How a writer stream should be opened.
///
/// Derived once per open request and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
    pub exclusive: bool,
}

impl OpenFlags {
    /// Read-only access, no creation modifiers
    pub const READ_ONLY: OpenFlags = OpenFlags {
        read: true,
        write: false,
        append: false,
        create: false,
        truncate: false,
        exclusive: false,
    };

    /// Write-only access
    pub fn write_only() -> Self {
        OpenFlags {
            read: false,
            write: true,
            ..Default::default()
        }
    }

    /// Read and write access
    pub fn read_write() -> Self {
        OpenFlags {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    /// Write access positioned at the end of the file
    pub fn append() -> Self {
        OpenFlags {
            read: false,
            write: true,
            append: true,
            ..Default::default()
        }
    }

    /// Set the create modifier
    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Set the truncate modifier
    pub fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    /// Set the exclusive-create modifier
    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    /// True when the flags grant no write access
    pub fn is_read_only(&self) -> bool {
        !self.write
    }

    /// Translate into `std::fs::OpenOptions` for host-backed stores
    pub fn to_open_options(&self) -> std::fs::OpenOptions {
        let mut options = std::fs::OpenOptions::new();
        options
            .read(self.read)
            .write(self.write && !self.append)
            .append(self.append);
        if self.exclusive {
            options.create_new(true);
        } else {
            options.create(self.create).truncate(self.truncate);
        }
        options
    }
}

impl fmt::Display for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match (self.read, self.write, self.append) {
            (_, true, true) => "append",
            (true, true, false) => "rdwr",
            (false, true, false) => "wronly",
            _ => "rdonly",
        };
        write!(f, "{}", mode)?;
        if self.create {
            write!(f, "|create")?;
        }
        if self.truncate {
            write!(f, "|trunc")?;
        }
        if self.exclusive {
            write!(f, "|excl")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_flags_display() {
        assert_eq!(OpenFlags::READ_ONLY.to_string(), "rdonly");
        assert_eq!(
            OpenFlags::read_write()
                .with_create(true)
                .with_truncate(true)
                .to_string(),
            "rdwr|create|trunc"
        );
        assert_eq!(OpenFlags::append().to_string(), "append");
        assert_eq!(
            OpenFlags::write_only().with_exclusive(true).to_string(),
            "wronly|excl"
        );
    }

    #[test]
    fn test_read_only_detection() {
        assert!(OpenFlags::READ_ONLY.is_read_only());
        assert!(!OpenFlags::write_only().is_read_only());
        assert!(!OpenFlags::append().is_read_only());
    }

    #[test]
    fn test_dir_entry_without_metadata_is_file() {
        let entry = DirEntry {
            name: "x".to_string(),
            metadata: None,
        };
        assert!(!entry.is_dir());
        assert!(DirEntry::new("d", Metadata::dir()).is_dir());
    }
}
