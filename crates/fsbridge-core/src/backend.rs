//! Backend capability set.
//!
//! This module defines the abstract interface that stores must implement to
//! be mounted. The adapter interacts only through these traits, enabling a
//! clean separation between Windows request semantics and the store.
//!
//! ## Base capability and optional capabilities
//!
//! Every store implements [`Backend`]: enumerate, stat and open-for-read.
//! Everything else is optional and independently checkable. A store opts in
//! by implementing the capability trait and returning `Some(self)` from the
//! matching accessor:
//!
//! ```rust,ignore
//! impl Backend for MyStore {
//!     // ... stat / read_dir / open ...
//!     fn remover(&self) -> Option<&dyn Remove> {
//!         Some(self)
//!     }
//! }
//! ```
//!
//! The adapter asks for a capability on every call and never assumes one is
//! present; a missing capability always has a defined "not supported"
//! outcome.
//!
//! ## Paths
//!
//! Paths are relative, slash-separated and never empty. The root of the
//! store is `"."`.

use crate::error::Result;
use crate::types::{DirEntry, DiskSpace, Metadata, OpenFlags};
use std::fmt;
use std::io::{self, Read, Seek, Write};

/// Positional read that does not move any cursor.
pub trait ReadAt {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

/// Positional write that does not move any cursor.
pub trait WriteAt {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize>;
}

/// Change the length of an open stream.
pub trait Resize {
    fn resize(&mut self, size: u64) -> io::Result<()>;
}

/// An open file on a backend.
///
/// Each accessor exposes one optional stream capability. A reader that can
/// only stream forward returns `Some` from [`FileStream::reader`] and `None`
/// from [`FileStream::seeker`]; the adapter picks its offset strategy from
/// what is available.
pub trait FileStream: Send {
    /// Sequential reads
    fn reader(&mut self) -> Option<&mut dyn Read> {
        None
    }

    /// Sequential writes
    fn writer(&mut self) -> Option<&mut dyn Write> {
        None
    }

    /// Absolute repositioning of the sequential cursor
    fn seeker(&mut self) -> Option<&mut dyn Seek> {
        None
    }

    /// Random-access reads
    fn reader_at(&mut self) -> Option<&mut dyn ReadAt> {
        None
    }

    /// Random-access writes
    fn writer_at(&mut self) -> Option<&mut dyn WriteAt> {
        None
    }

    /// In-place truncation / extension
    fn resizer(&mut self) -> Option<&mut dyn Resize> {
        None
    }

    /// Release the stream. Called exactly once by the adapter.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// An open directory that yields entries in batches.
pub trait DirStream: Send {
    /// Return up to `max` further entries. An empty batch means the
    /// directory is exhausted.
    fn read_batch(&mut self, max: usize) -> Result<Vec<DirEntry>>;
}

/// Open a file for writing with the given flags.
pub trait OpenWriter: Send + Sync {
    fn open_writer(&self, path: &str, flags: OpenFlags) -> Result<Box<dyn FileStream>>;
}

/// Remove a file or an empty directory.
pub trait Remove: Send + Sync {
    fn remove(&self, path: &str) -> Result<()>;
}

/// Rename or move an entry.
pub trait Rename: Send + Sync {
    fn rename(&self, from: &str, to: &str) -> Result<()>;
}

/// Create a directory.
pub trait MakeDir: Send + Sync {
    fn mkdir(&self, path: &str) -> Result<()>;
}

/// Change the length of a file by path.
pub trait Truncate: Send + Sync {
    fn truncate(&self, path: &str, size: u64) -> Result<()>;
}

/// Open a directory for streaming enumeration.
pub trait OpenDir: Send + Sync {
    fn open_dir(&self, path: &str) -> Result<Box<dyn DirStream>>;
}

/// Report capacity numbers computed on demand.
pub trait DiskSpaceQuery: Send + Sync {
    fn free_space(&self) -> Result<DiskSpace>;
}

/// Abstract trait for mountable stores.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`: the native driver calls into the
/// adapter from many worker threads at once, and those calls reach the
/// backend concurrently.
///
/// ## Error Handling
///
/// Backends should return the most specific [`crate::FsError`] variant that
/// applies; the adapter maps it to a native status once.
pub trait Backend: Send + Sync {
    /// Describe one entry.
    fn stat(&self, path: &str) -> Result<Metadata>;

    /// List a directory in one call.
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Open a file for reading.
    fn open(&self, path: &str) -> Result<Box<dyn FileStream>>;

    /// Optional: open files for writing
    fn writer(&self) -> Option<&dyn OpenWriter> {
        None
    }

    /// Optional: remove entries
    fn remover(&self) -> Option<&dyn Remove> {
        None
    }

    /// Optional: rename entries
    fn renamer(&self) -> Option<&dyn Rename> {
        None
    }

    /// Optional: create directories
    fn dir_maker(&self) -> Option<&dyn MakeDir> {
        None
    }

    /// Optional: truncate by path
    fn truncater(&self) -> Option<&dyn Truncate> {
        None
    }

    /// Optional: stream directory listings
    fn dir_opener(&self) -> Option<&dyn OpenDir> {
        None
    }

    /// Optional: compute capacity on demand
    fn disk_space(&self) -> Option<&dyn DiskSpaceQuery> {
        None
    }

    /// Get the backend name (e.g., "memory", "dir")
    fn name(&self) -> &'static str;
}

/// Snapshot of which optional capabilities a backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub write: bool,
    pub remove: bool,
    pub rename: bool,
    pub mkdir: bool,
    pub truncate: bool,
    pub open_dir: bool,
    pub disk_space: bool,
}

impl Capabilities {
    /// Probe a backend
    pub fn of(backend: &dyn Backend) -> Self {
        Capabilities {
            write: backend.writer().is_some(),
            remove: backend.remover().is_some(),
            rename: backend.renamer().is_some(),
            mkdir: backend.dir_maker().is_some(),
            truncate: backend.truncater().is_some(),
            open_dir: backend.dir_opener().is_some(),
            disk_space: backend.disk_space().is_some(),
        }
    }

    /// True when no mutating capability is present
    pub fn is_read_only(&self) -> bool {
        !(self.write || self.remove || self.rename || self.mkdir || self.truncate)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.write, "write"),
            (self.remove, "remove"),
            (self.rename, "rename"),
            (self.mkdir, "mkdir"),
            (self.truncate, "truncate"),
            (self.open_dir, "open_dir"),
            (self.disk_space, "disk_space"),
        ];
        let present: Vec<&str> = names
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, name)| *name)
            .collect();
        if present.is_empty() {
            write!(f, "read-only")
        } else {
            write!(f, "{}", present.join(","))
        }
    }
}

/// A [`DirStream`] over an already materialized listing.
pub struct VecDirStream {
    entries: std::vec::IntoIter<DirEntry>,
}

impl VecDirStream {
    pub fn new(entries: Vec<DirEntry>) -> Self {
        VecDirStream {
            entries: entries.into_iter(),
        }
    }
}

impl DirStream for VecDirStream {
    fn read_batch(&mut self, max: usize) -> Result<Vec<DirEntry>> {
        Ok(self.entries.by_ref().take(max).collect())
    }
}

impl ReadAt for std::fs::File {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        #[cfg(unix)]
        {
            std::os::unix::fs::FileExt::read_at(self, buf, offset)
        }
        #[cfg(windows)]
        {
            std::os::windows::fs::FileExt::seek_read(self, buf, offset)
        }
    }
}

impl WriteAt for std::fs::File {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        #[cfg(unix)]
        {
            std::os::unix::fs::FileExt::write_at(self, buf, offset)
        }
        #[cfg(windows)]
        {
            std::os::windows::fs::FileExt::seek_write(self, buf, offset)
        }
    }
}

impl Resize for std::fs::File {
    fn resize(&mut self, size: u64) -> io::Result<()> {
        self.set_len(size)
    }
}

impl FileStream for std::fs::File {
    fn reader(&mut self) -> Option<&mut dyn Read> {
        Some(self)
    }

    fn writer(&mut self) -> Option<&mut dyn Write> {
        Some(self)
    }

    fn seeker(&mut self) -> Option<&mut dyn Seek> {
        Some(self)
    }

    fn reader_at(&mut self) -> Option<&mut dyn ReadAt> {
        Some(self)
    }

    fn writer_at(&mut self) -> Option<&mut dyn WriteAt> {
        Some(self)
    }

    fn resizer(&mut self) -> Option<&mut dyn Resize> {
        Some(self)
    }

    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BareStore;

    impl Backend for BareStore {
        fn stat(&self, path: &str) -> Result<Metadata> {
            Err(crate::FsError::not_found(path))
        }

        fn read_dir(&self, _path: &str) -> Result<Vec<DirEntry>> {
            Ok(Vec::new())
        }

        fn open(&self, path: &str) -> Result<Box<dyn FileStream>> {
            Err(crate::FsError::not_found(path))
        }

        fn name(&self) -> &'static str {
            "bare"
        }
    }

    #[test]
    fn test_defaults_expose_no_capabilities() {
        let caps = Capabilities::of(&BareStore);
        assert_eq!(caps, Capabilities::default());
        assert!(caps.is_read_only());
        assert_eq!(caps.to_string(), "read-only");
    }

    #[test]
    fn test_vec_dir_stream_batches() {
        let entries = (0..5)
            .map(|i| DirEntry::new(format!("f{}", i), Metadata::file(i)))
            .collect();
        let mut stream = VecDirStream::new(entries);

        assert_eq!(stream.read_batch(2).unwrap().len(), 2);
        assert_eq!(stream.read_batch(2).unwrap().len(), 2);
        assert_eq!(stream.read_batch(2).unwrap().len(), 1);
        assert!(stream.read_batch(2).unwrap().is_empty());
    }
}
