//! Host directory backend.

use super::validate;
use crate::backend::{
    Backend, DirStream, FileStream, MakeDir, OpenDir, OpenWriter, Remove, Rename, Truncate,
};
use crate::error::{FsError, Result};
use crate::types::{DirEntry, Metadata, OpenFlags};
use std::fs::{self, File, OpenOptions, ReadDir};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// A backend rooted at a directory on the host.
///
/// Read-only by default; [`DirFs::writable`] exposes the writer, remove,
/// rename, mkdir and truncate capabilities. Directory streaming is always
/// available.
pub struct DirFs {
    root: PathBuf,
    writable: bool,
}

impl DirFs {
    /// Open a host directory read-only.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root =
            fs::canonicalize(root).map_err(|e| FsError::from_io(e, root.display().to_string()))?;
        if !root.is_dir() {
            return Err(FsError::NotADirectory {
                path: root.display().to_string(),
            });
        }
        debug!(root = %root.display(), "Opened host directory backend");
        Ok(DirFs {
            root,
            writable: false,
        })
    }

    /// Allow or refuse mutating operations
    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    /// The canonical host root
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        validate(path)?;
        if path == "." {
            return Ok(self.root.clone());
        }
        Ok(path
            .split('/')
            .filter(|part| *part != ".")
            .fold(self.root.clone(), |acc, part| acc.join(part)))
    }
}

impl Backend for DirFs {
    fn stat(&self, path: &str) -> Result<Metadata> {
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full).map_err(|e| FsError::from_io(e, path))?;
        Ok(Metadata::from(&meta))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let full = self.resolve(path)?;
        let entries = fs::read_dir(&full).map_err(|e| FsError::from_io(e, path))?;
        let mut listing = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FsError::from_io(e, path))?;
            listing.push(to_dir_entry(&entry));
        }
        Ok(listing)
    }

    fn open(&self, path: &str) -> Result<Box<dyn FileStream>> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(FsError::IsADirectory {
                path: path.to_string(),
            });
        }
        let file = File::open(&full).map_err(|e| FsError::from_io(e, path))?;
        trace!(path, "host open");
        Ok(Box::new(file))
    }

    fn writer(&self) -> Option<&dyn OpenWriter> {
        self.writable.then_some(self as &dyn OpenWriter)
    }

    fn remover(&self) -> Option<&dyn Remove> {
        self.writable.then_some(self as &dyn Remove)
    }

    fn renamer(&self) -> Option<&dyn Rename> {
        self.writable.then_some(self as &dyn Rename)
    }

    fn dir_maker(&self) -> Option<&dyn MakeDir> {
        self.writable.then_some(self as &dyn MakeDir)
    }

    fn truncater(&self) -> Option<&dyn Truncate> {
        self.writable.then_some(self as &dyn Truncate)
    }

    fn dir_opener(&self) -> Option<&dyn OpenDir> {
        Some(self)
    }

    fn name(&self) -> &'static str {
        "dir"
    }
}

impl OpenWriter for DirFs {
    fn open_writer(&self, path: &str, flags: OpenFlags) -> Result<Box<dyn FileStream>> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(FsError::IsADirectory {
                path: path.to_string(),
            });
        }
        let file = flags
            .to_open_options()
            .open(&full)
            .map_err(|e| FsError::from_io(e, path))?;
        trace!(path, %flags, "host open_writer");
        Ok(Box::new(file))
    }
}

impl Remove for DirFs {
    fn remove(&self, path: &str) -> Result<()> {
        if path == "." {
            return Err(FsError::permission_denied("remove", path));
        }
        let full = self.resolve(path)?;
        let meta = fs::symlink_metadata(&full).map_err(|e| FsError::from_io(e, path))?;
        let result = if meta.is_dir() {
            fs::remove_dir(&full)
        } else {
            fs::remove_file(&full)
        };
        result.map_err(|e| FsError::from_io(e, path))
    }
}

impl Rename for DirFs {
    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        fs::rename(&source, &target).map_err(|e| FsError::from_io(e, from))
    }
}

impl MakeDir for DirFs {
    fn mkdir(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        fs::create_dir(&full).map_err(|e| FsError::from_io(e, path))
    }
}

impl Truncate for DirFs {
    fn truncate(&self, path: &str, size: u64) -> Result<()> {
        let full = self.resolve(path)?;
        let file = OpenOptions::new()
            .write(true)
            .open(&full)
            .map_err(|e| FsError::from_io(e, path))?;
        file.set_len(size).map_err(|e| FsError::from_io(e, path))
    }
}

impl OpenDir for DirFs {
    fn open_dir(&self, path: &str) -> Result<Box<dyn DirStream>> {
        let full = self.resolve(path)?;
        let inner = fs::read_dir(&full).map_err(|e| FsError::from_io(e, path))?;
        Ok(Box::new(HostDirStream {
            path: path.to_string(),
            inner,
        }))
    }
}

struct HostDirStream {
    path: String,
    inner: ReadDir,
}

impl DirStream for HostDirStream {
    fn read_batch(&mut self, max: usize) -> Result<Vec<DirEntry>> {
        let mut batch = Vec::with_capacity(max.min(256));
        while batch.len() < max {
            match self.inner.next() {
                Some(entry) => {
                    let entry = entry.map_err(|e| FsError::from_io(e, self.path.as_str()))?;
                    batch.push(to_dir_entry(&entry));
                }
                None => break,
            }
        }
        Ok(batch)
    }
}

fn to_dir_entry(entry: &fs::DirEntry) -> DirEntry {
    DirEntry {
        name: entry.file_name().to_string_lossy().into_owned(),
        metadata: entry.metadata().ok().map(|meta| Metadata::from(&meta)),
    }
}
