//! In-memory backend with individually switchable capabilities.
//!
//! `MemoryFs` keeps the whole tree in a `BTreeMap` keyed by relative path.
//! Every optional capability can be turned off through the builder, which
//! makes it the store of choice for exercising capability negotiation.

use crate::backend::{
    Backend, Capabilities, DirStream, DiskSpaceQuery, FileStream, MakeDir, OpenDir, OpenWriter,
    ReadAt, Remove, Rename, Resize, Truncate, VecDirStream, WriteAt,
};
use super::validate;
use crate::error::{FsError, Result};
use crate::types::{DirEntry, DiskSpace, Metadata, OpenFlags};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use tracing::trace;

const ROOT: &str = ".";

struct FileData {
    bytes: Vec<u8>,
    modified: DateTime<Utc>,
    readonly: bool,
}

enum Node {
    File(Arc<RwLock<FileData>>),
    Dir { modified: DateTime<Utc> },
}

impl Node {
    fn metadata(&self) -> Metadata {
        match self {
            Node::File(data) => {
                let data = data.read();
                Metadata::file(data.bytes.len() as u64)
                    .with_modified(data.modified)
                    .with_readonly(data.readonly)
            }
            Node::Dir { modified } => Metadata::dir().with_modified(*modified),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Node::Dir { .. })
    }
}

/// Which stream capabilities opened files expose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCaps {
    pub seek: bool,
    pub random_access: bool,
    pub resize: bool,
}

impl Default for StreamCaps {
    fn default() -> Self {
        StreamCaps {
            seek: true,
            random_access: true,
            resize: true,
        }
    }
}

/// Builder for [`MemoryFs`]
pub struct MemoryFsBuilder {
    nodes: BTreeMap<String, Node>,
    caps: Capabilities,
    streams: StreamCaps,
    capacity: DiskSpace,
}

impl MemoryFsBuilder {
    /// Add a file, creating missing parent directories
    pub fn file(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.add_parents(path);
        self.nodes.insert(
            path.to_string(),
            Node::File(Arc::new(RwLock::new(FileData {
                bytes: contents.into(),
                modified: Utc::now(),
                readonly: false,
            }))),
        );
        self
    }

    /// Add a file that refuses writers
    pub fn readonly_file(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self = self.file(path, contents);
        if let Some(Node::File(data)) = self.nodes.get(path) {
            data.write().readonly = true;
        }
        self
    }

    /// Add a directory, creating missing parents
    pub fn dir(mut self, path: &str) -> Self {
        self.add_parents(path);
        self.nodes.insert(
            path.to_string(),
            Node::Dir {
                modified: Utc::now(),
            },
        );
        self
    }

    /// Replace the optional capability set
    pub fn capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    /// Enable every mutating capability
    pub fn writable(mut self) -> Self {
        self.caps.write = true;
        self.caps.remove = true;
        self.caps.rename = true;
        self.caps.mkdir = true;
        self.caps.truncate = true;
        self
    }

    /// Expose streaming directory listings
    pub fn streaming_dirs(mut self, enabled: bool) -> Self {
        self.caps.open_dir = enabled;
        self
    }

    /// Choose the stream capabilities of opened files
    pub fn streams(mut self, streams: StreamCaps) -> Self {
        self.streams = streams;
        self
    }

    /// Expose a capacity query with the given total size
    pub fn capacity(mut self, total: u64) -> Self {
        self.caps.disk_space = true;
        self.capacity = DiskSpace::new(total, total);
        self
    }

    pub fn build(self) -> MemoryFs {
        MemoryFs {
            nodes: RwLock::new(self.nodes),
            caps: self.caps,
            streams: self.streams,
            capacity: self.capacity,
        }
    }

    fn add_parents(&mut self, path: &str) {
        let mut current = parent_of(path);
        while current != ROOT {
            self.nodes
                .entry(current.to_string())
                .or_insert_with(|| Node::Dir {
                    modified: Utc::now(),
                });
            current = parent_of(current);
        }
    }
}

/// In-memory hierarchical store.
pub struct MemoryFs {
    nodes: RwLock<BTreeMap<String, Node>>,
    caps: Capabilities,
    streams: StreamCaps,
    capacity: DiskSpace,
}

impl MemoryFs {
    /// Start building a store containing only the root directory.
    ///
    /// All optional capabilities start disabled.
    pub fn builder() -> MemoryFsBuilder {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            ROOT.to_string(),
            Node::Dir {
                modified: Utc::now(),
            },
        );
        MemoryFsBuilder {
            nodes,
            caps: Capabilities::default(),
            streams: StreamCaps::default(),
            capacity: DiskSpace::default(),
        }
    }

    /// Current contents of a file, for inspection
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.nodes.read().get(path) {
            Some(Node::File(data)) => Some(data.read().bytes.clone()),
            _ => None,
        }
    }

    /// Number of entries, the root included
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Whether only the root remains
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    fn stream(&self, data: Arc<RwLock<FileData>>, flags: OpenFlags) -> MemoryFile {
        let pos = if flags.append {
            data.read().bytes.len() as u64
        } else {
            0
        };
        MemoryFile {
            data,
            pos,
            flags,
            caps: self.streams,
        }
    }

    fn require_parent_dir(nodes: &BTreeMap<String, Node>, path: &str) -> Result<()> {
        let parent = parent_of(path);
        match nodes.get(parent) {
            Some(node) if node.is_dir() => Ok(()),
            Some(_) => Err(FsError::NotADirectory {
                path: parent.to_string(),
            }),
            None => Err(FsError::not_found(parent)),
        }
    }
}

impl Backend for MemoryFs {
    fn stat(&self, path: &str) -> Result<Metadata> {
        validate(path)?;
        self.nodes
            .read()
            .get(path)
            .map(Node::metadata)
            .ok_or_else(|| FsError::not_found(path))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        validate(path)?;
        let nodes = self.nodes.read();
        match nodes.get(path) {
            Some(node) if node.is_dir() => {}
            Some(_) => {
                return Err(FsError::NotADirectory {
                    path: path.to_string(),
                })
            }
            None => return Err(FsError::not_found(path)),
        }

        Ok(nodes
            .iter()
            .filter(|(key, _)| key.as_str() != ROOT && parent_of(key) == path)
            .map(|(key, node)| DirEntry::new(name_of(key), node.metadata()))
            .collect())
    }

    fn open(&self, path: &str) -> Result<Box<dyn FileStream>> {
        validate(path)?;
        let data = match self.nodes.read().get(path) {
            Some(Node::File(data)) => Arc::clone(data),
            Some(Node::Dir { .. }) => {
                return Err(FsError::IsADirectory {
                    path: path.to_string(),
                })
            }
            None => return Err(FsError::not_found(path)),
        };
        trace!(path, "memory open");
        Ok(Box::new(self.stream(data, OpenFlags::READ_ONLY)))
    }

    fn writer(&self) -> Option<&dyn OpenWriter> {
        self.caps.write.then_some(self as &dyn OpenWriter)
    }

    fn remover(&self) -> Option<&dyn Remove> {
        self.caps.remove.then_some(self as &dyn Remove)
    }

    fn renamer(&self) -> Option<&dyn Rename> {
        self.caps.rename.then_some(self as &dyn Rename)
    }

    fn dir_maker(&self) -> Option<&dyn MakeDir> {
        self.caps.mkdir.then_some(self as &dyn MakeDir)
    }

    fn truncater(&self) -> Option<&dyn Truncate> {
        self.caps.truncate.then_some(self as &dyn Truncate)
    }

    fn dir_opener(&self) -> Option<&dyn OpenDir> {
        self.caps.open_dir.then_some(self as &dyn OpenDir)
    }

    fn disk_space(&self) -> Option<&dyn DiskSpaceQuery> {
        self.caps.disk_space.then_some(self as &dyn DiskSpaceQuery)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl OpenWriter for MemoryFs {
    fn open_writer(&self, path: &str, flags: OpenFlags) -> Result<Box<dyn FileStream>> {
        validate(path)?;
        let mut nodes = self.nodes.write();
        let data = match nodes.get(path) {
            Some(Node::Dir { .. }) => {
                return Err(FsError::IsADirectory {
                    path: path.to_string(),
                })
            }
            Some(Node::File(_)) if flags.exclusive => return Err(FsError::already_exists(path)),
            Some(Node::File(data)) => {
                let data = Arc::clone(data);
                {
                    let mut guard = data.write();
                    if guard.readonly {
                        return Err(FsError::permission_denied("open_writer", path));
                    }
                    if flags.truncate {
                        guard.bytes.clear();
                        guard.modified = Utc::now();
                    }
                }
                data
            }
            None if flags.create => {
                Self::require_parent_dir(&nodes, path)?;
                let data = Arc::new(RwLock::new(FileData {
                    bytes: Vec::new(),
                    modified: Utc::now(),
                    readonly: false,
                }));
                nodes.insert(path.to_string(), Node::File(Arc::clone(&data)));
                data
            }
            None => return Err(FsError::not_found(path)),
        };
        drop(nodes);

        trace!(path, %flags, "memory open_writer");
        Ok(Box::new(self.stream(data, flags)))
    }
}

impl Remove for MemoryFs {
    fn remove(&self, path: &str) -> Result<()> {
        validate(path)?;
        if path == ROOT {
            return Err(FsError::permission_denied("remove", path));
        }
        let mut nodes = self.nodes.write();
        match nodes.get(path) {
            None => return Err(FsError::not_found(path)),
            Some(Node::Dir { .. }) => {
                if nodes.keys().any(|key| key != ROOT && parent_of(key) == path) {
                    return Err(FsError::DirectoryNotEmpty {
                        path: path.to_string(),
                    });
                }
            }
            Some(Node::File(_)) => {}
        }
        nodes.remove(path);
        Ok(())
    }
}

impl Rename for MemoryFs {
    fn rename(&self, from: &str, to: &str) -> Result<()> {
        validate(from)?;
        validate(to)?;
        if from == ROOT || to == ROOT {
            return Err(FsError::permission_denied("rename", from));
        }
        if from == to {
            return Ok(());
        }
        let prefix = format!("{}/", from);
        if to.starts_with(&prefix) {
            return Err(FsError::InvalidArgument {
                reason: format!("cannot move {} into itself", from),
            });
        }

        let mut nodes = self.nodes.write();
        let source_is_dir = match nodes.get(from) {
            Some(node) => node.is_dir(),
            None => return Err(FsError::not_found(from)),
        };
        Self::require_parent_dir(&nodes, to)?;
        if let Some(existing) = nodes.get(to) {
            if existing.is_dir() || source_is_dir {
                return Err(FsError::already_exists(to));
            }
        }

        let moved: Vec<String> = nodes
            .keys()
            .filter(|key| key.as_str() == from || key.starts_with(&prefix))
            .cloned()
            .collect();
        for key in moved {
            if let Some(node) = nodes.remove(&key) {
                let new_key = format!("{}{}", to, &key[from.len()..]);
                nodes.insert(new_key, node);
            }
        }
        Ok(())
    }
}

impl MakeDir for MemoryFs {
    fn mkdir(&self, path: &str) -> Result<()> {
        validate(path)?;
        let mut nodes = self.nodes.write();
        if nodes.contains_key(path) {
            return Err(FsError::already_exists(path));
        }
        Self::require_parent_dir(&nodes, path)?;
        nodes.insert(
            path.to_string(),
            Node::Dir {
                modified: Utc::now(),
            },
        );
        Ok(())
    }
}

impl Truncate for MemoryFs {
    fn truncate(&self, path: &str, size: u64) -> Result<()> {
        validate(path)?;
        let data = match self.nodes.read().get(path) {
            Some(Node::File(data)) => Arc::clone(data),
            Some(Node::Dir { .. }) => {
                return Err(FsError::IsADirectory {
                    path: path.to_string(),
                })
            }
            None => return Err(FsError::not_found(path)),
        };
        let mut data = data.write();
        data.bytes.resize(size as usize, 0);
        data.modified = Utc::now();
        Ok(())
    }
}

impl OpenDir for MemoryFs {
    fn open_dir(&self, path: &str) -> Result<Box<dyn DirStream>> {
        Ok(Box::new(VecDirStream::new(self.read_dir(path)?)))
    }
}

impl DiskSpaceQuery for MemoryFs {
    fn free_space(&self) -> Result<DiskSpace> {
        let used: u64 = self
            .nodes
            .read()
            .values()
            .map(|node| match node {
                Node::File(data) => data.read().bytes.len() as u64,
                Node::Dir { .. } => 0,
            })
            .sum();
        Ok(DiskSpace::new(
            self.capacity.total,
            self.capacity.total.saturating_sub(used),
        ))
    }
}

/// An open file in a [`MemoryFs`].
pub struct MemoryFile {
    data: Arc<RwLock<FileData>>,
    pos: u64,
    flags: OpenFlags,
    caps: StreamCaps,
}

impl MemoryFile {
    fn read_from(&self, buf: &mut [u8], offset: u64) -> usize {
        let data = self.data.read();
        let len = data.bytes.len() as u64;
        if offset >= len {
            return 0;
        }
        let start = offset as usize;
        let n = buf.len().min(data.bytes.len() - start);
        buf[..n].copy_from_slice(&data.bytes[start..start + n]);
        n
    }

    fn write_to(&self, buf: &[u8], offset: u64) -> usize {
        let mut data = self.data.write();
        let start = if self.flags.append {
            data.bytes.len()
        } else {
            offset as usize
        };
        let end = start + buf.len();
        if data.bytes.len() < end {
            data.bytes.resize(end, 0);
        }
        data.bytes[start..end].copy_from_slice(buf);
        data.modified = Utc::now();
        buf.len()
    }
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.read_from(buf, self.pos);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.write_to(buf, self.pos);
        self.pos = if self.flags.append {
            self.data.read().bytes.len() as u64
        } else {
            self.pos + n as u64
        };
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.data.read().bytes.len() as i64;
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(delta) => len + delta,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

impl ReadAt for MemoryFile {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        Ok(self.read_from(buf, offset))
    }
}

impl WriteAt for MemoryFile {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        Ok(self.write_to(buf, offset))
    }
}

impl Resize for MemoryFile {
    fn resize(&mut self, size: u64) -> io::Result<()> {
        let mut data = self.data.write();
        data.bytes.resize(size as usize, 0);
        data.modified = Utc::now();
        Ok(())
    }
}

impl FileStream for MemoryFile {
    fn reader(&mut self) -> Option<&mut dyn Read> {
        self.flags.read.then_some(self as &mut dyn Read)
    }

    fn writer(&mut self) -> Option<&mut dyn Write> {
        self.flags.write.then_some(self as &mut dyn Write)
    }

    fn seeker(&mut self) -> Option<&mut dyn Seek> {
        self.caps.seek.then_some(self as &mut dyn Seek)
    }

    fn reader_at(&mut self) -> Option<&mut dyn ReadAt> {
        (self.flags.read && self.caps.random_access).then_some(self as &mut dyn ReadAt)
    }

    fn writer_at(&mut self) -> Option<&mut dyn WriteAt> {
        (self.flags.write && self.caps.random_access).then_some(self as &mut dyn WriteAt)
    }

    fn resizer(&mut self) -> Option<&mut dyn Resize> {
        (self.flags.write && self.caps.resize).then_some(self as &mut dyn Resize)
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => ROOT,
    }
}

fn name_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}
