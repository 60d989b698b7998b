//! Open handles and the per-mount handle table.
//!
//! The driver stores a 64-bit context value per open file. We put a table
//! key there, never a pointer: the table owns every [`OpenHandle`] from
//! create until close, and a stale or foreign key simply misses.

use dashmap::DashMap;
use fsbridge_core::{DirEntry, DirStream, FileStream, Metadata, OpenFlags};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Adapter-side state for one open file or directory
pub struct OpenHandle {
    id: u64,
    flags: OpenFlags,
    state: Mutex<HandleState>,
}

/// Mutable part of an open handle.
///
/// Requests for one file can arrive on several driver threads at once
/// (paging I/O next to user I/O), so every request holds this lock for its
/// whole duration.
pub struct HandleState {
    /// Normalized backend path; follows renames
    pub path: String,

    /// Lazily opened backend stream
    pub stream: Option<Box<dyn FileStream>>,

    /// Whether `stream` came from the backend's writer
    pub writable: bool,

    /// Last known stat result; cleared by anything that mutates the file
    pub cached_stat: Option<Metadata>,

    /// Offset of the sequential cursor, `None` when unknown
    pub cursor: Option<u64>,

    /// In-progress directory enumeration
    pub listing: Option<DirListing>,
}

/// A directory enumeration that can resume after the driver's buffer fills
#[derive(Default)]
pub struct DirListing {
    pub stream: Option<Box<dyn DirStream>>,
    pub pending: VecDeque<DirEntry>,
}

impl OpenHandle {
    fn new(id: u64, path: String, flags: OpenFlags, stat: Option<Metadata>) -> Self {
        OpenHandle {
            id,
            flags,
            state: Mutex::new(HandleState {
                path,
                stream: None,
                writable: false,
                cached_stat: stat,
                cursor: Some(0),
                listing: None,
            }),
        }
    }

    /// Table key, as stored in the driver's per-file context
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Open mode, fixed at create time
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn path(&self) -> String {
        self.state.lock().path.clone()
    }

    /// Lock the mutable state for the duration of one request
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, HandleState> {
        self.state.lock()
    }
}

impl HandleState {
    /// Install the writer opened at create time
    pub fn attach_writer(&mut self, stream: Box<dyn FileStream>) {
        self.stream = Some(stream);
        self.writable = true;
        self.cursor = Some(0);
    }

    /// Close the backend stream, if any, and forget it
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close() {
                warn!(path = %self.path, error = %e, "Stream close failed");
            }
        }
        self.writable = false;
        self.listing = None;
    }
}

/// Concurrent table of open handles for one mount.
///
/// Lookups clone the `Arc` out of the map so no shard lock is held while
/// the backend runs.
pub struct HandleTable {
    handles: DashMap<u64, Arc<OpenHandle>>,
    next_id: AtomicU64,
}

impl HandleTable {
    pub fn new() -> Self {
        HandleTable {
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new handle and return it. Keys start at 1; 0 is the
    /// driver's "no context" value.
    pub fn insert(
        &self,
        path: String,
        flags: OpenFlags,
        stat: Option<Metadata>,
    ) -> Arc<OpenHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(OpenHandle::new(id, path, flags, stat));
        self.handles.insert(id, Arc::clone(&handle));
        handle
    }

    pub fn get(&self, id: u64) -> Option<Arc<OpenHandle>> {
        self.handles.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a handle. Returns `None` if it was already gone.
    pub fn remove(&self, id: u64) -> Option<Arc<OpenHandle>> {
        self.handles.remove(&id).map(|(_, handle)| handle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Remove every handle, returning them for cleanup
    pub fn drain(&self) -> Vec<Arc<OpenHandle>> {
        let ids: Vec<u64> = self.handles.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
