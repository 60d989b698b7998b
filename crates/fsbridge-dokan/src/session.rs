//! Mount sessions.
//!
//! A [`MountSession`] owns one native filesystem instance: its option block,
//! its handle table and the mount handshake. The driver finds the session
//! again through `DOKAN_OPTIONS::GlobalContext`, which holds the session id;
//! ids resolve through a process-wide directory of weak references, so a
//! late callback for a dropped session misses instead of dangling.

use crate::driver::{InstanceHandle, NativeDriver};
use crate::error::{MountError, Result};
use crate::ffi::{
    DokanFileInfo, DokanOperations, DokanOptions, DOKAN_OPTION_ALT_STREAM,
    DOKAN_OPTION_CURRENT_SESSION, DOKAN_OPTION_DEBUG, DOKAN_OPTION_FILELOCK_USER_MODE,
    DOKAN_OPTION_MOUNT_MANAGER, DOKAN_OPTION_NETWORK, DOKAN_OPTION_REMOVABLE,
    DOKAN_OPTION_STDERR, DOKAN_OPTION_WRITE_PROTECT, DOKAN_VERSION,
    VOLUME_SECURITY_DESCRIPTOR_MAX_SIZE,
};
use crate::handle::HandleTable;
use crate::path;
use crate::registry::MountRegistry;
use crossbeam_channel::{bounded, Receiver, Sender};
use dashmap::DashMap;
use fsbridge_core::{
    Backend, DriverFlags, MakeDir, MountOptions, OpenWriter, Remove, Rename, Truncate,
};
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};
use widestring::{U16CStr, U16CString};

/// Lifecycle of a mount session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Mounting,
    Mounted,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Mounting => "mounting",
            SessionState::Mounted => "mounted",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

struct Lifecycle {
    state: SessionState,
    instance: Option<InstanceHandle>,
}

/// Memory handed to the driver. Addresses must not move while mounted.
struct NativeBlock {
    options: Box<UnsafeCell<DokanOptions>>,
    _mount_point: U16CString,
}

// SAFETY: the option block is written once before the instance starts and
// only read afterwards, by the driver and by callbacks.
unsafe impl Send for NativeBlock {}
unsafe impl Sync for NativeBlock {}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

fn directory() -> &'static DashMap<u64, Weak<MountSession>> {
    static SESSIONS: OnceLock<DashMap<u64, Weak<MountSession>>> = OnceLock::new();
    SESSIONS.get_or_init(DashMap::new)
}

/// Find a live session by the id stored in its option block.
pub fn lookup(id: u64) -> Option<Arc<MountSession>> {
    directory().get(&id).and_then(|entry| entry.value().upgrade())
}

/// Translate process-wide flags into the native option bitmask.
pub fn native_option_bits(flags: &DriverFlags, write_protect: bool) -> u32 {
    let table = [
        (flags.debug, DOKAN_OPTION_DEBUG),
        (flags.stderr, DOKAN_OPTION_STDERR),
        (flags.alt_stream, DOKAN_OPTION_ALT_STREAM),
        (write_protect, DOKAN_OPTION_WRITE_PROTECT),
        (flags.network, DOKAN_OPTION_NETWORK),
        (flags.removable, DOKAN_OPTION_REMOVABLE),
        (flags.mount_manager, DOKAN_OPTION_MOUNT_MANAGER),
        (flags.current_session, DOKAN_OPTION_CURRENT_SESSION),
        (flags.filelock_user_mode, DOKAN_OPTION_FILELOCK_USER_MODE),
    ];
    table
        .iter()
        .filter(|(on, _)| *on)
        .fold(0, |bits, (_, bit)| bits | bit)
}

/// One mounted volume
pub struct MountSession {
    id: u64,
    mount_point: String,
    backend: Arc<dyn Backend>,
    options: MountOptions,
    handles: HandleTable,
    lifecycle: Mutex<Lifecycle>,
    mounted_tx: Sender<()>,
    mounted_rx: Receiver<()>,
    native: NativeBlock,
    driver: Arc<dyn NativeDriver>,
}

impl MountSession {
    /// Allocate a session and its option block. Nothing is mounted yet.
    pub fn new(
        mount_point: String,
        backend: Arc<dyn Backend>,
        options: MountOptions,
        flags: &DriverFlags,
        driver: Arc<dyn NativeDriver>,
    ) -> Result<Arc<Self>> {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let wide_mount_point =
            U16CString::from_str(&mount_point).map_err(|_| MountError::BadMountPoint {
                mount_point: mount_point.clone(),
            })?;

        let native_options = DokanOptions {
            Version: DOKAN_VERSION,
            SingleThread: options.mount.single_thread as u8,
            Options: native_option_bits(flags, options.mount.write_protect),
            GlobalContext: id,
            MountPoint: wide_mount_point.as_ptr(),
            UNCName: std::ptr::null(),
            Timeout: options.mount.timeout_ms,
            AllocationUnitSize: options.mount.allocation_unit_size,
            SectorSize: options.mount.sector_size,
            VolumeSecurityDescriptorLength: 0,
            VolumeSecurityDescriptor: [0; VOLUME_SECURITY_DESCRIPTOR_MAX_SIZE],
        };

        let (mounted_tx, mounted_rx) = bounded(1);
        let session = Arc::new(MountSession {
            id,
            mount_point,
            backend,
            options,
            handles: HandleTable::new(),
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Created,
                instance: None,
            }),
            mounted_tx,
            mounted_rx,
            native: NativeBlock {
                options: Box::new(UnsafeCell::new(native_options)),
                _mount_point: wide_mount_point,
            },
            driver,
        });

        directory().insert(id, Arc::downgrade(&session));
        debug!(session = id, mount_point = %session.mount_point, "Session created");
        Ok(session)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.lock().state
    }

    pub fn instance(&self) -> Option<InstanceHandle> {
        self.lifecycle.lock().instance
    }

    /// Raw option block, as seen by the driver
    pub fn native_options(&self) -> *mut DokanOptions {
        self.native.options.get()
    }

    pub fn is_write_protected(&self) -> bool {
        self.options.mount.write_protect
    }

    pub fn writer(&self) -> Option<&dyn OpenWriter> {
        self.mutating(self.backend.writer())
    }

    pub fn remover(&self) -> Option<&dyn Remove> {
        self.mutating(self.backend.remover())
    }

    pub fn renamer(&self) -> Option<&dyn Rename> {
        self.mutating(self.backend.renamer())
    }

    pub fn dir_maker(&self) -> Option<&dyn MakeDir> {
        self.mutating(self.backend.dir_maker())
    }

    pub fn truncater(&self) -> Option<&dyn Truncate> {
        self.mutating(self.backend.truncater())
    }

    fn mutating<'a, T: ?Sized>(&'a self, capability: Option<&'a T>) -> Option<&'a T> {
        if self.is_write_protected() {
            None
        } else {
            capability
        }
    }

    /// Issue `DokanCreateFileSystem` with this session's option block.
    pub fn start(&self, operations: &'static DokanOperations) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != SessionState::Created {
                return Err(MountError::Mount);
            }
            lifecycle.state = SessionState::Mounting;
        }

        // SAFETY: the option block and the mount point string live as long
        // as the session, and the session outlives the instance (close()
        // runs before the registry lets go of it).
        let created = unsafe {
            self.driver
                .create_file_system(self.native_options(), operations as *const _)
        };

        let mut lifecycle = self.lifecycle.lock();
        match created {
            Ok(instance) => {
                lifecycle.instance = Some(instance);
                Ok(())
            }
            Err(e) => {
                lifecycle.state = SessionState::Closed;
                Err(e)
            }
        }
    }

    /// Called from the driver's `Mounted` callback. Only the first call
    /// releases the waiter.
    pub fn signal_mounted(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state == SessionState::Mounting {
            lifecycle.state = SessionState::Mounted;
            let _ = self.mounted_tx.try_send(());
        }
    }

    /// Block until the driver confirms the mount. Returns false on timeout.
    pub fn wait_mounted(&self, timeout: Option<Duration>) -> bool {
        match timeout {
            Some(timeout) => self.mounted_rx.recv_timeout(timeout).is_ok(),
            None => self.mounted_rx.recv().is_ok(),
        }
    }

    /// Unmount and release every open handle.
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let instance = {
            let mut lifecycle = self.lifecycle.lock();
            if matches!(
                lifecycle.state,
                SessionState::Closing | SessionState::Closed
            ) {
                return Ok(());
            }
            lifecycle.state = SessionState::Closing;
            lifecycle.instance.take()
        };

        let result = match instance {
            Some(instance) => self.driver.close_handle(instance).map_err(|e| {
                MountError::Close {
                    mount_point: self.mount_point.clone(),
                    reason: e.to_string(),
                }
            }),
            None => Ok(()),
        };

        let leftover = self.handles.drain();
        if !leftover.is_empty() {
            warn!(
                mount_point = %self.mount_point,
                count = leftover.len(),
                "Releasing handles the driver never closed"
            );
        }
        for handle in leftover {
            handle.lock().release();
        }

        self.lifecycle.lock().state = SessionState::Closed;
        info!(mount_point = %self.mount_point, "Unmounted");
        result
    }

    /// Extend the driver timeout for a long-running request, if a request
    /// timeout is configured.
    ///
    /// # Safety
    ///
    /// `info` must be the context of the request currently being served.
    pub unsafe fn keep_alive(&self, info: *mut DokanFileInfo) {
        let timeout = self.options.mount.timeout_ms;
        if timeout > 0 && !self.driver.reset_timeout(timeout, info) {
            debug!(mount_point = %self.mount_point, "DokanResetTimeout refused");
        }
    }

    fn notify(
        &self,
        kind: &'static str,
        path: &str,
        send: impl FnOnce(InstanceHandle, &U16CStr) -> bool,
    ) -> Result<()> {
        let failed = || MountError::Notify {
            kind,
            path: path.to_string(),
        };
        let instance = self.instance().ok_or_else(failed)?;
        let native = path::native_path(&self.mount_point, path)?;
        if send(instance, &native) {
            Ok(())
        } else {
            Err(failed())
        }
    }
}

impl Drop for MountSession {
    fn drop(&mut self) {
        directory().remove(&self.id);
    }
}

/// A mounted volume.
///
/// Dropping a `Mount` unmounts it.
pub struct Mount {
    session: Arc<MountSession>,
    registry: MountRegistry,
}

impl Mount {
    pub(crate) fn new(session: Arc<MountSession>, registry: MountRegistry) -> Self {
        Mount { session, registry }
    }

    /// Unmount the volume. Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        self.registry.close(&self.session)
    }

    /// Number of files the driver currently holds open
    pub fn opened_file_count(&self) -> usize {
        self.session.handles().len()
    }

    pub fn mount_point(&self) -> &str {
        self.session.mount_point()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Tell the driver a file or directory appeared
    pub fn notify_create(&self, path: &str, is_dir: bool) -> Result<()> {
        let driver = Arc::clone(&self.session.driver);
        self.session.notify("create", path, |instance, native| {
            driver.notify_create(instance, native, is_dir)
        })
    }

    /// Tell the driver a file or directory went away
    pub fn notify_delete(&self, path: &str, is_dir: bool) -> Result<()> {
        let driver = Arc::clone(&self.session.driver);
        self.session.notify("delete", path, |instance, native| {
            driver.notify_delete(instance, native, is_dir)
        })
    }

    /// Tell the driver an entry moved
    pub fn notify_rename(&self, old_path: &str, new_path: &str, is_dir: bool) -> Result<()> {
        let driver = Arc::clone(&self.session.driver);
        let old_native = path::native_path(self.session.mount_point(), old_path)?;
        let same_dir = parent(old_path) == parent(new_path);
        self.session.notify("rename", new_path, |instance, new_native| {
            driver.notify_rename(instance, &old_native, new_native, is_dir, same_dir)
        })
    }

    /// Tell the driver an entry's attributes or contents changed
    pub fn notify_update(&self, path: &str) -> Result<()> {
        let driver = Arc::clone(&self.session.driver);
        self.session.notify("update", path, |instance, native| {
            driver.notify_update(instance, native)
        })
    }

    /// Tell the driver an entry's extended attributes changed
    pub fn notify_xattr_update(&self, path: &str) -> Result<()> {
        let driver = Arc::clone(&self.session.driver);
        self.session.notify("xattr update", path, |instance, native| {
            driver.notify_xattr_update(instance, native)
        })
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> &Arc<MountSession> {
        &self.session
    }
}

impl Drop for Mount {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(mount_point = %self.session.mount_point(), error = %e, "Unmount on drop failed");
        }
    }
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("mount_point", &self.session.mount_point())
            .field("state", &self.session.state())
            .field("open_handles", &self.session.handles().len())
            .finish()
    }
}

fn parent(path: &str) -> &str {
    let trimmed = path.trim_matches(|c| c == '/' || c == '\\');
    match trimmed.rfind(|c| c == '/' || c == '\\') {
        Some(i) => &trimmed[..i],
        None => "",
    }
}
