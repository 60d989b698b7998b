//! The native driver seam.
//!
//! Everything the adapter needs from `dokan2.dll` goes through
//! [`NativeDriver`]. The Windows build loads the real library at runtime
//! (`library.rs`); other platforms get [`UnavailableDriver`], and tests plug
//! in a driver double that replays callbacks through the real trampolines.

use crate::error::Result;
use crate::ffi::{DokanFileInfo, DokanOperations, DokanOptions};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use widestring::U16CStr;

pub use crate::stub::UnavailableDriver;

/// Opaque native instance handle returned by `DokanCreateFileSystem`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceHandle(pub usize);

/// One entry of the driver's active mount list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountPointInfo {
    /// Device type reported by the driver
    pub kind: u32,
    pub mount_point: String,
    pub unc_name: String,
    pub device_name: String,
    pub session_id: u32,
    /// DOKAN_OPTION_* bits the volume was mounted with
    pub options: u32,
}

/// Entry points of the native driver library.
///
/// Implementations must be callable from any thread.
pub trait NativeDriver: Send + Sync {
    /// Library version (`DokanVersion`)
    fn version(&self) -> u32;

    /// Kernel driver version (`DokanDriverVersion`)
    fn driver_version(&self) -> u32;

    /// Process-wide initialization (`DokanInit`)
    fn init(&self) -> Result<()>;

    /// Process-wide teardown (`DokanShutdown`)
    fn shutdown(&self) -> Result<()>;

    /// Start a filesystem instance (`DokanCreateFileSystem`).
    ///
    /// # Safety
    ///
    /// `options` and `operations` must stay valid until the instance is
    /// closed with [`NativeDriver::close_handle`].
    unsafe fn create_file_system(
        &self,
        options: *mut DokanOptions,
        operations: *const DokanOperations,
    ) -> Result<InstanceHandle>;

    /// Unmount and release an instance (`DokanCloseHandle`)
    fn close_handle(&self, instance: InstanceHandle) -> Result<()>;

    /// Active mounts (`DokanGetMountPointList`)
    fn mount_points(&self, unc_only: bool) -> Result<Vec<MountPointInfo>>;

    fn notify_create(&self, instance: InstanceHandle, path: &U16CStr, is_dir: bool) -> bool;

    fn notify_delete(&self, instance: InstanceHandle, path: &U16CStr, is_dir: bool) -> bool;

    fn notify_rename(
        &self,
        instance: InstanceHandle,
        old_path: &U16CStr,
        new_path: &U16CStr,
        is_dir: bool,
        same_dir: bool,
    ) -> bool;

    fn notify_update(&self, instance: InstanceHandle, path: &U16CStr) -> bool;

    fn notify_xattr_update(&self, instance: InstanceHandle, path: &U16CStr) -> bool;

    /// Extend the driver's timeout for the request behind `info`
    /// (`DokanResetTimeout`).
    ///
    /// # Safety
    ///
    /// `info` must be the request context the driver passed to the current
    /// callback.
    unsafe fn reset_timeout(&self, timeout_ms: u32, info: *mut DokanFileInfo) -> bool;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// The driver for this platform.
///
/// On Windows this loads `dokan2.dll`; if that fails the error is logged and
/// the returned driver reports it on every call.
#[cfg(windows)]
pub fn platform_driver() -> Arc<dyn NativeDriver> {
    match crate::library::Dokan2Library::load() {
        Ok(library) => Arc::new(library),
        Err(e) => {
            warn!(error = %e, "Could not load dokan2.dll");
            Arc::new(UnavailableDriver::new(e.to_string()))
        }
    }
}

#[cfg(not(windows))]
pub fn platform_driver() -> Arc<dyn NativeDriver> {
    warn!("Dokan is only available on Windows");
    Arc::new(UnavailableDriver::new("Dokan is only available on Windows"))
}
