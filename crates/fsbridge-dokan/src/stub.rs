//! Driver used when `dokan2.dll` cannot be loaded.

use crate::driver::{InstanceHandle, MountPointInfo, NativeDriver};
use crate::error::{MountError, Result};
use crate::ffi::{DokanFileInfo, DokanOperations, DokanOptions};
use widestring::U16CStr;

/// Stub driver.
///
/// This allows the adapter to be built and unit-tested anywhere, but every
/// operation fails with [`MountError::DriverUnavailable`].
#[derive(Debug, Clone)]
pub struct UnavailableDriver {
    reason: String,
}

impl UnavailableDriver {
    /// Create a stub that reports `reason` from every call.
    pub fn new(reason: impl Into<String>) -> Self {
        UnavailableDriver {
            reason: reason.into(),
        }
    }

    fn error(&self) -> MountError {
        MountError::unavailable(self.reason.clone())
    }
}

impl NativeDriver for UnavailableDriver {
    fn version(&self) -> u32 {
        0
    }

    fn driver_version(&self) -> u32 {
        0
    }

    fn init(&self) -> Result<()> {
        Err(self.error())
    }

    fn shutdown(&self) -> Result<()> {
        Err(self.error())
    }

    unsafe fn create_file_system(
        &self,
        _options: *mut DokanOptions,
        _operations: *const DokanOperations,
    ) -> Result<InstanceHandle> {
        Err(self.error())
    }

    fn close_handle(&self, _instance: InstanceHandle) -> Result<()> {
        Err(self.error())
    }

    fn mount_points(&self, _unc_only: bool) -> Result<Vec<MountPointInfo>> {
        Err(self.error())
    }

    fn notify_create(&self, _instance: InstanceHandle, _path: &U16CStr, _is_dir: bool) -> bool {
        false
    }

    fn notify_delete(&self, _instance: InstanceHandle, _path: &U16CStr, _is_dir: bool) -> bool {
        false
    }

    fn notify_rename(
        &self,
        _instance: InstanceHandle,
        _old_path: &U16CStr,
        _new_path: &U16CStr,
        _is_dir: bool,
        _same_dir: bool,
    ) -> bool {
        false
    }

    fn notify_update(&self, _instance: InstanceHandle, _path: &U16CStr) -> bool {
        false
    }

    fn notify_xattr_update(&self, _instance: InstanceHandle, _path: &U16CStr) -> bool {
        false
    }

    unsafe fn reset_timeout(&self, _timeout_ms: u32, _info: *mut DokanFileInfo) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}
