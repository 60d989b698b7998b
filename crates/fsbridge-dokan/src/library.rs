//! Runtime binding to `dokan2.dll`.
//!
//! The library is loaded with `LoadLibraryW` and every entry point is
//! resolved once up front, so a missing export fails at load time instead of
//! in the middle of a mount. The module handle is never freed: callbacks
//! may still be in flight on driver threads when the last mount closes.

use crate::driver::{InstanceHandle, MountPointInfo, NativeDriver};
use crate::error::{MountError, Result};
use crate::ffi::{DokanFileInfo, DokanOperations, DokanOptions, NativeMountPointInfo};
use std::ffi::c_void;
use tracing::{debug, info};
use widestring::{U16CStr, U16Str};
use windows::core::{s, w, PCSTR};
use windows::Win32::Foundation::HMODULE;
use windows::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryW};

type DokanVersionFn = unsafe extern "system" fn() -> u32;
type DokanInitFn = unsafe extern "system" fn();
type DokanShutdownFn = unsafe extern "system" fn();
type DokanCreateFileSystemFn = unsafe extern "system" fn(
    options: *mut DokanOptions,
    operations: *const DokanOperations,
    instance: *mut *mut c_void,
) -> i32;
type DokanCloseHandleFn = unsafe extern "system" fn(instance: *mut c_void);
type DokanGetMountPointListFn =
    unsafe extern "system" fn(unc_only: i32, count: *mut u32) -> *mut NativeMountPointInfo;
type DokanReleaseMountPointListFn = unsafe extern "system" fn(list: *mut NativeMountPointInfo);
type DokanNotifyPathFn =
    unsafe extern "system" fn(instance: *mut c_void, path: *const u16, is_dir: i32) -> i32;
type DokanNotifyRenameFn = unsafe extern "system" fn(
    instance: *mut c_void,
    old_path: *const u16,
    new_path: *const u16,
    is_dir: i32,
    same_dir: i32,
) -> i32;
type DokanNotifyUpdateFn =
    unsafe extern "system" fn(instance: *mut c_void, path: *const u16) -> i32;
type DokanResetTimeoutFn =
    unsafe extern "system" fn(timeout: u32, info: *mut DokanFileInfo) -> i32;

/// Resolved entry points of `dokan2.dll`
pub struct Dokan2Library {
    version: DokanVersionFn,
    driver_version: DokanVersionFn,
    init: DokanInitFn,
    shutdown: DokanShutdownFn,
    create_file_system: DokanCreateFileSystemFn,
    close_handle: DokanCloseHandleFn,
    get_mount_point_list: DokanGetMountPointListFn,
    release_mount_point_list: DokanReleaseMountPointListFn,
    notify_create: DokanNotifyPathFn,
    notify_delete: DokanNotifyPathFn,
    notify_rename: DokanNotifyRenameFn,
    notify_update: DokanNotifyUpdateFn,
    notify_xattr_update: DokanNotifyUpdateFn,
    reset_timeout: DokanResetTimeoutFn,
}

/// Look up an export and cast it to its typed signature.
///
/// # Safety
///
/// `T` must be a function pointer type matching the export's real signature.
unsafe fn resolve<T: Copy>(module: HMODULE, name: PCSTR) -> Result<T> {
    match GetProcAddress(module, name) {
        Some(f) => Ok(std::mem::transmute_copy(&f)),
        None => Err(MountError::from_win32(&format!(
            "GetProcAddress({})",
            name.to_string().unwrap_or_default()
        ))),
    }
}

impl Dokan2Library {
    /// Load `dokan2.dll` from the default search path.
    pub fn load() -> Result<Self> {
        // SAFETY: the library name is a static NUL-terminated wide string and
        // every resolved pointer is cast to the signature from dokan.h.
        unsafe {
            let module =
                LoadLibraryW(w!("dokan2.dll")).map_err(|_| MountError::from_win32("LoadLibraryW"))?;

            let library = Dokan2Library {
                version: resolve(module, s!("DokanVersion"))?,
                driver_version: resolve(module, s!("DokanDriverVersion"))?,
                init: resolve(module, s!("DokanInit"))?,
                shutdown: resolve(module, s!("DokanShutdown"))?,
                create_file_system: resolve(module, s!("DokanCreateFileSystem"))?,
                close_handle: resolve(module, s!("DokanCloseHandle"))?,
                get_mount_point_list: resolve(module, s!("DokanGetMountPointList"))?,
                release_mount_point_list: resolve(module, s!("DokanReleaseMountPointList"))?,
                notify_create: resolve(module, s!("DokanNotifyCreate"))?,
                notify_delete: resolve(module, s!("DokanNotifyDelete"))?,
                notify_rename: resolve(module, s!("DokanNotifyRename"))?,
                notify_update: resolve(module, s!("DokanNotifyUpdate"))?,
                notify_xattr_update: resolve(module, s!("DokanNotifyXAttrUpdate"))?,
                reset_timeout: resolve(module, s!("DokanResetTimeout"))?,
            };

            info!(
                version = (library.version)(),
                driver_version = (library.driver_version)(),
                "Loaded dokan2.dll"
            );
            Ok(library)
        }
    }
}

fn wide_to_string(buf: &[u16]) -> String {
    let len = buf.iter().position(|c| *c == 0).unwrap_or(buf.len());
    U16Str::from_slice(&buf[..len]).to_string_lossy()
}

fn instance_ptr(instance: InstanceHandle) -> *mut c_void {
    instance.0 as *mut c_void
}

impl NativeDriver for Dokan2Library {
    fn version(&self) -> u32 {
        unsafe { (self.version)() }
    }

    fn driver_version(&self) -> u32 {
        unsafe { (self.driver_version)() }
    }

    fn init(&self) -> Result<()> {
        debug!("DokanInit");
        unsafe { (self.init)() };
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        debug!("DokanShutdown");
        unsafe { (self.shutdown)() };
        Ok(())
    }

    unsafe fn create_file_system(
        &self,
        options: *mut DokanOptions,
        operations: *const DokanOperations,
    ) -> Result<InstanceHandle> {
        let mut instance: *mut c_void = std::ptr::null_mut();
        let code = (self.create_file_system)(options, operations, &mut instance);
        if code != 0 {
            let mount_point = if (*options).MountPoint.is_null() {
                String::new()
            } else {
                U16CStr::from_ptr_str((*options).MountPoint).to_string_lossy()
            };
            return Err(MountError::from_create_code(code, &mount_point));
        }
        Ok(InstanceHandle(instance as usize))
    }

    fn close_handle(&self, instance: InstanceHandle) -> Result<()> {
        unsafe { (self.close_handle)(instance_ptr(instance)) };
        Ok(())
    }

    fn mount_points(&self, unc_only: bool) -> Result<Vec<MountPointInfo>> {
        let mut count: u32 = 0;
        // SAFETY: the driver returns `count` contiguous entries that stay
        // valid until DokanReleaseMountPointList.
        unsafe {
            let list = (self.get_mount_point_list)(unc_only as i32, &mut count);
            if list.is_null() {
                return Ok(Vec::new());
            }

            let entries = std::slice::from_raw_parts(list, count as usize)
                .iter()
                .map(|e| MountPointInfo {
                    kind: e.Type,
                    mount_point: wide_to_string(&e.MountPoint),
                    unc_name: wide_to_string(&e.UNCName),
                    device_name: wide_to_string(&e.DeviceName),
                    session_id: e.SessionId,
                    options: e.MountOptions,
                })
                .collect();

            (self.release_mount_point_list)(list);
            Ok(entries)
        }
    }

    fn notify_create(&self, instance: InstanceHandle, path: &U16CStr, is_dir: bool) -> bool {
        unsafe { (self.notify_create)(instance_ptr(instance), path.as_ptr(), is_dir as i32) != 0 }
    }

    fn notify_delete(&self, instance: InstanceHandle, path: &U16CStr, is_dir: bool) -> bool {
        unsafe { (self.notify_delete)(instance_ptr(instance), path.as_ptr(), is_dir as i32) != 0 }
    }

    fn notify_rename(
        &self,
        instance: InstanceHandle,
        old_path: &U16CStr,
        new_path: &U16CStr,
        is_dir: bool,
        same_dir: bool,
    ) -> bool {
        unsafe {
            (self.notify_rename)(
                instance_ptr(instance),
                old_path.as_ptr(),
                new_path.as_ptr(),
                is_dir as i32,
                same_dir as i32,
            ) != 0
        }
    }

    fn notify_update(&self, instance: InstanceHandle, path: &U16CStr) -> bool {
        unsafe { (self.notify_update)(instance_ptr(instance), path.as_ptr()) != 0 }
    }

    fn notify_xattr_update(&self, instance: InstanceHandle, path: &U16CStr) -> bool {
        unsafe { (self.notify_xattr_update)(instance_ptr(instance), path.as_ptr()) != 0 }
    }

    unsafe fn reset_timeout(&self, timeout_ms: u32, info: *mut DokanFileInfo) -> bool {
        (self.reset_timeout)(timeout_ms, info) != 0
    }

    fn name(&self) -> &'static str {
        "dokan2"
    }
}
