//! In-process stand-in for the native driver, plus a client that issues
//! requests through the registered callback table the way the kernel side
//! would.

use crate::callbacks::OPERATIONS;
use crate::driver::{InstanceHandle, MountPointInfo, NativeDriver};
use crate::error::{MountError, Result};
use crate::ffi::{
    ByHandleFileInformation, DokanFileInfo, DokanOperations, DokanOptions, Win32FindDataW,
};
use crate::session::MountSession;
use crate::status::NtStatus;
use fsbridge_core::{DriverFlags, MemoryFs, MountOptions};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use widestring::{U16CStr, U16CString, U16Str};

/// Option block and callback table of a live instance, as addresses
#[derive(Clone, Copy)]
struct Instance {
    options: usize,
    operations: usize,
}

/// Driver double that mounts instantly and counts calls.
pub struct MockDriver {
    create_code: i32,
    version: u32,
    deliver_mounted: bool,
    init_calls: AtomicUsize,
    shutdown_calls: AtomicUsize,
    create_calls: AtomicUsize,
    close_calls: AtomicUsize,
    reset_calls: AtomicUsize,
    next_instance: AtomicUsize,
    last_option_bits: Mutex<Option<u32>>,
    instances: Mutex<HashMap<usize, Instance>>,
    notifications: Mutex<Vec<String>>,
}

impl MockDriver {
    pub fn new() -> Self {
        MockDriver {
            create_code: 0,
            version: crate::ffi::DOKAN_VERSION as u32,
            deliver_mounted: true,
            init_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            reset_calls: AtomicUsize::new(0),
            next_instance: AtomicUsize::new(1),
            last_option_bits: Mutex::new(None),
            instances: Mutex::new(HashMap::new()),
            notifications: Mutex::new(Vec::new()),
        }
    }

    /// Make `DokanCreateFileSystem` return `code`
    pub fn fail_create(mut self, code: i32) -> Self {
        self.create_code = code;
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Whether to fire the `Mounted` callback after a successful create
    pub fn deliver_mounted(mut self, deliver: bool) -> Self {
        self.deliver_mounted = deliver;
        self
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }

    pub fn last_option_bits(&self) -> Option<u32> {
        *self.last_option_bits.lock()
    }

    /// Change notifications received so far, one line each
    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().clone()
    }

    fn record(&self, line: String) -> bool {
        self.notifications.lock().push(line);
        true
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeDriver for MockDriver {
    fn version(&self) -> u32 {
        self.version
    }

    fn driver_version(&self) -> u32 {
        self.version
    }

    fn init(&self) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    unsafe fn create_file_system(
        &self,
        options: *mut DokanOptions,
        operations: *const DokanOperations,
    ) -> Result<InstanceHandle> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_option_bits.lock() = Some((*options).Options);

        if self.create_code != 0 {
            let mount_point = U16CStr::from_ptr_str((*options).MountPoint).to_string_lossy();
            return Err(MountError::from_create_code(self.create_code, &mount_point));
        }

        let id = self.next_instance.fetch_add(1, Ordering::SeqCst);
        let instance = Instance {
            options: options as usize,
            operations: operations as usize,
        };
        self.instances.lock().insert(id, instance);

        if self.deliver_mounted {
            thread::spawn(move || {
                let options = instance.options as *mut DokanOptions;
                let operations = instance.operations as *const DokanOperations;
                // SAFETY: the session keeps its option block alive until
                // close_handle, which cannot complete before the waiter
                // this callback releases.
                unsafe {
                    if let Some(mounted) = (*operations).Mounted {
                        let mut info = DokanFileInfo::new(options);
                        mounted((*options).MountPoint, &mut info);
                    }
                }
            });
        }
        Ok(InstanceHandle(id))
    }

    fn close_handle(&self, instance: InstanceHandle) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let Some(instance) = self.instances.lock().remove(&instance.0) else {
            return Err(MountError::Generic { code: -1 });
        };
        let options = instance.options as *mut DokanOptions;
        let operations = instance.operations as *const DokanOperations;
        // SAFETY: the instance was live until the line above.
        unsafe {
            if let Some(unmounted) = (*operations).Unmounted {
                let mut info = DokanFileInfo::new(options);
                unmounted(&mut info);
            }
        }
        Ok(())
    }

    fn mount_points(&self, _unc_only: bool) -> Result<Vec<MountPointInfo>> {
        let instances = self.instances.lock();
        Ok(instances
            .values()
            .map(|instance| {
                // SAFETY: live instances point at live option blocks.
                let options = unsafe { &*(instance.options as *const DokanOptions) };
                let mount_point = unsafe { U16CStr::from_ptr_str(options.MountPoint) };
                MountPointInfo {
                    kind: 0,
                    mount_point: mount_point.to_string_lossy(),
                    unc_name: String::new(),
                    device_name: String::new(),
                    session_id: 0,
                    options: options.Options,
                }
            })
            .collect())
    }

    fn notify_create(&self, _instance: InstanceHandle, path: &U16CStr, is_dir: bool) -> bool {
        self.record(format!("create {} {}", path.display(), is_dir))
    }

    fn notify_delete(&self, _instance: InstanceHandle, path: &U16CStr, is_dir: bool) -> bool {
        self.record(format!("delete {} {}", path.display(), is_dir))
    }

    fn notify_rename(
        &self,
        _instance: InstanceHandle,
        old_path: &U16CStr,
        new_path: &U16CStr,
        is_dir: bool,
        same_dir: bool,
    ) -> bool {
        self.record(format!(
            "rename {} {} {} {}",
            old_path.display(),
            new_path.display(),
            is_dir,
            same_dir
        ))
    }

    fn notify_update(&self, _instance: InstanceHandle, path: &U16CStr) -> bool {
        self.record(format!("update {}", path.display()))
    }

    fn notify_xattr_update(&self, _instance: InstanceHandle, path: &U16CStr) -> bool {
        self.record(format!("xattr {}", path.display()))
    }

    unsafe fn reset_timeout(&self, _timeout_ms: u32, _info: *mut DokanFileInfo) -> bool {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// A writable in-memory session over a mock driver, not started
pub fn memory_session() -> Arc<MountSession> {
    MountSession::new(
        "X:\\".to_string(),
        Arc::new(MemoryFs::builder().writable().build()),
        MountOptions::default(),
        &DriverFlags::default(),
        Arc::new(MockDriver::new()),
    )
    .unwrap()
}

/// An open file as the driver sees it: its name and request context
pub struct NativeFile {
    name: U16CString,
    info: DokanFileInfo,
}

impl NativeFile {
    pub fn is_dir(&self) -> bool {
        self.info.IsDirectory != 0
    }

    pub fn context(&self) -> u64 {
        self.info.Context
    }
}

thread_local! {
    static FOUND: RefCell<(Vec<String>, usize, bool)> =
        const { RefCell::new((Vec::new(), 0, false)) };
}

/// Accepts up to the per-call limit, then reports the buffer full without
/// taking the entry.
unsafe extern "system" fn collect_find_data(
    data: *mut Win32FindDataW,
    _info: *mut DokanFileInfo,
) -> i32 {
    FOUND.with(|found| {
        let (names, room, full) = &mut *found.borrow_mut();
        if *room == 0 {
            *full = true;
            return 1;
        }
        *room -= 1;
        let name = &(*data).cFileName;
        let len = name.iter().position(|c| *c == 0).unwrap_or(name.len());
        names.push(U16Str::from_slice(&name[..len]).to_string_lossy());
        0
    })
}

/// Issues requests through [`OPERATIONS`] against one session's option
/// block.
pub struct NativeClient {
    options: *mut DokanOptions,
}

impl NativeClient {
    pub fn new(session: &MountSession) -> Self {
        NativeClient {
            options: session.native_options(),
        }
    }

    fn ops() -> &'static DokanOperations {
        &OPERATIONS
    }

    pub fn create(
        &self,
        path: &str,
        access: u32,
        disposition: u32,
        create_options: u32,
    ) -> std::result::Result<NativeFile, NtStatus> {
        let mut file = NativeFile {
            name: U16CString::from_str(format!("\\{}", path.trim_start_matches('\\'))).unwrap(),
            info: DokanFileInfo::new(self.options),
        };
        let create = Self::ops().ZwCreateFile.unwrap();
        let status = unsafe {
            create(
                file.name.as_ptr(),
                std::ptr::null_mut(),
                access,
                0,
                0,
                disposition,
                create_options,
                &mut file.info,
            )
        };
        if status.is_success() {
            Ok(file)
        } else {
            Err(status)
        }
    }

    pub fn read(
        &self,
        file: &mut NativeFile,
        buf: &mut [u8],
        offset: i64,
    ) -> std::result::Result<usize, NtStatus> {
        let read = Self::ops().ReadFile.unwrap();
        let mut n = 0u32;
        let status = unsafe {
            read(
                file.name.as_ptr(),
                buf.as_mut_ptr() as *mut c_void,
                buf.len() as u32,
                &mut n,
                offset,
                &mut file.info,
            )
        };
        if status.is_success() {
            Ok(n as usize)
        } else {
            Err(status)
        }
    }

    pub fn write(
        &self,
        file: &mut NativeFile,
        data: &[u8],
        offset: i64,
    ) -> std::result::Result<usize, NtStatus> {
        let write = Self::ops().WriteFile.unwrap();
        let mut n = 0u32;
        let status = unsafe {
            write(
                file.name.as_ptr(),
                data.as_ptr() as *const c_void,
                data.len() as u32,
                &mut n,
                offset,
                &mut file.info,
            )
        };
        if status.is_success() {
            Ok(n as usize)
        } else {
            Err(status)
        }
    }

    /// Append as the driver does for `FILE_APPEND_DATA` opens
    pub fn append(
        &self,
        file: &mut NativeFile,
        data: &[u8],
    ) -> std::result::Result<usize, NtStatus> {
        file.info.WriteToEndOfFile = 1;
        let result = self.write(file, data, 0);
        file.info.WriteToEndOfFile = 0;
        result
    }

    pub fn information(
        &self,
        file: &mut NativeFile,
    ) -> std::result::Result<ByHandleFileInformation, NtStatus> {
        let get = Self::ops().GetFileInformation.unwrap();
        let mut out = ByHandleFileInformation::default();
        let status = unsafe { get(file.name.as_ptr(), &mut out, &mut file.info) };
        if status.is_success() {
            Ok(out)
        } else {
            Err(status)
        }
    }

    /// Enumerate a directory, accepting at most `room` entries per
    /// `FindFiles` call, until a call finishes without filling up.
    pub fn list(
        &self,
        file: &mut NativeFile,
        room: usize,
    ) -> std::result::Result<Vec<String>, NtStatus> {
        let find = Self::ops().FindFiles.unwrap();
        let mut names = Vec::new();
        loop {
            FOUND.with(|found| *found.borrow_mut() = (Vec::new(), room, false));
            let status = unsafe { find(file.name.as_ptr(), collect_find_data, &mut file.info) };
            if !status.is_success() {
                return Err(status);
            }
            let (batch, _, full) = FOUND.with(|found| found.take());
            names.extend(batch);
            if !full {
                return Ok(names);
            }
        }
    }

    pub fn set_end_of_file(
        &self,
        file: &mut NativeFile,
        size: i64,
    ) -> std::result::Result<(), NtStatus> {
        let set = Self::ops().SetEndOfFile.unwrap();
        let status = unsafe { set(file.name.as_ptr(), size, &mut file.info) };
        if status.is_success() {
            Ok(())
        } else {
            Err(status)
        }
    }

    pub fn move_to(
        &self,
        file: &mut NativeFile,
        new_path: &str,
        replace: bool,
    ) -> std::result::Result<(), NtStatus> {
        let new_name = U16CString::from_str(format!("\\{}", new_path)).unwrap();
        let status = unsafe {
            (Self::ops().MoveFile.unwrap())(
                file.name.as_ptr(),
                new_name.as_ptr(),
                replace as i32,
                &mut file.info,
            )
        };
        if status.is_success() {
            file.name = new_name;
            Ok(())
        } else {
            Err(status)
        }
    }

    /// Ask whether the entry may be deleted, as the driver does before
    /// setting delete-on-close
    pub fn delete(&self, file: &mut NativeFile) -> std::result::Result<(), NtStatus> {
        let delete = if file.is_dir() {
            Self::ops().DeleteDirectory.unwrap()
        } else {
            Self::ops().DeleteFile.unwrap()
        };
        let status = unsafe { delete(file.name.as_ptr(), &mut file.info) };
        if status.is_success() {
            Ok(())
        } else {
            Err(status)
        }
    }

    /// Volume label, filesystem name and flags, read into buffers of
    /// `size` units
    pub fn volume_information(&self, size: usize) -> (String, String, u32) {
        let mut label = vec![0u16; size];
        let mut fs_name = vec![0u16; size];
        let (mut serial, mut max_len, mut flags) = (0u32, 0u32, 0u32);
        let mut info = DokanFileInfo::new(self.options);
        let status = unsafe {
            (Self::ops().GetVolumeInformation.unwrap())(
                label.as_mut_ptr(),
                size as u32,
                &mut serial,
                &mut max_len,
                &mut flags,
                fs_name.as_mut_ptr(),
                size as u32,
                &mut info,
            )
        };
        assert!(status.is_success());
        let decode = |buf: &[u16]| {
            let len = buf.iter().position(|c| *c == 0).unwrap_or(buf.len());
            String::from_utf16_lossy(&buf[..len])
        };
        (decode(&label), decode(&fs_name), flags)
    }

    /// `Cleanup` then `CloseFile`, as the driver issues them on last close
    pub fn close(&self, mut file: NativeFile, delete_on_close: bool) {
        file.info.DeleteOnClose = delete_on_close as u8;
        unsafe {
            (Self::ops().Cleanup.unwrap())(file.name.as_ptr(), &mut file.info);
            (Self::ops().CloseFile.unwrap())(file.name.as_ptr(), &mut file.info);
        }
    }
}
