//! Native Dokan2 ABI: structures, callback table and constants.
//!
//! Layouts follow `dokan.h` / `fileinfo.h` from Dokan 2.x. Everything here
//! is plain data; the code that dereferences these pointers lives in
//! `callbacks.rs` and `library.rs`.

#![allow(non_snake_case)]

use crate::status::NtStatus;
use std::ffi::c_void;

pub const MAX_PATH: usize = 260;
pub const VOLUME_SECURITY_DESCRIPTOR_MAX_SIZE: usize = 1024 * 16;

/// Oldest dokan2.dll the adapter accepts
pub const DOKAN_MINIMUM_COMPATIBLE_VERSION: u32 = 200;

/// Version stamped into every option block
pub const DOKAN_VERSION: u16 = 205;

// Mount options
pub const DOKAN_OPTION_DEBUG: u32 = 1;
pub const DOKAN_OPTION_STDERR: u32 = 2;
pub const DOKAN_OPTION_ALT_STREAM: u32 = 4;
pub const DOKAN_OPTION_WRITE_PROTECT: u32 = 8;
pub const DOKAN_OPTION_NETWORK: u32 = 16;
pub const DOKAN_OPTION_REMOVABLE: u32 = 32;
pub const DOKAN_OPTION_MOUNT_MANAGER: u32 = 64;
pub const DOKAN_OPTION_CURRENT_SESSION: u32 = 128;
pub const DOKAN_OPTION_FILELOCK_USER_MODE: u32 = 256;

// File attributes
pub const FILE_ATTRIBUTE_READONLY: u32 = 0x1;
pub const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
pub const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;
pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x10;
pub const FILE_ATTRIBUTE_ARCHIVE: u32 = 0x20;
pub const FILE_ATTRIBUTE_NORMAL: u32 = 0x80;

// ZwCreateFile options
pub const FILE_DIRECTORY_FILE: u32 = 0x01;
pub const FILE_WRITE_THROUGH: u32 = 0x02;
pub const FILE_SEQUENTIAL_ONLY: u32 = 0x04;
pub const FILE_DELETE_ON_CLOSE: u32 = 0x10;
pub const FILE_NON_DIRECTORY_FILE: u32 = 0x40;

// ZwCreateFile dispositions
pub const FILE_SUPERSEDE: u32 = 0;
pub const FILE_OPEN: u32 = 1;
pub const FILE_CREATE: u32 = 2;
pub const FILE_OPEN_IF: u32 = 3;
pub const FILE_OVERWRITE: u32 = 4;
pub const FILE_OVERWRITE_IF: u32 = 5;

// Access mask bits
pub const FILE_READ_DATA: u32 = 0x1;
pub const FILE_WRITE_DATA: u32 = 0x2;
pub const FILE_APPEND_DATA: u32 = 0x4;
pub const FILE_READ_ATTRIBUTES: u32 = 0x80;
pub const FILE_WRITE_ATTRIBUTES: u32 = 0x100;

// Filesystem flags
pub const FILE_CASE_SENSITIVE_SEARCH: u32 = 0x1;
pub const FILE_CASE_PRESERVED_NAMES: u32 = 0x2;
pub const FILE_UNICODE_ON_DISK: u32 = 0x4;
pub const FILE_READ_ONLY_VOLUME: u32 = 0x0008_0000;

/// `DOKAN_OPTIONS`
#[repr(C)]
pub struct DokanOptions {
    pub Version: u16,
    pub SingleThread: u8,
    pub Options: u32,
    pub GlobalContext: u64,
    pub MountPoint: *const u16,
    pub UNCName: *const u16,
    pub Timeout: u32,
    pub AllocationUnitSize: u32,
    pub SectorSize: u32,
    pub VolumeSecurityDescriptorLength: u32,
    pub VolumeSecurityDescriptor: [u8; VOLUME_SECURITY_DESCRIPTOR_MAX_SIZE],
}

/// `DOKAN_FILE_INFO`, passed to every callback
#[repr(C)]
pub struct DokanFileInfo {
    pub Context: u64,
    pub DokanContext: u64,
    pub DokanOptions: *mut DokanOptions,
    pub ProcessingContext: *mut c_void,
    pub ProcessId: u32,
    pub IsDirectory: u8,
    pub DeleteOnClose: u8,
    pub PagingIo: u8,
    pub SynchronousIo: u8,
    pub Nocache: u8,
    pub WriteToEndOfFile: u8,
}

impl DokanFileInfo {
    /// A request context bound to an option block, with no open handle
    pub fn new(options: *mut DokanOptions) -> Self {
        DokanFileInfo {
            Context: 0,
            DokanContext: 0,
            DokanOptions: options,
            ProcessingContext: std::ptr::null_mut(),
            ProcessId: 0,
            IsDirectory: 0,
            DeleteOnClose: 0,
            PagingIo: 0,
            SynchronousIo: 0,
            Nocache: 0,
            WriteToEndOfFile: 0,
        }
    }
}

/// `FILETIME`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileTime {
    pub dwLowDateTime: u32,
    pub dwHighDateTime: u32,
}

/// `BY_HANDLE_FILE_INFORMATION`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByHandleFileInformation {
    pub dwFileAttributes: u32,
    pub ftCreationTime: FileTime,
    pub ftLastAccessTime: FileTime,
    pub ftLastWriteTime: FileTime,
    pub dwVolumeSerialNumber: u32,
    pub nFileSizeHigh: u32,
    pub nFileSizeLow: u32,
    pub nNumberOfLinks: u32,
    pub nFileIndexHigh: u32,
    pub nFileIndexLow: u32,
}

/// `WIN32_FIND_DATAW`
#[repr(C)]
#[derive(Clone)]
pub struct Win32FindDataW {
    pub dwFileAttributes: u32,
    pub ftCreationTime: FileTime,
    pub ftLastAccessTime: FileTime,
    pub ftLastWriteTime: FileTime,
    pub nFileSizeHigh: u32,
    pub nFileSizeLow: u32,
    pub dwReserved0: u32,
    pub dwReserved1: u32,
    pub cFileName: [u16; MAX_PATH],
    pub cAlternateFileName: [u16; 14],
}

impl Default for Win32FindDataW {
    fn default() -> Self {
        Win32FindDataW {
            dwFileAttributes: 0,
            ftCreationTime: FileTime::default(),
            ftLastAccessTime: FileTime::default(),
            ftLastWriteTime: FileTime::default(),
            nFileSizeHigh: 0,
            nFileSizeLow: 0,
            dwReserved0: 0,
            dwReserved1: 0,
            cFileName: [0; MAX_PATH],
            cAlternateFileName: [0; 14],
        }
    }
}

impl Win32FindDataW {
    /// The file name up to its terminator
    pub fn file_name(&self) -> String {
        let len = self
            .cFileName
            .iter()
            .position(|c| *c == 0)
            .unwrap_or(MAX_PATH);
        String::from_utf16_lossy(&self.cFileName[..len])
    }
}

/// `DOKAN_MOUNT_POINT_INFO`
#[repr(C)]
pub struct NativeMountPointInfo {
    pub Type: u32,
    pub MountPoint: [u16; MAX_PATH],
    pub UNCName: [u16; 64],
    pub DeviceName: [u16; 64],
    pub SessionId: u32,
    pub MountOptions: u32,
}

/// `PFillFindData`: returns 1 when the driver's buffer is full
pub type FillFindData =
    unsafe extern "system" fn(find_data: *mut Win32FindDataW, info: *mut DokanFileInfo) -> i32;

/// Slot type for callbacks the adapter leaves to the driver's defaults
pub type UnimplementedCallback = unsafe extern "system" fn();

pub type ZwCreateFileFn = unsafe extern "system" fn(
    file_name: *const u16,
    security_context: *mut c_void,
    desired_access: u32,
    file_attributes: u32,
    share_access: u32,
    create_disposition: u32,
    create_options: u32,
    info: *mut DokanFileInfo,
) -> NtStatus;
pub type CleanupFn = unsafe extern "system" fn(file_name: *const u16, info: *mut DokanFileInfo);
pub type CloseFileFn = unsafe extern "system" fn(file_name: *const u16, info: *mut DokanFileInfo);
pub type ReadFileFn = unsafe extern "system" fn(
    file_name: *const u16,
    buffer: *mut c_void,
    buffer_length: u32,
    read_length: *mut u32,
    offset: i64,
    info: *mut DokanFileInfo,
) -> NtStatus;
pub type WriteFileFn = unsafe extern "system" fn(
    file_name: *const u16,
    buffer: *const c_void,
    bytes_to_write: u32,
    bytes_written: *mut u32,
    offset: i64,
    info: *mut DokanFileInfo,
) -> NtStatus;
pub type GetFileInformationFn = unsafe extern "system" fn(
    file_name: *const u16,
    buffer: *mut ByHandleFileInformation,
    info: *mut DokanFileInfo,
) -> NtStatus;
pub type FindFilesFn = unsafe extern "system" fn(
    path_name: *const u16,
    fill_find_data: FillFindData,
    info: *mut DokanFileInfo,
) -> NtStatus;
pub type DeleteFn =
    unsafe extern "system" fn(file_name: *const u16, info: *mut DokanFileInfo) -> NtStatus;
pub type MoveFileFn = unsafe extern "system" fn(
    file_name: *const u16,
    new_file_name: *const u16,
    replace_if_existing: i32,
    info: *mut DokanFileInfo,
) -> NtStatus;
pub type SetEndOfFileFn = unsafe extern "system" fn(
    file_name: *const u16,
    byte_offset: i64,
    info: *mut DokanFileInfo,
) -> NtStatus;
pub type GetDiskFreeSpaceFn = unsafe extern "system" fn(
    free_bytes_available: *mut u64,
    total_number_of_bytes: *mut u64,
    total_number_of_free_bytes: *mut u64,
    info: *mut DokanFileInfo,
) -> NtStatus;
pub type GetVolumeInformationFn = unsafe extern "system" fn(
    volume_name_buffer: *mut u16,
    volume_name_size: u32,
    volume_serial_number: *mut u32,
    maximum_component_length: *mut u32,
    file_system_flags: *mut u32,
    file_system_name_buffer: *mut u16,
    file_system_name_size: u32,
    info: *mut DokanFileInfo,
) -> NtStatus;
pub type MountedFn =
    unsafe extern "system" fn(mount_point: *const u16, info: *mut DokanFileInfo) -> NtStatus;
pub type UnmountedFn = unsafe extern "system" fn(info: *mut DokanFileInfo) -> NtStatus;

/// `DOKAN_OPERATIONS`. `None` slots are null pointers to the driver.
#[repr(C)]
pub struct DokanOperations {
    pub ZwCreateFile: Option<ZwCreateFileFn>,
    pub Cleanup: Option<CleanupFn>,
    pub CloseFile: Option<CloseFileFn>,
    pub ReadFile: Option<ReadFileFn>,
    pub WriteFile: Option<WriteFileFn>,
    pub FlushFileBuffers: Option<UnimplementedCallback>,
    pub GetFileInformation: Option<GetFileInformationFn>,
    pub FindFiles: Option<FindFilesFn>,
    pub FindFilesWithPattern: Option<UnimplementedCallback>,
    pub SetFileAttributes: Option<UnimplementedCallback>,
    pub SetFileTime: Option<UnimplementedCallback>,
    pub DeleteFile: Option<DeleteFn>,
    pub DeleteDirectory: Option<DeleteFn>,
    pub MoveFile: Option<MoveFileFn>,
    pub SetEndOfFile: Option<SetEndOfFileFn>,
    pub SetAllocationSize: Option<SetEndOfFileFn>,
    pub LockFile: Option<UnimplementedCallback>,
    pub UnlockFile: Option<UnimplementedCallback>,
    pub GetDiskFreeSpace: Option<GetDiskFreeSpaceFn>,
    pub GetVolumeInformation: Option<GetVolumeInformationFn>,
    pub Mounted: Option<MountedFn>,
    pub Unmounted: Option<UnmountedFn>,
    pub GetFileSecurity: Option<UnimplementedCallback>,
    pub SetFileSecurity: Option<UnimplementedCallback>,
    pub FindStreams: Option<UnimplementedCallback>,
}
