//! `extern "system"` entry points registered with the driver.
//!
//! Each trampoline decodes raw arguments, finds the session through the
//! option block's `GlobalContext` and the open handle through
//! `DokanFileInfo::Context`, and hands off to `dispatch`. Panics are caught
//! here and never unwind into the driver.

use crate::dispatch;
use crate::ffi::{
    ByHandleFileInformation, DokanFileInfo, DokanOperations, FillFindData, Win32FindDataW,
};
use crate::path;
use crate::session::{self, MountSession};
use crate::status::NtStatus;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info};
use widestring::U16CStr;

/// The callback table handed to `DokanCreateFileSystem`
pub static OPERATIONS: DokanOperations = DokanOperations {
    ZwCreateFile: Some(zw_create_file),
    Cleanup: Some(cleanup),
    CloseFile: Some(close_file),
    ReadFile: Some(read_file),
    WriteFile: Some(write_file),
    FlushFileBuffers: None,
    GetFileInformation: Some(get_file_information),
    FindFiles: Some(find_files),
    FindFilesWithPattern: None,
    SetFileAttributes: None,
    SetFileTime: None,
    DeleteFile: Some(delete_file),
    DeleteDirectory: Some(delete_directory),
    MoveFile: Some(move_file),
    SetEndOfFile: Some(set_end_of_file),
    SetAllocationSize: Some(set_end_of_file),
    LockFile: None,
    UnlockFile: None,
    GetDiskFreeSpace: Some(get_disk_free_space),
    GetVolumeInformation: Some(get_volume_information),
    Mounted: Some(mounted),
    Unmounted: Some(unmounted),
    GetFileSecurity: None,
    SetFileSecurity: None,
    FindStreams: None,
};

type Outcome = Result<(), NtStatus>;

/// Resolve the session a request belongs to.
///
/// # Safety
///
/// `info` must be null or point to a live `DokanFileInfo`.
unsafe fn session_of(info: *mut DokanFileInfo) -> Option<std::sync::Arc<MountSession>> {
    if info.is_null() || (*info).DokanOptions.is_null() {
        return None;
    }
    session::lookup((*(*info).DokanOptions).GlobalContext)
}

/// Run a request body against its session with panic containment.
fn serve(
    op: &'static str,
    info: *mut DokanFileInfo,
    body: impl FnOnce(&MountSession) -> Outcome,
) -> NtStatus {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: the driver passes the request context it owns.
        match unsafe { session_of(info) } {
            Some(session) => body(session.as_ref()),
            None => {
                error!(op, "Request for an unknown mount");
                Err(NtStatus::INVALID_PARAMETER)
            }
        }
    }));

    match result {
        Ok(outcome) => NtStatus::from_result(outcome),
        Err(_) => {
            error!(op, "Panic while serving request");
            NtStatus::ACCESS_DENIED
        }
    }
}

/// Decode and normalize a path argument.
///
/// # Safety
///
/// `ptr` must be null or a NUL-terminated UTF-16 string.
unsafe fn path_arg(ptr: *const u16) -> Result<String, NtStatus> {
    if ptr.is_null() {
        return Err(NtStatus::INVALID_PARAMETER);
    }
    path::normalize_wide(U16CStr::from_ptr_str(ptr)).map_err(|e| NtStatus::from(&e))
}

/// # Safety
///
/// `info` must point to a live `DokanFileInfo`.
unsafe fn context(info: *mut DokanFileInfo) -> u64 {
    (*info).Context
}

/// Copy `value` into a driver buffer of `size` UTF-16 units, truncating and
/// always terminating.
///
/// # Safety
///
/// `buf` must be null or valid for `size` writes.
unsafe fn write_wide(buf: *mut u16, size: u32, value: &str) {
    if buf.is_null() || size == 0 {
        return;
    }
    let out = std::slice::from_raw_parts_mut(buf, size as usize);
    let mut len = 0;
    for (slot, unit) in out.iter_mut().zip(value.encode_utf16()).take(size as usize - 1) {
        *slot = unit;
        len += 1;
    }
    out[len] = 0;
}

unsafe extern "system" fn zw_create_file(
    file_name: *const u16,
    _security_context: *mut c_void,
    desired_access: u32,
    _file_attributes: u32,
    _share_access: u32,
    create_disposition: u32,
    create_options: u32,
    info: *mut DokanFileInfo,
) -> NtStatus {
    serve("create", info, |session| {
        let path = path_arg(file_name)?;
        let created = dispatch::create(
            session,
            path,
            desired_access,
            create_disposition,
            create_options,
        )?;
        (*info).Context = created.handle;
        if created.is_dir {
            (*info).IsDirectory = 1;
        }
        Ok(())
    })
}

unsafe extern "system" fn cleanup(_file_name: *const u16, info: *mut DokanFileInfo) {
    let status = serve("cleanup", info, |session| {
        dispatch::cleanup(session, context(info), (*info).DeleteOnClose != 0)
    });
    if !status.is_success() {
        debug!(status = %status, "Cleanup failed");
    }
}

unsafe extern "system" fn close_file(_file_name: *const u16, info: *mut DokanFileInfo) {
    serve("close", info, |session| {
        dispatch::close(session, context(info));
        (*info).Context = 0;
        Ok(())
    });
}

unsafe extern "system" fn read_file(
    _file_name: *const u16,
    buffer: *mut c_void,
    buffer_length: u32,
    read_length: *mut u32,
    offset: i64,
    info: *mut DokanFileInfo,
) -> NtStatus {
    serve("read", info, |session| {
        if !read_length.is_null() {
            *read_length = 0;
        }
        if buffer.is_null() || offset < 0 {
            return Err(NtStatus::INVALID_PARAMETER);
        }
        let buf = std::slice::from_raw_parts_mut(buffer as *mut u8, buffer_length as usize);
        let n = dispatch::read(session, context(info), buf, offset as u64)?;
        if !read_length.is_null() {
            *read_length = n as u32;
        }
        Ok(())
    })
}

unsafe extern "system" fn write_file(
    _file_name: *const u16,
    buffer: *const c_void,
    bytes_to_write: u32,
    bytes_written: *mut u32,
    offset: i64,
    info: *mut DokanFileInfo,
) -> NtStatus {
    serve("write", info, |session| {
        if !bytes_written.is_null() {
            *bytes_written = 0;
        }
        if buffer.is_null() {
            return Err(NtStatus::INVALID_PARAMETER);
        }
        let buf = std::slice::from_raw_parts(buffer as *const u8, bytes_to_write as usize);
        let offset = if (*info).WriteToEndOfFile != 0 || offset < 0 {
            None
        } else {
            Some(offset as u64)
        };
        let n = dispatch::write(session, context(info), buf, offset)?;
        if !bytes_written.is_null() {
            *bytes_written = n as u32;
        }
        Ok(())
    })
}

unsafe extern "system" fn get_file_information(
    _file_name: *const u16,
    buffer: *mut ByHandleFileInformation,
    info: *mut DokanFileInfo,
) -> NtStatus {
    serve("file_information", info, |session| {
        if buffer.is_null() {
            return Err(NtStatus::INVALID_PARAMETER);
        }
        *buffer = dispatch::file_information(session, context(info))?;
        Ok(())
    })
}

unsafe extern "system" fn find_files(
    _path_name: *const u16,
    fill_find_data: FillFindData,
    info: *mut DokanFileInfo,
) -> NtStatus {
    serve("find_files", info, |session| {
        session.keep_alive(info);
        dispatch::find_files(session, context(info), &mut |data: &mut Win32FindDataW| {
            fill_find_data(data, info) == 1
        })
    })
}

unsafe extern "system" fn delete_file(_file_name: *const u16, info: *mut DokanFileInfo) -> NtStatus {
    serve("delete_file", info, |session| {
        dispatch::delete_file(session, context(info))
    })
}

unsafe extern "system" fn delete_directory(
    _file_name: *const u16,
    info: *mut DokanFileInfo,
) -> NtStatus {
    serve("delete_directory", info, |session| {
        dispatch::delete_directory(session, context(info))
    })
}

unsafe extern "system" fn move_file(
    _file_name: *const u16,
    new_file_name: *const u16,
    replace_if_existing: i32,
    info: *mut DokanFileInfo,
) -> NtStatus {
    serve("move_file", info, |session| {
        let new_path = path_arg(new_file_name)?;
        dispatch::move_file(session, context(info), new_path, replace_if_existing != 0)
    })
}

unsafe extern "system" fn set_end_of_file(
    _file_name: *const u16,
    byte_offset: i64,
    info: *mut DokanFileInfo,
) -> NtStatus {
    serve("set_end_of_file", info, |session| {
        if byte_offset < 0 {
            return Err(NtStatus::INVALID_PARAMETER);
        }
        dispatch::set_end_of_file(session, context(info), byte_offset as u64)
    })
}

unsafe extern "system" fn get_disk_free_space(
    free_bytes_available: *mut u64,
    total_number_of_bytes: *mut u64,
    total_number_of_free_bytes: *mut u64,
    info: *mut DokanFileInfo,
) -> NtStatus {
    serve("disk_free_space", info, |session| {
        let space = dispatch::disk_free_space(session)?;
        for (out, value) in [
            (free_bytes_available, space.available),
            (total_number_of_bytes, space.total),
            (total_number_of_free_bytes, space.free),
        ] {
            if !out.is_null() {
                *out = value;
            }
        }
        Ok(())
    })
}

unsafe extern "system" fn get_volume_information(
    volume_name_buffer: *mut u16,
    volume_name_size: u32,
    volume_serial_number: *mut u32,
    maximum_component_length: *mut u32,
    file_system_flags: *mut u32,
    file_system_name_buffer: *mut u16,
    file_system_name_size: u32,
    info: *mut DokanFileInfo,
) -> NtStatus {
    serve("volume_information", info, |session| {
        let volume = dispatch::volume_information(session);
        write_wide(volume_name_buffer, volume_name_size, &volume.label);
        write_wide(
            file_system_name_buffer,
            file_system_name_size,
            &volume.filesystem_name,
        );
        for (out, value) in [
            (volume_serial_number, volume.serial),
            (maximum_component_length, volume.max_component_length),
            (file_system_flags, volume.filesystem_flags),
        ] {
            if !out.is_null() {
                *out = value;
            }
        }
        Ok(())
    })
}

unsafe extern "system" fn mounted(mount_point: *const u16, info: *mut DokanFileInfo) -> NtStatus {
    serve("mounted", info, |session| {
        let reported = if mount_point.is_null() {
            String::new()
        } else {
            U16CStr::from_ptr_str(mount_point).to_string_lossy()
        };
        info!(mount_point = %session.mount_point(), reported = %reported, "Driver reports mounted");
        session.signal_mounted();
        Ok(())
    })
}

unsafe extern "system" fn unmounted(info: *mut DokanFileInfo) -> NtStatus {
    serve("unmounted", info, |session| {
        debug!(mount_point = %session.mount_point(), "Driver reports unmounted");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::DokanOptions;

    #[test]
    fn test_write_wide_truncates_and_terminates() {
        let mut buf = [0xFFFFu16; 4];
        unsafe { write_wide(buf.as_mut_ptr(), 4, "volume") };
        assert_eq!(String::from_utf16_lossy(&buf[..3]), "vol");
        assert_eq!(buf[3], 0);

        let mut buf = [0xFFFFu16; 8];
        unsafe { write_wide(buf.as_mut_ptr(), 8, "ab") };
        assert_eq!(&buf[..3], &[b'a' as u16, b'b' as u16, 0]);
    }

    #[test]
    fn test_unknown_session_is_invalid_parameter() {
        let mut info = DokanFileInfo::new(std::ptr::null_mut());
        let null = std::ptr::null_mut();
        let status = unsafe { get_disk_free_space(null, null, null, &mut info) };
        assert_eq!(status, NtStatus::INVALID_PARAMETER);

        // an option block whose context names no live session
        let mut options: Box<DokanOptions> = Box::new(unsafe { std::mem::zeroed() });
        options.GlobalContext = u64::MAX;
        let mut info = DokanFileInfo::new(&mut *options);
        let status = unsafe { unmounted(&mut info) };
        assert_eq!(status, NtStatus::INVALID_PARAMETER);
    }

    #[test]
    fn test_panic_does_not_escape() {
        let status = serve("test", std::ptr::null_mut(), |_| panic!("boom"));
        // no session, so the body never runs
        assert_eq!(status, NtStatus::INVALID_PARAMETER);

        let mut options: Box<DokanOptions> = Box::new(unsafe { std::mem::zeroed() });
        let session = crate::testing::memory_session();
        options.GlobalContext = session.id();
        let mut info = DokanFileInfo::new(&mut *options);
        let status = serve("test", &mut info, |_| panic!("boom"));
        assert_eq!(status, NtStatus::ACCESS_DENIED);
    }
}
