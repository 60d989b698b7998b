//! Request handlers.
//!
//! One function per driver request. Each resolves what it needs from the
//! session and handle table, asks the backend, and reports the outcome as
//! `Result<_, NtStatus>`. Nothing here touches raw pointers; `callbacks.rs`
//! does the decoding and encoding around these.
//!
//! Backend errors are mapped to a status exactly once, through [`fail`].

use crate::ffi::{
    ByHandleFileInformation, Win32FindDataW, FILE_ATTRIBUTE_DIRECTORY, FILE_ATTRIBUTE_NORMAL,
    FILE_ATTRIBUTE_READONLY, FILE_READ_ONLY_VOLUME, MAX_PATH,
};
use crate::handle::{DirListing, HandleState, OpenHandle};
use crate::negotiate::{AccessMode, CreateRequest};
use crate::session::MountSession;
use crate::status::NtStatus;
use crate::time::to_filetime_opt;
use fsbridge_core::{CapacityMode, DirEntry, FsError, Metadata};
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Batch size for streaming directory listings
pub const DIR_BATCH: usize = 256;

type DispatchResult<T> = Result<T, NtStatus>;

/// Map a backend error, logging it once.
fn fail(op: &str, path: &str, err: FsError) -> NtStatus {
    let status = NtStatus::from(&err);
    if err.is_not_found() {
        debug!(op, path, error = %err, status = %status, "Backend error");
    } else {
        warn!(op, path, error = %err, status = %status, "Backend error");
    }
    status
}

fn fail_io(op: &str, path: &str, err: io::Error) -> NtStatus {
    fail(op, path, FsError::from_io(err, path))
}

/// Look up the handle behind a request's context value
pub fn handle(session: &MountSession, id: u64, op: &str) -> DispatchResult<Arc<OpenHandle>> {
    session.handles().get(id).ok_or_else(|| {
        error!(op, handle = id, mount_point = %session.mount_point(), "No such handle");
        NtStatus::INVALID_PARAMETER
    })
}

/// Outcome of a successful create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Created {
    /// Key to store in the request context
    pub handle: u64,
    /// Whether the opened entry is a directory
    pub is_dir: bool,
}

/// `ZwCreateFile`
pub fn create(
    session: &MountSession,
    path: String,
    access: u32,
    disposition: u32,
    options: u32,
) -> DispatchResult<Created> {
    let request = CreateRequest::parse(access, disposition, options)?;
    let flags = request.open_flags();
    debug!(
        op = "create",
        path = %path,
        flags = %flags,
        disposition = ?request.disposition,
        "Request"
    );

    let stat = match session.backend().stat(&path) {
        Ok(stat) => Some(stat),
        Err(e) if e.is_not_found() && request.create() => None,
        Err(e) => return Err(fail("create", &path, e)),
    };

    if let Some(stat) = &stat {
        if request.exclusive() {
            return Err(NtStatus::OBJECT_NAME_COLLISION);
        }
        if stat.is_dir && request.non_directory {
            return Err(NtStatus::FILE_IS_A_DIRECTORY);
        }
        if !stat.is_dir && request.directory {
            return Err(NtStatus::NOT_A_DIRECTORY);
        }
    }

    let mut is_dir = stat.as_ref().is_some_and(|s| s.is_dir);

    if request.create() && request.directory && stat.is_none() {
        let maker = session.dir_maker().ok_or(NtStatus::NOT_SUPPORTED)?;
        maker.mkdir(&path).map_err(|e| fail("mkdir", &path, e))?;
        is_dir = true;
    }

    let mut writer = None;
    let mut cached = stat;
    if request.mode != AccessMode::ReadOnly && !request.directory && !is_dir {
        let opener = session.writer().ok_or(NtStatus::ACCESS_DENIED)?;
        if request.truncate() {
            cached = None;
        }
        writer = Some(
            opener
                .open_writer(&path, flags)
                .map_err(|e| fail("open_writer", &path, e))?,
        );
    }

    let handle = session.handles().insert(path, flags, cached);
    if let Some(stream) = writer {
        handle.lock().attach_writer(stream);
    }
    Ok(Created {
        handle: handle.id(),
        is_dir,
    })
}

/// `Cleanup`. Performs the removal when delete-on-close is set.
pub fn cleanup(session: &MountSession, id: u64, delete_on_close: bool) -> DispatchResult<()> {
    let handle = handle(session, id, "cleanup")?;
    if !delete_on_close {
        return Ok(());
    }

    let mut state = handle.lock();
    debug!(op = "cleanup", path = %state.path, "Delete on close");
    state.release();
    state.cached_stat = None;
    let remover = session.remover().ok_or(NtStatus::NOT_SUPPORTED)?;
    remover
        .remove(&state.path)
        .map_err(|e| fail("remove", &state.path, e))
}

/// `CloseFile`. Always succeeds from the driver's point of view.
pub fn close(session: &MountSession, id: u64) {
    match session.handles().remove(id) {
        Some(handle) => {
            let mut state = handle.lock();
            debug!(op = "close", path = %state.path, "Request");
            state.release();
            state.cached_stat = None;
        }
        None => {
            error!(handle = id, mount_point = %session.mount_point(), "Close of unknown handle");
        }
    }
}

/// Fill `buf` from a sequential reader until it is full or the stream ends.
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> (usize, Option<io::Error>) {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return (filled, Some(e)),
        }
    }
    (filled, None)
}

/// Status for a transfer that moved no bytes
fn empty_read(op: &str, path: &str, err: Option<io::Error>) -> NtStatus {
    match err {
        Some(e) => fail_io(op, path, e),
        None => NtStatus::END_OF_FILE,
    }
}

/// `ReadFile`
pub fn read(
    session: &MountSession,
    id: u64,
    buf: &mut [u8],
    offset: u64,
) -> DispatchResult<usize> {
    let handle = handle(session, id, "read")?;
    let mut guard = handle.lock();
    let state: &mut HandleState = &mut guard;

    if state.stream.is_none() {
        let stream = session
            .backend()
            .open(&state.path)
            .map_err(|e| fail("open", &state.path, e))?;
        state.stream = Some(stream);
        state.cursor = Some(0);
    }
    let Some(stream) = state.stream.as_mut() else {
        return Err(NtStatus::INVALID_PARAMETER);
    };

    if state.cursor != Some(offset) {
        if let Some(seeker) = stream.seeker() {
            seeker
                .seek(SeekFrom::Start(offset))
                .map_err(|e| fail_io("seek", &state.path, e))?;
            state.cursor = Some(offset);
        } else if let Some(reader) = stream.reader_at() {
            state.cursor = None;
            return match reader.read_at(buf, offset) {
                Ok(n) if n > 0 => Ok(n),
                Ok(_) => Err(NtStatus::END_OF_FILE),
                Err(e) => Err(fail_io("read_at", &state.path, e)),
            };
        } else {
            return Err(NtStatus::NOT_SUPPORTED);
        }
    }

    let reader = stream.reader().ok_or(NtStatus::NOT_SUPPORTED)?;
    let (n, err) = read_full(reader, buf);
    state.cursor = Some(offset + n as u64);
    if n > 0 {
        Ok(n)
    } else {
        Err(empty_read("read", &state.path, err))
    }
}

/// `WriteFile`. `offset` of `None` means "append at end of file".
pub fn write(
    session: &MountSession,
    id: u64,
    buf: &[u8],
    offset: Option<u64>,
) -> DispatchResult<usize> {
    let handle = handle(session, id, "write")?;
    if handle.flags().is_read_only() {
        return Err(NtStatus::ACCESS_DENIED);
    }

    let mut guard = handle.lock();
    let state: &mut HandleState = &mut guard;
    if !state.writable {
        return Err(NtStatus::ACCESS_DENIED);
    }

    let offset = match offset {
        Some(offset) => offset,
        None => session
            .backend()
            .stat(&state.path)
            .map_err(|e| fail("stat", &state.path, e))?
            .size,
    };

    state.cached_stat = None;
    let Some(stream) = state.stream.as_mut() else {
        return Err(NtStatus::ACCESS_DENIED);
    };

    if state.cursor != Some(offset) {
        if let Some(seeker) = stream.seeker() {
            seeker
                .seek(SeekFrom::Start(offset))
                .map_err(|e| fail_io("seek", &state.path, e))?;
            state.cursor = Some(offset);
        } else if let Some(writer) = stream.writer_at() {
            state.cursor = None;
            return writer
                .write_at(buf, offset)
                .map_err(|e| fail_io("write_at", &state.path, e));
        } else {
            return Err(NtStatus::NOT_SUPPORTED);
        }
    }

    let writer = stream.writer().ok_or(NtStatus::NOT_SUPPORTED)?;
    writer
        .write_all(buf)
        .map_err(|e| fail_io("write", &state.path, e))?;
    state.cursor = Some(offset + buf.len() as u64);
    Ok(buf.len())
}

fn attributes(stat: &Metadata) -> u32 {
    let mut attrs = 0;
    if stat.is_dir {
        attrs |= FILE_ATTRIBUTE_DIRECTORY;
    }
    if stat.readonly {
        attrs |= FILE_ATTRIBUTE_READONLY;
    }
    if attrs == 0 {
        attrs = FILE_ATTRIBUTE_NORMAL;
    }
    attrs
}

fn file_index(path: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

/// `GetFileInformation`
pub fn file_information(
    session: &MountSession,
    id: u64,
) -> DispatchResult<ByHandleFileInformation> {
    let handle = handle(session, id, "file_information")?;
    let mut state = handle.lock();

    let stat = match state.cached_stat.clone() {
        Some(stat) => stat,
        None => {
            let stat = session
                .backend()
                .stat(&state.path)
                .map_err(|e| fail("stat", &state.path, e))?;
            state.cached_stat = Some(stat.clone());
            stat
        }
    };

    let modified = to_filetime_opt(stat.modified);
    let index = file_index(&state.path);
    Ok(ByHandleFileInformation {
        dwFileAttributes: attributes(&stat),
        ftCreationTime: modified,
        ftLastAccessTime: modified,
        ftLastWriteTime: modified,
        dwVolumeSerialNumber: session.options().volume.serial,
        nFileSizeHigh: (stat.size >> 32) as u32,
        nFileSizeLow: stat.size as u32,
        nNumberOfLinks: 1,
        nFileIndexHigh: (index >> 32) as u32,
        nFileIndexLow: index as u32,
    })
}

/// Build a find-data record. Names that do not fit are skipped.
pub fn find_data(entry: &DirEntry) -> Option<Win32FindDataW> {
    let name: Vec<u16> = entry.name.encode_utf16().collect();
    if name.is_empty() || name.len() >= MAX_PATH || name.contains(&0) {
        warn!(name = %entry.name, "Skipping entry with unrepresentable name");
        return None;
    }

    let mut data = Win32FindDataW::default();
    data.cFileName[..name.len()].copy_from_slice(&name);
    data.dwFileAttributes = if entry.is_dir() {
        FILE_ATTRIBUTE_DIRECTORY
    } else {
        FILE_ATTRIBUTE_NORMAL
    };
    if let Some(meta) = &entry.metadata {
        data.nFileSizeLow = meta.size as u32;
        data.nFileSizeHigh = (meta.size >> 32) as u32;
        data.ftLastWriteTime = to_filetime_opt(meta.modified);
        data.ftLastAccessTime = data.ftLastWriteTime;
        data.ftCreationTime = data.ftLastWriteTime;
    }
    Some(data)
}

/// `FindFiles`.
///
/// `fill` returns true when the driver's buffer is full. The enumeration
/// then stops and resumes from the same entry on the next call.
pub fn find_files(
    session: &MountSession,
    id: u64,
    fill: &mut dyn FnMut(&mut Win32FindDataW) -> bool,
) -> DispatchResult<()> {
    let handle = handle(session, id, "find_files")?;
    let mut guard = handle.lock();
    let state: &mut HandleState = &mut guard;
    debug!(op = "find_files", path = %state.path, resumed = state.listing.is_some(), "Request");

    if state.listing.is_none() {
        let listing = match session.backend().dir_opener() {
            Some(opener) => DirListing {
                stream: Some(
                    opener
                        .open_dir(&state.path)
                        .map_err(|e| fail("open_dir", &state.path, e))?,
                ),
                pending: VecDeque::new(),
            },
            None => DirListing {
                stream: None,
                pending: session
                    .backend()
                    .read_dir(&state.path)
                    .map_err(|e| fail("read_dir", &state.path, e))?
                    .into(),
            },
        };
        state.listing = Some(listing);
    }

    let Some(listing) = state.listing.as_mut() else {
        return Err(NtStatus::INVALID_PARAMETER);
    };

    loop {
        if listing.pending.is_empty() {
            let Some(stream) = listing.stream.as_mut() else {
                break;
            };
            let batch = stream
                .read_batch(DIR_BATCH)
                .map_err(|e| fail("read_batch", &state.path, e))?;
            if batch.is_empty() {
                break;
            }
            listing.pending.extend(batch);
        }

        let Some(entry) = listing.pending.pop_front() else {
            break;
        };
        let Some(mut data) = find_data(&entry) else {
            continue;
        };
        if fill(&mut data) {
            listing.pending.push_front(entry);
            debug!(path = %state.path, "Find buffer full, pausing enumeration");
            return Ok(());
        }
    }

    state.listing = None;
    Ok(())
}

/// `DeleteFile`. Only checks the request; removal happens in cleanup.
pub fn delete_file(session: &MountSession, id: u64) -> DispatchResult<()> {
    let handle = handle(session, id, "delete_file")?;
    debug!(op = "delete_file", path = %handle.path(), "Request");
    session.remover().ok_or(NtStatus::NOT_SUPPORTED)?;
    Ok(())
}

/// `DeleteDirectory`. Refuses directories that still have entries.
pub fn delete_directory(session: &MountSession, id: u64) -> DispatchResult<()> {
    let handle = handle(session, id, "delete_directory")?;
    let path = handle.path();
    debug!(op = "delete_directory", path = %path, "Request");
    session.remover().ok_or(NtStatus::NOT_SUPPORTED)?;

    let entries = session
        .backend()
        .read_dir(&path)
        .map_err(|e| fail("read_dir", &path, e))?;
    if !entries.is_empty() {
        return Err(NtStatus::DIRECTORY_NOT_EMPTY);
    }
    Ok(())
}

/// `MoveFile`. The handle follows the entry to its new name.
pub fn move_file(
    session: &MountSession,
    id: u64,
    new_path: String,
    replace_if_existing: bool,
) -> DispatchResult<()> {
    let handle = handle(session, id, "move_file")?;
    let renamer = session.renamer().ok_or_else(|| {
        warn!(path = %new_path, "Rename not supported by backend");
        NtStatus::NOT_SUPPORTED
    })?;

    let mut state = handle.lock();
    debug!(op = "move_file", from = %state.path, to = %new_path, replace_if_existing, "Request");
    if !replace_if_existing && session.backend().stat(&new_path).is_ok() {
        return Err(NtStatus::OBJECT_NAME_COLLISION);
    }

    state.cached_stat = None;
    renamer
        .rename(&state.path, &new_path)
        .map_err(|e| fail("rename", &state.path, e))?;
    state.path = new_path;
    Ok(())
}

/// `SetEndOfFile` and `SetAllocationSize`
pub fn set_end_of_file(session: &MountSession, id: u64, size: u64) -> DispatchResult<()> {
    let handle = handle(session, id, "set_end_of_file")?;
    let mut guard = handle.lock();
    let state: &mut HandleState = &mut guard;
    debug!(op = "set_end_of_file", path = %state.path, size, "Request");

    if state.writable {
        if let Some(resizer) = state.stream.as_mut().and_then(|s| s.resizer()) {
            state.cached_stat = None;
            return resizer
                .resize(size)
                .map_err(|e| fail_io("resize", &state.path, e));
        }
    }

    let truncater = session.truncater().ok_or(NtStatus::NOT_SUPPORTED)?;
    state.cached_stat = None;
    truncater
        .truncate(&state.path, size)
        .map_err(|e| fail("truncate", &state.path, e))
}

/// Capacity numbers: (available to caller, total, free)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSpace {
    pub available: u64,
    pub total: u64,
    pub free: u64,
}

/// `GetDiskFreeSpace`
pub fn disk_free_space(session: &MountSession) -> DispatchResult<FreeSpace> {
    let capacity = &session.options().capacity;
    match capacity.mode {
        CapacityMode::Static => Ok(FreeSpace {
            available: capacity.available_bytes,
            total: capacity.total_bytes,
            free: capacity.available_bytes,
        }),
        CapacityMode::Backend => {
            let query = session.backend().disk_space().ok_or(NtStatus::NOT_SUPPORTED)?;
            let space = query
                .free_space()
                .map_err(|e| fail("free_space", ".", e))?;
            Ok(FreeSpace {
                available: space.available,
                total: space.total,
                free: space.free,
            })
        }
    }
}

/// Volume identity returned by `GetVolumeInformation`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInformation {
    pub label: String,
    pub filesystem_name: String,
    pub serial: u32,
    pub max_component_length: u32,
    pub filesystem_flags: u32,
}

/// `GetVolumeInformation`
pub fn volume_information(session: &MountSession) -> VolumeInformation {
    let volume = &session.options().volume;
    let mut flags = volume.filesystem_flags;
    if session.is_write_protected() {
        flags |= FILE_READ_ONLY_VOLUME;
    }
    VolumeInformation {
        label: volume.label.clone(),
        filesystem_name: volume.filesystem_name.clone(),
        serial: volume.serial,
        max_component_length: volume.max_component_length,
        filesystem_flags: flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::{
        FILE_APPEND_DATA, FILE_CREATE, FILE_DIRECTORY_FILE, FILE_NON_DIRECTORY_FILE, FILE_OPEN,
        FILE_OPEN_IF, FILE_OVERWRITE_IF, FILE_READ_DATA, FILE_WRITE_DATA,
    };
    use crate::testing::MockDriver;
    use fsbridge_core::{Capabilities, DriverFlags, MemoryFs, MountOptions, StreamCaps};

    const RW: u32 = FILE_READ_DATA | FILE_WRITE_DATA;

    fn session_with(fs: MemoryFs, options: MountOptions) -> (Arc<MountSession>, Arc<MemoryFs>) {
        let fs = Arc::new(fs);
        let session = MountSession::new(
            "X:\\".to_string(),
            fs.clone(),
            options,
            &DriverFlags::default(),
            Arc::new(MockDriver::new()),
        )
        .unwrap();
        (session, fs)
    }

    fn session(fs: MemoryFs) -> (Arc<MountSession>, Arc<MemoryFs>) {
        session_with(fs, MountOptions::default())
    }

    fn open(session: &MountSession, path: &str, access: u32, disposition: u32) -> u64 {
        create(session, path.to_string(), access, disposition, 0)
            .unwrap()
            .handle
    }

    #[test]
    fn test_open_missing_without_create_is_not_found() {
        let (s, _) = session(MemoryFs::builder().writable().build());
        for disposition in [FILE_OPEN, crate::ffi::FILE_OVERWRITE] {
            assert_eq!(
                create(&s, "nope".to_string(), FILE_READ_DATA, disposition, 0),
                Err(NtStatus::OBJECT_NAME_NOT_FOUND)
            );
        }
        assert!(s.handles().is_empty());
    }

    #[test]
    fn test_strict_create_on_existing_is_collision() {
        let (s, _) = session(MemoryFs::builder().file("a", "x").dir("d").writable().build());
        assert_eq!(
            create(&s, "a".to_string(), RW, FILE_CREATE, 0),
            Err(NtStatus::OBJECT_NAME_COLLISION)
        );
        assert_eq!(
            create(&s, "d".to_string(), 0, FILE_CREATE, FILE_DIRECTORY_FILE),
            Err(NtStatus::OBJECT_NAME_COLLISION)
        );
    }

    #[test]
    fn test_directory_mismatch() {
        let (s, _) = session(MemoryFs::builder().file("a", "x").dir("d").build());
        assert_eq!(
            create(&s, "d".to_string(), FILE_READ_DATA, FILE_OPEN, FILE_NON_DIRECTORY_FILE),
            Err(NtStatus::FILE_IS_A_DIRECTORY)
        );
        assert_eq!(
            create(&s, "a".to_string(), FILE_READ_DATA, FILE_OPEN, FILE_DIRECTORY_FILE),
            Err(NtStatus::NOT_A_DIRECTORY)
        );
        let created = create(&s, "d".to_string(), FILE_READ_DATA, FILE_OPEN, 0).unwrap();
        assert!(created.is_dir);
    }

    #[test]
    fn test_write_open_on_read_only_backend_is_denied() {
        let (s, _) = session(MemoryFs::builder().file("a", "x").build());
        for access in [FILE_WRITE_DATA, RW, FILE_APPEND_DATA] {
            assert_eq!(
                create(&s, "a".to_string(), access, FILE_OPEN, 0),
                Err(NtStatus::ACCESS_DENIED)
            );
        }
        assert!(create(&s, "a".to_string(), FILE_READ_DATA, FILE_OPEN, 0).is_ok());
    }

    #[test]
    fn test_mkdir_without_capability_is_not_supported() {
        let (s, _) = session(MemoryFs::builder().build());
        assert_eq!(
            create(&s, "dir".to_string(), 0, FILE_CREATE, FILE_DIRECTORY_FILE),
            Err(NtStatus::NOT_SUPPORTED)
        );
    }

    #[test]
    fn test_read_eof_and_short_reads() {
        let (s, _) = session(MemoryFs::builder().file("a", "hello").build());
        let id = open(&s, "a", FILE_READ_DATA, FILE_OPEN);

        let mut buf = [0u8; 16];
        assert_eq!(read(&s, id, &mut buf, 0), Ok(5));
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(read(&s, id, &mut buf, 5), Err(NtStatus::END_OF_FILE));
        assert_eq!(read(&s, id, &mut buf[..2], 3), Ok(2));
        assert_eq!(&buf[..2], b"lo");
    }

    #[test]
    fn test_read_with_random_access_only() {
        let streams = StreamCaps {
            seek: false,
            random_access: true,
            resize: false,
        };
        let (s, _) = session(MemoryFs::builder().file("a", "abcdef").streams(streams).build());
        let id = open(&s, "a", FILE_READ_DATA, FILE_OPEN);

        let mut buf = [0u8; 3];
        assert_eq!(read(&s, id, &mut buf, 3), Ok(3));
        assert_eq!(&buf, b"def");
        assert!(handle(&s, id, "test").unwrap().lock().cursor.is_none());
        assert_eq!(read(&s, id, &mut buf, 6), Err(NtStatus::END_OF_FILE));
    }

    #[test]
    fn test_read_out_of_order_on_stream_only_is_not_supported() {
        let streams = StreamCaps {
            seek: false,
            random_access: false,
            resize: false,
        };
        let (s, _) = session(MemoryFs::builder().file("a", "abcdef").streams(streams).build());
        let id = open(&s, "a", FILE_READ_DATA, FILE_OPEN);

        let mut buf = [0u8; 2];
        assert_eq!(read(&s, id, &mut buf, 0), Ok(2));
        assert_eq!(read(&s, id, &mut buf, 2), Ok(2));
        assert_eq!(read(&s, id, &mut buf, 0), Err(NtStatus::NOT_SUPPORTED));
    }

    #[test]
    fn test_write_through_read_only_handle_is_denied() {
        let (s, fs) = session(MemoryFs::builder().file("a", "x").writable().build());
        let id = open(&s, "a", FILE_READ_DATA, FILE_OPEN);
        assert_eq!(write(&s, id, b"nope", Some(0)), Err(NtStatus::ACCESS_DENIED));
        assert_eq!(fs.contents("a").unwrap(), b"x");
    }

    #[test]
    fn test_write_and_append_at_end() {
        let (s, fs) = session(MemoryFs::builder().writable().build());
        let id = open(&s, "out.txt", RW, FILE_OVERWRITE_IF);
        assert_eq!(write(&s, id, b"abc", Some(0)), Ok(3));
        assert_eq!(write(&s, id, b"def", None), Ok(3));
        assert_eq!(write(&s, id, b"X", Some(1)), Ok(1));
        assert_eq!(fs.contents("out.txt").unwrap(), b"aXcdef");
    }

    #[test]
    fn test_write_invalidates_cached_stat() {
        let (s, _) = session(MemoryFs::builder().file("a", "x").writable().build());
        let id = open(&s, "a", RW, FILE_OPEN);
        assert_eq!(file_information(&s, id).unwrap().nFileSizeLow, 1);

        write(&s, id, b"longer", Some(0)).unwrap();
        assert_eq!(file_information(&s, id).unwrap().nFileSizeLow, 6);
    }

    #[test]
    fn test_file_information_attributes() {
        let (s, _) = session(
            MemoryFs::builder()
                .file("f", vec![0u8; 10])
                .readonly_file("ro", "x")
                .dir("d")
                .build(),
        );
        let f = file_information(&s, open(&s, "f", FILE_READ_DATA, FILE_OPEN)).unwrap();
        assert_eq!(f.dwFileAttributes, FILE_ATTRIBUTE_NORMAL);
        assert_eq!(f.nFileSizeLow, 10);
        assert_eq!(f.nNumberOfLinks, 1);
        assert_eq!(f.dwVolumeSerialNumber, s.options().volume.serial);

        let ro = file_information(&s, open(&s, "ro", FILE_READ_DATA, FILE_OPEN)).unwrap();
        assert_eq!(ro.dwFileAttributes, FILE_ATTRIBUTE_READONLY);

        let d = file_information(&s, open(&s, "d", 0, FILE_OPEN)).unwrap();
        assert_eq!(d.dwFileAttributes, FILE_ATTRIBUTE_DIRECTORY);
        assert_ne!(
            (f.nFileIndexHigh, f.nFileIndexLow),
            (d.nFileIndexHigh, d.nFileIndexLow)
        );
    }

    fn collect(s: &MountSession, id: u64, capacity: usize) -> (Vec<String>, DispatchResult<()>) {
        let mut names = Vec::new();
        let result = find_files(s, id, &mut |data| {
            if names.len() == capacity {
                return true;
            }
            names.push(data.file_name());
            false
        });
        (names, result)
    }

    #[test]
    fn test_find_files_bulk_and_streaming() {
        for streaming in [false, true] {
            let fs = MemoryFs::builder()
                .file("dir/a.txt", "1")
                .file("dir/b.txt", "22")
                .dir("dir/sub")
                .streaming_dirs(streaming)
                .build();
            let (s, _) = session(fs);
            let id = open(&s, "dir", 0, FILE_OPEN);

            let (mut names, result) = collect(&s, id, usize::MAX);
            assert_eq!(result, Ok(()));
            names.sort();
            assert_eq!(names, vec!["a.txt", "b.txt", "sub"], "streaming={}", streaming);
        }
    }

    #[test]
    fn test_find_files_resumes_after_full_buffer() {
        let mut builder = MemoryFs::builder().streaming_dirs(true);
        for i in 0..300 {
            builder = builder.file(&format!("many/f{:03}", i), "");
        }
        let (s, _) = session(builder.build());
        let id = open(&s, "many", 0, FILE_OPEN);

        let (first, result) = collect(&s, id, 100);
        assert_eq!(result, Ok(()));
        assert_eq!(first.len(), 100);

        let (rest, result) = collect(&s, id, usize::MAX);
        assert_eq!(result, Ok(()));
        assert_eq!(first.len() + rest.len(), 300);
        assert!(!rest.contains(&first[99]));

        let (again, _) = collect(&s, id, usize::MAX);
        assert_eq!(again.len(), 300);
    }

    #[test]
    fn test_find_files_missing_handle() {
        let (s, _) = session(MemoryFs::builder().build());
        assert_eq!(collect(&s, 42, 10).1, Err(NtStatus::INVALID_PARAMETER));
    }

    #[test]
    fn test_delete_requires_capability_and_empty_dir() {
        let (s, _) = session(MemoryFs::builder().file("d/x", "").build());
        let id = open(&s, "d", 0, FILE_OPEN);
        assert_eq!(delete_directory(&s, id), Err(NtStatus::NOT_SUPPORTED));
        assert_eq!(cleanup(&s, id, true), Err(NtStatus::NOT_SUPPORTED));

        let (s, fs) = session(MemoryFs::builder().file("d/x", "").writable().build());
        let dir = open(&s, "d", 0, FILE_OPEN);
        assert_eq!(delete_directory(&s, dir), Err(NtStatus::DIRECTORY_NOT_EMPTY));

        let file = open(&s, "d/x", 0, FILE_OPEN);
        assert_eq!(delete_file(&s, file), Ok(()));
        assert_eq!(cleanup(&s, file, true), Ok(()));
        close(&s, file);
        assert!(fs.contents("d/x").is_none());

        assert_eq!(delete_directory(&s, dir), Ok(()));
        assert_eq!(cleanup(&s, dir, true), Ok(()));
        close(&s, dir);
        assert!(s.handles().is_empty());
    }

    #[test]
    fn test_move_file() {
        let (s, fs) = session(MemoryFs::builder().file("a", "1").file("b", "2").writable().build());
        let id = open(&s, "a", FILE_READ_DATA, FILE_OPEN);

        assert_eq!(
            move_file(&s, id, "b".to_string(), false),
            Err(NtStatus::OBJECT_NAME_COLLISION)
        );
        assert_eq!(move_file(&s, id, "c".to_string(), false), Ok(()));
        assert_eq!(handle(&s, id, "test").unwrap().path(), "c");
        assert_eq!(fs.contents("c").unwrap(), b"1");

        let (s, _) = session(MemoryFs::builder().file("a", "1").build());
        let id = open(&s, "a", FILE_READ_DATA, FILE_OPEN);
        assert_eq!(
            move_file(&s, id, "c".to_string(), true),
            Err(NtStatus::NOT_SUPPORTED)
        );
    }

    #[test]
    fn test_set_end_of_file_strategies() {
        // stream resize
        let (s, fs) = session(MemoryFs::builder().file("a", "12345").writable().build());
        let id = open(&s, "a", RW, FILE_OPEN);
        assert_eq!(set_end_of_file(&s, id, 2), Ok(()));
        assert_eq!(fs.contents("a").unwrap(), b"12");

        // path truncate when the stream cannot resize
        let caps = Capabilities {
            truncate: true,
            ..Capabilities::default()
        };
        let (s, fs) = session(MemoryFs::builder().file("a", "12345").capabilities(caps).build());
        let id = open(&s, "a", FILE_READ_DATA, FILE_OPEN);
        assert_eq!(set_end_of_file(&s, id, 1), Ok(()));
        assert_eq!(fs.contents("a").unwrap(), b"1");

        // neither
        let (s, _) = session(MemoryFs::builder().file("a", "12345").build());
        let id = open(&s, "a", FILE_READ_DATA, FILE_OPEN);
        assert_eq!(set_end_of_file(&s, id, 1), Err(NtStatus::NOT_SUPPORTED));
    }

    #[test]
    fn test_write_protect() {
        let (s, _) = session_with(
            MemoryFs::builder().file("a", "x").writable().build(),
            MountOptions::default().with_write_protect(true),
        );
        assert_eq!(
            create(&s, "a".to_string(), RW, FILE_OPEN, 0),
            Err(NtStatus::ACCESS_DENIED)
        );
        assert_eq!(
            create(&s, "d".to_string(), 0, FILE_OPEN_IF, FILE_DIRECTORY_FILE),
            Err(NtStatus::NOT_SUPPORTED)
        );
        let info = volume_information(&s);
        assert_ne!(info.filesystem_flags & FILE_READ_ONLY_VOLUME, 0);
    }

    #[test]
    fn test_disk_free_space() {
        let (s, _) = session(MemoryFs::builder().build());
        let space = disk_free_space(&s).unwrap();
        assert_eq!(space.total, s.options().capacity.total_bytes);

        let options = MountOptions::default().with_capacity_mode(CapacityMode::Backend);
        let (s, _) = session_with(MemoryFs::builder().build(), options.clone());
        assert_eq!(disk_free_space(&s), Err(NtStatus::NOT_SUPPORTED));

        let (s, _) = session_with(
            MemoryFs::builder().file("a", vec![0u8; 100]).capacity(1000).build(),
            options,
        );
        let space = disk_free_space(&s).unwrap();
        assert_eq!(space.total, 1000);
        assert_eq!(space.available, 900);
    }

    #[test]
    fn test_close_unknown_handle_is_harmless() {
        let (s, _) = session(MemoryFs::builder().build());
        close(&s, 999);
        assert!(s.handles().is_empty());
    }
}
