use std::ffi::c_void;
use std::fmt;
use std::path::Path;

use widestring::{U16CString, U16String};
use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_ACCESS_DENIED, ERROR_FILENAME_EXCED_RANGE,
    ERROR_FILE_NOT_FOUND, ERROR_INVALID_PARAMETER, ERROR_NOT_ENOUGH_MEMORY, ERROR_PATH_NOT_FOUND,
    ERROR_SHARING_VIOLATION, ERROR_TOO_MANY_OPEN_FILES, HANDLE, INVALID_HANDLE_VALUE,
    WAIT_ABANDONED, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::Storage::FileSystem;
use windows_sys::Win32::Storage::FileSystem::{
    ReadDirectoryChangesW, FILE_ACTION_ADDED, FILE_ACTION_MODIFIED, FILE_ACTION_REMOVED,
    FILE_ACTION_RENAMED_NEW_NAME, FILE_ACTION_RENAMED_OLD_NAME, FILE_FLAG_BACKUP_SEMANTICS,
    FILE_FLAG_OVERLAPPED, FILE_LIST_DIRECTORY, FILE_NOTIFY_CHANGE_DIR_NAME,
    FILE_NOTIFY_CHANGE_FILE_NAME, FILE_NOTIFY_CHANGE_LAST_WRITE, FILE_SHARE_DELETE,
    FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows_sys::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};
use windows_sys::Win32::System::IO::{GetOverlappedResult, OVERLAPPED};

use crate::records::{RecordBuffer, RecordKind};
use crate::{Error, EventMask};

/// MAX_PATH, reported names are truncated to this many UTF-16 units
pub const NAME_MAX: usize = 260;

// in dwords, records in the buffer are always dword aligned
const BUFFER_LEN: usize = 16 * 1024;

/// Driver filled queue of FILE_NOTIFY_INFORMATION records
///
/// The buffer is filled by one overlapped ReadDirectoryChangesW request
/// whose completion is waited on. Records form a linked list through the
/// next entry offset field, a zero offset marks the last record of the
/// fill. Every requested kind of change is delivered here; filtering to
/// the watch mask happens at classification.
pub(crate) struct QueueBuffer {
    dir_handle: HANDLE,
    overlapped: OVERLAPPED,
    buffer: Vec<u32>,
    /// Valid bytes from the last fill, zero when the fill is exhausted
    len: usize,
    /// Byte offset of the current record
    pos: usize,
}

pub(crate) fn open(path: &Path, _mask: EventMask) -> Result<QueueBuffer, Error> {
    let path = U16CString::from_os_str(path.as_os_str()).map_err(|_| Error::InvalidArgument)?;

    let dir_handle = unsafe {
        FileSystem::CreateFileW(
            path.as_ptr(),
            FILE_LIST_DIRECTORY,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            std::ptr::null(),
            OPEN_EXISTING,
            FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OVERLAPPED,
            0,
        )
    };
    if dir_handle == INVALID_HANDLE_VALUE {
        return Err(translate_last_error());
    }

    let mut overlapped: OVERLAPPED = unsafe { std::mem::zeroed() };
    overlapped.hEvent = unsafe { CreateEventW(std::ptr::null(), 0, 0, std::ptr::null()) };
    if overlapped.hEvent == 0 {
        let error = translate_last_error();
        // SAFETY: handle is valid
        unsafe { CloseHandle(dir_handle) };
        return Err(error);
    }

    Ok(QueueBuffer {
        dir_handle,
        overlapped,
        buffer: vec![0; BUFFER_LEN],
        len: 0,
        pos: 0,
    })
}

fn classify(action: u32) -> RecordKind {
    match action {
        FILE_ACTION_ADDED => RecordKind::Created,
        FILE_ACTION_REMOVED => RecordKind::Removed,
        FILE_ACTION_MODIFIED => RecordKind::Modified,
        FILE_ACTION_RENAMED_OLD_NAME => RecordKind::RenamedOld,
        FILE_ACTION_RENAMED_NEW_NAME => RecordKind::RenamedNew,
        _ => RecordKind::Other,
    }
}

impl QueueBuffer {
    /// Parse the record header at the current offset
    ///
    /// Records are FILE_NOTIFY_INFORMATION: the first dword holds the
    /// byte offset of the next record, the second the action code, the
    /// third the name length in bytes, then the UTF-16 name without a
    /// terminating NUL. Returns the action, the name length and the next
    /// offset. Any length or offset pointing outside the valid bytes
    /// fails closed instead of walking further.
    fn header(&self) -> Result<(u32, usize, usize), Error> {
        if self.len == 0 {
            return Err(Error::BadState);
        }
        if self.pos % 4 != 0 || self.pos + 12 > self.len {
            return Err(Error::BadState);
        }
        let dword = self.pos / 4;
        let next = self.buffer[dword] as usize;
        let action = self.buffer[dword + 1];
        let name_len = self.buffer[dword + 2] as usize;
        if self.pos + 12 + name_len > self.len {
            return Err(Error::BadState);
        }
        if next != 0 && (next % 4 != 0 || self.pos + next + 12 > self.len) {
            return Err(Error::BadState);
        }
        Ok((action, name_len, next))
    }
}

impl RecordBuffer for QueueBuffer {
    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn fill(&mut self) -> Result<(), Error> {
        if self.len != 0 {
            return Err(Error::BadState);
        }

        let status = unsafe {
            ReadDirectoryChangesW(
                self.dir_handle,
                self.buffer.as_mut_ptr() as *mut c_void,
                (self.buffer.len() * 4) as u32,
                0,
                FILE_NOTIFY_CHANGE_FILE_NAME
                    | FILE_NOTIFY_CHANGE_DIR_NAME
                    | FILE_NOTIFY_CHANGE_LAST_WRITE,
                std::ptr::null_mut(),
                &mut self.overlapped,
                None,
            )
        };
        if status == 0 {
            return Err(translate_last_error());
        }

        let wait = unsafe { WaitForSingleObject(self.overlapped.hEvent, INFINITE) };
        if wait != WAIT_OBJECT_0 {
            return Err(match wait {
                WAIT_ABANDONED | WAIT_TIMEOUT => Error::NoEvent,
                _ => Error::Unknown,
            });
        }

        let mut transferred = 0u32;
        let ok =
            unsafe { GetOverlappedResult(self.dir_handle, &self.overlapped, &mut transferred, 0) };
        if ok == 0 {
            return Err(translate_last_error());
        }

        self.len = transferred as usize;
        self.pos = 0;
        Ok(())
    }

    fn decode_next(&self) -> Result<RecordKind, Error> {
        let (action, _, _) = self.header()?;
        Ok(classify(action))
    }

    fn consume_next(&mut self, dest: Option<&mut String>) -> Result<(), Error> {
        let (_, name_len, next) = self.header()?;

        if let Some(dest) = dest {
            let name_pos = self.pos / 4 + 3;
            // name length is in bytes, divide by 2 to get UTF-16 units
            let units = (name_len / 2).min(NAME_MAX);
            let name = unsafe {
                U16String::from_ptr(self.buffer[name_pos..].as_ptr() as *const u16, units)
            };
            dest.clear();
            dest.push_str(&name.to_string_lossy());
        }

        if next == 0 {
            self.len = 0;
            self.pos = 0;
        } else {
            self.pos += next;
        }
        Ok(())
    }
}

impl Drop for QueueBuffer {
    fn drop(&mut self) {
        // SAFETY: both handles stay valid until drop,
        // closing the directory handle also aborts a pending request
        unsafe {
            CloseHandle(self.overlapped.hEvent);
            CloseHandle(self.dir_handle);
        }
    }
}

impl fmt::Debug for QueueBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueBuffer")
            .field("len", &self.len)
            .field("pos", &self.pos)
            .finish()
    }
}

fn translate_last_error() -> Error {
    match unsafe { GetLastError() } {
        ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND => Error::PathNotFound,
        ERROR_ACCESS_DENIED | ERROR_SHARING_VIOLATION => Error::AccessDenied,
        ERROR_INVALID_PARAMETER => Error::InvalidArgument,
        ERROR_FILENAME_EXCED_RANGE => Error::PathTooLong,
        ERROR_TOO_MANY_OPEN_FILES | ERROR_NOT_ENOUGH_MEMORY => Error::PlatformLimit,
        _ => Error::Unknown,
    }
}
