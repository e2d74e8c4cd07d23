use std::fmt;
use std::mem;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use inotify::{EventMask as RecordMask, Inotify, WatchDescriptor, WatchMask};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::libc;

use crate::records::{RecordBuffer, RecordKind};
use crate::{Error, EventMask};

/// NAME_MAX from linux/limits.h, reported names are truncated to this length
pub const NAME_MAX: usize = 255;

const BUFFER_LEN: usize = 64 * 1024;

/// Fixed part of every record: i32 wd, u32 mask, u32 cookie, u32 len
const HEADER_LEN: usize = mem::size_of::<libc::inotify_event>();

/// Kernel byte stream of inotify records
///
/// One blocking read returns one or more complete records, never a
/// partial one. Records are decoded at the buffer front and compacted
/// away once consumed, `len` counts the bytes that are still valid.
pub(crate) struct StreamBuffer {
    inotify: Inotify,
    wd: WatchDescriptor,
    buffer: Vec<u8>,
    len: usize,
}

pub(crate) fn open(path: &Path, mask: EventMask) -> Result<StreamBuffer, Error> {
    let mut inotify = Inotify::init().map_err(translate_init_error)?;

    // the descriptor comes back non blocking, the fill contract is a blocking read
    fcntl(inotify.as_raw_fd(), FcntlArg::F_SETFL(OFlag::empty())).map_err(|_| Error::Unknown)?;

    let wd = inotify
        .add_watch(path, watch_mask(mask))
        .map_err(translate_watch_error)?;

    Ok(StreamBuffer {
        inotify,
        wd,
        buffer: vec![0; BUFFER_LEN],
        len: 0,
    })
}

/// Translate the portable mask to the native watch mask
///
/// Rename subscribes to both halves of the native move pair.
fn watch_mask(mask: EventMask) -> WatchMask {
    let mut native = WatchMask::empty();
    if mask.contains(EventMask::CREATE) {
        native |= WatchMask::CREATE;
    }
    if mask.contains(EventMask::DELETE) {
        native |= WatchMask::DELETE;
    }
    if mask.contains(EventMask::MODIFY) {
        native |= WatchMask::MODIFY;
    }
    if mask.contains(EventMask::RENAME) {
        native |= WatchMask::MOVE;
    }
    native
}

fn classify(mask: RecordMask) -> RecordKind {
    if mask.contains(RecordMask::CREATE) {
        RecordKind::Created
    } else if mask.contains(RecordMask::DELETE) {
        RecordKind::Removed
    } else if mask.contains(RecordMask::MODIFY) {
        RecordKind::Modified
    } else if mask.contains(RecordMask::MOVED_FROM) {
        RecordKind::RenamedOld
    } else if mask.contains(RecordMask::MOVED_TO) {
        RecordKind::RenamedNew
    } else {
        RecordKind::Other
    }
}

impl StreamBuffer {
    /// Parse the record header at the buffer front
    ///
    /// Returns the native mask and the length of the name bytes that
    /// follow the header. A header or name that does not fit into the
    /// valid bytes means the buffer no longer frames records correctly,
    /// that fails closed instead of reading further.
    fn header(&self) -> Result<(RecordMask, usize), Error> {
        if self.len < HEADER_LEN {
            return Err(Error::BadState);
        }
        let mask = u32::from_ne_bytes(self.buffer[4..8].try_into().unwrap());
        let name_len = u32::from_ne_bytes(self.buffer[12..16].try_into().unwrap()) as usize;
        if HEADER_LEN + name_len > self.len {
            return Err(Error::BadState);
        }
        Ok((RecordMask::from_bits_truncate(mask), name_len))
    }
}

impl RecordBuffer for StreamBuffer {
    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn fill(&mut self) -> Result<(), Error> {
        if self.len != 0 {
            return Err(Error::BadState);
        }
        let fd = self.inotify.as_raw_fd();
        self.len = nix::unistd::read(fd, &mut self.buffer).map_err(translate_read_error)?;
        Ok(())
    }

    fn decode_next(&self) -> Result<RecordKind, Error> {
        let (mask, _) = self.header()?;
        Ok(classify(mask))
    }

    fn consume_next(&mut self, dest: Option<&mut String>) -> Result<(), Error> {
        let (_, name_len) = self.header()?;

        if let Some(dest) = dest {
            let name = &self.buffer[HEADER_LEN..HEADER_LEN + name_len];
            // name bytes are padded with NULs up to name_len
            let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
            dest.clear();
            dest.push_str(&String::from_utf8_lossy(&name[..end.min(NAME_MAX)]));
        }

        let record_len = HEADER_LEN + name_len;
        self.buffer.copy_within(record_len..self.len, 0);
        self.len -= record_len;
        Ok(())
    }
}

impl Drop for StreamBuffer {
    fn drop(&mut self) {
        // descriptor itself is closed when inotify is dropped
        let _ = self.inotify.rm_watch(self.wd.clone());
    }
}

impl fmt::Debug for StreamBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBuffer")
            .field("len", &self.len)
            .finish()
    }
}

fn translate_init_error(err: std::io::Error) -> Error {
    match err.raw_os_error() {
        Some(libc::EINVAL) => Error::InvalidArgument,
        Some(libc::ENOMEM) | Some(libc::EMFILE) => Error::PlatformLimit,
        _ => Error::Unknown,
    }
}

fn translate_watch_error(err: std::io::Error) -> Error {
    match err.raw_os_error() {
        Some(libc::EACCES) => Error::AccessDenied,
        Some(libc::EFAULT) | Some(libc::ENOENT) => Error::PathNotFound,
        Some(libc::ENAMETOOLONG) => Error::PathTooLong,
        Some(libc::EINVAL) | Some(libc::ENOTDIR) => Error::InvalidArgument,
        Some(libc::ENOMEM) | Some(libc::EMFILE) | Some(libc::ENOSPC) => Error::PlatformLimit,
        _ => Error::Unknown,
    }
}

fn translate_read_error(err: Errno) -> Error {
    match err {
        Errno::EAGAIN | Errno::EINTR => Error::NoEvent,
        Errno::EACCES => Error::AccessDenied,
        Errno::EFAULT | Errno::EINVAL => Error::BadState,
        Errno::EIO => Error::IoError,
        _ => Error::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> StreamBuffer {
        let dir = tempfile::tempdir().unwrap();
        open(dir.path(), EventMask::all()).unwrap()
    }

    /// Append one raw record to the buffer, padding the name like the kernel does
    fn put_record(stream: &mut StreamBuffer, mask: RecordMask, name: &[u8]) {
        let name_len = if name.is_empty() {
            0
        } else {
            // kernel pads the name with at least one NUL
            (name.len() + 4) / 4 * 4
        };
        let record = &mut stream.buffer[stream.len..];
        record[0..4].copy_from_slice(&1i32.to_ne_bytes());
        record[4..8].copy_from_slice(&mask.bits().to_ne_bytes());
        record[8..12].copy_from_slice(&0u32.to_ne_bytes());
        record[12..16].copy_from_slice(&(name_len as u32).to_ne_bytes());
        record[HEADER_LEN..HEADER_LEN + name.len()].copy_from_slice(name);
        for byte in &mut record[HEADER_LEN + name.len()..HEADER_LEN + name_len] {
            *byte = 0;
        }
        stream.len += HEADER_LEN + name_len;
    }

    #[test]
    fn decode_on_empty_buffer_is_bad_state() {
        let stream = stream();
        assert!(stream.is_empty());
        assert_eq!(stream.decode_next(), Err(Error::BadState));
    }

    #[test]
    fn truncated_header_fails_closed() {
        let mut stream = stream();
        stream.len = HEADER_LEN - 2;
        assert_eq!(stream.decode_next(), Err(Error::BadState));
    }

    #[test]
    fn name_running_past_buffer_fails_closed() {
        let mut stream = stream();
        put_record(&mut stream, RecordMask::CREATE, b"a.txt");
        // corrupt the name length so it points past the valid bytes
        stream.buffer[12..16].copy_from_slice(&1024u32.to_ne_bytes());
        assert_eq!(stream.decode_next(), Err(Error::BadState));
        assert_eq!(stream.consume_next(None), Err(Error::BadState));
    }

    #[test]
    fn consume_compacts_records_to_front() {
        let mut stream = stream();
        put_record(&mut stream, RecordMask::CREATE, b"a.txt");
        put_record(&mut stream, RecordMask::DELETE, b"bb.txt");

        let mut name = String::new();
        assert_eq!(stream.decode_next(), Ok(RecordKind::Created));
        stream.consume_next(Some(&mut name)).unwrap();
        assert_eq!(name, "a.txt");

        assert_eq!(stream.decode_next(), Ok(RecordKind::Removed));
        stream.consume_next(Some(&mut name)).unwrap();
        assert_eq!(name, "bb.txt");

        assert!(stream.is_empty());
    }

    #[test]
    fn consume_without_destination_discards_name() {
        let mut stream = stream();
        put_record(&mut stream, RecordMask::MOVED_FROM, b"x");
        stream.consume_next(None).unwrap();
        assert!(stream.is_empty());
    }

    #[test]
    fn name_is_truncated_at_name_max() {
        let mut stream = stream();
        let long = vec![b'a'; NAME_MAX + 40];
        put_record(&mut stream, RecordMask::CREATE, &long);

        let mut name = String::new();
        stream.consume_next(Some(&mut name)).unwrap();
        assert_eq!(name.len(), NAME_MAX);
    }

    #[test]
    fn move_halves_classify_as_rename_halves() {
        let mut stream = stream();
        put_record(&mut stream, RecordMask::MOVED_FROM, b"x");
        assert_eq!(stream.decode_next(), Ok(RecordKind::RenamedOld));
        stream.consume_next(None).unwrap();

        put_record(&mut stream, RecordMask::MOVED_TO, b"y");
        assert_eq!(stream.decode_next(), Ok(RecordKind::RenamedNew));
    }

    #[test]
    fn unmapped_mask_classifies_as_other() {
        let mut stream = stream();
        put_record(&mut stream, RecordMask::IGNORED, b"");
        assert_eq!(stream.decode_next(), Ok(RecordKind::Other));
        stream.consume_next(None).unwrap();
        assert!(stream.is_empty());
    }

    #[test]
    fn fill_on_non_empty_buffer_is_bad_state() {
        let mut stream = stream();
        put_record(&mut stream, RecordMask::CREATE, b"a");
        assert_eq!(stream.fill(), Err(Error::BadState));
    }
}
