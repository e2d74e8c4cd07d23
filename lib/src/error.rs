use thiserror::Error as ThisError;

/// Portable error kinds reported by a watcher
///
/// `IncompleteEvent` is special: it accompanies a successful rename
/// result whose partner record never arrived, so it is observable only
/// through the last error accessor of the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum Error {
    #[error("an unknown error occurred")]
    Unknown,
    #[error("an invalid argument was provided")]
    InvalidArgument,
    #[error("path not found")]
    PathNotFound,
    #[error("path is too long")]
    PathTooLong,
    #[error("a platform limit has been reached")]
    PlatformLimit,
    #[error("access to file or directory has been denied")]
    AccessDenied,
    #[error("watcher is in a bad state")]
    BadState,
    #[error("no event was available")]
    NoEvent,
    #[error("rename event is missing its pair")]
    IncompleteEvent,
    #[error("platform io error")]
    IoError,
}
