use bitflags::bitflags;

bitflags! {
    /// Set of event kinds a watcher can report
    pub struct EventMask: u32 {
        const CREATE = 1 << 0;
        const DELETE = 1 << 1;
        const MODIFY = 1 << 2;
        const RENAME = 1 << 3;
    }
}

/// Single change observed in the watched directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Kind of the observed event, a single bit of the watch mask
    pub kind: EventMask,

    /// Name of the affected file, the old name for renames
    pub name: String,

    /// New name of a renamed file
    ///
    /// Present only for renames and absent even there when the new name
    /// half of the rename was never observed.
    pub new_name: Option<String>,
}
