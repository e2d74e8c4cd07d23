#![warn(rust_2018_idioms, missing_debug_implementations)]

pub use error::Error;
pub use event::{EventMask, WatchEvent};
pub use records::NAME_MAX;
pub use watcher::DirWatcher;

mod error;
mod event;
mod pairing;
mod records;
mod watcher;
