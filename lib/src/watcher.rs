use std::path::Path;

use crate::pairing::{RenamePairing, Step};
use crate::records::{self, RecordBuffer};
use crate::{Error, EventMask, WatchEvent};

/// Watches one directory for file changes
///
/// Changes are delivered by [`DirWatcher::watch`], which blocks until
/// something matching the requested mask happens inside the directory.
/// The native watch is released when the watcher is dropped.
#[derive(Debug)]
pub struct DirWatcher {
    records: records::NativeBuffer,
    pairing: RenamePairing,
    error: Option<Error>,
}

impl DirWatcher {
    /// Open a watch on one directory for the event kinds in `mask`
    pub fn open<P: AsRef<Path>>(path: P, mask: EventMask) -> Result<Self, Error> {
        let records = records::open(path.as_ref(), mask)?;
        Ok(DirWatcher {
            records,
            pairing: RenamePairing::new(mask),
            error: None,
        })
    }

    /// Block until the next qualifying event is assembled
    ///
    /// A rename whose partner record never arrived is still returned as
    /// a success with one of its names missing; [`DirWatcher::last_error`]
    /// reports [`Error::IncompleteEvent`] for it, so callers interested
    /// in complete rename pairs must check it even after a successful
    /// call.
    pub fn watch(&mut self) -> Result<WatchEvent, Error> {
        self.error = None;
        match poll(&mut self.records, &mut self.pairing) {
            Ok((event, incomplete)) => {
                if incomplete {
                    self.error = Some(Error::IncompleteEvent);
                }
                Ok(event)
            }
            Err(error) => {
                self.error = Some(error);
                Err(error)
            }
        }
    }

    /// Last error recorded on this watcher, kept until the next call
    pub fn last_error(&self) -> Option<Error> {
        self.error
    }

    /// Open a watch, wait for a single event and release the watch
    pub fn once<P: AsRef<Path>>(path: P, mask: EventMask) -> Result<WatchEvent, Error> {
        let mut watcher = DirWatcher::open(path, mask)?;
        watcher.watch()
    }
}

/// Poll loop shared by the session and its tests
///
/// Returns the assembled event and whether it is an incomplete rename.
/// The fill call is the only place that blocks.
fn poll(
    records: &mut dyn RecordBuffer,
    pairing: &mut RenamePairing,
) -> Result<(WatchEvent, bool), Error> {
    if pairing.mask().is_empty() {
        return Err(Error::NoEvent);
    }

    loop {
        if records.is_empty() {
            records.fill()?;
        }
        let kind = records.decode_next()?;
        match pairing.dispatch(kind, records)? {
            Step::Complete(event) => return Ok((event, false)),
            Step::Incomplete(event) => return Ok((event, true)),
            Step::Pending => {}
        }
    }
}
