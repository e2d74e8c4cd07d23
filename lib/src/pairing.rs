use std::mem;

use crate::records::{RecordBuffer, RecordKind};
use crate::{Error, EventMask, WatchEvent};

/// Result of dispatching one raw record
#[derive(Debug)]
pub(crate) enum Step {
    /// A qualifying event was assembled
    Complete(WatchEvent),
    /// A rename was assembled but its partner never arrived in this fill
    Incomplete(WatchEvent),
    /// Record consumed, keep scanning
    Pending,
}

/// Reassembles two part rename notifications into single events
///
/// Renames arrive as separate old name and new name records, in either
/// order and possibly separated by unrelated records. Whichever half
/// arrives is written to its slot, pairing succeeds the instant both
/// slots are populated. Slots persist across poll calls. The old slot
/// doubles as name staging for non rename events, so a latent old half
/// is overwritten by the next unrelated event.
#[derive(Debug)]
pub(crate) struct RenamePairing {
    mask: EventMask,
    old_name: String,
    new_name: String,
}

impl RenamePairing {
    pub(crate) fn new(mask: EventMask) -> Self {
        RenamePairing {
            mask,
            old_name: String::new(),
            new_name: String::new(),
        }
    }

    pub(crate) fn mask(&self) -> EventMask {
        self.mask
    }

    /// Consume the current record and decide whether it finishes an event
    pub(crate) fn dispatch(
        &mut self,
        kind: RecordKind,
        records: &mut dyn RecordBuffer,
    ) -> Result<Step, Error> {
        match kind {
            RecordKind::Created => self.single(EventMask::CREATE, records),
            RecordKind::Removed => self.single(EventMask::DELETE, records),
            RecordKind::Modified => self.single(EventMask::MODIFY, records),
            RecordKind::RenamedOld => self.rename_half(false, records),
            RecordKind::RenamedNew => self.rename_half(true, records),
            RecordKind::Other => {
                records.consume_next(None)?;
                Ok(Step::Pending)
            }
        }
    }

    /// One record, one complete event
    fn single(&mut self, kind: EventMask, records: &mut dyn RecordBuffer) -> Result<Step, Error> {
        if !self.mask.contains(kind) {
            records.consume_next(None)?;
            return Ok(Step::Pending);
        }
        records.consume_next(Some(&mut self.old_name))?;
        Ok(Step::Complete(WatchEvent {
            kind,
            name: mem::take(&mut self.old_name),
            new_name: None,
        }))
    }

    fn rename_half(
        &mut self,
        is_new: bool,
        records: &mut dyn RecordBuffer,
    ) -> Result<Step, Error> {
        if !self.mask.contains(EventMask::RENAME) {
            records.consume_next(None)?;
            return Ok(Step::Pending);
        }

        let slot = if is_new {
            &mut self.new_name
        } else {
            &mut self.old_name
        };
        records.consume_next(Some(slot))?;

        if !self.old_name.is_empty() && !self.new_name.is_empty() {
            // partner already waiting, order of halves does not matter
            return Ok(Step::Complete(self.take_rename()));
        }
        if records.is_empty() {
            // source ran dry before the partner arrived
            return Ok(Step::Incomplete(self.take_rename()));
        }
        Ok(Step::Pending)
    }

    fn take_rename(&mut self) -> WatchEvent {
        let new_name = mem::take(&mut self.new_name);
        WatchEvent {
            kind: EventMask::RENAME,
            name: mem::take(&mut self.old_name),
            new_name: (!new_name.is_empty()).then_some(new_name),
        }
    }
}
