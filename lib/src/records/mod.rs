#[cfg(target_os = "linux")]
pub(crate) use linux::open;
#[cfg(target_os = "linux")]
pub use linux::NAME_MAX;
#[cfg(target_os = "linux")]
pub(crate) use linux::StreamBuffer as NativeBuffer;
#[cfg(windows)]
pub(crate) use windows::open;
#[cfg(windows)]
pub use windows::NAME_MAX;
#[cfg(windows)]
pub(crate) use windows::QueueBuffer as NativeBuffer;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(windows)]
mod windows;

#[cfg(not(any(target_os = "linux", windows)))]
compile_error!("platform not supported");

use crate::Error;

/// Portable classification of one native change record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordKind {
    Created,
    Removed,
    Modified,
    RenamedOld,
    RenamedNew,
    /// Native action with no portable counterpart
    Other,
}

/// Fixed buffer of native change records
///
/// Both backends fill a fixed buffer with variable length records but
/// advance differently: the stream backend compacts consumed bytes away,
/// the queue backend follows each record's next entry offset. Everything
/// outside this trait is backend agnostic.
pub(crate) trait RecordBuffer {
    /// Returns `true` if no undecoded records remain from the last fill
    fn is_empty(&self) -> bool;

    /// Block on the native source until at least one record is buffered
    ///
    /// Must be called only when the buffer is empty.
    fn fill(&mut self) -> Result<(), Error>;

    /// Classify the record at the current position without consuming it
    fn decode_next(&self) -> Result<RecordKind, Error>;

    /// Advance past the current record, copying its name into `dest`
    fn consume_next(&mut self, dest: Option<&mut String>) -> Result<(), Error>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;

    use super::{RecordBuffer, RecordKind};
    use crate::Error;

    /// Scripted in-memory buffer: a queue of fills, each a list of records
    pub(crate) struct ScriptedBuffer {
        fills: VecDeque<VecDeque<(RecordKind, String)>>,
        current: VecDeque<(RecordKind, String)>,
        pub(crate) fill_count: usize,
    }

    impl ScriptedBuffer {
        pub(crate) fn new(fills: Vec<Vec<(RecordKind, &str)>>) -> Self {
            ScriptedBuffer {
                fills: fills
                    .into_iter()
                    .map(|fill| {
                        fill.into_iter()
                            .map(|(kind, name)| (kind, name.to_string()))
                            .collect()
                    })
                    .collect(),
                current: VecDeque::new(),
                fill_count: 0,
            }
        }
    }

    impl RecordBuffer for ScriptedBuffer {
        fn is_empty(&self) -> bool {
            self.current.is_empty()
        }

        fn fill(&mut self) -> Result<(), Error> {
            if !self.current.is_empty() {
                return Err(Error::BadState);
            }
            self.fill_count += 1;
            // an exhausted script behaves like a source that ran dry
            self.current = self.fills.pop_front().ok_or(Error::NoEvent)?;
            Ok(())
        }

        fn decode_next(&self) -> Result<RecordKind, Error> {
            self.current
                .front()
                .map(|(kind, _)| *kind)
                .ok_or(Error::BadState)
        }

        fn consume_next(&mut self, dest: Option<&mut String>) -> Result<(), Error> {
            let (_, name) = self.current.pop_front().ok_or(Error::BadState)?;
            if let Some(dest) = dest {
                dest.clear();
                dest.push_str(&name);
            }
            Ok(())
        }
    }
}
