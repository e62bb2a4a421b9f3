//! Ingest Buffer
//!
//! Holds accepted records until the next flush writes them to a segment.
//!
//! ## Queues
//! ```text
//!              flushing == false          flushing == true
//! submit ──▶  primary queue              shadow queue
//!
//! begin_flush:  primary ──▶ in-flight snapshot, flushing = true
//! commit:       shadow  ──▶ primary, flushing = false
//! abort (drop): snapshot ++ shadow ──▶ primary, flushing = false
//! ```
//! `submit` never waits on a flush: it takes a short lock and pushes onto
//! whichever queue is open. A failed flush puts its snapshot back at the
//! front so nothing is lost or written twice.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::record::Record;

/// Which queue a submission landed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Primary,
    Shadow,
}

#[derive(Default)]
struct BufferState {
    primary: Vec<Record>,
    shadow: Vec<Record>,
    /// Records taken by the running flush, still visible to lookups
    in_flight: Option<Arc<Vec<Record>>>,
    flushing: bool,
}

/// Primary/shadow write buffer with a single-flush gate
#[derive(Default)]
pub struct IngestBuffer {
    state: Mutex<BufferState>,
}

impl IngestBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a record; O(1), never blocked by a running flush
    pub fn submit(&self, record: Record) -> QueueKind {
        let mut state = self.state.lock();
        if state.flushing {
            state.shadow.push(record);
            QueueKind::Shadow
        } else {
            state.primary.push(record);
            QueueKind::Primary
        }
    }

    /// Start a flush
    ///
    /// Returns `None` when another flush is already in flight. Otherwise the
    /// primary queue is moved into the returned guard; dropping the guard
    /// without `commit` restores it.
    pub fn begin_flush(&self) -> Option<FlushGuard<'_>> {
        let mut state = self.state.lock();
        if state.flushing {
            return None;
        }

        let snapshot = Arc::new(std::mem::take(&mut state.primary));
        state.in_flight = Some(Arc::clone(&snapshot));
        state.flushing = true;

        Some(FlushGuard {
            buffer: self,
            snapshot,
            committed: false,
        })
    }

    pub fn is_flushing(&self) -> bool {
        self.state.lock().flushing
    }

    /// Newest buffered record for `key` that is not on disk yet
    pub fn find_pending(&self, key: &str) -> Option<Record> {
        let state = self.state.lock();

        let in_flight = state.in_flight.as_deref().map(|v| v.as_slice()).unwrap_or(&[]);
        state
            .shadow
            .iter()
            .rev()
            .chain(in_flight.iter().rev())
            .chain(state.primary.iter().rev())
            .find(|r| r.key == key)
            .cloned()
    }

    /// (primary, shadow) queue lengths
    pub fn pending_len(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.primary.len(), state.shadow.len())
    }

    fn finish(&self, snapshot: &Arc<Vec<Record>>, committed: bool) {
        let mut state = self.state.lock();
        let shadow = std::mem::take(&mut state.shadow);

        if committed {
            state.primary = shadow;
        } else {
            let mut restored = Vec::with_capacity(snapshot.len() + shadow.len());
            restored.extend(snapshot.iter().cloned());
            restored.extend(shadow);
            state.primary = restored;
        }

        state.in_flight = None;
        state.flushing = false;
    }
}

/// Exclusive right to flush; releases the gate when dropped
pub struct FlushGuard<'a> {
    buffer: &'a IngestBuffer,
    snapshot: Arc<Vec<Record>>,
    committed: bool,
}

impl FlushGuard<'_> {
    /// Records to write, in submission order
    pub fn records(&self) -> &[Record] {
        &self.snapshot
    }

    /// Mark the snapshot as durable; the shadow queue becomes primary
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.buffer.finish(&self.snapshot, self.committed);
    }
}
