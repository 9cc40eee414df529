//! Undo journals.
//!
//! ## Design
//!
//! Every stateful component (ledger, custodian, pool store, ownership, fee
//! schedule) records the previous value of each slot it overwrites. A
//! checkpoint is just the journal length at some instant; rolling back pops
//! entries newer than the mark and restores them in reverse order.
//!
//! Cost is proportional to what an operation touched, never to the size of
//! the state:
//!
//! ```text
//! checkpoint  O(1)
//! record      O(1) per overwritten slot
//! rollback    O(entries since the mark)
//! commit      O(entries) (clears the log)
//! ```
//!
//! Journals are only cleared when the outermost operation commits, so a
//! nested checkpoint can still be undone by a failure further out.

/// Append-only log of undo entries for one component.
#[derive(Debug, Clone)]
pub struct Journal<U> {
    entries: Vec<U>,
}

impl<U> Default for Journal<U> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<U> Journal<U> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&mut self, undo: U) {
        self.entries.push(undo);
    }

    /// Current position; pass it to [`Journal::unwind`] to undo everything
    /// recorded after this point.
    #[inline]
    pub fn mark(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and yield the entries recorded since `mark`, newest first.
    pub fn unwind(&mut self, mark: usize) -> impl Iterator<Item = U> + '_ {
        let mark = mark.min(self.entries.len());
        self.entries.drain(mark..).rev()
    }

    /// Forget all entries; the current state becomes permanent.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwind_yields_newest_first() {
        let mut journal = Journal::new();
        journal.record(1);
        let mark = journal.mark();
        journal.record(2);
        journal.record(3);

        let undone: Vec<_> = journal.unwind(mark).collect();
        assert_eq!(undone, vec![3, 2]);
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn test_unwind_past_end_is_empty() {
        let mut journal: Journal<u8> = Journal::new();
        journal.record(7);
        assert_eq!(journal.unwind(5).count(), 0);
        assert_eq!(journal.len(), 1);

        journal.clear();
        assert!(journal.is_empty());
    }
}
