//! Mutex-guarded ring buffer holding idle connections

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Free-list of idle entries.
///
/// `push` and `pop` work on the same end of the ring, so the most recently
/// returned entry is handed out first. The lock is only held for the O(1)
/// list mutation.
pub(crate) struct Ring<T> {
    entries: Mutex<VecDeque<T>>,
}

impl<T> Ring<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, entry: T) {
        self.entries.lock().push_back(entry);
    }

    pub fn pop(&self) -> Option<T> {
        self.entries.lock().pop_back()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every entry out of the ring
    pub fn drain(&self) -> Vec<T> {
        self.entries.lock().drain(..).collect()
    }
}

impl<T> Default for Ring<T> {
    fn default() -> Self {
        Self::new()
    }
}
