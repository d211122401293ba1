use std::collections::VecDeque;

/// Linear undo/redo stacks.
///
/// The front of each deque is the most recent entry. A `max_depth` of zero
/// means unbounded; otherwise the oldest entries are evicted first.
#[derive(Debug, Clone)]
pub struct History<T> {
    past: VecDeque<T>,
    future: VecDeque<T>,
    max_depth: usize,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T> History<T> {
    pub fn new(max_depth: usize) -> Self {
        Self {
            past: VecDeque::new(),
            future: VecDeque::new(),
            max_depth,
        }
    }

    /// Pushes the pre-edit snapshot and drops every redo entry.
    pub fn record(&mut self, snapshot: T) {
        self.future.clear();
        push_bounded(&mut self.past, snapshot, self.max_depth);
    }

    /// Pops the latest snapshot, parking `current` on the redo stack.
    /// Returns `None` and leaves both stacks untouched when there is nothing
    /// to undo.
    pub fn undo(&mut self, current: T) -> Option<T> {
        let restored = self.past.pop_front()?;
        push_bounded(&mut self.future, current, self.max_depth);
        Some(restored)
    }

    pub fn redo(&mut self, current: T) -> Option<T> {
        let restored = self.future.pop_front()?;
        push_bounded(&mut self.past, current, self.max_depth);
        Some(restored)
    }

    pub fn peek_undo(&self) -> Option<&T> {
        self.past.front()
    }

    pub fn peek_redo(&self) -> Option<&T> {
        self.future.front()
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.past.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.future.len()
    }
}

fn push_bounded<T>(stack: &mut VecDeque<T>, entry: T, max_depth: usize) {
    stack.push_front(entry);
    if max_depth > 0 {
        stack.truncate(max_depth);
    }
}

#[cfg(test)]
mod tests {
    use super::History;

    #[test]
    fn undo_then_redo_round_trips() {
        let mut history = History::new(0);
        history.record("before");
        assert_eq!(history.undo("after"), Some("before"));
        assert!(!history.can_undo());
        assert_eq!(history.redo("before"), Some("after"));
        assert!(!history.can_redo());
        assert!(history.can_undo());
    }

    #[test]
    fn empty_stacks_are_no_ops() {
        let mut history: History<u32> = History::default();
        assert_eq!(history.undo(1), None);
        assert_eq!(history.redo(1), None);
        assert_eq!(history.undo_depth(), 0);
        assert_eq!(history.redo_depth(), 0);
    }

    #[test]
    fn recording_clears_redo() {
        let mut history = History::new(0);
        history.record(1);
        history.record(2);
        assert_eq!(history.undo(3), Some(2));
        assert!(history.can_redo());
        history.record(4);
        assert!(!history.can_redo());
        assert_eq!(history.peek_undo(), Some(&4));
    }

    #[test]
    fn depth_cap_evicts_oldest() {
        let mut history = History::new(3);
        for step in 0..10 {
            history.record(step);
        }
        assert_eq!(history.undo_depth(), 3);
        assert_eq!(history.undo(10), Some(9));
        assert_eq!(history.undo(9), Some(8));
        assert_eq!(history.undo(8), Some(7));
        assert_eq!(history.undo(7), None);
        assert_eq!(history.redo_depth(), 3);
        assert_eq!(history.peek_redo(), Some(&8));
    }
}
