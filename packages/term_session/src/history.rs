//! Bounded command history with an up/down recall cursor.
//!
//! Submitted commands are appended to the tail; once the history is full the
//! oldest entry is dropped from the head. The cursor is `None` while the user
//! is editing a fresh line and `Some(index)` while recalling an entry.

use std::collections::VecDeque;

/// Default maximum number of remembered commands.
pub const DEFAULT_CAPACITY: usize = 50;

/// Outcome of moving the cursor towards newer entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recall<'a> {
    /// The cursor now points at this entry.
    Entry(&'a str),
    /// The cursor moved past the newest entry and is back on a fresh line.
    Fresh,
    /// Nothing changed (not navigating, or no history).
    Unchanged,
}

/// A FIFO-bounded list of submitted commands plus a navigation cursor.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<String>,
    capacity: usize,
    cursor: Option<usize>,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a history holding at most `capacity` entries (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            cursor: None,
        }
    }

    /// Append a command, evicting the oldest entries to stay within capacity.
    ///
    /// The cursor is reset: indices shift on eviction, and a new submission
    /// always ends navigation.
    pub fn push(&mut self, command: impl Into<String>) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(command.into());
        self.cursor = None;
    }

    /// Move towards older entries.
    ///
    /// From a fresh line this selects the newest entry; at the oldest entry
    /// it stays put. Returns `None` only when the history is empty.
    pub fn up(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let index = match self.cursor {
            None => self.entries.len() - 1,
            Some(i) => i.saturating_sub(1),
        };
        self.cursor = Some(index);
        self.entries.get(index).map(String::as_str)
    }

    /// Move towards newer entries.
    pub fn down(&mut self) -> Recall<'_> {
        let Some(current) = self.cursor else {
            return Recall::Unchanged;
        };
        if current + 1 < self.entries.len() {
            self.cursor = Some(current + 1);
            match self.entries.get(current + 1) {
                Some(entry) => Recall::Entry(entry),
                None => Recall::Unchanged,
            }
        } else {
            self.cursor = None;
            Recall::Fresh
        }
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = None;
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(commands: &[&str]) -> CommandHistory {
        let mut history = CommandHistory::new();
        for cmd in commands {
            history.push(*cmd);
        }
        history
    }

    #[test]
    fn push_keeps_order() {
        let history = filled(&["ls", "pwd", "whoami"]);
        assert_eq!(history.iter().collect::<Vec<_>>(), vec!["ls", "pwd", "whoami"]);
        assert_eq!(history.cursor(), None);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut history = CommandHistory::new();
        for i in 0..51 {
            history.push(format!("cmd{i}"));
        }
        assert_eq!(history.len(), 50);
        assert_eq!(history.get(0), Some("cmd1"));
        assert_eq!(history.get(49), Some("cmd50"));
        assert!(history.iter().all(|c| c != "cmd0"));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut history = CommandHistory::with_capacity(0);
        history.push("a");
        history.push("b");
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.iter().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn up_on_empty_is_none() {
        let mut history = CommandHistory::new();
        assert_eq!(history.up(), None);
        assert_eq!(history.cursor(), None);
    }

    #[test]
    fn up_from_fresh_selects_newest() {
        let mut history = filled(&["ls", "pwd"]);
        assert_eq!(history.up(), Some("pwd"));
        assert_eq!(history.cursor(), Some(1));
    }

    #[test]
    fn up_saturates_at_oldest() {
        let mut history = filled(&["ls", "pwd"]);
        history.up();
        assert_eq!(history.up(), Some("ls"));
        assert_eq!(history.up(), Some("ls"));
        assert_eq!(history.cursor(), Some(0));
    }

    #[test]
    fn down_when_not_navigating_is_unchanged() {
        let mut history = filled(&["ls"]);
        assert_eq!(history.down(), Recall::Unchanged);
        assert_eq!(history.cursor(), None);
    }

    #[test]
    fn down_walks_forward_then_returns_to_fresh() {
        let mut history = filled(&["a", "b", "c"]);
        history.up();
        history.up();
        history.up();
        assert_eq!(history.down(), Recall::Entry("b"));
        assert_eq!(history.down(), Recall::Entry("c"));
        assert_eq!(history.down(), Recall::Fresh);
        assert_eq!(history.cursor(), None);
    }

    #[test]
    fn push_resets_cursor() {
        let mut history = filled(&["a", "b"]);
        history.up();
        history.push("c");
        assert_eq!(history.cursor(), None);
        assert_eq!(history.up(), Some("c"));
    }
}
