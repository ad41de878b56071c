//! Bounded, newest-first store backing the live feed.

use crate::feed::comment::Comment;
use std::collections::VecDeque;

/// Maximum number of comments retained by the feed.
pub const FEED_CAPACITY: usize = 100;

/// Fixed-capacity comment buffer, ordered newest first.
///
/// Pushing past capacity evicts the oldest comment. Both ends of the
/// underlying deque are O(1), so insertion and eviction never shift items.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    items: VecDeque<Comment>,
    capacity: usize,
}

impl EventBuffer {
    /// Create a buffer with the standard feed capacity.
    pub fn new() -> Self {
        Self::with_capacity(FEED_CAPACITY)
    }

    /// Create a buffer holding at most `capacity` comments (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Insert at the head. Returns the evicted tail comment, if any.
    pub fn push(&mut self, comment: Comment) -> Option<Comment> {
        self.items.push_front(comment);
        if self.items.len() > self.capacity {
            self.items.pop_back()
        } else {
            None
        }
    }

    /// Drop every buffered comment.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Newest comment, if any.
    pub fn latest(&self) -> Option<&Comment> {
        self.items.front()
    }

    /// Iterate in presentation order (newest first).
    pub fn iter(&self) -> impl Iterator<Item = &Comment> {
        self.items.iter()
    }

    /// Copy the contents out in presentation order.
    pub fn to_vec(&self) -> Vec<Comment> {
        self.items.iter().cloned().collect()
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> Comment {
        Comment::ingest(Some(format!("user{n}")), None, Some(format!("comment {n}")))
    }

    #[test]
    fn test_push_is_newest_first() {
        let mut buffer = EventBuffer::new();
        buffer.push(numbered(1));
        buffer.push(numbered(2));
        buffer.push(numbered(3));

        let texts: Vec<_> = buffer.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["comment 3", "comment 2", "comment 1"]);
        assert_eq!(buffer.latest().map(|c| c.text.as_str()), Some("comment 3"));
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut buffer = EventBuffer::new();
        for n in 0..250 {
            buffer.push(numbered(n));
            assert!(buffer.len() <= FEED_CAPACITY);
        }
        assert_eq!(buffer.len(), FEED_CAPACITY);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut buffer = EventBuffer::new();
        for n in 1..=100 {
            assert!(buffer.push(numbered(n)).is_none());
        }

        let evicted = buffer.push(numbered(101)).expect("101st push evicts");
        assert_eq!(evicted.text, "comment 1");
        assert_eq!(buffer.len(), 100);

        // Exactly 101 down to 2, in order.
        let texts: Vec<_> = buffer.iter().map(|c| c.text.clone()).collect();
        let expected: Vec<_> = (2..=101).rev().map(|n| format!("comment {n}")).collect();
        assert_eq!(texts, expected);
    }

    #[test]
    fn test_clear() {
        let mut buffer = EventBuffer::with_capacity(3);
        buffer.push(numbered(1));
        buffer.push(numbered(2));
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.latest().is_none());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buffer = EventBuffer::with_capacity(0);
        buffer.push(numbered(1));
        buffer.push(numbered(2));
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.len(), 1);
    }
}
