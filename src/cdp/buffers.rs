//! Bounded per-tab event buffers.
//!
//! Every console/exception/network notification for an attached tab is
//! appended here, independent of any controller-issued command. Buffers are
//! FIFO rings: insertion beyond the bound discards the oldest entries.
//!
//! Bounds: console 500 entries, network 200 entries.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Maximum retained console entries per tab.
pub const CONSOLE_BUFFER_CAPACITY: usize = 500;

/// Maximum retained network entries per tab.
pub const NETWORK_BUFFER_CAPACITY: usize = 200;

/// Default number of console entries returned by `read-console`.
pub const DEFAULT_CONSOLE_READ_LIMIT: usize = 100;

/// Default number of network entries returned by `read-network`.
pub const DEFAULT_NETWORK_READ_LIMIT: usize = 50;

// ============================================================================
// Entry Types
// ============================================================================

/// A captured console message or uncaught exception.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleEntry {
    /// Message kind: `log`, `warn`, `error`, `exception`, ...
    #[serde(rename = "type")]
    pub kind: String,
    /// Message text.
    pub text: String,
    /// Protocol timestamp (milliseconds since epoch).
    pub timestamp: f64,
}

/// A captured network response event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEntry {
    /// Request URL.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response MIME type.
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Protocol timestamp.
    pub timestamp: f64,
}

// ============================================================================
// EventBuffer
// ============================================================================

/// A bounded FIFO ring buffer of captured events.
///
/// `push` evicts the oldest entry once the bound is exceeded. Reads are
/// non-destructive by default; `read_recent` with `clear` removes exactly
/// the entries present at read time, so nothing ingested afterwards is lost.
#[derive(Debug)]
pub struct EventBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> EventBuffer<T> {
    /// Creates an empty buffer with the given bound.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Appends an entry, evicting the oldest if the bound is exceeded.
    pub fn push(&mut self, entry: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Returns the most recent `limit` entries in chronological order.
    ///
    /// With `clear`, removes everything that was present at read time; the
    /// read and the clear are one atomic step under the caller's lock.
    pub fn read_recent(&mut self, limit: usize, clear: bool) -> Vec<T> {
        let skip = self.entries.len().saturating_sub(limit);
        let result: Vec<T> = self.entries.iter().skip(skip).cloned().collect();

        if clear {
            self.entries.clear();
        }

        result
    }

    /// Returns the number of buffered entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the buffer is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the buffer bound.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Console buffer with the standard bound.
pub type ConsoleBuffer = EventBuffer<ConsoleEntry>;

/// Network buffer with the standard bound.
pub type NetworkBuffer = EventBuffer<NetworkEntry>;

/// Creates a console buffer with the standard bound.
#[inline]
#[must_use]
pub fn console_buffer() -> ConsoleBuffer {
    EventBuffer::new(CONSOLE_BUFFER_CAPACITY)
}

/// Creates a network buffer with the standard bound.
#[inline]
#[must_use]
pub fn network_buffer() -> NetworkBuffer {
    EventBuffer::new(NETWORK_BUFFER_CAPACITY)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn entry(i: usize) -> ConsoleEntry {
        ConsoleEntry {
            kind: "log".to_string(),
            text: format!("message {i}"),
            timestamp: i as f64,
        }
    }

    #[test]
    fn test_bound_never_exceeded() {
        let mut buffer = console_buffer();
        for i in 0..600 {
            buffer.push(entry(i));
        }
        assert_eq!(buffer.len(), CONSOLE_BUFFER_CAPACITY);
    }

    #[test]
    fn test_oldest_evicted_first() {
        let mut buffer = EventBuffer::new(3);
        for i in 0..5 {
            buffer.push(entry(i));
        }

        let all = buffer.read_recent(10, false);
        let texts: Vec<&str> = all.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["message 2", "message 3", "message 4"]);
    }

    #[test]
    fn test_read_recent_returns_newest_in_order() {
        let mut buffer = console_buffer();
        for i in 0..600 {
            buffer.push(entry(i));
        }

        let recent = buffer.read_recent(100, false);
        assert_eq!(recent.len(), 100);
        assert_eq!(recent.first().map(|e| e.text.as_str()), Some("message 500"));
        assert_eq!(recent.last().map(|e| e.text.as_str()), Some("message 599"));
        // Non-destructive read: buffer size unchanged.
        assert_eq!(buffer.len(), CONSOLE_BUFFER_CAPACITY);
    }

    #[test]
    fn test_clear_after_read() {
        let mut buffer = console_buffer();
        for i in 0..10 {
            buffer.push(entry(i));
        }

        let first = buffer.read_recent(100, true);
        assert_eq!(first.len(), 10);

        let second = buffer.read_recent(100, false);
        assert!(second.is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_read_limit_smaller_than_buffer() {
        let mut buffer = EventBuffer::new(5);
        for i in 0..5 {
            buffer.push(entry(i));
        }

        let recent = buffer.read_recent(2, false);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "message 3");
        assert_eq!(recent[1].text, "message 4");
    }

    #[test]
    fn test_network_buffer_capacity() {
        let mut buffer = network_buffer();
        for i in 0..300 {
            buffer.push(NetworkEntry {
                url: format!("https://example.com/{i}"),
                status: 200,
                mime_type: "text/html".to_string(),
                timestamp: i as f64,
            });
        }
        assert_eq!(buffer.len(), NETWORK_BUFFER_CAPACITY);
    }

    proptest! {
        #[test]
        fn prop_len_never_exceeds_capacity(pushes in 0usize..2000, capacity in 1usize..600) {
            let mut buffer = EventBuffer::new(capacity);
            for i in 0..pushes {
                buffer.push(entry(i));
            }
            prop_assert!(buffer.len() <= capacity);
            prop_assert_eq!(buffer.len(), pushes.min(capacity));
        }

        #[test]
        fn prop_read_recent_is_suffix(pushes in 1usize..500, limit in 1usize..600) {
            let mut buffer = EventBuffer::new(200);
            for i in 0..pushes {
                buffer.push(entry(i));
            }
            let recent = buffer.read_recent(limit, false);
            prop_assert_eq!(recent.len(), limit.min(buffer.len()));
            // Entries must be the newest ones, in chronological order.
            let newest = pushes - 1;
            prop_assert_eq!(
                recent.last().map(|e| e.timestamp),
                Some(newest as f64)
            );
        }
    }
}
