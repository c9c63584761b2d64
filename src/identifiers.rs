//! Type-safe identifiers for relay and browser entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! # ID Kinds
//!
//! | Type | Backing | Allocation |
//! |------|---------|------------|
//! | [`RequestId`] | `u64` | Monotonic counter, per Relay instance |
//! | [`TabId`] | `String` | Debugging target identifier from the browser |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// RequestId
// ============================================================================

/// Relay-local request identifier.
///
/// Assigned by the Relay when a controller command is forwarded to the
/// in-browser endpoint. Monotonically increasing, unique per Relay instance,
/// and never reused while the request is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Creates a request ID from a raw value.
    #[inline]
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// RequestIdAllocator
// ============================================================================

/// Monotonic [`RequestId`] allocator owned by a single Relay instance.
///
/// Starts at 1; id 0 is never handed out so it can serve as a sentinel
/// in logs.
#[derive(Debug)]
pub struct RequestIdAllocator {
    next: AtomicU64,
}

impl RequestIdAllocator {
    /// Creates a new allocator starting at 1.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns the next request ID.
    #[inline]
    pub fn next(&self) -> RequestId {
        RequestId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RequestIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TabId
// ============================================================================

/// Identifier of a browser tab (a debugging target).
///
/// The browser's HTTP discovery endpoint reports targets with opaque string
/// identifiers; a [`TabId`] wraps one of those.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    /// Creates a tab ID from a raw target identifier.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TabId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TabId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Tests
// ============================================================================
