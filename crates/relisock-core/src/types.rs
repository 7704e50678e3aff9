//! Core types for the relisock protocol
//!
//! This module defines the fundamental identifier and counter types used
//! throughout the engine, using newtype patterns for type safety.

use core::fmt;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Session Identifier
// ----------------------------------------------------------------------------

/// Durable identity of one logical client across transport connections
///
/// Stable for the session's lifetime and never reused within a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Create a session id from an opaque string
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Get the raw string form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Pending Connection Identifier
// ----------------------------------------------------------------------------

/// Identity of a transport connection before it owns a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingId(String);

impl PendingId {
    /// Create a pending id from an opaque string
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Get the raw string form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Sequence Number
// ----------------------------------------------------------------------------

/// Per-session, per-direction message sequence number
///
/// Server-assigned (outbound) and client-assigned (inbound) sequence spaces
/// are independent counters and are never compared to each other.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Seq(u64);

impl Seq {
    /// Create a sequence number
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The sequence number following this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get current wall-clock timestamp
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Get duration since another timestamp (saturating)
    pub fn duration_since(&self, other: Self) -> core::time::Duration {
        core::time::Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

// ----------------------------------------------------------------------------
// Time Source Trait
// ----------------------------------------------------------------------------

/// Trait for providing timestamps
///
/// Injectable so the idle-eviction policy can be tested against a
/// deterministic clock.
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// Standard library implementation of TimeSource
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

// ----------------------------------------------------------------------------
// Identifier Generator
// ----------------------------------------------------------------------------

/// Source of opaque unique identifiers for sessions and pending connections
///
/// Must be collision-free within the process lifetime.
pub trait IdGenerator: Send + Sync {
    /// Generate a fresh identifier
    fn new_id(&self) -> String;
}

/// Default generator backed by random v4 UUIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl UuidIdGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl IdGenerator for UuidIdGenerator {
    fn new_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_ordering() {
        let a = Seq::new(3);
        let b = a.next();
        assert_eq!(b.value(), 4);
        assert!(b > a);
        assert_eq!(Seq::default().value(), 0);
    }

    #[test]
    fn test_uuid_generator_uniqueness() {
        let generator = UuidIdGenerator::new();
        let first = generator.new_id();
        let second = generator.new_id();
        assert!(!first.is_empty());
        assert_ne!(first, second);
    }

    #[test]
    fn test_timestamp_duration_since() {
        let earlier = Timestamp::new(1_000);
        let later = Timestamp::new(4_500);
        assert_eq!(later.duration_since(earlier).as_millis(), 3_500);
        // Saturates instead of underflowing
        assert_eq!(earlier.duration_since(later).as_millis(), 0);
    }
}
