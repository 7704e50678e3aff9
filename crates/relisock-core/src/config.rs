//! Engine configuration
//!
//! Centralized configuration for the delivery engine, including the
//! injectable session eviction policy. The engine never evicts on its own;
//! callers decide when to run the sweep.

use core::time::Duration;

// ----------------------------------------------------------------------------
// Eviction Policy
// ----------------------------------------------------------------------------

/// Policy for expiring sessions with no activity and no reconnect
///
/// A session that is never acknowledged and never reconnected accumulates an
/// unacknowledged buffer forever; this policy caps that. Applied only when
/// [`crate::DeliveryEngine::evict_idle`] is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Sessions live for the whole process lifetime
    #[default]
    Never,
    /// Evict sessions idle for longer than this duration
    IdleTimeout(Duration),
}

// ----------------------------------------------------------------------------
// Engine Configuration
// ----------------------------------------------------------------------------

/// Configuration for [`crate::DeliveryEngine`]
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Session expiry policy
    pub eviction: EvictionPolicy,
    /// Capacity of each socket's deduplicated inbound broadcast channel
    pub inbound_buffer_size: usize,
}

impl EngineConfig {
    /// Default inbound fan-out capacity
    pub const DEFAULT_INBOUND_BUFFER_SIZE: usize = 64;
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            eviction: EvictionPolicy::Never,
            inbound_buffer_size: Self::DEFAULT_INBOUND_BUFFER_SIZE,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
