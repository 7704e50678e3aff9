//! Relisock Core Protocol Implementation
//!
//! Reliable, reconnectable message channels layered over an unreliable
//! byte-stream transport. Provides the packet model, session and pending
//! stores, and the delivery engine that keeps per-session sequencing,
//! acknowledgment pruning, duplicate suppression, and reconnect replay
//! working across transport failures.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod engine;
pub mod errors;
pub mod packet;
pub mod pending;
pub mod session;
pub mod socket;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{EngineConfig, EvictionPolicy};
pub use engine::{DeliveryEngine, EngineStats};
pub use errors::{PacketError, RelisockError, Result, SessionError};
pub use packet::{JsonCodec, Packet, PacketCodec, PacketTag, SeqPayload};
pub use pending::PendingRegistry;
pub use session::{SessionStore, SessionView};
pub use socket::{LinkState, ReliableSocket, SocketLink, Transport};
pub use types::{
    IdGenerator, PendingId, Seq, SessionId, SystemTimeSource, TimeSource, Timestamp,
    UuidIdGenerator,
};
