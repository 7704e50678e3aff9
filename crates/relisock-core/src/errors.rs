//! Error types for the relisock engine
//!
//! All failures here are scoped to one socket or session; nothing is
//! process-fatal. Malformed acks are deliberately not represented: they are
//! tolerated and dropped by the delivery engine.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Packet decoding and framing errors
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("Malformed packet: {reason}")]
    Malformed { reason: String },
    #[error("Unknown packet tag: {tag:#04x}")]
    UnknownTag { tag: u8 },
    #[error("Empty frame")]
    EmptyFrame,
}

/// Session and handshake errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },
    #[error("Protocol violation: {reason}")]
    ProtocolViolation { reason: String },
}

// ----------------------------------------------------------------------------
// Crate Error Type
// ----------------------------------------------------------------------------

/// Core error type for the relisock engine
#[derive(Debug, thiserror::Error)]
pub enum RelisockError {
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {reason}")]
    Transport { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl RelisockError {
    /// Create a malformed packet error with a reason
    pub fn malformed_packet<T: Into<String>>(reason: T) -> Self {
        RelisockError::Packet(PacketError::Malformed {
            reason: reason.into(),
        })
    }

    /// Create a session not found error
    pub fn session_not_found<T: Into<String>>(session_id: T) -> Self {
        RelisockError::Session(SessionError::SessionNotFound {
            session_id: session_id.into(),
        })
    }

    /// Create a protocol violation error with a reason
    pub fn protocol_violation<T: Into<String>>(reason: T) -> Self {
        RelisockError::Session(SessionError::ProtocolViolation {
            reason: reason.into(),
        })
    }

    /// Create a transport error with a reason
    pub fn transport_error<T: Into<String>>(reason: T) -> Self {
        RelisockError::Transport {
            reason: reason.into(),
        }
    }

    /// Whether this error is an unknown-session condition
    ///
    /// A `recon` against an unknown session surfaces this so the caller can
    /// tell the client to start a fresh `open` instead.
    pub fn is_unknown_session(&self) -> bool {
        matches!(
            self,
            RelisockError::Session(SessionError::SessionNotFound { .. })
        )
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, RelisockError>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelisockError::malformed_packet("bad JSON body");
        assert_eq!(err.to_string(), "Packet error: Malformed packet: bad JSON body");

        let err = RelisockError::session_not_found("abc");
        assert_eq!(err.to_string(), "Session error: Session not found: abc");
        assert!(err.is_unknown_session());
    }

    #[test]
    fn test_from_conversions() {
        let err: RelisockError = PacketError::EmptyFrame.into();
        assert!(matches!(err, RelisockError::Packet(PacketError::EmptyFrame)));

        let err: RelisockError = SessionError::ProtocolViolation {
            reason: "open on established socket".into(),
        }
        .into();
        assert!(!err.is_unknown_session());
    }
}
