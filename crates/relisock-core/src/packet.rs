//! Packet model and wire codec boundary
//!
//! A packet is a typed envelope `{type, payload}` exchanged over the
//! transport. Encoding to and from bytes is delegated to a [`PacketCodec`];
//! the engine only works with the decoded [`Packet`] shape. The crate ships
//! [`JsonCodec`], a one-byte ASCII tag followed by a JSON body, as the
//! default codec.

use serde::{Deserialize, Serialize};

use crate::errors::{PacketError, Result};
use crate::types::{Seq, SessionId};

// ----------------------------------------------------------------------------
// Sequenced Payload
// ----------------------------------------------------------------------------

/// One `(seq, data)` entry of a message or replay batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqPayload {
    /// Sequence number assigned by the sender of this direction
    pub seq: Seq,
    /// Raw application payload
    pub data: Vec<u8>,
}

impl SeqPayload {
    /// Create a new sequenced payload
    pub fn new(seq: Seq, data: Vec<u8>) -> Self {
        Self { seq, data }
    }
}

// ----------------------------------------------------------------------------
// Packet
// ----------------------------------------------------------------------------

/// The typed envelope exchanged over the wire
///
/// `Ack` carries its payload as the raw string from the wire: a non-numeric
/// ack must survive decoding so the engine can drop it leniently instead of
/// failing the whole frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Client signals "I have no session, create one"
    Open,
    /// New session id (server to client only)
    Sid { session: SessionId },
    /// Fresh application messages or a post-handshake replay batch
    Message { entries: Vec<SeqPayload> },
    /// Confirmation of a single received sequence number
    Ack { raw: String },
    /// Client requests reattachment to an existing session
    Recon { session: SessionId, last: Seq },
    /// Reconnection catch-up batch the peer missed while disconnected
    Missed { entries: Vec<SeqPayload> },
}

impl Packet {
    /// Build an ack for a sequence number
    pub fn ack(seq: Seq) -> Self {
        Packet::Ack {
            raw: seq.to_string(),
        }
    }

    /// Parse an ack payload as a sequence number, if it is one
    pub fn parse_ack(raw: &str) -> Option<Seq> {
        raw.trim().parse::<u64>().ok().map(Seq::new)
    }
}

// ----------------------------------------------------------------------------
// Wire Tags
// ----------------------------------------------------------------------------

/// One-byte ASCII type tags used by [`JsonCodec`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketTag {
    Open = b'0',
    Sid = b'1',
    Message = b'2',
    Ack = b'3',
    Recon = b'4',
    Missed = b'5',
}

impl PacketTag {
    /// Convert from a tag byte, returning None for unknown values
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            b'0' => Some(Self::Open),
            b'1' => Some(Self::Sid),
            b'2' => Some(Self::Message),
            b'3' => Some(Self::Ack),
            b'4' => Some(Self::Recon),
            b'5' => Some(Self::Missed),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Codec Boundary
// ----------------------------------------------------------------------------

/// External codec contract: frame a packet to and from bytes
pub trait PacketCodec: Send + Sync {
    /// Encode a packet into wire bytes
    fn encode(&self, packet: &Packet) -> Result<Vec<u8>>;

    /// Decode wire bytes into a packet
    ///
    /// A failure here is the `MalformedPacket` condition: the frame is
    /// dropped and the connection stays open.
    fn decode(&self, bytes: &[u8]) -> Result<Packet>;
}

// ----------------------------------------------------------------------------
// JSON Codec
// ----------------------------------------------------------------------------

/// Recon body as carried on the wire
#[derive(Debug, Serialize, Deserialize)]
struct ReconBody {
    session: SessionId,
    last: Seq,
}

/// Default codec: `<tag byte><JSON body>`
///
/// `open` has an empty body; `sid` and `ack` carry a JSON string; `message`
/// and `missed` carry a JSON array of entries; `recon` carries a
/// `{session, last}` object.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }

    fn frame(tag: PacketTag, body: Vec<u8>) -> Vec<u8> {
        let mut frame = Vec::with_capacity(body.len() + 1);
        frame.push(tag as u8);
        frame.extend_from_slice(&body);
        frame
    }
}

impl PacketCodec for JsonCodec {
    fn encode(&self, packet: &Packet) -> Result<Vec<u8>> {
        let frame = match packet {
            Packet::Open => Self::frame(PacketTag::Open, Vec::new()),
            Packet::Sid { session } => {
                Self::frame(PacketTag::Sid, serde_json::to_vec(session.as_str())?)
            }
            Packet::Message { entries } => {
                Self::frame(PacketTag::Message, serde_json::to_vec(entries)?)
            }
            Packet::Ack { raw } => Self::frame(PacketTag::Ack, serde_json::to_vec(raw)?),
            Packet::Recon { session, last } => Self::frame(
                PacketTag::Recon,
                serde_json::to_vec(&ReconBody {
                    session: session.clone(),
                    last: *last,
                })?,
            ),
            Packet::Missed { entries } => {
                Self::frame(PacketTag::Missed, serde_json::to_vec(entries)?)
            }
        };
        Ok(frame)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Packet> {
        let (&tag, body) = bytes.split_first().ok_or(PacketError::EmptyFrame)?;
        let tag = PacketTag::from_u8(tag).ok_or(PacketError::UnknownTag { tag })?;

        let malformed = |e: serde_json::Error| PacketError::Malformed {
            reason: e.to_string(),
        };

        let packet = match tag {
            PacketTag::Open => Packet::Open,
            PacketTag::Sid => {
                let session: String = serde_json::from_slice(body).map_err(malformed)?;
                Packet::Sid {
                    session: SessionId::new(session),
                }
            }
            PacketTag::Message => Packet::Message {
                entries: serde_json::from_slice(body).map_err(malformed)?,
            },
            PacketTag::Ack => Packet::Ack {
                raw: serde_json::from_slice(body).map_err(malformed)?,
            },
            PacketTag::Recon => {
                let body: ReconBody = serde_json::from_slice(body).map_err(malformed)?;
                Packet::Recon {
                    session: body.session,
                    last: body.last,
                }
            }
            PacketTag::Missed => Packet::Missed {
                entries: serde_json::from_slice(body).map_err(malformed)?,
            },
        };
        Ok(packet)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
