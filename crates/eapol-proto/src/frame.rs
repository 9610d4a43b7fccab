//! Complete received frames: LLC/SNAP + EAPOL (or WAPI) payload

use thiserror::Error;

use crate::eapol::{EAPOL_HEADER_LEN, EapolHeader, EapolType};
use crate::snap::{Protocol, SNAP_HEADER_LEN, SnapHeader};

/// Frame decoding errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("Invalid LLC header (not SNAP)")]
    InvalidLlc,

    #[error("Unknown SNAP protocol: OUI {oui:02x?}, protocol {protocol:#06x}")]
    UnknownProtocol { oui: [u8; 3], protocol: u16 },

    #[error("Invalid EAPOL packet type: {0}")]
    InvalidEapolType(u8),

    #[error("Declared length {declared} exceeds {available} available bytes")]
    LengthMismatch { declared: usize, available: usize },

    #[error("Invalid EAP code: {0}")]
    InvalidEapCode(u8),

    #[error("Invalid EAP length: {0}")]
    InvalidEapLength(usize),

    #[error("Reassembled TLS message is {actual} bytes, expected {expected}")]
    ReassemblyMismatch { expected: usize, actual: usize },

    #[error("TLS message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Invalid MAC address: {0}")]
    InvalidMacAddress(String),
}

/// Payload of a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBody<'a> {
    /// EAPOL-Packet body (an EAP packet, not yet parsed)
    Eap(&'a [u8]),
    /// EAPOL-Key descriptor
    Key(&'a [u8]),
    /// EAPOL-Start, EAPOL-Logoff or EAPOL-Encapsulated-ASF-Alert
    Control(EapolType),
    /// WAI payload following the SNAP header
    Wapi(&'a [u8]),
}

/// Zero-copy view over a received LLC/SNAP frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub snap: SnapHeader,
    pub protocol: Protocol,
    pub body: FrameBody<'a>,
    raw: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Validate the SNAP header and, for EAPOL-carrying protocols, the EAPOL
    /// header and body length
    pub fn parse(raw: &'a [u8]) -> Result<Self, FrameError> {
        let snap = SnapHeader::parse(raw)?;
        let protocol = snap.protocol()?;
        let payload = &raw[SNAP_HEADER_LEN..];

        let body = match protocol {
            Protocol::Wapi => FrameBody::Wapi(payload),
            Protocol::Eapol | Protocol::Amp => {
                let header = EapolHeader::parse(payload)?;
                let body =
                    &payload[EAPOL_HEADER_LEN..EAPOL_HEADER_LEN + header.body_length as usize];
                match header.packet_type {
                    EapolType::Eap => FrameBody::Eap(body),
                    EapolType::Key => FrameBody::Key(body),
                    other => FrameBody::Control(other),
                }
            }
        };

        Ok(Frame {
            snap,
            protocol,
            body,
            raw,
        })
    }

    /// The complete frame as received
    pub fn as_bytes(&self) -> &'a [u8] {
        self.raw
    }

    pub fn is_key(&self) -> bool {
        matches!(self.body, FrameBody::Key(_))
    }
}
