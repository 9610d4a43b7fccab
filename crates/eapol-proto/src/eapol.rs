//! EAPOL header (IEEE 802.1X-2004 Section 7.5)
//!
//! ```text
//! +------------------+-------------+-------------------------------+
//! | Protocol Version | Packet Type |     Packet Body Length        |
//! +------------------+-------------+-------------------------------+
//! ```
//!
//! The body length excludes the LLC/SNAP and EAPOL headers.

use crate::frame::FrameError;

/// Size of an EAPOL header
pub const EAPOL_HEADER_LEN: usize = 4;
/// Protocol version written into outgoing frames
pub const EAPOL_VERSION: u8 = 1;

/// EAPOL packet type
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum EapolType {
    /// EAP-Packet (0)
    Eap = 0,
    /// EAPOL-Start (1)
    Start = 1,
    /// EAPOL-Logoff (2)
    Logoff = 2,
    /// EAPOL-Key (3)
    Key = 3,
    /// EAPOL-Encapsulated-ASF-Alert (4)
    Alert = 4,
}

impl EapolType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EapolType::Eap),
            1 => Some(EapolType::Start),
            2 => Some(EapolType::Logoff),
            3 => Some(EapolType::Key),
            4 => Some(EapolType::Alert),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Parsed EAPOL header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EapolHeader {
    pub version: u8,
    pub packet_type: EapolType,
    pub body_length: u16,
}

impl EapolHeader {
    pub fn new(packet_type: EapolType, body_length: u16) -> Self {
        EapolHeader {
            version: EAPOL_VERSION,
            packet_type,
            body_length,
        }
    }

    /// Parse the header and check that the advertised body fits in `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < EAPOL_HEADER_LEN {
            return Err(FrameError::TooShort {
                expected: EAPOL_HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let packet_type =
            EapolType::from_u8(bytes[1]).ok_or(FrameError::InvalidEapolType(bytes[1]))?;
        let body_length = u16::from_be_bytes([bytes[2], bytes[3]]);
        let available = bytes.len() - EAPOL_HEADER_LEN;
        if body_length as usize > available {
            return Err(FrameError::LengthMismatch {
                declared: body_length as usize,
                available,
            });
        }
        Ok(EapolHeader {
            version: bytes[0],
            packet_type,
            body_length,
        })
    }

    pub fn to_bytes(&self) -> [u8; EAPOL_HEADER_LEN] {
        let len = self.body_length.to_be_bytes();
        [self.version, self.packet_type.as_u8(), len[0], len[1]]
    }

    /// Write the header into the first four bytes of `out`
    pub fn write(&self, out: &mut [u8]) {
        out[..EAPOL_HEADER_LEN].copy_from_slice(&self.to_bytes());
    }
}
