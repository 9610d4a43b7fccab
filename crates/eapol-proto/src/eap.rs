//! EAP (Extensible Authentication Protocol) packets
//!
//! This module implements EAP packet structures as defined in RFC 3748.
//!
//! # EAP Packet Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Code      |  Identifier   |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |  Type-Data ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The Length field covers the EAP header itself.

use crate::eapol::{EAPOL_HEADER_LEN, EapolHeader, EapolType};
use crate::frame::FrameError;
use crate::snap::{SNAP_HEADER_LEN, SnapHeader};

/// Size of the Code/Identifier/Length header
pub const EAP_HEADER_LEN: usize = 4;

/// EAP packet code (first byte of EAP packet)
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EapCode {
    /// Request packet (Code 1)
    Request = 1,
    /// Response packet (Code 2)
    Response = 2,
    /// Success packet (Code 3)
    Success = 3,
    /// Failure packet (Code 4)
    Failure = 4,
}

impl EapCode {
    /// Convert from u8 to EapCode
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapCode::Request),
            2 => Some(EapCode::Response),
            3 => Some(EapCode::Success),
            4 => Some(EapCode::Failure),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Request and Response packets carry a Type field
    pub fn has_type(self) -> bool {
        matches!(self, EapCode::Request | EapCode::Response)
    }
}

/// EAP method types (RFC 3748 and IANA registry)
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EapType {
    /// Identity (Type 1) - RFC 3748
    Identity = 1,
    /// Notification (Type 2) - RFC 3748
    Notification = 2,
    /// Legacy Nak (Type 3) - RFC 3748, Response only
    Nak = 3,
    /// MD5-Challenge (Type 4) - RFC 3748
    Md5Challenge = 4,
    /// Generic Token Card (Type 6) - RFC 3748
    GenericTokenCard = 6,
    /// EAP-TLS (Type 13) - RFC 5216
    Tls = 13,
    /// Cisco LEAP (Type 17)
    Leap = 17,
    /// EAP-SIM (Type 18) - RFC 4186
    Sim = 18,
    /// EAP-TTLS (Type 21) - RFC 5281
    Ttls = 21,
    /// EAP-AKA (Type 23) - RFC 4187
    Aka = 23,
    /// PEAP (Type 25)
    Peap = 25,
    /// EAP-MSCHAPv2 (Type 26)
    MsChapV2 = 26,
    /// EAP-FAST (Type 43) - RFC 4851
    Fast = 43,
    /// Expanded Type (Type 254) - RFC 3748 Section 5.7
    Expanded = 254,
}

impl EapType {
    /// Convert from u8 to EapType
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapType::Identity),
            2 => Some(EapType::Notification),
            3 => Some(EapType::Nak),
            4 => Some(EapType::Md5Challenge),
            6 => Some(EapType::GenericTokenCard),
            13 => Some(EapType::Tls),
            17 => Some(EapType::Leap),
            18 => Some(EapType::Sim),
            21 => Some(EapType::Ttls),
            23 => Some(EapType::Aka),
            25 => Some(EapType::Peap),
            26 => Some(EapType::MsChapV2),
            43 => Some(EapType::Fast),
            254 => Some(EapType::Expanded),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Methods that carry TLS records with the RFC 5216 flags octet
    pub fn is_tls_framed(self) -> bool {
        matches!(
            self,
            EapType::Tls | EapType::Ttls | EapType::Peap | EapType::Fast
        )
    }
}

/// Zero-copy view over an EAP packet
///
/// The view is trimmed to the Length field, so trailing link-layer padding
/// is never visible through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EapView<'a> {
    bytes: &'a [u8],
    code: EapCode,
}

impl<'a> EapView<'a> {
    /// Parse an EAP packet
    ///
    /// # Packet Format
    /// - Code (1 byte)
    /// - Identifier (1 byte)
    /// - Length (2 bytes, network byte order)
    /// - Type (1 byte, only for Request/Response)
    /// - Type-Data (variable length)
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FrameError> {
        if bytes.len() < EAP_HEADER_LEN {
            return Err(FrameError::TooShort {
                expected: EAP_HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let code = EapCode::from_u8(bytes[0]).ok_or(FrameError::InvalidEapCode(bytes[0]))?;
        let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;

        if length < EAP_HEADER_LEN || (code.has_type() && length < EAP_HEADER_LEN + 1) {
            return Err(FrameError::InvalidEapLength(length));
        }
        if bytes.len() < length {
            return Err(FrameError::LengthMismatch {
                declared: length,
                available: bytes.len(),
            });
        }

        Ok(EapView {
            bytes: &bytes[..length],
            code,
        })
    }

    pub fn code(&self) -> EapCode {
        self.code
    }

    pub fn identifier(&self) -> u8 {
        self.bytes[1]
    }

    /// Value of the Length field
    pub fn length(&self) -> usize {
        self.bytes.len()
    }

    /// Raw Type octet (Request/Response only)
    pub fn type_byte(&self) -> Option<u8> {
        if self.code.has_type() {
            Some(self.bytes[EAP_HEADER_LEN])
        } else {
            None
        }
    }

    pub fn eap_type(&self) -> Option<EapType> {
        self.type_byte().and_then(EapType::from_u8)
    }

    /// Type-Data following the Type octet
    pub fn type_data(&self) -> &'a [u8] {
        if self.code.has_type() {
            &self.bytes[EAP_HEADER_LEN + 1..]
        } else {
            &[]
        }
    }

    /// The whole packet, header included
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Owned EAP packet, mostly useful for building frames
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapPacket {
    /// EAP code (Request, Response, Success, Failure)
    pub code: EapCode,
    /// Identifier for matching requests and responses (0-255)
    pub identifier: u8,
    /// Raw EAP type (only present for Request/Response)
    pub type_byte: Option<u8>,
    /// Type-specific data
    pub data: Vec<u8>,
}

impl EapPacket {
    /// Create a new EAP packet
    pub fn new(code: EapCode, identifier: u8, eap_type: Option<EapType>, data: Vec<u8>) -> Self {
        EapPacket {
            code,
            identifier,
            type_byte: eap_type.map(EapType::as_u8),
            data,
        }
    }

    /// Create an EAP Request carrying an arbitrary type octet
    pub fn request_raw(identifier: u8, type_byte: u8, data: Vec<u8>) -> Self {
        EapPacket {
            code: EapCode::Request,
            identifier,
            type_byte: Some(type_byte),
            data,
        }
    }

    /// Create an EAP Identity Request
    pub fn identity_request(identifier: u8, message: &str) -> Self {
        Self::new(
            EapCode::Request,
            identifier,
            Some(EapType::Identity),
            message.as_bytes().to_vec(),
        )
    }

    /// Create an EAP Identity Response
    pub fn identity_response(identifier: u8, identity: &str) -> Self {
        Self::new(
            EapCode::Response,
            identifier,
            Some(EapType::Identity),
            identity.as_bytes().to_vec(),
        )
    }

    /// Create a Legacy Nak proposing `desired` as the authentication type
    pub fn nak(identifier: u8, desired: EapType) -> Self {
        Self::new(
            EapCode::Response,
            identifier,
            Some(EapType::Nak),
            vec![desired.as_u8()],
        )
    }

    /// Create an EAP Success packet
    pub fn success(identifier: u8) -> Self {
        Self::new(EapCode::Success, identifier, None, Vec::new())
    }

    /// Create an EAP Failure packet
    pub fn failure(identifier: u8) -> Self {
        Self::new(EapCode::Failure, identifier, None, Vec::new())
    }

    /// Parse into an owned packet
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let view = EapView::parse(bytes)?;
        Ok(EapPacket {
            code: view.code(),
            identifier: view.identifier(),
            type_byte: view.type_byte(),
            data: view.type_data().to_vec(),
        })
    }

    pub fn eap_type(&self) -> Option<EapType> {
        self.type_byte.and_then(EapType::from_u8)
    }

    /// Get the total length of the packet
    pub fn length(&self) -> usize {
        if self.code.has_type() {
            EAP_HEADER_LEN + 1 + self.data.len()
        } else {
            EAP_HEADER_LEN
        }
    }

    /// Encode EAP packet to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let length = self.length();
        let mut bytes = Vec::with_capacity(length);

        bytes.push(self.code.as_u8());
        bytes.push(self.identifier);
        bytes.extend_from_slice(&(length as u16).to_be_bytes());

        if self.code.has_type() {
            bytes.push(self.type_byte.unwrap_or(0));
            bytes.extend_from_slice(&self.data);
        }

        bytes
    }

    /// Encode as a complete LLC/SNAP + EAPOL frame
    pub fn to_eapol_frame(&self, snap: &SnapHeader) -> Vec<u8> {
        let eap = self.to_bytes();
        let mut frame = Vec::with_capacity(SNAP_HEADER_LEN + EAPOL_HEADER_LEN + eap.len());
        frame.extend_from_slice(snap.as_bytes());
        frame.extend_from_slice(&EapolHeader::new(EapolType::Eap, eap.len() as u16).to_bytes());
        frame.extend_from_slice(&eap);
        frame
    }
}
