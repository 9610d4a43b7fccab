//! LLC/SNAP encapsulation (RFC 1042)
//!
//! ```text
//! +------+------+------+-----------------+----------------+
//! | DSAP | SSAP | Ctrl |   OUI (3 bytes) | Protocol (2)   |
//! | 0xAA | 0xAA | 0x03 |                 |                |
//! +------+------+------+-----------------+----------------+
//! ```

use crate::frame::FrameError;

/// Size of an LLC/SNAP header
pub const SNAP_HEADER_LEN: usize = 8;

const LLC_SAP_SNAP: u8 = 0xAA;
const LLC_CTRL_UI: u8 = 0x03;

/// RFC 1042 encapsulation OUI
pub const OUI_RFC1042: [u8; 3] = [0x00, 0x00, 0x00];
/// Bluetooth SIG OUI used by the AMP 802.11 PAL
pub const OUI_BLUETOOTH_SIG: [u8; 3] = [0x00, 0x19, 0x58];

/// EtherType for EAP over LAN
pub const ETHERTYPE_EAPOL: u16 = 0x888E;
/// EtherType for WAI (WAPI)
pub const ETHERTYPE_WAPI: u16 = 0x88B4;
/// AMP PAL protocol identifier for security frames
pub const AMP_PROTOCOL_SECURITY: u16 = 0x0003;

/// Protocol families the supplicant accepts
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// EAPOL (RFC 1042 OUI, EtherType 0x888E)
    Eapol,
    /// WAPI (RFC 1042 OUI, EtherType 0x88B4)
    Wapi,
    /// Bluetooth AMP security frames (Bluetooth SIG OUI, protocol 0x0003)
    Amp,
}

/// LLC/SNAP header
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapHeader(pub [u8; SNAP_HEADER_LEN]);

impl SnapHeader {
    /// SNAP header for EAPOL frames
    pub const EAPOL: SnapHeader = SnapHeader::new(OUI_RFC1042, ETHERTYPE_EAPOL);
    /// SNAP header for WAPI frames
    pub const WAPI: SnapHeader = SnapHeader::new(OUI_RFC1042, ETHERTYPE_WAPI);
    /// SNAP header for AMP security frames
    pub const AMP: SnapHeader = SnapHeader::new(OUI_BLUETOOTH_SIG, AMP_PROTOCOL_SECURITY);

    pub const fn new(oui: [u8; 3], protocol: u16) -> Self {
        let p = protocol.to_be_bytes();
        SnapHeader([
            LLC_SAP_SNAP,
            LLC_SAP_SNAP,
            LLC_CTRL_UI,
            oui[0],
            oui[1],
            oui[2],
            p[0],
            p[1],
        ])
    }

    /// Parse and validate the SNAP header at the start of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < SNAP_HEADER_LEN {
            return Err(FrameError::TooShort {
                expected: SNAP_HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let mut raw = [0u8; SNAP_HEADER_LEN];
        raw.copy_from_slice(&bytes[..SNAP_HEADER_LEN]);
        if raw[0] != LLC_SAP_SNAP || raw[1] != LLC_SAP_SNAP || raw[2] != LLC_CTRL_UI {
            return Err(FrameError::InvalidLlc);
        }
        Ok(SnapHeader(raw))
    }

    pub fn oui(&self) -> [u8; 3] {
        [self.0[3], self.0[4], self.0[5]]
    }

    pub fn protocol_id(&self) -> u16 {
        u16::from_be_bytes([self.0[6], self.0[7]])
    }

    /// Classify the header into one of the known protocol families
    pub fn protocol(&self) -> Result<Protocol, FrameError> {
        match (self.oui(), self.protocol_id()) {
            (OUI_RFC1042, ETHERTYPE_EAPOL) => Ok(Protocol::Eapol),
            (OUI_RFC1042, ETHERTYPE_WAPI) => Ok(Protocol::Wapi),
            (OUI_BLUETOOTH_SIG, AMP_PROTOCOL_SECURITY) => Ok(Protocol::Amp),
            (oui, protocol) => Err(FrameError::UnknownProtocol { oui, protocol }),
        }
    }

    pub fn as_bytes(&self) -> &[u8; SNAP_HEADER_LEN] {
        &self.0
    }
}

impl Default for SnapHeader {
    fn default() -> Self {
        SnapHeader::EAPOL
    }
}
