//! EAP-TLS style framing (RFC 5216 Section 3.1)
//!
//! EAP-TLS, EAP-TTLS, EAP-FAST and PEAP share the same Type-Data layout:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Flags     |               TLS Message Length              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     TLS Message Length        |         TLS Data...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The length field is present only when the L flag is set.

use crate::frame::FrameError;

/// Size of the optional TLS Message Length field
pub const TLS_LENGTH_FIELD_LEN: usize = 4;

/// Upper bound on a reassembled TLS message
pub const MAX_TLS_MESSAGE_LEN: usize = 64 * 1024;

/// Flags octet leading every EAP-TLS style Type-Data
///
/// ```text
///  0 1 2 3 4 5 6 7
/// +-+-+-+-+-+-+-+-+
/// |L M S R R V V V|
/// +-+-+-+-+-+-+-+-+
/// ```
///
/// L announces a 4-octet total message length, M says more fragments
/// follow and S opens the exchange. The V bits carry the method version
/// for EAP-TTLS and EAP-FAST and stay zero for EAP-TLS. Reserved bits are
/// kept as received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlsFlags(u8);

impl TlsFlags {
    pub const LENGTH_INCLUDED: u8 = 0x80;
    pub const MORE_FRAGMENTS: u8 = 0x40;
    pub const START: u8 = 0x20;
    pub const VERSION_MASK: u8 = 0x07;

    /// Flags octet with the given L, M and S bits and version zero
    pub fn new(length_included: bool, more_fragments: bool, start: bool) -> Self {
        [
            (length_included, Self::LENGTH_INCLUDED),
            (more_fragments, Self::MORE_FRAGMENTS),
            (start, Self::START),
        ]
        .into_iter()
        .filter(|&(set, _)| set)
        .fold(TlsFlags(0), |flags, (_, bit)| TlsFlags(flags.0 | bit))
    }

    pub fn from_u8(value: u8) -> Self {
        TlsFlags(value)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// Replace the version bits, leaving L, M and S alone
    pub fn with_version(self, version: u8) -> Self {
        TlsFlags((self.0 & !Self::VERSION_MASK) | (version & Self::VERSION_MASK))
    }

    fn has(self, bit: u8) -> bool {
        self.0 & bit == bit
    }

    pub fn length_included(self) -> bool {
        self.has(Self::LENGTH_INCLUDED)
    }

    pub fn more_fragments(self) -> bool {
        self.has(Self::MORE_FRAGMENTS)
    }

    pub fn start(self) -> bool {
        self.has(Self::START)
    }

    pub fn version(self) -> u8 {
        self.0 & Self::VERSION_MASK
    }
}

/// Borrowed view over EAP-TLS Type-Data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsFragment<'a> {
    pub flags: TlsFlags,
    /// Total TLS message length (present if L flag is set)
    pub message_length: Option<u32>,
    /// TLS record data carried by this fragment
    pub data: &'a [u8],
}

impl<'a> TlsFragment<'a> {
    /// Parse EAP-TLS Type-Data
    pub fn parse(type_data: &'a [u8]) -> Result<Self, FrameError> {
        let Some((&raw_flags, rest)) = type_data.split_first() else {
            return Err(FrameError::TooShort {
                expected: 1,
                actual: 0,
            });
        };
        let flags = TlsFlags::from_u8(raw_flags);

        if flags.length_included() {
            if rest.len() < TLS_LENGTH_FIELD_LEN {
                return Err(FrameError::TooShort {
                    expected: 1 + TLS_LENGTH_FIELD_LEN,
                    actual: type_data.len(),
                });
            }
            let length = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
            Ok(TlsFragment {
                flags,
                message_length: Some(length),
                data: &rest[TLS_LENGTH_FIELD_LEN..],
            })
        } else {
            Ok(TlsFragment {
                flags,
                message_length: None,
                data: rest,
            })
        }
    }
}

/// Fragment assembler for EAP-TLS
///
/// Handles reassembly of fragmented TLS messages
#[derive(Debug, Clone, Default)]
pub struct TlsFragmentAssembler {
    /// Expected total length (from L flag)
    expected_length: Option<u32>,
    /// Accumulated fragments
    fragments: Vec<u8>,
}

impl TlsFragmentAssembler {
    /// Create a new assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment
    ///
    /// Returns Some(complete_data) when all fragments are received
    pub fn add_fragment(&mut self, fragment: &TlsFragment<'_>) -> Result<Option<Vec<u8>>, FrameError> {
        // Set expected length from first packet with L flag
        if fragment.flags.length_included() && self.expected_length.is_none() {
            self.expected_length = fragment.message_length;
        }

        if self.fragments.len() + fragment.data.len() > MAX_TLS_MESSAGE_LEN {
            let total = self.fragments.len() + fragment.data.len();
            self.reset();
            return Err(FrameError::MessageTooLarge(total));
        }
        self.fragments.extend_from_slice(fragment.data);

        if fragment.flags.more_fragments() {
            return Ok(None);
        }

        // Validate length if it was specified
        if let Some(expected) = self.expected_length
            && self.fragments.len() != expected as usize
        {
            let actual = self.fragments.len();
            self.reset();
            return Err(FrameError::ReassemblyMismatch {
                expected: expected as usize,
                actual,
            });
        }

        self.expected_length = None;
        Ok(Some(std::mem::take(&mut self.fragments)))
    }

    /// True while a fragmented message is partially received
    pub fn in_progress(&self) -> bool {
        !self.fragments.is_empty() || self.expected_length.is_some()
    }

    /// Reset the assembler
    pub fn reset(&mut self) {
        self.expected_length = None;
        self.fragments.clear();
    }
}
