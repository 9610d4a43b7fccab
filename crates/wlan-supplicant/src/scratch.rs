//! Outgoing frame store
//!
//! Every response is written once into the session's [`ScratchBuffer`] and
//! referenced by a [`FrameSlice`]. Fragmentation and retransmission only ever
//! move slice bounds and rewrite headers in place; the payload is never
//! copied after the method wrote it.
//!
//! Layout of a TLS-framed response as written by a method:
//!
//! ```text
//! | SNAP (8) | EAPOL (4) | EAP hdr (4) | Type (1) | Flags (1) | Length (4) | TLS data ... |
//! 0          8           12            16         17          18           22
//! ```

use eapol_proto::{
    EAP_HEADER_LEN, EAPOL_HEADER_LEN, EapCode, EapolHeader, EapolType, SNAP_HEADER_LEN,
    SnapHeader, TLS_LENGTH_FIELD_LEN, TlsFlags,
};
use thiserror::Error;
use tracing::{trace, warn};

/// Initial capacity of the scratch buffer
pub const SCRATCH_CAPACITY: usize = 8 * 1024;

/// Offset of the EAP header inside a frame
pub(crate) const EAP_OFFSET: usize = SNAP_HEADER_LEN + EAPOL_HEADER_LEN;

/// SNAP + EAPOL + EAP header + Type + TLS flags
pub(crate) const TLS_HEADER_LEN: usize = EAP_OFFSET + EAP_HEADER_LEN + 2;

/// An EAP packet longer than its 16-bit Length field can express
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("EAP packet of {0} bytes exceeds the 16-bit length field")]
pub struct FrameTooLong(pub usize);

/// A transmit-ready frame inside the scratch buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameSlice {
    start: usize,
    end: usize,
    tls: Option<TlsLayout>,
}

/// Where the TLS data of a TLS-framed response lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TlsLayout {
    pub data_start: usize,
    pub data_len: usize,
}

impl FrameSlice {
    /// No frame; the method has nothing to send
    pub const EMPTY: FrameSlice = FrameSlice {
        start: 0,
        end: 0,
        tls: None,
    };

    pub(crate) fn new(start: usize, end: usize) -> Self {
        FrameSlice {
            start,
            end,
            tls: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub(crate) fn start(&self) -> usize {
        self.start
    }

    pub(crate) fn tls_layout(&self) -> Option<TlsLayout> {
        self.tls
    }
}

/// Write SNAP, EAPOL and EAP headers (plus the Type octet, if any) at the
/// start of `out`
pub(crate) fn write_eap_header(
    out: &mut [u8],
    snap: &SnapHeader,
    code: EapCode,
    identifier: u8,
    eap_len: u16,
    type_byte: Option<u8>,
) {
    out[..SNAP_HEADER_LEN].copy_from_slice(snap.as_bytes());
    EapolHeader::new(EapolType::Eap, eap_len).write(&mut out[SNAP_HEADER_LEN..EAP_OFFSET]);
    out[EAP_OFFSET] = code.as_u8();
    out[EAP_OFFSET + 1] = identifier;
    out[EAP_OFFSET + 2..EAP_OFFSET + 4].copy_from_slice(&eap_len.to_be_bytes());
    if let Some(type_byte) = type_byte {
        out[EAP_OFFSET + EAP_HEADER_LEN] = type_byte;
    }
}

/// Rewrite the EAPOL body length and EAP Length of the frame starting at
/// `frame[0]`; the frame is left untouched when `eap_len` does not fit
pub(crate) fn set_frame_lengths(frame: &mut [u8], eap_len: usize) -> Result<(), FrameTooLong> {
    let len = u16::try_from(eap_len)
        .map_err(|_| FrameTooLong(eap_len))?
        .to_be_bytes();
    frame[SNAP_HEADER_LEN + 2..EAP_OFFSET].copy_from_slice(&len);
    frame[EAP_OFFSET + 2..EAP_OFFSET + 4].copy_from_slice(&len);
    Ok(())
}

/// Owned outgoing-frame store shared by every method of a session
#[derive(Debug, Default)]
pub struct ScratchBuffer {
    buf: Vec<u8>,
}

impl ScratchBuffer {
    pub fn new() -> Self {
        ScratchBuffer {
            buf: Vec::with_capacity(SCRATCH_CAPACITY),
        }
    }

    /// Bytes of a previously built frame
    pub fn frame(&self, slice: FrameSlice) -> &[u8] {
        &self.buf[slice.start..slice.end]
    }

    pub(crate) fn frame_mut(&mut self, slice: FrameSlice) -> &mut [u8] {
        &mut self.buf[slice.start..slice.end]
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Start a new EAP frame, discarding whatever the buffer held
    pub fn writer(
        &mut self,
        snap: &SnapHeader,
        code: EapCode,
        identifier: u8,
        type_byte: Option<u8>,
    ) -> FrameWriter<'_> {
        let header_len = EAP_OFFSET + EAP_HEADER_LEN + usize::from(type_byte.is_some());
        self.buf.clear();
        self.buf.resize(header_len, 0);
        write_eap_header(&mut self.buf, snap, code, identifier, 0, type_byte);
        FrameWriter { buf: &mut self.buf }
    }

    /// Build an EAP-Response for a TLS-framed method
    ///
    /// With no data this is the 6-byte acknowledgement. Otherwise the length
    /// field is always reserved; the engine drops it again when the message
    /// fits in a single fragment.
    pub fn tls_response(
        &mut self,
        snap: &SnapHeader,
        identifier: u8,
        type_byte: u8,
        flags: TlsFlags,
        data: &[u8],
    ) -> FrameSlice {
        let mut writer = self.writer(snap, EapCode::Response, identifier, Some(type_byte));
        if data.is_empty() {
            writer.put_u8(flags.as_u8());
            return writer.finish();
        }

        writer
            .put_u8(flags.as_u8() | TlsFlags::LENGTH_INCLUDED)
            .put_u32(data.len() as u32)
            .put_slice(data);
        let end = writer.buf.len();
        // messages too long for one packet only leave as fragments, whose
        // lengths the transmitter writes
        if let Err(e) = set_frame_lengths(&mut self.buf[..end], end - EAP_OFFSET) {
            trace!(error = %e, "TLS message must be fragmented");
        }
        let mut slice = FrameSlice::new(0, end);
        slice.tls = Some(TlsLayout {
            data_start: TLS_HEADER_LEN + TLS_LENGTH_FIELD_LEN,
            data_len: data.len(),
        });
        slice
    }
}

/// Appends Type-Data to a frame started by [`ScratchBuffer::writer`]
pub struct FrameWriter<'a> {
    buf: &'a mut Vec<u8>,
}

impl FrameWriter<'_> {
    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn put_slice(&mut self, value: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(value);
        self
    }

    pub fn put_zeros(&mut self, count: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + count, 0);
        self
    }

    /// Offset of the next byte, relative to the start of the EAP header
    pub fn eap_position(&self) -> usize {
        self.buf.len() - EAP_OFFSET
    }

    /// Patch the EAPOL and EAP length fields and return the frame
    ///
    /// A packet too long for its Length field yields [`FrameSlice::EMPTY`],
    /// so nothing is sent.
    pub fn finish(self) -> FrameSlice {
        let eap_len = self.buf.len() - EAP_OFFSET;
        match set_frame_lengths(&mut self.buf[..], eap_len) {
            Ok(()) => FrameSlice::new(0, self.buf.len()),
            Err(e) => {
                warn!(error = %e, "refusing to build oversized frame");
                FrameSlice::EMPTY
            }
        }
    }
}
