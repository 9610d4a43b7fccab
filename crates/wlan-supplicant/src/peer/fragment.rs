//! Outgoing fragmentation of TLS-framed responses
//!
//! The first fragment reuses the frame the method wrote. Each later fragment
//! gets its 18-byte header written directly in front of its data window,
//! over bytes of a fragment that has already gone out.

use eapol_proto::{EAP_HEADER_LEN, EapCode, SnapHeader, TLS_LENGTH_FIELD_LEN, TlsFlags};
use tracing::warn;

use crate::scratch::{
    EAP_OFFSET, FrameSlice, FrameTooLong, ScratchBuffer, TLS_HEADER_LEN, set_frame_lengths,
    write_eap_header,
};

const FLAGS_OFFSET: usize = TLS_HEADER_LEN - 1;
const TYPE_OFFSET: usize = EAP_OFFSET + EAP_HEADER_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    next: usize,
    end: usize,
    type_byte: u8,
    /// Flags of the response with L and M cleared
    flags: u8,
}

/// Transmit side of the peer: current response, fragment cursor and the
/// last frame sent (for RETRANSMIT)
#[derive(Debug, Default)]
pub(crate) struct Transmitter {
    loaded: Option<FrameSlice>,
    cursor: Option<Cursor>,
    last_fragment: Option<FrameSlice>,
}

impl Transmitter {
    /// Replace the outgoing response; any unsent fragments are dropped
    pub fn load(&mut self, slice: FrameSlice) {
        self.loaded = Some(slice);
        self.cursor = None;
    }

    pub fn has_pending_fragments(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn last_fragment(&self) -> Option<FrameSlice> {
        self.last_fragment
    }

    pub fn reset(&mut self) {
        *self = Transmitter::default();
    }

    /// Frame to send for the current request, if any
    ///
    /// A window whose lengths cannot be expressed drops the response.
    pub fn next_fragment(
        &mut self,
        scratch: &mut ScratchBuffer,
        snap: &SnapHeader,
        req_id: u8,
        max_fragment: usize,
    ) -> Option<FrameSlice> {
        let built = if let Some(slice) = self.loaded.take() {
            self.first(scratch, slice, max_fragment)
        } else if let Some(cursor) = self.cursor {
            self.continuation(scratch, snap, req_id, max_fragment, cursor)
        } else {
            return None;
        };
        let slice = match built {
            Ok(slice) if !slice.is_empty() => slice,
            Ok(_) => return None,
            Err(e) => {
                warn!(error = %e, "dropping unsendable response");
                self.cursor = None;
                return None;
            }
        };
        self.last_fragment = Some(slice);
        Some(slice)
    }

    fn first(
        &mut self,
        scratch: &mut ScratchBuffer,
        slice: FrameSlice,
        max_fragment: usize,
    ) -> Result<FrameSlice, FrameTooLong> {
        let Some(layout) = slice.tls_layout() else {
            return Ok(slice);
        };
        let start = slice.start();
        let buf = scratch.bytes_mut();

        if layout.data_len <= max_fragment {
            // Single fragment: slide the header over the length field
            let new_start = start + TLS_LENGTH_FIELD_LEN;
            buf.copy_within(start..start + TLS_HEADER_LEN, new_start);
            buf[new_start + FLAGS_OFFSET] &= !TlsFlags::LENGTH_INCLUDED;
            set_frame_lengths(&mut buf[new_start..], EAP_HEADER_LEN + 2 + layout.data_len)?;
            return Ok(FrameSlice::new(new_start, layout.data_start + layout.data_len));
        }

        set_frame_lengths(
            &mut buf[start..],
            EAP_HEADER_LEN + 2 + TLS_LENGTH_FIELD_LEN + max_fragment,
        )?;
        let flags_at = start + FLAGS_OFFSET;
        let base_flags = buf[flags_at] & !(TlsFlags::LENGTH_INCLUDED | TlsFlags::MORE_FRAGMENTS);
        buf[flags_at] = base_flags | TlsFlags::LENGTH_INCLUDED | TlsFlags::MORE_FRAGMENTS;

        self.cursor = Some(Cursor {
            next: layout.data_start + max_fragment,
            end: layout.data_start + layout.data_len,
            type_byte: buf[start + TYPE_OFFSET],
            flags: base_flags,
        });
        Ok(FrameSlice::new(start, layout.data_start + max_fragment))
    }

    fn continuation(
        &mut self,
        scratch: &mut ScratchBuffer,
        snap: &SnapHeader,
        req_id: u8,
        max_fragment: usize,
        mut cursor: Cursor,
    ) -> Result<FrameSlice, FrameTooLong> {
        let window = max_fragment.min(cursor.end - cursor.next);
        let last = cursor.next + window == cursor.end;
        let header_start = cursor.next - TLS_HEADER_LEN;
        let eap_len = EAP_HEADER_LEN + 2 + window;
        let eap_len = u16::try_from(eap_len).map_err(|_| FrameTooLong(eap_len))?;

        let buf = scratch.bytes_mut();
        write_eap_header(
            &mut buf[header_start..],
            snap,
            EapCode::Response,
            req_id,
            eap_len,
            Some(cursor.type_byte),
        );
        buf[header_start + FLAGS_OFFSET] = if last {
            cursor.flags
        } else {
            cursor.flags | TlsFlags::MORE_FRAGMENTS
        };

        let end = cursor.next + window;
        cursor.next = end;
        self.cursor = (!last).then_some(cursor);
        Ok(FrameSlice::new(header_start, end))
    }
}
