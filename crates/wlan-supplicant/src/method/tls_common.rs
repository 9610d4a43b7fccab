//! Shared EAP-TLS framing for the TLS-tunnelled methods
//!
//! Handles the Start flag, reassembles incoming fragments (each one is
//! acknowledged with an empty response) and drives the [`TlsBackend`]
//! through the handshake. Outgoing fragmentation is done by the peer engine.

use eapol_proto::{
    EapCode, EapType, EapView, SnapHeader, TlsFlags, TlsFragment, TlsFragmentAssembler,
};
use tracing::{debug, trace};

use super::{Inbound, MethodError, MethodState, MethodStatus};
use crate::backend::TlsBackend;
use crate::scratch::{FrameSlice, ScratchBuffer};

/// Outcome of one request handled by [`TlsChannel::advance`]
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// Nothing for the method to act on; any response is already queued
    Pending,
    /// Handshake just completed; carries the final handshake output
    Established(Vec<u8>),
    /// Decrypted tunnel payload
    Application(Vec<u8>),
}

pub(crate) struct TlsChannel {
    eap_type: EapType,
    version: u8,
    assembler: TlsFragmentAssembler,
    pub backend: Box<dyn TlsBackend>,
    outgoing: Option<Vec<u8>>,
    established: bool,
}

impl TlsChannel {
    pub fn new(eap_type: EapType, version: u8, backend: Box<dyn TlsBackend>) -> Self {
        TlsChannel {
            eap_type,
            version,
            assembler: TlsFragmentAssembler::new(),
            backend,
            outgoing: None,
            established: false,
        }
    }

    /// A request of our type carrying at least the flags octet, or a
    /// Failure ending the exchange mid-handshake
    pub fn accepts(&self, frame: &Inbound<'_>) -> bool {
        match frame {
            Inbound::Eap(view) => match view.code() {
                EapCode::Request => {
                    view.type_byte() == Some(self.eap_type.as_u8()) && !view.type_data().is_empty()
                }
                EapCode::Failure => true,
                _ => false,
            },
            Inbound::EapolKey(_) => false,
        }
    }

    pub fn advance(
        &mut self,
        status: &mut MethodStatus,
        view: &EapView<'_>,
    ) -> Result<Step, MethodError> {
        if view.code() == EapCode::Failure {
            debug!(method = ?self.eap_type, "server failed the exchange");
            self.outgoing = None;
            status.fail();
            return Ok(Step::Pending);
        }

        let fragment = TlsFragment::parse(view.type_data())?;

        if fragment.flags.start() {
            trace!(method = ?self.eap_type, version = fragment.flags.version(), "TLS start");
            self.assembler.reset();
            self.established = false;
            let hello = self.backend.start()?;
            status.method_state = MethodState::Cont;
            self.send(hello);
            return Ok(Step::Pending);
        }

        let Some(message) = self.assembler.add_fragment(&fragment)? else {
            trace!(received = fragment.data.len(), "TLS fragment buffered");
            self.ack();
            return Ok(Step::Pending);
        };

        if self.established {
            return Ok(Step::Application(self.backend.decrypt(&message)?));
        }

        let progress = self.backend.handshake(&message)?;
        if progress.established {
            self.established = true;
            return Ok(Step::Established(progress.output));
        }
        self.send(progress.output);
        Ok(Step::Pending)
    }

    /// Queue TLS data for the next response; empty data yields an ack
    pub fn send(&mut self, data: Vec<u8>) {
        self.outgoing = Some(data);
    }

    pub fn ack(&mut self) {
        self.outgoing = Some(Vec::new());
    }

    pub fn build(&mut self, req_id: u8, scratch: &mut ScratchBuffer, snap: &SnapHeader) -> FrameSlice {
        match self.outgoing.take() {
            Some(data) => scratch.tls_response(
                snap,
                req_id,
                self.eap_type.as_u8(),
                TlsFlags::default().with_version(self.version),
                &data,
            ),
            None => FrameSlice::EMPTY,
        }
    }

    pub fn reset(&mut self) {
        self.assembler.reset();
        self.outgoing = None;
        self.established = false;
    }
}
