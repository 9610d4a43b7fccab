//! EAP-TLS (RFC 5216)

use eapol_proto::{EapType, SnapHeader};
use tracing::{debug, warn};

use super::tls_common::{Step, TlsChannel};
use super::{Inbound, Key, KeyStash, KeyType, MethodError, MethodPlugin, MethodStatus};
use crate::backend::TlsBackend;
use crate::scratch::{FrameSlice, ScratchBuffer};

/// Exporter label for the EAP-TLS MSK
pub const TLS_KEY_LABEL: &str = "client EAP encryption";

/// MSK + EMSK
pub const TLS_KEY_MATERIAL_LEN: usize = 64;

pub struct TlsMethod {
    channel: TlsChannel,
    keys: KeyStash,
}

impl TlsMethod {
    pub fn new(backend: Box<dyn TlsBackend>) -> Self {
        TlsMethod {
            channel: TlsChannel::new(EapType::Tls, 0, backend),
            keys: KeyStash::default(),
        }
    }

    fn handle(&mut self, status: &mut MethodStatus, frame: &Inbound<'_>) -> Result<(), MethodError> {
        let Inbound::Eap(view) = frame else {
            return Ok(());
        };

        match self.channel.advance(status, view)? {
            Step::Pending => {}
            Step::Established(output) => {
                debug!("EAP-TLS handshake complete");
                self.channel.send(output);
                let msk = self
                    .channel
                    .backend
                    .export_keying_material(TLS_KEY_LABEL, TLS_KEY_MATERIAL_LEN)?;
                self.keys.stage(status, Key::new(KeyType::Pairwise, msk));
                if let Some(session) = self.channel.backend.session_blob() {
                    self.keys.stage(status, Key::new(KeyType::Session, session));
                }
                status.conditional_success();
            }
            Step::Application(_) => {
                // EAP-TLS carries no tunnelled data
                self.channel.ack();
            }
        }
        Ok(())
    }
}

impl MethodPlugin for TlsMethod {
    fn method_type(&self) -> Option<EapType> {
        Some(EapType::Tls)
    }

    fn check(&self, _status: &MethodStatus, frame: &Inbound<'_>) -> bool {
        self.channel.accepts(frame)
    }

    fn process(&mut self, status: &mut MethodStatus, frame: &Inbound<'_>, _req_id: u8) {
        if let Err(e) = self.handle(status, frame) {
            warn!(error = %e, "EAP-TLS failed");
            status.fail();
        }
    }

    fn build_response(
        &mut self,
        _status: &mut MethodStatus,
        req_id: u8,
        scratch: &mut ScratchBuffer,
        snap: &SnapHeader,
    ) -> FrameSlice {
        self.channel.build(req_id, scratch, snap)
    }

    fn get_key(&mut self, status: &mut MethodStatus) -> Option<Key> {
        self.keys.pop(status)
    }

    fn deinit(&mut self) {
        self.channel.reset();
        self.keys.clear();
    }
}
