//! EAP-TTLSv0 (RFC 5281) with PAP as the inner method

use eapol_proto::{EapType, SnapHeader};
use tracing::{debug, warn};

use super::tls_common::{Step, TlsChannel};
use super::{Inbound, Key, KeyStash, KeyType, MethodError, MethodPlugin, MethodStatus};
use crate::backend::TlsBackend;
use crate::config::SecuritySetup;
use crate::scratch::{FrameSlice, ScratchBuffer};

pub const TTLS_KEY_LABEL: &str = "ttls keying material";
pub const TTLS_KEY_MATERIAL_LEN: usize = 64;

/// RADIUS attribute numbers reused as Diameter AVP codes
pub const AVP_USER_NAME: u32 = 1;
pub const AVP_USER_PASSWORD: u32 = 2;

const AVP_FLAG_MANDATORY: u8 = 0x40;
const AVP_HEADER_LEN: usize = 8;

/// Append one Diameter AVP, padded to a four-octet boundary
fn push_avp(out: &mut Vec<u8>, code: u32, value: &[u8]) {
    let len = (AVP_HEADER_LEN + value.len()) as u32;
    out.extend_from_slice(&code.to_be_bytes());
    out.push(AVP_FLAG_MANDATORY);
    out.extend_from_slice(&len.to_be_bytes()[1..]);
    out.extend_from_slice(value);
    out.resize(out.len() + (4 - value.len() % 4) % 4, 0);
}

/// User-Name and User-Password AVPs for the inner PAP exchange
pub fn pap_avps(username: &str, password: &str) -> Vec<u8> {
    let mut padded = password.as_bytes().to_vec();
    let target = padded.len().div_ceil(16).max(1) * 16;
    padded.resize(target, 0);

    let mut avps = Vec::new();
    push_avp(&mut avps, AVP_USER_NAME, username.as_bytes());
    push_avp(&mut avps, AVP_USER_PASSWORD, &padded);
    avps
}

pub struct TtlsMethod {
    channel: TlsChannel,
    keys: KeyStash,
    username: String,
    password: String,
}

impl TtlsMethod {
    pub fn new(setup: &SecuritySetup, backend: Box<dyn TlsBackend>) -> Self {
        TtlsMethod {
            channel: TlsChannel::new(EapType::Ttls, 0, backend),
            keys: KeyStash::default(),
            username: setup.username.clone(),
            password: setup.password.clone(),
        }
    }

    fn handle(&mut self, status: &mut MethodStatus, frame: &Inbound<'_>) -> Result<(), MethodError> {
        let Inbound::Eap(view) = frame else {
            return Ok(());
        };

        match self.channel.advance(status, view)? {
            Step::Pending => {}
            Step::Established(mut output) => {
                debug!(user = %self.username, "EAP-TTLS tunnel up, sending phase 2 credentials");
                let avps = pap_avps(&self.username, &self.password);
                output.extend_from_slice(&self.channel.backend.encrypt(&avps)?);
                self.channel.send(output);

                let msk = self
                    .channel
                    .backend
                    .export_keying_material(TTLS_KEY_LABEL, TTLS_KEY_MATERIAL_LEN)?;
                self.keys.stage(status, Key::new(KeyType::Pairwise, msk));
                if let Some(session) = self.channel.backend.session_blob() {
                    self.keys.stage(status, Key::new(KeyType::Session, session));
                }
                status.conditional_success();
            }
            Step::Application(data) => {
                debug!(len = data.len(), "ignoring tunnelled AVPs");
                self.channel.ack();
            }
        }
        Ok(())
    }
}

impl MethodPlugin for TtlsMethod {
    fn method_type(&self) -> Option<EapType> {
        Some(EapType::Ttls)
    }

    fn check(&self, _status: &MethodStatus, frame: &Inbound<'_>) -> bool {
        self.channel.accepts(frame)
    }

    fn process(&mut self, status: &mut MethodStatus, frame: &Inbound<'_>, _req_id: u8) {
        if let Err(e) = self.handle(status, frame) {
            warn!(error = %e, "EAP-TTLS failed");
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
