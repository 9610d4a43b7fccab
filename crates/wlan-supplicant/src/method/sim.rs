//! EAP-SIM (RFC 4186), full authentication only

use eapol_proto::{EAP_HEADER_LEN, EapCode, EapType, EapView, SnapHeader};
use rand::Rng;
use tracing::{debug, info, warn};

use super::{
    Decision, Inbound, Key, KeyStash, KeyType, MethodError, MethodPlugin, MethodState,
    MethodStatus,
};
use crate::backend::{SimBackend, SimKeyInput};
use crate::config::SecuritySetup;
use crate::scratch::{EAP_OFFSET, FrameSlice, ScratchBuffer};

pub const SUBTYPE_START: u8 = 10;
pub const SUBTYPE_CHALLENGE: u8 = 11;
pub const SUBTYPE_NOTIFICATION: u8 = 12;
pub const SUBTYPE_CLIENT_ERROR: u8 = 14;

pub const AT_RAND: u8 = 1;
pub const AT_NONCE_MT: u8 = 7;
pub const AT_PERMANENT_ID_REQ: u8 = 10;
pub const AT_MAC: u8 = 11;
pub const AT_NOTIFICATION: u8 = 12;
pub const AT_ANY_ID_REQ: u8 = 13;
pub const AT_IDENTITY: u8 = 14;
pub const AT_VERSION_LIST: u8 = 15;
pub const AT_SELECTED_VERSION: u8 = 16;
pub const AT_FULLAUTH_ID_REQ: u8 = 17;
pub const AT_CLIENT_ERROR_CODE: u8 = 22;

pub const SIM_VERSION: u16 = 1;

pub const CLIENT_ERROR_UNABLE_TO_PROCESS: u16 = 0;
pub const CLIENT_ERROR_UNSUPPORTED_VERSION: u16 = 1;
pub const CLIENT_ERROR_INSUFFICIENT_CHALLENGES: u16 = 2;

/// Notification codes with this bit clear report failure
const NOTIFICATION_SUCCESS_BIT: u16 = 0x8000;

/// Subtype + 2 reserved octets
const SIM_HEADER_LEN: usize = 3;
const MAC_LEN: usize = 16;
const RAND_LEN: usize = 16;

/// One attribute of an EAP-SIM packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimAttribute<'a> {
    pub attr_type: u8,
    /// Value following the type and length octets
    pub value: &'a [u8],
    /// Offset of `value` from the start of the EAP packet
    pub offset: usize,
}

/// Parse the attributes following the subtype and reserved octets
pub fn parse_attributes(type_data: &[u8]) -> Result<Vec<SimAttribute<'_>>, MethodError> {
    let base = EAP_HEADER_LEN + 1;
    let mut pos = SIM_HEADER_LEN;
    let mut attrs = Vec::new();

    while pos < type_data.len() {
        if type_data.len() - pos < 2 {
            return Err(MethodError::Malformed("EAP-SIM attribute header"));
        }
        let len = type_data[pos + 1] as usize * 4;
        if len == 0 || pos + len > type_data.len() {
            return Err(MethodError::Malformed("EAP-SIM attribute length"));
        }
        attrs.push(SimAttribute {
            attr_type: type_data[pos],
            value: &type_data[pos + 2..pos + len],
            offset: base + pos + 2,
        });
        pos += len;
    }
    Ok(attrs)
}

fn find<'a>(attrs: &[SimAttribute<'a>], attr_type: u8) -> Option<SimAttribute<'a>> {
    attrs.iter().copied().find(|a| a.attr_type == attr_type)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Reply {
    Start { include_identity: bool },
    Challenge { k_aut: [u8; 16], sres: Vec<u8> },
    Notification,
    ClientError(u16),
}

pub struct SimMethod {
    backend: Box<dyn SimBackend>,
    identity: String,
    outer_identity: String,
    nonce_mt: Option<[u8; 16]>,
    version_list: Vec<u8>,
    identity_sent: bool,
    reply: Option<Reply>,
    keys: KeyStash,
}

impl SimMethod {
    pub fn new(setup: &SecuritySetup, backend: Box<dyn SimBackend>) -> Self {
        SimMethod {
            backend,
            identity: setup.identity.clone(),
            outer_identity: setup.outer_identity().to_string(),
            nonce_mt: None,
            version_list: Vec::new(),
            identity_sent: false,
            reply: None,
            keys: KeyStash::default(),
        }
    }

    fn client_error(&mut self, status: &mut MethodStatus, code: u16) {
        warn!(code, "EAP-SIM client error");
        self.reply = Some(Reply::ClientError(code));
        status.method_state = MethodState::MayCont;
        status.decision = Decision::Fail;
    }

    fn on_start(&mut self, status: &mut MethodStatus, attrs: &[SimAttribute<'_>]) {
        let Some(list) = find(attrs, AT_VERSION_LIST) else {
            return self.client_error(status, CLIENT_ERROR_UNABLE_TO_PROCESS);
        };
        let actual = list
            .value
            .get(..2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]) as usize)
            .unwrap_or(usize::MAX);
        let Some(versions) = list.value.get(2..2 + actual) else {
            return self.client_error(status, CLIENT_ERROR_UNABLE_TO_PROCESS);
        };
        let supported = versions
            .chunks_exact(2)
            .any(|v| u16::from_be_bytes([v[0], v[1]]) == SIM_VERSION);
        if !supported {
            return self.client_error(status, CLIENT_ERROR_UNSUPPORTED_VERSION);
        }

        let include_identity = [AT_PERMANENT_ID_REQ, AT_FULLAUTH_ID_REQ, AT_ANY_ID_REQ]
            .iter()
            .any(|&t| find(attrs, t).is_some());

        let mut nonce = [0u8; 16];
        rand::rng().fill(&mut nonce);
        self.nonce_mt = Some(nonce);
        self.version_list = versions.to_vec();
        self.identity_sent = include_identity;
        self.reply = Some(Reply::Start { include_identity });
        status.method_state = MethodState::Cont;
        debug!(include_identity, "EAP-SIM start");
    }

    fn on_challenge(
        &mut self,
        status: &mut MethodStatus,
        view: &EapView<'_>,
        attrs: &[SimAttribute<'_>],
    ) -> Result<(), MethodError> {
        let Some(nonce_mt) = self.nonce_mt else {
            self.client_error(status, CLIENT_ERROR_UNABLE_TO_PROCESS);
            return Ok(());
        };
        let (Some(rand_attr), Some(mac)) = (find(attrs, AT_RAND), find(attrs, AT_MAC)) else {
            self.client_error(status, CLIENT_ERROR_UNABLE_TO_PROCESS);
            return Ok(());
        };

        let rands = rand_attr.value.get(2..).unwrap_or_default();
        let count = rands.len() / RAND_LEN;
        if rands.len() % RAND_LEN != 0 || !(2..=3).contains(&count) {
            self.client_error(status, CLIENT_ERROR_INSUFFICIENT_CHALLENGES);
            return Ok(());
        }
        if mac.value.len() != 2 + MAC_LEN {
            return Err(MethodError::Malformed("AT_MAC"));
        }

        let mut kcs = Vec::with_capacity(count);
        let mut sres = Vec::with_capacity(count * 4);
        for chunk in rands.chunks_exact(RAND_LEN) {
            let mut challenge = [0u8; RAND_LEN];
            challenge.copy_from_slice(chunk);
            let triplet = self.backend.gsm_authenticate(&challenge)?;
            kcs.push(triplet.kc);
            sres.extend_from_slice(&triplet.sres);
        }

        let identity = if self.identity_sent {
            &self.identity
        } else {
            &self.outer_identity
        };
        let keys = self.backend.derive_keys(&SimKeyInput {
            identity: identity.as_bytes(),
            kcs: &kcs,
            nonce_mt: &nonce_mt,
            version_list: &self.version_list,
            selected_version: SIM_VERSION,
        })?;

        let mac_start = mac.offset + 2;
        let mut zeroed = view.as_bytes().to_vec();
        zeroed[mac_start..mac_start + MAC_LEN].fill(0);
        let expected = self.backend.mac(&keys.k_aut, &zeroed, &nonce_mt);
        if expected[..] != view.as_bytes()[mac_start..mac_start + MAC_LEN] {
            self.client_error(status, CLIENT_ERROR_UNABLE_TO_PROCESS);
            return Ok(());
        }

        info!(challenges = count, "EAP-SIM challenge verified");
        self.keys.stage(status, Key::new(KeyType::Pairwise, keys.msk));
        self.reply = Some(Reply::Challenge {
            k_aut: keys.k_aut,
            sres,
        });
        status.conditional_success();
        Ok(())
    }

    fn on_notification(&mut self, status: &mut MethodStatus, attrs: &[SimAttribute<'_>]) {
        let code = find(attrs, AT_NOTIFICATION)
            .and_then(|a| a.value.get(..2))
            .map(|b| u16::from_be_bytes([b[0], b[1]]));
        info!(code = ?code, "EAP-SIM notification");
        if code.is_none_or(|c| c & NOTIFICATION_SUCCESS_BIT == 0) {
            status.method_state = MethodState::MayCont;
            status.decision = Decision::Fail;
        }
        self.reply = Some(Reply::Notification);
    }

    fn handle(&mut self, status: &mut MethodStatus, view: &EapView<'_>) -> Result<(), MethodError> {
        let attrs = parse_attributes(view.type_data())?;
        match view.type_data()[0] {
            SUBTYPE_START => self.on_start(status, &attrs),
            SUBTYPE_CHALLENGE => self.on_challenge(status, view, &attrs)?,
            SUBTYPE_NOTIFICATION => self.on_notification(status, &attrs),
            other => {
                debug!(subtype = other, "unsupported EAP-SIM subtype");
                self.client_error(status, CLIENT_ERROR_UNABLE_TO_PROCESS);
            }
        }
        Ok(())
    }
}

impl MethodPlugin for SimMethod {
    fn method_type(&self) -> Option<EapType> {
        Some(EapType::Sim)
    }

    fn check(&self, _status: &MethodStatus, frame: &Inbound<'_>) -> bool {
        match frame {
            Inbound::Eap(view) => match view.code() {
                EapCode::Request => {
                    view.type_byte() == Some(EapType::Sim.as_u8())
                        && view.type_data().len() >= SIM_HEADER_LEN
                }
                EapCode::Failure => true,
                _ => false,
            },
            Inbound::EapolKey(_) => false,
        }
    }

    fn process(&mut self, status: &mut MethodStatus, frame: &Inbound<'_>, _req_id: u8) {
        let Inbound::Eap(view) = frame else {
            return;
        };
        if view.code() == EapCode::Failure {
            debug!("server failed the EAP-SIM exchange");
            self.reply = None;
            status.fail();
            return;
        }
        if let Err(e) = self.handle(status, view) {
            warn!(error = %e, "EAP-SIM failed");
            self.client_error(status, CLIENT_ERROR_UNABLE_TO_PROCESS);
        }
    }

    fn build_response(
        &mut self,
        _status: &mut MethodStatus,
        req_id: u8,
        scratch: &mut ScratchBuffer,
        snap: &SnapHeader,
    ) -> FrameSlice {
        let Some(reply) = self.reply.take() else {
            return FrameSlice::EMPTY;
        };
        let sim = Some(EapType::Sim.as_u8());

        match reply {
            Reply::Start { include_identity } => {
                let nonce = self.nonce_mt.unwrap_or_default();
                let mut writer = scratch.writer(snap, EapCode::Response, req_id, sim);
                writer
                    .put_u8(SUBTYPE_START)
                    .put_u16(0)
                    .put_u8(AT_NONCE_MT)
                    .put_u8(5)
                    .put_u16(0)
                    .put_slice(&nonce)
                    .put_u8(AT_SELECTED_VERSION)
                    .put_u8(1)
                    .put_u16(SIM_VERSION);
                if include_identity {
                    let identity = self.identity.as_bytes();
                    let total = (4 + identity.len()).div_ceil(4) * 4;
                    let Ok(words) = u8::try_from(total / 4) else {
                        warn!(len = identity.len(), "identity too long for AT_IDENTITY");
                        return FrameSlice::EMPTY;
                    };
                    writer
                        .put_u8(AT_IDENTITY)
                        .put_u8(words)
                        .put_u16(identity.len() as u16)
                        .put_slice(identity)
                        .put_zeros(total - 4 - identity.len());
                }
                writer.finish()
            }
            Reply::Challenge { k_aut, sres } => {
                let mut writer = scratch.writer(snap, EapCode::Response, req_id, sim);
                writer
                    .put_u8(SUBTYPE_CHALLENGE)
                    .put_u16(0)
                    .put_u8(AT_MAC)
                    .put_u8(5)
                    .put_u16(0);
                let mac_start = writer.eap_position();
                writer.put_zeros(MAC_LEN);
                let slice = writer.finish();

                let frame = scratch.frame_mut(slice);
                let mac = self.backend.mac(&k_aut, &frame[EAP_OFFSET..], &sres);
                let at = EAP_OFFSET + mac_start;
                frame[at..at + MAC_LEN].copy_from_slice(&mac);
                slice
            }
            Reply::Notification => {
                let mut writer = scratch.writer(snap, EapCode::Response, req_id, sim);
                writer.put_u8(SUBTYPE_NOTIFICATION).put_u16(0);
                writer.finish()
            }
            Reply::ClientError(code) => {
                let mut writer = scratch.writer(snap, EapCode::Response, req_id, sim);
                writer
                    .put_u8(SUBTYPE_CLIENT_ERROR)
                    .put_u16(0)
                    .put_u8(AT_CLIENT_ERROR_CODE)
                    .put_u8(1)
                    .put_u16(code);
                writer.finish()
            }
        }
    }

    fn get_key(&mut self, status: &mut MethodStatus) -> Option<Key> {
        self.keys.pop(status)
    }

    fn deinit(&mut self) {
        self.nonce_mt = None;
        self.reply = None;
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeSim, sim_challenge_request, sim_start_request};

    fn sim_setup() -> SecuritySetup {
        let mut setup = SecuritySetup::example();
        setup.identity = "1234567890@wlan.example.org".to_string();
        setup
    }

    fn exchange(method: &mut SimMethod, status: &mut MethodStatus, request: &[u8]) -> Vec<u8> {
        let view = EapView::parse(request).unwrap();
        let frame = Inbound::Eap(view);
        assert!(method.check(status, &frame));
        method.process(status, &frame, view.identifier());
        let mut scratch = ScratchBuffer::new();
        let slice = method.build_response(status, view.identifier(), &mut scratch, &SnapHeader::EAPOL);
        scratch.frame(slice)[EAP_OFFSET..].to_vec()
    }

    #[test]
    fn test_start_response_attributes() {
        let mut method = SimMethod::new(&sim_setup(), Box::new(FakeSim));
        let mut status = MethodStatus::new();

        let response = exchange(&mut method, &mut status, &sim_start_request(1, true));
        let view = EapView::parse(&response).unwrap();
        assert_eq!(view.type_data()[0], SUBTYPE_START);

        let attrs = parse_attributes(view.type_data()).unwrap();
        assert_eq!(find(&attrs, AT_NONCE_MT).unwrap().value.len(), 18);
        assert_eq!(find(&attrs, AT_SELECTED_VERSION).unwrap().value, &[0, 1]);
        let identity = find(&attrs, AT_IDENTITY).unwrap().value;
        let len = u16::from_be_bytes([identity[0], identity[1]]) as usize;
        assert_eq!(&identity[2..2 + len], b"1234567890@wlan.example.org");
    }

    #[test]
    fn test_unsupported_version_reports_client_error() {
        let mut method = SimMethod::new(&sim_setup(), Box::new(FakeSim));
        let mut status = MethodStatus::new();

        let mut request = sim_start_request(1, false);
        // rewrite the advertised version 1 into version 2
        let last = request.len() - 3;
        request[last] = 2;
        let response = exchange(&mut method, &mut status, &request);

        let view = EapView::parse(&response).unwrap();
        assert_eq!(view.type_data()[0], SUBTYPE_CLIENT_ERROR);
        let attrs = parse_attributes(view.type_data()).unwrap();
        assert_eq!(
            find(&attrs, AT_CLIENT_ERROR_CODE).unwrap().value,
            &CLIENT_ERROR_UNSUPPORTED_VERSION.to_be_bytes()
        );
        assert_eq!(status.decision, Decision::Fail);
    }

    #[test]
    fn test_challenge_verifies_and_answers() {
        let mut method = SimMethod::new(&sim_setup(), Box::new(FakeSim));
        let mut status = MethodStatus::new();

        let start = exchange(&mut method, &mut status, &sim_start_request(1, true));
        let start = EapView::parse(&start).unwrap();
        let attrs = parse_attributes(start.type_data()).unwrap();
        let nonce: [u8; 16] = find(&attrs, AT_NONCE_MT).unwrap().value[2..].try_into().unwrap();

        let response = exchange(&mut method, &mut status, &sim_challenge_request(2, &nonce));
        let view = EapView::parse(&response).unwrap();
        assert_eq!(view.type_data()[0], SUBTYPE_CHALLENGE);
        let attrs = parse_attributes(view.type_data()).unwrap();
        let mac = find(&attrs, AT_MAC).unwrap();
        assert_ne!(&mac.value[2..], &[0u8; 16]);

        assert_eq!(status.decision, Decision::CondSucc);
        assert_eq!(method.get_key(&mut status).unwrap().key_type, KeyType::Pairwise);
    }

    #[test]
    fn test_challenge_with_bad_mac_rejected() {
        let mut method = SimMethod::new(&sim_setup(), Box::new(FakeSim));
        let mut status = MethodStatus::new();
        exchange(&mut method, &mut status, &sim_start_request(1, true));

        let response = exchange(&mut method, &mut status, &sim_challenge_request(2, &[0xEE; 16]));
        let view = EapView::parse(&response).unwrap();
        assert_eq!(view.type_data()[0], SUBTYPE_CLIENT_ERROR);
        assert!(!status.is_key_available);
    }

    #[test]
    fn test_failure_after_start_fails_method() {
        let mut method = SimMethod::new(&sim_setup(), Box::new(FakeSim));
        let mut status = MethodStatus::new();
        exchange(&mut method, &mut status, &sim_start_request(1, true));

        let failure = eapol_proto::EapPacket::failure(1).to_bytes();
        let frame = Inbound::Eap(EapView::parse(&failure).unwrap());
        assert!(method.check(&status, &frame));
        method.process(&mut status, &frame, 1);
        assert_eq!(status.method_state, MethodState::Done);
        assert_eq!(status.decision, Decision::Fail);

        let mut scratch = ScratchBuffer::new();
        let slice = method.build_response(&mut status, 1, &mut scratch, &SnapHeader::EAPOL);
        assert!(slice.is_empty());
    }

    #[test]
    fn test_attribute_length_zero_rejected() {
        assert!(parse_attributes(&[SUBTYPE_START, 0, 0, AT_VERSION_LIST, 0]).is_err());
    }
}
