//! EAP-FASTv1 (RFC 4851)
//!
//! Phase 2 is a TLV exchange inside the tunnel. The inner EAP conversation
//! supports Identity and EAP-GTC; any other inner method is NAKed in favour
//! of GTC.

use eapol_proto::{EapCode, EapPacket, EapType, EapView, SnapHeader};
use tracing::{debug, info, warn};

use super::tls_common::{Step, TlsChannel};
use super::{
    Decision, Inbound, Key, KeyStash, KeyType, MethodError, MethodPlugin, MethodState, MethodStatus,
};
use crate::backend::TlsBackend;
use crate::config::SecuritySetup;
use crate::scratch::{FrameSlice, ScratchBuffer};

pub const FAST_KEY_LABEL: &str = "EAP-FAST MSK";
pub const FAST_KEY_MATERIAL_LEN: usize = 64;
pub const FAST_VERSION: u8 = 1;

const TLV_MANDATORY: u16 = 0x8000;
const TLV_TYPE_MASK: u16 = 0x3FFF;
const TLV_HEADER_LEN: usize = 4;

pub const TLV_RESULT: u16 = 3;
pub const TLV_NAK: u16 = 4;
pub const TLV_EAP_PAYLOAD: u16 = 9;
pub const TLV_INTERMEDIATE_RESULT: u16 = 10;
pub const TLV_PAC: u16 = 11;
pub const TLV_CRYPTO_BINDING: u16 = 12;

const PAC_ATTR_ACKNOWLEDGEMENT: u16 = 8;

pub const RESULT_SUCCESS: u16 = 1;
pub const RESULT_FAILURE: u16 = 2;

/// One TLV of a tunnelled payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub mandatory: bool,
    pub tlv_type: u16,
    pub value: &'a [u8],
}

/// Split a decrypted phase 2 payload into TLVs
pub fn parse_tlvs(mut data: &[u8]) -> Result<Vec<Tlv<'_>>, MethodError> {
    let mut tlvs = Vec::new();
    while !data.is_empty() {
        if data.len() < TLV_HEADER_LEN {
            return Err(MethodError::Malformed("EAP-FAST TLV header"));
        }
        let raw_type = u16::from_be_bytes([data[0], data[1]]);
        let len = u16::from_be_bytes([data[2], data[3]]) as usize;
        if data.len() < TLV_HEADER_LEN + len {
            return Err(MethodError::Malformed("EAP-FAST TLV length"));
        }
        tlvs.push(Tlv {
            mandatory: raw_type & TLV_MANDATORY != 0,
            tlv_type: raw_type & TLV_TYPE_MASK,
            value: &data[TLV_HEADER_LEN..TLV_HEADER_LEN + len],
        });
        data = &data[TLV_HEADER_LEN + len..];
    }
    Ok(tlvs)
}

pub fn push_tlv(out: &mut Vec<u8>, mandatory: bool, tlv_type: u16, value: &[u8]) {
    let raw_type = if mandatory {
        tlv_type | TLV_MANDATORY
    } else {
        tlv_type
    };
    out.extend_from_slice(&raw_type.to_be_bytes());
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value);
}

fn status_value(value: &[u8]) -> Option<u16> {
    (value.len() >= 2).then(|| u16::from_be_bytes([value[0], value[1]]))
}

pub struct FastMethod {
    channel: TlsChannel,
    keys: KeyStash,
    username: String,
    password: String,
}

impl FastMethod {
    pub fn new(setup: &SecuritySetup, backend: Box<dyn TlsBackend>) -> Self {
        FastMethod {
            channel: TlsChannel::new(EapType::Fast, FAST_VERSION, backend),
            keys: KeyStash::default(),
            username: setup.username.clone(),
            password: setup.password.clone(),
        }
    }

    /// Answer an inner EAP request carried in an EAP-Payload TLV
    fn inner_response(&self, packet: &[u8]) -> Result<Vec<u8>, MethodError> {
        let inner = EapView::parse(packet)?;
        if inner.code() != EapCode::Request {
            return Err(MethodError::Malformed("EAP-FAST inner packet"));
        }
        let id = inner.identifier();
        let response = match inner.eap_type() {
            Some(EapType::Identity) => EapPacket::identity_response(id, &self.username),
            Some(EapType::GenericTokenCard) => EapPacket::new(
                EapCode::Response,
                id,
                Some(EapType::GenericTokenCard),
                self.password.as_bytes().to_vec(),
            ),
            other => {
                debug!(requested = ?other, "NAKing inner method in favour of GTC");
                EapPacket::nak(id, EapType::GenericTokenCard)
            }
        };
        Ok(response.to_bytes())
    }

    /// Build the TLV reply to one phase 2 payload
    fn phase2(&mut self, status: &mut MethodStatus, payload: &[u8]) -> Result<Vec<u8>, MethodError> {
        let mut reply = Vec::new();

        for tlv in parse_tlvs(payload)? {
            match tlv.tlv_type {
                TLV_RESULT => {
                    let result = status_value(tlv.value)
                        .ok_or(MethodError::Malformed("EAP-FAST Result TLV"))?;
                    push_tlv(&mut reply, true, TLV_RESULT, &result.to_be_bytes());
                    if result == RESULT_SUCCESS {
                        info!("EAP-FAST phase 2 succeeded");
                        let msk = self
                            .channel
                            .backend
                            .export_keying_material(FAST_KEY_LABEL, FAST_KEY_MATERIAL_LEN)?;
                        self.keys.stage(status, Key::new(KeyType::Pairwise, msk));
                        status.conditional_success();
                    } else {
                        warn!(result, "EAP-FAST phase 2 failed");
                        status.method_state = MethodState::MayCont;
                        status.decision = Decision::Fail;
                    }
                }
                TLV_INTERMEDIATE_RESULT => {
                    let result = status_value(tlv.value).unwrap_or(RESULT_FAILURE);
                    push_tlv(&mut reply, true, TLV_INTERMEDIATE_RESULT, &result.to_be_bytes());
                }
                TLV_EAP_PAYLOAD => {
                    let response = self.inner_response(tlv.value)?;
                    push_tlv(&mut reply, true, TLV_EAP_PAYLOAD, &response);
                }
                TLV_CRYPTO_BINDING => {
                    let binding = self.channel.backend.crypto_binding(tlv.value)?;
                    push_tlv(&mut reply, true, TLV_CRYPTO_BINDING, &binding);
                }
                TLV_PAC => {
                    info!(len = tlv.value.len(), "EAP-FAST PAC provisioned");
                    self.keys
                        .stage(status, Key::new(KeyType::Pac, tlv.value.to_vec()));
                    let mut ack = Vec::new();
                    push_tlv(&mut ack, false, PAC_ATTR_ACKNOWLEDGEMENT, &RESULT_SUCCESS.to_be_bytes());
                    push_tlv(&mut reply, true, TLV_PAC, &ack);
                }
                other if tlv.mandatory => {
                    debug!(tlv_type = other, "NAKing unsupported mandatory TLV");
                    let mut nak = vec![0, 0, 0, 0];
                    nak.extend_from_slice(&other.to_be_bytes());
                    push_tlv(&mut reply, true, TLV_NAK, &nak);
                }
                other => debug!(tlv_type = other, "skipping optional TLV"),
            }
        }
        Ok(reply)
    }

    fn handle(&mut self, status: &mut MethodStatus, frame: &Inbound<'_>) -> Result<(), MethodError> {
        let Inbound::Eap(view) = frame else {
            return Ok(());
        };

        match self.channel.advance(status, view)? {
            Step::Pending => {}
            Step::Established(output) => {
                debug!("EAP-FAST tunnel established");
                self.channel.send(output);
            }
            Step::Application(payload) => {
                let reply = self.phase2(status, &payload)?;
                if reply.is_empty() {
                    self.channel.ack();
                } else {
                    let records = self.channel.backend.encrypt(&reply)?;
                    self.channel.send(records);
                }
            }
        }
        Ok(())
    }
}

impl MethodPlugin for FastMethod {
    fn method_type(&self) -> Option<EapType> {
        Some(EapType::Fast)
    }

    fn check(&self, _status: &MethodStatus, frame: &Inbound<'_>) -> bool {
        self.channel.accepts(frame)
    }

    fn process(&mut self, status: &mut MethodStatus, frame: &Inbound<'_>, _req_id: u8) {
        if let Err(e) = self.handle(status, frame) {
            warn!(error = %e, "EAP-FAST failed");
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
