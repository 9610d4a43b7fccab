//! Cisco LEAP
//!
//! ```text
//! AP   -> STA  EAP-Request/LEAP   (8-byte peer challenge)
//! STA  -> AP   EAP-Response/LEAP  (24-byte peer response)
//! AP   -> STA  EAP-Success
//! STA  -> AP   EAP-Request/LEAP   (8-byte AP challenge)
//! AP   -> STA  EAP-Response/LEAP  (24-byte AP response)
//! ```
//!
//! The last two messages run after the peer engine has entered SUCCESS.

use eapol_proto::{EapCode, EapType, EapView, SnapHeader};
use rand::Rng;
use tracing::{debug, info, warn};

use super::{Decision, Inbound, Key, KeyStash, KeyType, MethodPlugin, MethodState, MethodStatus};
use crate::backend::{LeapBackend, LeapExchange};
use crate::config::SecuritySetup;
use crate::scratch::{FrameSlice, ScratchBuffer};

pub const LEAP_VERSION: u8 = 1;
pub const LEAP_CHALLENGE_LEN: usize = 8;
pub const LEAP_RESPONSE_LEN: usize = 24;

/// Version, unused, count
const LEAP_HEADER_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitChallenge,
    Responded,
    ChallengingAp,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outgoing {
    PeerResponse,
    ApChallenge,
}

/// Split LEAP Type-Data into (count-sized data, name)
fn parse_leap(type_data: &[u8]) -> Option<(&[u8], &[u8])> {
    if type_data.len() < LEAP_HEADER_LEN || type_data[0] != LEAP_VERSION {
        return None;
    }
    let count = type_data[2] as usize;
    let body = &type_data[LEAP_HEADER_LEN..];
    (body.len() >= count).then(|| body.split_at(count))
}

pub struct LeapMethod {
    backend: Box<dyn LeapBackend>,
    username: String,
    password: String,
    phase: Phase,
    exchange: LeapExchange,
    outgoing: Option<Outgoing>,
    keys: KeyStash,
}

impl LeapMethod {
    pub fn new(setup: &SecuritySetup, backend: Box<dyn LeapBackend>) -> Self {
        LeapMethod {
            backend,
            username: setup.username.clone(),
            password: setup.password.clone(),
            phase: Phase::AwaitChallenge,
            exchange: LeapExchange::default(),
            outgoing: None,
            keys: KeyStash::default(),
        }
    }

    fn on_challenge(&mut self, status: &mut MethodStatus, view: &EapView<'_>) {
        let Some((challenge, name)) = parse_leap(view.type_data()) else {
            warn!("malformed LEAP challenge");
            status.fail();
            return;
        };
        let Ok(challenge) = <[u8; LEAP_CHALLENGE_LEN]>::try_from(challenge) else {
            warn!(len = challenge.len(), "unexpected LEAP challenge length");
            status.fail();
            return;
        };
        debug!(ap = %String::from_utf8_lossy(name), "LEAP challenge received");

        self.exchange.peer_challenge = challenge;
        self.exchange.peer_response = self.backend.challenge_response(&challenge, &self.password);
        self.phase = Phase::Responded;
        self.outgoing = Some(Outgoing::PeerResponse);
        status.method_state = MethodState::Cont;
        status.decision = Decision::CondSucc;
    }

    fn on_success(&mut self, status: &mut MethodStatus) {
        rand::rng().fill(&mut self.exchange.ap_challenge);
        self.phase = Phase::ChallengingAp;
        self.outgoing = Some(Outgoing::ApChallenge);
        status.method_state = MethodState::Cont;
    }

    fn on_ap_response(&mut self, status: &mut MethodStatus, view: &EapView<'_>) {
        let response = parse_leap(view.type_data())
            .and_then(|(data, _)| <[u8; LEAP_RESPONSE_LEN]>::try_from(data).ok());
        let Some(response) = response else {
            warn!("malformed LEAP AP response");
            status.fail();
            return;
        };

        self.phase = Phase::Complete;
        if !self
            .backend
            .verify_ap_response(&self.exchange.ap_challenge, &response, &self.password)
        {
            warn!("LEAP AP response did not verify");
            status.fail();
            return;
        }

        self.exchange.ap_response = response;
        let session_key = self.backend.session_key(&self.exchange, &self.password);
        self.keys.stage(status, Key::new(KeyType::Pairwise, session_key));
        status.method_state = MethodState::Done;
        status.decision = Decision::UncondSucc;
        info!("LEAP mutual authentication complete");
    }
}

impl MethodPlugin for LeapMethod {
    fn method_type(&self) -> Option<EapType> {
        Some(EapType::Leap)
    }

    fn check(&self, _status: &MethodStatus, frame: &Inbound<'_>) -> bool {
        let Inbound::Eap(view) = frame else {
            return false;
        };
        let is_leap = view.type_byte() == Some(EapType::Leap.as_u8());
        match (view.code(), self.phase) {
            (EapCode::Request, Phase::AwaitChallenge) => is_leap,
            (EapCode::Success | EapCode::Failure, Phase::Responded) => true,
            (EapCode::Response, Phase::ChallengingAp) => is_leap,
            _ => false,
        }
    }

    fn process(&mut self, status: &mut MethodStatus, frame: &Inbound<'_>, _req_id: u8) {
        let Inbound::Eap(view) = frame else {
            return;
        };
        match view.code() {
            EapCode::Request => self.on_challenge(status, view),
            EapCode::Success => self.on_success(status),
            EapCode::Failure => status.fail(),
            EapCode::Response => self.on_ap_response(status, view),
        }
    }

    fn build_response(
        &mut self,
        _status: &mut MethodStatus,
        req_id: u8,
        scratch: &mut ScratchBuffer,
        snap: &SnapHeader,
    ) -> FrameSlice {
        let (code, data): (EapCode, &[u8]) = match self.outgoing.take() {
            Some(Outgoing::PeerResponse) => (EapCode::Response, &self.exchange.peer_response),
            Some(Outgoing::ApChallenge) => (EapCode::Request, &self.exchange.ap_challenge),
            None => return FrameSlice::EMPTY,
        };

        let mut writer = scratch.writer(snap, code, req_id, Some(EapType::Leap.as_u8()));
        writer
            .put_u8(LEAP_VERSION)
            .put_u8(0)
            .put_u8(data.len() as u8)
            .put_slice(data)
            .put_slice(self.username.as_bytes());
        writer.finish()
    }

    fn get_key(&mut self, status: &mut MethodStatus) -> Option<Key> {
        self.keys.pop(status)
    }

    fn deinit(&mut self) {
        self.phase = Phase::AwaitChallenge;
        self.outgoing = None;
        self.keys.clear();
    }
}
