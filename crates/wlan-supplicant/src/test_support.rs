//! Recording host and deterministic backends for unit tests

use eapol_proto::{EapPacket, Frame, MacAddr, PMK_LEN, PMKID_LEN, SnapHeader};

use crate::backend::{
    BackendError, GsmTriplet, LeapBackend, LeapExchange, SimBackend, SimKeyInput, SimKeys,
    TlsBackend, TlsProgress,
};
use crate::config::SecuritySetup;
use crate::host::{FrameCookie, HostCapabilities, SupplicantHost, TimeoutKind};
use crate::method::sim::{AT_MAC, AT_PERMANENT_ID_REQ, AT_RAND, AT_VERSION_LIST, SUBTYPE_CHALLENGE, SUBTYPE_START};
use crate::method::KeyType;
use crate::submachine::{Progress, SubMachine, SubMachineIo, SubMachineKind};

/// Wrap an EAP packet in an EAPOL frame with the default SNAP header
pub fn frame(packet: &EapPacket) -> Vec<u8> {
    packet.to_eapol_frame(&SnapHeader::EAPOL)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Sent(Vec<u8>),
    PairwiseKey(Vec<u8>),
    GroupKey(Vec<u8>),
    Pac(Vec<u8>),
    Session(Vec<u8>),
    TimerStarted(TimeoutKind, u32),
    TimerStopped(TimeoutKind),
    Abort,
    Done(FrameCookie),
    Pmkid([u8; PMKID_LEN]),
    WpsDone(Vec<u8>),
}

#[derive(Debug)]
pub struct RecordingHost {
    pub events: Vec<HostEvent>,
    pub capabilities: HostCapabilities,
}

impl Default for RecordingHost {
    fn default() -> Self {
        RecordingHost {
            events: Vec::new(),
            capabilities: HostCapabilities {
                install_pac: true,
                install_session: true,
                pmkid_store: true,
                wps_done: true,
            },
        }
    }
}

impl RecordingHost {
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.events
            .iter()
            .filter_map(|e| match e {
                HostEvent::Sent(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&HostEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl SupplicantHost for RecordingHost {
    fn send_packet(&mut self, frame: &[u8], _local: &MacAddr, _peer: &MacAddr) {
        self.events.push(HostEvent::Sent(frame.to_vec()));
    }

    fn install_pairwise_key(&mut self, _key_type: KeyType, key: &[u8], _rsc: &[u8; 8], _index: u8) {
        self.events.push(HostEvent::PairwiseKey(key.to_vec()));
    }

    fn install_group_key(&mut self, _key_type: KeyType, key: &[u8], _rsc: &[u8; 8], _index: u8) {
        self.events.push(HostEvent::GroupKey(key.to_vec()));
    }

    fn install_pac(&mut self, pac: &[u8]) {
        self.events.push(HostEvent::Pac(pac.to_vec()));
    }

    fn install_session(&mut self, session: &[u8]) {
        self.events.push(HostEvent::Session(session.to_vec()));
    }

    fn start_timer(&mut self, kind: TimeoutKind, duration_ms: u32) {
        self.events.push(HostEvent::TimerStarted(kind, duration_ms));
    }

    fn stop_timer(&mut self, kind: TimeoutKind) {
        self.events.push(HostEvent::TimerStopped(kind));
    }

    fn abort_procedure(&mut self) {
        self.events.push(HostEvent::Abort);
    }

    fn packet_processing_done(&mut self, cookie: FrameCookie) {
        self.events.push(HostEvent::Done(cookie));
    }

    fn pmkid_store(&mut self, _peer: &MacAddr, pmkid: &[u8; PMKID_LEN], _pmk: &[u8; PMK_LEN]) {
        self.events.push(HostEvent::Pmkid(*pmkid));
    }

    fn wps_done(&mut self, credentials: &[u8]) {
        self.events.push(HostEvent::WpsDone(credentials.to_vec()));
    }

    fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }
}

/// TLS stand-in: `rounds` handshake messages, the last one establishes
#[derive(Debug)]
pub struct FakeTls {
    rounds: usize,
    seen: usize,
    fail: bool,
}

impl FakeTls {
    pub fn new(rounds: usize) -> Self {
        FakeTls {
            rounds,
            seen: 0,
            fail: false,
        }
    }

    /// Every handshake message is answered with an alert
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl TlsBackend for FakeTls {
    fn start(&mut self) -> Result<Vec<u8>, BackendError> {
        self.seen = 0;
        Ok(b"client-hello".to_vec())
    }

    fn handshake(&mut self, _input: &[u8]) -> Result<TlsProgress, BackendError> {
        if self.fail {
            return Err(BackendError::Tls("handshake_failure".to_string()));
        }
        self.seen += 1;
        if self.seen >= self.rounds {
            Ok(TlsProgress {
                output: b"client-finished".to_vec(),
                established: true,
            })
        } else {
            Ok(TlsProgress {
                output: b"client-kex".to_vec(),
                established: false,
            })
        }
    }

    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, BackendError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&mut self, records: &[u8]) -> Result<Vec<u8>, BackendError> {
        Ok(records.to_vec())
    }

    fn export_keying_material(&mut self, _label: &str, len: usize) -> Result<Vec<u8>, BackendError> {
        Ok(vec![0x4D; len])
    }

    fn session_blob(&self) -> Option<Vec<u8>> {
        Some(b"tls-session".to_vec())
    }

    fn crypto_binding(&mut self, request: &[u8]) -> Result<Vec<u8>, BackendError> {
        Ok(request.to_vec())
    }
}

/// LEAP stand-in whose response is the challenge repeated three times
#[derive(Debug, Default)]
pub struct FakeLeap;

impl FakeLeap {
    pub fn response_for(challenge: &[u8; 8]) -> [u8; 24] {
        let mut out = [0u8; 24];
        for chunk in out.chunks_exact_mut(8) {
            chunk.copy_from_slice(challenge);
        }
        out
    }
}

impl LeapBackend for FakeLeap {
    fn challenge_response(&mut self, challenge: &[u8; 8], _password: &str) -> [u8; 24] {
        FakeLeap::response_for(challenge)
    }

    fn verify_ap_response(
        &mut self,
        challenge: &[u8; 8],
        response: &[u8; 24],
        _password: &str,
    ) -> bool {
        FakeLeap::response_for(challenge) == *response
    }

    fn session_key(&mut self, exchange: &LeapExchange, _password: &str) -> Vec<u8> {
        let mut key = exchange.peer_challenge.to_vec();
        key.extend_from_slice(&exchange.ap_challenge);
        key
    }
}

/// SIM stand-in with keys derived from RAND and NONCE_MT only
#[derive(Debug, Default)]
pub struct FakeSim;

impl FakeSim {
    fn triplet(rand: &[u8; 16]) -> GsmTriplet {
        let mut sres = [0u8; 4];
        let mut kc = [0u8; 8];
        sres.copy_from_slice(&rand[..4]);
        kc.copy_from_slice(&rand[8..]);
        GsmTriplet { sres, kc }
    }

    fn k_aut(kcs: &[[u8; 8]], nonce_mt: &[u8; 16]) -> [u8; 16] {
        let mut k_aut = *nonce_mt;
        for kc in kcs {
            for (i, b) in k_aut.iter_mut().enumerate() {
                *b ^= kc[i % 8];
            }
        }
        k_aut
    }

    fn fold(k_aut: &[u8; 16], message: &[u8], extra: &[u8]) -> [u8; 16] {
        let mut out = *k_aut;
        for (i, &b) in message.iter().chain(extra).enumerate() {
            let slot = i % 16;
            out[slot] = out[slot].wrapping_mul(31).wrapping_add(b);
        }
        out
    }
}

impl SimBackend for FakeSim {
    fn gsm_authenticate(&mut self, rand: &[u8; 16]) -> Result<GsmTriplet, BackendError> {
        Ok(FakeSim::triplet(rand))
    }

    fn derive_keys(&mut self, input: &SimKeyInput<'_>) -> Result<SimKeys, BackendError> {
        let k_aut = FakeSim::k_aut(input.kcs, input.nonce_mt);
        Ok(SimKeys {
            k_aut,
            msk: k_aut.repeat(4),
        })
    }

    fn mac(&mut self, k_aut: &[u8; 16], message: &[u8], extra: &[u8]) -> [u8; 16] {
        FakeSim::fold(k_aut, message, extra)
    }
}

/// EAP-Request/SIM/Start advertising version 1
///
/// AT_VERSION_LIST is always the last attribute.
pub fn sim_start_request(id: u8, identity_requested: bool) -> Vec<u8> {
    let mut data = vec![SUBTYPE_START, 0, 0];
    if identity_requested {
        data.extend_from_slice(&[AT_PERMANENT_ID_REQ, 1, 0, 0]);
    }
    data.extend_from_slice(&[AT_VERSION_LIST, 2, 0, 2, 0, 1, 0, 0]);
    EapPacket::request_raw(id, 18, data).to_bytes()
}

/// EAP-Request/SIM/Challenge with two RANDs and a MAC keyed for `nonce_mt`
pub fn sim_challenge_request(id: u8, nonce_mt: &[u8; 16]) -> Vec<u8> {
    let rands = [[0x11u8; 16], [0x22u8; 16]];
    let mut data = vec![SUBTYPE_CHALLENGE, 0, 0, AT_RAND, 9, 0, 0];
    for rand in &rands {
        data.extend_from_slice(rand);
    }
    data.extend_from_slice(&[AT_MAC, 5, 0, 0]);
    data.extend_from_slice(&[0; 16]);

    let mut bytes = EapPacket::request_raw(id, 18, data).to_bytes();
    let kcs: Vec<[u8; 8]> = rands.iter().map(|r| FakeSim::triplet(r).kc).collect();
    let mac = FakeSim::fold(&FakeSim::k_aut(&kcs, nonce_mt), &bytes, nonce_mt);
    let at = bytes.len() - 16;
    bytes[at..].copy_from_slice(&mac);
    bytes
}

/// 4-way handshake stand-in: answers every key frame and completes after
/// `frames` of them
#[derive(Debug)]
pub struct FakeHandshake {
    pub frames: usize,
    pub seen: usize,
    pub defer: bool,
}

impl FakeHandshake {
    pub fn boxed(_setup: &SecuritySetup) -> Box<dyn SubMachine> {
        Box::new(FakeHandshake {
            frames: 2,
            seen: 0,
            defer: false,
        })
    }
}

impl SubMachine for FakeHandshake {
    fn kind(&self) -> SubMachineKind {
        SubMachineKind::WpaPersonal
    }

    fn process_frame(&mut self, frame: &Frame<'_>, io: &mut SubMachineIo<'_>) -> Progress {
        if io.pmk.is_none() {
            return Progress::Failed;
        }
        self.seen += 1;
        io.host
            .send_packet(frame.as_bytes(), &io.setup.local_mac, &io.setup.peer_mac);
        if self.defer {
            Progress::Deferred
        } else if self.seen >= self.frames {
            Progress::Complete
        } else {
            Progress::Continue
        }
    }

    fn timer_expired(&mut self, _io: &mut SubMachineIo<'_>) -> Progress {
        Progress::Failed
    }
}
