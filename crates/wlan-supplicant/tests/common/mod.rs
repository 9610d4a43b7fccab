//! Shared fixtures for the session integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use eapol_proto::{EapPacket, EapView, Frame, FrameBody, PMK_LEN, PMKID_LEN};
use wlan_supplicant::{
    BackendError, Collaborators, EapMethodKind, FrameCookie, GsmTriplet, HostCapabilities, KeyType,
    LeapBackend, LeapExchange, MacAddr, MethodBackends, Progress, SecuritySetup, SecurityType,
    SimBackend, SimKeyInput, SimKeys, SnapHeader, SubMachine, SubMachineIo, SubMachineKind,
    SupplicantHost, TimeoutKind, TlsBackend, TlsProgress,
};

pub const LOCAL: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
pub const PEER: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0xAA]);

/// Install a test subscriber once so `RUST_LOG=debug` shows engine traces
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Sent(Vec<u8>),
    PairwiseKey(Vec<u8>),
    GroupKey(Vec<u8>),
    Pac(Vec<u8>),
    Session(Vec<u8>),
    TimerStarted(TimeoutKind),
    TimerStopped(TimeoutKind),
    Abort,
    Done(u64),
    Pmkid([u8; PMKID_LEN]),
}

/// Host whose event log stays readable after the host moved into a session
#[derive(Debug, Clone)]
pub struct RecordingHost {
    log: Arc<Mutex<Vec<HostEvent>>>,
    pub capabilities: HostCapabilities,
}

impl RecordingHost {
    pub fn new() -> Self {
        RecordingHost {
            log: Arc::new(Mutex::new(Vec::new())),
            capabilities: HostCapabilities {
                install_pac: true,
                install_session: true,
                pmkid_store: true,
                wps_done: true,
            },
        }
    }

    fn push(&self, event: HostEvent) {
        self.log.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HostEvent::Sent(bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }

    pub fn completed(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HostEvent::Done(cookie) => Some(cookie),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &HostEvent) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

impl SupplicantHost for RecordingHost {
    fn send_packet(&mut self, frame: &[u8], local: &MacAddr, peer: &MacAddr) {
        assert_eq!(*local, LOCAL);
        assert_eq!(*peer, PEER);
        self.push(HostEvent::Sent(frame.to_vec()));
    }

    fn install_pairwise_key(&mut self, _key_type: KeyType, key: &[u8], _rsc: &[u8; 8], _index: u8) {
        self.push(HostEvent::PairwiseKey(key.to_vec()));
    }

    fn install_group_key(&mut self, _key_type: KeyType, key: &[u8], _rsc: &[u8; 8], _index: u8) {
        self.push(HostEvent::GroupKey(key.to_vec()));
    }

    fn install_pac(&mut self, pac: &[u8]) {
        self.push(HostEvent::Pac(pac.to_vec()));
    }

    fn install_session(&mut self, session: &[u8]) {
        self.push(HostEvent::Session(session.to_vec()));
    }

    fn start_timer(&mut self, kind: TimeoutKind, _duration_ms: u32) {
        self.push(HostEvent::TimerStarted(kind));
    }

    fn stop_timer(&mut self, kind: TimeoutKind) {
        self.push(HostEvent::TimerStopped(kind));
    }

    fn abort_procedure(&mut self) {
        self.push(HostEvent::Abort);
    }

    fn packet_processing_done(&mut self, cookie: FrameCookie) {
        self.push(HostEvent::Done(cookie.0));
    }

    fn pmkid_store(&mut self, peer: &MacAddr, pmkid: &[u8; PMKID_LEN], _pmk: &[u8; PMK_LEN]) {
        assert_eq!(*peer, PEER);
        self.push(HostEvent::Pmkid(*pmkid));
    }

    fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }
}

/// TLS stand-in answering Start with `hello` and establishing after one
/// server flight
#[derive(Debug)]
pub struct ScriptedTls {
    pub hello: Vec<u8>,
}

impl TlsBackend for ScriptedTls {
    fn start(&mut self) -> Result<Vec<u8>, BackendError> {
        Ok(self.hello.clone())
    }

    fn handshake(&mut self, input: &[u8]) -> Result<TlsProgress, BackendError> {
        if input.starts_with(b"alert") {
            return Err(BackendError::Tls("fatal alert".to_string()));
        }
        Ok(TlsProgress {
            output: b"client-finished".to_vec(),
            established: true,
        })
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
        Some(b"resumable".to_vec())
    }
}

#[derive(Debug, Default)]
pub struct EchoLeap;

impl EchoLeap {
    pub fn response_for(challenge: &[u8; 8]) -> [u8; 24] {
        let mut out = [0u8; 24];
        for (i, b) in out.iter_mut().enumerate() {
            *b = challenge[i % 8] ^ (i as u8);
        }
        out
    }
}

impl LeapBackend for EchoLeap {
    fn challenge_response(&mut self, challenge: &[u8; 8], _password: &str) -> [u8; 24] {
        EchoLeap::response_for(challenge)
    }

    fn verify_ap_response(&mut self, challenge: &[u8; 8], response: &[u8; 24], _password: &str) -> bool {
        EchoLeap::response_for(challenge) == *response
    }

    fn session_key(&mut self, exchange: &LeapExchange, _password: &str) -> Vec<u8> {
        let mut key = exchange.peer_response[..16].to_vec();
        key.extend_from_slice(&exchange.ap_response[..16]);
        key
    }
}

/// SIM stand-in; keys depend on RAND and NONCE_MT only
#[derive(Debug, Default)]
pub struct TableSim;

impl TableSim {
    pub fn triplet(rand: &[u8; 16]) -> GsmTriplet {
        let mut sres = [0u8; 4];
        let mut kc = [0u8; 8];
        sres.copy_from_slice(&rand[12..]);
        kc.copy_from_slice(&rand[..8]);
        GsmTriplet { sres, kc }
    }

    pub fn k_aut(kcs: &[[u8; 8]], nonce_mt: &[u8; 16]) -> [u8; 16] {
        let mut k_aut = *nonce_mt;
        for kc in kcs {
            for (i, b) in k_aut.iter_mut().enumerate() {
                *b = b.wrapping_add(kc[i % 8]);
            }
        }
        k_aut
    }

    pub fn mac(k_aut: &[u8; 16], message: &[u8], extra: &[u8]) -> [u8; 16] {
        let mut out = *k_aut;
        for (i, &b) in message.iter().chain(extra).enumerate() {
            let slot = i % 16;
            out[slot] = out[slot].wrapping_mul(33) ^ b;
        }
        out
    }
}

impl SimBackend for TableSim {
    fn gsm_authenticate(&mut self, rand: &[u8; 16]) -> Result<GsmTriplet, BackendError> {
        Ok(TableSim::triplet(rand))
    }

    fn derive_keys(&mut self, input: &SimKeyInput<'_>) -> Result<SimKeys, BackendError> {
        let k_aut = TableSim::k_aut(input.kcs, input.nonce_mt);
        Ok(SimKeys {
            k_aut,
            msk: k_aut.repeat(4),
        })
    }

    fn mac(&mut self, k_aut: &[u8; 16], message: &[u8], extra: &[u8]) -> [u8; 16] {
        TableSim::mac(k_aut, message, extra)
    }
}

/// 4-way handshake stand-in; answers each key frame, completes on the second
#[derive(Debug)]
pub struct StubHandshake {
    seen: usize,
    defer: bool,
}

impl StubHandshake {
    pub fn immediate(_setup: &SecuritySetup) -> Box<dyn SubMachine> {
        Box::new(StubHandshake {
            seen: 0,
            defer: false,
        })
    }

    /// Completes every frame through `packet_processing_done`
    pub fn deferring(_setup: &SecuritySetup) -> Box<dyn SubMachine> {
        Box::new(StubHandshake {
            seen: 0,
            defer: true,
        })
    }
}

impl SubMachine for StubHandshake {
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
        } else if self.seen >= 2 {
            Progress::Complete
        } else {
            Progress::Continue
        }
    }

    fn timer_expired(&mut self, _io: &mut SubMachineIo<'_>) -> Progress {
        Progress::Failed
    }
}

pub fn eap_setup(kind: EapMethodKind) -> SecuritySetup {
    let mut setup = SecuritySetup::new(SecurityType::Eap(kind), LOCAL, PEER);
    setup.identity = "alice@example.org".to_string();
    setup.username = "alice".to_string();
    setup.password = "hunter2".to_string();
    setup.client_cert = b"client-cert".to_vec();
    setup.private_key = b"client-key".to_vec();
    setup.max_fragment_size = 64;
    setup.pmk_caching = true;
    setup
}

pub fn wpa_personal_setup() -> SecuritySetup {
    let mut setup = SecuritySetup::new(SecurityType::WpaPersonal, LOCAL, PEER);
    setup.pmk = vec![0x5A; PMK_LEN];
    setup
}

pub fn collaborators(hello_len: usize) -> Collaborators {
    let hello: Vec<u8> = (0..hello_len).map(|i| (i % 200) as u8).collect();
    Collaborators::new()
        .with_backends(
            MethodBackends::new()
                .with_tls(move |_| {
                    Box::new(ScriptedTls {
                        hello: hello.clone(),
                    })
                })
                .with_leap(|_| Box::new(EchoLeap))
                .with_sim(|_| Box::new(TableSim)),
        )
        .with_four_way(StubHandshake::immediate)
}

pub fn eap_frame(packet: &EapPacket) -> Vec<u8> {
    packet.to_eapol_frame(&SnapHeader::EAPOL)
}

pub fn key_frame() -> Vec<u8> {
    let mut bytes = SnapHeader::EAPOL.as_bytes().to_vec();
    bytes.extend_from_slice(&[0x02, 0x03, 0x00, 0x05, 0x02, 0x01, 0x0A, 0x00, 0x10]);
    bytes
}

/// EAP view of a transmitted frame
pub fn eap_of(frame: &[u8]) -> EapView<'_> {
    match Frame::parse(frame).unwrap().body {
        FrameBody::Eap(body) => EapView::parse(body).unwrap(),
        other => panic!("expected an EAP frame, got {:?}", other),
    }
}

pub fn sim_start_request(id: u8) -> EapPacket {
    // AT_PERMANENT_ID_REQ, AT_VERSION_LIST { 1 }
    let data = vec![10, 0, 0, 10, 1, 0, 0, 15, 2, 0, 2, 0, 1, 0, 0];
    EapPacket::request_raw(id, 18, data)
}

pub fn sim_challenge_request(id: u8, nonce_mt: &[u8; 16]) -> Vec<u8> {
    let rands = [[0xA1u8; 16], [0xB2u8; 16], [0xC3u8; 16]];
    // AT_RAND: 4 header + 48
    let mut data = vec![11, 0, 0, 1, 13, 0, 0];
    for rand in &rands {
        data.extend_from_slice(rand);
    }
    data.extend_from_slice(&[11, 5, 0, 0]);
    data.extend_from_slice(&[0; 16]);

    let mut eap = EapPacket::request_raw(id, 18, data).to_bytes();
    let kcs: Vec<[u8; 8]> = rands.iter().map(|r| TableSim::triplet(r).kc).collect();
    let mac = TableSim::mac(&TableSim::k_aut(&kcs, nonce_mt), &eap, nonce_mt);
    let at = eap.len() - 16;
    eap[at..].copy_from_slice(&mac);

    let mut frame = SnapHeader::EAPOL.as_bytes().to_vec();
    frame.extend_from_slice(&[1, 0]);
    frame.extend_from_slice(&(eap.len() as u16).to_be_bytes());
    frame.extend_from_slice(&eap);
    frame
}
