//! EAP peer state machine (RFC 4137 Section 4)
//!
//! Each external event runs the machine to quiescence: the action of the
//! current state executes and picks the next state, until the machine rests
//! in IDLE, SUCCESS, FAILURE or DISABLED.
//!
//! Two extensions to RFC 4137 are implemented:
//!
//! - An EAP-Success whose identifier is not older than the last response
//!   is accepted as soon as the method no longer reports FAIL. LEAP depends
//!   on this, since it finishes its mutual authentication after the Success.
//! - A 6-byte request for the selected TLS-framed method while a fragmented
//!   response has unsent windows is taken as a fragment acknowledgement and
//!   answered with the next window without involving the method.

mod fragment;

use eapol_proto::{EAP_HEADER_LEN, EapCode, EapType, EapView, Frame, FrameBody, TlsFlags};
use tracing::{debug, info, trace, warn};

use crate::backend::MethodBackends;
use crate::config::SecuritySetup;
use crate::host::SupplicantHost;
use crate::method::{Decision, EapMethod, Inbound, Key, KeyType, MethodState, MethodStatus};
use crate::scratch::{FrameSlice, ScratchBuffer};
use fragment::Transmitter;

/// Upper bound on transitions per event; reaching it is a bug
const MAX_TRANSITIONS: usize = 64;

/// Length of an EAP-TLS acknowledgement request (header, type, flags)
const TLS_ACK_LEN: usize = EAP_HEADER_LEN + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Uninitialise,
    Disabled,
    Initialise,
    Idle,
    Received,
    Discard,
    SendResponse,
    Method,
    GetMethod,
    Identity,
    Notification,
    Retransmit,
    Failure,
    Success,
}

/// What a delivered frame led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerOutcome {
    /// Authentication continues
    Pending,
    Success,
    /// An EAPOL-Key frame arrived after success; the 4-way handshake takes
    /// over this and all further key frames
    HandshakeTakeover,
    Failure,
    /// The engine is disabled
    Ignored,
}

/// Everything the engine borrows from its session while it runs
pub struct PeerIo<'a> {
    pub host: &'a mut dyn SupplicantHost,
    pub scratch: &'a mut ScratchBuffer,
    pub setup: &'a SecuritySetup,
    pub backends: &'a mut MethodBackends,
}

impl PeerIo<'_> {
    fn transmit(&mut self, slice: FrameSlice) {
        self.host.send_packet(
            self.scratch.frame(slice),
            &self.setup.local_mac,
            &self.setup.peer_mac,
        );
    }
}

/// Per-event scratch state of the transition loop
struct Event<'f> {
    pending: Option<Frame<'f>>,
    current: Option<Inbound<'f>>,
    key_frame: bool,
}

pub struct EapPeer {
    state: PeerState,

    // reset for every received frame
    rx_req: bool,
    rx_key: bool,
    rx_success: bool,
    rx_failure: bool,
    req_id: u8,
    req_method: Option<u8>,
    req_len: usize,
    req_tls_start: bool,

    // kept across frames
    selected_method: Option<EapType>,
    last_id: i32,
    method: EapMethod,
    tx: Transmitter,
    eap_key_data: Option<Vec<u8>>,
    abort_signalled: bool,
}

impl EapPeer {
    pub fn new() -> Self {
        let mut peer = EapPeer {
            state: PeerState::Uninitialise,
            rx_req: false,
            rx_key: false,
            rx_success: false,
            rx_failure: false,
            req_id: 0,
            req_method: None,
            req_len: 0,
            req_tls_start: false,
            selected_method: None,
            last_id: -1,
            method: EapMethod::null(),
            tx: Transmitter::default(),
            eap_key_data: None,
            abort_signalled: false,
        };
        peer.set_state(PeerState::Initialise);
        peer.initialise();
        peer.set_state(PeerState::Idle);
        peer
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    /// Identifier of the last request answered, `-1` before the first
    pub fn last_id(&self) -> i32 {
        self.last_id
    }

    pub fn selected_method(&self) -> Option<EapType> {
        self.selected_method
    }

    pub fn method_status(&self) -> &MethodStatus {
        &self.method.status
    }

    pub fn eap_key_data(&self) -> Option<&[u8]> {
        self.eap_key_data.as_deref()
    }

    /// Hand the pairwise key material to the caller, once
    pub fn take_eap_key_data(&mut self) -> Option<Vec<u8>> {
        self.eap_key_data.take()
    }

    /// Deliver an EAPOL frame (EAP packet or EAPOL-Key)
    pub fn receive(&mut self, frame: &Frame<'_>, io: &mut PeerIo<'_>) -> PeerOutcome {
        match self.state {
            PeerState::Disabled | PeerState::Uninitialise => return PeerOutcome::Ignored,
            PeerState::Failure => return PeerOutcome::Failure,
            PeerState::Success => return self.after_success(frame, io),
            _ => {}
        }

        let mut event = Event {
            pending: Some(*frame),
            current: None,
            key_frame: frame.is_key(),
        };
        self.run(io, &mut event);

        match self.state {
            PeerState::Success if event.key_frame => PeerOutcome::HandshakeTakeover,
            PeerState::Success => PeerOutcome::Success,
            PeerState::Failure => PeerOutcome::Failure,
            _ => PeerOutcome::Pending,
        }
    }

    /// Force FAILURE from outside (timeouts, session abort)
    ///
    /// Returns whether `abort_procedure` has been signalled by the engine.
    pub fn abort(&mut self, io: &mut PeerIo<'_>) -> bool {
        match self.state {
            PeerState::Disabled | PeerState::Uninitialise => false,
            PeerState::Failure => self.abort_signalled,
            _ => {
                self.set_state(PeerState::Failure);
                self.enter_failure(io);
                true
            }
        }
    }

    pub fn disable(&mut self) {
        self.method.deinit();
        self.tx.reset();
        self.set_state(PeerState::Disabled);
    }

    fn set_state(&mut self, next: PeerState) {
        trace!(from = ?self.state, to = ?next, "EAP peer transition");
        self.state = next;
    }

    fn run(&mut self, io: &mut PeerIo<'_>, event: &mut Event<'_>) {
        for _ in 0..MAX_TRANSITIONS {
            let next = match self.state {
                PeerState::Idle => self.idle(event),
                PeerState::Received => self.received(event),
                PeerState::Discard => Some(PeerState::Idle),
                PeerState::Method => self.run_method(io, event),
                PeerState::GetMethod => self.get_method(io),
                PeerState::Identity => self.identity(io),
                PeerState::Notification => self.notification(io, event),
                PeerState::Retransmit => self.retransmit(io),
                PeerState::SendResponse => self.send_response(io),
                PeerState::Initialise => {
                    self.initialise();
                    Some(PeerState::Idle)
                }
                PeerState::Failure => {
                    self.enter_failure(io);
                    None
                }
                PeerState::Success => {
                    self.enter_success(io, event);
                    None
                }
                PeerState::Uninitialise | PeerState::Disabled => None,
            };
            match next {
                Some(next) => self.set_state(next),
                None => return,
            }
        }
        warn!(state = ?self.state, "EAP peer did not settle");
    }

    fn initialise(&mut self) {
        self.selected_method = None;
        self.last_id = -1;
        self.method.deinit();
        self.method = EapMethod::null();
        self.tx.reset();
        self.eap_key_data = None;
        self.abort_signalled = false;
    }

    fn idle(&mut self, event: &Event<'_>) -> Option<PeerState> {
        if event.pending.is_some() {
            return Some(PeerState::Received);
        }
        let status = &self.method.status;
        match (status.method_state, status.decision) {
            (MethodState::Done, Decision::UncondSucc) => Some(PeerState::Success),
            (MethodState::Done, Decision::Fail) => Some(PeerState::Failure),
            _ => None,
        }
    }

    /// Decode the frame into the short-term variables
    fn parse_frame<'f>(&mut self, frame: Frame<'f>) -> Option<Inbound<'f>> {
        self.rx_req = false;
        self.rx_key = false;
        self.rx_success = false;
        self.rx_failure = false;
        self.req_method = None;
        self.req_len = 0;
        self.req_tls_start = false;

        match frame.body {
            FrameBody::Eap(body) => {
                let view = match EapView::parse(body) {
                    Ok(view) => view,
                    Err(e) => {
                        debug!(error = %e, "discarding malformed EAP packet");
                        return None;
                    }
                };
                self.req_id = view.identifier();
                self.req_len = view.length();
                match view.code() {
                    EapCode::Request => {
                        self.rx_req = true;
                        self.req_method = view.type_byte();
                        self.req_tls_start = view
                            .type_data()
                            .first()
                            .is_some_and(|&flags| TlsFlags::from_u8(flags).start());
                    }
                    EapCode::Success => self.rx_success = true,
                    EapCode::Failure => self.rx_failure = true,
                    EapCode::Response => {
                        debug!(id = view.identifier(), "discarding EAP-Response");
                        return None;
                    }
                }
                Some(Inbound::Eap(view))
            }
            FrameBody::Key(body) => {
                self.rx_key = true;
                Some(Inbound::EapolKey(body))
            }
            FrameBody::Control(_) | FrameBody::Wapi(_) => None,
        }
    }

    fn received(&mut self, event: &mut Event<'_>) -> Option<PeerState> {
        let frame = event.pending.take()?;
        let Some(inbound) = self.parse_frame(frame) else {
            return Some(PeerState::Discard);
        };
        event.current = Some(inbound);

        let req_id = i32::from(self.req_id);
        let status = self.method.status;
        let selected = self.selected_method.map(EapType::as_u8);
        let new_request = self.rx_req && req_id != self.last_id;

        let next = if self.rx_success && req_id >= self.last_id && status.decision != Decision::Fail {
            PeerState::Success
        } else if status.method_state != MethodState::Cont
            && ((self.rx_failure && status.decision != Decision::UncondSucc)
                || (self.rx_success && status.decision == Decision::Fail))
            && req_id == self.last_id
        {
            PeerState::Failure
        } else if new_request
            && selected.is_none()
            && !matches!(
                self.req_method.and_then(EapType::from_u8),
                Some(EapType::Identity | EapType::Notification)
            )
        {
            PeerState::GetMethod
        } else if new_request
            && selected.is_none()
            && self.req_method == Some(EapType::Identity.as_u8())
        {
            PeerState::Identity
        } else if new_request
            && self.req_method == Some(EapType::Notification.as_u8())
            && status.allow_notifications
        {
            PeerState::Notification
        } else if self.rx_req && req_id == self.last_id {
            PeerState::Retransmit
        } else if new_request
            && self.req_method == selected
            && self.is_fragment_ack()
        {
            PeerState::SendResponse
        } else if (new_request
            && selected.is_some()
            && self.req_method == selected
            && status.method_state != MethodState::Done)
            || ((self.rx_success || self.rx_failure) && req_id == self.last_id)
        {
            PeerState::Method
        } else if self.rx_key && status.is_eapol_key_hint {
            PeerState::Method
        } else {
            PeerState::Discard
        };

        debug!(
            id = self.req_id,
            method = ?self.req_method,
            last_id = self.last_id,
            next = ?next,
            "EAP frame received"
        );
        Some(next)
    }

    /// A bare acknowledgement for our outstanding fragmented response
    fn is_fragment_ack(&self) -> bool {
        self.selected_method.is_some_and(EapType::is_tls_framed)
            && self.req_len == TLS_ACK_LEN
            && !self.req_tls_start
            && self.tx.has_pending_fragments()
    }

    fn run_method(&mut self, io: &mut PeerIo<'_>, event: &Event<'_>) -> Option<PeerState> {
        let Some(inbound) = event.current else {
            return Some(PeerState::Discard);
        };
        if !self.method.check(&inbound) {
            debug!(method = ?self.selected_method, "method rejected frame");
            return Some(PeerState::Discard);
        }

        self.method.process(&inbound, self.req_id);
        let status = self.method.status;
        if status.method_state == MethodState::Done && status.decision == Decision::Fail {
            return Some(PeerState::Failure);
        }

        self.install_keys(io);

        let response = self
            .method
            .build_response(self.req_id, io.scratch, &io.setup.snap_header);
        if response.is_empty() {
            return Some(PeerState::Discard);
        }
        self.tx.load(response);
        Some(PeerState::SendResponse)
    }

    fn install_keys(&mut self, io: &mut PeerIo<'_>) {
        while self.method.status.is_key_available {
            let Some(key) = self.method.get_key() else {
                break;
            };
            self.install_key(io, key);
        }
    }

    fn install_key(&mut self, io: &mut PeerIo<'_>, key: Key) {
        debug!(key_type = ?key.key_type, len = key.data.len(), "installing key");
        match key.key_type {
            KeyType::Pairwise => {
                io.host
                    .install_pairwise_key(key.key_type, &key.data, &key.rsc, key.index);
                self.eap_key_data = Some(key.data);
            }
            KeyType::Group => {
                io.host
                    .install_group_key(key.key_type, &key.data, &key.rsc, key.index);
            }
            KeyType::Pac => io.host.install_pac(&key.data),
            KeyType::Session => io.host.install_session(&key.data),
        }
    }

    fn get_method(&mut self, io: &mut PeerIo<'_>) -> Option<PeerState> {
        let configured = io.setup.eap_method();

        if let Some(kind) = configured
            && self.req_method == Some(kind.eap_type().as_u8())
            && kind.is_enabled()
        {
            match EapMethod::create(kind, io.setup, io.backends) {
                Ok(method) => {
                    info!(method = %kind, "EAP method selected");
                    self.method.deinit();
                    self.method = method;
                    self.selected_method = Some(kind.eap_type());
                    return Some(PeerState::Method);
                }
                Err(e) => {
                    warn!(method = %kind, error = %e, "cannot start EAP method");
                    return Some(PeerState::Failure);
                }
            }
        }

        let desired = configured.map(|kind| kind.eap_type().as_u8()).unwrap_or(0);
        debug!(requested = ?self.req_method, desired, "sending Legacy-Nak");
        let mut writer = io.scratch.writer(
            &io.setup.snap_header,
            EapCode::Response,
            self.req_id,
            Some(EapType::Nak.as_u8()),
        );
        writer.put_u8(desired);
        self.tx.load(writer.finish());
        Some(PeerState::SendResponse)
    }

    fn identity(&mut self, io: &mut PeerIo<'_>) -> Option<PeerState> {
        let identity = io.setup.outer_identity();
        debug!(identity, "answering identity request");
        let mut writer = io.scratch.writer(
            &io.setup.snap_header,
            EapCode::Response,
            self.req_id,
            Some(EapType::Identity.as_u8()),
        );
        writer.put_slice(identity.as_bytes());
        self.tx.load(writer.finish());
        Some(PeerState::SendResponse)
    }

    fn notification(&mut self, io: &mut PeerIo<'_>, event: &Event<'_>) -> Option<PeerState> {
        if let Some(Inbound::Eap(view)) = event.current {
            info!(text = %String::from_utf8_lossy(view.type_data()), "EAP notification");
        }
        let writer = io.scratch.writer(
            &io.setup.snap_header,
            EapCode::Response,
            self.req_id,
            Some(EapType::Notification.as_u8()),
        );
        self.tx.load(writer.finish());
        Some(PeerState::SendResponse)
    }

    fn retransmit(&mut self, io: &mut PeerIo<'_>) -> Option<PeerState> {
        let Some(last) = self.tx.last_fragment() else {
            return Some(PeerState::Discard);
        };
        debug!(id = self.req_id, "retransmitting last response");
        io.transmit(last);
        Some(PeerState::Idle)
    }

    fn send_response(&mut self, io: &mut PeerIo<'_>) -> Option<PeerState> {
        self.last_id = i32::from(self.req_id);
        match self.tx.next_fragment(
            io.scratch,
            &io.setup.snap_header,
            self.req_id,
            io.setup.max_fragment_size,
        ) {
            Some(slice) => io.transmit(slice),
            None => warn!(id = self.req_id, "no response to send"),
        }
        Some(PeerState::Idle)
    }

    fn enter_failure(&mut self, io: &mut PeerIo<'_>) {
        if self.abort_signalled {
            return;
        }
        self.abort_signalled = true;
        warn!(method = ?self.selected_method, "EAP authentication failed");
        io.host.abort_procedure();
    }

    fn enter_success(&mut self, io: &mut PeerIo<'_>, event: &Event<'_>) {
        info!(method = ?self.selected_method, "EAP authentication succeeded");
        if let Some(inbound @ Inbound::Eap(_)) = event.current {
            self.continue_after_success(io, inbound);
        }
    }

    fn after_success(&mut self, frame: &Frame<'_>, io: &mut PeerIo<'_>) -> PeerOutcome {
        match frame.body {
            FrameBody::Key(_) => PeerOutcome::HandshakeTakeover,
            FrameBody::Eap(body) => {
                if let Ok(view) = EapView::parse(body) {
                    self.req_id = view.identifier();
                    self.continue_after_success(io, Inbound::Eap(view));
                }
                PeerOutcome::Success
            }
            _ => PeerOutcome::Success,
        }
    }

    /// Let a method that is still in CONT finish its exchange after SUCCESS
    fn continue_after_success(&mut self, io: &mut PeerIo<'_>, inbound: Inbound<'_>) {
        if self.method.status.method_state != MethodState::Cont || !self.method.check(&inbound) {
            return;
        }
        self.method.process(&inbound, self.req_id);
        self.install_keys(io);
        let slice = self
            .method
            .build_response(self.req_id, io.scratch, &io.setup.snap_header);
        if !slice.is_empty() {
            io.transmit(slice);
        }
    }
}

impl Default for EapPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EapPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EapPeer")
            .field("state", &self.state)
            .field("selected_method", &self.selected_method)
            .field("last_id", &self.last_id)
            .field("method", &self.method)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EapMethodKind, SecurityType};
    use crate::test_support::{FakeLeap, FakeTls, HostEvent, RecordingHost, frame};
    use eapol_proto::{EapPacket, MacAddr, SnapHeader};

    struct Harness {
        peer: EapPeer,
        host: RecordingHost,
        scratch: ScratchBuffer,
        setup: SecuritySetup,
        backends: MethodBackends,
    }

    impl Harness {
        fn new(kind: EapMethodKind) -> Self {
            let mut setup = SecuritySetup::new(
                SecurityType::Eap(kind),
                MacAddr([2, 0, 0, 0, 0, 1]),
                MacAddr([2, 0, 0, 0, 0, 2]),
            );
            setup.identity = "alice@example.org".to_string();
            setup.username = "alice".to_string();
            setup.password = "pw".to_string();
            setup.client_cert = b"cert".to_vec();
            setup.private_key = b"key".to_vec();
            setup.max_fragment_size = 64;

            Harness {
                peer: EapPeer::new(),
                host: RecordingHost::default(),
                scratch: ScratchBuffer::new(),
                setup,
                backends: MethodBackends::new()
                    .with_tls(|_| Box::new(FakeTls::new(1)))
                    .with_leap(|_| Box::new(FakeLeap::default())),
            }
        }

        fn deliver(&mut self, bytes: &[u8]) -> PeerOutcome {
            let frame = Frame::parse(bytes).unwrap();
            let mut io = PeerIo {
                host: &mut self.host,
                scratch: &mut self.scratch,
                setup: &self.setup,
                backends: &mut self.backends,
            };
            self.peer.receive(&frame, &mut io)
        }

        fn sent(&self) -> Vec<Vec<u8>> {
            self.host.sent_frames()
        }
    }

    #[test]
    fn test_starts_idle() {
        let peer = EapPeer::new();
        assert_eq!(peer.state(), PeerState::Idle);
        assert_eq!(peer.last_id(), -1);
        assert_eq!(peer.selected_method(), None);
    }

    #[test]
    fn test_identity_request() {
        let mut h = Harness::new(EapMethodKind::Tls);
        let outcome = h.deliver(&frame(&EapPacket::identity_request(2, "")));
        assert_eq!(outcome, PeerOutcome::Pending);
        assert_eq!(h.peer.state(), PeerState::Idle);
        assert_eq!(h.peer.last_id(), 2);

        let sent = h.sent();
        assert_eq!(sent.len(), 1);
        let eap = EapView::parse(&sent[0][12..]).unwrap();
        assert_eq!(eap.code(), EapCode::Response);
        assert_eq!(eap.identifier(), 2);
        assert_eq!(eap.eap_type(), Some(EapType::Identity));
        assert_eq!(eap.type_data(), b"alice");
    }

    #[test]
    fn test_nak_for_unconfigured_method() {
        let mut h = Harness::new(EapMethodKind::Tls);
        h.deliver(&frame(&EapPacket::request_raw(3, 4, vec![16])));

        let sent = h.sent();
        let eap = EapView::parse(&sent[0][12..]).unwrap();
        assert_eq!(eap.eap_type(), Some(EapType::Nak));
        assert_eq!(eap.type_data(), &[13]);
        assert_eq!(h.peer.selected_method(), None);
    }

    #[test]
    fn test_retransmit_is_byte_identical() {
        let mut h = Harness::new(EapMethodKind::Tls);
        let request = frame(&EapPacket::identity_request(5, ""));
        h.deliver(&request);
        h.deliver(&request);

        let sent = h.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
        assert_eq!(h.peer.last_id(), 5);
    }

    #[test]
    fn test_retransmit_without_history_discards() {
        let mut h = Harness::new(EapMethodKind::Tls);
        // last_id starts at -1, so id 255 is new; a Success at -1 cannot match
        h.deliver(&frame(&EapPacket::failure(0)));
        assert!(h.sent().is_empty());
        assert_eq!(h.peer.state(), PeerState::Idle);
    }

    #[test]
    fn test_get_method_swaps_in_method() {
        let mut h = Harness::new(EapMethodKind::Tls);
        h.deliver(&frame(&EapPacket::request_raw(1, 13, vec![0x20])));

        assert_eq!(h.peer.selected_method(), Some(EapType::Tls));
        let sent = h.sent();
        let eap = EapView::parse(&sent[0][12..]).unwrap();
        assert_eq!(eap.eap_type(), Some(EapType::Tls));
        assert_eq!(&eap.type_data()[1..], b"client-hello");
    }

    #[test]
    fn test_notification_answered() {
        let mut h = Harness::new(EapMethodKind::Tls);
        h.deliver(&frame(&EapPacket::request_raw(9, 2, b"maintenance at noon".to_vec())));

        let sent = h.sent();
        let eap = EapView::parse(&sent[0][12..]).unwrap();
        assert_eq!(eap.eap_type(), Some(EapType::Notification));
        assert!(eap.type_data().is_empty());
    }

    #[test]
    fn test_failure_signals_abort_once() {
        let mut h = Harness::new(EapMethodKind::Tls);
        h.deliver(&frame(&EapPacket::identity_request(1, "")));
        assert_eq!(h.deliver(&frame(&EapPacket::failure(1))), PeerOutcome::Failure);
        assert_eq!(h.deliver(&frame(&EapPacket::failure(1))), PeerOutcome::Failure);

        let aborts = h
            .host
            .events
            .iter()
            .filter(|e| matches!(e, HostEvent::Abort))
            .count();
        assert_eq!(aborts, 1);
    }

    #[test]
    fn test_leap_early_success_and_mutual_auth() {
        let mut h = Harness::new(EapMethodKind::Leap);
        let mut challenge = vec![1, 0, 8];
        challenge.extend_from_slice(&[0x33; 8]);
        h.deliver(&frame(&EapPacket::request_raw(1, 17, challenge)));
        assert_eq!(h.peer.last_id(), 1);

        let outcome = h.deliver(&frame(&EapPacket::success(1)));
        assert_eq!(outcome, PeerOutcome::Success);
        assert_eq!(h.peer.state(), PeerState::Success);

        // peer challenge goes out as an EAP-Request
        let sent = h.sent();
        assert_eq!(sent.len(), 2);
        let request = EapView::parse(&sent[1][12..]).unwrap();
        assert_eq!(request.code(), EapCode::Request);
        let ap_challenge: [u8; 8] = request.type_data()[3..11].try_into().unwrap();

        let mut answer = vec![1, 0, 24];
        answer.extend_from_slice(&FakeLeap::response_for(&ap_challenge));
        let response = EapPacket::new(EapCode::Response, 1, Some(EapType::Leap), answer);
        assert_eq!(h.deliver(&frame(&response)), PeerOutcome::Success);

        assert_eq!(h.peer.method_status().decision, Decision::UncondSucc);
        assert!(h.peer.eap_key_data().is_some());
        assert!(h
            .host
            .events
            .iter()
            .any(|e| matches!(e, HostEvent::PairwiseKey(_))));
    }

    #[test]
    fn test_key_frame_after_success_requests_takeover() {
        let mut h = Harness::new(EapMethodKind::Leap);
        let mut challenge = vec![1, 0, 8];
        challenge.extend_from_slice(&[0x33; 8]);
        h.deliver(&frame(&EapPacket::request_raw(1, 17, challenge)));
        h.deliver(&frame(&EapPacket::success(1)));

        let mut key = SnapHeader::EAPOL.as_bytes().to_vec();
        key.extend_from_slice(&[1, 3, 0, 2, 2, 0]);
        assert_eq!(h.deliver(&key), PeerOutcome::HandshakeTakeover);
    }

    #[test]
    fn test_disabled_peer_ignores_frames() {
        let mut h = Harness::new(EapMethodKind::Tls);
        h.peer.disable();
        assert_eq!(
            h.deliver(&frame(&EapPacket::identity_request(1, ""))),
            PeerOutcome::Ignored
        );
        assert!(h.sent().is_empty());
    }
}
