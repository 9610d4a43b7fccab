//! Security session orchestrator
//!
//! One [`SecurityContext`] exists per link. It admits frames from the
//! transport into a bounded FIFO, processes at most one of them at a time,
//! and routes each to the single active sub-machine: the EAP peer, the
//! WPA-Personal 4-way handshake, WAPI or WPS.
//!
//! # Frame lifecycle
//!
//! ```text
//! process_packet ──► queue (max 10) ──► dispatch ──► Done ──► packet_processing_done(cookie)
//!        │                                  │
//!        └─ malformed / full / aborted      └─ Deferred: completed later through
//!           completed immediately              SecurityContext::packet_processing_done
//! ```

use std::collections::VecDeque;

use eapol_proto::{EapolHeader, EapolType, Frame, FrameBody, PMK_LEN, Protocol, derive_pmkid};
use tracing::{debug, info, trace, warn};

use crate::backend::MethodBackends;
use crate::config::{EapMethodKind, SecuritySetup, SecurityType, SetupError};
use crate::host::{FrameCookie, SupplicantHost, TimeoutKind};
use crate::peer::{EapPeer, PeerIo, PeerOutcome};
use crate::scratch::ScratchBuffer;
use crate::submachine::{Progress, SubMachine, SubMachineFactory, SubMachineIo, SubMachineKind};

/// Frames admitted but not yet completed, including the one in flight
pub const MAX_QUEUED_FRAMES: usize = 10;

/// Everything besides the host that a session may need
#[derive(Default)]
pub struct Collaborators {
    pub backends: MethodBackends,
    /// WPA-Personal 4-way handshake, also run after every EAP method
    pub four_way: Option<Box<dyn SubMachineFactory>>,
    pub wapi: Option<Box<dyn SubMachineFactory>>,
    pub wps: Option<Box<dyn SubMachineFactory>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backends(mut self, backends: MethodBackends) -> Self {
        self.backends = backends;
        self
    }

    pub fn with_four_way<F>(mut self, factory: F) -> Self
    where
        F: SubMachineFactory + 'static,
    {
        self.four_way = Some(Box::new(factory));
        self
    }

    pub fn with_wapi<F>(mut self, factory: F) -> Self
    where
        F: SubMachineFactory + 'static,
    {
        self.wapi = Some(Box::new(factory));
        self
    }

    pub fn with_wps<F>(mut self, factory: F) -> Self
    where
        F: SubMachineFactory + 'static,
    {
        self.wps = Some(Box::new(factory));
        self
    }

    fn factory(&mut self, kind: SubMachineKind) -> Option<&mut Box<dyn SubMachineFactory>> {
        match kind {
            SubMachineKind::WpaPersonal => self.four_way.as_mut(),
            SubMachineKind::Wapi => self.wapi.as_mut(),
            SubMachineKind::Wps => self.wps.as_mut(),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("backends", &self.backends)
            .field("four_way", &self.four_way.is_some())
            .field("wapi", &self.wapi.is_some())
            .field("wps", &self.wps.is_some())
            .finish()
    }
}

/// The one protocol machine currently bound to the link
enum ActiveSubMachine {
    None,
    Eap(Box<EapPeer>),
    WpaPersonal(Box<dyn SubMachine>),
    Wapi(Box<dyn SubMachine>),
    Wps(Box<dyn SubMachine>),
}

impl ActiveSubMachine {
    fn sub_machine_mut(&mut self) -> Option<&mut Box<dyn SubMachine>> {
        match self {
            ActiveSubMachine::WpaPersonal(m)
            | ActiveSubMachine::Wapi(m)
            | ActiveSubMachine::Wps(m) => Some(m),
            ActiveSubMachine::None | ActiveSubMachine::Eap(_) => None,
        }
    }

    fn kind(&self) -> Option<SubMachineKind> {
        match self {
            ActiveSubMachine::WpaPersonal(_) => Some(SubMachineKind::WpaPersonal),
            ActiveSubMachine::Wapi(_) => Some(SubMachineKind::Wapi),
            ActiveSubMachine::Wps(_) => Some(SubMachineKind::Wps),
            ActiveSubMachine::None | ActiveSubMachine::Eap(_) => None,
        }
    }

    fn wrap(kind: SubMachineKind, machine: Box<dyn SubMachine>) -> Self {
        match kind {
            SubMachineKind::WpaPersonal => ActiveSubMachine::WpaPersonal(machine),
            SubMachineKind::Wapi => ActiveSubMachine::Wapi(machine),
            SubMachineKind::Wps => ActiveSubMachine::Wps(machine),
        }
    }
}

struct QueuedFrame {
    cookie: FrameCookie,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    Done,
    Deferred,
}

pub struct SecurityContext<H: SupplicantHost> {
    setup: SecuritySetup,
    host: H,
    collaborators: Collaborators,
    active: ActiveSubMachine,
    queue: VecDeque<QueuedFrame>,
    in_flight: Option<FrameCookie>,
    processing_in_progress: bool,
    eapol_start_attempts: u32,
    eapol_start_active: bool,
    aborted: bool,
    scratch: ScratchBuffer,
    pmk: Option<[u8; PMK_LEN]>,
}

impl<H: SupplicantHost> SecurityContext<H> {
    /// Validate `setup` against the host and collaborators and create the
    /// session
    ///
    /// No host callback is invoked.
    pub fn init(
        setup: &SecuritySetup,
        host: H,
        collaborators: Collaborators,
    ) -> Result<Self, SetupError> {
        setup.validate()?;
        check_capabilities(setup, &host)?;
        check_collaborators(setup, &collaborators)?;

        debug!(
            security_type = %setup.security_type,
            local = %setup.local_mac,
            peer = %setup.peer_mac,
            "security session created"
        );

        Ok(SecurityContext {
            setup: setup.clone(),
            host,
            collaborators,
            active: ActiveSubMachine::None,
            queue: VecDeque::with_capacity(MAX_QUEUED_FRAMES),
            in_flight: None,
            processing_in_progress: false,
            eapol_start_attempts: 0,
            eapol_start_active: false,
            aborted: false,
            scratch: ScratchBuffer::new(),
            pmk: setup.pmk().copied(),
        })
    }

    pub fn setup(&self) -> &SecuritySetup {
        &self.setup
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The EAP peer, while an EAP exchange is the active sub-machine
    pub fn eap_peer(&self) -> Option<&EapPeer> {
        match &self.active {
            ActiveSubMachine::Eap(peer) => Some(peer),
            _ => None,
        }
    }

    pub fn active_sub_machine(&self) -> Option<SubMachineKind> {
        self.active.kind()
    }

    /// Frames admitted and not yet completed
    pub fn pending_frames(&self) -> usize {
        self.queue.len() + usize::from(self.in_flight.is_some())
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn pmk(&self) -> Option<&[u8; PMK_LEN]> {
        self.pmk.as_ref()
    }

    /// Arm the security-association timer and, where the security type
    /// uses it, send the first EAPOL-Start
    pub fn start(&mut self) {
        info!(security_type = %self.setup.security_type, "starting security association");
        self.host.start_timer(
            TimeoutKind::SecurityAssociation,
            self.setup.association_timeout_ms,
        );
        if self.setup.security_type.uses_eapol_start() {
            self.send_eapol_start();
        }
    }

    /// Admit a frame from the transport
    ///
    /// `cookie` is handed back through `packet_processing_done` once the
    /// frame is no longer referenced, on every path.
    pub fn process_packet(&mut self, cookie: FrameCookie, bytes: &[u8]) {
        if self.aborted {
            debug!(cookie = cookie.0, "session aborted, dropping frame");
            self.host.packet_processing_done(cookie);
            return;
        }
        if let Err(e) = Frame::parse(bytes) {
            debug!(cookie = cookie.0, error = %e, "dropping malformed frame");
            self.host.packet_processing_done(cookie);
            return;
        }
        if self.pending_frames() >= MAX_QUEUED_FRAMES {
            warn!(cookie = cookie.0, "frame queue full, dropping newest frame");
            self.host.packet_processing_done(cookie);
            return;
        }

        self.queue.push_back(QueuedFrame {
            cookie,
            bytes: bytes.to_vec(),
        });
        self.drain();
    }

    /// Complete the frame in flight and continue with the next queued one
    pub fn packet_processing_done(&mut self) {
        if !self.processing_in_progress {
            debug!("no frame in flight");
            return;
        }
        self.finish_in_flight();
        self.drain();
    }

    pub fn timer_expired(&mut self, kind: TimeoutKind) {
        if self.aborted {
            trace!(?kind, "timer expired after abort");
            return;
        }
        match kind {
            TimeoutKind::SecurityAssociation => {
                warn!("security association timed out");
                self.abort();
            }
            TimeoutKind::EapolStart => {
                if !self.eapol_start_active {
                    return;
                }
                if self.eapol_start_attempts >= self.setup.max_eapol_start_attempts {
                    warn!(
                        attempts = self.eapol_start_attempts,
                        "no response to EAPOL-Start"
                    );
                    self.abort();
                } else {
                    self.send_eapol_start();
                }
            }
            other => {
                let Some(active) = self.active.kind() else {
                    debug!(kind = ?other, "timer without owner");
                    return;
                };
                if active.timeout_kind() != other {
                    debug!(kind = ?other, ?active, "timer not owned by active sub-machine");
                    return;
                }
                let Some(machine) = self.active.sub_machine_mut() else {
                    return;
                };
                let mut io = SubMachineIo {
                    host: &mut self.host,
                    setup: &self.setup,
                    pmk: self.pmk.as_ref(),
                };
                let progress = machine.timer_expired(&mut io);
                self.on_progress(active, progress);
            }
        }
    }

    /// Record the PMK and, with PMK caching on, hand its PMKID to the host
    pub fn store_pmk(&mut self, pmk: &[u8; PMK_LEN]) {
        self.pmk = Some(*pmk);
        debug!("PMK stored");

        if cfg!(feature = "pmk-cache") && self.setup.pmk_caching {
            let pmkid = derive_pmkid(pmk, &self.setup.peer_mac, &self.setup.local_mac);
            self.host.pmkid_store(&self.setup.peer_mac, &pmkid, pmk);
        }
    }

    /// Tear the session down and give the host back
    ///
    /// Every frame still held is completed.
    pub fn deinit(mut self) -> H {
        match std::mem::replace(&mut self.active, ActiveSubMachine::None) {
            ActiveSubMachine::None => {}
            ActiveSubMachine::Eap(mut peer) => peer.disable(),
            ActiveSubMachine::WpaPersonal(mut machine)
            | ActiveSubMachine::Wapi(mut machine)
            | ActiveSubMachine::Wps(mut machine) => {
                let mut io = SubMachineIo {
                    host: &mut self.host,
                    setup: &self.setup,
                    pmk: self.pmk.as_ref(),
                };
                machine.deinit(&mut io);
            }
        }
        if !self.aborted {
            self.stop_timers();
        }

        if let Some(cookie) = self.in_flight.take() {
            self.host.packet_processing_done(cookie);
        }
        for entry in self.queue.drain(..) {
            self.host.packet_processing_done(entry.cookie);
        }
        debug!("security session closed");
        self.host
    }

    fn drain(&mut self) {
        while !self.processing_in_progress {
            let Some(entry) = self.queue.pop_front() else {
                return;
            };
            self.processing_in_progress = true;
            self.in_flight = Some(entry.cookie);

            match self.dispatch(&entry.bytes) {
                Dispatch::Done => self.finish_in_flight(),
                Dispatch::Deferred => {
                    trace!(cookie = entry.cookie.0, "frame completion deferred");
                    return;
                }
            }
        }
    }

    fn finish_in_flight(&mut self) {
        self.processing_in_progress = false;
        if let Some(cookie) = self.in_flight.take() {
            self.host.packet_processing_done(cookie);
        }
    }

    fn dispatch(&mut self, bytes: &[u8]) -> Dispatch {
        if self.aborted {
            return Dispatch::Done;
        }
        let Ok(frame) = Frame::parse(bytes) else {
            return Dispatch::Done;
        };

        if self.eapol_start_active {
            self.eapol_start_active = false;
            self.host.stop_timer(TimeoutKind::EapolStart);
        }

        match (frame.protocol, frame.body) {
            (Protocol::Wapi, _) => {
                if self.setup.security_type != SecurityType::Wapi {
                    debug!("WAPI frame outside WAPI mode");
                    return Dispatch::Done;
                }
                self.run_sub_machine(SubMachineKind::Wapi, &frame)
            }
            (Protocol::Amp, _) => self.run_sub_machine(SubMachineKind::WpaPersonal, &frame),
            (_, FrameBody::Key(_)) => {
                if matches!(self.active, ActiveSubMachine::Eap(_)) {
                    self.run_eap(&frame)
                } else {
                    self.run_sub_machine(SubMachineKind::WpaPersonal, &frame)
                }
            }
            (_, FrameBody::Eap(_)) => match self.setup.security_type {
                SecurityType::Wps => self.run_sub_machine(SubMachineKind::Wps, &frame),
                SecurityType::Eap(_) => self.run_eap(&frame),
                other => {
                    debug!(security_type = %other, "EAP frame outside 802.1X mode");
                    Dispatch::Done
                }
            },
            (_, FrameBody::Control(packet_type)) => {
                debug!(?packet_type, "discarding EAPOL control frame");
                Dispatch::Done
            }
            (_, FrameBody::Wapi(_)) => Dispatch::Done,
        }
    }

    fn run_eap(&mut self, frame: &Frame<'_>) -> Dispatch {
        if matches!(self.active, ActiveSubMachine::None) {
            if self.setup.identity.is_empty() {
                debug!("no identity configured, ignoring EAP frame");
                return Dispatch::Done;
            }
            debug!("creating EAP peer");
            self.active = ActiveSubMachine::Eap(Box::new(EapPeer::new()));
        }
        let ActiveSubMachine::Eap(peer) = &mut self.active else {
            debug!("EAP frame while another sub-machine is active");
            return Dispatch::Done;
        };

        let mut io = PeerIo {
            host: &mut self.host,
            scratch: &mut self.scratch,
            setup: &self.setup,
            backends: &mut self.collaborators.backends,
        };
        let outcome = peer.receive(frame, &mut io);
        trace!(?outcome, "EAP peer outcome");

        match outcome {
            PeerOutcome::Pending | PeerOutcome::Ignored => Dispatch::Done,
            PeerOutcome::Success => {
                self.capture_eap_keys();
                Dispatch::Done
            }
            PeerOutcome::HandshakeTakeover => {
                self.capture_eap_keys();
                if let ActiveSubMachine::Eap(peer) = &mut self.active {
                    peer.disable();
                }
                self.active = ActiveSubMachine::None;
                info!("EAP complete, 4-way handshake takes over");
                self.run_sub_machine(SubMachineKind::WpaPersonal, frame)
            }
            PeerOutcome::Failure => {
                self.abort();
                Dispatch::Done
            }
        }
    }

    fn capture_eap_keys(&mut self) {
        let ActiveSubMachine::Eap(peer) = &mut self.active else {
            return;
        };
        let Some(key_data) = peer.take_eap_key_data() else {
            return;
        };
        match key_data.first_chunk::<PMK_LEN>() {
            Some(pmk) => {
                let pmk = *pmk;
                self.store_pmk(&pmk);
            }
            None => debug!(len = key_data.len(), "EAP key material too short for a PMK"),
        }
    }

    fn run_sub_machine(&mut self, kind: SubMachineKind, frame: &Frame<'_>) -> Dispatch {
        if matches!(self.active, ActiveSubMachine::None) {
            let Some(factory) = self.collaborators.factory(kind) else {
                debug!(?kind, "no factory for sub-machine");
                return Dispatch::Done;
            };
            debug!(?kind, "creating sub-machine");
            self.active = ActiveSubMachine::wrap(kind, factory.create(&self.setup));
        }
        if self.active.kind() != Some(kind) {
            debug!(?kind, active = ?self.active.kind(), "frame for inactive sub-machine");
            return Dispatch::Done;
        }
        let Some(machine) = self.active.sub_machine_mut() else {
            return Dispatch::Done;
        };

        let mut io = SubMachineIo {
            host: &mut self.host,
            setup: &self.setup,
            pmk: self.pmk.as_ref(),
        };
        let progress = machine.process_frame(frame, &mut io);
        self.on_progress(kind, progress)
    }

    fn on_progress(&mut self, kind: SubMachineKind, progress: Progress) -> Dispatch {
        match progress {
            Progress::Continue => Dispatch::Done,
            Progress::Deferred => Dispatch::Deferred,
            Progress::Complete => {
                info!(?kind, "security association established");
                self.host.stop_timer(TimeoutKind::SecurityAssociation);
                Dispatch::Done
            }
            Progress::Failed => {
                warn!(?kind, "sub-machine failed");
                self.abort();
                Dispatch::Done
            }
        }
    }

    fn send_eapol_start(&mut self) {
        let mut frame = self.setup.snap_header.as_bytes().to_vec();
        frame.extend_from_slice(&EapolHeader::new(EapolType::Start, 0).to_bytes());
        self.host
            .send_packet(&frame, &self.setup.local_mac, &self.setup.peer_mac);

        self.eapol_start_attempts += 1;
        self.eapol_start_active = true;
        self.host
            .start_timer(TimeoutKind::EapolStart, self.setup.response_timeout_ms);
        debug!(attempt = self.eapol_start_attempts, "EAPOL-Start sent");
    }

    fn stop_timers(&mut self) {
        self.host.stop_timer(TimeoutKind::SecurityAssociation);
        if self.eapol_start_active {
            self.eapol_start_active = false;
            self.host.stop_timer(TimeoutKind::EapolStart);
        }
    }

    /// Fail the session; `abort_procedure` is signalled exactly once
    fn abort(&mut self) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        self.stop_timers();

        let signalled = match &mut self.active {
            ActiveSubMachine::Eap(peer) => {
                let mut io = PeerIo {
                    host: &mut self.host,
                    scratch: &mut self.scratch,
                    setup: &self.setup,
                    backends: &mut self.collaborators.backends,
                };
                peer.abort(&mut io)
            }
            _ => false,
        };
        if !signalled {
            self.host.abort_procedure();
        }
        warn!(security_type = %self.setup.security_type, "security session aborted");
    }
}

impl<H: SupplicantHost + std::fmt::Debug> std::fmt::Debug for SecurityContext<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("security_type", &self.setup.security_type)
            .field("host", &self.host)
            .field("active", &self.active.kind())
            .field("pending_frames", &self.pending_frames())
            .field("aborted", &self.aborted)
            .finish()
    }
}

fn check_capabilities<H: SupplicantHost>(setup: &SecuritySetup, host: &H) -> Result<(), SetupError> {
    let caps = host.capabilities();
    match setup.security_type {
        SecurityType::Eap(kind) if kind.uses_tls() => {
            if kind == EapMethodKind::Fast {
                if !caps.install_pac {
                    return Err(SetupError::MissingCapability("install_pac"));
                }
            } else if !caps.install_session {
                return Err(SetupError::MissingCapability("install_session"));
            }
        }
        SecurityType::Wps if !caps.wps_done => {
            return Err(SetupError::MissingCapability("wps_done"));
        }
        _ => {}
    }
    if cfg!(feature = "pmk-cache") && setup.pmk_caching && !caps.pmkid_store {
        return Err(SetupError::MissingCapability("pmkid_store"));
    }
    Ok(())
}

fn check_collaborators(setup: &SecuritySetup, collaborators: &Collaborators) -> Result<(), SetupError> {
    let require = |present: bool, name: &'static str| {
        if present {
            Ok(())
        } else {
            Err(SetupError::MissingCollaborator(name))
        }
    };

    match setup.security_type {
        SecurityType::WpaPersonal => require(collaborators.four_way.is_some(), "4-way handshake"),
        SecurityType::Wapi => require(collaborators.wapi.is_some(), "WAPI"),
        SecurityType::Wps => require(collaborators.wps.is_some(), "WPS"),
        SecurityType::Eap(kind) => {
            let backends = &collaborators.backends;
            match kind {
                EapMethodKind::Tls | EapMethodKind::Ttls | EapMethodKind::Fast => {
                    require(backends.tls.is_some(), "TLS backend")?
                }
                EapMethodKind::Leap => require(backends.leap.is_some(), "LEAP backend")?,
                EapMethodKind::Sim => require(backends.sim.is_some(), "SIM backend")?,
            }
            require(collaborators.four_way.is_some(), "4-way handshake")
        }
    }
}
