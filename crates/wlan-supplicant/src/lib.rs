//! 802.11 Station EAP Supplicant
//!
//! This crate provides the host-side authentication core of an 802.11
//! station, built on top of the `eapol-proto` frame model.
//!
//! # Features
//!
//! - RFC 4137 EAP peer state machine, run to quiescence per frame
//! - EAP-TLS, EAP-TTLS, EAP-FAST, LEAP and EAP-SIM behind cargo features
//! - Outgoing EAP-TLS fragmentation over a single scratch buffer
//! - Session orchestration with a bounded, single-flight frame queue
//! - PMK caching (`pmk-cache` feature)
//!
//! TLS record processing, SIM algorithms, the 4-way handshake, WAPI and
//! WPS are supplied by the integrator through the traits in [`backend`]
//! and [`submachine`].
//!
//! # Example
//!
//! ```rust,no_run
//! use wlan_supplicant::{
//!     Collaborators, FrameCookie, KeyType, MacAddr, SecurityContext, SecuritySetup,
//!     SupplicantHost, TimeoutKind,
//! };
//!
//! struct Driver;
//!
//! impl SupplicantHost for Driver {
//!     fn send_packet(&mut self, frame: &[u8], _local: &MacAddr, _peer: &MacAddr) {
//!         println!("tx {} bytes", frame.len());
//!     }
//!     fn install_pairwise_key(&mut self, _t: KeyType, _k: &[u8], _rsc: &[u8; 8], _i: u8) {}
//!     fn install_group_key(&mut self, _t: KeyType, _k: &[u8], _rsc: &[u8; 8], _i: u8) {}
//!     fn start_timer(&mut self, _kind: TimeoutKind, _ms: u32) {}
//!     fn stop_timer(&mut self, _kind: TimeoutKind) {}
//!     fn abort_procedure(&mut self) {}
//!     fn packet_processing_done(&mut self, _cookie: FrameCookie) {}
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let setup = SecuritySetup::from_file("supplicant.json")?;
//!     let collaborators = Collaborators::new(); // TLS backend, 4-way handshake, ...
//!
//!     let mut session = SecurityContext::init(&setup, Driver, collaborators)?;
//!     session.start();
//!     // for every received frame:
//!     // session.process_packet(FrameCookie(n), &bytes);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod host;
pub mod method;
pub mod peer;
pub mod scratch;
pub mod session;
pub mod submachine;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend::{
    BackendError, GsmTriplet, LeapBackend, LeapExchange, MethodBackends, SimBackend, SimKeyInput,
    SimKeys, TlsBackend, TlsProgress,
};
pub use config::{
    EapMethodKind, MAX_FRAGMENT_SIZE, MIN_FRAGMENT_SIZE, SecuritySetup, SecurityType, SetupError,
};
pub use eapol_proto::{MacAddr, SnapHeader};
pub use host::{FrameCookie, HostCapabilities, SupplicantHost, TimeoutKind};
pub use method::{Decision, EapMethod, Key, KeyType, MethodError, MethodState, MethodStatus};
pub use peer::{EapPeer, PeerIo, PeerOutcome, PeerState};
pub use scratch::{FrameSlice, ScratchBuffer};
pub use session::{Collaborators, MAX_QUEUED_FRAMES, SecurityContext};
pub use submachine::{Progress, SubMachine, SubMachineFactory, SubMachineIo, SubMachineKind};
