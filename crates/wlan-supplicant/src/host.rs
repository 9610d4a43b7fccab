//! Host (driver/transport) callbacks
//!
//! Everything the core needs from the outside world is reached through
//! [`SupplicantHost`]: frame transmission, key installation, timers and
//! completion signalling. The core never blocks; every callback is assumed
//! to be synchronous or fire-and-forget.

use eapol_proto::{MacAddr, PMK_LEN, PMKID_LEN};

use crate::method::KeyType;

/// Opaque token the transport attaches to every received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameCookie(pub u64);

/// Timers the core and its sub-machines arm through the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutKind {
    /// Ceiling on the whole security association; always fatal
    SecurityAssociation,
    /// EAPOL-Start retransmission
    EapolStart,
    /// Owned by the WPA-Personal 4-way handshake
    FourWayHandshake,
    /// Owned by the WAPI sub-machine
    Wapi,
    /// Owned by the WPS sub-machine
    Wps,
}

/// Optional callbacks a host implements
///
/// Session setup checks these against the configured security type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostCapabilities {
    /// [`SupplicantHost::install_pac`] is implemented (EAP-FAST)
    pub install_pac: bool,
    /// [`SupplicantHost::install_session`] is implemented (EAP-TLS, EAP-TTLS)
    pub install_session: bool,
    /// [`SupplicantHost::pmkid_store`] is implemented (PMK caching)
    pub pmkid_store: bool,
    /// [`SupplicantHost::wps_done`] is implemented (WPS)
    pub wps_done: bool,
}

/// Callbacks injected at session init
pub trait SupplicantHost: Send {
    /// Transmit a complete LLC/SNAP frame
    fn send_packet(&mut self, frame: &[u8], local: &MacAddr, peer: &MacAddr);

    /// Install a pairwise key into the driver
    fn install_pairwise_key(&mut self, key_type: KeyType, key: &[u8], rsc: &[u8; 8], index: u8);

    /// Install a group key into the driver
    fn install_group_key(&mut self, key_type: KeyType, key: &[u8], rsc: &[u8; 8], index: u8);

    /// Store a freshly provisioned EAP-FAST PAC
    fn install_pac(&mut self, _pac: &[u8]) {}

    /// Store TLS session state for later resumption
    fn install_session(&mut self, _session: &[u8]) {}

    fn start_timer(&mut self, kind: TimeoutKind, duration_ms: u32);

    fn stop_timer(&mut self, kind: TimeoutKind);

    /// The security procedure failed; the link should be torn down
    fn abort_procedure(&mut self);

    /// The frame identified by `cookie` is no longer referenced
    fn packet_processing_done(&mut self, cookie: FrameCookie);

    /// Add an entry to the PMK cache
    fn pmkid_store(&mut self, _peer: &MacAddr, _pmkid: &[u8; PMKID_LEN], _pmk: &[u8; PMK_LEN]) {}

    /// WPS finished; `credentials` is the opaque credential blob
    fn wps_done(&mut self, _credentials: &[u8]) {}

    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities::default()
    }
}
