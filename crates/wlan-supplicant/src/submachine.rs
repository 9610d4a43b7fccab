//! Sub-machines that run outside the EAP engine
//!
//! The WPA-Personal 4-way handshake, WAPI and WPS protocols are supplied by
//! the integrator through [`SubMachineFactory`]. The session owns at most one
//! active sub-machine at a time and hands it every frame of its protocol.

use eapol_proto::{Frame, PMK_LEN};

use crate::config::SecuritySetup;
use crate::host::{SupplicantHost, TimeoutKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubMachineKind {
    WpaPersonal,
    Wapi,
    Wps,
}

impl SubMachineKind {
    /// The timer this kind of sub-machine owns
    pub fn timeout_kind(self) -> TimeoutKind {
        match self {
            SubMachineKind::WpaPersonal => TimeoutKind::FourWayHandshake,
            SubMachineKind::Wapi => TimeoutKind::Wapi,
            SubMachineKind::Wps => TimeoutKind::Wps,
        }
    }
}

/// Result of handing a frame or timeout to a sub-machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Handled; more frames are expected
    Continue,
    /// Accepted, but completion is signalled later through
    /// `SecurityContext::packet_processing_done`
    Deferred,
    /// The security association is established
    Complete,
    /// Unrecoverable; the session aborts
    Failed,
}

/// What a sub-machine may touch while it runs
pub struct SubMachineIo<'a> {
    pub host: &'a mut dyn SupplicantHost,
    pub setup: &'a SecuritySetup,
    /// PMK from the setup or from a completed EAP exchange
    pub pmk: Option<&'a [u8; PMK_LEN]>,
}

pub trait SubMachine: Send {
    fn kind(&self) -> SubMachineKind;

    fn process_frame(&mut self, frame: &Frame<'_>, io: &mut SubMachineIo<'_>) -> Progress;

    /// Called for expiries of [`SubMachineKind::timeout_kind`]
    fn timer_expired(&mut self, _io: &mut SubMachineIo<'_>) -> Progress {
        Progress::Continue
    }

    fn deinit(&mut self, _io: &mut SubMachineIo<'_>) {}
}

/// Creates a sub-machine when its first frame arrives
pub trait SubMachineFactory: Send {
    fn create(&mut self, setup: &SecuritySetup) -> Box<dyn SubMachine>;
}

impl<F> SubMachineFactory for F
where
    F: FnMut(&SecuritySetup) -> Box<dyn SubMachine> + Send,
{
    fn create(&mut self, setup: &SecuritySetup) -> Box<dyn SubMachine> {
        self(setup)
    }
}
