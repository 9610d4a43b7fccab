//! EAP method plugins
//!
//! Each method implements [`MethodPlugin`]; the peer engine only ever talks
//! to an [`EapMethod`], which owns the RFC 4137 method variables and
//! dispatches to the selected variant through a single `match`.

use std::collections::VecDeque;

use eapol_proto::{EapType, EapView, FrameError, SnapHeader};
use thiserror::Error;
use tracing::trace;

use crate::backend::{BackendError, MethodBackends};
use crate::config::{EapMethodKind, SecuritySetup};
use crate::scratch::{FrameSlice, ScratchBuffer};

pub mod null;

#[cfg(any(feature = "tls", feature = "ttls", feature = "fast"))]
pub(crate) mod tls_common;

#[cfg(feature = "fast")]
pub mod fast;
#[cfg(feature = "leap")]
pub mod leap;
#[cfg(feature = "sim")]
pub mod sim;
#[cfg(feature = "tls")]
pub mod tls;
#[cfg(feature = "ttls")]
pub mod ttls;

use null::NullMethod;

#[derive(Error, Debug)]
pub enum MethodError {
    #[error("Malformed frame: {0}")]
    Frame(#[from] FrameError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Malformed {0}")]
    Malformed(&'static str),

    #[error("No {0} backend was supplied")]
    MissingBackend(&'static str),

    #[error("{0} support is not compiled in")]
    NotEnabled(EapMethodKind),
}

/// RFC 4137 `methodState`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodState {
    None,
    Init,
    Cont,
    MayCont,
    Done,
}

/// RFC 4137 `decision`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Fail,
    CondSucc,
    UncondSucc,
}

/// Method variables the peer engine reads between operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodStatus {
    pub method_state: MethodState,
    pub decision: Decision,
    pub allow_notifications: bool,
    pub is_key_available: bool,
    /// An EAPOL-Key frame concludes the method successfully
    pub is_eapol_key_hint: bool,
}

impl MethodStatus {
    pub fn new() -> Self {
        MethodStatus {
            method_state: MethodState::None,
            decision: Decision::Fail,
            allow_notifications: true,
            is_key_available: false,
            is_eapol_key_hint: false,
        }
    }

    pub fn fail(&mut self) {
        self.method_state = MethodState::Done;
        self.decision = Decision::Fail;
    }

    /// The method accepted the server's credentials; keys may follow
    pub fn conditional_success(&mut self) {
        self.method_state = MethodState::MayCont;
        self.decision = Decision::CondSucc;
        self.is_eapol_key_hint = true;
    }
}

impl Default for MethodStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Destination of a key handed out by [`MethodPlugin::get_key`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Pairwise,
    Group,
    /// EAP-FAST Protected Access Credential
    Pac,
    /// Resumable TLS session
    Session,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub key_type: KeyType,
    pub data: Vec<u8>,
    pub rsc: [u8; 8],
    pub index: u8,
}

impl Key {
    pub fn new(key_type: KeyType, data: Vec<u8>) -> Self {
        Key {
            key_type,
            data,
            rsc: [0; 8],
            index: 0,
        }
    }
}

/// What a method is asked to look at
#[derive(Debug, Clone, Copy)]
pub enum Inbound<'a> {
    Eap(EapView<'a>),
    EapolKey(&'a [u8]),
}

/// Keys waiting to be collected through `get_key`
#[derive(Debug, Default)]
pub(crate) struct KeyStash {
    keys: VecDeque<Key>,
}

impl KeyStash {
    pub fn stage(&mut self, status: &mut MethodStatus, key: Key) {
        self.keys.push_back(key);
        status.is_key_available = true;
    }

    pub fn pop(&mut self, status: &mut MethodStatus) -> Option<Key> {
        let key = self.keys.pop_front();
        status.is_key_available = !self.keys.is_empty();
        key
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

/// Operations every EAP method provides
pub trait MethodPlugin: Send {
    /// `None` for the Null method
    fn method_type(&self) -> Option<EapType>;

    /// Cheap validity test run before `process`
    fn check(&self, status: &MethodStatus, frame: &Inbound<'_>) -> bool;

    fn process(&mut self, status: &mut MethodStatus, frame: &Inbound<'_>, req_id: u8);

    /// Write the response to the last processed frame into `scratch`
    ///
    /// An empty slice means nothing is sent.
    fn build_response(
        &mut self,
        status: &mut MethodStatus,
        req_id: u8,
        scratch: &mut ScratchBuffer,
        snap: &SnapHeader,
    ) -> FrameSlice;

    /// Pop one staged key; only called while `is_key_available`
    fn get_key(&mut self, status: &mut MethodStatus) -> Option<Key>;

    fn deinit(&mut self);
}

enum Plugin {
    Null(NullMethod),
    #[cfg(feature = "leap")]
    Leap(leap::LeapMethod),
    #[cfg(feature = "fast")]
    Fast(fast::FastMethod),
    #[cfg(feature = "tls")]
    Tls(tls::TlsMethod),
    #[cfg(feature = "ttls")]
    Ttls(ttls::TtlsMethod),
    #[cfg(feature = "sim")]
    Sim(sim::SimMethod),
}

impl Plugin {
    fn as_dyn(&self) -> &dyn MethodPlugin {
        match self {
            Plugin::Null(m) => m,
            #[cfg(feature = "leap")]
            Plugin::Leap(m) => m,
            #[cfg(feature = "fast")]
            Plugin::Fast(m) => m,
            #[cfg(feature = "tls")]
            Plugin::Tls(m) => m,
            #[cfg(feature = "ttls")]
            Plugin::Ttls(m) => m,
            #[cfg(feature = "sim")]
            Plugin::Sim(m) => m,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn MethodPlugin {
        match self {
            Plugin::Null(m) => m,
            #[cfg(feature = "leap")]
            Plugin::Leap(m) => m,
            #[cfg(feature = "fast")]
            Plugin::Fast(m) => m,
            #[cfg(feature = "tls")]
            Plugin::Tls(m) => m,
            #[cfg(feature = "ttls")]
            Plugin::Ttls(m) => m,
            #[cfg(feature = "sim")]
            Plugin::Sim(m) => m,
        }
    }
}

/// The method record held by the peer engine
pub struct EapMethod {
    pub status: MethodStatus,
    plugin: Plugin,
    concluded_by_key: bool,
}

impl EapMethod {
    /// Placeholder installed until a method is negotiated
    pub fn null() -> Self {
        EapMethod {
            status: MethodStatus::new(),
            plugin: Plugin::Null(NullMethod),
            concluded_by_key: false,
        }
    }

    /// Instantiate `kind` with a fresh backend
    #[allow(unused_variables)]
    pub fn create(
        kind: EapMethodKind,
        setup: &SecuritySetup,
        backends: &mut MethodBackends,
    ) -> Result<Self, MethodError> {
        let plugin = match kind {
            #[cfg(feature = "leap")]
            EapMethodKind::Leap => {
                let factory = backends
                    .leap
                    .as_mut()
                    .ok_or(MethodError::MissingBackend("LEAP"))?;
                Plugin::Leap(leap::LeapMethod::new(setup, factory(setup)))
            }
            #[cfg(feature = "fast")]
            EapMethodKind::Fast => {
                let factory = backends
                    .tls
                    .as_mut()
                    .ok_or(MethodError::MissingBackend("TLS"))?;
                Plugin::Fast(fast::FastMethod::new(setup, factory(setup)))
            }
            #[cfg(feature = "tls")]
            EapMethodKind::Tls => {
                let factory = backends
                    .tls
                    .as_mut()
                    .ok_or(MethodError::MissingBackend("TLS"))?;
                Plugin::Tls(tls::TlsMethod::new(factory(setup)))
            }
            #[cfg(feature = "ttls")]
            EapMethodKind::Ttls => {
                let factory = backends
                    .tls
                    .as_mut()
                    .ok_or(MethodError::MissingBackend("TLS"))?;
                Plugin::Ttls(ttls::TtlsMethod::new(setup, factory(setup)))
            }
            #[cfg(feature = "sim")]
            EapMethodKind::Sim => {
                let factory = backends
                    .sim
                    .as_mut()
                    .ok_or(MethodError::MissingBackend("SIM"))?;
                Plugin::Sim(sim::SimMethod::new(setup, factory(setup)))
            }
            #[allow(unreachable_patterns)]
            other => return Err(MethodError::NotEnabled(other)),
        };

        let mut status = MethodStatus::new();
        status.method_state = MethodState::Init;
        Ok(EapMethod {
            status,
            plugin,
            concluded_by_key: false,
        })
    }

    pub fn method_type(&self) -> Option<EapType> {
        self.plugin.as_dyn().method_type()
    }

    pub fn check(&self, frame: &Inbound<'_>) -> bool {
        match frame {
            Inbound::EapolKey(_) => self.status.is_eapol_key_hint,
            Inbound::Eap(_) => self.plugin.as_dyn().check(&self.status, frame),
        }
    }

    pub fn process(&mut self, frame: &Inbound<'_>, req_id: u8) {
        if let Inbound::EapolKey(_) = frame {
            trace!("EAPOL-Key frame concludes the method");
            self.status.method_state = MethodState::Done;
            self.status.decision = Decision::UncondSucc;
            self.concluded_by_key = true;
            return;
        }
        self.plugin
            .as_dyn_mut()
            .process(&mut self.status, frame, req_id);
    }

    pub fn build_response(
        &mut self,
        req_id: u8,
        scratch: &mut ScratchBuffer,
        snap: &SnapHeader,
    ) -> FrameSlice {
        if std::mem::take(&mut self.concluded_by_key) {
            return FrameSlice::EMPTY;
        }
        self.plugin
            .as_dyn_mut()
            .build_response(&mut self.status, req_id, scratch, snap)
    }

    pub fn get_key(&mut self) -> Option<Key> {
        self.plugin.as_dyn_mut().get_key(&mut self.status)
    }

    pub fn deinit(&mut self) {
        self.plugin.as_dyn_mut().deinit();
    }
}

impl std::fmt::Debug for EapMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EapMethod")
            .field("type", &self.method_type())
            .field("status", &self.status)
            .finish()
    }
}
