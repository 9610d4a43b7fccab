//! Cryptographic collaborators
//!
//! The EAP methods in this crate implement framing and message flow only.
//! TLS record processing, the LEAP/MS-CHAP computations and the GSM
//! algorithms are delegated to the backends below, supplied by the
//! integrator when a session is created.

use thiserror::Error;

use crate::config::SecuritySetup;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("TLS error: {0}")]
    Tls(String),

    #[error("SIM error: {0}")]
    Sim(String),

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),
}

/// Result of feeding one complete TLS message to the backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsProgress {
    /// TLS records to send back to the server (may be empty)
    pub output: Vec<u8>,
    /// The handshake has completed
    pub established: bool,
}

/// TLS client engine driven by EAP-TLS, EAP-TTLS and EAP-FAST
pub trait TlsBackend: Send {
    /// Produce the ClientHello after an EAP Start
    fn start(&mut self) -> Result<Vec<u8>, BackendError>;

    /// Feed a reassembled message from the server during the handshake
    fn handshake(&mut self, input: &[u8]) -> Result<TlsProgress, BackendError>;

    /// Protect inner (phase 2) data
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, BackendError>;

    /// Unprotect inner (phase 2) data
    fn decrypt(&mut self, records: &[u8]) -> Result<Vec<u8>, BackendError>;

    /// Keying material exporter (RFC 5705 / TLS PRF)
    fn export_keying_material(&mut self, label: &str, len: usize) -> Result<Vec<u8>, BackendError>;

    /// Opaque resumable session, if the backend supports resumption
    fn session_blob(&self) -> Option<Vec<u8>> {
        None
    }

    /// Answer an EAP-FAST Crypto-Binding TLV value
    fn crypto_binding(&mut self, _request: &[u8]) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::Unsupported("crypto binding"))
    }
}

/// The four challenge/response values of a LEAP exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeapExchange {
    /// Challenge received from the AP
    pub peer_challenge: [u8; 8],
    /// Our answer to `peer_challenge`
    pub peer_response: [u8; 24],
    /// Challenge we sent to the AP
    pub ap_challenge: [u8; 8],
    /// The AP's answer to `ap_challenge`
    pub ap_response: [u8; 24],
}

/// LEAP (MS-CHAPv1 style) computations
pub trait LeapBackend: Send {
    /// Response to the AP's 8-byte challenge
    fn challenge_response(&mut self, challenge: &[u8; 8], password: &str) -> [u8; 24];

    /// Check the AP's answer to our challenge
    fn verify_ap_response(
        &mut self,
        ap_challenge: &[u8; 8],
        ap_response: &[u8; 24],
        password: &str,
    ) -> bool;

    /// Session key derived from a completed exchange
    fn session_key(&mut self, exchange: &LeapExchange, password: &str) -> Vec<u8>;
}

/// Output of one GSM authentication run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GsmTriplet {
    pub sres: [u8; 4],
    pub kc: [u8; 8],
}

/// EAP-SIM keys derived from the master key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimKeys {
    pub k_aut: [u8; 16],
    pub msk: Vec<u8>,
}

/// Input to the EAP-SIM master key derivation (RFC 4186 Section 7)
#[derive(Debug, Clone, Copy)]
pub struct SimKeyInput<'a> {
    pub identity: &'a [u8],
    pub kcs: &'a [[u8; 8]],
    pub nonce_mt: &'a [u8; 16],
    pub version_list: &'a [u8],
    pub selected_version: u16,
}

/// SIM card access and EAP-SIM key hierarchy
pub trait SimBackend: Send {
    /// Run the GSM A3/A8 algorithms for one RAND
    fn gsm_authenticate(&mut self, rand: &[u8; 16]) -> Result<GsmTriplet, BackendError>;

    fn derive_keys(&mut self, input: &SimKeyInput<'_>) -> Result<SimKeys, BackendError>;

    /// AT_MAC value: HMAC-SHA1-128 over `message` followed by `extra`
    fn mac(&mut self, k_aut: &[u8; 16], message: &[u8], extra: &[u8]) -> [u8; 16];
}

pub type TlsBackendFactory = Box<dyn FnMut(&SecuritySetup) -> Box<dyn TlsBackend> + Send>;
pub type LeapBackendFactory = Box<dyn FnMut(&SecuritySetup) -> Box<dyn LeapBackend> + Send>;
pub type SimBackendFactory = Box<dyn FnMut(&SecuritySetup) -> Box<dyn SimBackend> + Send>;

/// Backend factories available to a session
///
/// A fresh backend is created each time the peer selects a method.
#[derive(Default)]
pub struct MethodBackends {
    pub tls: Option<TlsBackendFactory>,
    pub leap: Option<LeapBackendFactory>,
    pub sim: Option<SimBackendFactory>,
}

impl MethodBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tls<F>(mut self, factory: F) -> Self
    where
        F: FnMut(&SecuritySetup) -> Box<dyn TlsBackend> + Send + 'static,
    {
        self.tls = Some(Box::new(factory));
        self
    }

    pub fn with_leap<F>(mut self, factory: F) -> Self
    where
        F: FnMut(&SecuritySetup) -> Box<dyn LeapBackend> + Send + 'static,
    {
        self.leap = Some(Box::new(factory));
        self
    }

    pub fn with_sim<F>(mut self, factory: F) -> Self
    where
        F: FnMut(&SecuritySetup) -> Box<dyn SimBackend> + Send + 'static,
    {
        self.sim = Some(Box::new(factory));
        self
    }
}

impl std::fmt::Debug for MethodBackends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodBackends")
            .field("tls", &self.tls.is_some())
            .field("leap", &self.leap.is_some())
            .field("sim", &self.sim.is_some())
            .finish()
    }
}
