use eapol_proto::{EAP_HEADER_LEN, EapType, MacAddr, PMK_LEN, SnapHeader, TLS_LENGTH_FIELD_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Smallest TLS fragment window the engine accepts
pub const MIN_FRAGMENT_SIZE: usize = 64;

/// Largest window whose first fragment still fits the 16-bit EAP Length
pub const MAX_FRAGMENT_SIZE: usize =
    u16::MAX as usize - (EAP_HEADER_LEN + 2 + TLS_LENGTH_FIELD_LEN);

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid setup: {0}")]
    Invalid(String),

    #[error("{security_type} requires a non-empty {field}")]
    MissingField {
        security_type: SecurityType,
        field: &'static str,
    },

    #[error("Host does not implement the {0} callback")]
    MissingCapability(&'static str),

    #[error("No {0} was supplied")]
    MissingCollaborator(&'static str),

    #[error("{0} support is not compiled in")]
    MethodNotEnabled(EapMethodKind),
}

/// EAP methods the supplicant can negotiate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EapMethodKind {
    Leap,
    Fast,
    Tls,
    Ttls,
    Sim,
}

impl EapMethodKind {
    pub fn eap_type(self) -> EapType {
        match self {
            EapMethodKind::Leap => EapType::Leap,
            EapMethodKind::Fast => EapType::Fast,
            EapMethodKind::Tls => EapType::Tls,
            EapMethodKind::Ttls => EapType::Ttls,
            EapMethodKind::Sim => EapType::Sim,
        }
    }

    /// Whether the cargo feature for this method is enabled
    pub fn is_enabled(self) -> bool {
        match self {
            EapMethodKind::Leap => cfg!(feature = "leap"),
            EapMethodKind::Fast => cfg!(feature = "fast"),
            EapMethodKind::Tls => cfg!(feature = "tls"),
            EapMethodKind::Ttls => cfg!(feature = "ttls"),
            EapMethodKind::Sim => cfg!(feature = "sim"),
        }
    }

    pub fn uses_tls(self) -> bool {
        matches!(
            self,
            EapMethodKind::Fast | EapMethodKind::Tls | EapMethodKind::Ttls
        )
    }
}

impl fmt::Display for EapMethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EapMethodKind::Leap => "LEAP",
            EapMethodKind::Fast => "EAP-FAST",
            EapMethodKind::Tls => "EAP-TLS",
            EapMethodKind::Ttls => "EAP-TTLS",
            EapMethodKind::Sim => "EAP-SIM",
        };
        f.write_str(name)
    }
}

/// Security mode of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityType {
    /// WPA/WPA2-Personal: a PMK is known up front, only the 4-way handshake runs
    WpaPersonal,
    /// 802.1X with the given EAP method, followed by the 4-way handshake
    Eap(EapMethodKind),
    Wapi,
    Wps,
}

impl SecurityType {
    /// Modes that solicit the authenticator with EAPOL-Start
    pub fn uses_eapol_start(self) -> bool {
        matches!(self, SecurityType::Eap(_) | SecurityType::Wps)
    }
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityType::WpaPersonal => f.write_str("WPA-Personal"),
            SecurityType::Eap(kind) => kind.fmt(f),
            SecurityType::Wapi => f.write_str("WAPI"),
            SecurityType::Wps => f.write_str("WPS"),
        }
    }
}

/// Per-link security configuration
///
/// Immutable once a session has been created from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuritySetup {
    pub security_type: SecurityType,

    /// Station address (SPA)
    pub local_mac: MacAddr,

    /// Access point address (AA)
    pub peer_mac: MacAddr,

    /// Network identity; a non-empty value enables the EAP engine
    #[serde(default)]
    pub identity: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Client certificate (PEM or DER, handed to the TLS backend untouched)
    #[serde(default)]
    pub client_cert: Vec<u8>,

    #[serde(default)]
    pub private_key: Vec<u8>,

    #[serde(default)]
    pub ca_cert: Vec<u8>,

    /// Previously provisioned EAP-FAST PAC
    #[serde(default)]
    pub pac: Vec<u8>,

    /// Pre-shared PMK for WPA-Personal, or a cached PMK for EAP modes
    #[serde(default)]
    pub pmk: Vec<u8>,

    #[serde(default)]
    pub snap_header: SnapHeader,

    /// EAPOL-Start retransmission interval
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u32,

    /// Total EAPOL-Start transmissions before giving up
    #[serde(default = "default_max_eapol_start_attempts")]
    pub max_eapol_start_attempts: u32,

    /// Ceiling on the whole security association
    #[serde(default = "default_association_timeout_ms")]
    pub association_timeout_ms: u32,

    /// Maximum TLS data bytes per outgoing EAP fragment
    #[serde(default = "default_max_fragment_size")]
    pub max_fragment_size: usize,

    /// Derive a PMKID and hand it to the host after every new PMK
    #[serde(default)]
    pub pmk_caching: bool,
}

fn default_response_timeout_ms() -> u32 {
    3000
}

fn default_max_eapol_start_attempts() -> u32 {
    3
}

fn default_association_timeout_ms() -> u32 {
    30_000
}

fn default_max_fragment_size() -> usize {
    1024
}

impl SecuritySetup {
    /// A setup with every optional field at its default
    pub fn new(security_type: SecurityType, local_mac: MacAddr, peer_mac: MacAddr) -> Self {
        SecuritySetup {
            security_type,
            local_mac,
            peer_mac,
            identity: String::new(),
            username: String::new(),
            password: String::new(),
            client_cert: Vec::new(),
            private_key: Vec::new(),
            ca_cert: Vec::new(),
            pac: Vec::new(),
            pmk: Vec::new(),
            snap_header: SnapHeader::default(),
            response_timeout_ms: default_response_timeout_ms(),
            max_eapol_start_attempts: default_max_eapol_start_attempts(),
            association_timeout_ms: default_association_timeout_ms(),
            max_fragment_size: default_max_fragment_size(),
            pmk_caching: false,
        }
    }

    /// Load a setup from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SetupError> {
        let contents = fs::read_to_string(path)?;
        let setup: SecuritySetup = serde_json::from_str(&contents)?;
        setup.validate()?;
        Ok(setup)
    }

    /// Save the setup to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SetupError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// The configured EAP method, if this is an 802.1X setup
    pub fn eap_method(&self) -> Option<EapMethodKind> {
        match self.security_type {
            SecurityType::Eap(kind) => Some(kind),
            _ => None,
        }
    }

    /// Name presented in EAP-Response/Identity
    pub fn outer_identity(&self) -> &str {
        if self.username.is_empty() {
            &self.identity
        } else {
            &self.username
        }
    }

    /// The PMK as a fixed-size key, when one of the right length is configured
    pub fn pmk(&self) -> Option<&[u8; PMK_LEN]> {
        self.pmk.as_slice().try_into().ok()
    }

    /// Validate the fields that do not depend on the host
    ///
    /// Host capabilities and collaborators are checked when a session is
    /// created from this setup.
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.local_mac.is_zero() {
            return Err(SetupError::Invalid("local MAC address is zero".to_string()));
        }
        if self.peer_mac.is_zero() {
            return Err(SetupError::Invalid("peer MAC address is zero".to_string()));
        }
        if self.association_timeout_ms == 0 {
            return Err(SetupError::Invalid(
                "association timeout cannot be 0".to_string(),
            ));
        }
        if self.security_type.uses_eapol_start() {
            if self.response_timeout_ms == 0 {
                return Err(SetupError::Invalid(
                    "EAPOL-Start timeout cannot be 0".to_string(),
                ));
            }
            if self.max_eapol_start_attempts == 0 {
                return Err(SetupError::Invalid(
                    "EAPOL-Start attempt limit cannot be 0".to_string(),
                ));
            }
        }
        if self.max_fragment_size < MIN_FRAGMENT_SIZE {
            return Err(SetupError::Invalid(format!(
                "maximum fragment size {} is below {}",
                self.max_fragment_size, MIN_FRAGMENT_SIZE
            )));
        }
        if self.max_fragment_size > MAX_FRAGMENT_SIZE {
            return Err(SetupError::Invalid(format!(
                "maximum fragment size {} is above {}",
                self.max_fragment_size, MAX_FRAGMENT_SIZE
            )));
        }
        if !self.pmk.is_empty() && self.pmk.len() != PMK_LEN {
            return Err(SetupError::Invalid(format!(
                "PMK must be {} bytes, got {}",
                PMK_LEN,
                self.pmk.len()
            )));
        }

        match self.security_type {
            SecurityType::WpaPersonal => {
                self.require(self.pmk.is_empty(), "PMK")?;
            }
            SecurityType::Eap(kind) => {
                if !kind.is_enabled() {
                    return Err(SetupError::MethodNotEnabled(kind));
                }
                self.require(self.identity.is_empty(), "identity")?;
                match kind {
                    EapMethodKind::Tls => {
                        self.require(self.client_cert.is_empty(), "client certificate")?;
                        self.require(self.private_key.is_empty(), "private key")?;
                    }
                    EapMethodKind::Ttls | EapMethodKind::Fast | EapMethodKind::Leap => {
                        self.require(self.username.is_empty(), "username")?;
                        self.require(self.password.is_empty(), "password")?;
                    }
                    EapMethodKind::Sim => {}
                }
            }
            SecurityType::Wapi | SecurityType::Wps => {}
        }

        Ok(())
    }

    fn require(&self, missing: bool, field: &'static str) -> Result<(), SetupError> {
        if missing {
            return Err(SetupError::MissingField {
                security_type: self.security_type,
                field,
            });
        }
        Ok(())
    }

    /// Create an example setup file
    pub fn example() -> Self {
        let mut setup = SecuritySetup::new(
            SecurityType::Eap(EapMethodKind::Ttls),
            MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0xAA]),
        );
        setup.identity = "anonymous@example.org".to_string();
        setup.username = "alice".to_string();
        setup.password = "correct horse battery staple".to_string();
        setup.pmk_caching = true;
        setup
    }
}
