//! PMKID derivation (IEEE 802.11-2016 Section 12.7.1.3)
//!
//! ```text
//! PMKID = Truncate-128(HMAC-SHA-1(PMK, "PMK Name" || AA || SPA))
//! ```
//!
//! - AA: Authenticator (AP) MAC address
//! - SPA: Supplicant (station) MAC address

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::mac::MacAddr;

type HmacSha1 = Hmac<Sha1>;

/// Pairwise Master Key length
pub const PMK_LEN: usize = 32;
/// PMKID length
pub const PMKID_LEN: usize = 16;

const PMKID_LABEL: &[u8] = b"PMK Name";

/// Derive the PMKID naming `pmk` for the (authenticator, supplicant) pair
pub fn derive_pmkid(pmk: &[u8; PMK_LEN], aa: &MacAddr, spa: &MacAddr) -> [u8; PMKID_LEN] {
    let mut mac = HmacSha1::new_from_slice(pmk).expect("HMAC can take key of any size");
    mac.update(PMKID_LABEL);
    mac.update(aa.as_bytes());
    mac.update(spa.as_bytes());
    let digest = mac.finalize().into_bytes();

    let mut pmkid = [0u8; PMKID_LEN];
    pmkid.copy_from_slice(&digest[..PMKID_LEN]);
    pmkid
}
