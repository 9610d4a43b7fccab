//! EAPOL Wire Frame Model
//!
//! This crate provides typed views and builders for the frames an 802.11
//! station exchanges during 802.1X authentication:
//!
//! - LLC/SNAP encapsulation (IEEE 802.2, RFC 1042)
//! - EAPOL headers (IEEE 802.1X-2004 Section 7)
//! - EAP packets (RFC 3748)
//! - EAP-TLS style fragmentation flags (RFC 5216 Section 3)
//! - PMKID derivation for PMK caching (IEEE 802.11-2016 Section 12.7.1.3)
//!
//! Parsing is zero-copy: every view borrows the frame it was parsed from.
//!
//! # Example
//!
//! ```rust
//! use eapol_proto::{EapCode, EapPacket, EapType, EapView, Frame, FrameBody, SnapHeader};
//!
//! let request = EapPacket::identity_request(7, "");
//! let bytes = request.to_eapol_frame(&SnapHeader::EAPOL);
//!
//! let frame = Frame::parse(&bytes).unwrap();
//! match frame.body {
//!     FrameBody::Eap(body) => {
//!         let eap = EapView::parse(body).unwrap();
//!         assert_eq!(eap.code(), EapCode::Request);
//!         assert_eq!(eap.identifier(), 7);
//!         assert_eq!(eap.eap_type(), Some(EapType::Identity));
//!     }
//!     _ => unreachable!(),
//! }
//! ```

pub mod eap;
pub mod eapol;
pub mod frame;
pub mod mac;
pub mod pmkid;
pub mod snap;
pub mod tls;

pub use eap::{EAP_HEADER_LEN, EapCode, EapPacket, EapType, EapView};
pub use eapol::{EAPOL_HEADER_LEN, EAPOL_VERSION, EapolHeader, EapolType};
pub use frame::{Frame, FrameBody, FrameError};
pub use mac::MacAddr;
pub use pmkid::{PMK_LEN, PMKID_LEN, derive_pmkid};
pub use snap::{Protocol, SNAP_HEADER_LEN, SnapHeader};
pub use tls::{TLS_LENGTH_FIELD_LEN, TlsFlags, TlsFragment, TlsFragmentAssembler};
