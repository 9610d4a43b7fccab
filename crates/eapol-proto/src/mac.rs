use std::fmt;
use std::str::FromStr;

use crate::frame::FrameError;

/// IEEE 802 MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    pub fn new(bytes: [u8; 6]) -> Self {
        MacAddr(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = FrameError;

    /// Parse `aa:bb:cc:dd:ee:ff` (`-` is accepted as separator too)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split([':', '-']);
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| FrameError::InvalidMacAddress(s.to_string()))?;
            if part.len() != 2 {
                return Err(FrameError::InvalidMacAddress(s.to_string()));
            }
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| FrameError::InvalidMacAddress(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(FrameError::InvalidMacAddress(s.to_string()));
        }
        Ok(MacAddr(bytes))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for MacAddr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for MacAddr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
