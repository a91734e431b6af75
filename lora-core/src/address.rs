//! Fixed-width LoRaWAN identifiers: device address, application EUI, network session key.
//! Text form is lowercase hex; serde uses the text form so JSON bodies stay readable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Failure;

macro_rules! fixed_bytes {
    ($(#[$doc:meta])* $name:ident, $len:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Build from a slice; fails unless the slice is exactly `LEN` bytes.
            pub fn from_slice(b: &[u8]) -> Result<Self, Failure> {
                let arr: [u8; $len] = b.try_into().map_err(|_| {
                    Failure::Structural(format!(
                        "{} must be {} bytes, got {}",
                        stringify!($name),
                        $len,
                        b.len()
                    ))
                })?;
                Ok($name(arr))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for b in &self.0 {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }

        impl FromStr for $name {
            type Err = Failure;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = decode_hex(s.trim())?;
                Self::from_slice(&bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes!(
    /// 32-bit device address, as carried in the frame header of data frames.
    DevAddr,
    4
);
fixed_bytes!(
    /// 64-bit application identifier.
    AppEui,
    8
);
fixed_bytes!(
    /// 128-bit network session key.
    NwkSKey,
    16
);

/// Decode an even-length hex string.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, Failure> {
    if s.len() % 2 != 0 {
        return Err(Failure::Structural(format!("odd-length hex string: {:?}", s)));
    }
    s.as_bytes()
        .chunks(2)
        .map(|pair| {
            let hi = hex_digit(pair[0]);
            let lo = hex_digit(pair[1]);
            match (hi, lo) {
                (Some(h), Some(l)) => Ok((h << 4) | l),
                _ => Err(Failure::Structural(format!("invalid hex string: {:?}", s))),
            }
        })
        .collect()
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_addr_text_roundtrip() {
        let addr: DevAddr = "0102abCD".parse().unwrap();
        assert_eq!(addr.as_bytes(), &[0x01, 0x02, 0xab, 0xcd]);
        assert_eq!(addr.to_string(), "0102abcd");
    }

    #[test]
    fn wrong_width_rejected() {
        assert!("010203".parse::<DevAddr>().is_err());
        assert!("0102030405060708".parse::<NwkSKey>().is_err());
        assert!(AppEui::from_slice(&[0u8; 7]).is_err());
    }

    #[test]
    fn invalid_hex_rejected() {
        assert!("zz000000".parse::<DevAddr>().is_err());
        assert!("0102030".parse::<DevAddr>().is_err());
    }

    #[test]
    fn serde_uses_hex_strings() {
        let eui = AppEui([0, 1, 2, 3, 4, 5, 6, 7]);
        let json = serde_json::to_string(&eui).unwrap();
        assert_eq!(json, "\"0001020304050607\"");
        let back: AppEui = serde_json::from_str(&json).unwrap();
        assert_eq!(back, eui);
    }
}
