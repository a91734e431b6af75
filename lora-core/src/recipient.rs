//! Recipient: where an outbound packet goes (URL + HTTP verb).

use serde::{Deserialize, Serialize};

use crate::error::Failure;
use crate::wire::{put_field, take_field};

/// Addressable endpoint. Binary form: URL field then method field, each length-prefixed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub url: String,
    pub method: String,
}

impl Recipient {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
        }
    }

    pub fn marshal_binary(&self) -> Result<Vec<u8>, Failure> {
        let mut out = Vec::with_capacity(8 + self.url.len() + self.method.len());
        put_field(&mut out, self.url.as_bytes())?;
        put_field(&mut out, self.method.as_bytes())?;
        Ok(out)
    }

    pub fn unmarshal_binary(data: &[u8]) -> Result<Self, Failure> {
        let (url, n) = take_field(data)?;
        let (method, m) = take_field(&data[n..])?;
        if n + m != data.len() {
            return Err(Failure::Structural("trailing bytes after recipient".into()));
        }
        let url = std::str::from_utf8(url)
            .map_err(|e| Failure::Structural(format!("recipient url: {}", e)))?;
        let method = std::str::from_utf8(method)
            .map_err(|e| Failure::Structural(format!("recipient method: {}", e)))?;
        Ok(Self::new(url, method))
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_layout_is_url_then_method() {
        let r = Recipient::new("http://a", "PUT");
        let b = r.marshal_binary().unwrap();
        assert_eq!(&b[..4], &8u32.to_le_bytes());
        assert_eq!(&b[4..12], b"http://a");
        assert_eq!(&b[12..16], &3u32.to_le_bytes());
        assert_eq!(&b[16..], b"PUT");
        assert_eq!(Recipient::unmarshal_binary(&b).unwrap(), r);
    }

    #[test]
    fn truncated_input_is_structural() {
        let b = Recipient::new("http://a", "PUT").marshal_binary().unwrap();
        let err = Recipient::unmarshal_binary(&b[..b.len() - 1]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Structural);
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut b = Recipient::new("http://a", "PUT").marshal_binary().unwrap();
        b.push(0);
        assert!(Recipient::unmarshal_binary(&b).is_err());
    }
}
