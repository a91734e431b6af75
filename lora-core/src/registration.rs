//! Registration: "this recipient is now responsible for this device".

use serde::{Deserialize, Serialize};

use crate::address::{AppEui, DevAddr, NwkSKey};
use crate::error::Failure;
use crate::recipient::Recipient;
use crate::wire::{put_field, take_field};

/// Binding of a device address to a recipient. Application registrations also carry
/// the application EUI and, for device registrations, the network session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub recipient: Recipient,
    pub dev_addr: DevAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_eui: Option<AppEui>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nwks_key: Option<NwkSKey>,
}

impl Registration {
    pub fn new(recipient: Recipient, dev_addr: DevAddr) -> Self {
        Self {
            recipient,
            dev_addr,
            app_eui: None,
            nwks_key: None,
        }
    }

    pub fn with_app_eui(mut self, app_eui: AppEui) -> Self {
        self.app_eui = Some(app_eui);
        self
    }

    pub fn with_nwks_key(mut self, key: NwkSKey) -> Self {
        self.nwks_key = Some(key);
        self
    }

    /// Binary form: recipient, dev addr, app EUI, session key; each length-prefixed,
    /// absent optionals encoded as empty fields.
    pub fn marshal_binary(&self) -> Result<Vec<u8>, Failure> {
        let mut out = Vec::new();
        put_field(&mut out, &self.recipient.marshal_binary()?)?;
        put_field(&mut out, self.dev_addr.as_bytes())?;
        put_field(&mut out, self.app_eui.as_ref().map_or(&[][..], |e| &e.0[..]))?;
        put_field(&mut out, self.nwks_key.as_ref().map_or(&[][..], |k| &k.0[..]))?;
        Ok(out)
    }

    pub fn unmarshal_binary(data: &[u8]) -> Result<Self, Failure> {
        let mut at = 0;
        let recipient = Recipient::unmarshal_binary(next_field(data, &mut at)?)?;
        let dev_addr = DevAddr::from_slice(next_field(data, &mut at)?)?;
        let app_eui = match next_field(data, &mut at)? {
            [] => None,
            b => Some(AppEui::from_slice(b)?),
        };
        let nwks_key = match next_field(data, &mut at)? {
            [] => None,
            b => Some(NwkSKey::from_slice(b)?),
        };
        if at != data.len() {
            return Err(Failure::Structural("trailing bytes after registration".into()));
        }
        Ok(Self {
            recipient,
            dev_addr,
            app_eui,
            nwks_key,
        })
    }
}

fn next_field<'a>(data: &'a [u8], at: &mut usize) -> Result<&'a [u8], Failure> {
    let (field, n) = take_field(&data[*at..])?;
    *at += n;
    Ok(field)
}
