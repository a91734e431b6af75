//! Packets: opaque binary-encodable payloads routed between network elements.

use serde::{Deserialize, Serialize};

use crate::address::DevAddr;
use crate::error::Failure;

/// Minimum size of a data frame: MHDR (1) + FHDR without options (7) + MIC (4).
const MIN_DATA_FRAME_LEN: usize = 12;

/// Anything the adapter can put on the wire.
pub trait Packet: Send + Sync {
    /// Binary encoding used as HTTP body and as Ack content.
    fn marshal_binary(&self) -> Result<Vec<u8>, Failure>;

    /// Device address the packet targets. Broadcast needs it to synthesize registrations.
    fn dev_addr(&self) -> Result<DevAddr, Failure> {
        Err(Failure::Structural("packet does not target a device".into()))
    }
}

/// LoRaWAN message type, top three bits of the MAC header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MType {
    JoinRequest,
    JoinAccept,
    UnconfirmedDataUp,
    UnconfirmedDataDown,
    ConfirmedDataUp,
    ConfirmedDataDown,
    Rfu,
    Proprietary,
}

impl MType {
    pub fn from_mhdr(mhdr: u8) -> Self {
        match mhdr >> 5 {
            0 => MType::JoinRequest,
            1 => MType::JoinAccept,
            2 => MType::UnconfirmedDataUp,
            3 => MType::UnconfirmedDataDown,
            4 => MType::ConfirmedDataUp,
            5 => MType::ConfirmedDataDown,
            6 => MType::Rfu,
            _ => MType::Proprietary,
        }
    }

    pub fn is_data(self) -> bool {
        matches!(
            self,
            MType::UnconfirmedDataUp
                | MType::UnconfirmedDataDown
                | MType::ConfirmedDataUp
                | MType::ConfirmedDataDown
        )
    }

    fn bits(self) -> u8 {
        match self {
            MType::JoinRequest => 0,
            MType::JoinAccept => 1,
            MType::UnconfirmedDataUp => 2,
            MType::UnconfirmedDataDown => 3,
            MType::ConfirmedDataUp => 4,
            MType::ConfirmedDataDown => 5,
            MType::Rfu => 6,
            MType::Proprietary => 7,
        }
    }
}

/// Radio metadata reported by the gateway alongside a frame. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Concentrator IF channel.
    pub chan: Option<u32>,
    /// Coding rate, e.g. "4/5".
    pub codr: Option<String>,
    /// Data rate identifier, e.g. "SF7BW125".
    pub datr: Option<String>,
    /// Center frequency in MHz.
    pub freq: Option<f64>,
    /// SNR in dB.
    pub lsnr: Option<f64>,
    /// Modulation, "LORA" or "FSK".
    pub modu: Option<String>,
    pub rfch: Option<u32>,
    /// RSSI in dBm.
    pub rssi: Option<i32>,
    pub size: Option<u32>,
    pub stat: Option<i32>,
    /// UTC time of reception, RFC 3339.
    pub time: Option<String>,
    /// Concentrator internal timestamp in microseconds.
    pub tmst: Option<u32>,
}

/// Router packet: a raw PHY payload plus the metadata it was received with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RPacket {
    pub payload: Vec<u8>,
    pub metadata: Metadata,
}

impl RPacket {
    pub fn new(payload: Vec<u8>, metadata: Metadata) -> Self {
        Self { payload, metadata }
    }

    pub fn mtype(&self) -> Option<MType> {
        self.payload.first().map(|&mhdr| MType::from_mhdr(mhdr))
    }

    pub fn unmarshal_binary(data: &[u8]) -> Result<Self, Failure> {
        let p: RPacket = bincode::deserialize(data)?;
        if p.payload.is_empty() {
            return Err(Failure::Structural("empty payload".into()));
        }
        Ok(p)
    }
}

impl Packet for RPacket {
    fn marshal_binary(&self) -> Result<Vec<u8>, Failure> {
        if self.payload.is_empty() {
            return Err(Failure::Structural("empty payload".into()));
        }
        Ok(bincode::serialize(self)?)
    }

    /// DevAddr of a data frame. FHDR stores it little-endian right after the MAC header.
    fn dev_addr(&self) -> Result<DevAddr, Failure> {
        let mtype = self
            .mtype()
            .ok_or_else(|| Failure::Structural("empty payload".into()))?;
        if !mtype.is_data() {
            return Err(Failure::Structural(format!(
                "{:?} frame carries no device address",
                mtype
            )));
        }
        if self.payload.len() < MIN_DATA_FRAME_LEN {
            return Err(Failure::Structural(format!(
                "data frame too short: {} bytes",
                self.payload.len()
            )));
        }
        let p = &self.payload;
        Ok(DevAddr([p[4], p[3], p[2], p[1]]))
    }
}

/// Build a data frame PHY payload: MHDR, FHDR (no options), FPort 1, FRMPayload, zero MIC.
/// The MIC is not computed; routing elements never check it.
pub fn data_frame(mtype: MType, dev_addr: DevAddr, f_cnt: u16, frm_payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(MIN_DATA_FRAME_LEN + 1 + frm_payload.len());
    out.push(mtype.bits() << 5);
    let a = dev_addr.as_bytes();
    out.extend_from_slice(&[a[3], a[2], a[1], a[0]]);
    out.push(0); // FCtrl
    out.extend_from_slice(&f_cnt.to_le_bytes());
    out.push(1); // FPort
    out.extend_from_slice(frm_payload);
    out.extend_from_slice(&[0u8; 4]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uplink(addr: DevAddr) -> RPacket {
        RPacket::new(
            data_frame(MType::UnconfirmedDataUp, addr, 7, b"temp=21"),
            Metadata {
                freq: Some(868.1),
                rssi: Some(-42),
                datr: Some("SF7BW125".into()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn dev_addr_from_data_frame() {
        let addr = DevAddr([0x26, 0x01, 0x1b, 0xda]);
        let p = uplink(addr);
        assert_eq!(p.mtype(), Some(MType::UnconfirmedDataUp));
        assert_eq!(p.dev_addr().unwrap(), addr);
    }

    #[test]
    fn binary_keeps_metadata() {
        let p = uplink(DevAddr([1, 2, 3, 4]));
        let back = RPacket::unmarshal_binary(&p.marshal_binary().unwrap()).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn empty_payload_cannot_be_encoded() {
        let p = RPacket::new(Vec::new(), Metadata::default());
        let err = p.marshal_binary().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Structural);
    }

    #[test]
    fn join_request_has_no_dev_addr() {
        let p = RPacket::new(vec![0x00; 23], Metadata::default());
        assert!(p.dev_addr().is_err());
    }

    #[test]
    fn short_data_frame_has_no_dev_addr() {
        let p = RPacket::new(vec![0x40, 1, 2, 3, 4], Metadata::default());
        assert!(p.dev_addr().is_err());
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(RPacket::unmarshal_binary(b"\xff\xff").is_err());
    }
}
