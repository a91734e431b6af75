//! LoRaNet data model shared by routers, brokers and handlers.
//! No I/O: packets, recipients, registrations, failure kinds and their binary forms.

pub mod address;
pub mod error;
pub mod packet;
pub mod recipient;
pub mod registration;
pub mod wire;

pub use address::{AppEui, DevAddr, NwkSKey};
pub use error::{ErrorKind, Failure};
pub use packet::{data_frame, MType, Metadata, Packet, RPacket};
pub use recipient::Recipient;
pub use registration::Registration;
