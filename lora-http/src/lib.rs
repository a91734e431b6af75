//! LoRaNet HTTP transport adapter.
//! Inbound requests are parked until a consumer acks or nacks them; outbound packets go to
//! explicit recipients or are broadcast to find the one that owns the device.

pub mod acknacker;
pub mod adapter;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod stats;

pub use acknacker::{AckNacker, MsgRes, Outcome};
pub use adapter::{Adapter, AdapterOptions, Queues};
pub use config::Config;
pub use error::SendError;
pub use handlers::{Applications, Collect, Handler, Healthz, PubSub, StatusPage};
pub use stats::{Stats, StatsSnapshot};
