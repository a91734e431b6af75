//! AckNacker: single-use handle turning a consumer's accept/reject decision into the
//! HTTP answer of the request that is waiting for it.

use std::sync::Arc;
use std::time::Duration;

use lora_core::{ErrorKind, Failure, Packet};
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::stats::Stats;

/// How long a delivery may wait for the response slot to accept it.
pub const DELIVERY_BOUND: Duration = Duration::from_millis(50);

const GENERIC_FAILURE: &str = "unexpected error while processing the request";
const UNABLE_TO_REGISTER: &str = "unable to register";

/// Response produced for one pending request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgRes {
    pub status: u16,
    pub content: Vec<u8>,
}

impl MsgRes {
    pub fn new(status: u16, content: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content: content.into(),
        }
    }
}

/// Where a handle stands. Every state but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Acked,
    Nacked,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Packet,
    Registration,
}

#[derive(Debug)]
enum State {
    Pending(mpsc::Sender<MsgRes>),
    /// No requester is waiting; ack and nack succeed without sending anything.
    Void,
    Settled(Outcome),
}

/// Correlation handle bound to one pending request.
#[derive(Debug)]
pub struct AckNacker {
    flavor: Flavor,
    state: Mutex<State>,
    stats: Option<Arc<Stats>>,
}

impl AckNacker {
    /// Handle for a packet request: Ack -> 200 + encoded packet, Nack -> status by failure kind.
    pub fn for_packet(chresp: mpsc::Sender<MsgRes>, stats: Option<Arc<Stats>>) -> Self {
        Self::bound(Flavor::Packet, chresp, stats)
    }

    /// Handle for a registration request: Ack -> 202, Nack -> 409 (501 for an implementation
    /// failure).
    pub fn for_registration(chresp: mpsc::Sender<MsgRes>, stats: Option<Arc<Stats>>) -> Self {
        Self::bound(Flavor::Registration, chresp, stats)
    }

    /// Detached handle: nobody waits for the answer (e.g. registrations produced by broadcast).
    pub fn void() -> Self {
        Self {
            flavor: Flavor::Registration,
            state: Mutex::new(State::Void),
            stats: None,
        }
    }

    fn bound(flavor: Flavor, chresp: mpsc::Sender<MsgRes>, stats: Option<Arc<Stats>>) -> Self {
        Self {
            flavor,
            state: Mutex::new(State::Pending(chresp)),
            stats,
        }
    }

    /// Current state. A void handle always reports `Pending`.
    pub async fn outcome(&self) -> Outcome {
        match &*self.state.lock().await {
            State::Pending(_) | State::Void => Outcome::Pending,
            State::Settled(o) => *o,
        }
    }

    /// Accept. For packet handles `packet` becomes the response body (none -> empty body).
    pub async fn ack(&self, packet: Option<&dyn Packet>) -> Result<(), Failure> {
        let res = match self.flavor {
            Flavor::Packet => {
                let content = match packet {
                    Some(p) => p.marshal_binary()?,
                    None => Vec::new(),
                };
                MsgRes::new(200, content)
            }
            Flavor::Registration => MsgRes::new(202, Vec::new()),
        };
        self.deliver(res, Outcome::Acked).await?;
        if let Some(stats) = &self.stats {
            stats.record_ack();
        }
        Ok(())
    }

    /// Reject. The failure kind picks the status; none or an unmapped kind gives 500.
    pub async fn nack(&self, reason: Option<&Failure>) -> Result<(), Failure> {
        let res = match self.flavor {
            Flavor::Packet => nack_response(reason),
            Flavor::Registration => registration_nack_response(reason),
        };
        self.deliver(res, Outcome::Nacked).await?;
        if let Some(stats) = &self.stats {
            stats.record_nack();
        }
        Ok(())
    }

    async fn deliver(&self, res: MsgRes, settled: Outcome) -> Result<(), Failure> {
        let chresp = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, State::Settled(settled)) {
                State::Pending(tx) => tx,
                State::Void => {
                    *state = State::Void;
                    return Ok(());
                }
                State::Settled(prev) => {
                    *state = State::Settled(prev);
                    return Err(Failure::Operational(format!(
                        "response already delivered ({:?})",
                        prev
                    )));
                }
            }
        };

        let status = res.status;
        // chresp is dropped on return, closing the channel.
        match chresp.send_timeout(res, DELIVERY_BOUND).await {
            Ok(()) => {
                debug!("delivered {} response", status);
                Ok(())
            }
            Err(e) => {
                *self.state.lock().await = State::Settled(Outcome::TimedOut);
                if let Some(stats) = &self.stats {
                    stats.record_timeout();
                }
                let why = match e {
                    SendTimeoutError::Timeout(_) => "no reader within the delivery bound",
                    SendTimeoutError::Closed(_) => "requester is no longer waiting",
                };
                warn!("unable to deliver {} response: {}", status, why);
                Err(Failure::Operational(format!(
                    "unable to deliver response: {}",
                    why
                )))
            }
        }
    }
}

/// Status and body a packet Nack produces for `reason`.
pub fn nack_response(reason: Option<&Failure>) -> MsgRes {
    match reason {
        Some(f) => {
            let status = match f.kind() {
                ErrorKind::NotFound => 404,
                ErrorKind::Behavioural => 406,
                ErrorKind::Implementation => 501,
                ErrorKind::Structural | ErrorKind::Operational => 500,
            };
            MsgRes::new(status, f.to_string())
        }
        None => MsgRes::new(500, GENERIC_FAILURE),
    }
}

/// Status and body a registration Nack produces for `reason`.
pub fn registration_nack_response(reason: Option<&Failure>) -> MsgRes {
    match reason {
        Some(f) if f.kind() == ErrorKind::Implementation => MsgRes::new(501, f.to_string()),
        _ => MsgRes::new(409, UNABLE_TO_REGISTER),
    }
}
