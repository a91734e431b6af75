//! Errors returned by `Adapter::send`.

use lora_core::Failure;

/// Why a send did not resolve to exactly one answer.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The packet could not be encoded or targets no device; no call was issued.
    #[error("invalid packet: {0}")]
    InvalidPacket(#[source] Failure),
    /// At least one recipient call failed. Carries every collected failure.
    #[error("{} recipient call(s) failed: {}", .0.len(), join_failures(.0))]
    Recipients(Vec<Failure>),
    /// Every recipient declined.
    #[error("no response packet available")]
    NoResponse,
    /// More than one recipient accepted the same packet.
    #[error("several positive answers ({0})")]
    SeveralPositiveAnswers(usize),
}

fn join_failures(failures: &[Failure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<SendError> for Failure {
    fn from(e: SendError) -> Self {
        let desc = e.to_string();
        match e {
            SendError::InvalidPacket(_) => Failure::Structural(desc),
            SendError::NoResponse => Failure::NotFound(desc),
            SendError::SeveralPositiveAnswers(_) => Failure::Behavioural(desc),
            SendError::Recipients(_) => Failure::Operational(desc),
        }
    }
}
