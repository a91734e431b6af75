//! Broadcast engine: post one encoded packet to many recipients in parallel and resolve the
//! answers to at most one owner.
//!
//! Every call is joined before resolving. A slow recipient delays the whole send, but the
//! acceptance count is then exact and independent of completion order, which is what lets two
//! recipients claiming the same device be detected instead of racing.

use lora_core::{DevAddr, Failure, RPacket, Recipient, Registration};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::SendError;
use crate::server::OCTET_STREAM;

/// What one recipient answered.
#[derive(Debug)]
pub enum Outcome {
    /// 200 with a decodable packet.
    Accepted(Recipient, RPacket),
    /// 404: not interested.
    Declined(Recipient),
    /// Anything else, including transport errors.
    Failed(Failure),
}

/// Post `body` to every recipient concurrently; returns once all of them answered.
pub async fn fan_out(
    client: &reqwest::Client,
    recipients: &[Recipient],
    body: Vec<u8>,
) -> Vec<Outcome> {
    let handles: Vec<_> = recipients
        .iter()
        .cloned()
        .map(|recipient| {
            let client = client.clone();
            let body = body.clone();
            tokio::spawn(async move { call(&client, recipient, body).await })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => outcomes.push(Outcome::Failed(Failure::Operational(format!(
                "recipient call aborted: {}",
                e
            )))),
        }
    }
    outcomes
}

async fn call(client: &reqwest::Client, recipient: Recipient, body: Vec<u8>) -> Outcome {
    let method = match reqwest::Method::from_bytes(recipient.method.as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            return Outcome::Failed(Failure::Structural(format!(
                "{}: invalid method",
                recipient
            )))
        }
    };
    let resp = match client
        .request(method, &recipient.url)
        .header(reqwest::header::CONTENT_TYPE, OCTET_STREAM)
        .body(body)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            debug!("{}: {}", recipient, e);
            return Outcome::Failed(Failure::Operational(format!("{}: {}", recipient, e)));
        }
    };

    let status = resp.status();
    let content = match resp.bytes().await {
        Ok(b) => b,
        Err(e) => {
            return Outcome::Failed(Failure::Operational(format!(
                "{}: reading answer: {}",
                recipient, e
            )))
        }
    };
    match status {
        StatusCode::OK => match RPacket::unmarshal_binary(&content) {
            Ok(packet) => Outcome::Accepted(recipient, packet),
            Err(e) => Outcome::Failed(Failure::Structural(format!(
                "{}: invalid answer: {}",
                recipient,
                e.desc()
            ))),
        },
        StatusCode::NOT_FOUND => Outcome::Declined(recipient),
        other => {
            let text = String::from_utf8_lossy(&content);
            Outcome::Failed(failure_from_status(
                other.as_u16(),
                format!("{}: {}: {}", recipient, other, text.trim()),
            ))
        }
    }
}

/// Inverse of the Nack mapping, so a recipient's reason survives the hop.
pub fn failure_from_status(status: u16, desc: String) -> Failure {
    match status {
        400 => Failure::Structural(desc),
        406 => Failure::Behavioural(desc),
        501 => Failure::Implementation(desc),
        _ => Failure::Operational(desc),
    }
}

/// Reduce outcomes to the single accepting recipient and its answer.
/// Collected failures take priority over an acceptance.
pub fn tally(outcomes: Vec<Outcome>) -> Result<(Recipient, RPacket), SendError> {
    let mut failures = Vec::new();
    let mut accepted = Vec::new();
    for outcome in outcomes {
        match outcome {
            Outcome::Accepted(r, p) => accepted.push((r, p)),
            Outcome::Declined(r) => debug!("{} declined", r),
            Outcome::Failed(f) => failures.push(f),
        }
    }
    if !failures.is_empty() {
        warn!(
            "{} recipient call(s) failed ({} accepted)",
            failures.len(),
            accepted.len()
        );
        return Err(SendError::Recipients(failures));
    }
    match accepted.len() {
        0 => Err(SendError::NoResponse),
        1 => Ok(accepted.remove(0)),
        n => Err(SendError::SeveralPositiveAnswers(n)),
    }
}

/// Broadcast resolution: the single acceptance plus the registration it implies.
pub fn resolve(
    outcomes: Vec<Outcome>,
    dev_addr: DevAddr,
) -> Result<(RPacket, Registration), SendError> {
    let (recipient, answer) = tally(outcomes)?;
    Ok((answer, Registration::new(recipient, dev_addr)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lora_core::{data_frame, MType, Metadata};

    fn r(name: &str) -> Recipient {
        Recipient::new(format!("http://{}/packets", name), "POST")
    }

    fn answer(n: u8) -> RPacket {
        RPacket::new(
            data_frame(MType::UnconfirmedDataDown, DevAddr([n; 4]), 1, b"ok"),
            Metadata::default(),
        )
    }

    const ADDR: DevAddr = DevAddr([0xde, 0xad, 0xbe, 0xef]);

    #[test]
    fn single_acceptance_registers_recipient() {
        let outcomes = vec![
            Outcome::Declined(r("a")),
            Outcome::Accepted(r("b"), answer(2)),
            Outcome::Declined(r("c")),
            Outcome::Declined(r("d")),
        ];
        let (pkt, reg) = resolve(outcomes, ADDR).unwrap();
        assert_eq!(pkt, answer(2));
        assert_eq!(reg, Registration::new(r("b"), ADDR));
    }

    #[test]
    fn two_acceptances_conflict() {
        let outcomes = vec![
            Outcome::Accepted(r("a"), answer(1)),
            Outcome::Declined(r("b")),
            Outcome::Accepted(r("c"), answer(3)),
        ];
        assert!(matches!(
            resolve(outcomes, ADDR),
            Err(SendError::SeveralPositiveAnswers(2))
        ));
    }

    #[test]
    fn all_declined_is_no_response() {
        let outcomes = vec![Outcome::Declined(r("a")), Outcome::Declined(r("b"))];
        assert!(matches!(resolve(outcomes, ADDR), Err(SendError::NoResponse)));
        assert!(matches!(resolve(Vec::new(), ADDR), Err(SendError::NoResponse)));
    }

    #[test]
    fn failures_win_over_acceptance_and_are_all_kept() {
        let outcomes = vec![
            Outcome::Failed(Failure::Operational("a down".into())),
            Outcome::Accepted(r("b"), answer(2)),
            Outcome::Failed(Failure::Behavioural("c refused".into())),
        ];
        match resolve(outcomes, ADDR) {
            Err(SendError::Recipients(fs)) => assert_eq!(fs.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn resolution_ignores_order() {
        let build = || {
            vec![
                Outcome::Declined(r("a")),
                Outcome::Accepted(r("b"), answer(2)),
                Outcome::Declined(r("c")),
            ]
        };
        let mut reversed = build();
        reversed.reverse();
        let (_, a) = resolve(build(), ADDR).unwrap();
        let (_, b) = resolve(reversed, ADDR).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn status_maps_back_to_kind() {
        use lora_core::ErrorKind;
        assert_eq!(failure_from_status(406, "x".into()).kind(), ErrorKind::Behavioural);
        assert_eq!(failure_from_status(501, "x".into()).kind(), ErrorKind::Implementation);
        assert_eq!(failure_from_status(400, "x".into()).kind(), ErrorKind::Structural);
        assert_eq!(failure_from_status(500, "x".into()).kind(), ErrorKind::Operational);
        assert_eq!(failure_from_status(409, "x".into()).kind(), ErrorKind::Operational);
    }
}
