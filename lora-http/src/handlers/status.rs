//! Status page: counters and uptime as JSON, loopback callers only unless configured otherwise.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::Handler;
use crate::adapter::Queues;
use crate::server::{Request, Response};

pub struct StatusPage {
    loopback_only: bool,
}

impl StatusPage {
    pub fn new(loopback_only: bool) -> Self {
        Self { loopback_only }
    }
}

#[async_trait]
impl Handler for StatusPage {
    fn url(&self) -> &str {
        "/status/"
    }

    async fn handle(&self, req: Request, queues: &Queues) -> Response {
        if !req.method.eq_ignore_ascii_case("GET") {
            return Response::method_not_allowed("GET");
        }
        if self.loopback_only && !req.peer.ip().is_loopback() {
            debug!("status request from {} refused", req.peer);
            return Response::text(403, "status is only served to loopback callers");
        }
        match serde_json::to_vec(&queues.stats().snapshot()) {
            Ok(body) => Response::json(200, body),
            Err(e) => {
                warn!("status encode: {}", e);
                Response::text(500, "unable to encode status")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Adapter, AdapterOptions};
    use crate::handlers::testing::{request, request_from};
    use crate::server::APPLICATION_JSON;

    #[tokio::test]
    async fn serves_snapshot_as_json() {
        let a = Adapter::new(AdapterOptions::default()).unwrap();
        a.stats().record_request();
        a.stats().record_broadcast(true);
        let resp = StatusPage::new(true)
            .handle(request("GET", "/status/", None, b""), &a.queues())
            .await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type, Some(APPLICATION_JSON));
        let v: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(v["requests"], 1);
        assert_eq!(v["broadcast_errors"], 1);
        assert!(v.get("uptime_secs").is_some());
    }

    #[tokio::test]
    async fn remote_callers_need_opt_in() {
        let a = Adapter::new(AdapterOptions::default()).unwrap();
        let remote = "192.0.2.10:5555".parse().unwrap();
        let req = request_from(remote, "GET", "/status/", None, b"");
        let resp = StatusPage::new(true).handle(req.clone(), &a.queues()).await;
        assert_eq!(resp.status, 403);
        let resp = StatusPage::new(false).handle(req, &a.queues()).await;
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn post_is_405() {
        let a = Adapter::new(AdapterOptions::default()).unwrap();
        let resp = StatusPage::new(false)
            .handle(request("POST", "/status/", None, b""), &a.queues())
            .await;
        assert_eq!(resp.status, 405);
    }
}
