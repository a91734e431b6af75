//! Liveness probe.

use async_trait::async_trait;

use super::Handler;
use crate::adapter::Queues;
use crate::server::{Request, Response};

pub struct Healthz;

#[async_trait]
impl Handler for Healthz {
    fn url(&self) -> &str {
        "/healthz"
    }

    async fn handle(&self, req: Request, _queues: &Queues) -> Response {
        if !req.method.eq_ignore_ascii_case("GET") {
            return Response::method_not_allowed("GET");
        }
        Response::text(200, "ok")
    }
}
