//! Packet collection: POST an encoded packet, get back whatever the consumer acked with.

use async_trait::async_trait;
use lora_core::RPacket;
use tracing::debug;

use super::{check_request, Handler};
use crate::adapter::Queues;
use crate::server::{Request, Response, OCTET_STREAM, TEXT_PLAIN};

pub const DEFAULT_URL: &str = "/packets";

pub struct Collect {
    url: String,
}

impl Collect {
    pub fn new() -> Self {
        Self::at(DEFAULT_URL)
    }

    pub fn at(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for Collect {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for Collect {
    fn url(&self) -> &str {
        &self.url
    }

    fn produces_packets(&self) -> bool {
        true
    }

    async fn handle(&self, req: Request, queues: &Queues) -> Response {
        if let Err(resp) = check_request(&req, "POST", OCTET_STREAM) {
            return resp;
        }
        let packet = match RPacket::unmarshal_binary(&req.body) {
            Ok(p) => p,
            Err(e) => return Response::bad_request(format!("invalid packet: {}", e.desc())),
        };
        debug!("collected packet of {} bytes from {}", packet.payload.len(), req.peer);
        let res = queues.submit_packet(packet).await;
        let content_type = match res.status {
            _ if res.content.is_empty() => None,
            200 => Some(OCTET_STREAM),
            _ => Some(TEXT_PLAIN),
        };
        Response::new(res.status, content_type, res.content)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::adapter::{Adapter, AdapterOptions};
    use crate::handlers::testing::request;
    use lora_core::{data_frame, DevAddr, Failure, MType, Metadata, Packet};

    fn adapter() -> Arc<Adapter> {
        let a = Adapter::new(AdapterOptions {
            response_timeout: Duration::from_millis(300),
            ..Default::default()
        })
        .unwrap();
        a.bind(Collect::new());
        Arc::new(a)
    }

    fn body() -> Vec<u8> {
        RPacket::new(
            data_frame(MType::UnconfirmedDataUp, DevAddr([9, 9, 9, 9]), 1, b"x"),
            Metadata::default(),
        )
        .marshal_binary()
        .unwrap()
    }

    async fn call(adapter: &Adapter, req: Request) -> Response {
        Collect::new().handle(req, &adapter.queues()).await
    }

    #[tokio::test]
    async fn rejects_wrong_method_and_content_type() {
        let a = adapter();
        let resp = call(&a, request("GET", "/packets", None, b"")).await;
        assert_eq!(resp.status, 405);
        let resp = call(&a, request("POST", "/packets", Some("application/json"), &body())).await;
        assert_eq!(resp.status, 400);
        let resp = call(&a, request("POST", "/packets", Some(OCTET_STREAM), b"junk")).await;
        assert_eq!(resp.status, 400);
        // nothing reached the queue
        assert_eq!(a.stats().snapshot().packets_in, 0);
    }

    #[tokio::test]
    async fn ack_content_is_written_back() {
        let a = adapter();
        let consumer = a.clone();
        tokio::spawn(async move {
            let (pkt, an) = consumer.next().await.unwrap();
            an.ack(Some(&pkt)).await.unwrap();
        });
        let resp = call(&a, request("POST", "/packets", Some(OCTET_STREAM), &body())).await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type, Some(OCTET_STREAM));
        assert_eq!(resp.body, body());
    }

    #[tokio::test]
    async fn nack_status_is_written_back() {
        let a = adapter();
        let consumer = a.clone();
        tokio::spawn(async move {
            let (_, an) = consumer.next().await.unwrap();
            an.nack(Some(&Failure::NotFound("unknown device".into())))
                .await
                .unwrap();
        });
        let resp = call(&a, request("POST", "/packets", Some(OCTET_STREAM), &body())).await;
        assert_eq!(resp.status, 404);
        assert!(String::from_utf8_lossy(&resp.body).contains("unknown device"));
    }
}
