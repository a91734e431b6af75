//! Application registration: `PUT /applications/{appEui}` claims a list of devices for one
//! application server. Devices are registered in order; the first refusal (409, or 501 when the
//! consumer cannot store registrations) is returned as is and the rest are not submitted.

use async_trait::async_trait;
use lora_core::{AppEui, DevAddr, Failure, Recipient, Registration};
use serde::Deserialize;
use tracing::{debug, info};

use super::{check_request, path_param, Handler};
use crate::adapter::Queues;
use crate::server::{Request, Response, APPLICATION_JSON, TEXT_PLAIN};

pub const DEFAULT_URL: &str = "/applications/";

#[derive(Debug, Deserialize)]
struct ApplicationBody {
    app_url: String,
    dev_addrs: Vec<DevAddr>,
}

pub struct Applications {
    url: String,
}

impl Applications {
    pub fn new() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
        }
    }
}

impl Default for Applications {
    fn default() -> Self {
        Self::new()
    }
}

fn parse(req: &Request, prefix: &str) -> Result<Vec<Registration>, Response> {
    let app_eui: AppEui = path_param(req, prefix)?
        .parse()
        .map_err(|e: Failure| Response::bad_request(format!("appEui: {}", e.desc())))?;
    let body: ApplicationBody = serde_json::from_slice(&req.body)
        .map_err(|e| Response::bad_request(format!("invalid body: {}", e)))?;
    if body.app_url.trim().is_empty() {
        return Err(Response::bad_request("app_url is empty"));
    }
    if body.dev_addrs.is_empty() {
        return Err(Response::bad_request("dev_addrs is empty"));
    }
    let recipient = Recipient::new(body.app_url, "PUT");
    Ok(body
        .dev_addrs
        .into_iter()
        .map(|addr| Registration::new(recipient.clone(), addr).with_app_eui(app_eui))
        .collect())
}

#[async_trait]
impl Handler for Applications {
    fn url(&self) -> &str {
        &self.url
    }

    async fn handle(&self, req: Request, queues: &Queues) -> Response {
        if let Err(resp) = check_request(&req, "PUT", APPLICATION_JSON) {
            return resp;
        }
        let registrations = match parse(&req, &self.url) {
            Ok(r) => r,
            Err(resp) => return resp,
        };
        let total = registrations.len();
        for registration in registrations {
            let dev_addr = registration.dev_addr;
            let res = queues.submit_registration(registration).await;
            if res.status != 202 {
                debug!("registration of {} refused with {}", dev_addr, res.status);
                return Response::new(res.status, Some(TEXT_PLAIN), res.content);
            }
        }
        info!("registered {} device(s)", total);
        Response::empty(202)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::adapter::{Adapter, AdapterOptions};
    use crate::handlers::testing::request;

    const BODY: &str = r#"{"app_url":"http://app.example/up","dev_addrs":["01020304","0a0b0c0d"]}"#;

    fn put(path: &str, body: &str) -> Request {
        request("PUT", path, Some(APPLICATION_JSON), body.as_bytes())
    }

    fn adapter() -> Arc<Adapter> {
        Arc::new(
            Adapter::new(AdapterOptions {
                response_timeout: Duration::from_millis(300),
                ..Default::default()
            })
            .unwrap(),
        )
    }

    #[test]
    fn one_registration_per_device() {
        let regs = parse(&put("/applications/0102030405060708", BODY), DEFAULT_URL).unwrap();
        assert_eq!(regs.len(), 2);
        assert_eq!(regs[1].dev_addr, DevAddr([0x0a, 0x0b, 0x0c, 0x0d]));
        for reg in &regs {
            assert_eq!(reg.app_eui, Some(AppEui([1, 2, 3, 4, 5, 6, 7, 8])));
            assert_eq!(reg.recipient.url, "http://app.example/up");
            assert!(reg.nwks_key.is_none());
        }
    }

    #[test]
    fn empty_device_list_is_rejected() {
        let body = r#"{"app_url":"http://app.example/up","dev_addrs":[]}"#;
        let err = parse(&put("/applications/0102030405060708", body), DEFAULT_URL).unwrap_err();
        assert_eq!(err.status, 400);
        let err = parse(&put("/applications/0102", BODY), DEFAULT_URL).unwrap_err();
        assert_eq!(err.status, 400);
    }

    #[tokio::test]
    async fn all_acked_is_202() {
        let a = adapter();
        let consumer = a.clone();
        tokio::spawn(async move {
            for _ in 0..2 {
                let (_, an) = consumer.next_registration().await.unwrap();
                an.ack(None).await.unwrap();
            }
        });
        let resp = Applications::new()
            .handle(put("/applications/0102030405060708", BODY), &a.queues())
            .await;
        assert_eq!(resp.status, 202);
    }

    #[tokio::test]
    async fn first_refusal_stops_the_batch() {
        let a = adapter();
        let consumer = a.clone();
        let seen = tokio::spawn(async move {
            let (reg, an) = consumer.next_registration().await.unwrap();
            an.nack(None).await.unwrap();
            reg.dev_addr
        });
        let resp = Applications::new()
            .handle(put("/applications/0102030405060708", BODY), &a.queues())
            .await;
        assert_eq!(resp.status, 409);
        assert_eq!(seen.await.unwrap(), DevAddr([1, 2, 3, 4]));
        assert_eq!(a.stats().snapshot().registrations_in, 1);
    }

    #[tokio::test]
    async fn implementation_refusal_is_501() {
        let a = adapter();
        let consumer = a.clone();
        tokio::spawn(async move {
            let (_, an) = consumer.next_registration().await.unwrap();
            an.nack(Some(&Failure::Implementation("read only".into())))
                .await
                .unwrap();
        });
        let resp = Applications::new()
            .handle(put("/applications/0102030405060708", BODY), &a.queues())
            .await;
        assert_eq!(resp.status, 501);
    }
}
