//! Device registration: `PUT /end-devices/{devAddr}` binds a device to an application server.

use async_trait::async_trait;
use lora_core::{AppEui, DevAddr, Failure, NwkSKey, Recipient, Registration};
use serde::Deserialize;
use tracing::debug;

use super::{check_request, path_param, Handler};
use crate::adapter::Queues;
use crate::server::{Request, Response, APPLICATION_JSON, TEXT_PLAIN};

pub const DEFAULT_URL: &str = "/end-devices/";

#[derive(Debug, Deserialize)]
struct DeviceBody {
    app_eui: AppEui,
    app_url: String,
    nwks_key: NwkSKey,
}

pub struct PubSub {
    url: String,
}

impl PubSub {
    pub fn new() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
        }
    }
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new()
    }
}

fn parse(req: &Request, prefix: &str) -> Result<Registration, Response> {
    let dev_addr: DevAddr = path_param(req, prefix)?
        .parse()
        .map_err(|e: Failure| Response::bad_request(format!("devAddr: {}", e.desc())))?;
    let body: DeviceBody = serde_json::from_slice(&req.body)
        .map_err(|e| Response::bad_request(format!("invalid body: {}", e)))?;
    if body.app_url.trim().is_empty() {
        return Err(Response::bad_request("app_url is empty"));
    }
    Ok(Registration::new(Recipient::new(body.app_url, "PUT"), dev_addr)
        .with_app_eui(body.app_eui)
        .with_nwks_key(body.nwks_key))
}

#[async_trait]
impl Handler for PubSub {
    fn url(&self) -> &str {
        &self.url
    }

    async fn handle(&self, req: Request, queues: &Queues) -> Response {
        if let Err(resp) = check_request(&req, "PUT", APPLICATION_JSON) {
            return resp;
        }
        let registration = match parse(&req, &self.url) {
            Ok(r) => r,
            Err(resp) => return resp,
        };
        debug!(
            "registration of {} for {}",
            registration.dev_addr, registration.recipient
        );
        let res = queues.submit_registration(registration).await;
        if res.content.is_empty() {
            Response::empty(res.status)
        } else {
            Response::new(res.status, Some(TEXT_PLAIN), res.content)
        }
    }
}
