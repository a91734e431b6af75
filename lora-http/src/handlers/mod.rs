//! Endpoint plug-ins. A handler owns one URL pattern, parses its requests, and hands domain
//! objects to the adapter through [`Queues`]; the adapter knows nothing about the formats.

mod applications;
mod collect;
mod healthz;
mod pubsub;
mod status;

pub use applications::Applications;
pub use collect::Collect;
pub use healthz::Healthz;
pub use pubsub::PubSub;
pub use status::StatusPage;

use async_trait::async_trait;

use crate::adapter::Queues;
use crate::server::{Request, Response};

#[async_trait]
pub trait Handler: Send + Sync {
    /// Route pattern. A trailing '/' binds the whole subtree.
    fn url(&self) -> &str;

    /// True if this handler feeds the packet queue read by `Adapter::next`.
    fn produces_packets(&self) -> bool {
        false
    }

    /// Answer one request. Runs on the connection's task; may wait on the queues.
    async fn handle(&self, req: Request, queues: &Queues) -> Response;
}

/// Method and exact content-type checks shared by the body-carrying endpoints.
pub(crate) fn check_request(
    req: &Request,
    method: &str,
    content_type: &str,
) -> Result<(), Response> {
    if !req.method.eq_ignore_ascii_case(method) {
        return Err(Response::method_not_allowed(method));
    }
    match req.content_type() {
        Some(ct) if ct == content_type => Ok(()),
        Some(ct) => Err(Response::bad_request(format!(
            "invalid content type {:?}, expected {}",
            ct, content_type
        ))),
        None => Err(Response::bad_request(format!(
            "missing content type, expected {}",
            content_type
        ))),
    }
}

/// Final path segment after `prefix`, rejecting empty or nested remainders.
pub(crate) fn path_param<'a>(req: &'a Request, prefix: &str) -> Result<&'a str, Response> {
    match req.path.strip_prefix(prefix) {
        Some(rest) if !rest.is_empty() && !rest.contains('/') => Ok(rest),
        _ => Err(Response::bad_request(format!(
            "expected {}<id>, got {}",
            prefix, req.path
        ))),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::request;
    use super::*;

    #[test]
    fn wrong_method_is_405_before_content_type() {
        let req = request("GET", "/packets", None, b"");
        let err = check_request(&req, "POST", "application/octet-stream").unwrap_err();
        assert_eq!(err.status, 405);
    }

    #[test]
    fn content_type_must_match_exactly() {
        let req = request("POST", "/packets", Some("application/octet-stream; x=1"), b"");
        assert_eq!(
            check_request(&req, "POST", "application/octet-stream")
                .unwrap_err()
                .status,
            400
        );
        let req = request("POST", "/packets", None, b"");
        let err = check_request(&req, "POST", "application/octet-stream").unwrap_err();
        assert_eq!(err.status, 400);
        assert!(String::from_utf8_lossy(&err.body).starts_with("structural failure"));
        let req = request("POST", "/packets", Some("application/octet-stream"), b"");
        assert!(check_request(&req, "POST", "application/octet-stream").is_ok());
    }

    #[test]
    fn path_param_takes_last_segment() {
        let req = request("PUT", "/end-devices/01020304", None, b"");
        assert_eq!(path_param(&req, "/end-devices/").unwrap(), "01020304");
        let req = request("PUT", "/end-devices/", None, b"");
        assert!(path_param(&req, "/end-devices/").is_err());
        let req = request("PUT", "/end-devices/a/b", None, b"");
        assert!(path_param(&req, "/end-devices/").is_err());
    }
}
