//! Minimal HTTP/1.1 server: accept, parse one request per connection, dispatch, answer, close.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lora_core::Failure;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::adapter::Queues;
use crate::routes::RouteTable;

const MAX_HEAD_LEN: usize = 16 * 1024;
const MAX_BODY_LEN: usize = 1024 * 1024; // 1 MiB
const MAX_HEADERS: usize = 32;
const READ_CHUNK: usize = 4096;

/// Parsed inbound request. Owned, so handlers can hold it across awaits.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub peer: SocketAddr,
}

impl Request {
    /// First header with this name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }
}

/// Outbound response written by the connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: Option<&'static str>,
    pub body: Vec<u8>,
}

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const OCTET_STREAM: &str = "application/octet-stream";
pub const APPLICATION_JSON: &str = "application/json";

impl Response {
    pub fn new(status: u16, content_type: Option<&'static str>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    pub fn empty(status: u16) -> Self {
        Self::new(status, None, Vec::new())
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, Some(TEXT_PLAIN), body.into().into_bytes())
    }

    pub fn json(status: u16, body: Vec<u8>) -> Self {
        Self::new(status, Some(APPLICATION_JSON), body)
    }

    /// 400 carrying a structural failure.
    pub fn bad_request(desc: impl Into<String>) -> Self {
        Self::text(400, Failure::Structural(desc.into()).to_string())
    }

    pub fn method_not_allowed(allowed: &str) -> Self {
        Self::text(405, format!("method not allowed, expected {}", allowed))
    }
}

/// Reason phrase for the status codes this server emits.
pub fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        202 => "Accepted",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        408 => "Request Timeout",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        409 => "Conflict",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "Unknown",
    }
}

/// Error reading a request off the socket.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("request too large")]
    TooLarge,
}

/// Accept connections forever; each connection gets its own task.
/// A client gets `read_timeout` to deliver its whole request.
pub async fn serve(
    listener: TcpListener,
    routes: Arc<RouteTable>,
    queues: Queues,
    read_timeout: Duration,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept error: {}", e);
                continue;
            }
        };
        let routes = routes.clone();
        let queues = queues.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer, routes, queues, read_timeout).await;
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    routes: Arc<RouteTable>,
    queues: Queues,
    read_timeout: Duration,
) {
    let read = tokio::time::timeout(read_timeout, read_request(&mut stream, peer)).await;
    let resp = match read {
        Err(_) => {
            debug!("{}: request not received within {:?}", peer, read_timeout);
            Response::text(408, "request not received in time")
        }
        Ok(Ok(Some(req))) => {
            debug!("{} {} {} from {}", req.method, req.path, req.body.len(), peer);
            queues.stats().record_request();
            routes.dispatch(req, &queues).await
        }
        Ok(Ok(None)) => return,
        Ok(Err(RequestError::Io(e))) => {
            debug!("{}: read error: {}", peer, e);
            return;
        }
        Ok(Err(RequestError::TooLarge)) => Response::text(413, "request too large"),
        Ok(Err(e)) => Response::bad_request(e.to_string()),
    };
    if let Err(e) = write_response(&mut stream, &resp).await {
        debug!("{}: write error: {}", peer, e);
    }
}

/// Read one request. `Ok(None)` when the peer closed before sending anything.
pub async fn read_request(
    stream: &mut TcpStream,
    peer: SocketAddr,
) -> Result<Option<Request>, RequestError> {
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    let (method, path, headers, head_len) = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(RequestError::Malformed("connection closed mid-request".into()));
        }
        buf.extend_from_slice(&chunk[..n]);

        let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut raw_headers);
        match req.parse(&buf) {
            Ok(httparse::Status::Complete(head_len)) => {
                let method = req.method.unwrap_or_default().to_string();
                let target = req.path.unwrap_or("/");
                let path = target.split('?').next().unwrap_or("/").to_string();
                let headers = req
                    .headers
                    .iter()
                    .map(|h| {
                        (
                            h.name.to_string(),
                            String::from_utf8_lossy(h.value).trim().to_string(),
                        )
                    })
                    .collect::<Vec<_>>();
                break (method, path, headers, head_len);
            }
            Ok(httparse::Status::Partial) => {
                if buf.len() > MAX_HEAD_LEN {
                    return Err(RequestError::TooLarge);
                }
            }
            Err(e) => return Err(RequestError::Malformed(e.to_string())),
        }
    };

    let content_length = match headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("Content-Length"))
    {
        Some((_, v)) => v
            .parse::<usize>()
            .map_err(|_| RequestError::Malformed(format!("invalid Content-Length: {:?}", v)))?,
        None => 0,
    };
    let chunked = headers.iter().any(|(n, v)| {
        n.eq_ignore_ascii_case("Transfer-Encoding") && !v.eq_ignore_ascii_case("identity")
    });
    if chunked {
        return Err(RequestError::Malformed("chunked bodies are not supported".into()));
    }
    if content_length > MAX_BODY_LEN {
        return Err(RequestError::TooLarge);
    }

    let mut body = buf.split_off(head_len);
    if body.len() > content_length {
        body.truncate(content_length);
    } else if body.len() < content_length {
        let already = body.len();
        body.resize(content_length, 0);
        stream.read_exact(&mut body[already..]).await?;
    }

    Ok(Some(Request {
        method,
        path,
        headers,
        body,
        peer,
    }))
}

pub async fn write_response(stream: &mut TcpStream, resp: &Response) -> std::io::Result<()> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\n",
        resp.status,
        reason(resp.status),
        resp.body.len()
    );
    if let Some(ct) = resp.content_type {
        head.push_str(&format!("Content-Type: {}\r\n", ct));
    }
    head.push_str("Connection: close\r\n\r\n");
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&resp.body).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn parse_raw(raw: &'static [u8]) -> Result<Option<Request>, RequestError> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move {
            let mut s = TcpStream::connect(addr).await.unwrap();
            s.write_all(raw).await.unwrap();
            s.shutdown().await.unwrap();
        });
        let (mut stream, peer) = listener.accept().await.unwrap();
        let out = read_request(&mut stream, peer).await;
        client.await.unwrap();
        out
    }

    #[tokio::test]
    async fn parses_head_and_body() {
        let req = parse_raw(
            b"POST /packets?x=1 HTTP/1.1\r\nHost: a\r\nContent-Type: application/octet-stream\r\nContent-Length: 5\r\n\r\nhello",
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/packets");
        assert_eq!(req.content_type(), Some("application/octet-stream"));
        assert_eq!(req.header("content-length"), Some("5"));
        assert_eq!(req.body, b"hello");
    }

    #[tokio::test]
    async fn no_body_without_content_length() {
        let req = parse_raw(b"GET /healthz HTTP/1.1\r\nHost: a\r\n\r\n")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.method, "GET");
        assert!(req.body.is_empty());
    }

    #[tokio::test]
    async fn closed_connection_is_none() {
        assert!(parse_raw(b"").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let err = parse_raw(b"\x00\x01 not http\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, RequestError::Malformed(_)));
    }

    #[tokio::test]
    async fn oversized_body_rejected() {
        let err = parse_raw(b"POST / HTTP/1.1\r\nContent-Length: 99999999\r\n\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::TooLarge));
    }

    #[tokio::test]
    async fn stalled_body_is_cut_off() {
        use crate::adapter::{Adapter, AdapterOptions};

        let adapter = Adapter::new(AdapterOptions::default()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(
            listener,
            Arc::new(RouteTable::new()),
            adapter.queues(),
            Duration::from_millis(200),
        ));

        let mut s = TcpStream::connect(addr).await.unwrap();
        s.write_all(b"POST /packets HTTP/1.1\r\nContent-Length: 10\r\n\r\nab")
            .await
            .unwrap();
        let mut answer = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), s.read_to_end(&mut answer))
            .await
            .expect("connection left hanging")
            .unwrap();
        assert!(answer.starts_with(b"HTTP/1.1 408 "));
        server.abort();
    }

    #[test]
    fn reason_phrases() {
        assert_eq!(reason(202), "Accepted");
        assert_eq!(reason(409), "Conflict");
        assert_eq!(reason(501), "Not Implemented");
    }
}
