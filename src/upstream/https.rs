//! DNS-over-HTTPS upstream (RFC 8484 GET form).
//!
//! ```text
//! GET https://<server>/dns-query?dns=<base64url(query), no padding>
//! Accept: application/dns-message
//! ```

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::header::ACCEPT;
use std::time::Duration;
use tracing::debug;

use super::{RoundRobin, Upstream};
use crate::dns::DnsMessage;
use crate::error::ResolveError;

const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";
const DEFAULT_SCHEME: &str = "https";

/// DoH transport over a pool of servers.
pub struct HttpsUpstream {
    pool: RoundRobin,
    client: reqwest::Client,
    timeout: Duration,
    scheme: String,
}

impl HttpsUpstream {
    pub fn new(pool: RoundRobin, timeout: Duration) -> Self {
        Self::with_scheme(pool, timeout, DEFAULT_SCHEME)
    }

    /// Same as [`new`](Self::new) but talking `scheme` (e.g. plain `http`
    /// to a local resolver or test server).
    pub fn with_scheme(pool: RoundRobin, timeout: Duration, scheme: &str) -> Self {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            pool,
            client,
            timeout,
            scheme: scheme.to_string(),
        }
    }
}

/// Request URL for a packed query sent to `server`.
pub fn query_url(server: &str, packed: &[u8]) -> String {
    request_url(DEFAULT_SCHEME, server, packed)
}

fn request_url(scheme: &str, server: &str, packed: &[u8]) -> String {
    format!(
        "{}://{}/dns-query?dns={}",
        scheme,
        server,
        URL_SAFE_NO_PAD.encode(packed)
    )
}

#[async_trait]
impl Upstream for HttpsUpstream {
    async fn resolve(&self, query: &DnsMessage) -> Result<Vec<u8>, ResolveError> {
        let packed = query.encode()?;
        let server = self.pool.next_endpoint();
        let url = request_url(&self.scheme, server, &packed);

        debug!(server, domain = query.domain(), "Sending DoH query");

        let timed_out = || ResolveError::Timeout {
            endpoint: server.to_string(),
            timeout: self.timeout,
        };

        let response = tokio::time::timeout(
            self.timeout,
            self.client
                .get(&url)
                .header(ACCEPT, DNS_MESSAGE_CONTENT_TYPE)
                .send(),
        )
        .await
        .map_err(|_| timed_out())??;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Status {
                endpoint: server.to_string(),
                status: status.as_u16(),
            });
        }

        let body = tokio::time::timeout(self.timeout, response.bytes())
            .await
            .map_err(|_| timed_out())??;

        debug!(server, response_len = body.len(), "DoH response received");

        Ok(body.to_vec())
    }

    fn protocol_name(&self) -> &'static str {
        "HTTPS"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DnsQuestion, DnsRecord, TYPE_A};
    use std::net::{Ipv4Addr, SocketAddr};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serves one HTTP/1.1 request with `status` and `body`, handing back the
    /// raw request head.
    async fn spawn_http_stub(status: &'static str, body: Vec<u8>) -> (SocketAddr, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let head = format!(
                "HTTP/1.1 {status}\r\ncontent-type: {DNS_MESSAGE_CONTENT_TYPE}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).await.unwrap();
            stream.write_all(&body).await.unwrap();
            stream.shutdown().await.unwrap();

            let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
        });

        (addr, rx)
    }

    fn plain_http_upstream(addr: SocketAddr) -> HttpsUpstream {
        HttpsUpstream::with_scheme(
            RoundRobin::new([addr.to_string()]).unwrap(),
            Duration::from_secs(2),
            "http",
        )
    }

    #[test]
    fn query_url_is_unpadded_base64url() {
        // 0xFB 0xFF encodes to "-_8" in the URL-safe alphabet, "-_8=" padded
        let url = query_url("1.1.1.1", &[0xFB, 0xFF]);

        assert_eq!(url, "https://1.1.1.1/dns-query?dns=-_8");
    }

    #[test]
    fn query_url_round_trips_query() {
        let query = DnsMessage::query(0, DnsQuestion::new("example.com", TYPE_A));
        let packed = query.encode().unwrap();

        let url = query_url("dns.example", &packed);
        let encoded = url.rsplit("dns=").next().unwrap();

        assert!(!encoded.contains('='));
        assert_eq!(URL_SAFE_NO_PAD.decode(encoded).unwrap(), packed);
    }

    #[tokio::test]
    async fn resolve_sends_get_and_returns_body_verbatim() {
        let query = DnsMessage::query(0x2222, DnsQuestion::new("example.com", TYPE_A));
        let answer = DnsMessage::answer(
            0x2222,
            query.question.clone(),
            vec![DnsRecord::a("example.com", 300, Ipv4Addr::new(93, 184, 216, 34))],
        )
        .encode()
        .unwrap();
        let (addr, request) = spawn_http_stub("200 OK", answer.clone()).await;

        let body = plain_http_upstream(addr).resolve(&query).await.unwrap();

        assert_eq!(body, answer);
        let request = request.await.unwrap().to_ascii_lowercase();
        let expected = format!(
            "get /dns-query?dns={} http/1.1\r\n",
            URL_SAFE_NO_PAD.encode(query.encode().unwrap())
        )
        .to_ascii_lowercase();
        assert!(request.starts_with(&expected), "request was {request:?}");
        assert!(request.contains("\r\naccept: application/dns-message\r\n"));
    }

    #[tokio::test]
    async fn resolve_reports_error_status() {
        let (addr, _request) = spawn_http_stub("503 Service Unavailable", Vec::new()).await;
        let query = DnsMessage::query(1, DnsQuestion::new("example.com", TYPE_A));

        let result = plain_http_upstream(addr).resolve(&query).await;

        match result {
            Err(ResolveError::Status { endpoint, status }) => {
                assert_eq!(endpoint, addr.to_string());
                assert_eq!(status, 503);
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resolve_rejects_unencodable_query() {
        let upstream = HttpsUpstream::new(
            RoundRobin::new(["127.0.0.1:1"]).unwrap(),
            Duration::from_millis(200),
        );
        let query = DnsMessage::query(1, DnsQuestion::new(&"a".repeat(64), TYPE_A));

        let result = upstream.resolve(&query).await;

        assert!(matches!(result, Err(ResolveError::Encode(_))));
    }
}
