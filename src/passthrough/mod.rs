// Upstream Anthropic Passthrough (C5, spec §4.5): a byte-level HTTPS proxy
// to the real `api.anthropic.com`, reached at a pinned IP with the real
// hostname preserved as SNI/Host. Everything but the hop-by-hop headers
// and the 400 thinking-signature retry is forwarded verbatim.

mod cached_ip;
mod strip;

pub use cached_ip::CachedIp;
pub use strip::strip_thinking_blocks;

use crate::config::PassthroughConfig;
use crate::error::{ProxyError, Result};
use async_compression::tokio::bufread::{BrotliDecoder, DeflateDecoder, GzipDecoder};
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader};
use tracing::{debug, warn};

/// `TIMEOUT_PASSTHROUGH=120_000 ms` (spec §6).
const TIMEOUT_PASSTHROUGH: Duration = Duration::from_secs(120);
/// Cap on the buffered body when inspecting a 400 for the thinking-signature
/// retry — it never needs to exceed the inbound request-body bound.
const MAX_400_BODY: usize = 10 * 1024 * 1024;
/// The exact substring the real Anthropic backend emits for an invalid
/// `thinking` block signature (spec §4.5, §7).
const THINKING_SIGNATURE_MARKER: &str = "Invalid `signature` in `thinking` block";

/// Request headers that must never be copied upstream verbatim — either
/// because they are connection-scoped, or because `content-length`/`host`
/// are recomputed for the new peer (spec §4.5).
const HOP_BY_HOP: &[&str] = &["host", "connection", "transfer-encoding", "content-length"];

pub struct PassthroughClient {
    http_client: Client,
    upstream_host: String,
    cached_ip: CachedIp,
}

impl PassthroughClient {
    /// Resolve (or load the persisted) upstream IP and build a client
    /// pinned to it via `reqwest::resolve`, which lets the TLS handshake's
    /// SNI and the `Host` header stay on the real hostname while the TCP
    /// connection goes straight to the cached address.
    pub async fn new(config: &PassthroughConfig) -> Result<Self> {
        let cached_ip = CachedIp::load_or_resolve(&config.upstream_host, &config.ip_cache_path).await?;
        let addr = SocketAddr::new(cached_ip.get(), 443);

        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .resolve(&config.upstream_host, addr)
            .use_rustls_tls()
            .build()
            .map_err(|e| ProxyError::Internal(format!("failed to create passthrough HTTP client: {e}")))?;

        Ok(Self { http_client, upstream_host: config.upstream_host.clone(), cached_ip })
    }

    /// `forward(method, path, headers, body, retryBody?)` (spec §4.5).
    /// `retry_body` is the pre-computed `strip_thinking_blocks(body)`
    /// result; it is only used if the first response is a 400 carrying the
    /// thinking-signature marker, and only ever retried once.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
        retry_body: Option<Bytes>,
    ) -> Result<Response> {
        match self.send(method.clone(), path_and_query, headers, body).await {
            Ok(response) => self.handle_response(method, path_and_query, headers, response, retry_body).await,
            Err(e) => {
                warn!(error = %e, "passthrough upstream connection failed");
                Err(ProxyError::Passthrough(e.to_string()))
            }
        }
    }

    async fn send(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let url = format!("https://{}{}", self.upstream_host, path_and_query);
        let mut builder = self
            .http_client
            .request(method, &url)
            .timeout(TIMEOUT_PASSTHROUGH)
            .header("host", self.upstream_host.as_str());

        for (name, value) in headers.iter() {
            if HOP_BY_HOP.contains(&name.as_str().to_ascii_lowercase().as_str()) {
                continue;
            }
            builder = builder.header(name.clone(), value.clone());
        }

        builder.body(body).send().await
    }

    async fn handle_response(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        response: reqwest::Response,
        retry_body: Option<Bytes>,
    ) -> Result<Response> {
        if response.status() == StatusCode::BAD_REQUEST {
            if let Some(retry_body) = retry_body {
                let status = response.status();
                let headers_out = response.headers().clone();
                let encoding = headers_out
                    .get(reqwest::header::CONTENT_ENCODING)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("identity")
                    .to_string();

                let raw = read_capped(response, MAX_400_BODY).await;
                let decoded = decompress(&raw, &encoding).await;

                if String::from_utf8_lossy(&decoded).contains(THINKING_SIGNATURE_MARKER) {
                    debug!("passthrough 400 carried thinking-signature marker, retrying with stripped body");
                    crate::metrics::record_passthrough_retry("retried");
                    let retried = self.send(method, path_and_query, headers, retry_body).await.map_err(|e| {
                        ProxyError::Passthrough(format!("retry after thinking-signature strip failed: {e}"))
                    })?;
                    return Ok(raw_response(retried).await);
                }

                crate::metrics::record_passthrough_retry("not_matched");
                return Ok(bytes_response(status, headers_out, raw));
            }
        }

        Ok(raw_response(response).await)
    }

    pub fn upstream_host(&self) -> &str {
        &self.upstream_host
    }

    pub fn cached_ip(&self) -> &CachedIp {
        &self.cached_ip
    }
}

/// Stream-pipe the upstream response to the client unmodified, preserving
/// status and headers (spec §4.5: "all other responses stream-pipe
/// upstream → client with backpressure" — `axum::body::Body::from_stream`
/// and the hyper server loop apply that backpressure for us).
async fn raw_response(response: reqwest::Response) -> Response {
    let status = response.status();
    let headers = response.headers().clone();
    let byte_stream = response.bytes_stream().map(|r| r.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)));
    let mut builder = Response::builder().status(status);
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }
    builder.body(Body::from_stream(byte_stream)).unwrap_or_else(|_| {
        (StatusCode::BAD_GATEWAY, "passthrough response build failed").into_response()
    })
}

fn bytes_response(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Response {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers.iter() {
        if name == reqwest::header::CONTENT_LENGTH {
            continue;
        }
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_str().as_bytes()), HeaderValue::from_bytes(value.as_bytes())) {
            builder = builder.header(name, value);
        }
    }
    builder.body(Body::from(body)).unwrap_or_else(|_| {
        (StatusCode::BAD_GATEWAY, "passthrough response build failed").into_response()
    })
}

async fn read_capped(response: reqwest::Response, cap: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(next) = stream.next().await {
        let Ok(bytes) = next else { break };
        buf.extend_from_slice(&bytes);
        if buf.len() >= cap {
            buf.truncate(cap);
            break;
        }
    }
    buf
}

/// Decompress a buffered body per `content-encoding` (spec §4.5: "decompress
/// per content-encoding (gzip|x-gzip|br|deflate or identity)"). Decompress
/// failures fall back to the raw bytes — the signature scan then simply
/// finds nothing, which is the same as a genuine non-match.
async fn decompress(body: &[u8], encoding: &str) -> Vec<u8> {
    let cursor = std::io::Cursor::new(body.to_vec());
    let mut out = Vec::new();

    let result = match encoding.to_ascii_lowercase().as_str() {
        "gzip" | "x-gzip" => GzipDecoder::new(BufReader::new(cursor)).read_to_end(&mut out).await,
        "br" => BrotliDecoder::new(BufReader::new(cursor)).read_to_end(&mut out).await,
        "deflate" => DeflateDecoder::new(BufReader::new(cursor)).read_to_end(&mut out).await,
        _ => return body.to_vec(),
    };

    match result {
        Ok(_) => out,
        Err(e) => {
            warn!(error = %e, encoding, "failed to decompress passthrough 400 body, scanning raw bytes");
            body.to_vec()
        }
    }
}
