//! Single-upstream reverse proxy adapter.
//!
//! One [`ProxyAdapter`] is built per route when the routing table is compiled.
//! Forwarding rewrites the request target onto the upstream (scheme, authority,
//! joined base path, merged query), optionally strips the route's mount path,
//! points `Host` at the upstream and records the upstream response into the
//! request's [`ResponseRecorder`]. Any transport failure is answered with
//! `502 Bad Gateway`.
use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{body::Body, extract::ConnectInfo};
use http::{
    HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri, Version, header,
    uri::{Authority, PathAndQuery, Scheme},
};
use thiserror::Error;
use url::Url;

use crate::{
    core::recorder::ResponseRecorder,
    ports::http_client::{HttpClient, HttpClientError},
};

/// Headers that describe a single transport hop and must not be forwarded.
const HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Errors raised while building or applying a proxy target.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("invalid upstream '{upstream}': {reason}")]
    InvalidUpstream { upstream: String, reason: String },

    #[error("cannot build upstream URI: {0}")]
    InvalidUri(String),
}

pub struct ProxyAdapter {
    upstream: String,
    scheme: Scheme,
    authority: Authority,
    base_path: String,
    base_query: Option<String>,
    strip_prefix: Option<String>,
    client: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl ProxyAdapter {
    /// Build an adapter for `upstream`.
    ///
    /// `strip_prefix` is the mount path to remove from forwarded paths; pass
    /// `None` to forward paths untouched.
    pub fn new(
        upstream: &str,
        strip_prefix: Option<&str>,
        client: Arc<dyn HttpClient>,
        timeout: Duration,
    ) -> Result<Self, ProxyError> {
        let invalid = |reason: String| ProxyError::InvalidUpstream {
            upstream: upstream.to_string(),
            reason,
        };

        let url = Url::parse(upstream).map_err(|e| invalid(e.to_string()))?;
        let scheme = match url.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            other => return Err(invalid(format!("unsupported scheme '{other}'"))),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host".to_string()))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority = authority
            .parse::<Authority>()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            upstream: upstream.to_string(),
            scheme,
            authority,
            base_path: url.path().to_string(),
            base_query: url.query().filter(|q| !q.is_empty()).map(str::to_string),
            strip_prefix: strip_prefix
                .filter(|p| !p.is_empty() && *p != "/")
                .map(str::to_string),
            client,
            timeout,
        })
    }

    /// Compute the upstream URI for an inbound request URI.
    pub fn target_uri(&self, original: &Uri) -> Result<Uri, ProxyError> {
        let path = self.forwarded_path(original.path());
        let joined = join_paths(&self.base_path, path);

        let query = match (self.base_query.as_deref(), original.query()) {
            (Some(base), Some(extra)) if !extra.is_empty() => Some(format!("{base}&{extra}")),
            (Some(base), _) => Some(base.to_string()),
            (None, Some(extra)) if !extra.is_empty() => Some(extra.to_string()),
            _ => None,
        };
        let path_and_query = match query {
            Some(q) => format!("{joined}?{q}"),
            None => joined,
        };
        let path_and_query = path_and_query
            .parse::<PathAndQuery>()
            .map_err(|e| ProxyError::InvalidUri(e.to_string()))?;

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| ProxyError::InvalidUri(e.to_string()))
    }

    fn forwarded_path<'a>(&self, path: &'a str) -> &'a str {
        let Some(mount) = self.strip_prefix.as_deref() else {
            return path;
        };
        match path.strip_prefix(mount) {
            Some("") => "/",
            Some(rest) if rest.starts_with('/') => rest,
            // "/apiv2" must not lose "/api"
            _ => path,
        }
    }

    /// Rewrite `request` for the upstream: target URI, `Host` and forwarding headers.
    pub fn prepare(&self, request: Request<Body>) -> Result<Request<Body>, ProxyError> {
        let (mut parts, body) = request.into_parts();
        let original_host = parts.headers.get(header::HOST).cloned();
        let client_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        parts.uri = self.target_uri(&parts.uri)?;
        parts.version = Version::HTTP_11;

        let headers = &mut parts.headers;
        remove_hop_by_hop(headers);

        let host = HeaderValue::from_str(self.authority.as_str())
            .map_err(|e| ProxyError::InvalidUri(e.to_string()))?;
        headers.insert(header::HOST, host);

        if let Some(addr) = client_addr {
            let client_ip = addr.ip().to_string();
            let forwarded_for = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(prior) if !prior.is_empty() => format!("{prior}, {client_ip}"),
                _ => client_ip,
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }
        if let Some(original_host) = original_host {
            headers.insert(X_FORWARDED_HOST, original_host);
        }
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));

        Ok(Request::from_parts(parts, body))
    }

    /// Forward `request` upstream and record the outcome into `recorder`.
    pub async fn forward(&self, recorder: &mut ResponseRecorder, request: Request<Body>) {
        let method = request.method().clone();
        let outbound = match self.prepare(request) {
            Ok(outbound) => outbound,
            Err(e) => {
                tracing::warn!(upstream = %self.upstream, error = %e, "Failed to rewrite request");
                recorder.reply(StatusCode::BAD_GATEWAY, format!("Upstream error: {e}"));
                return;
            }
        };
        let target = outbound.uri().clone();

        let result = match tokio::time::timeout(self.timeout, self.client.send_request(outbound))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(HttpClientError::Timeout(self.timeout)),
        };

        match result {
            Ok(mut response) => {
                remove_hop_by_hop(response.headers_mut());
                tracing::debug!(%method, %target, status = %response.status(), "Upstream responded");
                recorder.write_response(response);
            }
            Err(e) => {
                tracing::warn!(%method, %target, error = %e, "Upstream request failed");
                recorder.reply(StatusCode::BAD_GATEWAY, format!("Upstream error: {e}"));
            }
        }
    }
}

impl std::fmt::Debug for ProxyAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyAdapter")
            .field("upstream", &self.upstream)
            .field("strip_prefix", &self.strip_prefix)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Join two path segments with exactly one slash between them.
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Drop hop-by-hop headers, including any listed in `Connection`.
fn remove_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed.iter().chain(HOP_BY_HOP_HEADERS.iter()) {
        headers.remove(name);
    }
}
