use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tracing::Instrument;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

/// Upstream HTTP client built on hyper-util's pooled client with rustls.
///
/// Plain `http://` and `https://` upstreams share one connection pool.
/// Requests go out as HTTP/1.1; deadlines are applied by the caller.
#[derive(Clone)]
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
}

impl HttpClientAdapter {
    pub fn new() -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();
        for cert in native_certs.certs {
            if root_cert_store.add(cert).is_err() {
                tracing::warn!("Failed to add native certificate to rustls RootCertStore");
            }
        }
        if !native_certs.errors.is_empty() {
            tracing::warn!(errors = ?native_certs.errors, "Some native certificates failed to load");
        }
        tracing::debug!(roots = root_cert_store.len(), "Loaded native root certificates");

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);
        Ok(Self { client })
    }

    /// Authority of the request URI as a `Host` header value.
    fn host_header(req: &Request<AxumBody>) -> HttpClientResult<HeaderValue> {
        let authority = req.uri().authority().ok_or_else(|| {
            HttpClientError::InvalidRequest(format!("outgoing URI has no host: {}", req.uri()))
        })?;
        HeaderValue::from_str(authority.as_str())
            .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        let upstream = format!(
            "{}://{}",
            req.uri().scheme_str().unwrap_or("http"),
            req.uri()
                .authority()
                .map_or_else(|| "unknown".to_string(), |a| a.to_string())
        );
        let span = tracing::info_span!(
            "upstream_request",
            upstream = %upstream,
            http.method = %req.method(),
            http.path = %req.uri().path(),
            http.status_code = tracing::field::Empty,
        );

        if !req.headers().contains_key(header::HOST) {
            let host = Self::host_header(&req)?;
            req.headers_mut().insert(header::HOST, host);
        }
        *req.version_mut() = Version::HTTP_11;

        let method = req.method().clone();
        let uri = req.uri().clone();
        let client = self.client.clone();

        async move {
            tracing::debug!(headers = ?req.headers(), "Sending upstream request");
            match client.request(req).await {
                Ok(response) => {
                    tracing::Span::current().record("http.status_code", response.status().as_u16());
                    let (mut parts, body) = response.into_parts();
                    // axum re-frames the streamed body
                    parts.headers.remove(header::TRANSFER_ENCODING);
                    Ok(Response::from_parts(parts, AxumBody::new(body)))
                }
                Err(e) => {
                    tracing::Span::current().record("http.status_code", 599u16);
                    tracing::warn!(%method, %uri, error = %e, "Upstream request failed");
                    Err(HttpClientError::ConnectionError(format!(
                        "request to {method} {uri} failed: {e}"
                    )))
                }
            }
        }
        .instrument(span)
        .await
    }
}
