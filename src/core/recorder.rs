//! Per-request response recorder.
//!
//! A [`ResponseRecorder`] is the outbound channel handed to every plugin in a
//! route's chain and finally to the proxy adapter. It remembers the status code
//! (200 until something sets it) and the response produced so far. When the
//! handler is done, [`ResponseRecorder::finish`] turns it into the response
//! sent to the client; if any plugin registered a completion hook, the body is
//! wrapped so that bytes are counted as they stream out and the hooks fire
//! once the body has been fully sent or dropped.
use axum::body::Body;
use http::{HeaderMap, HeaderValue, Response, StatusCode, header};
use http_body_util::BodyExt;

/// What observability hooks learn about a finished response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseSummary {
    pub status: StatusCode,
    /// Body bytes handed to the client
    pub bytes: u64,
}

/// Callback run once the response body is done.
pub type CompletionHook = Box<dyn FnOnce(&ResponseSummary) + Send + 'static>;

pub struct ResponseRecorder {
    status: StatusCode,
    response: Option<Response<Body>>,
    hooks: Vec<CompletionHook>,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            response: None,
            hooks: Vec::new(),
        }
    }

    /// Status recorded so far.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Whether a plugin or the proxy has already produced a response.
    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
        if let Some(response) = self.response.as_mut() {
            *response.status_mut() = status;
        }
    }

    /// Headers of the recorded response, if one has been written.
    pub fn headers_mut(&mut self) -> Option<&mut HeaderMap> {
        self.response.as_mut().map(Response::headers_mut)
    }

    /// Record a complete response, replacing anything written before.
    pub fn write_response(&mut self, response: Response<Body>) {
        self.status = response.status();
        self.response = Some(response);
    }

    /// Write a short plain-text response, the way terminal plugin rejections do.
    pub fn reply(&mut self, status: StatusCode, message: impl Into<String>) {
        let mut body = message.into();
        body.push('\n');
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response.headers_mut().insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        self.write_response(response);
    }

    /// Run `hook` after the response body has been delivered (or abandoned).
    pub fn on_complete<F>(&mut self, hook: F)
    where
        F: FnOnce(&ResponseSummary) + Send + 'static,
    {
        self.hooks.push(Box::new(hook));
    }

    /// Turn the recorder into the client response.
    pub fn finish(self) -> Response<Body> {
        let status = self.status;
        let response = self.response.unwrap_or_else(|| {
            let mut empty = Response::new(Body::empty());
            *empty.status_mut() = status;
            empty
        });

        if self.hooks.is_empty() {
            return response;
        }

        let mut guard = CompletionGuard {
            status,
            bytes: 0,
            hooks: self.hooks,
        };
        let (parts, body) = response.into_parts();
        let counted = body.map_frame(move |frame| {
            if let Some(data) = frame.data_ref() {
                guard.bytes += data.len() as u64;
            }
            frame
        });
        Response::from_parts(parts, Body::new(counted))
    }
}

impl Default for ResponseRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned by the body wrapper; dropping it means the body is finished.
struct CompletionGuard {
    status: StatusCode,
    bytes: u64,
    hooks: Vec<CompletionHook>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let summary = ResponseSummary {
            status: self.status,
            bytes: self.bytes,
        };
        for hook in self.hooks.drain(..) {
            hook(&summary);
        }
    }
}
