//! `jwt-auth`: bearer token check against a configured allow-list.
use std::collections::HashSet;

use async_trait::async_trait;
use axum::body::Body;
use http::{HeaderValue, Request, StatusCode, header};
use serde::Deserialize;

use crate::core::{
    plugin::{Plugin, PluginError},
    recorder::ResponseRecorder,
};

pub const NAME: &str = "jwt-auth";

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Default, Deserialize)]
struct AuthSettings {
    #[serde(default)]
    tokens: Vec<String>,
}

/// Rejects requests whose `Authorization` header does not carry an accepted token.
///
/// The header may hold the raw token or `Bearer <token>`. With no `tokens`
/// configured every request is rejected.
#[derive(Debug, Default)]
pub struct BearerAuthPlugin {
    tokens: HashSet<String>,
}

impl BearerAuthPlugin {
    pub fn boxed() -> Box<dyn Plugin> {
        Box::new(Self::default())
    }

    fn reject(recorder: &mut ResponseRecorder, message: &str) -> PluginError {
        recorder.reply(StatusCode::UNAUTHORIZED, message);
        if let Some(headers) = recorder.headers_mut() {
            headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        PluginError::Rejected(message.to_string())
    }
}

#[async_trait]
impl Plugin for BearerAuthPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&mut self, config: Option<&serde_json::Value>) -> Result<(), PluginError> {
        let settings = match config {
            Some(value) => AuthSettings::deserialize(value).map_err(|e| PluginError::Init {
                plugin: NAME.to_string(),
                reason: e.to_string(),
            })?,
            None => AuthSettings::default(),
        };
        if settings.tokens.is_empty() {
            tracing::warn!(plugin = NAME, "No tokens configured, all requests will be rejected");
        }
        self.tokens = settings.tokens.into_iter().collect();
        Ok(())
    }

    async fn execute(
        &self,
        recorder: &mut ResponseRecorder,
        request: &mut Request<Body>,
    ) -> Result<(), PluginError> {
        let raw = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();

        if raw.is_empty() {
            return Err(Self::reject(recorder, "Unauthorized: No token provided"));
        }

        let token = raw.strip_prefix(BEARER_PREFIX).unwrap_or(raw).trim();
        if !self.tokens.contains(token) {
            return Err(Self::reject(recorder, "Unauthorized: Invalid token"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin(config: Option<serde_json::Value>) -> BearerAuthPlugin {
        let mut plugin = BearerAuthPlugin::default();
        plugin.init(config.as_ref()).unwrap();
        plugin
    }

    async fn run(plugin: &BearerAuthPlugin, auth: Option<&str>) -> (Result<(), PluginError>, ResponseRecorder) {
        let mut builder = Request::builder().uri("/secure");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        let mut recorder = ResponseRecorder::new();
        let result = plugin.execute(&mut recorder, &mut request).await;
        (result, recorder)
    }

    async fn body_of(recorder: ResponseRecorder) -> String {
        let body = axum::body::to_bytes(recorder.finish().into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_accepts_raw_and_bearer_tokens() {
        let plugin = plugin(Some(serde_json::json!({ "tokens": ["valid-token"] })));
        for auth in ["valid-token", "Bearer valid-token"] {
            let (result, recorder) = run(&plugin, Some(auth)).await;
            assert!(result.is_ok(), "{auth} should pass");
            assert!(!recorder.has_response());
        }
    }

    #[tokio::test]
    async fn test_missing_token() {
        let plugin = plugin(Some(serde_json::json!({ "tokens": ["valid-token"] })));
        let (result, recorder) = run(&plugin, None).await;
        assert!(matches!(result, Err(PluginError::Rejected(_))));
        assert_eq!(recorder.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_of(recorder).await, "Unauthorized: No token provided\n");
    }

    #[tokio::test]
    async fn test_invalid_token() {
        let plugin = plugin(Some(serde_json::json!({ "tokens": ["valid-token"] })));
        let (result, mut recorder) = run(&plugin, Some("Bearer nope")).await;
        assert!(result.is_err());
        assert_eq!(
            recorder.headers_mut().unwrap()[header::WWW_AUTHENTICATE],
            "Bearer"
        );
        assert_eq!(body_of(recorder).await, "Unauthorized: Invalid token\n");
    }

    #[tokio::test]
    async fn test_unconfigured_rejects_everything() {
        let plugin = plugin(None);
        let (result, _) = run(&plugin, Some("valid-token")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_settings_fail_init() {
        let mut plugin = BearerAuthPlugin::default();
        let result = plugin.init(Some(&serde_json::json!({ "tokens": "not-a-list" })));
        assert!(matches!(result, Err(PluginError::Init { .. })));
    }
}
