//! `logging`: one access-log event per request, emitted after the response body is done.
use std::time::Instant;

use async_trait::async_trait;
use axum::body::Body;
use http::Request;

use crate::core::{
    plugin::{Plugin, PluginError},
    recorder::ResponseRecorder,
};

pub const NAME: &str = "logging";

#[derive(Debug, Default)]
pub struct AccessLogPlugin;

impl AccessLogPlugin {
    pub fn boxed() -> Box<dyn Plugin> {
        Box::new(Self)
    }
}

#[async_trait]
impl Plugin for AccessLogPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&mut self, _config: Option<&serde_json::Value>) -> Result<(), PluginError> {
        Ok(())
    }

    async fn execute(
        &self,
        recorder: &mut ResponseRecorder,
        request: &mut Request<Body>,
    ) -> Result<(), PluginError> {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let started = Instant::now();

        recorder.on_complete(move |summary| {
            tracing::info!(
                target: "access_log",
                %method,
                %path,
                status = summary.status.as_u16(),
                bytes = summary.bytes,
                duration_ms = started.elapsed().as_millis() as u64,
                "request completed"
            );
        });
        Ok(())
    }
}
