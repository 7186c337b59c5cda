//! Host-independent handling of a preview API request: gate, template
//! lookup, render fetch and send hook.

use log::{error, info};
use serde::Serialize;
use serde_json::{Map, Value};
use std::panic::{self, AssertUnwindSafe};

use crate::codec;
use crate::error::{ApiError, GENERIC_FAILURE};
use crate::fetch::HtmlFetcher;
use crate::gate::{GateRequest, RequestGate};
use crate::hooks::SendHandler;
use crate::paths::{to_slash, PathMapper};

pub const SUCCESS_MESSAGE: &str = "Email rendered successfully";

/// A POST to the catch-all preview route.
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    /// Path segment after the route prefix, e.g. `account/invite`.
    pub path: String,
    pub gate: GateRequest,
    pub body: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
}

impl From<&ApiError> for ErrorPayload {
    fn from(err: &ApiError) -> Self {
        Self {
            success: false,
            status_code: err.status(),
            message: err.to_string(),
        }
    }
}

pub struct PreviewApi {
    mapper: PathMapper,
    site_url: String,
    gate: RequestGate,
    fetcher: Box<dyn HtmlFetcher>,
    send_handler: Option<Box<dyn SendHandler>>,
}

impl PreviewApi {
    pub fn new(
        mapper: PathMapper,
        site_url: impl Into<String>,
        gate: RequestGate,
        fetcher: Box<dyn HtmlFetcher>,
    ) -> Self {
        Self {
            mapper,
            site_url: site_url.into(),
            gate,
            fetcher,
            send_handler: None,
        }
    }

    pub fn with_send_handler(mut self, handler: Box<dyn SendHandler>) -> Self {
        self.send_handler = Some(handler);
        self
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    pub fn handle(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.gate.check(&request.gate)?;
        self.render_and_send(request)
    }

    /// Same as [`PreviewApi::handle`], with the gate's clock pinned to `now_ms`.
    pub fn handle_at(&self, request: &ApiRequest, now_ms: u64) -> Result<ApiResponse, ApiError> {
        self.gate.check_at(&request.gate, now_ms)?;
        self.render_and_send(request)
    }

    fn render_and_send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let id = request.path.trim_matches('/');
        if id.is_empty() {
            return Err(ApiError::MissingPath);
        }
        if id.split('/').any(|segment| segment.is_empty() || segment == "..") {
            return Err(ApiError::NotFound(id.to_string()));
        }

        let template = self.mapper.template_path(id);
        if !template.is_file() {
            return Err(ApiError::NotFound(id.to_string()));
        }

        let url = codec::preview_url(
            &self.site_url,
            self.mapper.route_prefix(),
            id,
            &request.body,
        );
        let html = self.fetcher.fetch(&url).map_err(|e| {
            error!("Render fetch for {} failed: {}", id, e);
            e
        })?;

        if let Some(handler) = &self.send_handler {
            let template_path = to_slash(&template);
            run_send_handler(handler.as_ref(), &html, &request.body, &template_path)?;
        }

        info!("Rendered {} ({} bytes)", id, html.len());
        Ok(ApiResponse {
            success: true,
            message: SUCCESS_MESSAGE.to_string(),
            html,
        })
    }
}

/// Runs the hook, turning errors and panics into a handler failure.
fn run_send_handler(
    handler: &dyn SendHandler,
    html: &str,
    data: &Map<String, Value>,
    template_path: &str,
) -> Result<(), ApiError> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        handler.send(html, data, template_path)
    }));
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("Send handler failed for {}: {}", template_path, e);
            Err(ApiError::handler(e.to_string()))
        }
        Err(_) => {
            error!("Send handler panicked for {}", template_path);
            Err(ApiError::Handler(GENERIC_FAILURE.to_string()))
        }
    }
}
