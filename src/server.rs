//! Minimal HTTP front for [`PreviewApi`], one thread per request.

use log::{debug, error, info};
use serde_json::{Map, Value};
use std::io::Read;
use std::sync::Arc;
use std::thread;
use tiny_http::{Header, Method, Request, Response, Server};

use crate::api::{ApiRequest, ErrorPayload, PreviewApi};
use crate::error::ApiError;
use crate::gate::GateRequest;

/// Catch-all route the preview API is mounted on.
pub const API_ROUTE_PREFIX: &str = "/api/nge";

/// Largest request body accepted.
pub const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Percent-decoded template id addressed by a request URL, if it is under
/// the API route. The id may be empty, which the API rejects as a missing
/// path.
pub fn route_id(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let rest = path.strip_prefix(API_ROUTE_PREFIX)?;
    if rest.is_empty() {
        return Some(String::new());
    }
    let raw = rest.strip_prefix('/')?;
    urlencoding::decode(raw).ok().map(|id| id.into_owned())
}

/// Reads at most [`MAX_BODY_BYTES`] from `reader` and parses it.
pub fn read_body(reader: impl Read) -> Result<Map<String, Value>, ApiError> {
    let mut raw = String::new();
    reader
        .take(MAX_BODY_BYTES + 1)
        .read_to_string(&mut raw)
        .map_err(|e| ApiError::InvalidBody(e.to_string()))?;
    if raw.len() as u64 > MAX_BODY_BYTES {
        return Err(ApiError::InvalidBody(format!(
            "body exceeds {MAX_BODY_BYTES} bytes"
        )));
    }
    parse_body(&raw)
}

/// Parses a JSON object body; an empty body is an empty object.
pub fn parse_body(raw: &str) -> Result<Map<String, Value>, ApiError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::InvalidBody("expected a JSON object".to_string())),
        Err(e) => Err(ApiError::InvalidBody(e.to_string())),
    }
}

pub fn serve(api: Arc<PreviewApi>, addr: &str) -> anyhow::Result<()> {
    let server = Server::http(addr).map_err(|e| anyhow::anyhow!("Failed to bind {addr}: {e}"))?;
    info!("Preview API listening on http://{}{}/<template>", addr, API_ROUTE_PREFIX);

    for request in server.incoming_requests() {
        let api = Arc::clone(&api);
        thread::spawn(move || handle_request(&api, request));
    }
    Ok(())
}

fn handle_request(api: &PreviewApi, mut request: Request) {
    let url = request.url().to_string();
    debug!("{} {}", request.method(), url);

    let (status, body) = match route_id(&url) {
        None => (404, json_error(&ApiError::NotFound(url.clone()))),
        Some(_) if request.method() != &Method::Post => {
            (405, r#"{"success":false,"statusCode":405,"message":"Method not allowed"}"#.to_string())
        }
        Some(id) => {
            let outcome = read_body(request.as_reader()).and_then(|body| {
                let api_request = ApiRequest {
                    path: id,
                    gate: gate_request(&request),
                    body,
                };
                api.handle(&api_request)
            });
            match outcome {
                Ok(response) => match serde_json::to_string(&response) {
                    Ok(json) => (200, json),
                    Err(e) => (500, json_error(&ApiError::handler(e.to_string()))),
                },
                Err(e) => (e.status(), json_error(&e)),
            }
        }
    };

    let mut response = Response::from_string(body).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response = response.with_header(header);
    }
    if let Err(e) = request.respond(response) {
        error!("Failed to respond to {}: {}", url, e);
    }
}

fn gate_request(request: &Request) -> GateRequest {
    let mut gate = GateRequest::new();
    for header in request.headers() {
        gate = gate.with_header(header.field.as_str().as_str(), header.value.as_str());
    }
    if let Some(addr) = request.remote_addr() {
        gate = gate.with_remote_addr(addr.ip().to_string());
    }
    gate
}

fn json_error(err: &ApiError) -> String {
    serde_json::to_string(&ErrorPayload::from(err))
        .unwrap_or_else(|_| format!(r#"{{"success":false,"statusCode":{}}}"#, err.status()))
}
