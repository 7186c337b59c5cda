use log::debug;

use crate::error::ApiError;

/// Retrieves rendered HTML from a running preview server.
pub trait HtmlFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String, ApiError>;
}

/// Plain blocking GET with no timeout of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct UreqFetcher;

impl HtmlFetcher for UreqFetcher {
    fn fetch(&self, url: &str) -> Result<String, ApiError> {
        debug!("Fetching rendered email from {}", url);
        let response = ureq::get(url).call().map_err(|e| match e {
            ureq::Error::StatusCode(code) => ApiError::Upstream(format!("{url} returned {code}")),
            other => ApiError::Upstream(other.to_string()),
        })?;
        response
            .into_body()
            .read_to_string()
            .map_err(|e| ApiError::Upstream(format!("Failed to read response from {url}: {e}")))
    }
}
