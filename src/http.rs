//! Shared HTTP plumbing for the model endpoints

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};

use crate::errors::{RagError, Result};

/// Longest error body kept in an `Upstream` error
const MAX_ERROR_BODY: usize = 512;

/// Build a JSON client, with bearer auth when a key is given
pub fn build_client(api_key: Option<&str>, timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
        let value = HeaderValue::from_str(&format!("Bearer {}", key))
            .map_err(|_| RagError::ConfigError("API key contains invalid characters".to_string()))?;
        headers.insert(AUTHORIZATION, value);
    }

    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(RagError::HttpError)
}

/// Join a base URL and a path without doubling slashes
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Turn a non-success status into `RagError::Upstream`
pub async fn check_status(service: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|&i| body.is_char_boundary(i))
            .unwrap_or(0);
        body.truncate(cut);
    }

    Err(RagError::Upstream {
        service: service.to_string(),
        status: status.as_u16(),
        body,
    })
}
