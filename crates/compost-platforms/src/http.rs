//! Shared reqwest plumbing for the platform backends.

use std::time::Duration;

use compost_core::{CompostError, Result};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_LIMIT: usize = 800;

/// Build a header value from a token, rejecting control characters.
pub(crate) fn secret_header(value: &str) -> Result<HeaderValue> {
    let mut header = HeaderValue::from_str(value.trim())
        .map_err(|_| CompostError::InvalidInput("token contains invalid characters".into()))?;
    header.set_sensitive(true);
    Ok(header)
}

fn truncate_for_error(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let truncated: String = body.chars().take(max_chars).collect();
    format!("{truncated}...")
}

/// HTTP client bound to one platform's default headers.
#[derive(Debug, Clone)]
pub(crate) struct ApiClient {
    http: reqwest::Client,
    platform: &'static str,
}

impl ApiClient {
    pub(crate) fn new(platform: &'static str, mut headers: HeaderMap) -> Result<Self> {
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("compost/", env!("CARGO_PKG_VERSION"))),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CompostError::Transport {
                operation: format!("{platform} client setup"),
                message: e.to_string(),
            })?;
        Ok(Self { http, platform })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<reqwest::Response> {
        let operation = format!("{} api {operation}", self.platform);
        debug!("Sending {operation} request");

        let response = request.send().await.map_err(|e| CompostError::Transport {
            operation: operation.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(CompostError::Api {
            operation,
            status: status.as_u16(),
            message: truncate_for_error(&body, ERROR_BODY_LIMIT),
        })
    }

    /// Send and decode a JSON response.
    pub(crate) async fn request_json<T>(&self, operation: &str, request: RequestBuilder) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send(operation, request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| CompostError::Transport {
                operation: format!("{} api {operation}", self.platform),
                message: format!("failed to decode response: {e}"),
            })
    }

    /// Send and discard the response body.
    pub(crate) async fn request_empty(&self, operation: &str, request: RequestBuilder) -> Result<()> {
        self.send(operation, request).await.map(|_| ())
    }
}
