//! Shared plumbing for the JSON-over-HTTP adapters.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::error;

use crate::domain::{AppError, ExternalServiceError};

/// Default bound on one outbound request
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub fn build_client(timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ExternalServiceError::Configuration(format!("HTTP client: {e}")).into())
}

/// Send `request` and decode a successful JSON body.
///
/// 429 maps to `RateLimited`, other non-2xx statuses to `ApiError` with the
/// response body as message.
pub async fn fetch_json<T: DeserializeOwned>(service: &str, request: RequestBuilder) -> Result<T, AppError> {
    let response = request.send().await.map_err(|e| {
        error!(service, error = %e, "Request failed");
        ExternalServiceError::from(e)
    })?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ExternalServiceError::RateLimited(format!("{service} returned 429")).into());
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!(service, status = %status, body = %body, "API returned error");
        return Err(ExternalServiceError::ApiError {
            status_code: status.as_u16(),
            message: body,
        }
        .into());
    }

    response.json::<T>().await.map_err(|e| {
        error!(service, error = %e, "Failed to parse response");
        ExternalServiceError::ParseError(e.to_string()).into()
    })
}
