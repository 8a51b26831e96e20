// src/utils/http.rs

//! HTTP client utilities.
//!
//! Every network failure of a source maps to `SourceUnavailable` for that
//! source: connect errors, non-success statuses (401/403/429/5xx included)
//! and bodies that do not decode.

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::{AppError, Result};
use crate::models::IngestConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &IngestConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

async fn send(source_id: &str, request: RequestBuilder) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| AppError::source_unavailable(source_id, e))?;

    let status = response.status();
    if !status.is_success() {
        let reason = match status.as_u16() {
            401 | 403 => "unauthorized",
            429 => "rate limited",
            s if s >= 500 => "server error",
            _ => "request rejected",
        };
        return Err(AppError::source_unavailable(
            source_id,
            format!("HTTP {} ({reason}) from {}", status.as_u16(), response.url()),
        ));
    }
    Ok(response)
}

/// Send a request and decode the JSON body.
pub async fn send_json<T: DeserializeOwned>(source_id: &str, request: RequestBuilder) -> Result<T> {
    send(source_id, request)
        .await?
        .json::<T>()
        .await
        .map_err(|e| AppError::source_unavailable(source_id, format!("invalid JSON: {e}")))
}

/// Send a request and return the body as text.
pub async fn send_text(source_id: &str, request: RequestBuilder) -> Result<String> {
    send(source_id, request)
        .await?
        .text()
        .await
        .map_err(|e| AppError::source_unavailable(source_id, e))
}

/// Send a request and return the raw body.
pub async fn send_bytes(source_id: &str, request: RequestBuilder) -> Result<Vec<u8>> {
    let bytes = send(source_id, request)
        .await?
        .bytes()
        .await
        .map_err(|e| AppError::source_unavailable(source_id, e))?;
    Ok(bytes.to_vec())
}
