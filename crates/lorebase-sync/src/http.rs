//! Shared HTTP plumbing for providers.
//!
//! One `reqwest` client with the per-request timeout, plus response
//! classification into the provider error kinds: 401/403 demand a
//! reconnect, 408/429/5xx are transient, other failures are fatal.

use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;

use lorebase_core::{Error, Result};

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent("lorebase-sync")
        .build()
        .expect("reqwest client construction is infallible here")
}

fn classify_status(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::ProviderAuthRequired {
            provider: String::new(),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Error::ProviderTransient(format!("{status}: {body}"))
        }
        s if s.is_server_error() => Error::ProviderTransient(format!("{status}: {body}")),
        s => Error::ProviderFatal(format!("{s}: {body}")),
    }
}

fn classify_request_error(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::ProviderTransient(e.to_string())
    } else {
        Error::ProviderFatal(e.to_string())
    }
}

/// Tag an auth error with the provider that raised it.
pub fn with_provider(err: Error, provider: &str) -> Error {
    match err {
        Error::ProviderAuthRequired { .. } => Error::ProviderAuthRequired {
            provider: provider.to_string(),
        },
        other => other,
    }
}

/// Execute a request and parse the JSON body.
pub async fn send_json<T: serde::de::DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request.send().await.map_err(classify_request_error)?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status, truncate(&body)));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| Error::ProviderFatal(format!("bad response body: {e}")))
}

/// Execute a request and return the raw bytes.
pub async fn send_bytes(request: RequestBuilder) -> Result<Vec<u8>> {
    let response = request.send().await.map_err(classify_request_error)?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status, truncate(&body)));
    }
    Ok(response.bytes().await.map_err(classify_request_error)?.to_vec())
}

fn truncate(body: &str) -> &str {
    &body[..body.len().min(200)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            Error::ProviderAuthRequired { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            Error::ProviderTransient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            Error::ProviderTransient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, ""),
            Error::ProviderFatal(_)
        ));
    }

    #[test]
    fn provider_tagging() {
        let err = with_provider(
            Error::ProviderAuthRequired {
                provider: String::new(),
            },
            "box",
        );
        assert_eq!(err.to_string(), "provider 'box' requires reconnection");

        let passthrough = with_provider(Error::ProviderFatal("x".into()), "box");
        assert!(matches!(passthrough, Error::ProviderFatal(_)));
    }
}
