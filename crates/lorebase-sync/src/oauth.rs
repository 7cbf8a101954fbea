//! OAuth token refresh shared by the browser-consent providers.
//!
//! The consent flow itself runs in the external HTTP layer; this module
//! only turns a refresh token into a fresh access token.

use chrono::{Duration, Utc};
use serde::Deserialize;

use lorebase_core::{Error, OAuthCredential, Result};

use crate::http;
use crate::provider::Authorization;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Authorize against a stored OAuth credential.
///
/// Valid token → use it. Expired with a refresh token → refresh and return
/// the credential to persist. Anything else → reconnect required.
pub async fn authorize(
    provider: &str,
    token_url: &str,
    cred: &OAuthCredential,
) -> Result<Authorization> {
    if !cred.is_expired(Utc::now()) {
        return Ok(Authorization {
            token: Some(cred.access_token.clone()),
            refreshed: None,
        });
    }

    let Some(refresh_token) = cred.refresh_token.clone() else {
        return Err(Error::ProviderAuthRequired {
            provider: provider.to_string(),
        });
    };

    let response: TokenResponse = http::send_json(http::client().post(token_url).form(&[
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token.as_str()),
        ("client_id", cred.client_id.as_str()),
        ("client_secret", cred.client_secret.as_str()),
    ]))
    .await
    .map_err(|e| match e {
        // A rejected refresh token is a reconnect, not a retry.
        Error::ProviderFatal(_) | Error::ProviderAuthRequired { .. } => {
            Error::ProviderAuthRequired {
                provider: provider.to_string(),
            }
        }
        other => other,
    })?;

    let refreshed = OAuthCredential {
        access_token: response.access_token.clone(),
        refresh_token: response.refresh_token.or(Some(refresh_token)),
        expires_at: response
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs)),
        client_id: cred.client_id.clone(),
        client_secret: cred.client_secret.clone(),
    };

    Ok(Authorization {
        token: Some(response.access_token),
        refreshed: Some(refreshed),
    })
}
