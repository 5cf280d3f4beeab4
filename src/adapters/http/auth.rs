use crate::adapters::http::client::ApiClient;
use crate::core::credentials::{CredentialStore, TokenGrant};
use crate::domain::model::AuthResult;
use crate::domain::ports::AuthService;
use crate::utils::error::RfidError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error as _;
use std::sync::Arc;
use std::time::Instant;

pub const TOKEN_PATH: &str = "/v1/api/Token";
pub const REFRESH_PATH: &str = "/v1/api/Token/refresh";

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Token endpoint answer. `token` and `accessToken` are both seen in the wild.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenResponse {
    pub token: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in_seconds: Option<i64>,
    pub access_token_expires_at_utc: Option<DateTime<Utc>>,
    pub refresh_token_expires_at_utc: Option<DateTime<Utc>>,
}

impl TokenResponse {
    fn into_grant(self) -> Option<TokenGrant> {
        let access_token = self
            .access_token
            .or(self.token)
            .filter(|t| !t.trim().is_empty())?;
        Some(TokenGrant {
            access_token,
            expires_in_seconds: self.expires_in_seconds,
            refresh_token: self.refresh_token.filter(|t| !t.trim().is_empty()),
            access_expires_at: self.access_token_expires_at_utc,
            refresh_expires_at: self.refresh_token_expires_at_utc,
        })
    }
}

/// Client-credentials login and refresh against the registry token endpoint.
#[derive(Debug, Clone)]
pub struct HttpAuthService {
    api: ApiClient,
    credentials: Arc<CredentialStore>,
}

impl HttpAuthService {
    /// `api` must not carry an auth service of its own.
    pub fn new(api: ApiClient) -> Self {
        let credentials = api.credentials().clone();
        Self { api, credentials }
    }

    pub async fn logout(&self) {
        self.credentials.clear().await;
        tracing::info!("🔒 Session cleared");
    }
}

/// Keeps only the last two characters visible.
pub fn mask_client_id(client_id: &str) -> String {
    let count = client_id.chars().count();
    if count == 0 {
        return "(empty)".to_string();
    }
    if count <= 2 {
        return "*".repeat(count);
    }
    let visible: String = client_id.chars().skip(count - 2).collect();
    format!("{}{}", "*".repeat(count - 2), visible)
}

fn is_tls_failure(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("handshake") {
            return true;
        }
        source = cause.source();
    }
    false
}

fn describe_failure(err: &RfidError) -> String {
    match err {
        RfidError::Api { message, .. } => message.clone(),
        RfidError::HttpError(e) if e.is_timeout() => {
            "Connection error: the request timed out.".to_string()
        }
        RfidError::HttpError(e) if is_tls_failure(e) => {
            "Connection error: the TLS handshake failed.".to_string()
        }
        RfidError::HttpError(_) => {
            "Connection error: the registry could not be reached.".to_string()
        }
        other => format!("Connection error: {}", other),
    }
}

#[async_trait]
impl AuthService for HttpAuthService {
    async fn authenticate(&self, client_id: &str, client_secret: &str) -> AuthResult {
        let masked = mask_client_id(client_id);
        let started = Instant::now();
        tracing::info!("🔐 Authenticating client '{}' at {}", masked, self.api.base_url());

        let request = TokenRequest {
            client_id,
            client_secret,
        };
        let result = match self
            .api
            .post_json::<_, TokenResponse>(TOKEN_PATH, &request, false)
            .await
        {
            Ok(Some(response)) => match response.into_grant() {
                Some(grant) => {
                    self.credentials.set(grant).await;
                    tracing::info!("✅ Client '{}' authenticated", masked);
                    AuthResult::ok()
                }
                None => {
                    tracing::warn!("⚠️ Token response for '{}' carried no access token", masked);
                    AuthResult::fail("No token was received.")
                }
            },
            Ok(None) => {
                tracing::warn!("⚠️ Empty token response for '{}'", masked);
                AuthResult::fail("No token was received.")
            }
            Err(e) => {
                tracing::error!("❌ Authentication failed for '{}': {}", masked, e);
                AuthResult::fail(describe_failure(&e))
            }
        };

        tracing::info!(
            "Authentication finished in {} ms",
            started.elapsed().as_millis()
        );
        result
    }

    async fn refresh(&self) -> bool {
        if !self.credentials.can_refresh().await {
            tracing::warn!("⚠️ Refresh skipped: no usable refresh token");
            return false;
        }
        let Some(refresh_token) = self.credentials.refresh_token().await else {
            return false;
        };

        let request = RefreshRequest {
            refresh_token: &refresh_token,
        };
        match self
            .api
            .post_json::<_, TokenResponse>(REFRESH_PATH, &request, false)
            .await
        {
            Ok(Some(response)) => match response.into_grant() {
                Some(grant) => {
                    self.credentials.set(grant).await;
                    tracing::info!("🔑 Access token refreshed");
                    true
                }
                None => {
                    tracing::warn!("⚠️ Refresh response carried no access token");
                    false
                }
            },
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("⚠️ Token refresh failed: {}", e);
                false
            }
        }
    }
}
