use crate::core::credentials::{default_skew, CredentialStore};
use crate::domain::ports::AuthService;
use crate::utils::error::{Result, RfidError};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Registry HTTP client with bearer-token handling.
///
/// Authenticated calls reuse the cached access token, refresh it when it is
/// about to expire, and replay a request exactly once after a 401 if a
/// refresh succeeds.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
    auth: Option<Arc<dyn AuthService>>,
    skew: chrono::Duration,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("has_auth", &self.auth.is_some())
            .field("skew", &self.skew)
            .finish()
    }
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        credentials: Arc<CredentialStore>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            credentials,
            auth: None,
            skew: default_skew(),
        })
    }

    /// Attaches the service used to refresh expired tokens.
    pub fn with_auth(mut self, auth: Arc<dyn AuthService>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_skew(mut self, skew: chrono::Duration) -> Self {
        self.skew = skew;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// POST a JSON body; a `null` or empty response body yields `None`.
    pub async fn post_json<B, T>(&self, path: &str, body: &B, with_auth: bool) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::POST, path, Some(body), with_auth).await?;
        read_json(response).await
    }

    pub async fn get_json<T>(&self, path: &str, with_auth: bool) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .send::<()>(Method::GET, path, None, with_auth)
            .await?;
        read_json(response).await
    }

    async fn send<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        with_auth: bool,
    ) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let token = if with_auth {
            self.ensure_access_token().await
        } else {
            None
        };

        let response = self.dispatch(&method, path, body, token.as_deref()).await?;
        if !with_auth || response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(auth) = &self.auth else {
            return Ok(response);
        };
        if !self.credentials.can_refresh().await {
            return Ok(response);
        }

        tracing::info!("🔑 {} {} returned 401, refreshing token once", method, path);
        if auth.refresh().await && self.credentials.has_valid_access(self.skew).await {
            let token = self.credentials.access_token().await;
            tracing::debug!("🔁 Replaying {} {} with refreshed token", method, path);
            return self.dispatch(&method, path, body, token.as_deref()).await;
        }

        Ok(response)
    }

    async fn ensure_access_token(&self) -> Option<String> {
        if self.credentials.has_valid_access(self.skew).await {
            return self.credentials.access_token().await;
        }

        if let Some(auth) = &self.auth {
            if self.credentials.can_refresh().await
                && auth.refresh().await
                && self.credentials.has_valid_access(self.skew).await
            {
                return self.credentials.access_token().await;
            }
        }

        tracing::warn!("⚠️ No valid access token, sending request without credentials");
        None
    }

    async fn dispatch<B>(
        &self,
        method: &Method,
        path: &str,
        body: Option<&B>,
        token: Option<&str>,
    ) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let mut request = self.client.request(method.clone(), self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let started = std::time::Instant::now();
        let response = request.send().await.map_err(|e| {
            tracing::error!("❌ {} {} failed: {}", method, path, e);
            RfidError::from(e)
        })?;

        tracing::debug!(
            "{} {} -> HTTP {} in {} ms",
            method,
            path,
            response.status().as_u16(),
            started.elapsed().as_millis()
        );
        Ok(response)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<Option<T>> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }

    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(serde_json::from_str::<Option<T>>(&text)?)
}

/// Turns a non-success response into [`RfidError::Api`] with a readable message.
pub async fn error_from_response(response: Response) -> RfidError {
    let status = response.status();
    let raw = response.text().await.unwrap_or_default();

    let message = extract_message(&raw)
        .and_then(|m| humanize_message(&m))
        .unwrap_or_else(|| default_message(status));

    RfidError::Api {
        status: status.as_u16(),
        message,
        raw_body: (!raw.is_empty()).then_some(raw),
    }
}

/// First string value of `message`, `detail` or `title`, in that order.
pub fn extract_message(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    ["message", "detail", "title"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// Rewrites the registry's known failure phrases for operators.
pub fn humanize_message(message: &str) -> Option<String> {
    let m = message.trim();
    if m.is_empty() {
        return None;
    }

    if m.eq_ignore_ascii_case("Username or password is incorrect") {
        return Some("Incorrect user name or password.".to_string());
    }
    if m.eq_ignore_ascii_case("invalid client credentials") {
        return Some("Client id or client secret is invalid.".to_string());
    }
    if m.to_ascii_lowercase().contains("authorization header") {
        return Some("Authorization header (bearer token) is missing or invalid.".to_string());
    }

    Some(m.to_string())
}

pub fn default_message(status: StatusCode) -> String {
    match status {
        StatusCode::BAD_REQUEST => "Bad request. Check the submitted data.".to_string(),
        StatusCode::UNAUTHORIZED => {
            "Unauthorized. Sign in again or verify your credentials.".to_string()
        }
        StatusCode::FORBIDDEN => "Access denied.".to_string(),
        StatusCode::NOT_FOUND => "The requested service was not found.".to_string(),
        StatusCode::REQUEST_TIMEOUT => "Request timed out. Check your connection.".to_string(),
        StatusCode::INTERNAL_SERVER_ERROR => "Server error. Please try again later.".to_string(),
        other => format!("Unexpected error (code {}).", other.as_u16()),
    }
}
