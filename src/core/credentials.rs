use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

pub const DEFAULT_SKEW_SECS: i64 = 30;
const REFRESH_MARGIN_SECS: i64 = 30;

pub fn default_skew() -> Duration {
    Duration::seconds(DEFAULT_SKEW_SECS)
}

/// Bearer credential as issued by the token endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub access_expires_at: Option<DateTime<Utc>>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

/// Fields of a token response, applied with [`CredentialStore::set`].
#[derive(Debug, Clone, Default)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in_seconds: Option<i64>,
    pub refresh_token: Option<String>,
    pub access_expires_at: Option<DateTime<Utc>>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

fn present(token: &Option<String>) -> bool {
    token.as_deref().is_some_and(|t| !t.trim().is_empty())
}

impl Credential {
    /// A missing expiry means the issuer gave none; the token is then used until rejected.
    pub fn has_valid_access_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        present(&self.access_token)
            && self
                .access_expires_at
                .map_or(true, |expires| now + skew < expires)
    }

    pub fn can_refresh_at(&self, now: DateTime<Utc>) -> bool {
        present(&self.refresh_token)
            && self
                .refresh_expires_at
                .map_or(true, |expires| now + Duration::seconds(REFRESH_MARGIN_SECS) < expires)
    }

    fn apply(&mut self, grant: TokenGrant, now: DateTime<Utc>) {
        self.access_token = Some(grant.access_token);
        if grant.refresh_token.is_some() {
            self.refresh_token = grant.refresh_token;
        }
        self.access_expires_at = grant.access_expires_at.or_else(|| {
            grant
                .expires_in_seconds
                .filter(|s| *s > 0)
                .map(|s| now + Duration::seconds(s))
        });
        if grant.refresh_expires_at.is_some() {
            self.refresh_expires_at = grant.refresh_expires_at;
        }
    }
}

/// Token state shared by the auth service and every authenticated client.
///
/// Build one per session and hand out `Arc` clones. Refreshes are not
/// serialized here: two callers seeing an expired token may both refresh.
#[derive(Debug, Default)]
pub struct CredentialStore {
    inner: RwLock<Credential>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, grant: TokenGrant) {
        let mut credential = self.inner.write().await;
        credential.apply(grant, Utc::now());
    }

    pub async fn clear(&self) {
        *self.inner.write().await = Credential::default();
    }

    pub async fn snapshot(&self) -> Credential {
        self.inner.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.inner.read().await.access_token.clone()
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.inner.read().await.refresh_token.clone()
    }

    pub async fn has_valid_access(&self, skew: Duration) -> bool {
        self.inner.read().await.has_valid_access_at(Utc::now(), skew)
    }

    pub async fn can_refresh(&self) -> bool {
        self.inner.read().await.can_refresh_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn credential(access_exp: Option<i64>, refresh_exp: Option<i64>) -> Credential {
        Credential {
            access_token: Some("access".into()),
            refresh_token: Some("refresh".into()),
            access_expires_at: access_exp.map(at),
            refresh_expires_at: refresh_exp.map(at),
        }
    }

    #[test]
    fn test_access_validity_at_skew_boundary() {
        let cred = credential(Some(100), None);
        let skew = Duration::seconds(30);

        assert!(cred.has_valid_access_at(at(69), skew));
        // now + skew == expiry is already too late
        assert!(!cred.has_valid_access_at(at(70), skew));
        assert!(!cred.has_valid_access_at(at(71), skew));
    }

    #[test]
    fn test_access_without_expiry_or_token() {
        let no_expiry = credential(None, None);
        assert!(no_expiry.has_valid_access_at(at(1_000_000), default_skew()));

        let blank = Credential {
            access_token: Some("   ".into()),
            ..Credential::default()
        };
        assert!(!blank.has_valid_access_at(at(0), default_skew()));
        assert!(!Credential::default().has_valid_access_at(at(0), default_skew()));
    }

    #[test]
    fn test_can_refresh_margin() {
        let cred = credential(None, Some(100));
        assert!(cred.can_refresh_at(at(69)));
        assert!(!cred.can_refresh_at(at(70)));

        let no_refresh = Credential {
            refresh_token: None,
            ..credential(None, None)
        };
        assert!(!no_refresh.can_refresh_at(at(0)));
    }

    #[test]
    fn test_apply_keeps_previous_refresh_fields() {
        let mut cred = credential(Some(10), Some(500));
        cred.apply(
            TokenGrant {
                access_token: "next".into(),
                expires_in_seconds: Some(60),
                ..TokenGrant::default()
            },
            at(0),
        );
        assert_eq!(cred.access_token.as_deref(), Some("next"));
        assert_eq!(cred.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(cred.access_expires_at, Some(at(60)));
        assert_eq!(cred.refresh_expires_at, Some(at(500)));
    }

    #[test]
    fn test_apply_prefers_explicit_expiry() {
        let mut cred = Credential::default();
        cred.apply(
            TokenGrant {
                access_token: "a".into(),
                expires_in_seconds: Some(60),
                refresh_token: Some("r2".into()),
                access_expires_at: Some(at(900)),
                refresh_expires_at: Some(at(5000)),
            },
            at(0),
        );
        assert_eq!(cred.access_expires_at, Some(at(900)));
        assert_eq!(cred.refresh_token.as_deref(), Some("r2"));

        cred.apply(
            TokenGrant {
                access_token: "b".into(),
                expires_in_seconds: Some(0),
                ..TokenGrant::default()
            },
            at(0),
        );
        assert_eq!(cred.access_expires_at, None);
    }

    #[tokio::test]
    async fn test_store_set_and_clear() {
        let store = CredentialStore::new();
        assert!(!store.has_valid_access(default_skew()).await);

        store
            .set(TokenGrant {
                access_token: "token".into(),
                expires_in_seconds: Some(3600),
                refresh_token: Some("refresh".into()),
                ..TokenGrant::default()
            })
            .await;
        assert!(store.has_valid_access(default_skew()).await);
        assert!(store.can_refresh().await);
        assert_eq!(store.access_token().await.as_deref(), Some("token"));

        store.clear().await;
        assert_eq!(store.snapshot().await, Credential::default());
        assert!(!store.can_refresh().await);
    }
}
