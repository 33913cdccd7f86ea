//! OAuth2 client-credentials token with a fixed lifetime

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use devline_core::{FetchError, http_client, send_text};
use serde::Deserialize;

/// Scopes requested with every token
const SCOPE: &str = "basic user browse";

#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    fetched_at: Instant,
    ttl: Duration,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < self.ttl
    }
}

/// Caches one bearer token and refetches it when it gets older than the TTL.
///
/// All refreshes happen under the same mutex, so concurrent callers never
/// request two tokens at once.
pub struct TokenManager {
    token_url: String,
    credentials: Credentials,
    ttl: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("token_url", &self.token_url)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(token_url: &str, credentials: Credentials, ttl: Duration) -> anyhow::Result<Self> {
        anyhow::ensure!(
            credentials.is_complete(),
            "DeviantArt client_id and client_secret are required \
             (set [credentials] or DEVIANTART_CLIENT_ID / DEVIANTART_CLIENT_SECRET)"
        );
        Ok(Self {
            token_url: token_url.to_string(),
            credentials,
            ttl,
            cached: Mutex::new(None),
        })
    }

    /// Current token, fetching a new one if none is cached or it is stale
    pub fn token(&self) -> Result<String, FetchError> {
        let mut guard = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tok) = guard.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(tok.value.clone());
        }
        let fresh = self.fetch()?;
        let value = fresh.value.clone();
        *guard = Some(fresh);
        Ok(value)
    }

    /// Called between deviants so long crawls never use an expired token
    pub fn refresh_if_stale(&self) -> Result<(), FetchError> {
        self.token().map(|_| ())
    }

    /// Drop the cached token (after a 401)
    pub fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    #[cfg(test)]
    pub(crate) fn set_cached(&self, value: &str) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(CachedToken {
            value: value.to_string(),
            fetched_at: Instant::now(),
            ttl: self.ttl,
        });
    }

    #[cfg(test)]
    pub(crate) fn has_cached(&self) -> bool {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn fetch(&self) -> Result<CachedToken, FetchError> {
        log::debug!("Requesting new access token");
        let request = http_client().post(&self.token_url).form(&[
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("scope", SCOPE),
        ]);
        let (status, body) = send_text(request)?;
        if status != 200 {
            return Err(FetchError::from_status(status));
        }
        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(CachedToken {
            value: parsed.access_token,
            fetched_at: Instant::now(),
            ttl: effective_ttl(self.ttl, parsed.expires_in),
        })
    }
}

/// Configured TTL, shortened if the server grants less
fn effective_ttl(configured: Duration, expires_in: Option<u64>) -> Duration {
    match expires_in {
        Some(secs) if secs > 0 => configured.min(Duration::from_secs(secs)),
        _ => configured,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(id: &str, secret: &str) -> Credentials {
        Credentials {
            client_id: id.into(),
            client_secret: secret.into(),
        }
    }

    #[test]
    fn missing_credentials_rejected() {
        let ttl = Duration::from_secs(1200);
        assert!(TokenManager::new("http://localhost/token", creds("", "s"), ttl).is_err());
        assert!(TokenManager::new("http://localhost/token", creds("id", " "), ttl).is_err());
        assert!(TokenManager::new("http://localhost/token", creds("id", "s"), ttl).is_ok());
    }

    #[test]
    fn token_freshness_window() {
        let start = Instant::now();
        let tok = CachedToken {
            value: "t".into(),
            fetched_at: start,
            ttl: Duration::from_secs(1200),
        };
        assert!(tok.is_fresh(start + Duration::from_secs(1199)));
        assert!(!tok.is_fresh(start + Duration::from_secs(1200)));
    }

    #[test]
    fn server_expiry_shortens_ttl() {
        let configured = Duration::from_secs(1200);
        assert_eq!(
            effective_ttl(configured, Some(600)),
            Duration::from_secs(600)
        );
        assert_eq!(effective_ttl(configured, Some(3600)), configured);
        assert_eq!(effective_ttl(configured, Some(0)), configured);
        assert_eq!(effective_ttl(configured, None), configured);
    }

    #[test]
    fn debug_hides_secret() {
        let text = format!("{:?}", creds("id", "hunter2"));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn token_response_parses() {
        let r: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":3600,"status":"success"}"#)
                .unwrap();
        assert_eq!(r.access_token, "abc");
        assert_eq!(r.expires_in, Some(3600));
    }
}
