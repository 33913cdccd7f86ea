//! DeviantArt REST client and endpoints

use chrono::NaiveDate;
use devline_core::{FetchError, http_client, retry_with_backoff, send_text};
use serde_json::Value;

use crate::auth::TokenManager;
use crate::config::ApiSettings;

/// Page size for watcher and friend lists
pub const SOCIAL_PAGE_LIMIT: usize = 50;

/// Page size for gallery listings
pub const GALLERY_PAGE_LIMIT: usize = 24;

/// Page size for tag browsing
pub const TAG_PAGE_LIMIT: usize = 50;

/// Most deviation ids accepted by one metadata request
pub const METADATA_BATCH: usize = 10;

pub type Query = Vec<(&'static str, String)>;

/// JSON API plus static page fetches.
///
/// Endpoints are provided methods on top of [`DeviantApi::get`], so crawl
/// runners can be driven by any implementation.
pub trait DeviantApi {
    /// GET `<base>/<endpoint>` and return the JSON body
    fn get(&self, endpoint: &str, query: &Query) -> Result<Value, FetchError>;

    /// GET a public HTML page
    fn get_html(&self, url: &str) -> Result<String, FetchError>;

    /// Keep the credentials fresh between deviants
    fn refresh_if_stale(&self) -> Result<(), FetchError> {
        Ok(())
    }

    fn user_profile(&self, username: &str) -> Result<Value, FetchError> {
        self.get(
            &format!("user/profile/{username}"),
            &vec![
                ("ext_collections", "0".to_string()),
                ("ext_galleries", "0".to_string()),
            ],
        )
    }

    /// Page `page` (0-based) of the users watching `username`
    fn watchers_page(&self, username: &str, page: usize) -> Result<Value, FetchError> {
        self.get(&format!("user/watchers/{username}"), &social_query(page))
    }

    /// Page `page` (0-based) of the users `username` watches
    fn friends_page(&self, username: &str, page: usize) -> Result<Value, FetchError> {
        self.get(&format!("user/friends/{username}"), &social_query(page))
    }

    fn gallery_page(&self, username: &str, offset: usize) -> Result<Value, FetchError> {
        self.get(
            "gallery/all",
            &vec![
                ("username", username.to_string()),
                ("offset", offset.to_string()),
                ("limit", GALLERY_PAGE_LIMIT.to_string()),
            ],
        )
    }

    /// Metadata for up to [`METADATA_BATCH`] deviations
    fn deviation_metadata(&self, ids: &[String]) -> Result<Value, FetchError> {
        let query = ids
            .iter()
            .take(METADATA_BATCH)
            .map(|id| ("deviationids[]", id.clone()))
            .collect();
        self.get("deviation/metadata", &query)
    }

    fn daily_deviations(&self, date: NaiveDate) -> Result<Value, FetchError> {
        self.get(
            "browse/dailydeviations",
            &vec![("date", date.format("%Y-%m-%d").to_string())],
        )
    }

    fn tag_page(&self, tag: &str, offset: usize, limit: usize) -> Result<Value, FetchError> {
        self.get(
            "browse/tags",
            &vec![
                ("tag", tag.to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ],
        )
    }
}

fn social_query(page: usize) -> Query {
    vec![
        ("offset", (page * SOCIAL_PAGE_LIMIT).to_string()),
        ("limit", SOCIAL_PAGE_LIMIT.to_string()),
    ]
}

/// Turn a status and body into JSON or a classified error.
///
/// A 200 whose body carries an `"error"` key is an [`FetchError::ApiError`]
/// with the server's description.
pub fn classify_response(status: u16, body: &str) -> Result<Value, FetchError> {
    if status != 200 {
        return Err(FetchError::from_status(status));
    }
    let value: Value = serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    if let Some(err) = value.get("error") {
        let description = value
            .get("error_description")
            .and_then(Value::as_str)
            .or_else(|| err.as_str())
            .unwrap_or("unknown error");
        return Err(FetchError::ApiError(description.to_string()));
    }
    Ok(value)
}

/// Authenticated client for the OAuth2 REST API
#[derive(Debug)]
pub struct ApiClient {
    base_url: String,
    tokens: TokenManager,
    max_retries: u32,
}

impl ApiClient {
    pub fn new(settings: &ApiSettings) -> anyhow::Result<Self> {
        let tokens = TokenManager::new(
            &settings.token_url,
            settings.credentials.clone(),
            settings.token_ttl,
        )?;
        let mut base_url = settings.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self {
            base_url,
            tokens,
            max_retries: settings.max_retries,
        })
    }

    /// Drop the token when the server rejected it; otherwise let the
    /// next attempt refetch it only if stale.
    fn before_retry(&self, err: &FetchError) {
        if matches!(err, FetchError::Unauthorized) {
            self.tokens.invalidate();
        }
    }
}

impl DeviantApi for ApiClient {
    fn get(&self, endpoint: &str, query: &Query) -> Result<Value, FetchError> {
        let url = format!("{}{endpoint}", self.base_url);
        retry_with_backoff(
            endpoint,
            self.max_retries,
            |e| self.before_retry(e),
            || {
                let token = self.tokens.token()?;
                let request = http_client().get(&url).bearer_auth(&token).query(query);
                let (status, body) = send_text(request)?;
                classify_response(status, &body)
            },
        )
    }

    fn get_html(&self, url: &str) -> Result<String, FetchError> {
        retry_with_backoff(url, self.max_retries, |_| {}, || {
            let (status, body) = send_text(http_client().get(url))?;
            if status == 200 {
                Ok(body)
            } else {
                Err(FetchError::from_status(status))
            }
        })
    }

    fn refresh_if_stale(&self) -> Result<(), FetchError> {
        self.tokens.refresh_if_stale()
    }
}
