//! Provider API client: token refresh and the follow feed.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use md5::{Digest, Md5};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::app::{CourierError, Result};
use crate::domain::{Credential, Illust, IllustUser, ImageRef, PageLayout};

const TOKEN_URL: &str = "https://oauth.secure.pixiv.net/auth/token";
const FEED_URL: &str = "https://app-api.pixiv.net/v2/illust/follow";

// Identity of the provider's public mobile app; the token endpoint only
// answers requests signed as that app.
const CLIENT_ID: &str = "MOBrBDS8blbauoSck0ZfDbtuzpyT";
const CLIENT_SECRET: &str = "lsACyCD94FhDUtGTXi3QzcFE2uU1hqtDaKeqrdwj";
const CLIENT_HASH_SALT: &str = "28c1fdd170a5204386cb1313c7077b34f83e4aaf4aa829ce78c231e05b0bae2c";

/// Tokens come with an implicit one-hour validity.
const TOKEN_TTL_SECS: i64 = 3600;

#[async_trait]
pub trait Provider {
    /// Obtain a fresh credential from the token endpoint.
    async fn refresh_credential(&self) -> Result<Credential>;

    /// Fetch the first page of the follow feed, in provider order.
    async fn follow_feed(&self, token: &str) -> Result<Vec<Illust>>;
}

pub struct PixivClient {
    http: Client,
    refresh_token: String,
}

impl PixivClient {
    pub fn new(refresh_token: String) -> Self {
        let http = Client::builder()
            .user_agent("pixiv-courier/0.1.0")
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            refresh_token,
        }
    }
}

/// Request signature required by the token endpoint: hex md5 of the client
/// time concatenated with a fixed salt. Not a security boundary.
fn client_hash(client_time: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(client_time.as_bytes());
    hasher.update(CLIENT_HASH_SALT.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl Provider for PixivClient {
    async fn refresh_credential(&self) -> Result<Credential> {
        let request_time = Utc::now();
        let client_time = request_time.format("%Y-%m-%dT%H:%M:%S+00:00").to_string();

        debug!("requesting access token");

        let response = self
            .http
            .post(TOKEN_URL)
            .header("X-Client-Time", &client_time)
            .header("X-Client-Hash", client_hash(&client_time))
            .form(&[
                ("client_id", CLIENT_ID),
                ("client_secret", CLIENT_SECRET),
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
                ("get_secure_url", "1"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CourierError::Auth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| CourierError::Auth(format!("malformed token response: {e}")))?;

        let access_token = body
            .access_token
            .ok_or_else(|| CourierError::Auth("no access token in response".into()))?;

        Ok(Credential {
            access_token,
            expires_at: request_time.timestamp() + TOKEN_TTL_SECS,
        })
    }

    async fn follow_feed(&self, token: &str) -> Result<Vec<Illust>> {
        let response = self
            .http
            .get(FEED_URL)
            .query(&[("restrict", "all")])
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CourierError::Fetch(format!(
                "feed endpoint returned {}",
                response.status()
            )));
        }

        let body: FeedResponse = response
            .json()
            .await
            .map_err(|e| CourierError::Fetch(format!("malformed feed response: {e}")))?;

        Ok(body.illusts.into_iter().map(Illust::from).collect())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct FeedResponse {
    illusts: Vec<RawIllust>,
}

#[derive(Deserialize)]
struct RawIllust {
    id: u64,
    title: String,
    caption: String,
    create_date: DateTime<FixedOffset>,
    user: RawUser,
    #[serde(default)]
    meta_single_page: RawSinglePage,
    #[serde(default)]
    meta_pages: Vec<RawPage>,
}

#[derive(Deserialize)]
struct RawUser {
    id: u64,
    name: String,
    account: String,
}

// Single-page works carry the image URL here; multi-page works serialize
// this as an empty object and list their pages in `meta_pages`.
#[derive(Deserialize, Default)]
struct RawSinglePage {
    original_image_url: Option<String>,
}

#[derive(Deserialize)]
struct RawPage {
    image_urls: RawImageUrls,
}

#[derive(Deserialize)]
struct RawImageUrls {
    original: String,
}

impl From<RawIllust> for Illust {
    fn from(raw: RawIllust) -> Self {
        let layout = match raw.meta_single_page.original_image_url {
            Some(url) => PageLayout::Single(ImageRef { url }),
            None => PageLayout::Multi(
                raw.meta_pages
                    .into_iter()
                    .map(|p| ImageRef {
                        url: p.image_urls.original,
                    })
                    .collect(),
            ),
        };

        Self {
            id: raw.id,
            title: raw.title,
            caption: raw.caption,
            create_date: raw.create_date,
            user: IllustUser {
                id: raw.user.id,
                name: raw.user.name,
                account: raw.user.account,
            },
            layout,
        }
    }
}
