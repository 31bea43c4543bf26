//! Access-token lifecycle: reuse the cached credential while it is valid,
//! refresh through the provider otherwise.

use chrono::Utc;
use tracing::{debug, info};

use crate::app::Result;
use crate::cache::CacheStore;
use crate::pixiv::Provider;

pub struct TokenManager<'a> {
    provider: &'a (dyn Provider + Send + Sync),
}

impl<'a> TokenManager<'a> {
    pub fn new(provider: &'a (dyn Provider + Send + Sync)) -> Self {
        Self { provider }
    }

    /// Return a bearer token, hitting the network only when the cached
    /// credential is absent or expired. A fresh credential is persisted to
    /// the cache before it is returned.
    pub async fn token(&self, cache: &mut CacheStore) -> Result<String> {
        let now = Utc::now().timestamp();

        if let Some(credential) = cache.credential() {
            if credential.is_valid(now) {
                debug!("reusing cached access token");
                return Ok(credential.access_token.clone());
            }
        }

        info!("refreshing access token");
        let credential = self.provider.refresh_credential().await?;
        let token = credential.access_token.clone();
        cache.set_credential(credential)?;

        Ok(token)
    }
}
