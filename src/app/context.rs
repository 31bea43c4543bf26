use std::sync::Arc;

use crate::app::Result;
use crate::cache::CacheStore;
use crate::config::Config;
use crate::media::{GalleryDl, MediaDownloader};
use crate::pixiv::{PixivClient, Provider};

pub struct AppContext {
    pub config: Config,
    pub cache: CacheStore,
    pub provider: Arc<dyn Provider + Send + Sync>,
    pub downloader: Arc<dyn MediaDownloader + Send + Sync>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let cache = CacheStore::load(&config.cache_file)?;
        let provider: Arc<dyn Provider + Send + Sync> =
            Arc::new(PixivClient::new(config.refresh_token.clone()));
        let downloader: Arc<dyn MediaDownloader + Send + Sync> =
            Arc::new(GalleryDl::new(config.refresh_token.clone()));

        Ok(Self {
            config,
            cache,
            provider,
            downloader,
        })
    }
}
