//! Media download and local path resolution.
//!
//! The external downloader is a black box that writes original-resolution
//! pages under a fixed directory convention; we invoke it once per
//! illustration and then check which of the expected files actually exist.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::Illust;

/// Best-effort media fetch. Implementations log failures and never
/// propagate them: a partially downloaded illustration should still be
/// notified with whatever pages exist.
#[async_trait]
pub trait MediaDownloader {
    async fn fetch(&self, url: &str, dest_dir: &Path);
}

/// Invokes `gallery-dl` as a one-shot subprocess.
pub struct GalleryDl {
    refresh_token: String,
}

impl GalleryDl {
    pub fn new(refresh_token: String) -> Self {
        Self { refresh_token }
    }
}

#[async_trait]
impl MediaDownloader for GalleryDl {
    async fn fetch(&self, url: &str, dest_dir: &Path) {
        let status = Command::new("gallery-dl")
            .arg("-d")
            .arg(dest_dir)
            .arg("--write-metadata")
            .arg("-o")
            .arg(format!("refresh-token={}", self.refresh_token))
            .arg(url)
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("gallery-dl exited with {status} for {url}"),
            Err(e) => warn!("failed to run gallery-dl for {url}: {e}"),
        }
    }
}

pub struct MediaResolver {
    download_root: PathBuf,
    downloader: Arc<dyn MediaDownloader + Send + Sync>,
}

impl MediaResolver {
    pub fn new(download_root: PathBuf, downloader: Arc<dyn MediaDownloader + Send + Sync>) -> Self {
        Self {
            download_root,
            downloader,
        }
    }

    /// Invoke the downloader for `illust`, then return the paths of its
    /// pages that exist on disk, in the provider's page order. Missing
    /// files are omitted; an empty result is valid.
    pub async fn resolve_and_fetch(&self, illust: &Illust) -> Vec<PathBuf> {
        self.downloader
            .fetch(&illust.artwork_url(), &self.download_root)
            .await;

        let author_dir = self
            .download_root
            .join("pixiv")
            .join(format!("{} {}", illust.user.id, illust.user.account));

        let mut paths = Vec::new();
        for page in illust.pages() {
            let Some(filename) = page.filename() else {
                warn!("unparseable image URL on illustration {}: {}", illust.id, page.url);
                continue;
            };

            let path = author_dir.join(filename);
            if path.is_file() {
                paths.push(path);
            } else {
                debug!("page file missing, omitting: {}", path.display());
            }
        }

        paths
    }
}
