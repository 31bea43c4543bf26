use chrono::{DateTime, FixedOffset};
use url::Url;

/// A single illustration from the follow feed.
#[derive(Debug, Clone)]
pub struct Illust {
    pub id: u64,
    pub title: String,
    pub caption: String,
    /// Creation time as declared by the provider, offset included.
    pub create_date: DateTime<FixedOffset>,
    pub user: IllustUser,
    pub layout: PageLayout,
}

#[derive(Debug, Clone)]
pub struct IllustUser {
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Account handle, unique per user.
    pub account: String,
}

/// Image pages of an illustration.
///
/// The provider encodes single-page and multi-page works with different
/// JSON shapes; callers match on this variant instead of presence-checking.
#[derive(Debug, Clone)]
pub enum PageLayout {
    Single(ImageRef),
    Multi(Vec<ImageRef>),
}

#[derive(Debug, Clone)]
pub struct ImageRef {
    /// URL of the original-resolution image.
    pub url: String,
}

impl ImageRef {
    /// Last path segment of the image URL, query suffix stripped.
    ///
    /// This matches the filename the external downloader writes to disk.
    pub fn filename(&self) -> Option<String> {
        let url = Url::parse(&self.url).ok()?;
        url.path_segments()?
            .filter(|s| !s.is_empty())
            .next_back()
            .map(str::to_string)
    }
}

impl Illust {
    /// Canonical artwork URL, used both in the notification body and as
    /// the downloader's target.
    pub fn artwork_url(&self) -> String {
        format!("https://www.pixiv.net/en/artworks/{}", self.id)
    }

    /// Image pages in the provider's declared order.
    pub fn pages(&self) -> Vec<&ImageRef> {
        match &self.layout {
            PageLayout::Single(image) => vec![image],
            PageLayout::Multi(images) => images.iter().collect(),
        }
    }
}
