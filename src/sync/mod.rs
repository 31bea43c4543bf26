//! Per-run orchestration: token, feed, then one item at a time.
//!
//! The loop is strictly sequential. The cache only advances past an item
//! after its delivery succeeded, so a fatal delivery error leaves every
//! later item (and the failing one) to be retried by the next run, and a
//! completed run never re-delivers.

use std::sync::Arc;

use lettre::message::Mailbox;
use tracing::{debug, info};

use crate::app::Result;
use crate::auth::TokenManager;
use crate::cache::CacheStore;
use crate::mailer::{build_notification, DeliveryEngine};
use crate::media::MediaResolver;
use crate::pixiv::Provider;

#[derive(Debug, Default)]
pub struct RunSummary {
    pub delivered: usize,
    pub skipped: usize,
}

pub struct SyncEngine {
    provider: Arc<dyn Provider + Send + Sync>,
    resolver: MediaResolver,
    delivery: DeliveryEngine,
    cache: CacheStore,
    from: Mailbox,
    to: Mailbox,
}

impl SyncEngine {
    pub fn new(
        provider: Arc<dyn Provider + Send + Sync>,
        resolver: MediaResolver,
        delivery: DeliveryEngine,
        cache: CacheStore,
        from: Mailbox,
        to: Mailbox,
    ) -> Self {
        Self {
            provider,
            resolver,
            delivery,
            cache,
            from,
            to,
        }
    }

    /// One polling run over the first feed page.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let token = TokenManager::new(self.provider.as_ref())
            .token(&mut self.cache)
            .await?;

        let illusts = self.provider.follow_feed(&token).await?;
        info!("feed returned {} illustrations", illusts.len());

        let mut summary = RunSummary::default();
        for illust in &illusts {
            if self.cache.is_seen(illust.id) {
                debug!("illustration {} already delivered, skipping", illust.id);
                summary.skipped += 1;
                continue;
            }

            info!(
                "processing illustration {} by @{}",
                illust.id, illust.user.account
            );

            let paths = self.resolver.resolve_and_fetch(illust).await;
            let notification =
                build_notification(illust, &paths, self.from.clone(), self.to.clone());

            self.delivery.deliver(&notification).await?;
            self.cache.mark_seen(illust.id)?;
            summary.delivered += 1;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::app::CourierError;
    use crate::domain::{Credential, Illust, IllustUser, ImageRef, PageLayout};
    use crate::mailer::{DeliveryError, Mailer};
    use crate::media::MediaDownloader;

    fn illust(id: u64) -> Illust {
        Illust {
            id,
            title: format!("Work {id}"),
            caption: "caption".into(),
            create_date: DateTime::parse_from_rfc3339("2024-01-01T12:00:00+09:00").unwrap(),
            user: IllustUser {
                id: 7,
                name: "Artist".into(),
                account: "artist".into(),
            },
            layout: PageLayout::Multi(vec![
                ImageRef {
                    url: format!("https://i.pximg.net/img/{id}_p0.png"),
                },
                ImageRef {
                    url: format!("https://i.pximg.net/img/{id}_p1.png"),
                },
            ]),
        }
    }

    struct TestProvider {
        illusts: Vec<Illust>,
        refresh_calls: AtomicUsize,
        fail_feed: bool,
        fail_refresh: bool,
    }

    impl TestProvider {
        fn with_feed(illusts: Vec<Illust>) -> Arc<Self> {
            Arc::new(Self {
                illusts,
                refresh_calls: AtomicUsize::new(0),
                fail_feed: false,
                fail_refresh: false,
            })
        }
    }

    #[async_trait]
    impl Provider for TestProvider {
        async fn refresh_credential(&self) -> Result<Credential> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_refresh {
                return Err(CourierError::Auth("rejected".into()));
            }
            Ok(Credential {
                access_token: "tok".into(),
                expires_at: Utc::now().timestamp() + 3600,
            })
        }

        async fn follow_feed(&self, _token: &str) -> Result<Vec<Illust>> {
            if self.fail_feed {
                return Err(CourierError::Fetch("feed endpoint returned 500".into()));
            }
            Ok(self.illusts.clone())
        }
    }

    /// Writes the named page files on every invocation, like a successful
    /// downloader run would.
    struct WritingDownloader {
        files: Vec<String>,
        calls: AtomicUsize,
    }

    impl WritingDownloader {
        fn with_files(files: Vec<String>) -> Arc<Self> {
            Arc::new(Self {
                files,
                calls: AtomicUsize::new(0),
            })
        }

        fn none() -> Arc<Self> {
            Self::with_files(Vec::new())
        }
    }

    #[async_trait]
    impl MediaDownloader for WritingDownloader {
        async fn fetch(&self, _url: &str, dest_dir: &Path) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let author_dir = dest_dir.join("pixiv").join("7 artist");
            fs::create_dir_all(&author_dir).unwrap();
            for name in &self.files {
                fs::write(author_dir.join(name), b"png").unwrap();
            }
        }
    }

    struct ScriptedMailer {
        fail_on: Option<usize>,
        attempts: AtomicUsize,
        sent: Mutex<Vec<String>>,
    }

    impl ScriptedMailer {
        fn ok() -> Arc<Self> {
            Self::failing_on(None)
        }

        fn failing_on(fail_on: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                fail_on,
                attempts: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Mailer for ScriptedMailer {
        async fn send(&self, message: &lettre::Message) -> std::result::Result<(), DeliveryError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(attempt) {
                return Err(DeliveryError::Transport("connection reset".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(&message.formatted()).to_string());
            Ok(())
        }
    }

    struct Harness {
        cache_path: PathBuf,
        download_root: PathBuf,
    }

    impl Harness {
        fn new(dir: &tempfile::TempDir) -> Self {
            Self {
                cache_path: dir.path().join("courier.cache"),
                download_root: dir.path().join("downloads"),
            }
        }

        fn engine(
            &self,
            provider: Arc<TestProvider>,
            downloader: Arc<WritingDownloader>,
            mailer: Arc<ScriptedMailer>,
        ) -> SyncEngine {
            SyncEngine::new(
                provider,
                MediaResolver::new(self.download_root.clone(), downloader),
                DeliveryEngine::new(mailer),
                CacheStore::load(&self.cache_path).unwrap(),
                "courier@example.com".parse().unwrap(),
                "reader@example.com".parse().unwrap(),
            )
        }

        fn cache(&self) -> CacheStore {
            CacheStore::load(&self.cache_path).unwrap()
        }
    }

    #[tokio::test]
    async fn test_fresh_feed_delivers_all_then_second_run_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(&dir);
        let provider = TestProvider::with_feed(vec![illust(1), illust(2), illust(3)]);

        let mailer = ScriptedMailer::ok();
        let summary = harness
            .engine(provider.clone(), WritingDownloader::none(), mailer.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.delivered, 3);
        assert_eq!(summary.skipped, 0);
        assert_eq!(mailer.sent_count(), 3);
        assert_eq!(harness.cache().seen_count(), 3);

        // Second run over the unchanged feed: nothing new, token reused.
        let mailer2 = ScriptedMailer::ok();
        let summary = harness
            .engine(provider.clone(), WritingDownloader::none(), mailer2.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.skipped, 3);
        assert_eq!(mailer2.sent_count(), 0);
        assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.cache().seen_count(), 3);
    }

    #[tokio::test]
    async fn test_partial_failure_containment() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(&dir);
        let provider = TestProvider::with_feed(vec![illust(1), illust(2), illust(3)]);

        // Second send (item 2) fails fatally.
        let mailer = ScriptedMailer::failing_on(Some(1));
        let result = harness
            .engine(provider.clone(), WritingDownloader::none(), mailer.clone())
            .run()
            .await;

        assert!(matches!(result, Err(CourierError::Delivery(_))));
        assert_eq!(mailer.sent_count(), 1);

        let cache = harness.cache();
        assert!(cache.is_seen(1));
        assert!(!cache.is_seen(2));
        assert!(!cache.is_seen(3));

        // Next run retries items 2 and 3, not item 1.
        let mailer2 = ScriptedMailer::ok();
        let summary = harness
            .engine(provider, WritingDownloader::none(), mailer2.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(mailer2.sent_count(), 2);
        assert_eq!(harness.cache().seen_count(), 3);
    }

    #[tokio::test]
    async fn test_seen_item_triggers_no_work() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(&dir);
        harness.cache().mark_seen(42).unwrap();

        let provider = TestProvider::with_feed(vec![illust(42)]);
        let downloader = WritingDownloader::none();
        let mailer = ScriptedMailer::ok();

        let summary = harness
            .engine(provider, downloader.clone(), mailer.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(mailer.sent_count(), 0);
        assert_eq!(harness.cache().seen_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_files_still_delivers_without_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(&dir);
        let provider = TestProvider::with_feed(vec![illust(42)]);
        let mailer = ScriptedMailer::ok();

        let summary = harness
            .engine(provider, WritingDownloader::none(), mailer.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.delivered, 1);
        let sent = mailer.sent.lock().unwrap();
        assert!(!sent[0].contains("42_p0.png"));
        assert!(sent[0].contains("Work 42"));
        assert!(harness.cache().is_seen(42));
    }

    #[tokio::test]
    async fn test_scenario_new_item_with_two_pages() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(&dir);
        let provider = TestProvider::with_feed(vec![illust(42)]);
        let downloader =
            WritingDownloader::with_files(vec!["42_p0.png".into(), "42_p1.png".into()]);
        let mailer = ScriptedMailer::ok();

        let summary = harness
            .engine(provider.clone(), downloader, mailer.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.delivered, 1);
        assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 1);

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("42_p0.png"));
        assert!(sent[0].contains("42_p1.png"));

        let cache = harness.cache();
        assert!(cache.is_seen(42));
        assert!(cache.credential().is_some());
    }

    #[tokio::test]
    async fn test_run_after_expiry_refreshes_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(&dir);
        harness
            .cache()
            .set_credential(Credential {
                access_token: "stale".into(),
                expires_at: Utc::now().timestamp() - 10,
            })
            .unwrap();

        let provider = TestProvider::with_feed(vec![]);
        harness
            .engine(provider.clone(), WritingDownloader::none(), ScriptedMailer::ok())
            .run()
            .await
            .unwrap();

        assert_eq!(provider.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.cache().credential().unwrap().access_token, "tok");
    }

    #[tokio::test]
    async fn test_auth_failure_halts_before_items() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(&dir);
        let provider = Arc::new(TestProvider {
            illusts: vec![illust(1)],
            refresh_calls: AtomicUsize::new(0),
            fail_feed: false,
            fail_refresh: true,
        });
        let mailer = ScriptedMailer::ok();

        let result = harness
            .engine(provider, WritingDownloader::none(), mailer.clone())
            .run()
            .await;

        assert!(matches!(result, Err(CourierError::Auth(_))));
        assert_eq!(mailer.sent_count(), 0);
        assert_eq!(harness.cache().seen_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_halts_before_items() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(&dir);
        let provider = Arc::new(TestProvider {
            illusts: vec![illust(1)],
            refresh_calls: AtomicUsize::new(0),
            fail_feed: true,
            fail_refresh: false,
        });
        let mailer = ScriptedMailer::ok();

        let result = harness
            .engine(provider, WritingDownloader::none(), mailer.clone())
            .run()
            .await;

        assert!(matches!(result, Err(CourierError::Fetch(_))));
        assert_eq!(mailer.sent_count(), 0);
    }
}
