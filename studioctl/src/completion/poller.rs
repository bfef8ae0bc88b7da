//! Client-side polling for creations that are still in progress.
//!
//! [`CreationPoller`] re-fetches the account's records on a fixed interval while any of them is
//! pending or processing, and publishes each result on a [`watch`] channel. It never talks to a
//! provider: it only reads records, which the callback path moves forward.
//!
//! Polling goes idle once nothing is in progress and resumes on
//! [`CreationPoller::notify_submitted`]. With `stall_after` set, records in progress for longer
//! than that are reported as stalled and stop keeping the poller awake.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::api::models::{creations::CreationResponse, pagination::MAX_LIMIT};
use crate::types::CreationId;

/// Source of the account's creation records. `fetch` returns every record the account has, so
/// the poller can replace its view wholesale.
#[async_trait]
pub trait CreationFeed: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<Vec<CreationResponse>>;
}

/// Reads `GET /api/v1/creations` with a bearer session token, one full page at a time until a
/// short page
pub struct HttpCreationFeed {
    client: Client,
    url: Url,
    token: String,
}

impl HttpCreationFeed {
    pub fn new(base_url: &Url, token: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            url: crate::providers::ensure_slash(base_url).join("api/v1/creations")?,
            token: token.into(),
        })
    }

    async fn fetch_page(&self, skip: i64) -> anyhow::Result<Vec<CreationResponse>> {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("skip", &skip.to_string())
            .append_pair("limit", &MAX_LIMIT.to_string());
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl CreationFeed for HttpCreationFeed {
    async fn fetch(&self) -> anyhow::Result<Vec<CreationResponse>> {
        let mut records = Vec::new();
        loop {
            let page = self.fetch_page(records.len() as i64).await?;
            let full = page.len() as i64 >= MAX_LIMIT;
            records.extend(page);
            if !full {
                return Ok(records);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    /// Give up waiting on a record after this long; `None` waits forever
    pub stall_after: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            stall_after: None,
        }
    }
}

/// What the poller last saw
#[derive(Debug, Clone, Default)]
pub struct PollSnapshot {
    pub records: BTreeMap<CreationId, CreationResponse>,
    /// In-progress records older than `stall_after`
    pub stalled: BTreeSet<CreationId>,
    /// Completed refreshes so far
    pub refreshes: u64,
    /// True while waiting for [`CreationPoller::notify_submitted`]
    pub idle: bool,
}

impl PollSnapshot {
    /// Records still in progress that are not stalled
    pub fn active(&self) -> impl Iterator<Item = &CreationResponse> {
        self.records
            .values()
            .filter(|r| !r.status.is_terminal() && !self.stalled.contains(&r.id))
    }

    pub fn has_active(&self) -> bool {
        self.active().next().is_some()
    }
}

pub struct CreationPoller {
    feed: Arc<dyn CreationFeed>,
    config: PollerConfig,
    submitted: Notify,
    snapshot: watch::Sender<PollSnapshot>,
}

impl CreationPoller {
    pub fn new(feed: Arc<dyn CreationFeed>, config: PollerConfig) -> Self {
        Self {
            feed,
            config,
            submitted: Notify::new(),
            snapshot: watch::Sender::new(PollSnapshot::default()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
        self.snapshot.subscribe()
    }

    /// Wake the poller after submitting a creation. A wake-up sent while a refresh is running
    /// is kept, so the next wait returns immediately.
    pub fn notify_submitted(&self) {
        self.submitted.notify_one();
    }

    /// Fetch once and publish the new snapshot
    pub async fn refresh(&self) -> anyhow::Result<()> {
        let records = self.feed.fetch().await?;
        let now = Utc::now();
        let stall_after = self.config.stall_after.and_then(|d| chrono::Duration::from_std(d).ok());

        self.snapshot.send_modify(|snapshot| {
            snapshot.records = records.into_iter().map(|r| (r.id, r)).collect();
            snapshot.stalled = match stall_after {
                Some(cap) => snapshot
                    .records
                    .values()
                    .filter(|r| !r.status.is_terminal() && now - r.created_at > cap)
                    .map(|r| r.id)
                    .collect(),
                None => BTreeSet::new(),
            };
            snapshot.refreshes += 1;
        });
        Ok(())
    }

    fn set_idle(&self, idle: bool) {
        self.snapshot.send_if_modified(|snapshot| {
            let changed = snapshot.idle != idle;
            snapshot.idle = idle;
            changed
        });
    }

    /// Poll until `shutdown` is cancelled
    #[instrument(skip_all, fields(interval = ?self.config.poll_interval))]
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Creation poller started");
        loop {
            if let Err(e) = self.refresh().await {
                warn!(error = %e, "Failed to refresh creations");
            }

            if self.snapshot.borrow().has_active() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    _ = self.submitted.notified() => {}
                }
            } else {
                debug!("Nothing in progress; poller idle");
                self.set_idle(true);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = self.submitted.notified() => {}
                }
                self.set_idle(false);
            }
        }
        info!("Creation poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::creations::{CreationKind, CreationPayload, CreationStatus};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves queued responses, repeating the last one
    struct ScriptedFeed {
        responses: Mutex<VecDeque<Vec<CreationResponse>>>,
        last: Mutex<Vec<CreationResponse>>,
        calls: AtomicUsize,
    }

    impl ScriptedFeed {
        fn new(responses: Vec<Vec<CreationResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                last: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CreationFeed for ScriptedFeed {
        async fn fetch(&self) -> anyhow::Result<Vec<CreationResponse>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.responses.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            if let Some(next) = next {
                *last = next;
            }
            Ok(last.clone())
        }
    }

    fn music(id: CreationId, status: CreationStatus, age: chrono::Duration) -> CreationResponse {
        let created_at = Utc::now() - age;
        CreationResponse {
            id,
            kind: CreationKind::Music,
            status,
            details: CreationPayload::Music {
                prompt: "a song".to_string(),
                style: "pop".to_string(),
                title: "Song".to_string(),
                instrumental: false,
            },
            asset_urls: Vec::new(),
            error_message: None,
            created_at,
            updated_at: created_at,
            completed_at: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_terminal_then_idles() {
        let id = uuid::Uuid::new_v4();
        let feed = ScriptedFeed::new(vec![
            vec![music(id, CreationStatus::Pending, chrono::Duration::zero())],
            vec![music(id, CreationStatus::Processing, chrono::Duration::zero())],
            vec![music(id, CreationStatus::Completed, chrono::Duration::zero())],
        ]);
        let poller = Arc::new(CreationPoller::new(feed.clone(), PollerConfig::default()));
        let mut rx = poller.subscribe();
        let shutdown = CancellationToken::new();

        let task = tokio::spawn({
            let poller = poller.clone();
            let shutdown = shutdown.clone();
            async move { poller.run(shutdown).await }
        });

        let snapshot = rx.wait_for(|s| s.idle).await.unwrap().clone();
        assert_eq!(snapshot.records[&id].status, CreationStatus::Completed);
        assert_eq!(feed.calls(), 3);

        // Idle: time passing does not trigger fetches
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(feed.calls(), 3);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_resumes_idle_poller() {
        let first = uuid::Uuid::new_v4();
        let second = uuid::Uuid::new_v4();
        let feed = ScriptedFeed::new(vec![
            vec![],
            vec![music(second, CreationStatus::Pending, chrono::Duration::zero())],
            vec![
                music(first, CreationStatus::Completed, chrono::Duration::hours(1)),
                music(second, CreationStatus::Completed, chrono::Duration::zero()),
            ],
        ]);
        let poller = Arc::new(CreationPoller::new(feed.clone(), PollerConfig::default()));
        let mut rx = poller.subscribe();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn({
            let poller = poller.clone();
            let shutdown = shutdown.clone();
            async move { poller.run(shutdown).await }
        });

        rx.wait_for(|s| s.idle && s.refreshes == 1).await.unwrap();
        assert_eq!(feed.calls(), 1);

        poller.notify_submitted();
        let snapshot = rx.wait_for(|s| s.idle && s.refreshes == 3).await.unwrap().clone();
        assert_eq!(snapshot.records.len(), 2);
        assert!(snapshot.records.values().all(|r| r.status == CreationStatus::Completed));

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_records_stop_polling() {
        let old = uuid::Uuid::new_v4();
        let feed = ScriptedFeed::new(vec![vec![music(old, CreationStatus::Pending, chrono::Duration::minutes(30))]]);
        let poller = Arc::new(CreationPoller::new(
            feed.clone(),
            PollerConfig {
                poll_interval: Duration::from_secs(5),
                stall_after: Some(Duration::from_secs(600)),
            },
        ));
        let mut rx = poller.subscribe();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn({
            let poller = poller.clone();
            let shutdown = shutdown.clone();
            async move { poller.run(shutdown).await }
        });

        let snapshot = rx.wait_for(|s| s.idle).await.unwrap().clone();
        assert!(snapshot.stalled.contains(&old));
        assert_eq!(snapshot.records[&old].status, CreationStatus::Pending);
        assert_eq!(feed.calls(), 1);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_http_feed_reads_every_page() {
        use wiremock::matchers::{bearer_token, method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        crate::test_utils::install_crypto_provider();
        let server = MockServer::start().await;
        let first_page: Vec<_> = (0..MAX_LIMIT)
            .map(|_| music(uuid::Uuid::new_v4(), CreationStatus::Completed, chrono::Duration::zero()))
            .collect();
        let oldest = music(uuid::Uuid::new_v4(), CreationStatus::Processing, chrono::Duration::hours(1));
        Mock::given(method("GET"))
            .and(path("/api/v1/creations"))
            .and(query_param("skip", "0"))
            .and(query_param("limit", "100"))
            .and(bearer_token("session-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&first_page))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/creations"))
            .and(query_param("skip", "100"))
            .and(bearer_token("session-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![oldest.clone()]))
            .expect(1)
            .mount(&server)
            .await;

        let feed = HttpCreationFeed::new(&Url::parse(&server.uri()).unwrap(), "session-token").unwrap();
        let records = feed.fetch().await.unwrap();
        assert_eq!(records.len(), 101);
        assert_eq!(records.last(), Some(&oldest));
    }

    #[tokio::test]
    async fn test_refresh_replaces_stale_records() {
        let id = uuid::Uuid::new_v4();
        let feed = ScriptedFeed::new(vec![
            vec![music(id, CreationStatus::Pending, chrono::Duration::zero())],
            vec![music(id, CreationStatus::Completed, chrono::Duration::zero())],
        ]);
        let poller = CreationPoller::new(feed, PollerConfig::default());

        poller.refresh().await.unwrap();
        assert!(poller.subscribe().borrow().has_active());

        poller.refresh().await.unwrap();
        let snapshot = poller.subscribe().borrow().clone();
        assert_eq!(snapshot.records[&id].status, CreationStatus::Completed);
        assert!(!snapshot.has_active());
    }
}
