//! Paged refresh of a collection from a remote source.

use std::sync::Arc;

use async_trait::async_trait;
use cachedb_types::{temporal, EntityMetadata, Source};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{RepoError, RepoResult};
use crate::record::{to_entity, Record};
use crate::repository::Repository;

/// Overrides the number of concurrent detail fetches.
pub const SYNC_CONCURRENCY_ENV: &str = "CACHEDB_SYNC_CONCURRENCY";

/// One page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageParams {
    pub limit: usize,
    pub offset: usize,
}

/// The remote API, as seen by one record kind.
#[async_trait]
pub trait SyncSource<T: Send>: Send + Sync {
    /// Fetch one page of list-level records. An empty page ends the sync.
    async fn fetch_page(&self, params: PageParams) -> anyhow::Result<Vec<T>>;

    /// Fetch the detailed form of one record.
    async fn fetch_detail(&self, _id: &str) -> anyhow::Result<Option<T>> {
        Ok(None)
    }

    /// Whether list-level records should be replaced by their detail.
    fn enriches(&self) -> bool {
        false
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    pub page_size: usize,
    /// Maximum in-flight detail fetches.
    pub concurrency: usize,
    /// Stop after this many records.
    pub max_items: Option<usize>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: 50,
            concurrency: 5,
            max_items: None,
        }
    }
}

impl SyncOptions {
    /// Defaults with the concurrency taken from the environment.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Concurrency is clamped to what a
    /// semaphore can hold.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(n) = lookup(SYNC_CONCURRENCY_ENV).and_then(|v| v.trim().parse::<usize>().ok()) {
            self.concurrency = n.clamp(1, Semaphore::MAX_PERMITS);
        }
        self
    }
}

/// Counters from one sync run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub pages: usize,
    pub fetched: usize,
    pub saved: usize,
    /// Records replaced by their detailed form.
    pub enriched: usize,
    /// Records kept in list form because the detail fetch failed or was empty.
    pub fallbacks: usize,
}

impl<T: Record> Repository<T> {
    /// Page through `source` and persist every page before asking for the next.
    ///
    /// A failed detail fetch keeps the list-level record. A failed page fetch
    /// stops the sync with [`RepoError::Fetch`]; pages already saved stay saved.
    pub async fn sync(
        &self,
        source: Arc<dyn SyncSource<T>>,
        options: &SyncOptions,
    ) -> RepoResult<SyncReport> {
        let page_size = options.page_size.max(1);
        let semaphore = Arc::new(Semaphore::new(
            options.concurrency.clamp(1, Semaphore::MAX_PERMITS),
        ));
        let mut report = SyncReport::default();
        let mut offset = 0;

        loop {
            let limit = match options.max_items {
                Some(max) if report.fetched >= max => break,
                Some(max) => page_size.min(max - report.fetched),
                None => page_size,
            };

            let items = source
                .fetch_page(PageParams { limit, offset })
                .await
                .map_err(|e| RepoError::Fetch {
                    collection: T::COLLECTION,
                    offset,
                    reason: format!("{e:#}"),
                })?;
            if items.is_empty() {
                break;
            }
            report.pages += 1;
            report.fetched += items.len();
            offset += items.len();

            let items = if source.enriches() {
                self.enrich(&source, items, &semaphore, &mut report).await
            } else {
                items
            };

            let saved = items.len();
            self.persist_page(items).await?;
            report.saved += saved;
            debug!(collection = T::COLLECTION, offset, saved, "sync page stored");
        }

        if report.pages == 0 {
            let repo = self.clone();
            tokio::task::spawn_blocking(move || repo.update_sync_time())
                .await
                .map_err(|e| RepoError::Task(e.to_string()))??;
        }

        info!(
            collection = T::COLLECTION,
            pages = report.pages,
            saved = report.saved,
            enriched = report.enriched,
            fallbacks = report.fallbacks,
            "sync finished"
        );
        Ok(report)
    }

    async fn enrich(
        &self,
        source: &Arc<dyn SyncSource<T>>,
        items: Vec<T>,
        semaphore: &Arc<Semaphore>,
        report: &mut SyncReport,
    ) -> Vec<T> {
        let mut tasks = JoinSet::new();
        for (index, item) in items.iter().enumerate() {
            let source = Arc::clone(source);
            let semaphore = Arc::clone(semaphore);
            let id = item.id().to_string();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (index, source.fetch_detail(&id).await)
            });
        }

        let mut details: Vec<Option<T>> = (0..items.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(Some(detail)))) => details[index] = Some(detail),
                Ok((index, Ok(None))) => {
                    debug!(collection = T::COLLECTION, id = items[index].id(), "no detail; keeping list record");
                }
                Ok((index, Err(e))) => {
                    let reason = format!("{e:#}");
                    warn!(
                        collection = T::COLLECTION,
                        id = items[index].id(),
                        error = %reason,
                        "detail fetch failed; keeping list record"
                    );
                }
                Err(e) => warn!(collection = T::COLLECTION, error = %e, "detail task failed"),
            }
        }

        items
            .into_iter()
            .zip(details)
            .map(|(item, detail)| match detail {
                Some(detail) => {
                    report.enriched += 1;
                    detail
                }
                None => {
                    report.fallbacks += 1;
                    item
                }
            })
            .collect()
    }

    async fn persist_page(&self, items: Vec<T>) -> RepoResult<()> {
        let now = temporal::now();
        let mut entities = Vec::with_capacity(items.len());
        for item in &items {
            let mut entity = to_entity(item)?;
            entity.metadata = Some(EntityMetadata {
                fetched_at: now,
                source: Source::Api,
                synced_at: Some(now),
            });
            entities.push(entity);
        }

        let repo = self.clone();
        tokio::task::spawn_blocking(move || repo.save_entities(entities))
            .await
            .map_err(|e| RepoError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::Dataset;
    use cachedb_store::{DocumentStore, StoreConfig};
    use cachedb_write::WriteProfile;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn repo(dir: &std::path::Path) -> Repository<Dataset> {
        let config = StoreConfig::at(dir).with_write_profile(WriteProfile::default());
        Repository::new(Arc::new(DocumentStore::open(config).unwrap()))
    }

    fn listed(n: usize) -> Vec<Dataset> {
        (0..n)
            .map(|i| Dataset {
                id: format!("d{i:03}"),
                name: format!("list {i}"),
                ..Dataset::default()
            })
            .collect()
    }

    /// Serves `items` in pages; optional failure points for pages and details.
    struct FakeSource {
        items: Vec<Dataset>,
        fail_page_at: Option<usize>,
        failing_details: HashSet<String>,
        missing_details: HashSet<String>,
        enriches: bool,
        detail_delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        pages_requested: Mutex<Vec<PageParams>>,
    }

    impl FakeSource {
        fn new(items: Vec<Dataset>) -> Self {
            Self {
                items,
                fail_page_at: None,
                failing_details: HashSet::new(),
                missing_details: HashSet::new(),
                enriches: false,
                detail_delay: Duration::ZERO,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                pages_requested: Mutex::new(Vec::new()),
            }
        }

        fn enriching(mut self) -> Self {
            self.enriches = true;
            self
        }
    }

    #[async_trait]
    impl SyncSource<Dataset> for FakeSource {
        async fn fetch_page(&self, params: PageParams) -> anyhow::Result<Vec<Dataset>> {
            self.pages_requested.lock().unwrap().push(params);
            if self.fail_page_at == Some(params.offset) {
                anyhow::bail!("upstream returned 503");
            }
            Ok(self
                .items
                .iter()
                .skip(params.offset)
                .take(params.limit)
                .cloned()
                .collect())
        }

        async fn fetch_detail(&self, id: &str) -> anyhow::Result<Option<Dataset>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.detail_delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing_details.contains(id) {
                anyhow::bail!("detail for {id} timed out");
            }
            if self.missing_details.contains(id) {
                return Ok(None);
            }
            Ok(Some(Dataset {
                id: id.to_string(),
                name: format!("detail {id}"),
                row_count: Some(100),
                ..Dataset::default()
            }))
        }

        fn enriches(&self) -> bool {
            self.enriches
        }
    }

    #[tokio::test]
    async fn pages_until_empty_page() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        let source = Arc::new(FakeSource::new(listed(7)));
        let options = SyncOptions {
            page_size: 3,
            ..SyncOptions::default()
        };

        let report = repo.sync(source.clone(), &options).await.unwrap();
        assert_eq!(report.pages, 3);
        assert_eq!(report.fetched, 7);
        assert_eq!(report.saved, 7);
        assert_eq!(repo.count(None).unwrap(), 7);
        assert!(repo.last_sync().unwrap().is_some());

        let offsets: Vec<usize> = source
            .pages_requested
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.offset)
            .collect();
        assert_eq!(offsets, vec![0, 3, 6, 7]);
    }

    #[tokio::test]
    async fn synced_records_carry_sync_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        repo.sync(Arc::new(FakeSource::new(listed(1))), &SyncOptions::default())
            .await
            .unwrap();

        let meta = repo.get("d000").unwrap().unwrap().metadata.unwrap();
        assert_eq!(meta.source, Source::Api);
        assert_eq!(meta.synced_at, Some(meta.fetched_at));
    }

    #[tokio::test]
    async fn failed_detail_falls_back_to_list_record() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        let mut source = FakeSource::new(listed(4)).enriching();
        source.failing_details.insert("d001".into());
        source.missing_details.insert("d002".into());

        let report = repo.sync(Arc::new(source), &SyncOptions::default()).await.unwrap();
        assert_eq!(report.enriched, 2);
        assert_eq!(report.fallbacks, 2);
        assert_eq!(report.saved, 4);

        assert_eq!(repo.get("d000").unwrap().unwrap().name, "detail d000");
        assert_eq!(repo.get("d001").unwrap().unwrap().name, "list 1");
        assert_eq!(repo.get("d002").unwrap().unwrap().name, "list 2");
        assert_eq!(repo.get("d003").unwrap().unwrap().row_count, Some(100));
    }

    #[tokio::test]
    async fn failed_page_keeps_earlier_pages() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        let mut source = FakeSource::new(listed(6));
        source.fail_page_at = Some(2);
        let options = SyncOptions {
            page_size: 2,
            ..SyncOptions::default()
        };

        let err = repo.sync(Arc::new(source), &options).await.unwrap_err();
        match err {
            RepoError::Fetch {
                collection, offset, ..
            } => {
                assert_eq!(collection, "datasets");
                assert_eq!(offset, 2);
            }
            other => panic!("expected Fetch error, got {other:?}"),
        }
        let ids: Vec<String> = repo.all().unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["d000", "d001"]);
    }

    #[tokio::test]
    async fn detail_fetches_respect_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        let mut source = FakeSource::new(listed(12)).enriching();
        source.detail_delay = Duration::from_millis(20);
        let source = Arc::new(source);
        let options = SyncOptions {
            page_size: 12,
            concurrency: 3,
            max_items: None,
        };

        let report = repo.sync(source.clone(), &options).await.unwrap();
        assert_eq!(report.enriched, 12);
        let peak = source.max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight was {peak}");
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn max_items_caps_fetching() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        let source = Arc::new(FakeSource::new(listed(10)));
        let options = SyncOptions {
            page_size: 4,
            max_items: Some(5),
            ..SyncOptions::default()
        };

        let report = repo.sync(source.clone(), &options).await.unwrap();
        assert_eq!(report.fetched, 5);
        let limits: Vec<usize> = source
            .pages_requested
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.limit)
            .collect();
        assert_eq!(limits, vec![4, 1]);
    }

    #[tokio::test]
    async fn empty_remote_still_marks_sync_time() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        let report = repo
            .sync(Arc::new(FakeSource::new(Vec::new())), &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report, SyncReport::default());
        assert!(!repo.needs_sync(chrono::Duration::minutes(1)).unwrap());
    }

    #[test]
    fn concurrency_from_environment() {
        let lookup = |value: &'static str| {
            move |key: &str| (key == SYNC_CONCURRENCY_ENV).then(|| value.to_string())
        };
        assert_eq!(SyncOptions::default().with_overrides(lookup("8")).concurrency, 8);
        assert_eq!(SyncOptions::default().with_overrides(lookup("0")).concurrency, 1);
        assert_eq!(SyncOptions::default().with_overrides(lookup("many")).concurrency, 5);
        assert_eq!(SyncOptions::default().with_overrides(|_| None).concurrency, 5);
        assert_eq!(
            SyncOptions::default()
                .with_overrides(|_| Some(usize::MAX.to_string()))
                .concurrency,
            Semaphore::MAX_PERMITS
        );
    }

    #[tokio::test]
    async fn oversized_concurrency_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(dir.path());
        let options = SyncOptions {
            concurrency: usize::MAX,
            ..SyncOptions::default()
        };
        let source = Arc::new(FakeSource::new(listed(3)).enriching());
        let report = repo.sync(source, &options).await.unwrap();
        assert_eq!(report.enriched, 3);
    }
}
