//! Reference data cache.
//!
//! Valid category and account names live on a configuration sheet and are
//! refreshed at most once per TTL window. The refresh happens under the
//! cache lock, so concurrent callers single-flight one remote fetch. When
//! the remote fetch fails and a previous snapshot exists, the stale
//! snapshot is served instead of an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::CatalogRanges;
use crate::error::Result;
use crate::ledger::LedgerStore;

/// One consistent view of the reference data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogSnapshot {
    pub expense_categories: Vec<String>,
    pub income_categories: Vec<String>,
    pub accounts: Vec<String>,
}

impl CatalogSnapshot {
    /// Case-insensitive membership, returning the canonical spelling.
    /// Canonical input comes back unchanged, which keeps a second
    /// validation pass a no-op.
    pub fn canonical_expense_category(&self, name: &str) -> Option<String> {
        canonical(&self.expense_categories, name)
    }

    pub fn canonical_income_category(&self, name: &str) -> Option<String> {
        canonical(&self.income_categories, name)
    }

    pub fn canonical_account(&self, name: &str) -> Option<String> {
        canonical(&self.accounts, name)
    }
}

fn canonical(list: &[String], needle: &str) -> Option<String> {
    let needle = needle.trim();
    list.iter()
        .find(|entry| entry.to_lowercase() == needle.to_lowercase())
        .cloned()
}

struct CachedState {
    snapshot: Arc<CatalogSnapshot>,
    fetched_at: Instant,
}

/// Time-boxed cache over the configuration ranges of the ledger store.
pub struct Catalog {
    store: Arc<dyn LedgerStore>,
    ranges: CatalogRanges,
    ttl: Duration,
    state: Mutex<Option<CachedState>>,
}

impl Catalog {
    pub fn new(store: Arc<dyn LedgerStore>, ranges: CatalogRanges, ttl: Duration) -> Self {
        Self {
            store,
            ranges,
            ttl,
            state: Mutex::new(None),
        }
    }

    /// Current snapshot, refreshed if older than the TTL.
    pub async fn snapshot(&self) -> Result<Arc<CatalogSnapshot>> {
        let mut state = self.state.lock().await;
        if let Some(cached) = state.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&cached.snapshot));
            }
        }

        match self.fetch().await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                *state = Some(CachedState {
                    snapshot: Arc::clone(&snapshot),
                    fetched_at: Instant::now(),
                });
                Ok(snapshot)
            }
            Err(err) => match state.as_ref() {
                Some(cached) => {
                    tracing::warn!(%err, "catalog refresh failed, serving stale snapshot");
                    Ok(Arc::clone(&cached.snapshot))
                }
                None => Err(err),
            },
        }
    }

    async fn fetch(&self) -> Result<CatalogSnapshot> {
        let expense_categories = self
            .store
            .read_column(&self.ranges.expense_categories)
            .await?;
        let income_categories = self.store.read_column(&self.ranges.income_categories).await?;
        let accounts = self.store.read_column(&self.ranges.accounts).await?;
        tracing::debug!(
            expenses = expense_categories.len(),
            incomes = income_categories.len(),
            accounts = accounts.len(),
            "catalog refreshed"
        );
        Ok(CatalogSnapshot {
            expense_categories,
            income_categories,
            accounts,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::error::LedgerError;
    use crate::ledger::BatchOp;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingStore {
        fetches: AtomicUsize,
        fail: AtomicBool,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl LedgerStore for CountingStore {
        async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(LedgerError::Store("remote unavailable".to_owned()));
            }
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let values = if range.contains("M7") {
                vec![vec!["Наличные".to_owned()], vec!["Карта".to_owned()]]
            } else {
                vec![vec!["Продукты".to_owned()]]
            };
            Ok(values)
        }

        async fn batch(&self, _ops: Vec<BatchOp>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn serves_cached_snapshot_within_ttl() {
        let store = Arc::new(CountingStore::new());
        let catalog = Catalog::new(
            Arc::clone(&store) as Arc<dyn LedgerStore>,
            CatalogRanges::default(),
            Duration::from_secs(300),
        );

        let first = catalog.snapshot().await.unwrap();
        let second = catalog.snapshot().await.unwrap();
        assert_eq!(first, second);
        // Three ranges per refresh, refreshed once.
        assert_eq!(store.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_ttl_refreshes_every_time() {
        let store = Arc::new(CountingStore::new());
        let catalog = Catalog::new(
            Arc::clone(&store) as Arc<dyn LedgerStore>,
            CatalogRanges::default(),
            Duration::ZERO,
        );
        catalog.snapshot().await.unwrap();
        catalog.snapshot().await.unwrap();
        assert_eq!(store.fetches.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn stale_snapshot_survives_remote_failure() {
        let store = Arc::new(CountingStore::new());
        let catalog = Catalog::new(
            Arc::clone(&store) as Arc<dyn LedgerStore>,
            CatalogRanges::default(),
            Duration::ZERO,
        );
        let first = catalog.snapshot().await.unwrap();
        store.fail.store(true, Ordering::SeqCst);
        let stale = catalog.snapshot().await.unwrap();
        assert_eq!(first, stale);
    }

    #[tokio::test]
    async fn cold_cache_propagates_remote_failure() {
        let store = Arc::new(CountingStore::new());
        store.fail.store(true, Ordering::SeqCst);
        let catalog = Catalog::new(
            Arc::clone(&store) as Arc<dyn LedgerStore>,
            CatalogRanges::default(),
            Duration::ZERO,
        );
        assert!(catalog.snapshot().await.is_err());
    }

    #[test]
    fn canonical_lookup_is_case_insensitive_and_idempotent() {
        let snapshot = CatalogSnapshot {
            expense_categories: vec!["Продукты".to_owned()],
            income_categories: vec![],
            accounts: vec!["Наличные".to_owned()],
        };
        assert_eq!(
            snapshot.canonical_expense_category("продукты"),
            Some("Продукты".to_owned())
        );
        // Already-canonical input is unchanged.
        assert_eq!(
            snapshot.canonical_expense_category("Продукты"),
            Some("Продукты".to_owned())
        );
        assert_eq!(snapshot.canonical_account("касса"), None);
    }
}
