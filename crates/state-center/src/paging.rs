use std::future::Future;
use std::hash::Hash;

use dashmap::DashMap;
use tracing::debug;

use scriptflow_core_types::{CachedEntity, SyncError};

use crate::cache::EntityCache;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PageRequest {
    /// Append the next page instead of replacing the list.
    pub more: bool,
    pub limit: usize,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self { more: false, limit }
    }

    pub fn next(limit: usize) -> Self {
        Self { more: true, limit }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Page<E> {
    pub items: Vec<E>,
    pub total_count: u64,
}

/// Server-paged lists kept in an [`EntityCache`], merged with whatever push
/// events inserted between fetches.
pub struct PagedCache<K, E>
where
    K: Eq + Hash + Clone,
    E: CachedEntity,
{
    cache: EntityCache<K, E>,
    totals: DashMap<K, u64>,
    per_page: usize,
}

impl<K, E> PagedCache<K, E>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    E: CachedEntity,
{
    pub fn new(per_page: usize) -> Self {
        Self {
            cache: EntityCache::new(),
            totals: DashMap::new(),
            per_page: per_page.max(1),
        }
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn cache(&self) -> &EntityCache<K, E> {
        &self.cache
    }

    /// 1-based index of the page to request.
    ///
    /// Continuations derive it from the cached length so that entries pushed
    /// since the last fetch move the window forward.
    pub fn next_page_index(&self, key: &K, more: bool) -> u32 {
        if !more {
            return 1;
        }
        page_index(self.cache.len(key), self.per_page)
    }

    /// Run `fetch` with the page index and the request's limit, then merge
    /// its result.
    ///
    /// A fresh fetch replaces the list. A continuation appends only ids not
    /// cached yet, since pushes may have shifted server offsets into overlap.
    /// On error nothing is touched.
    pub async fn fetch_page<F, Fut>(
        &self,
        key: &K,
        request: PageRequest,
        fetch: F,
    ) -> Result<Page<E>, SyncError>
    where
        F: FnOnce(u32, u32) -> Fut,
        Fut: Future<Output = Result<Page<E>, SyncError>>,
    {
        let page_index = self.next_page_index(key, request.more);
        let limit = u32::try_from(request.limit.max(1)).unwrap_or(u32::MAX);
        let page = fetch(page_index, limit).await?;
        if request.more {
            let appended = self.cache.extend_unique(key, page.items.clone());
            debug!(
                ?key,
                page_index,
                fetched = page.items.len(),
                appended,
                "merged continuation page"
            );
        } else {
            self.cache.replace(key, page.items.clone());
        }
        self.totals.insert(key.clone(), page.total_count);
        Ok(page)
    }

    /// Overwrite a key's list without touching its total.
    pub fn replace_with(&self, key: &K, items: Vec<E>) {
        self.cache.replace(key, items);
    }

    pub fn total(&self, key: &K) -> Option<u64> {
        self.totals.get(key).map(|total| *total)
    }

    pub fn has_more(&self, key: &K) -> bool {
        (self.cache.len(key) as u64) < self.total(key).unwrap_or(0)
    }

    pub fn clear(&self, key: &K) {
        self.cache.remove(key);
        self.totals.remove(key);
    }
}

fn page_index(cached: usize, per_page: usize) -> u32 {
    u32::try_from(cached / per_page.max(1))
        .unwrap_or(u32::MAX)
        .saturating_add(1)
}
