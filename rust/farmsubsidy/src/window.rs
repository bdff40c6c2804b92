//! Windowed result cache.
//!
//! Paging or re-sorting a filtered aggregate costs about as much as running
//! it whole, so the unsliced result of a query (its window) is cached once
//! and every page and ordering is then cut from it in memory. Windows larger
//! than the threshold are never stored; a skip marker remembers that and its
//! row count so later requests go straight to the backend.

use crate::{
    auth::AuthTier,
    cache::{cache_key, CacheStore, CacheValue, Page, JSON_TAG, RAW_SHAPE, SKIP_TAG, WINDOW_TAG},
    driver::{Driver, ResultSet},
    error::Result,
    query::{OrderDirection, Query},
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Turns raw rows of a view into response records. May query the backend
/// again (two-phase views).
#[async_trait]
pub trait Finish: Send + Sync {
    async fn finish(&self, driver: &dyn Driver, rows: ResultSet) -> Result<Vec<Value>>;
}

/// One page request against a windowed query.
#[derive(Debug, Clone)]
pub struct WindowRequest<'a> {
    /// Name of the output shape the finished page has.
    pub shape: &'a str,
    pub tier: AuthTier,
    /// Fully specified query: ordered and sliced.
    pub query: &'a Query,
    /// In-memory ordering applied to a cached window.
    pub order: Option<(&'a str, OrderDirection)>,
    /// Row range of the page within the window, `None` for every row.
    pub range: Option<(usize, usize)>,
}

impl WindowRequest<'_> {
    pub fn direct_key(&self) -> String {
        cache_key(JSON_TAG, self.shape, self.tier, &self.query.to_sql())
    }

    /// Windows hold unfinished rows, so every shape over the same SQL
    /// shares one.
    fn window_key(&self) -> String {
        cache_key(WINDOW_TAG, RAW_SHAPE, self.tier, &self.query.unsliced().to_sql())
    }

    fn skip_key(&self, window_key: &str) -> String {
        cache_key(SKIP_TAG, RAW_SHAPE, self.tier, window_key)
    }
}

#[derive(Clone)]
pub struct WindowedCache {
    store: Arc<dyn CacheStore>,
    threshold: u64,
}

impl WindowedCache {
    pub fn new(store: Arc<dyn CacheStore>, threshold: u64) -> Self {
        Self { store, threshold }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub async fn fetch(
        &self,
        driver: &dyn Driver,
        finisher: &dyn Finish,
        request: &WindowRequest<'_>,
    ) -> Result<Page> {
        let direct_key = request.direct_key();
        if let Some(CacheValue::Page(page)) = self.store.get(&direct_key).await?.as_deref() {
            debug!(key = %direct_key, "page cache hit");
            return Ok(page.clone());
        }

        let window_key = request.window_key();
        let skip_key = request.skip_key(&window_key);
        if let Some(CacheValue::Skip { total }) = self.store.get(&skip_key).await?.as_deref() {
            debug!(key = %skip_key, "window skipped, querying backend");
            return self.direct(driver, finisher, request, *total).await;
        }

        let cached = self.store.get(&window_key).await?;
        let page = match cached.as_deref() {
            Some(CacheValue::Window(window)) => {
                debug!(key = %window_key, rows = window.len(), "window cache hit");
                self.page_from_window(driver, finisher, request, window).await?
            }
            _ => {
                let unsliced = request.query.unsliced();
                let total = driver.count(&unsliced).await?;
                if total > self.threshold {
                    info!(
                        total,
                        threshold = self.threshold,
                        "result too large to window, setting skip marker"
                    );
                    self.store.set(&skip_key, CacheValue::Skip { total }).await?;
                    return self.direct(driver, finisher, request, total).await;
                }
                let window = driver.query(&unsliced).await?;
                let page = self
                    .page_from_window(driver, finisher, request, &window)
                    .await?;
                self.store.set(&window_key, CacheValue::Window(window)).await?;
                page
            }
        };

        self.store
            .set(&direct_key, CacheValue::Page(page.clone()))
            .await?;
        Ok(page)
    }

    async fn page_from_window(
        &self,
        driver: &dyn Driver,
        finisher: &dyn Finish,
        request: &WindowRequest<'_>,
        window: &ResultSet,
    ) -> Result<Page> {
        let total = window.len() as u64;
        let rows = window.page(request.order, request.range);
        let results = finisher.finish(driver, rows).await?;
        Ok(Page { results, total })
    }

    async fn direct(
        &self,
        driver: &dyn Driver,
        finisher: &dyn Finish,
        request: &WindowRequest<'_>,
        total: u64,
    ) -> Result<Page> {
        let rows = driver.query(request.query).await?;
        let results = finisher.finish(driver, rows).await?;
        Ok(Page { results, total })
    }
}
