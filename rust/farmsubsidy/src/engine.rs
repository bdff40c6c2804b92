//! Request orchestration: parameters, access rules, paging, caching and
//! output formats for every view.

use crate::{
    auth::{self, AuthTier},
    cache::{cache_key, CacheStore, CacheValue, Page, CSV_TAG, EXPORT_TAG, JSON_TAG},
    config::AppConfig,
    driver::Driver,
    error::{Result, ServiceError},
    lookup::LookupValue,
    output::{self, ApiResult},
    pagination,
    params::{OutputFormat, ViewParams},
    query::{OrderDirection, Query},
    search::SearchKind,
    views::ViewKind,
    window::{Finish, WindowRequest, WindowedCache},
};
use axum::{
    http::{header::CONTENT_TYPE, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, info};

/// What a handler knows about the incoming request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Absolute request url, used for page links.
    pub url: String,
    /// Scheme and host, used for export links.
    pub base_url: String,
    pub tier: AuthTier,
    pub headers: HeaderMap,
}

#[derive(Debug)]
pub enum ViewResponse {
    Json(ApiResult),
    Csv(String),
}

impl IntoResponse for ViewResponse {
    fn into_response(self) -> Response {
        match self {
            ViewResponse::Json(result) => Json(result).into_response(),
            ViewResponse::Csv(body) => {
                ([(CONTENT_TYPE, "text/csv; charset=utf-8")], body).into_response()
            }
        }
    }
}

#[derive(Clone)]
pub struct QueryEngine {
    driver: Arc<dyn Driver>,
    cache: WindowedCache,
    config: Arc<AppConfig>,
}

impl QueryEngine {
    pub fn new(driver: Arc<dyn Driver>, store: Arc<dyn CacheStore>, config: Arc<AppConfig>) -> Self {
        let cache = WindowedCache::new(store, config.window_threshold);
        Self {
            driver,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub async fn execute_view(
        &self,
        view: ViewKind,
        pairs: &[(String, String)],
        ctx: &RequestContext,
    ) -> Result<ViewResponse> {
        let params = ViewParams::parse(pairs, view)?;
        self.respond(view, params, ctx).await
    }

    /// Search endpoints take `q` on top of the regular view parameters.
    pub async fn search(
        &self,
        kind: SearchKind,
        pairs: &[(String, String)],
        ctx: &RequestContext,
    ) -> Result<ViewResponse> {
        let q = pairs
            .iter()
            .rev()
            .find(|(key, _)| key == "q")
            .map(|(_, value)| value.as_str())
            .unwrap_or_default();
        let (field, value) = kind.lookup(q)?;

        let rest: Vec<(String, String)> = pairs
            .iter()
            .filter(|(key, _)| key != "q")
            .cloned()
            .collect();
        let params = ViewParams::parse(&rest, kind.view())?.with_filter(field, value)?;
        self.respond(kind.view(), params, ctx).await
    }

    /// Page size after access rules: a valid api key lifts the cap,
    /// authenticated file downloads get the export cap, everything else the
    /// view's cap.
    pub fn effective_limit(&self, view: ViewKind, params: &ViewParams, ctx: &RequestContext) -> Option<u64> {
        if auth::has_api_key(&ctx.headers, params.api_key.as_deref(), &self.config) {
            return params.limit;
        }
        let cap = if ctx.tier.is_authenticated() && params.output.is_file() {
            self.config.export_limit
        } else {
            view.max_limit(&self.config)
        };
        Some(params.limit.map_or(cap, |limit| limit.min(cap)))
    }

    /// The view's query with the request filters and access restrictions,
    /// without ordering or slicing.
    pub fn build_query(&self, view: ViewKind, params: &ViewParams, tier: AuthTier) -> Result<Query> {
        let query = view
            .template(&self.driver.query_template())
            .filter_with(params.where_predicates.clone())
            .having_with(params.having_predicates.clone());

        if view.is_restricted() && !tier.is_authenticated() && !self.config.public_years.is_empty()
        {
            let years: Vec<LookupValue> = self
                .config
                .public_years
                .iter()
                .map(|year| LookupValue::Int(i64::from(*year)))
                .collect();
            return query.filter([("year__in", LookupValue::List(years))]);
        }
        Ok(query)
    }

    async fn respond(
        &self,
        view: ViewKind,
        params: ViewParams,
        ctx: &RequestContext,
    ) -> Result<ViewResponse> {
        let limit = if view.is_paginated() {
            self.effective_limit(view, &params, ctx)
        } else {
            None
        };
        let query = self.build_query(view, &params, ctx.tier)?;
        let order = params
            .order_by
            .as_ref()
            .map(|order| (order.field.as_str(), order.direction))
            .or_else(|| view.default_order().map(|column| (column, OrderDirection::Asc)));
        let paged = pagination::paginate(&query, params.page, limit, order)?;
        debug!(%view, sql = %paged, output = params.output.as_str(), "view request");

        let mut result = ApiResult {
            authenticated: ctx.tier.is_authenticated(),
            url: ctx.url.clone(),
            page: params.page,
            limit,
            query: params.echo(limit),
            ..ApiResult::default()
        };

        match params.output {
            OutputFormat::Export => {
                let path = self.export(view, &paged, ctx.tier).await?;
                result.item_count = self.driver.count(&query).await?;
                result.export_url = Some(format!("{}{path}", ctx.base_url.trim_end_matches('/')));
                Ok(ViewResponse::Json(result))
            }
            OutputFormat::Csv => {
                let key = cache_key(CSV_TAG, view.name(), ctx.tier, &paged.to_sql());
                if let Some(CacheValue::Csv(body)) = self.cache.store().get(&key).await?.as_deref()
                {
                    debug!(%key, "csv cache hit");
                    return Ok(ViewResponse::Csv(body.clone()));
                }
                let page = self.page(view, &paged, order, params.page, limit, ctx.tier).await?;
                let body = output::to_csv(&page.results)?;
                self.cache.store().set(&key, CacheValue::Csv(body.clone())).await?;
                Ok(ViewResponse::Csv(body))
            }
            OutputFormat::Json => {
                let page = self.page(view, &paged, order, params.page, limit, ctx.tier).await?;
                if view.is_paginated() {
                    let links = pagination::links(&ctx.url, params.page, limit, page.total);
                    result.next_url = links.next_url;
                    result.prev_url = links.prev_url;
                }
                result.item_count = page.total;
                result.results = page.results;
                Ok(ViewResponse::Json(result))
            }
        }
    }

    /// The JSON page for `paged`, served from the page cache, a cached
    /// window or the backend.
    async fn page(
        &self,
        view: ViewKind,
        paged: &Query,
        order: Option<(&str, OrderDirection)>,
        page: u64,
        limit: Option<u64>,
        tier: AuthTier,
    ) -> Result<Page> {
        if !view.is_paginated() {
            return self.single(view, paged, tier).await;
        }
        let range = pagination::page_range(page, limit).map(|(start, end)| {
            (
                usize::try_from(start).unwrap_or(usize::MAX),
                usize::try_from(end).unwrap_or(usize::MAX),
            )
        });
        let request = WindowRequest {
            shape: view.name(),
            tier,
            query: paged,
            order,
            range,
        };
        self.cache.fetch(self.driver.as_ref(), &view, &request).await
    }

    /// Single-row views skip windowing; their page is cached directly.
    async fn single(&self, view: ViewKind, query: &Query, tier: AuthTier) -> Result<Page> {
        let key = cache_key(JSON_TAG, view.name(), tier, &query.to_sql());
        if let Some(CacheValue::Page(page)) = self.cache.store().get(&key).await?.as_deref() {
            debug!(%key, "page cache hit");
            return Ok(page.clone());
        }
        let rows = self.driver.query(query).await?;
        let results = view.finish(self.driver.as_ref(), rows).await?;
        let page = Page {
            total: results.len() as u64,
            results,
        };
        self.cache.store().set(&key, CacheValue::Page(page.clone())).await?;
        Ok(page)
    }

    /// Writes the CSV export for `query` unless it already exists and
    /// returns its public path.
    async fn export(&self, view: ViewKind, query: &Query, tier: AuthTier) -> Result<String> {
        let key = cache_key(EXPORT_TAG, view.name(), tier, &query.to_sql());
        let file_name = format!("{}-{key}.csv", view.name());
        let path = self.config.export_directory.join(&file_name);
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|err| ServiceError::Internal(err.into()))?;

        if !exists {
            let rows = self.driver.query(query).await?;
            let records = view.finish(self.driver.as_ref(), rows).await?;
            let body = output::to_csv(&records)?;
            output::write_export(&path, &body).await?;
            info!(file = %path.display(), rows = records.len(), "export written");
        }
        Ok(format!("{}/{file_name}", self.config.export_public_path))
    }
}
