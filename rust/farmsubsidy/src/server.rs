use crate::{
    auth,
    cache::{CacheStore, MemoryCache, NoCache},
    config::AppConfig,
    driver::{self, AccessMode, ConnectionRegistry, Driver},
    engine::{QueryEngine, RequestContext},
    search::SearchKind,
    state::AppState,
    views::ViewKind,
};
use anyhow::Context;
use axum::{
    extract::{Query as QueryPairs, State},
    http::{
        header::{AUTHORIZATION, HOST},
        HeaderMap, HeaderName, HeaderValue, Method, Uri,
    },
    routing::{get, MethodRouter},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

type Pairs = QueryPairs<Vec<(String, String)>>;

pub struct Server {
    config: Arc<AppConfig>,
    state: AppState,
}

impl Server {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let registry = ConnectionRegistry::new();
        let descriptor = config.driver_descriptor(AccessMode::ReadOnly);
        let driver = driver::connect(&registry, &descriptor).with_context(|| {
            format!(
                "failed to connect to {} at {}",
                descriptor.dialect, descriptor.target
            )
        })?;

        match driver.count(&driver.query_template()).await {
            Ok(rows) => {
                info!(dialect = %descriptor.dialect, table = %descriptor.table, rows, "backend reachable")
            }
            Err(err) => warn!(dialect = %descriptor.dialect, error = %err, "backend check failed"),
        }

        Ok(Self::with_driver(config, driver))
    }

    /// Builds the server around an existing driver.
    pub fn with_driver(config: AppConfig, driver: Arc<dyn Driver>) -> Self {
        let config = Arc::new(config);
        let store: Arc<dyn CacheStore> = if config.cache_enabled {
            Arc::new(MemoryCache::new(config.cache_capacity))
        } else {
            Arc::new(NoCache)
        };
        let engine = QueryEngine::new(driver, store, Arc::clone(&config));
        let state = AppState::new(Arc::clone(&config), engine);
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/healthz", get(Self::health))
            .route("/authenticated", get(Self::authenticated))
            .route("/payments", view_route(ViewKind::Payments))
            .route("/recipients", view_route(ViewKind::Recipients))
            .route("/recipients/base", view_route(ViewKind::RecipientsBase))
            .route("/recipients/autocomplete", view_route(ViewKind::RecipientNames))
            .route("/recipients/search", search_route(SearchKind::Recipients))
            .route("/schemes", view_route(ViewKind::Schemes))
            .route("/schemes/search", search_route(SearchKind::Schemes))
            .route("/countries", view_route(ViewKind::Countries))
            .route("/years", view_route(ViewKind::Years))
            .route("/locations", view_route(ViewKind::Locations))
            .route("/agg", view_route(ViewKind::Aggregation))
            .with_state(self.state.clone());

        if self.config.serve_exports && !self.config.export_public_path.is_empty() {
            router = router.nest_service(
                &self.config.export_public_path,
                ServeDir::new(&self.config.export_directory),
            );
        }

        router
            .layer(TimeoutLayer::new(self.config.request_timeout))
            .layer(cors_layer(&self.config))
            .layer(TraceLayer::new_for_http())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!(%addr, dialect = %self.config.dialect, "farmsubsidy api listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    async fn health() -> Json<serde_json::Value> {
        Json(json!({ "status": "ok" }))
    }

    async fn authenticated(
        State(state): State<AppState>,
        headers: HeaderMap,
    ) -> Json<serde_json::Value> {
        let tier = auth::resolve_tier(&headers, &state.config);
        Json(json!({ "status": tier.is_authenticated() }))
    }
}

fn view_route(view: ViewKind) -> MethodRouter<AppState> {
    get(
        move |State(state): State<AppState>,
              uri: Uri,
              headers: HeaderMap,
              QueryPairs(pairs): Pairs| async move {
            let ctx = request_context(&state.config, &uri, headers);
            state.engine.execute_view(view, &pairs, &ctx).await
        },
    )
}

fn search_route(kind: SearchKind) -> MethodRouter<AppState> {
    get(
        move |State(state): State<AppState>,
              uri: Uri,
              headers: HeaderMap,
              QueryPairs(pairs): Pairs| async move {
            let ctx = request_context(&state.config, &uri, headers);
            state.engine.search(kind, &pairs, &ctx).await
        },
    )
}

/// Absolute request url from the `Host` header; page and export links are
/// built from it.
fn request_context(config: &AppConfig, uri: &Uri, headers: HeaderMap) -> RequestContext {
    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    let base_url = format!("{scheme}://{host}");
    let path = uri
        .path_and_query()
        .map(|path| path.as_str())
        .unwrap_or("/");

    RequestContext {
        url: format!("{base_url}{path}"),
        base_url,
        tier: auth::resolve_tier(&headers, config),
        headers,
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origin = match &config.allowed_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(%origin, "ignoring invalid cors origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(origins)
        }
        None => AllowOrigin::from(Any),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, HeaderName::from_static("x-api-key")])
}
