use axum::{
    body::{self, Body},
    http::{header::HOST, Request, StatusCode},
    response::Response,
    Router,
};
use farmsubsidy::{
    config::AppConfig,
    dialect::Dialect,
    driver::{self, AccessMode, ConnectionRegistry, Driver, DriverDescriptor},
    import::{self, ImportOptions},
    server::Server,
};
use serde_json::Value;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Once},
};
use tempfile::TempDir;
use tower::ServiceExt;

pub const API_KEY: &str = "test-api-key";
pub const TOKEN: &str = "test-token";
pub const AUTHENTICATED: (&str, &str) = ("authorization", "Bearer test-token");
pub const HOST_NAME: &str = "api.test";
pub const FIXTURES: &[&str] = &["cz_2015.csv", "lu_2019.csv"];

static TRACING_INIT: Once = Once::new();

/// An API router over an in-memory DuckDB seeded from the CSV fixtures.
pub struct TestHarness {
    router: Router,
    driver: Arc<dyn Driver>,
    exports: TempDir,
}

pub async fn harness() -> TestHarness {
    harness_with(|_| {}).await
}

pub async fn harness_with<F>(configure: F) -> TestHarness
where
    F: FnOnce(&mut AppConfig),
{
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });

    let exports = tempfile::tempdir().expect("failed to create export directory");
    let mut config = test_config(exports.path());
    configure(&mut config);

    let driver = seeded_driver().await;
    let router = Server::with_driver(config, Arc::clone(&driver)).router();

    TestHarness {
        router,
        driver,
        exports,
    }
}

pub fn test_config(export_directory: &Path) -> AppConfig {
    AppConfig {
        dialect: Dialect::DuckDb,
        database_uri: ":memory:".into(),
        api_key: Some(API_KEY.into()),
        api_tokens: vec![TOKEN.into()],
        export_directory: export_directory.to_path_buf(),
        ..AppConfig::default()
    }
}

pub fn fixture_paths() -> Vec<PathBuf> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    FIXTURES.iter().map(|name| dir.join(name)).collect()
}

/// A fresh in-memory database holding every fixture payment.
pub async fn seeded_driver() -> Arc<dyn Driver> {
    let descriptor = DriverDescriptor {
        dialect: Dialect::DuckDb,
        target: ":memory:".into(),
        table: "farmsubsidy".into(),
        mode: AccessMode::ReadWrite,
    };
    let driver = driver::connect(&ConnectionRegistry::new(), &descriptor)
        .expect("failed to open in-memory duckdb");
    driver.init(false).await.expect("failed to create schema");
    let report = import::import_files(driver.as_ref(), &fixture_paths(), ImportOptions::default())
        .await
        .expect("failed to import fixtures");
    assert_eq!(report.inserted, 6, "fixtures should hold six payments");
    driver
}

impl TestHarness {
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn export_dir(&self) -> &Path {
        self.exports.path()
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.get_with(uri, &[]).await
    }

    pub async fn get_with(&self, uri: &str, headers: &[(&str, &str)]) -> Response {
        let mut request = Request::builder().uri(uri).header(HOST, HOST_NAME);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let request = request
            .body(Body::empty())
            .expect("failed to build request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        read_json(self.get(uri).await).await
    }

    pub async fn get_json_with(&self, uri: &str, headers: &[(&str, &str)]) -> (StatusCode, Value) {
        read_json(self.get_with(uri, headers).await).await
    }
}

pub async fn read_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

pub async fn read_text(response: Response) -> (StatusCode, Option<String>, String) {
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    let text = String::from_utf8(bytes.to_vec()).expect("body should be utf-8");
    (status, content_type, text)
}

/// The `results` array of a view response.
pub fn results(body: &Value) -> &Vec<Value> {
    body["results"]
        .as_array()
        .unwrap_or_else(|| panic!("results should be an array, got {body}"))
}

/// Values of `field` across `results`, in order.
pub fn column<'a>(body: &'a Value, field: &str) -> Vec<&'a Value> {
    results(body).iter().map(|row| &row[field]).collect()
}
