use crate::{
    dialect::Dialect,
    driver::{AccessMode, DriverDescriptor},
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    net::{SocketAddr, ToSocketAddrs},
    path::PathBuf,
    time::Duration,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub dialect: Dialect,
    pub database_uri: String,
    pub database_table: String,
    pub api_key: Option<String>,
    pub api_tokens: Vec<String>,
    pub allowed_origins: Option<Vec<String>>,
    pub max_limit: u64,
    pub export_limit: u64,
    pub public_years: Vec<i32>,
    pub cache_enabled: bool,
    pub cache_capacity: u64,
    pub window_threshold: u64,
    pub export_directory: PathBuf,
    pub export_public_path: String,
    pub serve_exports: bool,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    listen_addr: Option<String>,
    #[serde(default)]
    listen_host: Option<String>,
    #[serde(default)]
    listen_port: Option<u16>,
    #[serde(default = "default_driver")]
    driver: String,
    #[serde(default)]
    database_uri: Option<String>,
    #[serde(default = "default_table")]
    database_table: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    api_tokens: Option<String>,
    #[serde(default)]
    allowed_origins: Option<String>,
    #[serde(default = "default_max_limit")]
    max_limit: u64,
    #[serde(default = "default_export_limit")]
    export_limit: u64,
    #[serde(default)]
    public_years: Option<String>,
    #[serde(default = "default_true")]
    cache_enabled: bool,
    #[serde(default = "default_cache_capacity")]
    cache_capacity: u64,
    #[serde(default = "default_window_threshold")]
    window_threshold: u64,
    #[serde(default = "default_export_directory")]
    export_directory: String,
    #[serde(default = "default_export_public_path")]
    export_public_path: String,
    #[serde(default)]
    serve_exports: bool,
    #[serde(default = "default_timeout_secs")]
    request_timeout_secs: u64,
}

fn default_driver() -> String {
    "clickhouse".to_string()
}

fn default_table() -> String {
    "farmsubsidy".to_string()
}

fn default_export_directory() -> String {
    "./exports".to_string()
}

fn default_export_public_path() -> String {
    "/exports".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_max_limit() -> u64 {
    1000
}

const fn default_export_limit() -> u64 {
    100_000
}

const fn default_cache_capacity() -> u64 {
    10_000
}

const fn default_window_threshold() -> u64 {
    100_000
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_uri(dialect: Dialect) -> String {
    match dialect {
        Dialect::ClickHouse => "localhost".to_string(),
        Dialect::DuckDb => "./data/farmsubsidy.duckdb".to_string(),
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            dialect: Dialect::ClickHouse,
            database_uri: default_uri(Dialect::ClickHouse),
            database_table: default_table(),
            api_key: None,
            api_tokens: Vec::new(),
            allowed_origins: None,
            max_limit: default_max_limit(),
            export_limit: default_export_limit(),
            public_years: Vec::new(),
            cache_enabled: true,
            cache_capacity: default_cache_capacity(),
            window_threshold: default_window_threshold(),
            export_directory: PathBuf::from(default_export_directory()),
            export_public_path: default_export_public_path(),
            serve_exports: false,
            request_timeout: Duration::from_secs(default_timeout_secs()),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig = envy::prefixed("FARMSUBSIDY_")
            .from_env()
            .context("failed to parse FARMSUBSIDY_* environment variables")?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let listen_addr = resolve_addr(raw.listen_addr, raw.listen_host, raw.listen_port)?;
        let dialect: Dialect = raw.driver.parse()?;
        let database_uri = raw.database_uri.unwrap_or_else(|| default_uri(dialect));

        let public_years = split_csv(raw.public_years)
            .unwrap_or_default()
            .iter()
            .map(|year| {
                year.parse::<i32>()
                    .with_context(|| format!("invalid FARMSUBSIDY_PUBLIC_YEARS entry `{year}`"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            listen_addr,
            dialect,
            database_uri,
            database_table: raw.database_table,
            api_key: raw.api_key.filter(|key| !key.is_empty()),
            api_tokens: split_csv(raw.api_tokens).unwrap_or_default(),
            allowed_origins: split_csv(raw.allowed_origins),
            max_limit: raw.max_limit.max(1),
            export_limit: raw.export_limit.max(1),
            public_years,
            cache_enabled: raw.cache_enabled,
            cache_capacity: raw.cache_capacity.max(1),
            window_threshold: raw.window_threshold,
            export_directory: PathBuf::from(raw.export_directory),
            export_public_path: raw.export_public_path.trim_end_matches('/').to_string(),
            serve_exports: raw.serve_exports,
            request_timeout: Duration::from_secs(raw.request_timeout_secs.max(1)),
        })
    }

    /// Applies command-line backend overrides. Switching the driver without
    /// a uri also switches a default uri to the new driver's default.
    pub fn override_backend(
        &mut self,
        driver: Option<&str>,
        uri: Option<String>,
        table: Option<String>,
    ) -> Result<()> {
        if let Some(driver) = driver {
            let dialect: Dialect = driver.parse()?;
            if uri.is_none() && self.database_uri == default_uri(self.dialect) {
                self.database_uri = default_uri(dialect);
            }
            self.dialect = dialect;
        }
        if let Some(uri) = uri {
            self.database_uri = uri;
        }
        if let Some(table) = table {
            self.database_table = table;
        }
        Ok(())
    }

    pub fn driver_descriptor(&self, mode: AccessMode) -> DriverDescriptor {
        DriverDescriptor {
            dialect: self.dialect,
            target: self.database_uri.clone(),
            table: self.database_table.clone(),
            mode,
        }
    }
}

fn split_csv(value: Option<String>) -> Option<Vec<String>> {
    value.and_then(|csv| {
        let entries: Vec<_> = csv
            .split(',')
            .filter_map(|part| {
                let entry = part.trim();
                if entry.is_empty() {
                    None
                } else {
                    Some(entry.to_string())
                }
            })
            .collect();
        if entries.is_empty() {
            None
        } else {
            Some(entries)
        }
    })
}

fn resolve_addr(
    addr: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .to_socket_addrs()
            .context("invalid FARMSUBSIDY_LISTEN_ADDR value")?
            .next()
            .context("FARMSUBSIDY_LISTEN_ADDR resolved to no addresses");
    }

    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(8000);
    let combined = format!("{}:{}", host, port);
    combined
        .to_socket_addrs()
        .context("invalid listen host/port combination")?
        .next()
        .context("listen address resolved to no targets")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let raw: RawConfig = envy::from_iter(
            vars.iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        )?;
        AppConfig::from_raw(raw)
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.dialect, Dialect::ClickHouse);
        assert_eq!(config.database_uri, "localhost");
        assert_eq!(config.database_table, "farmsubsidy");
        assert_eq!(config.max_limit, 1000);
        assert_eq!(config.window_threshold, 100_000);
        assert_eq!(config.listen_addr.port(), 8000);
        assert!(config.cache_enabled);
        assert!(config.public_years.is_empty());
    }

    #[test]
    fn parses_lists_and_driver_specific_defaults() {
        let config = parse(&[
            ("DRIVER", "duckdb"),
            ("PUBLIC_YEARS", "2020, 2021,"),
            ("API_TOKENS", "a,b"),
            ("WINDOW_THRESHOLD", "50"),
            ("EXPORT_PUBLIC_PATH", "/files/"),
        ])
        .unwrap();
        assert_eq!(config.dialect, Dialect::DuckDb);
        assert_eq!(config.database_uri, "./data/farmsubsidy.duckdb");
        assert_eq!(config.public_years, vec![2020, 2021]);
        assert_eq!(config.api_tokens, vec!["a", "b"]);
        assert_eq!(config.window_threshold, 50);
        assert_eq!(config.export_public_path, "/files");
    }

    #[test]
    fn rejects_unknown_drivers_and_bad_years() {
        assert!(parse(&[("DRIVER", "postgres")]).is_err());
        assert!(parse(&[("PUBLIC_YEARS", "twenty")]).is_err());
    }

    #[test]
    fn cli_overrides_switch_default_uri() {
        let mut config = AppConfig::default();
        config.override_backend(Some("duckdb"), None, None).unwrap();
        assert_eq!(config.dialect, Dialect::DuckDb);
        assert_eq!(config.database_uri, "./data/farmsubsidy.duckdb");

        config
            .override_backend(None, Some(":memory:".into()), Some("payments".into()))
            .unwrap();
        assert_eq!(config.database_uri, ":memory:");
        assert_eq!(config.database_table, "payments");

        config.override_backend(Some("clickhouse"), None, None).unwrap();
        assert_eq!(config.database_uri, ":memory:");
        assert!(config.override_backend(Some("sqlite"), None, None).is_err());
    }
}
