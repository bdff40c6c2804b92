//! Loads cleaned payment CSV files into the backend.

use crate::{
    driver::Driver,
    error::{ErrorCollector, RecordedError, ServiceError},
    models::Payment,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Record bad rows and failed chunks instead of stopping.
    pub ignore_errors: bool,
    pub chunk_size: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            ignore_errors: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub inserted: u64,
    pub errors: Vec<RecordedError>,
}

pub async fn import_files(
    driver: &dyn Driver,
    paths: &[PathBuf],
    options: ImportOptions,
) -> Result<ImportReport> {
    let mut collector = ErrorCollector::new();
    let mut inserted = 0;

    for path in paths {
        let rows = import_file(driver, path, options, &mut collector).await?;
        info!(file = %path.display(), rows, "imported file");
        inserted += rows;
    }

    if !collector.is_empty() {
        warn!(errors = collector.len(), "import finished with ignored errors");
    }
    Ok(ImportReport {
        inserted,
        errors: collector.errors().to_vec(),
    })
}

async fn import_file(
    driver: &dyn Driver,
    path: &Path,
    options: ImportOptions,
    collector: &mut ErrorCollector,
) -> Result<u64> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let chunk_size = options.chunk_size.max(1);
    let mut inserted = 0;
    let mut chunk: Vec<Payment> = Vec::with_capacity(chunk_size);

    for (index, row) in reader.deserialize::<Payment>().enumerate() {
        match row {
            Ok(payment) => chunk.push(payment),
            Err(err) => {
                // Line 1 is the header.
                let source = format!("{}:{}", path.display(), index + 2);
                handle(options, collector, source, err.into())?;
            }
        }
        if chunk.len() >= chunk_size {
            inserted += insert_chunk(driver, path, &chunk, options, collector).await?;
            chunk.clear();
        }
    }
    if !chunk.is_empty() {
        inserted += insert_chunk(driver, path, &chunk, options, collector).await?;
    }
    Ok(inserted)
}

async fn insert_chunk(
    driver: &dyn Driver,
    path: &Path,
    chunk: &[Payment],
    options: ImportOptions,
    collector: &mut ErrorCollector,
) -> Result<u64> {
    match driver.insert(chunk).await {
        Ok(rows) => Ok(rows),
        Err(err) => {
            handle(options, collector, path.display().to_string(), err)?;
            Ok(0)
        }
    }
}

fn handle(
    options: ImportOptions,
    collector: &mut ErrorCollector,
    source: String,
    err: ServiceError,
) -> Result<()> {
    if !options.ignore_errors {
        return Err(anyhow::Error::new(err).context(source));
    }
    warn!(%source, error = %err, "ignoring import error");
    collector.record(source, &err);
    Ok(())
}
