//! Response payloads: the JSON envelope, CSV rendering and export files.

use crate::error::{Result, ServiceError};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResult {
    pub authenticated: bool,
    pub url: String,
    pub page: u64,
    pub limit: Option<u64>,
    pub item_count: u64,
    pub export_url: Option<String>,
    pub query: Map<String, Value>,
    pub next_url: Option<String>,
    pub prev_url: Option<String>,
    pub error: Option<String>,
    pub results: Vec<Value>,
}

/// Renders records as CSV. Columns come from the record keys in first-seen
/// order, list values are sorted and joined with `;`, nulls are empty.
pub fn to_csv(records: &[Value]) -> Result<String> {
    let mut columns: Vec<&str> = Vec::new();
    for record in records {
        if let Value::Object(map) = record {
            for key in map.keys() {
                if !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    if !columns.is_empty() {
        writer.write_record(&columns).map_err(csv_error)?;
    }
    for record in records {
        let row: Vec<String> = columns
            .iter()
            .map(|column| record.get(*column).map(cell).unwrap_or_default())
            .collect();
        writer.write_record(&row).map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| ServiceError::Internal(anyhow::anyhow!("csv flush failed: {err}")))?;
    String::from_utf8(bytes).map_err(|err| ServiceError::Internal(err.into()))
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => {
            let mut items: Vec<String> = items
                .iter()
                .filter(|item| !item.is_null())
                .map(cell)
                .collect();
            items.sort();
            items.join(";")
        }
        other => other.to_string(),
    }
}

fn csv_error(err: csv::Error) -> ServiceError {
    ServiceError::Internal(anyhow::Error::new(err).context("failed to write csv"))
}

/// Writes an export file through a temporary sibling so readers never see
/// a partial file.
pub async fn write_export(path: &Path, contents: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create export directory {}", dir.display()))?;
    }
    let partial = path.with_extension("csv.partial");
    tokio::fs::write(&partial, contents)
        .await
        .with_context(|| format!("failed to write {}", partial.display()))?;
    tokio::fs::rename(&partial, path)
        .await
        .with_context(|| format!("failed to move export into {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn csv_flattens_lists_and_nulls() {
        let records = vec![
            json!({"country": "LU", "years": [2019, 2017], "amount_sum": 10.5, "name": null}),
            json!({"country": "CZ", "years": [2015], "amount_sum": 3, "name": "Czechia"}),
        ];
        assert_eq!(
            to_csv(&records).unwrap(),
            "country,years,amount_sum,name\nLU,2017;2019,10.5,\nCZ,2015,3,Czechia\n"
        );
    }

    #[test]
    fn csv_quotes_separators() {
        let records = vec![json!({"name": "Farm, Inc.", "id": "a"})];
        assert_eq!(to_csv(&records).unwrap(), "name,id\n\"Farm, Inc.\",a\n");
    }

    #[test]
    fn empty_results_render_nothing() {
        assert_eq!(to_csv(&[]).unwrap(), "");
    }

    #[test]
    fn envelope_serialises_every_field() {
        let value = serde_json::to_value(ApiResult {
            url: "http://api.test/years".into(),
            page: 1,
            ..ApiResult::default()
        })
        .unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                "authenticated",
                "url",
                "page",
                "limit",
                "item_count",
                "export_url",
                "query",
                "next_url",
                "prev_url",
                "error",
                "results"
            ]
        );
    }

    #[tokio::test]
    async fn exports_land_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("abc.csv");
        write_export(&path, "a,b\n1,2\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n1,2\n");
        assert!(!path.with_extension("csv.partial").exists());
    }
}
