//! Recipient views.
//!
//! String aggregation over payments is much slower than the numeric one, so
//! the full recipient view runs in two phases: the numeric aggregate decides
//! which recipients make up the page, then the distinct names, addresses,
//! countries and urls are collected for exactly those ids.

use super::{amount_fields, distinct_as, typed};
use crate::{
    driver::Driver,
    error::Result,
    lookup::LookupValue,
    models::Recipient,
    query::Query,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

pub(super) fn numeric_template(base: &Query) -> Query {
    base.select(["recipient_id as id", "count(*) as total_payments"])
        .select(amount_fields())
        .group_by(["recipient_id"])
}

pub(super) fn names_template(base: &Query) -> Query {
    let dialect = base.dialect();
    base.select([
        "recipient_id as id".to_string(),
        format!("{} as name", dialect.any_value("recipient_name")),
        format!("{} as country", dialect.any_value("recipient_country")),
    ])
    .group_by(["recipient_id"])
}

fn strings_query(base: &Query, ids: Vec<LookupValue>) -> Result<Query> {
    let dialect = base.dialect();
    Query::new(base.table(), dialect)
        .select([
            "recipient_id as id".to_string(),
            distinct_as(dialect, "year", "years"),
            distinct_as(dialect, "recipient_name", "name"),
            distinct_as(dialect, "recipient_country", "country"),
            distinct_as(dialect, "recipient_address", "address"),
            distinct_as(dialect, "recipient_url", "url"),
        ])
        .filter([("recipient_id__in", LookupValue::List(ids))])
        .map(|query| query.group_by(["recipient_id"]))
}

/// Completes a page of numeric recipient rows with their string aggregates.
pub(super) async fn finish(
    driver: &dyn Driver,
    records: Vec<Map<String, Value>>,
) -> Result<Vec<Value>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<LookupValue> = records
        .iter()
        .filter_map(|record| record.get("id"))
        .filter_map(id_key)
        .map(LookupValue::Text)
        .collect();
    debug!(recipients = ids.len(), "collecting recipient strings");

    let query = strings_query(&driver.query_template(), ids)?;
    let strings = driver.query(&query).await?.records();
    typed::<Recipient>(merge_by_id(records, strings))
}

fn id_key(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Extends each primary record with the columns of the secondary record
/// sharing its `id`. Primary order is kept. This is a left join: a primary
/// row without a secondary match stays on the page with its numeric columns
/// only, so a page never shrinks below the rows its total counted.
pub fn merge_by_id(
    primary: Vec<Map<String, Value>>,
    secondary: Vec<Map<String, Value>>,
) -> Vec<Map<String, Value>> {
    let mut by_id: HashMap<String, Map<String, Value>> = secondary
        .into_iter()
        .filter_map(|record| {
            let id = record.get("id").and_then(id_key)?;
            Some((id, record))
        })
        .collect();

    primary
        .into_iter()
        .map(|mut record| {
            let extra = record
                .get("id")
                .and_then(id_key)
                .and_then(|id| by_id.remove(&id));
            if let Some(extra) = extra {
                for (column, value) in extra {
                    if column != "id" {
                        record.insert(column, value);
                    }
                }
            }
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn numeric_phase_has_no_string_aggregates() {
        let base = Query::new("farmsubsidy", Dialect::ClickHouse);
        assert_eq!(
            numeric_template(&base).to_sql(),
            "SELECT recipient_id as id, count(*) as total_payments, sum(amount) as amount_sum, \
             avg(amount) as amount_avg, max(amount) as amount_max, min(amount) as amount_min \
             FROM farmsubsidy GROUP BY recipient_id"
        );
    }

    #[test]
    fn string_phase_is_restricted_to_the_page_ids() {
        let base = Query::new("farmsubsidy", Dialect::DuckDb);
        let query = strings_query(
            &base,
            vec![LookupValue::Text("a".into()), LookupValue::Text("b".into())],
        )
        .unwrap();
        let sql = query.to_sql();
        assert!(sql.contains("list(DISTINCT recipient_name) as name"), "{sql}");
        assert!(
            sql.ends_with("WHERE recipient_id IN ('a', 'b') GROUP BY recipient_id"),
            "{sql}"
        );
        assert_eq!(query.limit(), None);
    }

    #[test]
    fn autocomplete_picks_any_name() {
        let base = Query::new("farmsubsidy", Dialect::DuckDb);
        assert_eq!(
            names_template(&base).to_sql(),
            "SELECT recipient_id as id, any_value(recipient_name) as name, \
             any_value(recipient_country) as country FROM farmsubsidy GROUP BY recipient_id"
        );
    }

    #[test]
    fn merge_keeps_primary_order() {
        let primary = vec![
            record(json!({"id": "b", "amount_sum": 20.0})),
            record(json!({"id": "a", "amount_sum": 10.0})),
            record(json!({"id": "c", "amount_sum": 5.0})),
        ];
        let secondary = vec![
            record(json!({"id": "a", "name": ["Farm A"]})),
            record(json!({"id": "b", "name": ["Farm B"]})),
        ];
        let merged = merge_by_id(primary, secondary);
        let ids: Vec<_> = merged.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("b"), json!("a"), json!("c")]);
        assert_eq!(merged[0]["name"], json!(["Farm B"]));
        assert_eq!(merged[0]["amount_sum"], json!(20.0));
        assert!(merged[2].get("name").is_none());
    }
}
