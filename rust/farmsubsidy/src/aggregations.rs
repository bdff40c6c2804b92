//! Dataset-wide aggregations printed by `db aggregations`.

use crate::{
    driver::Driver,
    error::{Result, ServiceError},
    lookup::Predicates,
    query::OrderDirection,
    views::ViewKind,
    window::Finish,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct Aggregations {
    pub by_country: Vec<Value>,
    pub by_year: Vec<Value>,
    pub amount_sum: Option<f64>,
}

/// Per-country totals. A country filter would leave a single row, so it is
/// dropped.
pub async fn by_country(driver: &dyn Driver, filters: &Predicates) -> Result<Vec<Value>> {
    grouped(driver, ViewKind::Countries, filters, "country").await
}

/// Per-year totals, ignoring any year filter.
pub async fn by_year(driver: &dyn Driver, filters: &Predicates) -> Result<Vec<Value>> {
    grouped(driver, ViewKind::Years, filters, "year").await
}

async fn grouped(
    driver: &dyn Driver,
    view: ViewKind,
    filters: &Predicates,
    column: &str,
) -> Result<Vec<Value>> {
    let query = view
        .template(&driver.query_template())
        .filter_with(filters.clone())
        .without_filter(column)
        .order_by([column], OrderDirection::Asc);
    let rows = driver.query(&query).await?;
    view.finish(driver, rows).await
}

pub async fn amount_sum(driver: &dyn Driver, filters: &Predicates) -> Result<Option<f64>> {
    let query = driver
        .query_template()
        .select(["sum(amount) as amount_sum"])
        .filter_with(filters.clone());
    let rows = driver.query(&query).await?;
    match rows.rows.first().and_then(|row| row.first()) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => Ok(number.as_f64()),
        Some(Value::String(text)) => text.parse().map(Some).map_err(|_| {
            ServiceError::backend(anyhow::anyhow!("sum returned a non-numeric value: {text}"))
        }),
        Some(other) => Err(ServiceError::backend(anyhow::anyhow!(
            "sum returned a non-numeric value: {other}"
        ))),
    }
}

pub async fn collect(driver: &dyn Driver, filters: &Predicates) -> Result<Aggregations> {
    Ok(Aggregations {
        by_country: by_country(driver, filters).await?,
        by_year: by_year(driver, filters).await?,
        amount_sum: amount_sum(driver, filters).await?,
    })
}
