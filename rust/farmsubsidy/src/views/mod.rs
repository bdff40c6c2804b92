//! Named query templates over the payments table.
//!
//! A view declares which columns it selects and groups by, which lookups it
//! accepts, how results may be ordered and how raw rows become typed records.
//! Templates never carry an ordering or a slice; the engine adds both.

mod aggregates;
mod payments;
mod recipients;

pub use recipients::merge_by_id;

use crate::{
    config::AppConfig,
    dialect::Dialect,
    driver::{Driver, ResultSet},
    error::{Result, ServiceError},
    fields,
    query::Query,
    window::Finish,
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    Payments,
    Recipients,
    RecipientsBase,
    RecipientNames,
    Schemes,
    Countries,
    Years,
    Locations,
    Aggregation,
}

/// Aggregates of the recipient views. Distinct recipients are not counted
/// per recipient.
const RECIPIENT_AGGREGATES: &[&str] = &[
    "total_payments",
    "amount_sum",
    "amount_avg",
    "amount_max",
    "amount_min",
];

const GROUP_AGGREGATES: &[&str] = &[
    "total_payments",
    "total_recipients",
    "amount_sum",
    "amount_avg",
    "amount_max",
    "amount_min",
];

impl ViewKind {
    pub fn name(&self) -> &'static str {
        match self {
            ViewKind::Payments => "payments",
            ViewKind::Recipients => "recipients",
            ViewKind::RecipientsBase => "recipients_base",
            ViewKind::RecipientNames => "recipient_names",
            ViewKind::Schemes => "schemes",
            ViewKind::Countries => "countries",
            ViewKind::Years => "years",
            ViewKind::Locations => "locations",
            ViewKind::Aggregation => "aggregation",
        }
    }

    /// Restricted views only show the public years to anonymous callers.
    pub fn is_restricted(&self) -> bool {
        matches!(
            self,
            ViewKind::Payments
                | ViewKind::Recipients
                | ViewKind::RecipientsBase
                | ViewKind::RecipientNames
                | ViewKind::Aggregation
        )
    }

    /// Aggregated columns the view selects, and so accepts HAVING lookups on.
    pub fn aggregated_fields(&self) -> &'static [&'static str] {
        match self {
            ViewKind::Recipients | ViewKind::RecipientsBase => RECIPIENT_AGGREGATES,
            ViewKind::Schemes | ViewKind::Countries | ViewKind::Years | ViewKind::Locations => {
                GROUP_AGGREGATES
            }
            ViewKind::Payments | ViewKind::RecipientNames | ViewKind::Aggregation => &[],
        }
    }

    pub fn is_paginated(&self) -> bool {
        !matches!(self, ViewKind::Aggregation)
    }

    pub fn max_limit(&self, config: &AppConfig) -> u64 {
        match self {
            ViewKind::RecipientNames => 10.min(config.max_limit),
            _ => config.max_limit,
        }
    }

    /// Output columns usable in `order_by`.
    pub fn orderable(&self) -> Vec<&'static str> {
        let key = match self {
            ViewKind::Payments => return fields::base_field_names().collect(),
            ViewKind::RecipientNames => return vec!["id", "name", "country"],
            ViewKind::Aggregation => return Vec::new(),
            ViewKind::Recipients | ViewKind::RecipientsBase => "id",
            ViewKind::Schemes => "scheme",
            ViewKind::Countries => "country",
            ViewKind::Years => "year",
            ViewKind::Locations => "location",
        };
        std::iter::once(key)
            .chain(self.aggregated_fields().iter().copied())
            .collect()
    }

    /// Column used when the caller does not ask for an ordering.
    pub fn default_order(&self) -> Option<&'static str> {
        match self {
            ViewKind::Payments | ViewKind::Aggregation => None,
            ViewKind::Recipients | ViewKind::RecipientsBase | ViewKind::RecipientNames => {
                Some("id")
            }
            ViewKind::Schemes => Some("scheme"),
            ViewKind::Countries => Some("country"),
            ViewKind::Years => Some("year"),
            ViewKind::Locations => Some("location"),
        }
    }

    /// Adds this view's fields and grouping to `base`.
    pub fn template(&self, base: &Query) -> Query {
        match self {
            ViewKind::Payments => payments::template(base),
            ViewKind::Recipients | ViewKind::RecipientsBase => recipients::numeric_template(base),
            ViewKind::RecipientNames => recipients::names_template(base),
            ViewKind::Schemes => aggregates::schemes_template(base),
            ViewKind::Countries => aggregates::countries_template(base),
            ViewKind::Years => aggregates::years_template(base),
            ViewKind::Locations => aggregates::locations_template(base),
            ViewKind::Aggregation => aggregates::aggregation_template(base),
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[async_trait]
impl Finish for ViewKind {
    async fn finish(&self, driver: &dyn Driver, rows: ResultSet) -> Result<Vec<Value>> {
        let records = rows.records();
        match self {
            ViewKind::Payments => typed::<crate::models::Payment>(records),
            ViewKind::Recipients => recipients::finish(driver, records).await,
            ViewKind::RecipientsBase => typed::<crate::models::RecipientBase>(records),
            ViewKind::RecipientNames => typed::<crate::models::RecipientName>(records),
            ViewKind::Schemes => typed::<crate::models::Scheme>(records),
            ViewKind::Countries => aggregates::finish_countries(records),
            ViewKind::Years => typed::<crate::models::Year>(records),
            ViewKind::Locations => typed::<crate::models::Location>(records),
            ViewKind::Aggregation => typed::<crate::models::Aggregation>(records),
        }
    }
}

/// Maps raw records through a model so the response shape is stable
/// across backends.
pub(crate) fn typed<T>(records: Vec<Map<String, Value>>) -> Result<Vec<Value>>
where
    T: DeserializeOwned + Serialize,
{
    records
        .into_iter()
        .map(|record| {
            let model: T = serde_json::from_value(Value::Object(record))
                .map_err(|err| ServiceError::backend(anyhow::anyhow!("unexpected row: {err}")))?;
            serde_json::to_value(model).map_err(|err| ServiceError::Internal(err.into()))
        })
        .collect()
}

fn amount_fields() -> [&'static str; 4] {
    [
        "sum(amount) as amount_sum",
        "avg(amount) as amount_avg",
        "max(amount) as amount_max",
        "min(amount) as amount_min",
    ]
}

fn distinct_as(dialect: Dialect, column: &str, alias: &str) -> String {
    format!("{} as {alias}", dialect.distinct_values(column))
}
