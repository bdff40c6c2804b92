use super::{amount_fields, distinct_as, typed};
use crate::{error::Result, models::Country, query::Query, schema};
use serde_json::{Map, Value};

fn totals() -> [&'static str; 2] {
    [
        "count(*) as total_payments",
        "count(DISTINCT recipient_id) as total_recipients",
    ]
}

pub(super) fn schemes_template(base: &Query) -> Query {
    let dialect = base.dialect();
    base.select([
        "scheme".to_string(),
        distinct_as(dialect, "year", "years"),
        distinct_as(dialect, "country", "countries"),
    ])
    .select(totals())
    .select(amount_fields())
    .group_by(["scheme"])
}

pub(super) fn countries_template(base: &Query) -> Query {
    base.select([
        "country".to_string(),
        distinct_as(base.dialect(), "year", "years"),
    ])
    .select(totals())
    .select(amount_fields())
    .group_by(["country"])
}

pub(super) fn years_template(base: &Query) -> Query {
    base.select([
        "year".to_string(),
        distinct_as(base.dialect(), "country", "countries"),
    ])
    .select(totals())
    .select(amount_fields())
    .group_by(["year"])
}

pub(super) fn locations_template(base: &Query) -> Query {
    let dialect = base.dialect();
    base.select([
        "recipient_address as location".to_string(),
        distinct_as(dialect, "year", "years"),
        distinct_as(dialect, "country", "countries"),
    ])
    .select(totals())
    .select(amount_fields())
    .group_by(["recipient_address"])
}

/// One row of totals over everything matching the filters.
pub(super) fn aggregation_template(base: &Query) -> Query {
    base.select(totals()).select(amount_fields())
}

/// Countries carry their display name next to the code.
pub(super) fn finish_countries(records: Vec<Map<String, Value>>) -> Result<Vec<Value>> {
    let named = records
        .into_iter()
        .map(|mut record| {
            let name = record
                .get("country")
                .and_then(Value::as_str)
                .and_then(schema::country_name)
                .map(|name| Value::String(name.to_string()))
                .unwrap_or(Value::Null);
            record.insert("name".into(), name);
            record
        })
        .collect();
    typed::<Country>(named)
}
