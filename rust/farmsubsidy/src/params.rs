//! Query-string parameters of the view endpoints.

use crate::{
    error::{Result, ServiceError},
    fields::{self, FieldKind, FieldScope},
    lookup::{Lookup, LookupValue, Operator, Predicate, Predicates},
    query::OrderDirection,
    search::fingerprint_pattern,
    views::ViewKind,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::str::FromStr;

const FINGERPRINT_FIELD: &str = "recipient_fingerprint";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
    Export,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Export => "export",
        }
    }

    /// CSV and export requests of authenticated users get the export cap.
    pub fn is_file(&self) -> bool {
        matches!(self, OutputFormat::Csv | OutputFormat::Export)
    }
}

impl FromStr for OutputFormat {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "export" => Ok(OutputFormat::Export),
            other => Err(ServiceError::InvalidRequest(format!(
                "output must be one of json, csv, export (got `{other}`)"
            ))),
        }
    }
}

/// `field` sorts ascending, `-field` descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn parse(token: &str) -> Self {
        match token.strip_prefix('-') {
            Some(field) => Self {
                field: field.to_string(),
                direction: OrderDirection::Desc,
            },
            None => Self {
                field: token.to_string(),
                direction: OrderDirection::Asc,
            },
        }
    }

    pub fn token(&self) -> String {
        match self.direction {
            OrderDirection::Asc => self.field.clone(),
            OrderDirection::Desc => format!("-{}", self.field),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewParams {
    pub page: u64,
    pub limit: Option<u64>,
    pub order_by: Option<OrderBy>,
    pub output: OutputFormat,
    pub api_key: Option<String>,
    pub where_predicates: Predicates,
    pub having_predicates: Predicates,
    lookups: Vec<(String, String)>,
}

impl Default for ViewParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: None,
            order_by: None,
            output: OutputFormat::Json,
            api_key: None,
            where_predicates: Predicates::default(),
            having_predicates: Predicates::default(),
            lookups: Vec::new(),
        }
    }
}

impl ViewParams {
    /// Validates raw query-string pairs against `view`. Unknown keys,
    /// disallowed operators and malformed values are rejected; empty values
    /// are ignored.
    pub fn parse(pairs: &[(String, String)], view: ViewKind) -> Result<Self> {
        let mut params = ViewParams::default();

        for (key, raw) in pairs {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match key.as_str() {
                "p" => params.page = parse_positive("Page", raw)?,
                "limit" => params.limit = Some(parse_positive("Limit", raw)?),
                "output" => params.output = raw.parse()?,
                "api_key" => params.api_key = Some(raw.to_string()),
                "order_by" => {
                    let order = OrderBy::parse(raw);
                    if !view.orderable().contains(&order.field.as_str()) {
                        return Err(ServiceError::InvalidRequest(format!(
                            "cannot order {view} by `{}`",
                            order.field
                        )));
                    }
                    params.order_by = Some(order);
                }
                _ => params.add_lookup(key, raw, view)?,
            }
        }

        Ok(params)
    }

    fn add_lookup(&mut self, key: &str, raw: &str, view: ViewKind) -> Result<()> {
        let unknown = || ServiceError::InvalidRequest(format!("unknown parameter `{key}`"));
        let lookup = Lookup::parse(key).map_err(|_| unknown())?;
        let spec = fields::field(&lookup.field).ok_or_else(unknown)?;
        let exposed = view.aggregated_fields().contains(&spec.name);
        if spec.scope == FieldScope::Aggregated && !exposed {
            return Err(unknown());
        }
        if !spec.kind.allows(lookup.op) {
            return Err(ServiceError::InvalidRequest(format!(
                "operator `{}` is not allowed for `{}`",
                lookup.op.suffix().unwrap_or("eq"),
                lookup.field
            )));
        }

        let rewrite = |value: &str| {
            if lookup.field == FINGERPRINT_FIELD {
                fingerprint_pattern(value)
            } else {
                value.to_string()
            }
        };
        let (value, echo) = match lookup.op {
            Operator::Null => (LookupValue::Text(raw.to_string()), raw.to_string()),
            Operator::In => {
                let items: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| rewrite(item))
                    .collect();
                let values = items
                    .iter()
                    .map(|item| scalar(key, spec.kind, item))
                    .collect::<Result<Vec<_>>>()?;
                (LookupValue::List(values), items.join(","))
            }
            _ => {
                let value = rewrite(raw);
                (scalar(key, spec.kind, &value)?, value)
            }
        };

        let predicate = Predicate::new(lookup, value)?;
        match spec.scope {
            FieldScope::Base => self.where_predicates.insert(predicate),
            FieldScope::Aggregated => self.having_predicates.insert(predicate),
        }
        self.lookups.retain(|(existing, _)| existing != key);
        self.lookups.push((key.to_string(), echo));
        Ok(())
    }

    /// Adds an exact-match lookup, as search endpoints do.
    pub fn with_filter(mut self, field: &str, value: String) -> Result<Self> {
        let predicate = Predicate::new(Lookup::parse(field)?, LookupValue::Text(value.clone()))?;
        self.where_predicates.insert(predicate);
        self.lookups.retain(|(existing, _)| existing != field);
        self.lookups.push((field.to_string(), value));
        Ok(self)
    }

    /// The accepted parameters as echoed back in responses. The api key is
    /// never echoed.
    pub fn echo(&self, limit: Option<u64>) -> Map<String, Value> {
        let mut query = Map::new();
        for (key, value) in &self.lookups {
            query.insert(key.clone(), Value::String(value.clone()));
        }
        if let Some(order) = &self.order_by {
            query.insert("order_by".into(), Value::String(order.token()));
        }
        if let Some(limit) = limit {
            query.insert("limit".into(), Value::from(limit));
        }
        query.insert("p".into(), Value::from(self.page));
        query.insert("output".into(), Value::String(self.output.as_str().into()));
        query
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<u64> {
    match raw.parse::<u64>() {
        Ok(value) if value >= 1 => Ok(value),
        _ => Err(ServiceError::InvalidRequest(format!(
            "{name} must be 1 or higher (got `{raw}`)"
        ))),
    }
}

fn scalar(key: &str, kind: FieldKind, raw: &str) -> Result<LookupValue> {
    match kind {
        FieldKind::Numeric => raw
            .parse::<i64>()
            .map(LookupValue::Int)
            .or_else(|_| raw.parse::<f64>().map(LookupValue::Float))
            .map_err(|_| {
                ServiceError::InvalidRequest(format!("`{key}` expects a number (got `{raw}`)"))
            }),
        FieldKind::Text | FieldKind::Key => Ok(LookupValue::Text(raw.to_string())),
    }
}
