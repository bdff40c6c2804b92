//! Lookup keys (`field` or `field__operator`) and their SQL predicates.

use crate::{
    dialect::Dialect,
    error::{Result, ServiceError},
};
use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: &str = "__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Like,
    Ilike,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Null,
}

impl Operator {
    pub fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "like" => Operator::Like,
            "ilike" => Operator::Ilike,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "in" => Operator::In,
            "null" => Operator::Null,
            _ => return None,
        })
    }

    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            Operator::Eq => None,
            Operator::Like => Some("like"),
            Operator::Ilike => Some("ilike"),
            Operator::Gt => Some("gt"),
            Operator::Gte => Some("gte"),
            Operator::Lt => Some("lt"),
            Operator::Lte => Some("lte"),
            Operator::In => Some("in"),
            Operator::Null => Some("null"),
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Like => "LIKE",
            Operator::Ilike => "ILIKE",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::In => "IN",
            Operator::Null => "IS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lookup {
    pub field: String,
    pub op: Operator,
}

impl Lookup {
    pub fn parse(key: &str) -> Result<Self> {
        let mut parts = key.split(SEPARATOR);
        let field = parts.next().unwrap_or_default();
        if field.is_empty() {
            return Err(ServiceError::InvalidQuery(format!(
                "Invalid lookup `{key}`: missing field name"
            )));
        }

        let op = match (parts.next(), parts.next()) {
            (None, _) => Operator::Eq,
            (Some(token), None) => Operator::parse(token).ok_or_else(|| {
                ServiceError::InvalidQuery(format!("Invalid operator `{token}` in `{key}`"))
            })?,
            (Some(_), Some(_)) => {
                return Err(ServiceError::InvalidQuery(format!(
                    "Invalid operator in `{key}`: only one operator suffix is allowed"
                )))
            }
        };

        Ok(Self {
            field: field.to_string(),
            op,
        })
    }

    pub fn key(&self) -> String {
        match self.op.suffix() {
            Some(suffix) => format!("{}{SEPARATOR}{suffix}", self.field),
            None => self.field.clone(),
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// A value bound to a lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LookupValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<LookupValue>),
}

impl LookupValue {
    fn as_literal(&self) -> Result<String> {
        match self {
            LookupValue::Bool(value) => Ok(value.to_string()),
            LookupValue::Int(value) => Ok(value.to_string()),
            LookupValue::Float(value) => Ok(value.to_string()),
            LookupValue::Text(value) => Ok(value.clone()),
            LookupValue::List(_) => Err(ServiceError::InvalidQuery(
                "a list value is only allowed for the `in` operator".into(),
            )),
        }
    }

    fn as_flag(&self) -> Result<bool> {
        match self {
            LookupValue::Bool(value) => Ok(*value),
            LookupValue::Int(value) => Ok(*value != 0),
            LookupValue::Text(value) => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                other => Err(ServiceError::InvalidQuery(format!(
                    "`{other}` is not a boolean"
                ))),
            },
            other => Err(ServiceError::InvalidQuery(format!(
                "`{other:?}` is not a boolean"
            ))),
        }
    }
}

impl From<bool> for LookupValue {
    fn from(value: bool) -> Self {
        LookupValue::Bool(value)
    }
}

impl From<i64> for LookupValue {
    fn from(value: i64) -> Self {
        LookupValue::Int(value)
    }
}

impl From<i32> for LookupValue {
    fn from(value: i32) -> Self {
        LookupValue::Int(value.into())
    }
}

impl From<f64> for LookupValue {
    fn from(value: f64) -> Self {
        LookupValue::Float(value)
    }
}

impl From<&str> for LookupValue {
    fn from(value: &str) -> Self {
        LookupValue::Text(value.to_string())
    }
}

impl From<String> for LookupValue {
    fn from(value: String) -> Self {
        LookupValue::Text(value)
    }
}

impl<T: Into<LookupValue>> From<Vec<T>> for LookupValue {
    fn from(values: Vec<T>) -> Self {
        LookupValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// A validated lookup with its value, ready to be rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub lookup: Lookup,
    pub value: LookupValue,
}

impl Predicate {
    /// Validates the value against the operator so that rendering cannot fail.
    pub fn new(lookup: Lookup, value: LookupValue) -> Result<Self> {
        match (&lookup.op, &value) {
            (Operator::In, LookupValue::List(values)) => {
                if values.is_empty() {
                    return Err(ServiceError::InvalidQuery(format!(
                        "`{lookup}` needs at least one value"
                    )));
                }
                for item in values {
                    item.as_literal()?;
                }
            }
            (Operator::In, other) => {
                return Err(ServiceError::InvalidQuery(format!(
                    "`{lookup}` needs a list of values, got `{other:?}`"
                )))
            }
            (Operator::Null, value) => {
                value.as_flag()?;
            }
            (_, value) => {
                value.as_literal()?;
            }
        }
        Ok(Self { lookup, value })
    }

    pub fn render(&self, dialect: Dialect) -> String {
        let field = &self.lookup.field;
        match (&self.lookup.op, &self.value) {
            (Operator::In, LookupValue::List(values)) => {
                let rendered = values
                    .iter()
                    .filter_map(|value| value.as_literal().ok())
                    .map(|value| dialect.quote(&value))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{field} IN ({rendered})")
            }
            (Operator::Null, value) => {
                if value.as_flag().unwrap_or(true) {
                    format!("{field} IS NULL")
                } else {
                    format!("{field} IS NOT NULL")
                }
            }
            (op, value) => {
                let literal = value.as_literal().unwrap_or_default();
                format!("{field} {} {}", op.sql(), dialect.quote(&literal))
            }
        }
    }
}

/// An ordered predicate map. Setting an existing key replaces its value in
/// place, new keys are appended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predicates(Vec<Predicate>);

impl Predicates {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Predicate> {
        self.0.iter()
    }

    pub fn get(&self, key: &str) -> Option<&Predicate> {
        self.0.iter().find(|predicate| predicate.lookup.key() == key)
    }

    pub fn insert(&mut self, predicate: Predicate) {
        let key = predicate.lookup.key();
        match self.0.iter_mut().find(|existing| existing.lookup.key() == key) {
            Some(existing) => *existing = predicate,
            None => self.0.push(predicate),
        }
    }

    pub fn remove_field(&mut self, field: &str) {
        self.0.retain(|predicate| predicate.lookup.field != field);
    }

    pub fn merge(&mut self, other: Predicates) {
        for predicate in other.0 {
            self.insert(predicate);
        }
    }

    /// Joins every predicate with `AND`.
    pub fn render(&self, dialect: Dialect) -> String {
        self.0
            .iter()
            .map(|predicate| predicate.render(dialect))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

impl FromIterator<Predicate> for Predicates {
    fn from_iter<T: IntoIterator<Item = Predicate>>(iter: T) -> Self {
        let mut predicates = Predicates::default();
        for predicate in iter {
            predicates.insert(predicate);
        }
        predicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render(key: &str, value: impl Into<LookupValue>) -> Result<String> {
        let predicate = Predicate::new(Lookup::parse(key)?, value.into())?;
        Ok(predicate.render(Dialect::ClickHouse))
    }

    #[test]
    fn parses_plain_and_suffixed_keys() {
        let lookup = Lookup::parse("amount__gte").unwrap();
        assert_eq!(lookup.field, "amount");
        assert_eq!(lookup.op, Operator::Gte);
        assert_eq!(lookup.key(), "amount__gte");

        let lookup = Lookup::parse("country").unwrap();
        assert_eq!(lookup.op, Operator::Eq);
        assert_eq!(lookup.key(), "country");
    }

    #[test]
    fn rejects_unknown_or_stacked_operators() {
        for key in ["field__bogus", "field__a__b", "amount__gte__lte", "__gt"] {
            let err = Lookup::parse(key).unwrap_err();
            assert!(
                matches!(err, ServiceError::InvalidQuery(_)),
                "expected construction error for {key}, got {err:?}"
            );
        }
    }

    #[test]
    fn renders_comparison_operators_with_quoted_values() {
        assert_eq!(render("year", 2019).unwrap(), "year = '2019'");
        assert_eq!(render("amount__gt", 10).unwrap(), "amount > '10'");
        assert_eq!(render("amount__lte", 2.5).unwrap(), "amount <= '2.5'");
        assert_eq!(
            render("recipient_name__ilike", "%farm%").unwrap(),
            "recipient_name ILIKE '%farm%'"
        );
        assert_eq!(
            render("recipient_name__like", "a%").unwrap(),
            "recipient_name LIKE 'a%'"
        );
    }

    #[test]
    fn renders_in_lists() {
        assert_eq!(
            render("field__in", vec![1, 2, 3]).unwrap(),
            "field IN ('1', '2', '3')"
        );
        assert!(render("field__in", 1).is_err());
        assert!(render("field__in", Vec::<i64>::new()).is_err());
    }

    #[test]
    fn renders_null_checks() {
        assert_eq!(
            render("recipient_url__null", true).unwrap(),
            "recipient_url IS NULL"
        );
        assert_eq!(
            render("recipient_url__null", "false").unwrap(),
            "recipient_url IS NOT NULL"
        );
        assert!(render("recipient_url__null", "maybe").is_err());
    }

    #[test]
    fn list_values_are_rejected_for_scalar_operators() {
        assert!(render("country", vec!["DE", "FR"]).is_err());
    }

    #[test]
    fn predicates_replace_existing_keys_in_place() {
        let mut predicates = Predicates::default();
        for (key, value) in [("country", "DE"), ("year", "2019"), ("country", "LU")] {
            predicates.insert(Predicate::new(Lookup::parse(key).unwrap(), value.into()).unwrap());
        }
        assert_eq!(predicates.len(), 2);
        assert_eq!(
            predicates.render(Dialect::DuckDb),
            "country = 'LU' AND year = '2019'"
        );
    }
}
