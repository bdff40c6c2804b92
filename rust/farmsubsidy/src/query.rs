//! Immutable SELECT description with copy-on-write refinement.
//!
//! Every mutator returns a new [`Query`]: field and group lists concatenate,
//! predicate maps merge key by key, scalars are replaced and `order_by`
//! always replaces the previous ordering.

use crate::{
    dialect::Dialect,
    error::{Result, ServiceError},
    lookup::{Lookup, LookupValue, Predicate, Predicates},
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    ops::{Range, RangeFrom, RangeFull, RangeTo},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// Python-style slice bounds applied through [`Query::slice`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slice {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl Slice {
    pub fn new(start: Option<i64>, stop: Option<i64>) -> Self {
        Self {
            start,
            stop,
            step: None,
        }
    }

    pub fn step_by(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }
}

impl From<Range<i64>> for Slice {
    fn from(range: Range<i64>) -> Self {
        Slice::new(Some(range.start), Some(range.end))
    }
}

impl From<RangeTo<i64>> for Slice {
    fn from(range: RangeTo<i64>) -> Self {
        Slice::new(None, Some(range.end))
    }
}

impl From<RangeFrom<i64>> for Slice {
    fn from(range: RangeFrom<i64>) -> Self {
        Slice::new(Some(range.start), None)
    }
}

impl From<RangeFull> for Slice {
    fn from(_: RangeFull) -> Self {
        Slice::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    dialect: Dialect,
    table: String,
    fields: Vec<String>,
    group_by: Vec<String>,
    where_predicates: Predicates,
    having_predicates: Predicates,
    order_by: Vec<String>,
    order_direction: OrderDirection,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Query {
    /// Selects every column of `table` without filters.
    pub fn new(table: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            dialect,
            table: table.into(),
            fields: Vec::new(),
            group_by: Vec::new(),
            where_predicates: Predicates::default(),
            having_predicates: Predicates::default(),
            order_by: Vec::new(),
            order_direction: OrderDirection::Asc,
            limit: None,
            offset: None,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn group_by_fields(&self) -> &[String] {
        &self.group_by
    }

    pub fn where_predicates(&self) -> &Predicates {
        &self.where_predicates
    }

    pub fn having_predicates(&self) -> &Predicates {
        &self.having_predicates
    }

    pub fn order_fields(&self) -> &[String] {
        &self.order_by
    }

    pub fn order_direction(&self) -> OrderDirection {
        self.order_direction
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
    }

    pub fn select<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.fields.extend(fields.into_iter().map(Into::into));
        next
    }

    pub fn group_by<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.group_by.extend(fields.into_iter().map(Into::into));
        next
    }

    /// Adds WHERE lookups. Fails on unknown operators or values that do not
    /// fit their operator.
    pub fn filter<I, K, V>(&self, lookups: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<LookupValue>,
    {
        let mut next = self.clone();
        next.where_predicates.merge(parse_predicates(lookups)?);
        Ok(next)
    }

    /// Adds HAVING lookups. They only render when the query is grouped.
    pub fn having<I, K, V>(&self, lookups: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<LookupValue>,
    {
        let mut next = self.clone();
        next.having_predicates.merge(parse_predicates(lookups)?);
        Ok(next)
    }

    pub fn filter_with(&self, predicates: Predicates) -> Self {
        let mut next = self.clone();
        next.where_predicates.merge(predicates);
        next
    }

    pub fn having_with(&self, predicates: Predicates) -> Self {
        let mut next = self.clone();
        next.having_predicates.merge(predicates);
        next
    }

    /// Drops every WHERE lookup on `field`, whatever its operator.
    pub fn without_filter(&self, field: &str) -> Self {
        let mut next = self.clone();
        next.where_predicates.remove_field(field);
        next
    }

    pub fn order_by<I, S>(&self, fields: I, direction: OrderDirection) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.order_by = fields.into_iter().map(Into::into).collect();
        next.order_direction = direction;
        next
    }

    /// Maps slice bounds onto limit/offset.
    pub fn slice(&self, slice: impl Into<Slice>) -> Result<Self> {
        let Slice { start, stop, step } = slice.into();
        if matches!(step, Some(step) if step != 1) {
            return Err(ServiceError::InvalidQuery(
                "Invalid slicing: steps not allowed".into(),
            ));
        }

        let start = start.unwrap_or(0);
        if start < 0 {
            return Err(ServiceError::InvalidQuery(format!(
                "Offset {start} must not be negative"
            )));
        }

        let mut next = self.clone();
        next.offset = Some(start as u64);
        next.limit = match stop {
            Some(stop) => {
                let limit = stop - start;
                if limit < 0 {
                    return Err(ServiceError::InvalidQuery(format!(
                        "Limit {limit} must not be negative"
                    )));
                }
                Some(limit as u64)
            }
            None => None,
        };
        Ok(next)
    }

    /// Selects the single row at `index`.
    pub fn at(&self, index: i64) -> Result<Self> {
        if index < 0 {
            return Err(ServiceError::InvalidQuery(format!(
                "Index {index} must not be negative"
            )));
        }
        let mut next = self.clone();
        next.limit = Some(1);
        next.offset = Some(index as u64);
        Ok(next)
    }

    /// The same query without limit, offset and ordering.
    pub fn unsliced(&self) -> Self {
        let mut next = self.clone();
        next.limit = None;
        next.offset = None;
        next.order_by.clear();
        next.order_direction = OrderDirection::Asc;
        next
    }

    pub fn to_sql(&self) -> String {
        self.to_string()
    }

    /// Row count of the query without materialising it. Grouped queries
    /// count their distinct group keys, or the groups left by HAVING when it
    /// is set.
    pub fn count_sql(&self) -> String {
        if self.is_grouped() && !self.having_predicates.is_empty() {
            return format!("SELECT count(*) FROM ({}) AS grouped", self.unsliced());
        }
        let expr = if self.is_grouped() {
            self.dialect.count_distinct(&self.group_by)
        } else {
            "count(*)".to_string()
        };
        format!("SELECT {expr} FROM {}{}", self.table, self.where_clause())
    }

    fn where_clause(&self) -> String {
        if self.where_predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.where_predicates.render(self.dialect))
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = if self.fields.is_empty() {
            "*".to_string()
        } else {
            self.fields.join(", ")
        };
        write!(f, "SELECT {fields} FROM {}{}", self.table, self.where_clause())?;

        if self.is_grouped() {
            write!(f, " GROUP BY {}", self.group_by.join(", "))?;
            if !self.having_predicates.is_empty() {
                write!(f, " HAVING {}", self.having_predicates.render(self.dialect))?;
            }
        }

        if !self.order_by.is_empty() {
            write!(
                f,
                " ORDER BY {} {}",
                self.order_by.join(", "),
                self.order_direction.as_sql()
            )?;
        }

        f.write_str(&self.dialect.limit_clause(self.limit, self.offset))
    }
}

fn parse_predicates<I, K, V>(lookups: I) -> Result<Predicates>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<LookupValue>,
{
    lookups
        .into_iter()
        .map(|(key, value)| Predicate::new(Lookup::parse(key.as_ref())?, value.into()))
        .collect()
}
