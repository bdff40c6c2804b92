//! Static registry of the filterable fields and the operators each accepts.

use crate::lookup::Operator;
use once_cell::sync::Lazy;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Numeric,
    /// Identifiers: exact matches only.
    Key,
}

impl FieldKind {
    pub fn allows(&self, op: Operator) -> bool {
        use Operator::*;
        match self {
            FieldKind::Text => matches!(op, Eq | Like | Ilike | In | Null),
            FieldKind::Numeric => matches!(op, Eq | Gt | Gte | Lt | Lte | In | Null),
            FieldKind::Key => matches!(op, Eq | In),
        }
    }
}

/// Whether a lookup filters payments (WHERE) or aggregates (HAVING).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldScope {
    Base,
    Aggregated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub scope: FieldScope,
}

const BASE_FIELDS: &[(&str, FieldKind)] = &[
    ("country", FieldKind::Text),
    ("year", FieldKind::Numeric),
    ("recipient_id", FieldKind::Key),
    ("recipient_name", FieldKind::Text),
    ("recipient_fingerprint", FieldKind::Text),
    ("recipient_address", FieldKind::Text),
    ("scheme_id", FieldKind::Key),
    ("scheme", FieldKind::Text),
    ("scheme_code", FieldKind::Text),
    ("scheme_description", FieldKind::Text),
    ("amount", FieldKind::Numeric),
];

const AGGREGATED_FIELDS: &[&str] = &[
    "amount_sum",
    "amount_avg",
    "amount_min",
    "amount_max",
    "total_payments",
    "total_recipients",
];

static REGISTRY: Lazy<HashMap<&'static str, FieldSpec>> = Lazy::new(|| {
    let base = BASE_FIELDS.iter().map(|(name, kind)| FieldSpec {
        name: *name,
        kind: *kind,
        scope: FieldScope::Base,
    });
    let aggregated = AGGREGATED_FIELDS.iter().map(|name| FieldSpec {
        name: *name,
        kind: FieldKind::Numeric,
        scope: FieldScope::Aggregated,
    });
    base.chain(aggregated).map(|spec| (spec.name, spec)).collect()
});

pub fn field(name: &str) -> Option<&'static FieldSpec> {
    REGISTRY.get(name)
}

pub fn base_field_names() -> impl Iterator<Item = &'static str> {
    BASE_FIELDS.iter().map(|(name, _)| *name)
}

pub fn aggregated_field_names() -> impl Iterator<Item = &'static str> {
    AGGREGATED_FIELDS.iter().copied()
}
