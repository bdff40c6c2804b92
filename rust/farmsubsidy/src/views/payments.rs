use crate::query::Query;

/// Individual payments: every column, no grouping.
pub(super) fn template(base: &Query) -> Query {
    base.clone()
}
