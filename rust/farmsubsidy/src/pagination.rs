//! Page arithmetic and page links.

use crate::{
    error::Result,
    query::{OrderDirection, Query},
};
use url::Url;

/// Row range `[start, end)` of a 1-based page, or `None` without a limit.
pub fn page_range(page: u64, limit: Option<u64>) -> Option<(u64, u64)> {
    limit.map(|limit| {
        let start = page.saturating_sub(1).saturating_mul(limit);
        (start, start.saturating_add(limit))
    })
}

/// Orders and slices `query` for one page.
pub fn paginate(
    query: &Query,
    page: u64,
    limit: Option<u64>,
    order: Option<(&str, OrderDirection)>,
) -> Result<Query> {
    let query = match order {
        Some((column, direction)) => query.order_by([column], direction),
        None => query.clone(),
    };
    match page_range(page, limit) {
        Some((start, end)) => query.slice(clamp(start)..clamp(end)),
        None => Ok(query),
    }
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub fn has_next(total: u64, page: u64, limit: Option<u64>) -> bool {
    match limit {
        Some(limit) => total > page.saturating_mul(limit),
        None => false,
    }
}

pub fn has_prev(page: u64) -> bool {
    page > 1
}

/// `url` with its `p` parameter set to `page`; other parameters keep their
/// position.
pub fn page_url(url: &str, page: u64) -> Option<String> {
    let mut url = Url::parse(url).ok()?;
    let mut replaced = false;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(key, value)| {
            if key == "p" {
                if replaced {
                    return None;
                }
                replaced = true;
                Some((key.into_owned(), page.to_string()))
            } else {
                Some((key.into_owned(), value.into_owned()))
            }
        })
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear().extend_pairs(pairs);
        if !replaced {
            query.append_pair("p", &page.to_string());
        }
    }
    Some(url.to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    pub next_url: Option<String>,
    pub prev_url: Option<String>,
}

pub fn links(url: &str, page: u64, limit: Option<u64>, total: u64) -> PageLinks {
    PageLinks {
        next_url: has_next(total, page, limit)
            .then(|| page_url(url, page + 1))
            .flatten(),
        prev_url: has_prev(page)
            .then(|| page_url(url, page - 1))
            .flatten(),
    }
}
