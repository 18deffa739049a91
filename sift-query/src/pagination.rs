//! Paging: request normalization, page arithmetic and navigation links.
//!
//! A request pages either by `offset`/`limit` or by `page`/`items`, never
//! both. [`compose_paging`] turns either form into a clamped [`Paging`];
//! once the backend reports a total, [`Paging::meta`] derives the page
//! block echoed back to the caller.
//!
//! ```rust
//! use sift_query::pagination::{compose_paging, LinkBuilder, PagingSpec};
//! use sift_query::registry::{FieldRegistry, FieldSpec, FieldType};
//!
//! let registry = FieldRegistry::builder("audio_events")
//!     .primary_key("id")
//!     .field(FieldSpec::new("id", FieldType::Integer))
//!     .build()
//!     .unwrap();
//!
//! let paging = compose_paging(&PagingSpec::page(2, 10), &registry).unwrap();
//! assert_eq!(paging.offset, 10);
//! assert_eq!(paging.limit, 10);
//!
//! let meta = paging.meta(47, &LinkBuilder::new("/audio_events"));
//! assert_eq!(meta.page, 2);
//! assert_eq!(meta.max_page, 5);
//! assert_eq!(meta.previous.as_deref(), Some("/audio_events?page=1&items=10"));
//! assert_eq!(meta.next.as_deref(), Some("/audio_events?page=3&items=10"));
//! ```

use std::fmt::Write;

use serde::Serialize;
use tracing::warn;

use crate::error::{FilterError, FilterResult};
use crate::registry::FieldRegistry;

/// Paging as requested, before validation.
///
/// Values are signed so that negative input can be clamped rather than
/// rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PagingSpec {
    /// 1-based page number.
    pub page: Option<i64>,
    /// Page size.
    pub items: Option<i64>,
    /// Rows to skip.
    pub offset: Option<i64>,
    /// Maximum rows to return.
    pub limit: Option<i64>,
}

impl PagingSpec {
    /// Page-numbered paging.
    pub fn page(page: i64, items: i64) -> Self {
        Self {
            page: Some(page),
            items: Some(items),
            ..Self::default()
        }
    }

    /// Offset paging.
    pub fn offset(offset: i64, limit: i64) -> Self {
        Self {
            offset: Some(offset),
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Whether nothing was requested.
    pub fn is_empty(&self) -> bool {
        self.page.is_none() && self.items.is_none() && self.offset.is_none() && self.limit.is_none()
    }

    fn uses_offset(&self) -> bool {
        self.offset.is_some() || self.limit.is_some()
    }

    fn uses_page(&self) -> bool {
        self.page.is_some() || self.items.is_some()
    }

    /// Fill every unset value from `fallback`.
    ///
    /// A side that already names one paging style keeps it; the fallback
    /// only contributes values of the same style.
    pub fn or(self, fallback: PagingSpec) -> Self {
        if (self.uses_offset() && !fallback.uses_offset())
            || (self.uses_page() && !fallback.uses_page())
        {
            return self;
        }
        Self {
            page: self.page.or(fallback.page),
            items: self.items.or(fallback.items),
            offset: self.offset.or(fallback.offset),
            limit: self.limit.or(fallback.limit),
        }
    }
}

/// Normalized paging window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    /// Rows to skip.
    pub offset: u64,
    /// Rows to return; always at least 1.
    pub limit: u64,
}

impl Paging {
    /// The 1-based page the window starts on.
    pub fn page(&self) -> u64 {
        if self.limit == 0 {
            return 1;
        }
        self.offset / self.limit + 1
    }

    /// Number of pages needed for `total` rows.
    pub fn max_page(&self, total: u64) -> u64 {
        if self.limit == 0 {
            return 1;
        }
        total.div_ceil(self.limit)
    }

    /// `LIMIT n OFFSET m`.
    pub fn to_sql(&self) -> String {
        let mut sql = String::with_capacity(32);
        let _ = write!(sql, "LIMIT {} OFFSET {}", self.limit, self.offset);
        sql
    }

    /// Build the page block for a result set of `total` rows.
    ///
    /// `previous`/`next` are clamped to the available pages and omitted when
    /// they would not move away from the current page.
    pub fn meta(&self, total: u64, links: &LinkBuilder) -> PageMeta {
        let page = self.page();
        let max_page = self.max_page(total);
        let last = max_page.max(1);

        let previous = page.saturating_sub(1).clamp(1, last);
        let next = page.saturating_add(1).clamp(1, last);

        PageMeta {
            page,
            items: self.limit,
            total,
            max_page,
            current: links.page(page, self.limit),
            previous: (previous < page).then(|| links.page(previous, self.limit)),
            next: (next > page).then(|| links.page(next, self.limit)),
        }
    }
}

/// Normalize `spec` against the registry's limits.
///
/// Mixing the two paging styles is rejected. Out-of-range values are
/// clamped: a negative offset to 0, a page below 1 to 1, and the page size
/// to `[1, max_items]`.
pub fn compose_paging(spec: &PagingSpec, registry: &FieldRegistry) -> FilterResult<Paging> {
    if spec.uses_offset() && spec.uses_page() {
        let parameter = if spec.offset.is_some() { "offset" } else { "limit" };
        return Err(FilterError::invalid_paging(
            parameter,
            "offset/limit cannot be combined with page/items",
        ));
    }

    let max_items = registry.max_items();
    if spec.uses_offset() {
        let limit = clamp_size("limit", spec.limit, registry.default_items(), max_items);
        let offset = match spec.offset {
            Some(offset) if offset < 0 => {
                warn!(offset, "Negative offset clamped to 0");
                0
            }
            Some(offset) => offset as u64,
            None => 0,
        };
        return Ok(Paging { offset, limit });
    }

    let items = clamp_size("items", spec.items, registry.default_items(), max_items);
    let page = match spec.page {
        Some(page) if page < 1 => {
            warn!(page, "Page below 1 clamped to 1");
            1
        }
        Some(page) => page as u64,
        None => 1,
    };
    Ok(Paging {
        offset: (page - 1).saturating_mul(items),
        limit: items,
    })
}

fn clamp_size(parameter: &str, requested: Option<i64>, default: u64, max: u64) -> u64 {
    match requested {
        None => default,
        Some(size) if size < 1 => {
            warn!(parameter, size, "Page size below 1 clamped to 1");
            1
        }
        Some(size) if size as u64 > max => {
            warn!(parameter, size, max, "Page size clamped to maximum");
            max
        }
        Some(size) => size as u64,
    }
}

/// Serializes the request's parameters into page links.
///
/// Parameters are emitted in insertion order, followed by `page` and
/// `items`, so equal requests always produce equal links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkBuilder {
    base_path: String,
    params: Vec<(String, String)>,
}

impl LinkBuilder {
    /// Links rooted at `base_path`.
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            params: Vec::new(),
        }
    }

    /// Echo an additional parameter in every link.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    /// Echo an additional parameter in every link.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.push((key.into(), value.into()));
    }

    /// Echoed parameters, in order.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Link to `page` with `items` rows per page.
    pub fn page(&self, page: u64, items: u64) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.params {
            query.append_pair(key, value);
        }
        query.append_pair("page", &page.to_string());
        query.append_pair("items", &items.to_string());
        format!("{}?{}", self.base_path, query.finish())
    }
}

/// Page block of the response metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    /// Current 1-based page.
    pub page: u64,
    /// Page size.
    pub items: u64,
    /// Rows matching the filter, across all pages.
    pub total: u64,
    /// Last page holding rows; 0 when nothing matched.
    pub max_page: u64,
    /// Link to this page.
    pub current: String,
    /// Link to the preceding page, if any.
    pub previous: Option<String>,
    /// Link to the following page, if any.
    pub next: Option<String>,
}
