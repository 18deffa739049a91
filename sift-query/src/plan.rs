//! Query plans and the backend execution seam.
//!
//! [`QueryPlan::build`] runs the whole request pipeline: the structured
//! filter is parsed, generic and text filters are folded in, the result is
//! compiled, and sorting and paging are composed. Any failure aborts the
//! build, so a backend never sees a partially validated request.
//!
//! ```rust
//! use serde_json::json;
//! use sift_query::params::RequestParams;
//! use sift_query::plan::QueryPlan;
//! use sift_query::registry::{FieldRegistry, FieldSpec, FieldType};
//!
//! let registry = FieldRegistry::builder("audio_events")
//!     .primary_key("id")
//!     .field(FieldSpec::new("id", FieldType::Integer).sortable())
//!     .field(FieldSpec::new("site_id", FieldType::Integer))
//!     .build()
//!     .unwrap();
//!
//! let params = RequestParams::new().filter(json!({"site_id": {"in": [1, 2, 3]}}));
//! let plan = QueryPlan::build(&params, &registry, "/audio_events").unwrap();
//!
//! assert_eq!(plan.predicate().unwrap().to_string(), "site_id IN (1, 2, 3)");
//!
//! let meta = plan.metadata(3);
//! assert_eq!(meta.paging.max_page, 1);
//! assert_eq!(meta.sorting.order_by, "id");
//! ```

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::compiler::{Predicate, TableHandle, compile};
use crate::error::FilterResult;
use crate::filter::Condition;
use crate::pagination::{LinkBuilder, PageMeta, Paging, compose_paging};
use crate::params::{GENERIC_FILTER_PREFIX, RequestParams, TEXT_PARAM, compose_generic, compose_text};
use crate::parser::parse;
use crate::registry::FieldRegistry;
use crate::types::{OrderDescriptor, Sorting, compose_sort};

/// A fully validated request, ready for a backend.
///
/// Plans are immutable; every accessor hands out shared references.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    condition: Option<Condition>,
    predicate: Option<Predicate>,
    order: OrderDescriptor,
    paging: Paging,
    links: LinkBuilder,
}

impl QueryPlan {
    /// Validate `params` against `registry`.
    ///
    /// `base_path` roots the page links in the metadata.
    pub fn build(
        params: &RequestParams,
        registry: &FieldRegistry,
        base_path: &str,
    ) -> FilterResult<Self> {
        let structured = match params.filter_value() {
            Some(raw) if !is_blank(raw) => Some(parse(raw, registry)?),
            _ => None,
        };
        let generic = compose_generic(params.generic_filters(), registry)?;
        let text = match params.text_value() {
            Some(text) => compose_text(text, registry)?,
            None => None,
        };

        let mut links = LinkBuilder::new(base_path);
        if let Some(structured) = &structured {
            links.push("filter", structured.to_json().to_string());
        }
        for (field, value) in params.generic_filters() {
            links.push(format!("{}{}", GENERIC_FILTER_PREFIX, field), value.as_str());
        }
        if text.is_some() {
            if let Some(raw) = params.text_value() {
                links.push(TEXT_PARAM, raw.trim());
            }
        }

        let condition = Condition::all(structured.into_iter().chain(generic).chain(text));
        let predicate = condition
            .as_ref()
            .map(|c| compile(c, &TableHandle::new(registry)))
            .transpose()?;

        let order = compose_sort(params.sort_spec(), registry)?;
        links.push("order_by", order.order_by());
        links.push("direction", order.direction().as_str());
        for (key, value) in params.echoed() {
            links.push(key.as_str(), value.as_str());
        }

        let paging = compose_paging(params.paging_spec(), registry)?;

        debug!(
            resource = %registry.resource(),
            filtered = predicate.is_some(),
            order = %order.to_sql(),
            offset = paging.offset,
            limit = paging.limit,
            "Built query plan"
        );

        Ok(Self {
            condition,
            predicate,
            order,
            paging,
            links,
        })
    }

    /// The combined filter tree, if anything filters.
    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// The compiled filter, if anything filters.
    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Validated ordering.
    pub fn order(&self) -> &OrderDescriptor {
        &self.order
    }

    /// Paging window.
    pub fn paging(&self) -> Paging {
        self.paging
    }

    /// Link serializer for this request.
    pub fn links(&self) -> &LinkBuilder {
        &self.links
    }

    /// The normalized filter, in the request grammar.
    ///
    /// `{}` when nothing filters.
    pub fn filter_json(&self) -> Value {
        self.condition
            .as_ref()
            .map(Condition::to_json)
            .unwrap_or_else(|| Value::Object(Default::default()))
    }

    /// Response metadata for a result set of `total` rows.
    pub fn metadata(&self, total: u64) -> Metadata {
        Metadata {
            filter: self.filter_json(),
            sorting: self.order.sorting(),
            paging: self.paging.meta(total, &self.links),
        }
    }
}

fn is_blank(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// The metadata block echoed alongside a page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    /// Normalized filter.
    pub filter: Value,
    /// Effective ordering.
    pub sorting: Sorting,
    /// Page numbers and links.
    pub paging: PageMeta,
}

/// A backend able to run compiled plans.
///
/// `predicate` is `None` when the request does not filter.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Row type produced by `fetch`.
    type Row: Send;
    /// Backend failure.
    type Error: Send;

    /// Count every row matching `predicate`, ignoring paging.
    async fn count(&self, predicate: Option<&Predicate>) -> Result<u64, Self::Error>;

    /// Fetch one page of rows matching `predicate`.
    async fn fetch(
        &self,
        predicate: Option<&Predicate>,
        order: &OrderDescriptor,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Self::Row>, Self::Error>;
}

/// One page of rows plus its metadata.
#[derive(Debug, Clone, Serialize)]
pub struct PagedResult<T> {
    /// Rows on this page.
    pub rows: Vec<T>,
    /// Filter, sorting and paging echo.
    pub metadata: Metadata,
}

/// Count, then fetch the requested page.
pub async fn execute<E>(plan: &QueryPlan, executor: &E) -> Result<PagedResult<E::Row>, E::Error>
where
    E: QueryExecutor + ?Sized,
{
    let total = executor.count(plan.predicate()).await?;
    let paging = plan.paging();
    let rows = executor
        .fetch(plan.predicate(), plan.order(), paging.offset, paging.limit)
        .await?;
    info!(total, returned = rows.len(), page = paging.page(), "Executed query plan");
    Ok(PagedResult {
        rows,
        metadata: plan.metadata(total),
    })
}
