//! # Sift
//!
//! A resource-agnostic filtering mini-language for list endpoints, compiled
//! to safe, parameterized SQL.
//!
//! Sift provides:
//! - Per-resource field registries, declared in code or TOML
//! - A nested filter grammar with comparison, pattern, set and range operators
//! - `and`/`or`/`not` combinators with arity checks
//! - Sorting, paging and navigation links for the response envelope
//! - A backend-agnostic executor seam built on `async-trait`
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use sift::prelude::*;
//!
//! let registry = FieldRegistry::builder("audio_events")
//!     .primary_key("id")
//!     .field(FieldSpec::new("id", FieldType::Integer).sortable())
//!     .field(FieldSpec::new("site_id", FieldType::Integer))
//!     .field(FieldSpec::new("duration_seconds", FieldType::Integer).sortable())
//!     .build()
//!     .unwrap();
//!
//! let params = RequestParams::from_query_string("order_by=duration_seconds&direction=desc")
//!     .unwrap()
//!     .filter(json!({
//!         "or": [
//!             {"duration_seconds": {"eq": 60}},
//!             {"duration_seconds": {"gteq": 70}}
//!         ]
//!     }));
//!
//! let plan = QueryPlan::build(&params, &registry, "/audio_events").unwrap();
//! assert_eq!(
//!     plan.predicate().unwrap().to_string(),
//!     "(duration_seconds = 60) OR (duration_seconds >= 70)"
//! );
//! assert_eq!(
//!     plan.order().to_sql(),
//!     "audio_events.duration_seconds DESC, audio_events.id ASC"
//! );
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Filter parsing, compilation, sorting and paging.
pub mod query {
    pub use sift_query::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use sift_query::prelude::*;
}

// Re-export key types at the crate root
pub use query::{
    ErrorCode, FieldRegistry, FilterError, FilterResult, Metadata, PagedResult, QueryExecutor,
    QueryPlan, RequestParams,
};
