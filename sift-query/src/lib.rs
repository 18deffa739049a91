//! # sift-query
//!
//! Request filtering for list endpoints.
//!
//! This crate turns caller-supplied filter, sort and paging parameters into
//! a validated, backend-renderable query, including:
//! - A whitelist of filterable, sortable and text-searchable fields per resource
//! - A recursive-descent parser for the nested filter grammar
//! - Compilation to parameterized SQL with `LIKE` escaping
//! - Sorting with a primary-key tie-breaker
//! - Offset and page paging with clamping and navigation links
//! - Query-string shortcuts for equality and free-text filters
//!
//! ## Field Registry
//!
//! Every resource declares which fields a caller may touch:
//!
//! ```rust
//! use sift_query::{FieldRegistry, FieldSpec, FieldType};
//!
//! let registry = FieldRegistry::builder("audio_events")
//!     .primary_key("id")
//!     .field(FieldSpec::new("id", FieldType::Integer).sortable())
//!     .field(FieldSpec::new("duration_seconds", FieldType::Integer).sortable())
//!     .field(FieldSpec::new("notes", FieldType::Text).text_search())
//!     .max_items(100)
//!     .build()
//!     .unwrap();
//!
//! assert!(registry.filterable("notes").is_some());
//! assert!(registry.sortable("notes").is_none());
//! ```
//!
//! Registries can also be loaded from TOML:
//!
//! ```rust
//! use sift_query::FieldRegistry;
//!
//! let registry = FieldRegistry::from_toml(r#"
//!     [resource]
//!     name = "sites"
//!     primary_key = "id"
//!
//!     [fields.id]
//!     type = "integer"
//!     sortable = true
//!
//!     [fields.name]
//!     type = "text"
//!     text_search = true
//! "#).unwrap();
//!
//! assert_eq!(registry.table(), "sites");
//! ```
//!
//! ## Filters
//!
//! ```rust
//! use serde_json::json;
//! use sift_query::{FieldRegistry, FieldSpec, FieldType, DatabaseType, TableHandle, compile, parse};
//!
//! let registry = FieldRegistry::builder("audio_events")
//!     .primary_key("id")
//!     .field(FieldSpec::new("id", FieldType::Integer))
//!     .field(FieldSpec::new("duration_seconds", FieldType::Integer))
//!     .build()
//!     .unwrap();
//!
//! let ast = parse(&json!({"duration_seconds": {"range": {"interval": "[100,200)"}}}), &registry)
//!     .unwrap();
//! let predicate = compile(&ast, &TableHandle::new(&registry)).unwrap();
//!
//! let (sql, params) = predicate.to_sql(DatabaseType::PostgreSQL);
//! assert_eq!(
//!     sql,
//!     "audio_events.duration_seconds >= $1 AND audio_events.duration_seconds < $2"
//! );
//! assert_eq!(params.len(), 2);
//! ```
//!
//! ## Query Plans
//!
//! A [`QueryPlan`] runs the whole pipeline for one request:
//!
//! ```rust
//! use sift_query::{FieldRegistry, FieldSpec, FieldType, QueryPlan, RequestParams};
//!
//! let registry = FieldRegistry::builder("audio_events")
//!     .primary_key("id")
//!     .field(FieldSpec::new("id", FieldType::Integer).sortable())
//!     .field(FieldSpec::new("notes", FieldType::Text).text_search())
//!     .field(FieldSpec::new("name", FieldType::Text).text_search())
//!     .build()
//!     .unwrap();
//!
//! let params = RequestParams::from_query_string("text=hello&items=10&page=5").unwrap();
//! let plan = QueryPlan::build(&params, &registry, "/audio_events").unwrap();
//!
//! assert_eq!(
//!     plan.predicate().unwrap().to_string(),
//!     "(notes LIKE '%hello%') OR (name LIKE '%hello%')"
//! );
//!
//! let meta = plan.metadata(47);
//! assert_eq!(meta.paging.max_page, 5);
//! assert!(meta.paging.next.is_none());
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use serde_json::json;
//! use sift_query::{ErrorCode, FieldRegistry, FieldSpec, FieldType, parse};
//!
//! let registry = FieldRegistry::builder("audio_events")
//!     .primary_key("id")
//!     .field(FieldSpec::new("id", FieldType::Integer))
//!     .build()
//!     .unwrap();
//!
//! let err = parse(&json!({"and": [{"id": {"eq": 1}}]}), &registry).unwrap_err();
//! assert_eq!(err.code(), ErrorCode::InvalidCombinatorArity);
//! assert!(err.is_client_error());
//! ```

pub mod compiler;
pub mod error;
pub mod filter;
pub mod logging;
pub mod pagination;
pub mod params;
pub mod parser;
pub mod plan;
pub mod registry;
pub mod sql;
pub mod types;

pub use compiler::{Column, PatternKind, Predicate, TableHandle, compile};
pub use error::{ErrorCode, FilterError, FilterResult};
pub use filter::{
    CombinatorKind, ComparisonOp, Condition, FieldName, FilterValue, OperatorKind, RangeBounds,
    SubsetOp,
};
pub use pagination::{LinkBuilder, PageMeta, Paging, PagingSpec, compose_paging};
pub use params::{RequestParams, compose_generic, compose_text};
pub use parser::{FilterParser, parse};
pub use plan::{Metadata, PagedResult, QueryExecutor, QueryPlan, execute};
pub use registry::{FieldRegistry, FieldSpec, FieldType, RegistryBuilder, RegistryConfig};
pub use sql::{DatabaseType, SqlBuilder};
pub use types::{OrderByField, OrderDescriptor, SortOrder, SortSpec, Sorting, compose_sort};

// Re-export logging utilities
pub use logging::{get_log_format, get_log_level, init as init_logging, is_debug_enabled};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::compiler::{Predicate, TableHandle, compile};
    pub use crate::error::{FilterError, FilterResult};
    pub use crate::filter::{Condition, FilterValue, OperatorKind};
    pub use crate::pagination::{Paging, PagingSpec};
    pub use crate::params::RequestParams;
    pub use crate::parser::parse;
    pub use crate::plan::{QueryExecutor, QueryPlan, execute};
    pub use crate::registry::{FieldRegistry, FieldSpec, FieldType};
    pub use crate::sql::DatabaseType;
    pub use crate::types::{SortOrder, SortSpec};
}
