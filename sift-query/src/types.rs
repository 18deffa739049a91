//! Sorting: direction, validated order descriptors and the sort composer.

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{FilterError, FilterResult};
use crate::filter::FieldName;
use crate::registry::{FieldRegistry, FieldSpec};
use crate::sql::qualified_column;

/// Sort order for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending order (A-Z, 0-9, oldest first).
    #[default]
    Asc,
    /// Descending order (Z-A, 9-0, newest first).
    Desc,
}

impl SortOrder {
    /// Parse a request direction, ignoring case and surrounding whitespace.
    ///
    /// ```rust
    /// use sift_query::SortOrder;
    ///
    /// assert_eq!(SortOrder::parse(" DESC ").unwrap(), SortOrder::Desc);
    /// assert!(SortOrder::parse("sideways").is_err());
    /// ```
    pub fn parse(direction: &str) -> FilterResult<Self> {
        match direction.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(FilterError::invalid_direction(direction)),
        }
    }

    /// Get the SQL keyword for this sort order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Lowercase name used in request parameters and metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// Requested ordering, as it arrived. Either part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    /// Field to order by.
    pub order_by: Option<String>,
    /// `asc` or `desc`.
    pub direction: Option<String>,
}

impl SortSpec {
    /// A fully specified request.
    pub fn new(order_by: impl Into<String>, direction: impl Into<String>) -> Self {
        Self {
            order_by: Some(order_by.into()),
            direction: Some(direction.into()),
        }
    }

    /// Whether the request named no ordering at all.
    pub fn is_empty(&self) -> bool {
        self.order_by.is_none() && self.direction.is_none()
    }
}

/// Order by specification for a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByField {
    /// Request-facing field name.
    pub field: FieldName,
    /// Backend column.
    pub column: SmolStr,
    /// The sort order.
    pub order: SortOrder,
}

impl OrderByField {
    /// Order by a registered field.
    pub fn new(spec: &FieldSpec, order: SortOrder) -> Self {
        Self {
            field: spec.name().clone(),
            column: spec.column_name().into(),
            order,
        }
    }

    /// Write `table.column DIR` to a buffer.
    #[inline]
    pub fn write_sql(&self, table: &str, buffer: &mut String) {
        buffer.push_str(&qualified_column(table, &self.column));
        buffer.push(' ');
        buffer.push_str(self.order.as_sql());
    }
}

/// Validated ordering for one query: the requested field, then the primary
/// key as a tie-breaker so that pages never overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDescriptor {
    table: SmolStr,
    primary: OrderByField,
    tiebreak: Option<OrderByField>,
}

impl OrderDescriptor {
    /// The requested (or default) ordering.
    pub fn primary(&self) -> &OrderByField {
        &self.primary
    }

    /// Every ordering term, primary first.
    pub fn fields(&self) -> impl Iterator<Item = &OrderByField> {
        std::iter::once(&self.primary).chain(self.tiebreak.as_ref())
    }

    /// Field echoed as `order_by`.
    pub fn order_by(&self) -> &str {
        &self.primary.field
    }

    /// Direction echoed as `direction`.
    pub fn direction(&self) -> SortOrder {
        self.primary.order
    }

    /// Generate the ORDER BY clause (without the "ORDER BY" keyword).
    ///
    /// ```rust
    /// use sift_query::registry::{FieldRegistry, FieldSpec, FieldType};
    /// use sift_query::types::{compose_sort, SortSpec};
    ///
    /// let registry = FieldRegistry::builder("audio_events")
    ///     .primary_key("id")
    ///     .field(FieldSpec::new("id", FieldType::Integer).sortable())
    ///     .field(FieldSpec::new("duration_seconds", FieldType::Float).sortable())
    ///     .build()
    ///     .unwrap();
    ///
    /// let order = compose_sort(&SortSpec::new("duration_seconds", "desc"), &registry).unwrap();
    /// assert_eq!(
    ///     order.to_sql(),
    ///     "audio_events.duration_seconds DESC, audio_events.id ASC"
    /// );
    /// ```
    pub fn to_sql(&self) -> String {
        let mut sql = String::with_capacity(64);
        for (i, field) in self.fields().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            field.write_sql(&self.table, &mut sql);
        }
        sql
    }

    /// Echoed `sorting` metadata.
    pub fn sorting(&self) -> Sorting {
        Sorting {
            order_by: self.primary.field.to_string(),
            direction: self.primary.order,
        }
    }
}

/// The `sorting` block of response metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sorting {
    /// Field ordered by.
    pub order_by: String,
    /// Direction.
    pub direction: SortOrder,
}

/// Validate a requested ordering against `registry`, filling gaps from the
/// registry's defaults. Defaults are trusted and not re-validated.
pub fn compose_sort(spec: &SortSpec, registry: &FieldRegistry) -> FilterResult<OrderDescriptor> {
    let field = match spec.order_by.as_deref() {
        Some(name) => registry.sortable(name).ok_or_else(|| {
            FilterError::invalid_field(name, "is not a sortable field")
        })?,
        None => registry.default_order_by(),
    };
    let direction = match spec.direction.as_deref() {
        Some(direction) => SortOrder::parse(direction)?,
        None => registry.default_direction(),
    };

    let tiebreak = registry
        .primary_key()
        .filter(|pk| pk.name() != field.name())
        .map(|pk| OrderByField::new(pk, SortOrder::Asc));

    Ok(OrderDescriptor {
        table: registry.table().into(),
        primary: OrderByField::new(field, direction),
        tiebreak,
    })
}
