//! Field registry: the per-resource whitelist every filter is checked against.
//!
//! A registry is built once, when a resource is defined, and is read-only
//! afterwards. Share it behind an `Arc`; nothing in a request ever mutates it.
//!
//! ```rust
//! use sift_query::registry::{FieldRegistry, FieldSpec, FieldType};
//! use sift_query::filter::OperatorKind;
//! use sift_query::SortOrder;
//!
//! let registry = FieldRegistry::builder("audio_events")
//!     .primary_key("id")
//!     .field(FieldSpec::new("id", FieldType::Integer).sortable())
//!     .field(FieldSpec::new("site_id", FieldType::Integer).sortable())
//!     .field(FieldSpec::new("notes", FieldType::Text).text_search())
//!     .default_sort("id", SortOrder::Desc)
//!     .build()
//!     .unwrap();
//!
//! assert!(registry.allows("site_id", OperatorKind::In));
//! assert!(!registry.allows("site_id", OperatorKind::Contains));
//! assert_eq!(registry.text_fields().count(), 1);
//! ```
//!
//! Registries can also be loaded from TOML, see [`FieldRegistry::from_toml`].

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{FilterError, FilterResult};
use crate::filter::{FieldName, FilterValue, OperatorKind};
use crate::types::SortOrder;

/// Default page size when a request names none.
pub const DEFAULT_ITEMS: u64 = 25;

/// Default upper bound for a page size.
pub const DEFAULT_MAX_ITEMS: u64 = 500;

/// Storage type of a field; decides default operators and value coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Free text.
    Text,
    /// 64-bit integer.
    Integer,
    /// Floating point.
    Float,
    /// Boolean.
    Boolean,
    /// Timestamp, passed through as an ISO-8601 string.
    Timestamp,
    /// UUID in its hyphenated string form.
    Uuid,
}

impl FieldType {
    /// Operators a field of this type accepts unless narrowed.
    pub fn default_operators(&self) -> &'static [OperatorKind] {
        use OperatorKind::*;
        match self {
            Self::Text => &OperatorKind::ALL,
            Self::Integer | Self::Float | Self::Timestamp => {
                &[Eq, NotEq, Lt, Gt, Lteq, Gteq, In, Range]
            }
            Self::Boolean | Self::Uuid => &[Eq, NotEq, In],
        }
    }

    /// Coerce a scalar request value to this type.
    ///
    /// `Null` passes through unchanged; whether null is acceptable is the
    /// operator's concern.
    pub fn coerce(&self, value: &FilterValue) -> Result<FilterValue, String> {
        let mismatch = || format!("expected {}, got {}", self, value.type_name());
        match (self, value) {
            (_, FilterValue::Null) => Ok(FilterValue::Null),
            (_, FilterValue::List(_)) => Err("expected a single value, got a list".to_string()),

            (Self::Integer, FilterValue::Int(_)) => Ok(value.clone()),
            (Self::Integer, FilterValue::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(FilterValue::Int)
                .map_err(|_| mismatch()),

            (Self::Float, FilterValue::Int(_) | FilterValue::Float(_)) => Ok(value.clone()),
            (Self::Float, FilterValue::String(s)) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(FilterValue::Float(f)),
                _ => Err(mismatch()),
            },

            (Self::Boolean, FilterValue::Bool(_)) => Ok(value.clone()),
            (Self::Boolean, FilterValue::String(s)) => match s.trim() {
                "true" => Ok(FilterValue::Bool(true)),
                "false" => Ok(FilterValue::Bool(false)),
                _ => Err(mismatch()),
            },

            (Self::Text, FilterValue::String(_)) => Ok(value.clone()),
            (Self::Text, FilterValue::Int(i)) => Ok(FilterValue::String(i.to_string())),
            (Self::Text, FilterValue::Float(f)) => Ok(FilterValue::String(f.to_string())),

            (Self::Timestamp, FilterValue::String(s)) if !s.trim().is_empty() => {
                Ok(value.clone())
            }
            (Self::Uuid, FilterValue::String(s)) if is_uuid(s) => Ok(value.clone()),

            _ => Err(mismatch()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Uuid => "uuid",
        })
    }
}

fn is_uuid(s: &str) -> bool {
    s.len() == 36
        && s.char_indices().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

/// One registered field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    name: FieldName,
    column: SmolStr,
    field_type: FieldType,
    allowed_ops: Vec<OperatorKind>,
    filterable: bool,
    sortable: bool,
    text_search: bool,
}

impl FieldSpec {
    /// A filterable field whose column shares its name.
    pub fn new(name: impl Into<FieldName>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            field_type,
            allowed_ops: field_type.default_operators().to_vec(),
            filterable: true,
            sortable: false,
            text_search: false,
        }
    }

    /// Map the field onto a differently named column.
    pub fn column(mut self, column: impl Into<SmolStr>) -> Self {
        self.column = column.into();
        self
    }

    /// Allow ordering by this field.
    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    /// Include this field in free-text search.
    pub fn text_search(mut self) -> Self {
        self.text_search = true;
        self
    }

    /// Exclude this field from filtering (it may still be sortable).
    pub fn not_filterable(mut self) -> Self {
        self.filterable = false;
        self
    }

    /// Narrow the accepted operators.
    pub fn operators(mut self, ops: impl IntoIterator<Item = OperatorKind>) -> Self {
        self.allowed_ops = ops.into_iter().collect();
        self
    }

    /// Request-facing name.
    pub fn name(&self) -> &FieldName {
        &self.name
    }

    /// Backend column.
    pub fn column_name(&self) -> &str {
        &self.column
    }

    /// Storage type.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Accepted operators.
    pub fn allowed_ops(&self) -> &[OperatorKind] {
        &self.allowed_ops
    }

    /// Whether the field may appear in filters.
    pub fn is_filterable(&self) -> bool {
        self.filterable
    }

    /// Whether the field may be used for ordering.
    pub fn is_sortable(&self) -> bool {
        self.sortable
    }

    /// Whether free-text search covers the field.
    pub fn is_text_searchable(&self) -> bool {
        self.text_search
    }

    /// Whether the field accepts `op`.
    pub fn allows(&self, op: OperatorKind) -> bool {
        self.filterable && self.allowed_ops.contains(&op)
    }
}

/// Per-resource whitelist of fields plus paging and sorting defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRegistry {
    resource: SmolStr,
    table: SmolStr,
    primary_key: Option<FieldName>,
    fields: IndexMap<FieldName, FieldSpec>,
    max_items: u64,
    default_items: u64,
    default_order_by: FieldName,
    default_direction: SortOrder,
}

impl FieldRegistry {
    /// Start building a registry for `resource`.
    pub fn builder(resource: impl Into<SmolStr>) -> RegistryBuilder {
        RegistryBuilder::new(resource)
    }

    /// Resource name.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Backend table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Primary key, used to break ties when ordering.
    pub fn primary_key(&self) -> Option<&FieldSpec> {
        self.primary_key.as_ref().and_then(|pk| self.fields.get(pk))
    }

    /// Look up a field.
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// All fields, in registration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    /// Look up a field that may be filtered on.
    pub fn filterable(&self, name: &str) -> Option<&FieldSpec> {
        self.get(name).filter(|f| f.filterable)
    }

    /// Look up a field that may be ordered by.
    pub fn sortable(&self, name: &str) -> Option<&FieldSpec> {
        self.get(name).filter(|f| f.sortable)
    }

    /// Fields covered by free-text search, in registration order.
    pub fn text_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values().filter(|f| f.text_search)
    }

    /// Whether `field` is filterable with `op`.
    pub fn allows(&self, field: &str, op: OperatorKind) -> bool {
        self.get(field).is_some_and(|f| f.allows(op))
    }

    /// Largest page size.
    pub fn max_items(&self) -> u64 {
        self.max_items
    }

    /// Page size used when the request names none.
    pub fn default_items(&self) -> u64 {
        self.default_items
    }

    /// Ordering used when the request names none.
    pub fn default_order_by(&self) -> &FieldSpec {
        // build() guarantees the default is registered
        &self.fields[&self.default_order_by]
    }

    /// Direction used when the request names none.
    pub fn default_direction(&self) -> SortOrder {
        self.default_direction
    }

    /// Load a registry from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> FilterResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| FilterError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a registry from TOML.
    ///
    /// ```rust
    /// use sift_query::registry::FieldRegistry;
    ///
    /// let registry = FieldRegistry::from_toml(r#"
    ///     [resource]
    ///     name = "sites"
    ///     primary_key = "id"
    ///
    ///     [fields.id]
    ///     type = "integer"
    ///     sortable = true
    ///
    ///     [fields.name]
    ///     type = "text"
    ///     text_search = true
    /// "#).unwrap();
    ///
    /// assert_eq!(registry.table(), "sites");
    /// assert_eq!(registry.default_order_by().name(), "id");
    /// ```
    pub fn from_toml(content: &str) -> FilterResult<Self> {
        let config: RegistryConfig =
            toml::from_str(content).map_err(|e| FilterError::Toml { source: e })?;
        config.into_registry()
    }
}

/// Builder for [`FieldRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    resource: SmolStr,
    table: Option<SmolStr>,
    primary_key: Option<FieldName>,
    fields: IndexMap<FieldName, FieldSpec>,
    max_items: u64,
    default_items: u64,
    default_order_by: Option<FieldName>,
    default_direction: SortOrder,
}

impl RegistryBuilder {
    fn new(resource: impl Into<SmolStr>) -> Self {
        Self {
            resource: resource.into(),
            table: None,
            primary_key: None,
            fields: IndexMap::new(),
            max_items: DEFAULT_MAX_ITEMS,
            default_items: DEFAULT_ITEMS,
            default_order_by: None,
            default_direction: SortOrder::Asc,
        }
    }

    /// Backend table (defaults to the resource name).
    pub fn table(mut self, table: impl Into<SmolStr>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Primary key field.
    pub fn primary_key(mut self, field: impl Into<FieldName>) -> Self {
        self.primary_key = Some(field.into());
        self
    }

    /// Register a field. A later registration under the same name replaces it.
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.insert(spec.name.clone(), spec);
        self
    }

    /// Largest page size.
    pub fn max_items(mut self, max_items: u64) -> Self {
        self.max_items = max_items;
        self
    }

    /// Default page size.
    pub fn default_items(mut self, items: u64) -> Self {
        self.default_items = items;
        self
    }

    /// Default ordering.
    pub fn default_sort(mut self, field: impl Into<FieldName>, direction: SortOrder) -> Self {
        self.default_order_by = Some(field.into());
        self.default_direction = direction;
        self
    }

    /// Validate and freeze the registry.
    pub fn build(self) -> FilterResult<FieldRegistry> {
        let resource = self.resource;
        if self.max_items == 0 {
            return Err(FilterError::config(format!(
                "`{}`: max_items must be at least 1",
                resource
            )));
        }
        if self.default_items == 0 || self.default_items > self.max_items {
            return Err(FilterError::config(format!(
                "`{}`: default_items must be between 1 and {}",
                resource, self.max_items
            )));
        }

        for spec in self.fields.values() {
            let type_ops = spec.field_type.default_operators();
            if let Some(op) = spec.allowed_ops.iter().find(|op| !type_ops.contains(op)) {
                return Err(FilterError::config(format!(
                    "`{}.{}`: operator `{}` does not apply to {} fields",
                    resource, spec.name, op, spec.field_type
                )));
            }
            if spec.text_search && spec.field_type != FieldType::Text {
                return Err(FilterError::config(format!(
                    "`{}.{}`: only text fields can be text-searchable",
                    resource, spec.name
                )));
            }
            if spec.text_search && !spec.filterable {
                return Err(FilterError::config(format!(
                    "`{}.{}`: text-searchable fields must be filterable",
                    resource, spec.name
                )));
            }
            if spec.text_search && !spec.allowed_ops.contains(&OperatorKind::Contains) {
                return Err(FilterError::config(format!(
                    "`{}.{}`: text-searchable fields must allow `contains`",
                    resource, spec.name
                )));
            }
        }

        if let Some(pk) = &self.primary_key {
            if !self.fields.contains_key(pk) {
                return Err(FilterError::config(format!(
                    "`{}`: primary key `{}` is not a registered field",
                    resource, pk
                )));
            }
        }

        let default_order_by = self
            .default_order_by
            .or_else(|| self.primary_key.clone())
            .ok_or_else(|| {
                FilterError::config(format!(
                    "`{}`: a default order or a primary key is required",
                    resource
                ))
            })?;
        if !self.fields.contains_key(&default_order_by) {
            return Err(FilterError::config(format!(
                "`{}`: default order field `{}` is not registered",
                resource, default_order_by
            )));
        }

        Ok(FieldRegistry {
            table: self.table.unwrap_or_else(|| resource.clone()),
            resource,
            primary_key: self.primary_key,
            fields: self.fields,
            max_items: self.max_items,
            default_items: self.default_items,
            default_order_by,
            default_direction: self.default_direction,
        })
    }
}

/// TOML shape of a registry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Resource-level settings.
    pub resource: ResourceConfig,
    /// Fields by name.
    #[serde(default)]
    pub fields: IndexMap<String, FieldConfig>,
}

/// `[resource]` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    /// Resource name.
    pub name: String,
    /// Backend table (defaults to `name`).
    pub table: Option<String>,
    /// Primary key field.
    pub primary_key: Option<String>,
    /// Largest page size.
    #[serde(default = "default_max_items")]
    pub max_items: u64,
    /// Default page size.
    #[serde(default = "default_items")]
    pub default_items: u64,
    /// Default ordering field.
    pub default_order_by: Option<String>,
    /// Default ordering direction.
    #[serde(default)]
    pub default_direction: SortOrder,
}

fn default_max_items() -> u64 {
    DEFAULT_MAX_ITEMS
}

fn default_items() -> u64 {
    DEFAULT_ITEMS
}

/// `[fields.<name>]` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    /// Storage type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Backend column (defaults to the field name).
    pub column: Option<String>,
    /// Whether the field may be filtered on.
    #[serde(default = "default_true")]
    pub filterable: bool,
    /// Whether the field may be ordered by.
    #[serde(default)]
    pub sortable: bool,
    /// Whether free-text search covers the field.
    #[serde(default)]
    pub text_search: bool,
    /// Operator whitelist narrowing the type default.
    pub operators: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

impl RegistryConfig {
    /// Validate the configuration into a registry.
    pub fn into_registry(self) -> FilterResult<FieldRegistry> {
        let resource = self.resource;
        let mut builder = FieldRegistry::builder(resource.name.as_str())
            .max_items(resource.max_items)
            .default_items(resource.default_items);
        if let Some(table) = resource.table {
            builder = builder.table(table);
        }
        if let Some(pk) = resource.primary_key {
            builder = builder.primary_key(pk);
        }
        if let Some(order_by) = resource.default_order_by {
            builder = builder.default_sort(order_by, resource.default_direction);
        } else {
            builder.default_direction = resource.default_direction;
        }

        for (name, field) in self.fields {
            let mut spec = FieldSpec::new(name.as_str(), field.field_type);
            if let Some(column) = field.column {
                spec = spec.column(column);
            }
            if !field.filterable {
                spec = spec.not_filterable();
            }
            if field.sortable {
                spec = spec.sortable();
            }
            if field.text_search {
                spec = spec.text_search();
            }
            if let Some(tags) = field.operators {
                let ops = tags
                    .iter()
                    .map(|tag| {
                        OperatorKind::from_tag(tag).ok_or_else(|| {
                            FilterError::config(format!(
                                "`{}.{}`: unknown operator `{}`",
                                resource.name, name, tag
                            ))
                        })
                    })
                    .collect::<FilterResult<Vec<_>>>()?;
                spec = spec.operators(ops);
            }
            builder = builder.field(spec);
        }

        builder.build()
    }
}
