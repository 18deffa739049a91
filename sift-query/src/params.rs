//! Request parameters and the query-string filter composers.
//!
//! A request reaches the pipeline through two surfaces: a structured body
//! (`filter`, `sorting`, `paging`) and flat query-string parameters
//! (`order_by`, `direction`, `page`, `items`, `offset`, `limit`, `text`,
//! `filter_<field>`). [`RequestParams`] merges both; structured values win.
//!
//! ```rust
//! use serde_json::json;
//! use sift_query::params::RequestParams;
//!
//! let params = RequestParams::from_query_string("page=2&items=10&filter_site_id=4&text=bird")
//!     .unwrap()
//!     .with_body(&json!({"paging": {"page": 3}}))
//!     .unwrap();
//!
//! assert_eq!(params.paging_spec().page, Some(3));
//! assert_eq!(params.paging_spec().items, Some(10));
//! assert_eq!(params.text_value(), Some("bird"));
//! assert_eq!(params.generic_filters().get("site_id").map(String::as_str), Some("4"));
//! ```

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{FilterError, FilterResult};
use crate::filter::{ComparisonOp, Condition, FilterValue, OperatorKind, SubsetOp};
use crate::pagination::PagingSpec;
use crate::registry::FieldRegistry;
use crate::types::SortSpec;

/// Prefix marking a generic equality filter in the query string.
pub const GENERIC_FILTER_PREFIX: &str = "filter_";

/// Query-string key carrying free-text search.
pub const TEXT_PARAM: &str = "text";

/// Everything a request says about filtering, sorting and paging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    filter: Option<Value>,
    sort: SortSpec,
    paging: PagingSpec,
    text: Option<String>,
    generic: IndexMap<String, String>,
    echo: IndexMap<String, String>,
}

impl RequestParams {
    /// No parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect flat query-string pairs.
    ///
    /// Unrecognised keys are kept and echoed in page links. A repeated key
    /// keeps its last value.
    pub fn from_query<I, K, V>(pairs: I) -> FilterResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            params.set_query_param(key.as_ref(), value.into())?;
        }
        Ok(params)
    }

    /// Collect a raw `application/x-www-form-urlencoded` query string.
    pub fn from_query_string(query: &str) -> FilterResult<Self> {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_query(
            url::form_urlencoded::parse(query.as_bytes()).map(|(k, v)| (k, v.into_owned())),
        )
    }

    fn set_query_param(&mut self, key: &str, value: String) -> FilterResult<()> {
        crate::sift_trace!(key, "Query parameter");
        match key {
            "filter" => {
                let parsed = serde_json::from_str(&value).map_err(|e| {
                    FilterError::invalid_filter(format!("filter parameter is not valid JSON: {}", e))
                })?;
                self.filter = Some(parsed);
            }
            "order_by" => self.sort.order_by = Some(value),
            "direction" => self.sort.direction = Some(value),
            "page" => self.paging.page = Some(parse_number(key, &value)?),
            "items" => self.paging.items = Some(parse_number(key, &value)?),
            "offset" => self.paging.offset = Some(parse_number(key, &value)?),
            "limit" => self.paging.limit = Some(parse_number(key, &value)?),
            TEXT_PARAM => self.text = Some(value),
            // Everything after the prefix is a field name, even `text` or `filter`.
            _ => match key.strip_prefix(GENERIC_FILTER_PREFIX) {
                Some(field) if !field.is_empty() => {
                    self.generic.insert(field.to_string(), value);
                }
                _ => {
                    self.echo.insert(key.to_string(), value);
                }
            },
        }
        Ok(())
    }

    /// Overlay a structured request body.
    ///
    /// Recognised keys are `filter`, `sorting` and `paging`; anything else
    /// is ignored. Values present here replace their query-string
    /// counterparts.
    pub fn with_body(mut self, body: &Value) -> FilterResult<Self> {
        let body = match body {
            Value::Null => return Ok(self),
            Value::Object(body) => body,
            other => {
                return Err(FilterError::invalid_filter(format!(
                    "request body must be an object, got {}",
                    json_type(other)
                )));
            }
        };

        if let Some(filter) = body.get("filter").filter(|f| !f.is_null()) {
            self.filter = Some(filter.clone());
        }

        if let Some(sorting) = body.get("sorting").filter(|s| !s.is_null()) {
            let sorting = sorting.as_object().ok_or_else(|| {
                FilterError::invalid_filter("sorting must be an object")
            })?;
            let structured = SortSpec {
                order_by: text_value(sorting.get("order_by")),
                direction: text_value(sorting.get("direction")),
            };
            self.sort = SortSpec {
                order_by: structured.order_by.or(self.sort.order_by),
                direction: structured.direction.or(self.sort.direction),
            };
        }

        if let Some(paging) = body.get("paging").filter(|p| !p.is_null()) {
            let paging = paging.as_object().ok_or_else(|| {
                FilterError::invalid_paging("paging", "must be an object")
            })?;
            let structured = PagingSpec {
                page: json_number(paging, "page")?,
                items: json_number(paging, "items")?,
                offset: json_number(paging, "offset")?,
                limit: json_number(paging, "limit")?,
            };
            self.paging = structured.or(self.paging);
        }

        Ok(self)
    }

    /// Set the structured filter.
    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set the requested ordering.
    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    /// Set the requested paging.
    pub fn paging(mut self, paging: PagingSpec) -> Self {
        self.paging = paging;
        self
    }

    /// Set the free-text search.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Add a generic equality filter.
    pub fn generic(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.generic.insert(field.into(), value.into());
        self
    }

    /// The structured filter, if one was given.
    pub fn filter_value(&self) -> Option<&Value> {
        self.filter.as_ref()
    }

    /// Requested ordering.
    pub fn sort_spec(&self) -> &SortSpec {
        &self.sort
    }

    /// Requested paging.
    pub fn paging_spec(&self) -> &PagingSpec {
        &self.paging
    }

    /// Free-text search, if any.
    pub fn text_value(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Generic equality filters keyed by field.
    pub fn generic_filters(&self) -> &IndexMap<String, String> {
        &self.generic
    }

    /// Parameters echoed verbatim in page links.
    pub fn echoed(&self) -> &IndexMap<String, String> {
        &self.echo
    }
}

fn parse_number(parameter: &str, value: &str) -> FilterResult<i64> {
    value
        .trim()
        .parse()
        .map_err(|_| FilterError::invalid_paging(parameter, format!("'{}' is not a number", value)))
}

fn json_number(object: &serde_json::Map<String, Value>, key: &str) -> FilterResult<Option<i64>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| FilterError::invalid_paging(key, format!("'{}' is not an integer", n))),
        Some(Value::String(s)) => parse_number(key, s).map(Some),
        Some(other) => Err(FilterError::invalid_paging(
            key,
            format!("expected a number, got {}", json_type(other)),
        )),
    }
}

fn text_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Fold `filter_<field>=value` parameters into an AND of equality
/// comparisons.
///
/// Each value is coerced to the field's type. Returns `None` when there
/// are no generic filters.
pub fn compose_generic(
    generic: &IndexMap<String, String>,
    registry: &FieldRegistry,
) -> FilterResult<Option<Condition>> {
    let mut conditions = Vec::with_capacity(generic.len());
    for (field, raw) in generic {
        let spec = registry.filterable(field).ok_or_else(|| {
            let reason = if registry.get(field).is_some() {
                "is not filterable"
            } else {
                "is not a recognised field"
            };
            FilterError::invalid_field(field.as_str(), reason)
        })?;
        if !spec.allows(OperatorKind::Eq) {
            return Err(FilterError::invalid_operator(
                field.as_str(),
                OperatorKind::Eq.as_str(),
                "equality filtering is not permitted on this field",
            ));
        }
        let value = spec
            .field_type()
            .coerce(&FilterValue::String(raw.clone()))
            .map_err(|message| FilterError::invalid_value(field.as_str(), "eq", message))?;
        conditions.push(Condition::comparison(spec.name().clone(), ComparisonOp::Eq, value));
    }
    Ok(Condition::all(conditions))
}

/// Expand free text into an OR of `contains` over every text-searchable
/// field.
///
/// Blank text is ignored. Text against a resource without searchable
/// fields is rejected.
pub fn compose_text(text: &str, registry: &FieldRegistry) -> FilterResult<Option<Condition>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let conditions: Vec<_> = registry
        .text_fields()
        .map(|spec| Condition::subset(spec.name().clone(), SubsetOp::Contains(text.to_string())))
        .collect();
    if conditions.is_empty() {
        return Err(FilterError::invalid_filter(format!(
            "{} does not support text search",
            registry.resource()
        )));
    }
    Ok(Condition::any(conditions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{FieldSpec, FieldType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> FieldRegistry {
        FieldRegistry::builder("audio_events")
            .primary_key("id")
            .field(FieldSpec::new("id", FieldType::Integer))
            .field(FieldSpec::new("site_id", FieldType::Integer))
            .field(FieldSpec::new("notes", FieldType::Text).text_search())
            .field(FieldSpec::new("name", FieldType::Text).text_search())
            .build()
            .unwrap()
    }

    #[test]
    fn test_query_string() {
        let params =
            RequestParams::from_query_string("?order_by=id&direction=DESC&offset=5&limit=10&format=csv")
                .unwrap();
        assert_eq!(params.sort_spec(), &SortSpec::new("id", "DESC"));
        assert_eq!(params.paging_spec(), &PagingSpec::offset(5, 10));
        assert_eq!(params.echoed().get("format").map(String::as_str), Some("csv"));
    }

    #[test]
    fn test_non_numeric_paging() {
        let err = RequestParams::from_query_string("page=two").unwrap_err();
        assert!(matches!(err, FilterError::InvalidPaging { ref parameter, .. } if parameter == "page"));

        let err = RequestParams::new()
            .with_body(&json!({"paging": {"items": 2.5}}))
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidPaging { .. }));
    }

    #[test]
    fn test_filter_parameter_is_json() {
        let params = RequestParams::from_query_string("filter=%7B%22id%22%3A%7B%22eq%22%3A1%7D%7D")
            .unwrap();
        assert_eq!(params.filter_value(), Some(&json!({"id": {"eq": 1}})));

        assert!(RequestParams::from_query_string("filter=%7Bnope").is_err());
    }

    #[test]
    fn test_body_wins() {
        let params = RequestParams::from_query_string("order_by=id&direction=asc&page=1")
            .unwrap()
            .with_body(&json!({
                "filter": {"site_id": {"eq": 1}},
                "sorting": {"direction": "desc"},
                "paging": {"page": "4", "items": 5}
            }))
            .unwrap();
        assert_eq!(params.sort_spec(), &SortSpec::new("id", "desc"));
        assert_eq!(params.paging_spec(), &PagingSpec::page(4, 5));
        assert!(params.filter_value().is_some());
    }

    #[test]
    fn test_body_must_be_object() {
        assert!(RequestParams::new().with_body(&json!([1])).is_err());
        assert!(RequestParams::new().with_body(&Value::Null).is_ok());
    }

    #[test]
    fn test_generic_filters() {
        let mut generic = IndexMap::new();
        generic.insert("site_id".to_string(), "4".to_string());
        generic.insert("notes".to_string(), "owl".to_string());
        let condition = compose_generic(&generic, &registry()).unwrap().unwrap();
        assert_eq!(
            condition.to_json(),
            json!({"and": [{"site_id": {"eq": 4}}, {"notes": {"eq": "owl"}}]})
        );
    }

    #[test]
    fn test_generic_filter_errors() {
        let mut generic = IndexMap::new();
        generic.insert("secret".to_string(), "1".to_string());
        let err = compose_generic(&generic, &registry()).unwrap_err();
        assert_eq!(err.field(), Some("secret"));

        let mut generic = IndexMap::new();
        generic.insert("site_id".to_string(), "four".to_string());
        let err = compose_generic(&generic, &registry()).unwrap_err();
        assert!(matches!(err, FilterError::InvalidValue { .. }));
    }

    #[test]
    fn test_generic_prefix_shadows_nothing() {
        let params =
            RequestParams::from_query_string("filter_text=owl&filter_filter=1&filter_=x").unwrap();
        assert_eq!(params.text_value(), None);
        assert_eq!(params.filter_value(), None);
        let fields: Vec<_> = params.generic_filters().keys().map(String::as_str).collect();
        assert_eq!(fields, vec!["text", "filter"]);
        assert_eq!(params.echoed().get("filter_").map(String::as_str), Some("x"));

        let err = compose_generic(params.generic_filters(), &registry()).unwrap_err();
        assert_eq!(err.field(), Some("text"));
    }

    #[test]
    fn test_text_filter() {
        let condition = compose_text(" hello ", &registry()).unwrap().unwrap();
        assert_eq!(
            condition.to_json(),
            json!({"or": [{"notes": {"contains": "hello"}}, {"name": {"contains": "hello"}}]})
        );
        assert_eq!(compose_text("   ", &registry()).unwrap(), None);
    }

    #[test]
    fn test_text_without_text_fields() {
        let registry = FieldRegistry::builder("sites")
            .primary_key("id")
            .field(FieldSpec::new("id", FieldType::Integer))
            .build()
            .unwrap();
        assert!(compose_text("x", &registry).is_err());
    }
}
