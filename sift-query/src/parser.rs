//! Recursive-descent parser from a nested filter map to a [`Condition`].
//!
//! Grammar, informally:
//!
//! ```text
//! filter     := { entry, ... }                      entries are AND-ed
//! entry      := field: { operator: operand, ... }   operators are AND-ed
//!             | "and" | "or": [filter, filter, ...] | { entry, entry, ... }
//!             | "not": filter | [filter, ...]       each condition negated, then AND-ed
//! operand    := scalar                              eq not_eq lt gt lteq gteq
//!             | text                                contains starts_with ends_with
//!             | [scalar, ...]                       in (non-empty)
//!             | { "from": a, "to": b }              range, [a, b)
//!             | { "interval": "[a,b)" | "[a,b]" }  range
//! ```
//!
//! Parsing is atomic: the first violation aborts with a typed error naming
//! the offending field or operator, and no partial tree escapes.
//!
//! ```rust
//! use serde_json::json;
//! use sift_query::parser::parse;
//! use sift_query::registry::{FieldRegistry, FieldSpec, FieldType};
//!
//! let registry = FieldRegistry::builder("audio_events")
//!     .primary_key("id")
//!     .field(FieldSpec::new("id", FieldType::Integer))
//!     .field(FieldSpec::new("site_id", FieldType::Integer))
//!     .build()
//!     .unwrap();
//!
//! let condition = parse(&json!({"site_id": {"in": [1, 2, 3]}}), &registry).unwrap();
//! assert_eq!(condition.to_json(), json!({"site_id": {"in": [1, 2, 3]}}));
//!
//! let err = parse(&json!({"secret_field": {"eq": 1}}), &registry).unwrap_err();
//! assert_eq!(err.field(), Some("secret_field"));
//! ```

use std::sync::OnceLock;

use regex_lite::Regex;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::{FilterError, FilterResult};
use crate::filter::{
    CombinatorKind, ComparisonOp, Condition, FilterValue, OperatorKind, RangeBounds, SubsetOp,
};
use crate::registry::{FieldRegistry, FieldSpec, FieldType};

/// Deepest combinator nesting accepted.
pub const MAX_DEPTH: usize = 32;

/// Parse `raw` against `registry`.
pub fn parse(raw: &Value, registry: &FieldRegistry) -> FilterResult<Condition> {
    FilterParser::new(registry).parse(raw)
}

fn interval_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\[(.*),(.*)(\)|\])$").unwrap())
}

/// Parser bound to one resource's registry.
#[derive(Debug, Clone, Copy)]
pub struct FilterParser<'r> {
    registry: &'r FieldRegistry,
}

impl<'r> FilterParser<'r> {
    /// Create a parser for `registry`.
    pub fn new(registry: &'r FieldRegistry) -> Self {
        Self { registry }
    }

    /// Parse a complete filter. An empty map is rejected: callers with
    /// nothing to filter should not call the parser at all.
    pub fn parse(&self, raw: &Value) -> FilterResult<Condition> {
        let map = raw
            .as_object()
            .ok_or_else(|| FilterError::invalid_filter("filter must be a map"))?;
        debug!(resource = %self.registry.resource(), keys = map.len(), "Parsing filter");

        let conditions = self.parse_map(map, 1)?;
        let condition = Condition::all(conditions).ok_or_else(|| {
            FilterError::invalid_filter("filter must contain at least one condition")
        })?;

        debug!(
            resource = %self.registry.resource(),
            depth = condition.depth(),
            "Parsed filter"
        );
        Ok(condition)
    }

    fn parse_map(&self, map: &Map<String, Value>, depth: usize) -> FilterResult<Vec<Condition>> {
        if depth > MAX_DEPTH {
            return Err(FilterError::invalid_filter(format!(
                "filter is nested deeper than {} levels",
                MAX_DEPTH
            )));
        }

        let mut conditions = Vec::with_capacity(map.len());
        for (key, value) in map {
            match CombinatorKind::from_key(key) {
                Some(kind) => conditions.push(self.parse_combinator(kind, value, depth)?),
                None => conditions.extend(self.parse_field(key, value)?),
            }
        }
        Ok(conditions)
    }

    fn parse_combinator(
        &self,
        kind: CombinatorKind,
        value: &Value,
        depth: usize,
    ) -> FilterResult<Condition> {
        let children = match value {
            Value::Array(items) => {
                let mut children = Vec::with_capacity(items.len());
                for item in items {
                    let map = item.as_object().ok_or_else(|| {
                        FilterError::invalid_filter(format!(
                            "`{}` entries must be filter maps",
                            kind
                        ))
                    })?;
                    let conditions = self.parse_map(map, depth + 1)?;
                    match kind {
                        CombinatorKind::Not => children.extend(conditions),
                        CombinatorKind::And | CombinatorKind::Or => {
                            children.push(Condition::all(conditions).ok_or_else(|| {
                                FilterError::invalid_filter(format!(
                                    "`{}` entries must not be empty",
                                    kind
                                ))
                            })?)
                        }
                    }
                }
                children
            }
            Value::Object(map) => self.parse_map(map, depth + 1)?,
            _ => {
                return Err(FilterError::invalid_filter(format!(
                    "`{}` must hold a filter map or a list of filter maps",
                    kind
                )));
            }
        };

        trace!(combinator = %kind, children = children.len(), "Built combinator");
        Condition::combinator(kind, children)
    }

    fn parse_field(&self, name: &str, value: &Value) -> FilterResult<Vec<Condition>> {
        let spec = self.registry.filterable(name).ok_or_else(|| {
            let reason = if self.registry.get(name).is_some() {
                "is not filterable"
            } else {
                "is not a recognised field"
            };
            FilterError::invalid_field(name, reason)
        })?;

        let operations = value.as_object().ok_or_else(|| {
            FilterError::invalid_filter(format!(
                "field `{}` must map to operators, e.g. {{\"eq\": value}}",
                name
            ))
        })?;
        if operations.is_empty() {
            return Err(FilterError::invalid_filter(format!(
                "field `{}` names no operator",
                name
            )));
        }

        operations
            .iter()
            .map(|(tag, operand)| self.parse_operation(spec, tag, operand))
            .collect()
    }

    fn parse_operation(
        &self,
        spec: &FieldSpec,
        tag: &str,
        operand: &Value,
    ) -> FilterResult<Condition> {
        let field = spec.name();
        let (kind, negated) = resolve_operator(field, tag)?;
        if !spec.allows(kind) {
            return Err(FilterError::invalid_operator(
                field.as_str(),
                tag,
                format!("not permitted on {} field", spec.field_type()),
            ));
        }

        let condition = match ComparisonOp::from_kind(kind) {
            Some(op) => Condition::comparison(field.clone(), op, comparison_value(spec, tag, op, operand)?),
            None => Condition::subset(field.clone(), subset_op(spec, tag, kind, operand)?),
        };
        trace!(field = %field, op = %kind, negated, "Built condition");

        Ok(if negated {
            Condition::negate(condition)
        } else {
            condition
        })
    }
}

/// Resolve a tag into its operator and whether it is the `not_` form of a
/// subset operator.
fn resolve_operator(field: &str, tag: &str) -> FilterResult<(OperatorKind, bool)> {
    if let Some(kind) = OperatorKind::from_tag(tag) {
        return Ok((kind, false));
    }
    tag.strip_prefix("not_")
        .and_then(OperatorKind::from_tag)
        .filter(|kind| !kind.is_comparison())
        .map(|kind| (kind, true))
        .ok_or_else(|| FilterError::invalid_operator(field, tag, "unknown operator"))
}

fn scalar(spec: &FieldSpec, tag: &str, operand: &Value) -> FilterResult<FilterValue> {
    match FilterValue::from_json(operand) {
        Some(value) if value.is_scalar() => spec
            .field_type()
            .coerce(&value)
            .map_err(|message| FilterError::invalid_value(spec.name().as_str(), tag, message)),
        Some(_) => Err(FilterError::invalid_value(
            spec.name().as_str(),
            tag,
            "expected a single value, got a list",
        )),
        None => Err(FilterError::invalid_value(
            spec.name().as_str(),
            tag,
            "expected a single value, got a map",
        )),
    }
}

fn non_null(spec: &FieldSpec, tag: &str, operand: &Value) -> FilterResult<FilterValue> {
    let value = scalar(spec, tag, operand)?;
    if value.is_null() {
        return Err(FilterError::invalid_value(
            spec.name().as_str(),
            tag,
            "null is not allowed here",
        ));
    }
    Ok(value)
}

fn comparison_value(
    spec: &FieldSpec,
    tag: &str,
    op: ComparisonOp,
    operand: &Value,
) -> FilterResult<FilterValue> {
    match op {
        ComparisonOp::Eq | ComparisonOp::NotEq => scalar(spec, tag, operand),
        _ => non_null(spec, tag, operand),
    }
}

fn subset_op(
    spec: &FieldSpec,
    tag: &str,
    kind: OperatorKind,
    operand: &Value,
) -> FilterResult<SubsetOp> {
    let field = spec.name().as_str();
    match kind {
        OperatorKind::Contains | OperatorKind::StartsWith | OperatorKind::EndsWith => {
            let text = match FieldType::Text.coerce(&non_null(spec, tag, operand)?) {
                Ok(FilterValue::String(text)) if !text.is_empty() => text,
                _ => {
                    return Err(FilterError::invalid_value(
                        field,
                        tag,
                        "expected non-empty text",
                    ));
                }
            };
            Ok(match kind {
                OperatorKind::Contains => SubsetOp::Contains(text),
                OperatorKind::StartsWith => SubsetOp::StartsWith(text),
                _ => SubsetOp::EndsWith(text),
            })
        }
        OperatorKind::In => {
            let items = operand.as_array().ok_or_else(|| {
                FilterError::invalid_value(field, tag, "expected a list of values")
            })?;
            if items.is_empty() {
                return Err(FilterError::invalid_value(field, tag, "list must not be empty"));
            }
            items
                .iter()
                .map(|item| non_null(spec, tag, item))
                .collect::<FilterResult<Vec<_>>>()
                .map(SubsetOp::In)
        }
        OperatorKind::Range => range_bounds(spec, tag, operand).map(SubsetOp::Range),
        // comparison kinds never reach here
        _ => Err(FilterError::invalid_operator(field, tag, "not a subset operator")),
    }
}

fn range_bounds(spec: &FieldSpec, tag: &str, operand: &Value) -> FilterResult<RangeBounds> {
    let field = spec.name().as_str();
    let map = operand.as_object().ok_or_else(|| {
        FilterError::invalid_range(field, "expected a map with `from`/`to` or `interval`")
    })?;

    let has_bounds = map.contains_key("from") || map.contains_key("to");
    let interval = map.get("interval");
    if let Some(unknown) = map
        .keys()
        .find(|k| !matches!(k.as_str(), "from" | "to" | "interval"))
    {
        return Err(FilterError::invalid_range(
            field,
            format!("unexpected key `{}`", unknown),
        ));
    }

    let bounds = match (has_bounds, interval) {
        (true, Some(_)) => {
            return Err(FilterError::invalid_range(
                field,
                "give either `from`/`to` or `interval`, not both",
            ));
        }
        (false, None) => {
            return Err(FilterError::invalid_range(
                field,
                "expected `from`/`to` or `interval`",
            ));
        }
        (true, None) => match (map.get("from"), map.get("to")) {
            (Some(from), Some(to)) => RangeBounds {
                from: non_null(spec, tag, from)?,
                to: non_null(spec, tag, to)?,
                to_inclusive: false,
            },
            _ => {
                return Err(FilterError::invalid_range(
                    field,
                    "`from` and `to` must both be given",
                ));
            }
        },
        (false, Some(interval)) => parse_interval(spec, tag, interval)?,
    };

    if let Some(std::cmp::Ordering::Greater) = compare(&bounds.from, &bounds.to) {
        return Err(FilterError::invalid_range(
            field,
            "lower bound is greater than upper bound",
        ));
    }
    Ok(bounds)
}

fn parse_interval(spec: &FieldSpec, tag: &str, interval: &Value) -> FilterResult<RangeBounds> {
    let field = spec.name().as_str();
    let text = interval
        .as_str()
        .ok_or_else(|| FilterError::invalid_range(field, "`interval` must be a string"))?;
    let captures = interval_pattern().captures(text.trim()).ok_or_else(|| {
        FilterError::invalid_range(
            field,
            format!("malformed interval `{}`, expected `[a,b)` or `[a,b]`", text),
        )
    })?;

    let bound = |index: usize, side: &str| -> FilterResult<FilterValue> {
        let raw = captures.get(index).map_or("", |m| m.as_str()).trim();
        if raw.is_empty() {
            return Err(FilterError::invalid_range(
                field,
                format!("interval `{}` is missing a bound", text),
            ));
        }
        non_null(spec, tag, &Value::String(raw.to_string())).map_err(|_| {
            FilterError::invalid_range(
                field,
                format!(
                    "interval `{}` has an invalid {} bound `{}` for a {} field",
                    text,
                    side,
                    raw,
                    spec.field_type()
                ),
            )
        })
    };

    Ok(RangeBounds {
        from: bound(1, "lower")?,
        to: bound(2, "upper")?,
        to_inclusive: captures.get(3).is_some_and(|m| m.as_str() == "]"),
    })
}

/// Order two bound values when they are directly comparable.
fn compare(a: &FilterValue, b: &FilterValue) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (FilterValue::Int(a), FilterValue::Int(b)) => Some(a.cmp(b)),
        (FilterValue::Int(a), FilterValue::Float(b)) => (*a as f64).partial_cmp(b),
        (FilterValue::Float(a), FilterValue::Int(b)) => a.partial_cmp(&(*b as f64)),
        (FilterValue::Float(a), FilterValue::Float(b)) => a.partial_cmp(b),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> FieldRegistry {
        FieldRegistry::builder("audio_events")
            .primary_key("id")
            .field(FieldSpec::new("id", FieldType::Integer).sortable())
            .field(FieldSpec::new("site_id", FieldType::Integer))
            .field(FieldSpec::new("duration_seconds", FieldType::Float))
            .field(FieldSpec::new("notes", FieldType::Text).text_search())
            .field(FieldSpec::new("is_reference", FieldType::Boolean))
            .field(FieldSpec::new("hidden", FieldType::Text).not_filterable())
            .build()
            .unwrap()
    }

    fn parse_ok(raw: Value) -> Condition {
        parse(&raw, &registry()).unwrap()
    }

    fn parse_err(raw: Value) -> FilterError {
        parse(&raw, &registry()).unwrap_err()
    }

    #[test]
    fn test_in() {
        assert_eq!(
            parse_ok(json!({"site_id": {"in": [1, 2, 3]}})),
            Condition::subset("site_id", SubsetOp::In(vec![1.into(), 2.into(), 3.into()]))
        );
    }

    #[test]
    fn test_multiple_operators_are_anded() {
        let condition = parse_ok(json!({"site_id": {"gteq": 1, "lt": 10}}));
        match condition {
            Condition::Combinator { kind, children } => {
                assert_eq!(kind, CombinatorKind::And);
                assert_eq!(children.len(), 2);
            }
            other => panic!("expected combinator, got {:?}", other),
        }
    }

    #[test]
    fn test_or_array() {
        let condition = parse_ok(json!({"or": [
            {"duration_seconds": {"eq": 60}},
            {"duration_seconds": {"gteq": 70}}
        ]}));
        assert_eq!(
            condition,
            Condition::Combinator {
                kind: CombinatorKind::Or,
                children: vec![
                    Condition::comparison("duration_seconds", ComparisonOp::Eq, 60.into()),
                    Condition::comparison("duration_seconds", ComparisonOp::Gteq, 70.into()),
                ],
            }
        );
    }

    #[test]
    fn test_or_map_form() {
        let condition = parse_ok(json!({"or": {"site_id": {"eq": 1}, "notes": {"eq": "x"}}}));
        assert!(matches!(
            condition,
            Condition::Combinator { kind: CombinatorKind::Or, ref children } if children.len() == 2
        ));
    }

    #[test]
    fn test_single_element_and_is_rejected() {
        let err = parse_err(json!({"and": [{"site_id": {"eq": 1}}]}));
        assert_eq!(err.code(), ErrorCode::InvalidCombinatorArity);
        assert_eq!(err.operator(), Some("and"));
    }

    #[test]
    fn test_not_negates_each_condition() {
        let condition = parse_ok(json!({"not": {"site_id": {"eq": 1}, "notes": {"eq": "x"}}}));
        assert_eq!(
            condition,
            Condition::Combinator {
                kind: CombinatorKind::Not,
                children: vec![
                    Condition::comparison("notes", ComparisonOp::Eq, "x".into()),
                    Condition::comparison("site_id", ComparisonOp::Eq, 1.into()),
                ],
            }
        );
    }

    #[test]
    fn test_negated_subset_alias() {
        assert_eq!(
            parse_ok(json!({"site_id": {"not_in": [4]}})),
            Condition::negate(Condition::subset("site_id", SubsetOp::In(vec![4.into()])))
        );
        let err = parse_err(json!({"site_id": {"not_lt": 4}}));
        assert_eq!(err.code(), ErrorCode::InvalidOperator);
    }

    #[test]
    fn test_operator_aliases() {
        assert_eq!(
            parse_ok(json!({"site_id": {"greater_than": "5"}})),
            Condition::comparison("site_id", ComparisonOp::Gt, 5.into())
        );
    }

    #[test]
    fn test_range_forms_agree() {
        let a = parse_ok(json!({"site_id": {"range": {"from": 100, "to": 200}}}));
        let b = parse_ok(json!({"site_id": {"range": {"interval": "[100,200)"}}}));
        assert_eq!(a, b);

        let closed = parse_ok(json!({"site_id": {"range": {"interval": "[100, 200]"}}}));
        assert_eq!(
            closed,
            Condition::subset("site_id", SubsetOp::Range(RangeBounds::closed(100, 200)))
        );
    }

    #[test]
    fn test_range_errors() {
        for raw in [
            json!({"site_id": {"range": {"from": 1, "to": 2, "interval": "[1,2)"}}}),
            json!({"site_id": {"range": {}}}),
            json!({"site_id": {"range": {"from": 1}}}),
            json!({"site_id": {"range": {"interval": "(1,2)"}}}),
            json!({"site_id": {"range": {"interval": "[,2)"}}}),
            json!({"site_id": {"range": {"from": 5, "to": 1}}}),
            json!({"site_id": {"range": [1, 2]}}),
            json!({"site_id": {"range": {"interval": "[1,2,3)"}}}),
            json!({"site_id": {"range": {"interval": "[a,b)"}}}),
        ] {
            assert_eq!(parse_err(raw).code(), ErrorCode::InvalidRange);
        }
    }

    #[test]
    fn test_interval_bound_is_named() {
        let err = parse_err(json!({"site_id": {"range": {"interval": "[1,b]"}}}));
        assert_eq!(err.code(), ErrorCode::InvalidRange);
        assert_eq!(err.field(), Some("site_id"));
        assert!(err.to_string().contains("upper bound `b`"), "{}", err);

        let err = parse_err(json!({"site_id": {"range": {"interval": "[1,2,3)"}}}));
        assert!(err.to_string().contains("lower bound `1,2`"), "{}", err);
    }

    #[test]
    fn test_unknown_field() {
        let err = parse_err(json!({"secret_field": {"eq": 1}}));
        assert_eq!(err.code(), ErrorCode::InvalidField);
        assert_eq!(err.field(), Some("secret_field"));

        let err = parse_err(json!({"hidden": {"eq": "x"}}));
        assert!(err.to_string().contains("is not filterable"));
    }

    #[test]
    fn test_unknown_or_disallowed_operator() {
        let err = parse_err(json!({"site_id": {"regex": "1.*"}}));
        assert_eq!(err.code(), ErrorCode::InvalidOperator);
        assert_eq!(err.operator(), Some("regex"));

        let err = parse_err(json!({"site_id": {"contains": "1"}}));
        assert_eq!(err.code(), ErrorCode::InvalidOperator);
    }

    #[test]
    fn test_scalar_field_is_rejected() {
        assert_eq!(parse_err(json!({"site_id": 1})).code(), ErrorCode::InvalidFilter);
        assert_eq!(parse_err(json!({"site_id": {}})).code(), ErrorCode::InvalidFilter);
    }

    #[test]
    fn test_value_errors() {
        assert_eq!(parse_err(json!({"site_id": {"eq": [1, 2]}})).code(), ErrorCode::InvalidValue);
        assert_eq!(parse_err(json!({"site_id": {"in": []}})).code(), ErrorCode::InvalidValue);
        assert_eq!(parse_err(json!({"site_id": {"in": 3}})).code(), ErrorCode::InvalidValue);
        assert_eq!(parse_err(json!({"site_id": {"eq": "abc"}})).code(), ErrorCode::InvalidValue);
        assert_eq!(parse_err(json!({"site_id": {"lt": null}})).code(), ErrorCode::InvalidValue);
        assert_eq!(parse_err(json!({"notes": {"contains": ""}})).code(), ErrorCode::InvalidValue);
    }

    #[test]
    fn test_null_equality_is_allowed() {
        assert_eq!(
            parse_ok(json!({"notes": {"eq": null}})),
            Condition::comparison("notes", ComparisonOp::Eq, FilterValue::Null)
        );
    }

    #[test]
    fn test_structural_errors() {
        assert_eq!(parse_err(json!([1, 2])).code(), ErrorCode::InvalidFilter);
        assert_eq!(parse_err(json!({})).code(), ErrorCode::InvalidFilter);
        assert_eq!(parse_err(json!({"or": 5})).code(), ErrorCode::InvalidFilter);
        assert_eq!(parse_err(json!({"or": [1, 2]})).code(), ErrorCode::InvalidFilter);
    }

    #[test]
    fn test_depth_limit() {
        let mut raw = json!({"site_id": {"eq": 1}});
        for _ in 0..MAX_DEPTH + 1 {
            raw = json!({"not": raw});
        }
        assert_eq!(parse_err(raw).code(), ErrorCode::InvalidFilter);
    }

    #[test]
    fn test_error_in_nested_branch_fails_whole_parse() {
        let err = parse_err(json!({"or": [
            {"site_id": {"eq": 1}},
            {"and": [{"site_id": {"eq": 2}}, {"nope": {"eq": 3}}]}
        ]}));
        assert_eq!(err.field(), Some("nope"));
    }

    #[test]
    fn test_echo_reparses_to_same_tree() {
        let condition = parse_ok(json!({
            "site_id": {"not_in": [1, 2]},
            "or": [
                {"duration_seconds": {"range": {"interval": "[1.5,3]"}}},
                {"notes": {"starts_with": "bird"}}
            ]
        }));
        assert_eq!(parse_ok(condition.to_json()), condition);
    }
}
