//! Condition AST for parsed filters.
//!
//! A filter is a tree of three node kinds: [`Condition::Comparison`],
//! [`Condition::Subset`] and [`Condition::Combinator`]. Operators form a
//! closed set ([`OperatorKind`]); an unknown tag can never reach the tree.
//!
//! ```rust
//! use sift_query::filter::{CombinatorKind, ComparisonOp, Condition, FilterValue};
//!
//! let a = Condition::comparison("duration_seconds", ComparisonOp::Eq, FilterValue::Int(60));
//! let b = Condition::comparison("duration_seconds", ComparisonOp::Gteq, FilterValue::Int(70));
//! let either = Condition::combinator(CombinatorKind::Or, vec![a, b]).unwrap();
//! assert_eq!(either.fields().count(), 2);
//!
//! // and/or need at least two children
//! let lonely = Condition::comparison("site_id", ComparisonOp::Eq, 1.into());
//! assert!(Condition::combinator(CombinatorKind::And, vec![lonely]).is_err());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use smol_str::SmolStr;

use crate::error::{FilterError, FilterResult};

/// Field name as it appears in the request and the registry.
pub type FieldName = SmolStr;

/// A literal value bound into a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    String(String),
    /// List of values.
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if this is a single (non-list) value.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::List(_))
    }

    /// Convert a JSON value. Objects have no filter-value representation.
    pub fn from_json(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64()?),
            },
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => {
                Self::List(items.iter().map(Self::from_json).collect::<Option<_>>()?)
            }
            Value::Object(_) => return None,
        })
    }

    /// Convert back to JSON.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => json!(i),
            Self::Float(f) => json!(f),
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    /// Short name of the value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
        }
    }
}

impl fmt::Display for FilterValue {
    /// Renders the value as an inline SQL literal (diagnostics only).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
        }
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

/// Every operator a filter may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    /// Equal.
    Eq,
    /// Not equal.
    NotEq,
    /// Less than.
    Lt,
    /// Greater than.
    Gt,
    /// Less than or equal.
    Lteq,
    /// Greater than or equal.
    Gteq,
    /// Substring match.
    Contains,
    /// Prefix match.
    StartsWith,
    /// Suffix match.
    EndsWith,
    /// Set membership.
    In,
    /// Interval membership.
    Range,
}

impl OperatorKind {
    /// All operators, in canonical order.
    pub const ALL: [OperatorKind; 11] = [
        Self::Eq,
        Self::NotEq,
        Self::Lt,
        Self::Gt,
        Self::Lteq,
        Self::Gteq,
        Self::Contains,
        Self::StartsWith,
        Self::EndsWith,
        Self::In,
        Self::Range,
    ];

    /// Resolve a canonical tag or one of its aliases.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "eq" | "equal" => Self::Eq,
            "not_eq" | "not_equal" => Self::NotEq,
            "lt" | "less_than" => Self::Lt,
            "gt" | "greater_than" => Self::Gt,
            "lteq" | "less_than_or_equal" => Self::Lteq,
            "gteq" | "greater_than_or_equal" => Self::Gteq,
            "contains" | "contain" => Self::Contains,
            "starts_with" | "start_with" => Self::StartsWith,
            "ends_with" | "end_with" => Self::EndsWith,
            "in" => Self::In,
            "range" | "in_range" => Self::Range,
            _ => return None,
        })
    }

    /// Canonical tag.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::NotEq => "not_eq",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Lteq => "lteq",
            Self::Gteq => "gteq",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::In => "in",
            Self::Range => "range",
        }
    }

    /// Whether the operator builds a [`Condition::Comparison`].
    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Lt | Self::Gt | Self::Lteq | Self::Gteq
        )
    }

    /// Whether the operator is a pattern match over text.
    pub const fn is_pattern(&self) -> bool {
        matches!(self, Self::Contains | Self::StartsWith | Self::EndsWith)
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Lteq,
    /// `>=`
    Gteq,
}

impl ComparisonOp {
    /// The operator kind this comparison was parsed from.
    pub const fn kind(&self) -> OperatorKind {
        match self {
            Self::Eq => OperatorKind::Eq,
            Self::NotEq => OperatorKind::NotEq,
            Self::Lt => OperatorKind::Lt,
            Self::Gt => OperatorKind::Gt,
            Self::Lteq => OperatorKind::Lteq,
            Self::Gteq => OperatorKind::Gteq,
        }
    }

    /// Map a comparison operator kind; `None` for subset kinds.
    pub const fn from_kind(kind: OperatorKind) -> Option<Self> {
        match kind {
            OperatorKind::Eq => Some(Self::Eq),
            OperatorKind::NotEq => Some(Self::NotEq),
            OperatorKind::Lt => Some(Self::Lt),
            OperatorKind::Gt => Some(Self::Gt),
            OperatorKind::Lteq => Some(Self::Lteq),
            OperatorKind::Gteq => Some(Self::Gteq),
            _ => None,
        }
    }
}

/// Interval bounds: `from` is always inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeBounds {
    /// Inclusive lower bound.
    pub from: FilterValue,
    /// Upper bound.
    pub to: FilterValue,
    /// Whether `to` is part of the interval (`[a,b]` rather than `[a,b)`).
    pub to_inclusive: bool,
}

impl RangeBounds {
    /// Half-open `[from, to)`.
    pub fn half_open(from: impl Into<FilterValue>, to: impl Into<FilterValue>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            to_inclusive: false,
        }
    }

    /// Closed `[from, to]`.
    pub fn closed(from: impl Into<FilterValue>, to: impl Into<FilterValue>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            to_inclusive: true,
        }
    }
}

/// Subset operators with their operands.
#[derive(Debug, Clone, PartialEq)]
pub enum SubsetOp {
    /// Value occurs anywhere in the field.
    Contains(String),
    /// Field starts with the value.
    StartsWith(String),
    /// Field ends with the value.
    EndsWith(String),
    /// Field is one of the (non-empty) values.
    In(Vec<FilterValue>),
    /// Field lies in the interval.
    Range(RangeBounds),
}

impl SubsetOp {
    /// The operator kind this subset was parsed from.
    pub const fn kind(&self) -> OperatorKind {
        match self {
            Self::Contains(_) => OperatorKind::Contains,
            Self::StartsWith(_) => OperatorKind::StartsWith,
            Self::EndsWith(_) => OperatorKind::EndsWith,
            Self::In(_) => OperatorKind::In,
            Self::Range(_) => OperatorKind::Range,
        }
    }
}

/// Boolean combinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinatorKind {
    /// All children hold.
    And,
    /// At least one child holds.
    Or,
    /// Every child is negated, then the negations are AND-ed.
    Not,
}

impl CombinatorKind {
    /// Resolve a combinator key.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "and" => Some(Self::And),
            "or" => Some(Self::Or),
            "not" => Some(Self::Not),
            _ => None,
        }
    }

    /// The key used in filter maps.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
        }
    }

    /// Minimum number of children.
    pub const fn min_children(&self) -> usize {
        match self {
            Self::And | Self::Or => 2,
            Self::Not => 1,
        }
    }
}

impl fmt::Display for CombinatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `field op value`.
    Comparison {
        /// Registered field.
        field: FieldName,
        /// Operator.
        op: ComparisonOp,
        /// Operand.
        value: FilterValue,
    },
    /// `field` matched against a pattern, set or interval.
    Subset {
        /// Registered field.
        field: FieldName,
        /// Operator with its operand.
        op: SubsetOp,
    },
    /// Ordered group of child conditions.
    ///
    /// Prefer [`Condition::combinator`]; a hand-built node with too few
    /// children is rejected by [`compile`](crate::compiler::compile).
    Combinator {
        /// How the children combine.
        kind: CombinatorKind,
        /// Children, in request order.
        children: Vec<Condition>,
    },
}

impl Condition {
    /// Create a comparison node.
    pub fn comparison(field: impl Into<FieldName>, op: ComparisonOp, value: FilterValue) -> Self {
        Self::Comparison {
            field: field.into(),
            op,
            value,
        }
    }

    /// Create a subset node.
    pub fn subset(field: impl Into<FieldName>, op: SubsetOp) -> Self {
        Self::Subset {
            field: field.into(),
            op,
        }
    }

    /// Create a combinator node, enforcing its arity.
    pub fn combinator(kind: CombinatorKind, children: Vec<Condition>) -> FilterResult<Self> {
        if children.len() < kind.min_children() {
            return Err(FilterError::arity(
                kind.as_str(),
                kind.min_children(),
                children.len(),
            ));
        }
        Ok(Self::Combinator { kind, children })
    }

    /// Negate a single condition.
    pub fn negate(condition: Condition) -> Self {
        Self::Combinator {
            kind: CombinatorKind::Not,
            children: vec![condition],
        }
    }

    /// AND together whatever conditions are present.
    ///
    /// Returns `None` for no input and the condition itself for one; nested
    /// AND nodes are flattened into the result.
    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Option<Self> {
        let mut children = Vec::new();
        for condition in conditions {
            match condition {
                Self::Combinator {
                    kind: CombinatorKind::And,
                    children: nested,
                } => children.extend(nested),
                other => children.push(other),
            }
        }
        Self::collapse(CombinatorKind::And, children)
    }

    /// OR together whatever conditions are present.
    ///
    /// Returns `None` for no input and the condition itself for one.
    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Option<Self> {
        Self::collapse(CombinatorKind::Or, conditions.into_iter().collect())
    }

    fn collapse(kind: CombinatorKind, mut children: Vec<Condition>) -> Option<Self> {
        match children.len() {
            0 => None,
            1 => children.pop(),
            _ => Some(Self::Combinator { kind, children }),
        }
    }

    /// Operator kind of a leaf node; `None` for combinators.
    pub fn operator(&self) -> Option<OperatorKind> {
        match self {
            Self::Comparison { op, .. } => Some(op.kind()),
            Self::Subset { op, .. } => Some(op.kind()),
            Self::Combinator { .. } => None,
        }
    }

    /// Every field referenced anywhere in the tree, depth first.
    pub fn fields(&self) -> impl Iterator<Item = &FieldName> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out.into_iter()
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a FieldName>) {
        match self {
            Self::Comparison { field, .. } | Self::Subset { field, .. } => out.push(field),
            Self::Combinator { children, .. } => {
                for child in children {
                    child.collect_fields(out);
                }
            }
        }
    }

    /// Depth of the tree (a leaf has depth 1).
    pub fn depth(&self) -> usize {
        match self {
            Self::Combinator { children, .. } => {
                1 + children.iter().map(Self::depth).max().unwrap_or(0)
            }
            _ => 1,
        }
    }

    /// Render the tree back into the filter grammar, with canonical
    /// operator tags and coerced values.
    ///
    /// Feeding the output back through the parser yields an equal tree.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Comparison { field, op, value } => {
                leaf_json(field, op.kind(), value.to_json())
            }
            Self::Subset { field, op } => {
                let operand = match op {
                    SubsetOp::Contains(s) | SubsetOp::StartsWith(s) | SubsetOp::EndsWith(s) => {
                        Value::String(s.clone())
                    }
                    SubsetOp::In(values) => {
                        Value::Array(values.iter().map(FilterValue::to_json).collect())
                    }
                    SubsetOp::Range(bounds) if bounds.to_inclusive => {
                        json!({ "interval": format!("[{},{}]", raw(&bounds.from), raw(&bounds.to)) })
                    }
                    SubsetOp::Range(bounds) => {
                        json!({ "from": bounds.from.to_json(), "to": bounds.to.to_json() })
                    }
                };
                leaf_json(field, op.kind(), operand)
            }
            Self::Combinator { kind, children } => {
                let mut map = Map::new();
                map.insert(
                    kind.as_str().to_string(),
                    Value::Array(children.iter().map(Self::to_json).collect()),
                );
                Value::Object(map)
            }
        }
    }
}

fn leaf_json(field: &str, op: OperatorKind, operand: Value) -> Value {
    let mut ops = Map::new();
    ops.insert(op.as_str().to_string(), operand);
    let mut map = Map::new();
    map.insert(field.to_string(), Value::Object(ops));
    Value::Object(map)
}

/// Unquoted rendering used inside interval strings.
fn raw(value: &FilterValue) -> String {
    match value {
        FilterValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_filter_value_from() {
        assert_eq!(FilterValue::from(42i32), FilterValue::Int(42));
        assert_eq!(FilterValue::from("hello"), FilterValue::String("hello".to_string()));
        assert_eq!(FilterValue::from(true), FilterValue::Bool(true));
    }

    #[test]
    fn test_filter_value_from_json() {
        assert_eq!(FilterValue::from_json(&json!(7)), Some(FilterValue::Int(7)));
        assert_eq!(FilterValue::from_json(&json!(1.5)), Some(FilterValue::Float(1.5)));
        assert_eq!(
            FilterValue::from_json(&json!([1, "a"])),
            Some(FilterValue::List(vec![1.into(), "a".into()]))
        );
        assert_eq!(FilterValue::from_json(&json!({"a": 1})), None);
    }

    #[test]
    fn test_filter_value_display_escapes_quotes() {
        assert_eq!(FilterValue::from("o'clock").to_string(), "'o''clock'");
        assert_eq!(FilterValue::from(vec![1, 2, 3]).to_string(), "(1, 2, 3)");
    }

    #[test]
    fn test_operator_aliases() {
        assert_eq!(OperatorKind::from_tag("equal"), Some(OperatorKind::Eq));
        assert_eq!(OperatorKind::from_tag("in_range"), Some(OperatorKind::Range));
        assert_eq!(OperatorKind::from_tag("greater_than_or_equal"), Some(OperatorKind::Gteq));
        assert_eq!(OperatorKind::from_tag("regex"), None);
        for op in OperatorKind::ALL {
            assert_eq!(OperatorKind::from_tag(op.as_str()), Some(op));
        }
    }

    #[test]
    fn test_combinator_arity() {
        let leaf = Condition::comparison("a", ComparisonOp::Eq, 1.into());
        let err = Condition::combinator(CombinatorKind::Or, vec![leaf.clone()]).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::InvalidCombinatorArity);
        assert!(Condition::combinator(CombinatorKind::Not, vec![leaf.clone()]).is_ok());
        assert!(Condition::combinator(CombinatorKind::Not, vec![]).is_err());
    }

    #[test]
    fn test_all_collapses_and_flattens() {
        let a = Condition::comparison("a", ComparisonOp::Eq, 1.into());
        let b = Condition::comparison("b", ComparisonOp::Eq, 2.into());
        let c = Condition::comparison("c", ComparisonOp::Eq, 3.into());

        assert_eq!(Condition::all(Vec::new()), None);
        assert_eq!(Condition::all([a.clone()]), Some(a.clone()));

        let ab = Condition::all([a.clone(), b.clone()]).unwrap();
        let abc = Condition::all([ab, c.clone()]).unwrap();
        assert_eq!(
            abc,
            Condition::Combinator {
                kind: CombinatorKind::And,
                children: vec![a, b, c],
            }
        );
    }

    #[test]
    fn test_fields_and_depth() {
        let tree = Condition::Combinator {
            kind: CombinatorKind::Or,
            children: vec![
                Condition::comparison("a", ComparisonOp::Eq, 1.into()),
                Condition::negate(Condition::subset("b", SubsetOp::In(vec![1.into()]))),
            ],
        };
        let fields: Vec<_> = tree.fields().map(|f| f.as_str()).collect();
        assert_eq!(fields, vec!["a", "b"]);
        assert_eq!(tree.depth(), 3);
    }

    #[test]
    fn test_to_json_canonical() {
        let tree = Condition::Combinator {
            kind: CombinatorKind::And,
            children: vec![
                Condition::subset("duration", SubsetOp::Range(RangeBounds::closed(1, 5))),
                Condition::subset("duration", SubsetOp::Range(RangeBounds::half_open(1, 5))),
            ],
        };
        assert_eq!(
            tree.to_json(),
            json!({"and": [
                {"duration": {"range": {"interval": "[1,5]"}}},
                {"duration": {"range": {"from": 1, "to": 5}}}
            ]})
        );
    }
}
