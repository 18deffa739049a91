//! Compiles a [`Condition`] into a backend [`Predicate`].
//!
//! Values never touch the SQL text: every operand becomes a bound parameter,
//! and pattern operands are `LIKE`-escaped before wildcards are added.
//! Compilation is pure, so the same tree always yields the same predicate.
//!
//! ```rust
//! use serde_json::json;
//! use sift_query::compiler::{compile, TableHandle};
//! use sift_query::parser::parse;
//! use sift_query::registry::{FieldRegistry, FieldSpec, FieldType};
//! use sift_query::sql::DatabaseType;
//!
//! let registry = FieldRegistry::builder("audio_events")
//!     .primary_key("id")
//!     .field(FieldSpec::new("id", FieldType::Integer))
//!     .field(FieldSpec::new("duration_seconds", FieldType::Integer))
//!     .build()
//!     .unwrap();
//!
//! let ast = parse(
//!     &json!({"or": [{"duration_seconds": {"eq": 60}}, {"duration_seconds": {"gteq": 70}}]}),
//!     &registry,
//! ).unwrap();
//! let predicate = compile(&ast, &TableHandle::new(&registry)).unwrap();
//!
//! assert_eq!(
//!     predicate.to_string(),
//!     "(duration_seconds = 60) OR (duration_seconds >= 70)"
//! );
//! let (sql, params) = predicate.to_sql(DatabaseType::PostgreSQL);
//! assert_eq!(
//!     sql,
//!     "(audio_events.duration_seconds = $1) OR (audio_events.duration_seconds >= $2)"
//! );
//! assert_eq!(params.len(), 2);
//! ```

use std::fmt;

use smol_str::SmolStr;
use tracing::debug;

use crate::error::{FilterError, FilterResult};
use crate::filter::{CombinatorKind, ComparisonOp, Condition, FilterValue, SubsetOp};
use crate::registry::{FieldRegistry, FieldSpec};
use crate::sql::{DatabaseType, SqlBuilder, escape_like, qualified_column, quote_identifier};

/// The table a predicate is compiled against.
#[derive(Debug, Clone, Copy)]
pub struct TableHandle<'r> {
    registry: &'r FieldRegistry,
    alias: Option<&'r str>,
}

impl<'r> TableHandle<'r> {
    /// The registry's own table.
    pub fn new(registry: &'r FieldRegistry) -> Self {
        Self {
            registry,
            alias: None,
        }
    }

    /// Qualify columns with `alias` instead of the table name.
    pub fn aliased(registry: &'r FieldRegistry, alias: &'r str) -> Self {
        Self {
            registry,
            alias: Some(alias),
        }
    }

    /// Name used to qualify columns.
    pub fn qualifier(&self) -> &str {
        self.alias.unwrap_or_else(|| self.registry.table())
    }

    fn column(&self, spec: &FieldSpec) -> Column {
        Column {
            table: self.qualifier().into(),
            name: spec.column_name().into(),
        }
    }
}

/// A qualified column reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    /// Table or alias.
    pub table: SmolStr,
    /// Column name.
    pub name: SmolStr,
}

/// Pattern position for `LIKE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// `%value%`
    Contains,
    /// `value%`
    StartsWith,
    /// `%value`
    EndsWith,
}

/// Backend-renderable boolean expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column op value`.
    Compare {
        /// Column.
        column: Column,
        /// Operator.
        op: ComparisonOp,
        /// Bound value.
        value: FilterValue,
    },
    /// `column IS NULL`.
    IsNull(Column),
    /// `column IS NOT NULL`.
    IsNotNull(Column),
    /// `column LIKE pattern`; `pattern` is already escaped and wildcarded.
    Like {
        /// Column.
        column: Column,
        /// Where the literal sits in the pattern.
        kind: PatternKind,
        /// Escaped pattern, including wildcards.
        pattern: String,
    },
    /// `column IN (values)`.
    In {
        /// Column.
        column: Column,
        /// Bound values.
        values: Vec<FilterValue>,
    },
    /// `from <= column < to` (or `<= to` when inclusive).
    Range {
        /// Column.
        column: Column,
        /// Inclusive lower bound.
        from: FilterValue,
        /// Upper bound.
        to: FilterValue,
        /// Whether the upper bound is included.
        to_inclusive: bool,
    },
    /// Every child holds.
    And(Vec<Predicate>),
    /// At least one child holds.
    Or(Vec<Predicate>),
    /// The child does not hold.
    Not(Box<Predicate>),
}

/// Compile `ast` against `table`.
///
/// Every field is re-checked against the registry, so a hand-built tree
/// cannot reference a column outside the whitelist either.
pub fn compile(ast: &Condition, table: &TableHandle<'_>) -> FilterResult<Predicate> {
    let predicate = compile_node(ast, table)?;
    debug!(table = %table.qualifier(), columns = predicate.columns().len(), "Compiled predicate");
    Ok(predicate)
}

fn compile_node(node: &Condition, table: &TableHandle<'_>) -> FilterResult<Predicate> {
    match node {
        Condition::Comparison { field, op, value } => {
            let column = table.column(lookup(table, field, op.kind())?);
            Ok(match (op, value) {
                (ComparisonOp::Eq, FilterValue::Null) => Predicate::IsNull(column),
                (ComparisonOp::NotEq, FilterValue::Null) => Predicate::IsNotNull(column),
                _ => Predicate::Compare {
                    column,
                    op: *op,
                    value: value.clone(),
                },
            })
        }
        Condition::Subset { field, op } => {
            let column = table.column(lookup(table, field, op.kind())?);
            Ok(match op {
                SubsetOp::Contains(text) => like(column, PatternKind::Contains, text),
                SubsetOp::StartsWith(text) => like(column, PatternKind::StartsWith, text),
                SubsetOp::EndsWith(text) => like(column, PatternKind::EndsWith, text),
                SubsetOp::In(values) => Predicate::In {
                    column,
                    values: values.clone(),
                },
                SubsetOp::Range(bounds) => Predicate::Range {
                    column,
                    from: bounds.from.clone(),
                    to: bounds.to.clone(),
                    to_inclusive: bounds.to_inclusive,
                },
            })
        }
        Condition::Combinator { kind, children } => {
            // The variant is public, so hand-built trees skip `Condition::combinator`.
            if children.len() < kind.min_children() {
                return Err(FilterError::arity(
                    kind.as_str(),
                    kind.min_children(),
                    children.len(),
                ));
            }
            let mut compiled = children
                .iter()
                .map(|child| compile_node(child, table))
                .collect::<FilterResult<Vec<_>>>()?;
            Ok(match kind {
                CombinatorKind::And => Predicate::And(compiled),
                CombinatorKind::Or => Predicate::Or(compiled),
                CombinatorKind::Not if compiled.len() == 1 => {
                    Predicate::Not(Box::new(compiled.remove(0)))
                }
                CombinatorKind::Not => Predicate::And(
                    compiled
                        .into_iter()
                        .map(|p| Predicate::Not(Box::new(p)))
                        .collect(),
                ),
            })
        }
    }
}

fn lookup<'r>(
    table: &TableHandle<'r>,
    field: &str,
    op: crate::filter::OperatorKind,
) -> FilterResult<&'r FieldSpec> {
    let spec = table.registry.filterable(field).ok_or_else(|| {
        let reason = if table.registry.get(field).is_some() {
            "is not filterable"
        } else {
            "is not a recognised field"
        };
        FilterError::invalid_field(field, reason)
    })?;
    if !spec.allows(op) {
        return Err(FilterError::invalid_operator(
            field,
            op.as_str(),
            format!("not permitted on {} field", spec.field_type()),
        ));
    }
    Ok(spec)
}

fn like(column: Column, kind: PatternKind, text: &str) -> Predicate {
    let escaped = escape_like(text);
    let pattern = match kind {
        PatternKind::Contains => format!("%{}%", escaped),
        PatternKind::StartsWith => format!("{}%", escaped),
        PatternKind::EndsWith => format!("%{}", escaped),
    };
    Predicate::Like {
        column,
        kind,
        pattern,
    }
}

fn comparison_sql(op: ComparisonOp) -> &'static str {
    match op {
        ComparisonOp::Eq => "=",
        ComparisonOp::NotEq => "<>",
        ComparisonOp::Lt => "<",
        ComparisonOp::Gt => ">",
        ComparisonOp::Lteq => "<=",
        ComparisonOp::Gteq => ">=",
    }
}

/// Output target for [`Predicate::render`].
trait Sink {
    fn push(&mut self, sql: &str);
    fn column(&mut self, column: &Column);
    fn value(&mut self, value: &FilterValue);
    fn like_escape(&mut self);
}

/// Parameterized SQL.
struct Bound(SqlBuilder);

impl Sink for Bound {
    fn push(&mut self, sql: &str) {
        self.0.push(sql);
    }

    fn column(&mut self, column: &Column) {
        self.0.push_column(&column.table, &column.name);
    }

    fn value(&mut self, value: &FilterValue) {
        self.0.push_param(value.clone());
    }

    fn like_escape(&mut self) {
        let clause = self.0.db_type().like_escape_clause();
        self.0.push(clause);
    }
}

/// Human-readable form with inlined literals.
struct Inline(String);

impl Sink for Inline {
    fn push(&mut self, sql: &str) {
        self.0.push_str(sql);
    }

    fn column(&mut self, column: &Column) {
        self.0.push_str(&quote_identifier(&column.name));
    }

    fn value(&mut self, value: &FilterValue) {
        self.0.push_str(&value.to_string());
    }

    fn like_escape(&mut self) {}
}

impl Predicate {
    /// Render parameterized SQL for `db_type`.
    ///
    /// Returns `(sql, params)`; placeholders are numbered from 1.
    pub fn to_sql(&self, db_type: DatabaseType) -> (String, Vec<FilterValue>) {
        let mut sink = Bound(SqlBuilder::new(db_type));
        self.render(&mut sink);
        sink.0.build()
    }

    /// Every column the predicate references, depth first.
    pub fn columns(&self) -> Vec<&Column> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a Column>) {
        match self {
            Self::Compare { column, .. }
            | Self::IsNull(column)
            | Self::IsNotNull(column)
            | Self::Like { column, .. }
            | Self::In { column, .. }
            | Self::Range { column, .. } => out.push(column),
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_columns(out);
                }
            }
            Self::Not(child) => child.collect_columns(out),
        }
    }

    fn render<S: Sink>(&self, sink: &mut S) {
        match self {
            Self::Compare { column, op, value } => {
                sink.column(column);
                sink.push(" ");
                sink.push(comparison_sql(*op));
                sink.push(" ");
                sink.value(value);
            }
            Self::IsNull(column) => {
                sink.column(column);
                sink.push(" IS NULL");
            }
            Self::IsNotNull(column) => {
                sink.column(column);
                sink.push(" IS NOT NULL");
            }
            Self::Like {
                column, pattern, ..
            } => {
                sink.column(column);
                sink.push(" LIKE ");
                sink.value(&FilterValue::String(pattern.clone()));
                sink.like_escape();
            }
            Self::In { column, values } => {
                sink.column(column);
                sink.push(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        sink.push(", ");
                    }
                    sink.value(value);
                }
                sink.push(")");
            }
            Self::Range {
                column,
                from,
                to,
                to_inclusive,
            } => {
                sink.column(column);
                sink.push(" >= ");
                sink.value(from);
                sink.push(" AND ");
                sink.column(column);
                sink.push(if *to_inclusive { " <= " } else { " < " });
                sink.value(to);
            }
            Self::And(children) => render_group(sink, " AND ", children, "TRUE"),
            Self::Or(children) => render_group(sink, " OR ", children, "FALSE"),
            Self::Not(child) => {
                sink.push("NOT (");
                child.render(sink);
                sink.push(")");
            }
        }
    }
}

fn render_group<S: Sink>(sink: &mut S, connective: &str, children: &[Predicate], empty: &str) {
    if children.is_empty() {
        sink.push(empty);
        return;
    }
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            sink.push(connective);
        }
        sink.push("(");
        child.render(sink);
        sink.push(")");
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sink = Inline(String::new());
        self.render(&mut sink);
        f.write_str(&sink.0)
    }
}

/// `table.column` for a compiled column (handy in logs).
impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&qualified_column(&self.table, &self.name))
    }
}
