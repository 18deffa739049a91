//! Structured fuzz target for the filter grammar.
//!
//! Builds grammar-shaped filters from arbitrary data so that the fuzzer
//! spends its time past the JSON syntax layer.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_filter_structured
//! ```

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::{Map, Value, json};
use sift_query::compiler::{TableHandle, compile};
use sift_query::parser::parse;
use sift_query::registry::{FieldRegistry, FieldSpec, FieldType};
use sift_query::sql::DatabaseType;

const FIELDS: &[&str] = &["id", "site_id", "score", "notes", "is_reference", "secret", "unknown"];
const OPERATORS: &[&str] = &[
    "eq", "not_eq", "lt", "gt", "lteq", "gteq", "contains", "starts_with", "ends_with", "in",
    "range", "not_in", "not_contains", "equal", "in_range", "regex",
];

/// A fuzzable operand.
#[derive(Debug, Arbitrary)]
enum FuzzOperand {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<i64>),
    Bounds(Option<i64>, Option<i64>),
    Interval(String),
}

impl FuzzOperand {
    fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => json!(b),
            Self::Int(i) => json!(i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::Text(s) => json!(s),
            Self::List(items) => json!(items),
            Self::Bounds(from, to) => {
                let mut map = Map::new();
                if let Some(from) = from {
                    map.insert("from".into(), json!(from));
                }
                if let Some(to) = to {
                    map.insert("to".into(), json!(to));
                }
                Value::Object(map)
            }
            Self::Interval(s) => json!({ "interval": s }),
        }
    }
}

/// A fuzzable filter node.
#[derive(Debug, Arbitrary)]
enum FuzzFilter {
    Leaf { field: u8, operator: u8, operand: FuzzOperand },
    And(Vec<FuzzFilter>),
    Or(Vec<FuzzFilter>),
    Not(Vec<FuzzFilter>),
}

impl FuzzFilter {
    fn to_json(&self, depth: usize) -> Value {
        if depth > 40 {
            return json!({});
        }
        let children = |items: &[FuzzFilter]| -> Value {
            Value::Array(items.iter().map(|c| c.to_json(depth + 1)).collect())
        };
        match self {
            Self::Leaf { field, operator, operand } => {
                let field = FIELDS[*field as usize % FIELDS.len()];
                let operator = OPERATORS[*operator as usize % OPERATORS.len()];
                json!({ field: { operator: operand.to_json() } })
            }
            Self::And(items) => json!({ "and": children(items) }),
            Self::Or(items) => json!({ "or": children(items) }),
            Self::Not(items) => json!({ "not": children(items) }),
        }
    }
}

fn registry() -> FieldRegistry {
    FieldRegistry::builder("audio_events")
        .primary_key("id")
        .field(FieldSpec::new("id", FieldType::Integer).sortable())
        .field(FieldSpec::new("site_id", FieldType::Integer))
        .field(FieldSpec::new("score", FieldType::Float))
        .field(FieldSpec::new("notes", FieldType::Text).text_search())
        .field(FieldSpec::new("is_reference", FieldType::Boolean))
        .field(FieldSpec::new("secret", FieldType::Text).not_filterable())
        .build()
        .expect("valid registry")
}

fuzz_target!(|filter: FuzzFilter| {
    let registry = registry();
    let raw = filter.to_json(0);
    let Ok(ast) = parse(&raw, &registry) else {
        return;
    };

    // The echoed form must parse back to the same tree.
    let reparsed = parse(&ast.to_json(), &registry).expect("echoed filter parses");
    assert_eq!(reparsed, ast);

    let predicate = compile(&ast, &TableHandle::new(&registry)).expect("parsed trees compile");
    for column in predicate.columns() {
        assert!(registry.filterable(&column.name).is_some());
    }
    let _ = predicate.to_sql(DatabaseType::MySQL);
});
