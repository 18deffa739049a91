//! Fuzz target for the filter parser on raw JSON.
//!
//! Any input must either be rejected with an error or compile to a
//! predicate that only references registered, filterable columns.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_filter_parser
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use sift_query::compiler::{TableHandle, compile};
use sift_query::parser::parse;
use sift_query::registry::{FieldRegistry, FieldSpec, FieldType};
use sift_query::sql::DatabaseType;

fn registry() -> FieldRegistry {
    FieldRegistry::builder("audio_events")
        .primary_key("id")
        .field(FieldSpec::new("id", FieldType::Integer).sortable())
        .field(FieldSpec::new("site_id", FieldType::Integer))
        .field(FieldSpec::new("score", FieldType::Float))
        .field(FieldSpec::new("notes", FieldType::Text).column("annotation_notes").text_search())
        .field(FieldSpec::new("is_reference", FieldType::Boolean))
        .field(FieldSpec::new("secret", FieldType::Text).not_filterable())
        .build()
        .expect("valid registry")
}

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let registry = registry();
    let Ok(ast) = parse(&raw, &registry) else {
        return;
    };

    for field in ast.fields() {
        assert!(registry.filterable(field).is_some(), "parsed unfilterable field {}", field);
    }

    let predicate = compile(&ast, &TableHandle::new(&registry)).expect("parsed trees compile");
    for column in predicate.columns() {
        assert_ne!(column.name.as_str(), "secret");
    }

    let (sql, params) = predicate.to_sql(DatabaseType::PostgreSQL);
    assert!(!sql.contains(';'));
    let _ = params;
    let _ = predicate.to_string();
});
