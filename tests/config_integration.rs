//! Integration tests for registry configuration.
//!
//! These tests verify that registries load from TOML strings and files and
//! that invalid configurations are rejected with a configuration error.

use std::io::Write;

use sift::query::{ErrorCode, FieldRegistry, FieldType, OperatorKind, SortOrder};

const AUDIO_EVENTS: &str = r#"
    [resource]
    name = "audio_events"
    table = "audio_events_v2"
    primary_key = "id"
    max_items = 200
    default_items = 50
    default_order_by = "recorded_date"
    default_direction = "desc"

    [fields.id]
    type = "integer"
    sortable = true

    [fields.recorded_date]
    type = "timestamp"
    column = "recorded_at"
    sortable = true

    [fields.notes]
    type = "text"
    text_search = true

    [fields.status]
    type = "text"
    operators = ["eq", "in"]

    [fields.creator_id]
    type = "integer"
    filterable = false
"#;

/// Test full configuration with all options
#[test]
fn test_config_full() {
    let registry = FieldRegistry::from_toml(AUDIO_EVENTS).expect("Failed to parse config");

    assert_eq!(registry.resource(), "audio_events");
    assert_eq!(registry.table(), "audio_events_v2");
    assert_eq!(registry.max_items(), 200);
    assert_eq!(registry.default_items(), 50);
    assert_eq!(registry.default_order_by().name().as_str(), "recorded_date");
    assert_eq!(registry.default_direction(), SortOrder::Desc);

    let recorded = registry.get("recorded_date").unwrap();
    assert_eq!(recorded.field_type(), FieldType::Timestamp);
    assert_eq!(recorded.column_name(), "recorded_at");

    assert!(registry.allows("status", OperatorKind::In));
    assert!(!registry.allows("status", OperatorKind::Contains));
    assert!(registry.filterable("creator_id").is_none());
    assert_eq!(
        registry.text_fields().map(|f| f.name().as_str()).collect::<Vec<_>>(),
        vec!["notes"]
    );
}

/// Test minimal configuration
#[test]
fn test_config_minimal() {
    let registry = FieldRegistry::from_toml(
        r#"
        [resource]
        name = "sites"
        primary_key = "id"

        [fields.id]
        type = "integer"
        "#,
    )
    .expect("Failed to parse config");

    assert_eq!(registry.table(), "sites");
    assert_eq!(registry.max_items(), 500);
    assert_eq!(registry.default_items(), 25);
    assert_eq!(registry.default_direction(), SortOrder::Asc);
}

/// Test loading from a file
#[test]
fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(AUDIO_EVENTS.as_bytes()).unwrap();

    let registry = FieldRegistry::from_file(file.path()).expect("Failed to load config");
    assert_eq!(registry.resource(), "audio_events");
}

#[test]
fn test_config_missing_file() {
    let err = FieldRegistry::from_file("/nonexistent/registry.toml").unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
}

#[test]
fn test_config_unknown_key() {
    let err = FieldRegistry::from_toml(
        r#"
        [resource]
        name = "sites"
        primary_key = "id"
        colour = "blue"

        [fields.id]
        type = "integer"
        "#,
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
}

#[test]
fn test_config_invalid_operator_for_type() {
    let err = FieldRegistry::from_toml(
        r#"
        [resource]
        name = "sites"
        primary_key = "id"

        [fields.id]
        type = "integer"
        operators = ["contains"]
        "#,
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
}

#[test]
fn test_config_text_search_requires_text() {
    let err = FieldRegistry::from_toml(
        r#"
        [resource]
        name = "sites"
        primary_key = "id"

        [fields.id]
        type = "integer"
        text_search = true
        "#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("text-searchable"), "{}", err);
}

#[test]
fn test_config_text_search_requires_filterable() {
    let err = FieldRegistry::from_toml(
        r#"
        [resource]
        name = "sites"
        primary_key = "id"

        [fields.id]
        type = "integer"

        [fields.notes]
        type = "text"
        filterable = false
        text_search = true
        "#,
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
    assert!(err.to_string().contains("must be filterable"), "{}", err);
}

#[test]
fn test_config_requires_default_order() {
    let err = FieldRegistry::from_toml(
        r#"
        [resource]
        name = "sites"

        [fields.name]
        type = "text"
        "#,
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
}
