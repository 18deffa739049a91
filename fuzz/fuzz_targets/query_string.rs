//! Fuzz target for query-string handling and plan building.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_query_string
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use sift_query::params::RequestParams;
use sift_query::plan::QueryPlan;
use sift_query::registry::{FieldRegistry, FieldSpec, FieldType};

fn registry() -> FieldRegistry {
    FieldRegistry::builder("audio_events")
        .primary_key("id")
        .field(FieldSpec::new("id", FieldType::Integer).sortable())
        .field(FieldSpec::new("site_id", FieldType::Integer).sortable())
        .field(FieldSpec::new("notes", FieldType::Text).text_search())
        .max_items(100)
        .build()
        .expect("valid registry")
}

fuzz_target!(|data: &[u8]| {
    let Ok(query) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(params) = RequestParams::from_query_string(query) else {
        return;
    };
    let registry = registry();
    let Ok(plan) = QueryPlan::build(&params, &registry, "/audio_events") else {
        return;
    };

    let paging = plan.paging();
    assert!(paging.limit >= 1 && paging.limit <= 100);

    let meta = plan.metadata(u64::from(data.len() as u32));
    if let Some(previous) = &meta.paging.previous {
        assert_ne!(previous, &meta.paging.current);
    }
    if let Some(next) = &meta.paging.next {
        assert_ne!(next, &meta.paging.current);
    }
});
