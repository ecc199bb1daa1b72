#![no_main]

use cctql::query::object::object_query_from_json;
use cctql::query::QueryEngine;
use cctql::AggregationMode;
use libfuzzer_sys::fuzz_target;

const GRAPH: &str = r#"[
    {"frame": {"name": "main"}, "metrics": {"time": 2.0}, "children": [
        {"frame": {"name": "solve"}, "metrics": {"time": 1.0}}
    ]}
]"#;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(query) = object_query_from_json(text, AggregationMode::Off) else {
        return;
    };
    let Ok((graph, metrics)) = cctql::literal::from_str(GRAPH) else {
        return;
    };
    let _ = QueryEngine::new().apply_query(&query, &graph, &metrics);
});
