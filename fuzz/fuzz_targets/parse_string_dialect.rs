#![no_main]

use cctql::{parse_string_dialect, AggregationMode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let _ = parse_string_dialect(text, AggregationMode::Off);
});
