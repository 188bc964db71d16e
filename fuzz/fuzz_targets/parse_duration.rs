//! Fuzz duration parsing used by connection strings.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = relpool::config::parse_duration(input);
    }
});
