//! Fuzz the connection string parser.
//!
//! Any input must either fail with a configuration error or yield a config
//! whose rendering and validation never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use relpool::{ErrorKind, PoolConfig};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    match PoolConfig::from_connection_string(input) {
        Ok(config) => {
            let _ = config.validate();
            let _ = config.with_defaults_applied();
            let _ = config.connection_string();
            let _ = config.dsn();
            let _ = format!("{config:?}");
        }
        Err(e) => assert_eq!(e.kind(), ErrorKind::Config),
    }
});
