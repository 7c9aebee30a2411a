//! Fuzz target for SQL Server connection string parsing.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_connection_string
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use prax_automigrate_mssql::MssqlConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // The parser should never panic, only return errors
        if let Ok(config) = MssqlConfig::from_connection_string(input) {
            let _ = config.data_source();
            let _ = config.endpoint();
            let _ = config.to_redacted_string();
            let _ = config.to_tiberius_config();
        }
    }
});
