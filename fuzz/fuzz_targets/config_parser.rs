//! Fuzz target for the `[automigrate]` configuration parser.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_config_parser
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use prax_automigrate_core::AutoMigrateConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // The parser should never panic, only return errors
        if let Ok(config) = AutoMigrateConfig::from_toml(input) {
            assert!(config.options.validate().is_ok());
        }
    }
});
