//! Fuzz target for `GO` separator stripping.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_batch_separators
//! ```

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use prax_automigrate_core::{is_batch_separator, prepare_execution_script, strip_batch_separators};

#[derive(Debug, Arbitrary)]
struct FuzzScript {
    bootstrap: Option<String>,
    lines: Vec<String>,
}

fuzz_target!(|input: FuzzScript| {
    let script = input.lines.join("\n");
    let stripped = strip_batch_separators(&script);

    // no separator line survives, and nothing else is lost
    assert!(!stripped.split('\n').any(is_batch_separator));
    assert_eq!(
        stripped.matches('\n').count(),
        script.matches('\n').count()
    );
    for line in script.split('\n').filter(|l| !is_batch_separator(l)) {
        assert!(stripped.contains(line));
    }

    // stripping is idempotent
    assert_eq!(strip_batch_separators(&stripped), stripped);

    let _ = prepare_execution_script(input.bootstrap.as_deref(), &script);
});
