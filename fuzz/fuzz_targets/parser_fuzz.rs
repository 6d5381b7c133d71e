//! Fuzz target for the template parser.
//!
//! Run with: cargo +nightly fuzz run parser_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use quill_dsl::{parse, parse_expression, parse_with_diagnostics, pretty_print};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let (_, errors) = parse_with_diagnostics(input);
    for error in &errors {
        assert!(error.span.line >= 1 && error.span.column >= 1);
        assert!(error.span.end <= input.len());
        assert!(!error.message.is_empty());
    }

    // Printed documents parse again.
    if let Ok(document) = parse(input) {
        let printed = pretty_print(&document);
        assert!(parse(&printed).is_ok(), "printed document failed to parse:\n{}", printed);
    }

    let _ = parse_expression(input);
});
