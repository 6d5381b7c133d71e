//! Fuzz target for the expression lexer.
//!
//! Run with: cargo +nightly fuzz run lexer_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use quill_dsl::lexer::Lexer;
use quill_dsl::TokenKind;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let tokens = Lexer::new(input).tokenize();
    assert_eq!(
        tokens.last().map(|token| &token.kind),
        Some(&TokenKind::Eof),
        "token stream must end with Eof"
    );

    let mut previous_end = 0;
    for token in &tokens {
        assert!(token.span.start <= token.span.end);
        assert!(token.span.end <= input.len());
        assert!(token.span.start >= previous_end, "tokens must not overlap");
        assert!(token.span.line >= 1 && token.span.column >= 1);
        previous_end = token.span.end;
    }

    // A mustache-scoped scan is a prefix of the full scan.
    let scoped = Lexer::new(input).tokenize_mustache();
    assert!(scoped.len() <= tokens.len());
});
