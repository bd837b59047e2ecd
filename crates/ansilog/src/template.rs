#![forbid(unsafe_code)]

//! The `@(name,name:text)` color-template mini-language.
//!
//! Templates expand to SGR escape runs: `@(red)` switches the foreground,
//! `@(bright,blue:hello)` prints `hello` in bright blue and then restores
//! the terminal to the state from before the clause. A match that mentions
//! *any* unknown name is emitted completely unchanged: half-applied
//! styling is worse than none, and it keeps stray `@(...)` text in user
//! data from being mangled.
//!
//! The pattern itself is data: loggers may override it, so matching goes
//! through [`regex::bytes::Regex`] rather than a fixed scanner.

use regex::bytes::Regex;

use crate::ansi::{push_sgr, SgrState};
use crate::color::ColorTable;

/// The stock template pattern: `@\(([\w,]+?)(:([^)]*?))?\)`.
///
/// Group 1 is the comma-separated name list, group 3 the optional text
/// clause.
#[must_use]
pub fn stock_pattern() -> Regex {
    Regex::new(r"@\(([\w,]+?)(:([^)]*?))?\)").expect("stock template pattern is valid")
}

/// Expand every template match in `input` against `table`.
///
/// Custom patterns must keep the three-group shape of
/// [`stock_pattern`]: a match is resolved through group 1 (names) and
/// groups 2/3 (text clause).
#[must_use]
pub fn expand(pattern: &Regex, table: &ColorTable, input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut last = 0;
    for caps in pattern.captures_iter(input) {
        let whole = caps.get(0).expect("group 0 always present");
        out.extend_from_slice(&input[last..whole.start()]);
        last = whole.end();
        expand_match(&caps, table, whole.as_bytes(), &mut out);
    }
    out.extend_from_slice(&input[last..]);
    out
}

fn expand_match(
    caps: &regex::bytes::Captures<'_>,
    table: &ColorTable,
    whole: &[u8],
    out: &mut Vec<u8>,
) {
    let names = caps.get(1).map(|m| m.as_bytes()).unwrap_or(b"");
    let mut escapes = Vec::new();
    let mut state = SgrState::default();
    for name in names.split(|&b| b == b',') {
        let name = match std::str::from_utf8(name) {
            Ok(name) => name,
            Err(_) => {
                out.extend_from_slice(whole);
                return;
            }
        };
        let Some(code) = table.get(name) else {
            // One unknown name poisons the whole match.
            out.extend_from_slice(whole);
            return;
        };
        for sgr_code in code.sgr_codes() {
            state.apply(sgr_code);
            push_sgr(&mut escapes, sgr_code);
        }
    }
    out.extend_from_slice(&escapes);
    if caps.get(2).is_some() {
        if let Some(text) = caps.get(3) {
            out.extend_from_slice(text.as_bytes());
        }
        out.extend_from_slice(state.reset_bytes());
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn expand_stock(input: &[u8]) -> Vec<u8> {
        expand(&stock_pattern(), &ColorTable::stock(), input)
    }

    #[test]
    fn bare_name_switches_color() {
        assert_eq!(expand_stock(b"@(red)stop"), b"\x1b[31mstop");
    }

    #[test]
    fn text_clause_restores_state() {
        assert_eq!(expand_stock(b"@(red:stop) go"), b"\x1b[31mstop\x1b[39m go");
    }

    #[test]
    fn intensity_clause_resets_all() {
        // bright sets intensity, so the closing reset is a full SGR 0.
        assert_eq!(
            expand_stock(b"@(bright,blue:hi)"),
            b"\x1b[1m\x1b[34mhi\x1b[0m"
        );
    }

    #[test]
    fn dim_name_expands_to_bright_black() {
        assert_eq!(expand_stock(b"@(dim:x)"), b"\x1b[1m\x1b[30mx\x1b[0m");
    }

    #[test]
    fn unknown_name_leaves_match_untouched() {
        assert_eq!(expand_stock(b"@(red,nope:hi)"), b"@(red,nope:hi)");
        assert_eq!(expand_stock(b"@(nope)"), b"@(nope)");
    }

    #[test]
    fn empty_text_clause_still_resets() {
        assert_eq!(expand_stock(b"@(red:)"), b"\x1b[31m\x1b[39m");
    }

    #[test]
    fn surrounding_text_passes_through() {
        assert_eq!(
            expand_stock(b"a @(green:ok) b"),
            b"a \x1b[32mok\x1b[39m b"
        );
    }

    #[test]
    fn expansion_is_idempotent() {
        let once = expand_stock(b"pre @(warn:careful) post");
        let twice = expand_stock(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn reset_name_emits_sgr_zero() {
        assert_eq!(expand_stock(b"@(r)"), b"\x1b[0m");
    }

    #[test]
    fn cr_clause_needs_no_closer() {
        // `cr` resets the foreground; nothing is active afterwards, so the
        // text clause closes with no escape at all.
        assert_eq!(expand_stock(b"@(cr:x)"), b"\x1b[39mx");
    }

    #[test]
    fn custom_pattern_is_honored() {
        let pattern = Regex::new(r"%\[([\w,]+?)(:([^\]]*?))?\]").unwrap();
        let out = expand(&pattern, &ColorTable::stock(), b"%[cyan:deep]");
        assert_eq!(out, b"\x1b[36mdeep\x1b[39m");
    }
}
