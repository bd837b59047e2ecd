#![forbid(unsafe_code)]

//! Display-width measurement and width-fitting.
//!
//! Widths here are code-point counts with SGR sequences stripped, not
//! grapheme clusters and not East-Asian cell widths. That keeps the
//! fitting arithmetic exact for the overwhelmingly common case (ASCII plus
//! colored spans) at the cost of misalignment for CJK and emoji.
//!
//! `trim` returns a *prefix slice* of its input: SGR sequences never count
//! toward the width but are carried along intact, so a trimmed span renders
//! with the same colors as the original up to the cut.

use crate::ansi::{tokens, Token};

/// The ellipsis appended by [`trim_ellipsis`].
pub const ELLIPSIS: &[u8] = b"...";

/// Display width of the ellipsis.
pub const ELLIPSIS_WIDTH: usize = 3;

/// Number of code points in `buf` after stripping SGR sequences.
#[must_use]
pub fn display_width(buf: &[u8]) -> usize {
    tokens(buf)
        .filter(|t| matches!(t, Token::Glyph(_)))
        .count()
}

/// The shortest prefix of `buf` whose display width is `width` (or all of
/// `buf` if it is narrower). SGR sequences before the cut are preserved and
/// do not count; a sequence sitting exactly on the cut is excluded.
#[must_use]
pub fn trim(buf: &[u8], width: usize) -> &[u8] {
    if width == 0 {
        return b"";
    }
    let mut remaining = width;
    let mut end = 0;
    for token in tokens(buf) {
        end += token.raw().len();
        if matches!(token, Token::Glyph(_)) {
            remaining -= 1;
            if remaining == 0 {
                break;
            }
        }
    }
    &buf[..end]
}

/// Fit `buf` into `width` columns, replacing the overflow with `...`.
///
/// Returns `buf` unchanged when it already fits. The result may still leave
/// SGR state dangling; callers that need a clean terminal append
/// [`SgrState::reset_bytes`](crate::SgrState::reset_bytes).
#[must_use]
pub fn trim_ellipsis(buf: &[u8], width: usize) -> Vec<u8> {
    if display_width(buf) <= width {
        return buf.to_vec();
    }
    let mut out = trim(buf, width.saturating_sub(ELLIPSIS_WIDTH)).to_vec();
    out.extend_from_slice(ELLIPSIS);
    out
}

/// Remove every SGR sequence from `buf`.
#[must_use]
pub fn strip_sgr(buf: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(buf.len());
    for token in tokens(buf) {
        if let Token::Glyph(raw) = token {
            out.extend_from_slice(raw);
        }
    }
    out
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_ignores_sgr() {
        assert_eq!(display_width(b"hello"), 5);
        assert_eq!(display_width(b"\x1b[31mhello\x1b[0m"), 5);
        assert_eq!(display_width(b""), 0);
        assert_eq!(display_width(b"\x1b[1m"), 0);
    }

    #[test]
    fn width_counts_code_points() {
        assert_eq!(display_width("héllo".as_bytes()), 5);
        assert_eq!(display_width("日本語".as_bytes()), 3);
    }

    #[test]
    fn trim_plain() {
        assert_eq!(trim(b"hello", 3), b"hel");
        assert_eq!(trim(b"hello", 5), b"hello");
        assert_eq!(trim(b"hello", 10), b"hello");
        assert_eq!(trim(b"hello", 0), b"");
    }

    #[test]
    fn trim_keeps_interior_sgr() {
        let buf = b"\x1b[31mab\x1b[0mcd";
        assert_eq!(trim(buf, 3), b"\x1b[31mab\x1b[0mc");
    }

    #[test]
    fn trim_excludes_sgr_on_the_cut() {
        let buf = b"ab\x1b[31mcd";
        // Cut lands after 'b'; the escape that follows stays out.
        assert_eq!(trim(buf, 2), b"ab");
    }

    #[test]
    fn trim_is_a_prefix() {
        let buf = b"\x1b[2mfoo\x1b[0mbar";
        for n in 0..8 {
            assert!(buf.starts_with(trim(buf, n)));
        }
    }

    #[test]
    fn trim_width_equation() {
        let buf = b"\x1b[34mwide text\x1b[39m here";
        for n in 0..20 {
            assert_eq!(
                display_width(trim(buf, n)),
                n.min(display_width(buf))
            );
        }
    }

    #[test]
    fn trim_ellipsis_short_input_unchanged() {
        assert_eq!(trim_ellipsis(b"abc", 5), b"abc");
        assert_eq!(trim_ellipsis(b"abcde", 5), b"abcde");
    }

    #[test]
    fn trim_ellipsis_appends_dots() {
        assert_eq!(trim_ellipsis(b"abcdefgh", 5), b"ab...");
        assert_eq!(display_width(&trim_ellipsis(b"abcdefgh", 5)), 5);
    }

    #[test]
    fn trim_ellipsis_bound_holds_from_three() {
        for n in 3..10 {
            assert!(display_width(&trim_ellipsis(b"abcdefghijkl", n)) <= n);
        }
    }

    #[test]
    fn strip_sgr_removes_escapes_only() {
        assert_eq!(strip_sgr(b"\x1b[1m\x1b[31mred\x1b[0m!"), b"red!");
        assert_eq!(strip_sgr(b"plain"), b"plain");
    }
}
