//! Property tests for width accounting, trimming and template expansion.

use proptest::prelude::*;

use ansilog::{display_width, strip_sgr, trim, trim_ellipsis};

/// Strategy: text interleaving plain runs with SGR escapes.
fn sgr_salad() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(
        prop_oneof![
            "[ -~]{0,8}".prop_map(|s| s.into_bytes()),
            (0u16..110).prop_map(|code| format!("\x1b[{code}m").into_bytes()),
            "\\PC{0,4}".prop_map(|s| s.into_bytes()),
        ],
        0..12,
    )
    .prop_map(|chunks| chunks.concat())
}

proptest! {
    #[test]
    fn width_never_panics_on_any_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = display_width(&bytes);
        let _ = strip_sgr(&bytes);
        let _ = trim(&bytes, 7);
        let _ = trim_ellipsis(&bytes, 11);
    }

    #[test]
    fn trim_width_equation_holds(buf in sgr_salad(), n in 0usize..64) {
        prop_assert_eq!(
            display_width(trim(&buf, n)),
            n.min(display_width(&buf))
        );
    }

    #[test]
    fn trim_is_a_prefix(buf in sgr_salad(), n in 0usize..64) {
        prop_assert!(buf.starts_with(trim(&buf, n)));
    }

    #[test]
    fn trim_ellipsis_bound_holds(buf in sgr_salad(), n in 3usize..64) {
        prop_assert!(display_width(&trim_ellipsis(&buf, n)) <= n);
    }

    #[test]
    fn trim_ellipsis_keeps_short_input(buf in sgr_salad()) {
        let width = display_width(&buf);
        let clamped = trim_ellipsis(&buf, width + 1);
        prop_assert_eq!(clamped.as_slice(), buf.as_slice());
    }

    #[test]
    fn stripping_makes_width_equal_char_count(buf in sgr_salad()) {
        let stripped = strip_sgr(&buf);
        prop_assert_eq!(display_width(&buf), display_width(&stripped));
    }

    #[test]
    fn template_expansion_is_idempotent(text in template_text()) {
        let logger = ansilog::default_logger();
        let once = logger.colorify(&text);
        let twice = logger.colorify(&once);
        prop_assert_eq!(once, twice);
    }
}

/// Plain text (no stray `@`) around a well-formed or unknown template.
fn template_text() -> impl Strategy<Value = String> {
    (
        "[ -?A-~]{0,12}",
        prop_oneof![
            Just(""),
            Just("@(red)"),
            Just("@(bright,blue:mid)"),
            Just("@(dim:stamp)"),
            Just("@(warn,unknown:kept)"),
            Just("@(r)"),
        ],
        "[ -?A-~]{0,12}",
    )
        .prop_map(|(before, template, after)| format!("{before}{template}{after}"))
}
