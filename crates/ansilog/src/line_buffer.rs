#![forbid(unsafe_code)]

//! The per-logger line buffer and its virtual cursor.
//!
//! A logger accumulates bytes for the line it is currently building in a
//! [`LineBuffer`]. The buffer carries a *virtual cursor*: a byte index that
//! writes advance and a carriage return rewinds to zero, so progress-style
//! output (`\rdownloading 42%`) edits the line in place instead of growing
//! it.
//!
//! Overwriting the middle of a styled line is the subtle part. When an
//! injection replaces only a prefix of the text after the cursor, the
//! preserved tail must keep rendering with its *original* attributes even
//! though the injected bytes may have changed the active SGR state. The
//! buffer heals the seam by inserting the minimal escape run that restores
//! the old state at the splice point.
//!
//! Invariants: the cursor always lies within the buffer, and no newline
//! survives in the buffer between emit calls (the emit loop consumes them).

use crate::ansi::{push_sgr, SgrState, SGR_RESET_ALL, SGR_RESET_FORECOLOR};
use crate::width::{display_width, trim};

/// A single logical line being accumulated, with a virtual cursor.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
    cursor: usize,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The accumulated bytes.
    pub(crate) fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Current virtual cursor, as a byte index into [`bytes`](Self::bytes).
    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Rewind the cursor to column zero (the effect of a carriage return).
    pub(crate) fn move_cursor_to_start(&mut self) {
        self.cursor = 0;
    }

    /// Drop everything, cursor included.
    pub(crate) fn reset(&mut self) {
        self.buf.clear();
        self.cursor = 0;
    }

    /// Write `input` at the virtual cursor.
    ///
    /// At the end of the buffer this is a plain append. In the middle, the
    /// injected text consumes an equal display width of the old text; if
    /// the old tail is wider than the input, the leftover part survives,
    /// preceded by whatever escapes are needed to keep its colors intact.
    /// The cursor advances by the length of `input` only.
    pub(crate) fn inject(&mut self, input: &[u8]) {
        if self.cursor == self.buf.len() {
            self.buf.extend_from_slice(input);
            self.cursor += input.len();
            return;
        }

        let after = &self.buf[self.cursor..];
        let after_width = display_width(after);
        let input_width = display_width(input);

        if input_width >= after_width {
            // The whole tail is overwritten; nothing to heal.
            self.buf.truncate(self.cursor);
            self.buf.extend_from_slice(input);
            self.cursor = self.buf.len();
            return;
        }

        let removed_len = trim(after, input_width).len();
        let kept_start = self.cursor + removed_len;

        let old_state = SgrState::scan(&self.buf[..kept_start]);
        let mut new_state = SgrState::scan(&self.buf[..self.cursor]);
        new_state.fold(input);

        let healing = healing_escapes(old_state, new_state);

        let kept = self.buf.split_off(kept_start);
        self.buf.truncate(self.cursor);
        self.buf.extend_from_slice(input);
        self.cursor = self.buf.len();
        self.buf.extend_from_slice(&healing);
        self.buf.extend_from_slice(&kept);
    }

    /// Remove and return the line ending at `newline_idx` (exclusive); the
    /// newline itself is consumed too. The cursor keeps its position
    /// relative to the remaining bytes.
    pub(crate) fn drain_line(&mut self, newline_idx: usize) -> Vec<u8> {
        let line = self.buf[..newline_idx].to_vec();
        self.buf.drain(..=newline_idx);
        self.cursor = self.cursor.saturating_sub(newline_idx + 1);
        line
    }

    /// Cut the buffer at a carriage return: everything after `cr_idx` is
    /// returned for re-injection, the buffer keeps the part before it, and
    /// the cursor rewinds to column zero.
    pub(crate) fn split_at_cr(&mut self, cr_idx: usize) -> Vec<u8> {
        let tail = self.buf[cr_idx + 1..].to_vec();
        self.buf.truncate(cr_idx);
        self.cursor = 0;
        tail
    }
}

/// The escape run that restores `old` at a splice point where `new` is
/// currently active: reset the changed axis, then re-apply the old state.
fn healing_escapes(old: SgrState, new: SgrState) -> Vec<u8> {
    let changed_intensity = new.intensity() != old.intensity();
    let changed_forecolor = new.forecolor() != old.forecolor();
    let mut escapes = Vec::new();
    if changed_intensity {
        escapes.extend_from_slice(SGR_RESET_ALL);
    } else if changed_forecolor {
        escapes.extend_from_slice(SGR_RESET_FORECOLOR);
    }
    if changed_intensity && old.intensity() != 0 {
        push_sgr(&mut escapes, old.intensity());
    }
    if (changed_intensity || changed_forecolor) && old.forecolor() != 0 {
        push_sgr(&mut escapes, old.forecolor());
    }
    escapes
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_at_end() {
        let mut lb = LineBuffer::new();
        lb.inject(b"hello");
        lb.inject(b" world");
        assert_eq!(lb.bytes(), b"hello world");
        assert_eq!(lb.cursor(), 11);
    }

    #[test]
    fn carriage_return_overwrites_prefix() {
        let mut lb = LineBuffer::new();
        lb.inject(b"red apple");
        lb.move_cursor_to_start();
        lb.inject(b"gre");
        // "gre" consumes three columns of "red apple".
        assert_eq!(lb.bytes(), b"gre apple");
        assert_eq!(lb.cursor(), 3);

        lb.move_cursor_to_start();
        lb.inject(b"green");
        assert_eq!(lb.bytes(), b"greenpple");
        assert_eq!(lb.cursor(), 5);
    }

    #[test]
    fn overwrite_longer_than_tail_replaces_it() {
        let mut lb = LineBuffer::new();
        lb.inject(b"ab");
        lb.move_cursor_to_start();
        lb.inject(b"wxyz");
        assert_eq!(lb.bytes(), b"wxyz");
        assert_eq!(lb.cursor(), 4);
    }

    #[test]
    fn mid_line_cursor_position() {
        let mut lb = LineBuffer::new();
        lb.inject(b"abcdef");
        lb.move_cursor_to_start();
        lb.inject(b"XY");
        assert_eq!(lb.bytes(), b"XYcdef");
        assert_eq!(lb.cursor(), 2);
        lb.inject(b"Z");
        assert_eq!(lb.bytes(), b"XYZdef");
        assert_eq!(lb.cursor(), 3);
    }

    #[test]
    fn healing_restores_tail_forecolor() {
        let mut lb = LineBuffer::new();
        lb.inject(b"\x1b[31mred text");
        lb.move_cursor_to_start();
        lb.inject(b"\x1b[34mBLU");
        // Tail " text" was red before; the splice must re-establish red.
        assert_eq!(
            lb.bytes(),
            b"\x1b[34mBLU\x1b[39m\x1b[31m text".as_slice()
        );
        let state = SgrState::scan(lb.bytes());
        assert_eq!(state.forecolor(), 31);
    }

    #[test]
    fn healing_restores_tail_intensity() {
        let mut lb = LineBuffer::new();
        lb.inject(b"\x1b[1m\x1b[32mgo go");
        lb.move_cursor_to_start();
        lb.inject(b"no");
        // Injected text is unstyled; tail must come back bright green.
        assert_eq!(
            lb.bytes(),
            b"no\x1b[0m\x1b[1m\x1b[32m go".as_slice()
        );
    }

    #[test]
    fn no_healing_when_states_match() {
        let mut lb = LineBuffer::new();
        lb.inject(b"abcdef");
        lb.move_cursor_to_start();
        lb.inject(b"XXX");
        assert_eq!(lb.bytes(), b"XXXdef");
    }

    #[test]
    fn preserved_tail_keeps_prevailing_state() {
        // Property: the SGR state over the preserved tail equals the state
        // that prevailed at the same byte before the injection.
        let mut lb = LineBuffer::new();
        lb.inject(b"\x1b[2m\x1b[35mabcdefgh");
        let before = SgrState::scan(lb.bytes());
        lb.move_cursor_to_start();
        lb.inject(b"\x1b[0m12");
        assert_eq!(SgrState::scan(lb.bytes()), before);
    }

    #[test]
    fn drain_line_adjusts_cursor() {
        let mut lb = LineBuffer::new();
        lb.inject(b"one\ntwo");
        let line = lb.drain_line(3);
        assert_eq!(line, b"one");
        assert_eq!(lb.bytes(), b"two");
        assert_eq!(lb.cursor(), 3);
    }

    #[test]
    fn split_at_cr_returns_tail() {
        let mut lb = LineBuffer::new();
        lb.inject(b"abc\rxy");
        let tail = lb.split_at_cr(3);
        assert_eq!(tail, b"xy");
        assert_eq!(lb.bytes(), b"abc");
        assert_eq!(lb.cursor(), 0);
    }

    #[test]
    fn inject_empty_in_middle_is_noop() {
        let mut lb = LineBuffer::new();
        lb.inject(b"stay");
        lb.move_cursor_to_start();
        lb.inject(b"");
        assert_eq!(lb.bytes(), b"stay");
        assert_eq!(lb.cursor(), 0);
    }

    #[test]
    fn cursor_stays_in_bounds_across_mixed_operations() {
        let chunks: &[&[u8]] = &[
            b"start of line",
            b"\x1b[31mred",
            b"x",
            b"longer replacement text",
            b"",
            b"\x1b[0m",
            b"tail",
        ];
        let mut lb = LineBuffer::new();
        for (i, chunk) in chunks.iter().cycle().take(40).enumerate() {
            if i % 3 == 0 {
                lb.move_cursor_to_start();
            }
            lb.inject(chunk);
            assert!(lb.cursor() <= lb.bytes().len());
        }
    }
}
