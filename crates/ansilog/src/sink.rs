#![forbid(unsafe_code)]

//! Sinks and the per-sink cursor/paint state machine.
//!
//! A [`Sink`] is a clonable handle to one output byte stream plus the state
//! needed to keep repainting the partial-line region at the bottom of it:
//! what each partial row currently shows, which loggers own those rows,
//! and where the physical cursor is believed to be.
//!
//! # Cursor model
//!
//! Row 0 is the topmost partial row; rows grow downward. The machine
//! tracks two extra bits alongside the row index:
//!
//! - `cursor_at_begin`: the cursor is known to sit in column 0;
//! - `cursor_inline`: the last paint left the cursor just past the end of
//!   the text shown on that row, so a paint that merely *extends* the row
//!   can write the suffix and nothing else.
//!
//! Every paint operation updates the machine, including the short-circuit
//! paths; a stale flag here shows up on screen as smeared or doubled text.
//!
//! # Failure policy
//!
//! Write errors on the underlying stream are swallowed: a logger must not
//! fail loudly into the very stream it is failing to write. Terminal-width
//! discovery falls back to 80 columns.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::ansi::{SgrState, CARRIAGE_RETURN, CURSOR_DOWN_ONE, CURSOR_UP_ONE};
use crate::logger::Logger;
use crate::width::{display_width, trim, trim_ellipsis, ELLIPSIS, ELLIPSIS_WIDTH};

/// Separator between partial segments in single-line mode.
pub(crate) const SEGMENT_SEPARATOR: &[u8] = b" | ";

/// Display width of [`SEGMENT_SEPARATOR`].
pub(crate) const SEGMENT_SEPARATOR_WIDTH: usize = 3;

/// Segments are never shaved below this width in single-line mode.
pub(crate) const MIN_SEGMENT_WIDTH: usize = 6;

/// Width assumed when the terminal cannot be queried.
const FALLBACK_TERM_WIDTH: u16 = 80;

/// Lock a mutex, entering it even if a previous holder panicked. Logging
/// state stays usable for the rest of the process after a panic on one
/// thread.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Sink handle ──────────────────────────────────────────────────────────

/// A shared handle to one output stream and its paint state.
///
/// Handle identity *is* sink identity: loggers that should compose their
/// partial lines on the same stream must hold clones of the same `Sink`.
/// [`Sink::stdout`] and [`Sink::stderr`] return process-wide shared
/// instances, so the standard streams compose without coordination.
#[derive(Clone)]
pub struct Sink {
    shared: Arc<SinkShared>,
}

pub(crate) struct SinkShared {
    state: Mutex<SinkState>,
}

impl Sink {
    /// The process-wide sink for standard output.
    #[must_use]
    pub fn stdout() -> Sink {
        crate::registry::system().stdout_sink()
    }

    /// The process-wide sink for standard error.
    #[must_use]
    pub fn stderr() -> Sink {
        crate::registry::system().stderr_sink()
    }

    /// Wrap an arbitrary writer in a fresh sink.
    ///
    /// Each call creates a new identity; clone the returned handle to share
    /// it between loggers.
    #[must_use]
    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Sink {
        let sink = Sink::with_dest(SinkDest::Custom(Box::new(writer)));
        crate::registry::system().register_sink(&sink);
        sink
    }

    pub(crate) fn with_dest(dest: SinkDest) -> Sink {
        Sink {
            shared: Arc::new(SinkShared {
                state: Mutex::new(SinkState::new(dest)),
            }),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<SinkShared> {
        &self.shared
    }

    pub(crate) fn downgrade(&self) -> Weak<SinkShared> {
        Arc::downgrade(&self.shared)
    }
}

impl SinkShared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, SinkState> {
        lock_unpoisoned(&self.state)
    }
}

// ── Destination stream ───────────────────────────────────────────────────

pub(crate) enum SinkDest {
    Stdout(io::Stdout),
    Stderr(io::Stderr),
    Custom(Box<dyn Write + Send>),
}

impl SinkDest {
    fn write_all(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let result = match self {
            SinkDest::Stdout(out) => out.write_all(bytes),
            SinkDest::Stderr(out) => out.write_all(bytes),
            SinkDest::Custom(out) => out.write_all(bytes),
        };
        // Dropped deliberately: see the module docs.
        let _ = result;
    }

    fn flush(&mut self) {
        let result = match self {
            SinkDest::Stdout(out) => out.flush(),
            SinkDest::Stderr(out) => out.flush(),
            SinkDest::Custom(out) => out.flush(),
        };
        let _ = result;
    }
}

// ── Paint state ──────────────────────────────────────────────────────────

pub(crate) struct SinkState {
    dest: SinkDest,
    /// What is currently painted on each partial row. Never empty; the
    /// last entry may be blank.
    last_painted: Vec<Vec<u8>>,
    /// Loggers whose partial line is currently presented, in row order.
    partial_loggers: Vec<Weak<Logger>>,
    /// Current cursor row; 0 is the topmost partial row.
    cursor_row: i64,
    cursor_at_begin: bool,
    cursor_inline: bool,
    /// Fixed width override; 0 means query the terminal.
    term_width: u16,
    /// One row per partial logger instead of a joined status line.
    multiline: bool,
}

impl SinkState {
    fn new(dest: SinkDest) -> Self {
        Self {
            dest,
            last_painted: vec![Vec::new()],
            partial_loggers: Vec::new(),
            cursor_row: 0,
            cursor_at_begin: true,
            cursor_inline: false,
            term_width: 0,
            multiline: false,
        }
    }

    fn put(&mut self, bytes: &[u8]) {
        self.dest.write_all(bytes);
    }

    pub(crate) fn flush_dest(&mut self) {
        self.dest.flush();
    }

    pub(crate) fn set_multiline(&mut self, multiline: bool) {
        self.multiline = multiline;
    }

    pub(crate) fn set_term_width(&mut self, width: u16) {
        self.term_width = width;
    }

    /// Usable columns for partial rows: one less than the terminal width so
    /// the cursor never wraps.
    pub(crate) fn max_partial_width(&self) -> usize {
        let width = if self.term_width != 0 {
            self.term_width
        } else {
            self.query_width().unwrap_or_else(|| {
                tracing::debug!("terminal width query failed, assuming 80 columns");
                FALLBACK_TERM_WIDTH
            })
        };
        usize::from(width).saturating_sub(1)
    }

    #[cfg(unix)]
    fn query_width(&self) -> Option<u16> {
        // Custom writers are sized like stderr: usually right, and an
        // explicit `set_terminal_width` overrides it when it is not.
        let size = match &self.dest {
            SinkDest::Stdout(_) => rustix::termios::tcgetwinsize(io::stdout()).ok()?,
            _ => rustix::termios::tcgetwinsize(io::stderr()).ok()?,
        };
        (size.ws_col > 0).then_some(size.ws_col)
    }

    #[cfg(not(unix))]
    fn query_width(&self) -> Option<u16> {
        None
    }

    // ── Partial-logger bookkeeping ───────────────────────────────────

    pub(crate) fn attach_partial(&mut self, logger: Weak<Logger>) {
        self.partial_loggers.push(logger);
    }

    pub(crate) fn detach_partial(&mut self, logger: &Logger) {
        let target: *const Logger = logger;
        if let Some(pos) = self
            .partial_loggers
            .iter()
            .position(|weak| std::ptr::eq(weak.as_ptr(), target))
        {
            self.partial_loggers.remove(pos);
        }
    }

    /// Live partial loggers, in presentation order; dead entries are
    /// pruned as a side effect.
    pub(crate) fn live_partials(&mut self) -> Vec<Arc<Logger>> {
        self.partial_loggers.retain(|weak| weak.strong_count() > 0);
        self.partial_loggers
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    // ── Cursor motion ────────────────────────────────────────────────

    /// Move the cursor to `row`, one step at a time, ending in column 0.
    /// Returns whether any motion was emitted.
    fn move_to_row(&mut self, row: i64) -> bool {
        if row == self.cursor_row {
            return false;
        }
        let mut motion = Vec::new();
        let mut at = self.cursor_row;
        while at != row {
            if row < at {
                motion.extend_from_slice(CURSOR_UP_ONE);
                at -= 1;
            } else {
                motion.extend_from_slice(CURSOR_DOWN_ONE);
                at += 1;
            }
        }
        motion.extend_from_slice(CARRIAGE_RETURN);
        self.put(&motion);
        self.cursor_row = row;
        self.cursor_at_begin = true;
        self.cursor_inline = false;
        true
    }

    // ── Painting ─────────────────────────────────────────────────────

    /// Repaint one partial row to show exactly `buf`.
    ///
    /// Three paths, cheapest first: identical content is a no-op; when the
    /// cursor already rests at the end of a row that `buf` merely extends,
    /// only the suffix is written; otherwise the row is repainted from
    /// column 0 with the previous SGR state neutralized and leftover glyphs
    /// blanked out.
    pub(crate) fn paint_partial_at(&mut self, row: usize, buf: &[u8]) {
        let last = self.last_painted[row].clone();
        if last == buf {
            return;
        }

        let extend_in_place = self.cursor_row == row as i64
            && self.cursor_inline
            && buf.len() >= last.len()
            && buf.starts_with(&last);

        if extend_in_place {
            self.put(&buf[last.len()..]);
        } else {
            let reset = SgrState::scan(&last).reset_bytes();
            self.put(reset);
            if !self.move_to_row(row as i64) && !self.cursor_at_begin {
                self.put(CARRIAGE_RETURN);
            }
            self.put(buf);
            let curr_width = display_width(buf);
            let last_width = display_width(&last);
            if curr_width < last_width {
                let blanks = vec![b' '; last_width - curr_width];
                self.put(&blanks);
            }
            self.cursor_inline = curr_width >= last_width;
        }

        self.cursor_at_begin = false;
        self.last_painted[row] = buf.to_vec();
    }

    /// Emit a completed line into the scroll region.
    ///
    /// The line is painted over row 0, the SGR state is closed, and the
    /// partial rows shuffle so the next repaint finds a blank bottom row:
    /// in multiline mode row 0 scrolls out of the partial region, in
    /// single-line mode a newline pushes the status row down.
    pub(crate) fn emit_full_line(&mut self, buf: &[u8]) {
        self.paint_partial_at(0, buf);
        let reset = SgrState::scan(buf).reset_bytes();
        self.put(reset);

        if self.multiline {
            self.last_painted.remove(0);
            if self.last_painted.is_empty() {
                self.last_painted.push(Vec::new());
                self.move_to_row(0);
                self.put(b"\n");
            } else {
                // The remaining rows are now one row higher on screen; the
                // cursor, still on the emitted line, is one row above the
                // new row 0.
                self.cursor_row = -1;
                self.move_to_row(0);
            }
        } else {
            self.put(b"\n");
            self.last_painted[0].clear();
            self.cursor_at_begin = true;
            self.cursor_inline = false;
        }
    }

    /// Repaint the partial region from the given per-logger formatted
    /// buffers (one per attached logger, in attachment order).
    pub(crate) fn repaint_partials(&mut self, bufs: &[Vec<u8>]) {
        let max_width = self.max_partial_width();
        if self.multiline {
            // Grow the region one blank row at a time, scrolling from the
            // bottom row so rows above keep their content.
            for row in self.last_painted.len()..bufs.len() {
                self.move_to_row(row as i64 - 1);
                self.put(b"\n");
                self.cursor_row = row as i64;
                self.cursor_at_begin = true;
                self.cursor_inline = false;
                self.last_painted.push(Vec::new());
            }
            for (row, buf) in bufs.iter().enumerate() {
                let fitted = trim_ellipsis(buf, max_width);
                self.paint_partial_at(row, &fitted);
            }
        } else {
            let joined = fit_segments(bufs, max_width);
            self.paint_partial_at(0, &joined);
        }
    }
}

// ── Single-line fitting ──────────────────────────────────────────────────

/// Join partial segments with ` | `, shaving the longest segment first
/// until everything fits in `max_width` columns.
///
/// The first time a segment is shaved it loses an extra `ELLIPSIS_WIDTH +
/// 1` columns to make room for the dots; segments are never attacked once
/// the longest is below [`MIN_SEGMENT_WIDTH`]. A final pass clamps the
/// joined line itself.
pub(crate) fn fit_segments(bufs: &[Vec<u8>], max_width: usize) -> Vec<u8> {
    let mut pieces: Vec<Vec<u8>> = bufs.to_vec();

    if pieces.len() > 1 {
        let lengths: Vec<usize> = pieces.iter().map(|b| display_width(b)).collect();
        let mut length_sum: usize = lengths.iter().sum();
        let chars_left =
            max_width.saturating_sub(SEGMENT_SEPARATOR_WIDTH * (pieces.len() - 1));

        if chars_left < length_sum {
            let mut shortened = lengths.clone();
            while chars_left < length_sum {
                let mut longest_index = 0;
                let mut longest_length = 0;
                for (i, &len) in shortened.iter().enumerate() {
                    if len > longest_length {
                        longest_index = i;
                        longest_length = len;
                    }
                }
                if longest_length < MIN_SEGMENT_WIDTH {
                    break;
                }
                if longest_length == lengths[longest_index] {
                    // First shave: also reserve room for the ellipsis.
                    shortened[longest_index] -= ELLIPSIS_WIDTH + 1;
                } else {
                    shortened[longest_index] -= 1;
                }
                length_sum -= 1;
            }
            for (i, piece) in pieces.iter_mut().enumerate() {
                if shortened[i] < lengths[i] {
                    let mut cut = trim(piece, shortened[i]).to_vec();
                    cut.extend_from_slice(ELLIPSIS);
                    *piece = cut;
                }
            }
        }
    }

    let mut joined = Vec::new();
    for (i, piece) in pieces.iter().enumerate() {
        if i > 0 {
            joined.extend_from_slice(SEGMENT_SEPARATOR);
        }
        joined.extend_from_slice(piece);
    }
    trim_ellipsis(&joined, max_width)
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> (SinkState, std::sync::Arc<Mutex<Vec<u8>>>) {
        let captured = std::sync::Arc::new(Mutex::new(Vec::new()));
        let writer = CapturingWriter {
            captured: captured.clone(),
        };
        let mut state = SinkState::new(SinkDest::Custom(Box::new(writer)));
        state.set_term_width(40);
        (state, captured)
    }

    struct CapturingWriter {
        captured: std::sync::Arc<Mutex<Vec<u8>>>,
    }

    impl Write for CapturingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            lock_unpoisoned(&self.captured).extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn drain(captured: &Mutex<Vec<u8>>) -> Vec<u8> {
        std::mem::take(&mut *lock_unpoisoned(captured))
    }

    #[test]
    fn first_paint_writes_row() {
        let (mut state, captured) = test_state();
        state.paint_partial_at(0, b"working");
        assert_eq!(drain(&captured), b"working");
        assert!(state.cursor_inline);
        assert!(!state.cursor_at_begin);
    }

    #[test]
    fn repaint_same_content_is_silent() {
        let (mut state, captured) = test_state();
        state.paint_partial_at(0, b"same");
        drain(&captured);
        state.paint_partial_at(0, b"same");
        assert_eq!(drain(&captured), b"");
    }

    #[test]
    fn extension_writes_suffix_only() {
        let (mut state, captured) = test_state();
        state.paint_partial_at(0, b"down");
        drain(&captured);
        state.paint_partial_at(0, b"downloading");
        assert_eq!(drain(&captured), b"loading");
    }

    #[test]
    fn shrink_repaints_and_blanks_leftovers() {
        let (mut state, captured) = test_state();
        state.paint_partial_at(0, b"longer text");
        drain(&captured);
        state.paint_partial_at(0, b"short");
        // CR back to column 0, new text, six blanks over the leftovers.
        assert_eq!(drain(&captured), b"\rshort      ");
        assert!(!state.cursor_inline);
    }

    #[test]
    fn paint_neutralizes_previous_sgr() {
        let (mut state, captured) = test_state();
        state.paint_partial_at(0, b"\x1b[31mred");
        drain(&captured);
        state.paint_partial_at(0, b"plainer");
        let out = drain(&captured);
        assert!(out.starts_with(b"\x1b[39m\r"), "got {:?}", out);
        assert!(out.ends_with(b"plainer"));
    }

    #[test]
    fn full_line_single_mode_scrolls_and_clears() {
        let (mut state, captured) = test_state();
        state.paint_partial_at(0, b"partial");
        drain(&captured);
        state.emit_full_line(b"done and dusted");
        let out = drain(&captured);
        assert!(out.ends_with(b"\n"));
        assert_eq!(state.last_painted, vec![Vec::<u8>::new()]);
        assert!(state.cursor_at_begin);
        assert!(!state.cursor_inline);
    }

    #[test]
    fn full_line_multiline_pops_top_row() {
        let (mut state, captured) = test_state();
        state.set_multiline(true);
        state.repaint_partials(&[b"one".to_vec(), b"two".to_vec()]);
        drain(&captured);
        state.emit_full_line(b"finished");
        let out = drain(&captured);
        // The emitted line lands on row 0; the remaining partial row is
        // reached by moving down from the line above it.
        assert!(out.windows(CURSOR_DOWN_ONE.len()).any(|w| w == CURSOR_DOWN_ONE));
        assert_eq!(state.last_painted.len(), 1);
        assert_eq!(state.last_painted[0], b"two");
        assert_eq!(state.cursor_row, 0);
    }

    #[test]
    fn multiline_growth_scrolls_bottom_row() {
        let (mut state, captured) = test_state();
        state.set_multiline(true);
        state.repaint_partials(&[b"alpha".to_vec()]);
        drain(&captured);
        state.repaint_partials(&[b"alpha".to_vec(), b"beta".to_vec()]);
        let out = drain(&captured);
        assert!(out.contains(&b'\n'));
        assert!(out.ends_with(b"beta"));
        assert_eq!(state.last_painted.len(), 2);
    }

    #[test]
    fn repaint_clips_to_width() {
        let (mut state, captured) = test_state();
        state.set_term_width(10);
        state.repaint_partials(&[b"abcdefghijklmno".to_vec()]);
        let out = drain(&captured);
        assert_eq!(out, b"abcdef...");
        assert_eq!(display_width(&out), 9);
    }

    #[test]
    fn fit_single_segment_untouched() {
        assert_eq!(fit_segments(&[b"short".to_vec()], 19), b"short");
    }

    #[test]
    fn fit_joins_with_separator() {
        assert_eq!(
            fit_segments(&[b"aa".to_vec(), b"bb".to_vec()], 19),
            b"aa | bb"
        );
    }

    #[test]
    fn fit_shaves_longest_first() {
        let out = fit_segments(
            &[
                b"AAAAAAAAAA".to_vec(),
                b"BBBBB".to_vec(),
                b"CCCCCCCC".to_vec(),
            ],
            19,
        );
        // The ten-wide and eight-wide segments are shaved (longest first,
        // each losing ellipsis room on its first cut) until the widest
        // survivor drops below the floor; the final clamp then fits the
        // joined line itself.
        assert_eq!(out, b"AAAAA... | BBBBB...");
        assert_eq!(display_width(&out), 19);
    }

    #[test]
    fn fit_generous_width_keeps_all_segments() {
        let out = fit_segments(
            &[
                b"AAAAAAAAAA".to_vec(),
                b"BBBBB".to_vec(),
                b"CCCCCCCC".to_vec(),
            ],
            40,
        );
        assert_eq!(out, b"AAAAAAAAAA | BBBBB | CCCCCCCC");
    }

    #[test]
    fn fit_stops_shaving_at_segment_floor() {
        // All segments start equal; each takes one first-cut shave and then
        // the loop hits the floor rather than grinding them to nothing.
        let out = fit_segments(
            &[b"AAAAAAAA".to_vec(), b"BBBBBBBB".to_vec(), b"CCCCCCCC".to_vec()],
            6,
        );
        assert!(display_width(&out) <= 6);
        assert!(out.ends_with(ELLIPSIS));
    }

    #[test]
    fn fit_empty_input_is_empty() {
        assert_eq!(fit_segments(&[], 19), b"");
    }

    #[test]
    fn move_to_row_emits_single_steps() {
        let (mut state, captured) = test_state();
        state.set_multiline(true);
        state.repaint_partials(&[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        drain(&captured);
        // Cursor sits on row 2 after painting "c"; repainting row 0 with
        // new content must walk up two rows.
        state.repaint_partials(&[b"aX".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        let out = drain(&captured);
        let ups = out
            .windows(CURSOR_UP_ONE.len())
            .filter(|w| *w == CURSOR_UP_ONE)
            .count();
        assert_eq!(ups, 2);
    }
}
