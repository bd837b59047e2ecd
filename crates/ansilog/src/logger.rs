#![forbid(unsafe_code)]

//! The logger and its emit pipeline.
//!
//! A [`Logger`] owns a prefix, header flags, a [`LineBuffer`] and a handle
//! to the sink it writes through. Emitting splits the buffered bytes into
//! completed lines (formatted and scrolled out through the sink's paint
//! machine) and a residue, which turns the logger into a
//! partial-line holder repainted in place on every subsequent write to the
//! same sink.
//!
//! # Locking
//!
//! The process-wide order is **sink state → logger core**. An emit locks
//! the sink first (retrying if a concurrent `set_output` rebinds the
//! logger mid-acquisition), works on its own core, then releases the core
//! and formats every partial logger's line one core at a time for the
//! repaint. Cores of loggers bound to a sink are only ever locked by
//! threads holding that sink's lock, so the one-at-a-time pass cannot
//! deadlock.
//!
//! Tri-state toggles (`Option<bool>`) resolve against the registry's
//! defaults block at read time; the default logger's setters write that
//! block, so reconfiguring it reconfigures every inheriting logger.

use std::fmt::Display;
use std::io;
use std::panic::Location;
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use memchr::memchr;
use regex::bytes::Regex;

use crate::ansi::SgrState;
use crate::error::Error;
use crate::header::{Flags, Header};
use crate::line_buffer::LineBuffer;
use crate::registry::system;
use crate::sink::{lock_unpoisoned, Sink, SinkState};
use crate::template;
use crate::width::{display_width, strip_sgr};

/// Pluggable wall-clock source, the `now()` boundary. Returns UTC; the
/// logger converts according to its flags.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const TAB_REPLACEMENT: &[u8] = b"        ";

/// A logging handle bound to one sink.
///
/// Loggers are shared as `Arc<Logger>`; all methods take `&self` and are
/// safe to call from any thread.
pub struct Logger {
    pub(crate) weak: Weak<Logger>,
    pub(crate) core: Mutex<LoggerCore>,
}

pub(crate) struct LoggerCore {
    pub(crate) sink: Sink,
    prefix: Vec<u8>,
    prefix_formatted: Vec<u8>,
    flags: Flags,
    buf: LineBuffer,
    partial_active: bool,
    closed: bool,
    is_default: bool,

    // Tri-state toggles; `None` inherits from the registry defaults.
    partial_lines: Option<bool>,
    color: Option<bool>,
    color_templates: Option<bool>,
    auto_newline: Option<bool>,
    template_pattern: Option<Regex>,

    clock: Option<Clock>,
    caller: Option<(String, u32)>,
    now: NaiveDateTime,
    line_start: Option<NaiveDateTime>,
}

impl Logger {
    /// Create a logger writing through `sink` with the given prefix and
    /// header flags. The prefix is template-expanded once, now.
    #[must_use]
    pub fn new(sink: Sink, prefix: &str, flags: Flags) -> Arc<Logger> {
        let logger = Self::build(sink, prefix, flags, false);
        {
            // Not yet shared; the core lock alone is enough here.
            let mut core = lock_unpoisoned(&logger.core);
            reprocess_prefix(&mut core);
        }
        system().register_logger(&logger);
        logger
    }

    /// Construct the default logger. Avoids every registry lookup so it can
    /// run while the registry itself is being initialized.
    pub(crate) fn new_default(sink: Sink, prefix: &str) -> Arc<Logger> {
        let logger = Self::build(sink, prefix, Flags::empty(), true);
        {
            let mut core = lock_unpoisoned(&logger.core);
            core.prefix_formatted = template::expand(
                &template::stock_pattern(),
                &crate::color::ColorTable::stock(),
                prefix.as_bytes(),
            );
        }
        logger
    }

    fn build(sink: Sink, prefix: &str, flags: Flags, is_default: bool) -> Arc<Logger> {
        Arc::new_cyclic(|weak| Logger {
            weak: weak.clone(),
            core: Mutex::new(LoggerCore {
                sink,
                prefix: prefix.as_bytes().to_vec(),
                prefix_formatted: prefix.as_bytes().to_vec(),
                flags,
                buf: LineBuffer::new(),
                partial_active: false,
                closed: false,
                is_default,
                partial_lines: None,
                color: None,
                color_templates: None,
                auto_newline: None,
                template_pattern: None,
                clock: None,
                caller: None,
                now: Utc::now().naive_utc(),
                line_start: None,
            }),
        })
    }

    // ── Emitting ─────────────────────────────────────────────────────

    /// Emit a message with color templates expanded.
    #[track_caller]
    pub fn print(&self, msg: impl AsRef<str>) -> Result<(), Error> {
        let caller = Location::caller();
        self.emit(msg.as_ref().as_bytes(), Some(caller), true)
    }

    /// Emit a message plus a trailing newline, templates expanded.
    #[track_caller]
    pub fn println(&self, msg: impl AsRef<str>) -> Result<(), Error> {
        let caller = Location::caller();
        let mut bytes = msg.as_ref().as_bytes().to_vec();
        bytes.push(b'\n');
        self.emit(&bytes, Some(caller), true)
    }

    /// Emit a message verbatim: no template expansion. The entry point for
    /// data that must never be interpreted.
    #[track_caller]
    pub fn output(&self, msg: impl AsRef<str>) -> Result<(), Error> {
        let caller = Location::caller();
        self.emit(msg.as_ref().as_bytes(), Some(caller), false)
    }

    /// Discard the line under construction and emit `msg` in its place.
    /// The partial row repaints to show the new text.
    #[track_caller]
    pub fn replace(&self, msg: impl AsRef<str>) -> Result<(), Error> {
        let caller = Location::caller();
        self.with_sink(|ws| {
            let result = {
                let mut core = self.lock_core();
                core.buf.reset();
                self.emit_core(ws, &mut core, msg.as_ref().as_bytes(), Some(caller), true)
            };
            self.repaint_partials(ws);
            ws.flush_dest();
            result
        })
    }

    /// Complete any line under construction by emitting a newline for it.
    pub fn flush(&self) {
        self.with_sink(|ws| {
            self.flush_core(ws);
            self.repaint_partials(ws);
            ws.flush_dest();
        });
    }

    /// Flush, then refuse all further writes.
    pub fn close(&self) {
        self.with_sink(|ws| {
            self.flush_core(ws);
            {
                let mut core = self.lock_core();
                core.closed = true;
            }
            self.repaint_partials(ws);
            ws.flush_dest();
        });
    }

    /// Emit `msg`, flush every sink, and exit the process with status 1.
    #[track_caller]
    pub fn fatal(&self, msg: impl AsRef<str>) -> ! {
        let caller = Location::caller();
        let _ = self.emit(msg.as_ref().as_bytes(), Some(caller), true);
        system().shutdown_and_exit()
    }

    /// Emit `msg`, flush this logger, then panic with the same message.
    #[track_caller]
    pub fn panic_with(&self, msg: impl AsRef<str>) -> ! {
        let caller = Location::caller();
        let msg = msg.as_ref().to_string();
        let _ = self.emit(msg.as_bytes(), Some(caller), true);
        self.flush();
        panic!("{msg}");
    }

    /// Flush, emit this call site's stack trace (minus the frames of `bail`
    /// itself) line by line, report the error, and exit with status 1.
    pub fn bail(&self, err: &dyn Display) -> ! {
        let trace = std::backtrace::Backtrace::force_capture().to_string();
        self.with_sink(|ws| {
            self.flush_core(ws);
            let mut core = self.lock_core();
            let mut skip_location_line = false;
            for line in trace.lines() {
                if line.contains("Logger::bail") {
                    skip_location_line = true;
                    continue;
                }
                if skip_location_line {
                    skip_location_line = false;
                    if line.trim_start().starts_with("at ") {
                        continue;
                    }
                }
                let mut bytes = line.as_bytes().to_vec();
                bytes.push(b'\n');
                let _ = self.emit_core(ws, &mut core, &bytes, None, false);
            }
            let message = format!("Bailed due to error: {err}\n");
            let _ = self.emit_core(ws, &mut core, message.as_bytes(), None, false);
            drop(core);
            ws.flush_dest();
        });
        system().shutdown_and_exit()
    }

    /// Expand color templates in `s` without emitting anything.
    #[must_use]
    pub fn colorify(&self, s: &str) -> String {
        self.with_sink(|_ws| {
            let core = self.lock_core();
            match resolve_template_pattern(&core) {
                Some(pattern) => {
                    let expanded = system()
                        .with_colors(|table| template::expand(&pattern, table, s.as_bytes()));
                    String::from_utf8_lossy(&expanded).into_owned()
                }
                None => s.to_string(),
            }
        })
    }

    // ── Configuration ────────────────────────────────────────────────

    /// Current header flags.
    #[must_use]
    pub fn flags(&self) -> Flags {
        self.with_sink(|_ws| self.lock_core().flags)
    }

    /// Replace the header flags.
    pub fn set_flags(&self, flags: Flags) {
        self.with_sink(|_ws| self.lock_core().flags = flags);
    }

    /// Current prefix, as configured (templates unexpanded).
    #[must_use]
    pub fn prefix(&self) -> String {
        self.with_sink(|_ws| {
            String::from_utf8_lossy(&self.lock_core().prefix).into_owned()
        })
    }

    /// Replace the prefix and re-expand its templates.
    pub fn set_prefix(&self, prefix: &str) {
        self.with_sink(|_ws| {
            let mut core = self.lock_core();
            core.prefix = prefix.as_bytes().to_vec();
            reprocess_prefix(&mut core);
        });
    }

    /// Rebind this logger to another sink. The line under construction is
    /// flushed to the old sink and the partial row released there.
    pub fn set_output(&self, sink: Sink) {
        self.with_sink(|ws| {
            self.flush_core(ws);
            ws.detach_partial(self);
            let mut core = self.lock_core();
            core.partial_active = false;
            core.sink = sink.clone();
        });
    }

    pub fn set_partial_lines_enabled(&self, enabled: bool) {
        self.with_sink(|_ws| {
            let mut core = self.lock_core();
            if core.is_default {
                system().update_defaults(|d| d.partial_lines = enabled);
            } else {
                core.partial_lines = Some(enabled);
            }
        });
    }

    pub fn show_partial_lines(&self) {
        self.set_partial_lines_enabled(true);
    }

    pub fn hide_partial_lines(&self) {
        self.set_partial_lines_enabled(false);
    }

    pub fn set_color_enabled(&self, enabled: bool) {
        self.with_sink(|_ws| {
            let mut core = self.lock_core();
            if core.is_default {
                system().update_defaults(|d| d.color = enabled);
            } else {
                core.color = Some(enabled);
            }
        });
    }

    pub fn enable_color(&self) {
        self.set_color_enabled(true);
    }

    pub fn disable_color(&self) {
        self.set_color_enabled(false);
    }

    pub fn set_color_templates_enabled(&self, enabled: bool) {
        self.with_sink(|_ws| {
            let mut core = self.lock_core();
            if core.is_default {
                system().update_defaults(|d| d.color_templates = enabled);
            } else {
                core.color_templates = Some(enabled);
            }
            reprocess_prefix(&mut core);
        });
    }

    pub fn enable_color_templates(&self) {
        self.set_color_templates_enabled(true);
    }

    pub fn disable_color_templates(&self) {
        self.set_color_templates_enabled(false);
    }

    pub fn set_auto_newlines(&self, enabled: bool) {
        self.with_sink(|_ws| {
            let mut core = self.lock_core();
            if core.is_default {
                system().update_defaults(|d| d.auto_newline = enabled);
            } else {
                core.auto_newline = Some(enabled);
            }
        });
    }

    pub fn enable_auto_newlines(&self) {
        self.set_auto_newlines(true);
    }

    pub fn disable_auto_newlines(&self) {
        self.set_auto_newlines(false);
    }

    /// Override the template pattern. Must keep the stock pattern's group
    /// shape (names, optional `:text`).
    pub fn set_color_template_pattern(&self, pattern: Regex) {
        self.with_sink(|_ws| {
            let mut core = self.lock_core();
            if core.is_default {
                system().update_defaults(|d| d.template_pattern = pattern.clone());
            } else {
                core.template_pattern = Some(pattern.clone());
            }
        });
    }

    /// Pin the sink's terminal width (0 reverts to discovery). Attached
    /// partial lines are flushed first so nothing is fitted to two widths.
    pub fn set_terminal_width(&self, width: u16) {
        self.with_sink(|ws| {
            flush_attached(ws);
            ws.set_term_width(width);
        });
    }

    /// One partial row per logger.
    pub fn enable_multiline_mode(&self) {
        self.set_multiline(true);
    }

    /// All partial lines joined into a single status row.
    pub fn enable_single_line_mode(&self) {
        self.set_multiline(false);
    }

    fn set_multiline(&self, multiline: bool) {
        self.with_sink(|ws| {
            flush_attached(ws);
            ws.set_multiline(multiline);
        });
    }

    /// Override the wall clock used for header timestamps.
    pub fn set_clock(&self, clock: Clock) {
        self.with_sink(|_ws| self.lock_core().clock = Some(clock));
    }

    // ── Internals ────────────────────────────────────────────────────

    pub(crate) fn lock_core(&self) -> std::sync::MutexGuard<'_, LoggerCore> {
        lock_unpoisoned(&self.core)
    }

    /// Run `f` with this logger's sink locked, retrying if a concurrent
    /// `set_output` rebinds the logger between reading the handle and
    /// acquiring the lock.
    fn with_sink<R>(&self, f: impl FnOnce(&mut SinkState) -> R) -> R {
        let mut shared = {
            let core = self.lock_core();
            core.sink.shared().clone()
        };
        loop {
            let rebound = {
                let mut ws = shared.lock();
                let core = self.lock_core();
                if Arc::ptr_eq(core.sink.shared(), &shared) {
                    drop(core);
                    return f(&mut ws);
                }
                core.sink.shared().clone()
            };
            shared = rebound;
        }
    }

    fn emit(
        &self,
        input: &[u8],
        caller: Option<&'static Location<'static>>,
        templates: bool,
    ) -> Result<(), Error> {
        self.with_sink(|ws| {
            let result = {
                let mut core = self.lock_core();
                self.emit_core(ws, &mut core, input, caller, templates)
            };
            self.repaint_partials(ws);
            ws.flush_dest();
            result
        })
    }

    /// The emit pipeline proper. Caller holds the sink lock and this
    /// logger's core; the partial repaint happens afterwards, once the
    /// core is released.
    fn emit_core(
        &self,
        ws: &mut SinkState,
        core: &mut LoggerCore,
        input: &[u8],
        caller: Option<&'static Location<'static>>,
        templates: bool,
    ) -> Result<(), Error> {
        core.now = current_time(core);
        if core.closed {
            return Err(Error::WriteToClosedLogger);
        }

        let expanded;
        let mut input: &[u8] = if templates {
            match resolve_template_pattern(core) {
                Some(pattern) => {
                    expanded =
                        system().with_colors(|table| template::expand(&pattern, table, input));
                    &expanded
                }
                None => input,
            }
        } else {
            input
        };

        let detabbed;
        if input.contains(&b'\t') {
            detabbed = replace_tabs(input);
            input = &detabbed;
        }

        let appended;
        if core.auto_newline_enabled() && input.last().is_some_and(|&b| b != b'\n') {
            let mut with_newline = input.to_vec();
            with_newline.push(b'\n');
            appended = with_newline;
            input = &appended;
        }

        core.buf.inject(input);

        let mut wrote_full_line = false;
        loop {
            let bytes = core.buf.bytes();
            let newline_idx = memchr(b'\n', bytes);
            let line_end = newline_idx.unwrap_or(bytes.len());

            // A carriage return inside the line (not the one directly
            // before the newline) rewinds the virtual cursor: detach the
            // tail and replay it from column zero.
            if let Some(cr_idx) = memchr(b'\r', &bytes[..line_end]) {
                if newline_idx != Some(cr_idx + 1) {
                    let tail = core.buf.split_at_cr(cr_idx);
                    core.buf.inject(&tail);
                    continue;
                }
            }

            let Some(newline_idx) = newline_idx else {
                break;
            };

            if core.flags.intersects(Flags::SHORT_FILE | Flags::LONG_FILE)
                && core.caller.is_none()
            {
                core.caller = Some(resolve_caller(caller, core.flags));
            }

            let line = core.buf.drain_line(newline_idx);
            ws.detach_partial(self);
            core.partial_active = false;
            let formatted = format_line(core, &line);
            ws.emit_full_line(&formatted);
            wrote_full_line = true;
        }

        if wrote_full_line {
            core.caller = None;
        }

        if !core.partial_active
            && core.partial_lines_enabled()
            && display_width(core.buf.bytes()) > 0
        {
            ws.attach_partial(self.weak.clone());
            core.partial_active = true;
            core.line_start = Some(core.now);
        }

        Ok(())
    }

    /// Complete a dangling line by emitting a newline for it.
    pub(crate) fn flush_core(&self, ws: &mut SinkState) {
        let mut core = self.lock_core();
        if !core.buf.is_empty() {
            let _ = self.emit_core(ws, &mut core, b"\n", None, false);
        }
    }

    pub(crate) fn close_core(&self, ws: &mut SinkState) {
        self.flush_core(ws);
        self.lock_core().closed = true;
    }

    /// Format every attached logger's current partial buffer and hand the
    /// batch to the paint machine. Cores are taken one at a time; the
    /// caller must not hold any.
    pub(crate) fn repaint_partials(&self, ws: &mut SinkState) {
        repaint_partials(ws);
    }
}

/// Repaint the partial region of `ws` from its attached loggers.
pub(crate) fn repaint_partials(ws: &mut SinkState) {
    let partials = ws.live_partials();
    let bufs: Vec<Vec<u8>> = partials
        .iter()
        .map(|logger| {
            let core = logger.lock_core();
            format_line(&core, core.buf.bytes())
        })
        .collect();
    ws.repaint_partials(&bufs);
}

/// Flush the line under construction of every logger attached to `ws`.
pub(crate) fn flush_attached(ws: &mut SinkState) {
    for logger in ws.live_partials() {
        logger.flush_core(ws);
    }
    repaint_partials(ws);
}

impl io::Write for &Logger {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // No caller location survives a `dyn Write` boundary; headers that
        // ask for one render the `???:0` placeholder.
        self.emit(buf, None, false)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Logger::flush(*self);
        Ok(())
    }
}

// ── Core helpers ─────────────────────────────────────────────────────────

impl LoggerCore {
    fn partial_lines_enabled(&self) -> bool {
        self.partial_lines
            .unwrap_or_else(|| system().defaults_snapshot().partial_lines)
    }

    fn color_enabled(&self) -> bool {
        self.color.unwrap_or_else(|| system().defaults_snapshot().color)
    }

    fn auto_newline_enabled(&self) -> bool {
        self.auto_newline
            .unwrap_or_else(|| system().defaults_snapshot().auto_newline)
    }

    fn color_templates_enabled(&self) -> bool {
        self.color_templates
            .unwrap_or_else(|| system().defaults_snapshot().color_templates)
    }
}

fn resolve_template_pattern(core: &LoggerCore) -> Option<Regex> {
    if !core.color_templates_enabled() {
        return None;
    }
    Some(match &core.template_pattern {
        Some(pattern) => pattern.clone(),
        None => system().defaults_snapshot().template_pattern,
    })
}

fn reprocess_prefix(core: &mut LoggerCore) {
    core.prefix_formatted = match resolve_template_pattern(core) {
        Some(pattern) => {
            system().with_colors(|table| template::expand(&pattern, table, &core.prefix))
        }
        None => core.prefix.clone(),
    };
}

fn current_time(core: &LoggerCore) -> NaiveDateTime {
    let utc = match &core.clock {
        Some(clock) => clock(),
        None => Utc::now(),
    };
    if core.flags.contains(Flags::UTC) {
        utc.naive_utc()
    } else {
        utc.with_timezone(&Local).naive_local()
    }
}

fn resolve_caller(
    caller: Option<&'static Location<'static>>,
    flags: Flags,
) -> (String, u32) {
    let Some(location) = caller else {
        // Entry points behind a `dyn Write` cannot carry a call site.
        tracing::debug!("no caller location available for file:line header");
        return ("???".to_string(), 0);
    };
    let mut file = location.file();
    if flags.contains(Flags::SHORT_FILE) {
        if let Some(idx) = file.rfind('/') {
            file = &file[idx + 1..];
        }
    }
    (file.to_string(), location.line())
}

/// Header plus message, with the header's SGR state closed before the
/// message so prefix colors never leak into user text. With color disabled
/// the whole line is stripped of escapes at the end.
pub(crate) fn format_line(core: &LoggerCore, line: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(core.prefix_formatted.len() + line.len() + 16);
    let header = Header {
        prefix_formatted: &core.prefix_formatted,
        flags: core.flags,
        now: core.now,
        line_start: core.line_start,
        caller: core.caller.as_ref().map(|(file, line)| (file.as_str(), *line)),
    };
    header.render_into(&mut out);
    let reset = SgrState::scan(&out).reset_bytes();
    out.extend_from_slice(reset);
    out.extend_from_slice(line);
    if core.color_enabled() {
        out
    } else {
        strip_sgr(&out)
    }
}

fn replace_tabs(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + 8);
    for &b in input {
        if b == b'\t' {
            out.extend_from_slice(TAB_REPLACEMENT);
        } else {
            out.push(b);
        }
    }
    out
}
