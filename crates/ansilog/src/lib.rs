#![forbid(unsafe_code)]

//! Concurrent terminal logging with in-place partial-line indicators.
//!
//! Loggers write complete lines that scroll like ordinary output, while
//! any line still under construction is painted as a transient *partial
//! line* pinned to the bottom of the terminal and repainted in place as it
//! grows or is rewritten. Any number of loggers can share one sink; their
//! partial lines compose into either a single fitted status row or a stack
//! of rows, and every full line slides out above them.
//!
//! # Quick start
//!
//! ```
//! use ansilog::{Flags, Logger, Sink};
//!
//! let sink = Sink::from_writer(Vec::<u8>::new());
//! let log = Logger::new(sink, "@(green:build) ", Flags::empty());
//!
//! log.print("compiling...").unwrap();        // partial line, repainted in place
//! log.print("\rcompiled 10 files").unwrap();  // rewrites it from column 0
//! log.println(", done").unwrap();             // completes the line; it scrolls out
//! ```
//!
//! # Color templates
//!
//! Prefixes and messages may carry `@(name,name:text)` templates:
//! `@(red:failed)` prints `failed` in red and restores the previous state,
//! `@(bright,blue)` switches style for the rest of the line. Unknown names
//! leave the template text untouched. See [`ColorCode`] for the stock
//! names; extend the table with [`add_color_code`].
//!
//! # The default logger
//!
//! The crate-root functions mirror the [`Logger`] methods and delegate to
//! a process-wide default logger: standard error, a dim ISO-8601 timestamp
//! prefix, partial lines enabled. It also provides the fallback for every
//! logger toggle left unset, so `ansilog::disable_color()` turns color off
//! for every logger that never chose its own setting.
//!
//! # Concurrency
//!
//! All rendering happens synchronously on the calling thread under the
//! sink's lock; bytes reaching a sink are a serialization of whole emit
//! operations, never an interleaving. There are no background threads.

mod ansi;
mod color;
mod error;
mod header;
mod line_buffer;
mod logger;
mod registry;
mod sink;
mod template;
mod width;

pub use ansi::SgrState;
pub use color::{ColorCode, ColorTable};
pub use error::Error;
pub use header::{format_duration, Flags};
pub use logger::{Clock, Logger};
pub use registry::{system, LogSystem};
pub use sink::Sink;
pub use width::{display_width, strip_sgr, trim, trim_ellipsis};

use std::fmt::Display;
use std::sync::Arc;

use regex::bytes::Regex;

/// The process-wide default logger (standard error, dim ISO timestamp).
#[must_use]
pub fn default_logger() -> Arc<Logger> {
    system().default_logger().clone()
}

/// Emit through the default logger, expanding color templates.
#[track_caller]
pub fn print(msg: impl AsRef<str>) -> Result<(), Error> {
    system().default_logger().print(msg)
}

/// Emit a line through the default logger, expanding color templates.
#[track_caller]
pub fn println(msg: impl AsRef<str>) -> Result<(), Error> {
    system().default_logger().println(msg)
}

/// Emit through the default logger without template expansion.
#[track_caller]
pub fn output(msg: impl AsRef<str>) -> Result<(), Error> {
    system().default_logger().output(msg)
}

/// Replace the default logger's partial line.
#[track_caller]
pub fn replace(msg: impl AsRef<str>) -> Result<(), Error> {
    system().default_logger().replace(msg)
}

/// Flush the default logger's partial line, if any.
pub fn flush() {
    system().default_logger().flush();
}

/// Flush every registered logger.
pub fn flush_all() {
    system().flush_all();
}

/// Emit through the default logger, then flush all sinks and exit 1.
#[track_caller]
pub fn fatal(msg: impl AsRef<str>) -> ! {
    system().default_logger().fatal(msg)
}

/// Emit through the default logger, flush it, then panic with `msg`.
#[track_caller]
pub fn panic_with(msg: impl AsRef<str>) -> ! {
    system().default_logger().panic_with(msg)
}

/// Flush, emit a stack trace and the error, then exit 1.
pub fn bail(err: &dyn Display) -> ! {
    system().default_logger().bail(err)
}

/// Expand color templates with the default logger's settings.
#[must_use]
pub fn colorify(s: &str) -> String {
    system().default_logger().colorify(s)
}

/// Header flags of the default logger.
#[must_use]
pub fn flags() -> Flags {
    system().default_logger().flags()
}

/// Set the default logger's header flags.
pub fn set_flags(flags: Flags) {
    system().default_logger().set_flags(flags);
}

/// Prefix of the default logger, templates unexpanded.
#[must_use]
pub fn prefix() -> String {
    system().default_logger().prefix()
}

/// Set the default logger's prefix.
pub fn set_prefix(prefix: &str) {
    system().default_logger().set_prefix(prefix);
}

/// Rebind the default logger to another sink.
pub fn set_output(sink: Sink) {
    system().default_logger().set_output(sink);
}

/// Enable partial lines wherever the toggle is unset.
pub fn show_partial_lines() {
    system().default_logger().show_partial_lines();
}

/// Disable partial lines wherever the toggle is unset.
pub fn hide_partial_lines() {
    system().default_logger().hide_partial_lines();
}

/// Enable color output wherever the toggle is unset.
pub fn enable_color() {
    system().default_logger().enable_color();
}

/// Strip all SGR escapes wherever the toggle is unset.
pub fn disable_color() {
    system().default_logger().disable_color();
}

/// Enable `@(...)` template expansion wherever the toggle is unset.
pub fn enable_color_templates() {
    system().default_logger().enable_color_templates();
}

/// Disable `@(...)` template expansion wherever the toggle is unset.
pub fn disable_color_templates() {
    system().default_logger().disable_color_templates();
}

/// Append a newline to unterminated emits wherever the toggle is unset.
pub fn enable_auto_newlines() {
    system().default_logger().enable_auto_newlines();
}

/// Stop appending newlines wherever the toggle is unset.
pub fn disable_auto_newlines() {
    system().default_logger().disable_auto_newlines();
}

/// Override the template pattern used where no per-logger pattern is set.
pub fn set_color_template_pattern(pattern: Regex) {
    system().default_logger().set_color_template_pattern(pattern);
}

/// Pin the default sink's terminal width (0 reverts to discovery).
pub fn set_terminal_width(width: u16) {
    system().default_logger().set_terminal_width(width);
}

/// One partial row per logger on the default sink.
pub fn enable_multiline_mode() {
    system().default_logger().enable_multiline_mode();
}

/// Join all partial lines into one status row on the default sink.
pub fn enable_single_line_mode() {
    system().default_logger().enable_single_line_mode();
}

/// Register a color name for use in templates.
pub fn add_color_code(name: &str, code: ColorCode) {
    system().add_color_code(name, code);
}
