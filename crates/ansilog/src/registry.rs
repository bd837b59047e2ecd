#![forbid(unsafe_code)]

//! The process-wide logging registry.
//!
//! A single [`LogSystem`] owns everything loggers share: the standard
//! stream sinks, the weak lists of every sink and logger ever created, the
//! color name table, the defaults block that tri-state toggles inherit
//! from, and the default logger itself. The crate-root facade functions
//! delegate to a lazily constructed global instance; embedders who want an
//! isolated system for tests can still reach everything through explicit
//! [`Logger`](crate::logger::Logger) and [`Sink`] handles.
//!
//! Shutdown locks every sink, flushes and closes the loggers attached to
//! each, and exits with status 1 while still holding the locks; nothing
//! may interleave with the final flush.

use std::io;
use std::sync::{Arc, LazyLock, RwLock, Weak};

use regex::bytes::Regex;

use crate::color::{ColorCode, ColorTable};
use crate::logger::Logger;
use crate::sink::{Sink, SinkDest, SinkShared};
use crate::template;

/// Prefix of the default logger: a dim ISO timestamp.
const DEFAULT_PREFIX: &str = "@(dim:{isodate}) ";

/// Fallback values for the tri-state logger toggles, plus the stock
/// template pattern. Written by the default logger's setters, read by
/// every logger whose own toggle is unset.
#[derive(Clone)]
pub struct Defaults {
    pub partial_lines: bool,
    pub color: bool,
    pub color_templates: bool,
    pub auto_newline: bool,
    pub template_pattern: Regex,
}

/// The process-wide registry.
pub struct LogSystem {
    stdout: Sink,
    stderr: Sink,
    sinks: RwLock<Vec<Weak<SinkShared>>>,
    loggers: RwLock<Vec<Weak<Logger>>>,
    defaults: RwLock<Defaults>,
    colors: RwLock<ColorTable>,
    default_logger: Arc<Logger>,
}

static SYSTEM: LazyLock<LogSystem> = LazyLock::new(LogSystem::new);

/// The global instance behind the crate-root facade.
pub fn system() -> &'static LogSystem {
    &SYSTEM
}

impl LogSystem {
    fn new() -> Self {
        let stdout = Sink::with_dest(SinkDest::Stdout(io::stdout()));
        let stderr = Sink::with_dest(SinkDest::Stderr(io::stderr()));
        let default_logger = Logger::new_default(stderr.clone(), DEFAULT_PREFIX);
        LogSystem {
            sinks: RwLock::new(vec![stdout.downgrade(), stderr.downgrade()]),
            loggers: RwLock::new(vec![Arc::downgrade(&default_logger)]),
            defaults: RwLock::new(Defaults {
                partial_lines: true,
                color: true,
                color_templates: true,
                auto_newline: false,
                template_pattern: template::stock_pattern(),
            }),
            colors: RwLock::new(ColorTable::stock()),
            stdout,
            stderr,
            default_logger,
        }
    }

    /// The logger the crate-root facade writes through: standard error,
    /// dim ISO timestamp prefix, partial lines on, color on, templates on,
    /// auto-newline off.
    #[must_use]
    pub fn default_logger(&self) -> &Arc<Logger> {
        &self.default_logger
    }

    pub(crate) fn stdout_sink(&self) -> Sink {
        self.stdout.clone()
    }

    pub(crate) fn stderr_sink(&self) -> Sink {
        self.stderr.clone()
    }

    pub(crate) fn register_sink(&self, sink: &Sink) {
        let mut sinks = self.sinks.write().unwrap_or_else(|e| e.into_inner());
        sinks.retain(|weak| weak.strong_count() > 0);
        sinks.push(sink.downgrade());
    }

    pub(crate) fn register_logger(&self, logger: &Arc<Logger>) {
        let mut loggers = self.loggers.write().unwrap_or_else(|e| e.into_inner());
        loggers.retain(|weak| weak.strong_count() > 0);
        loggers.push(Arc::downgrade(logger));
    }

    pub(crate) fn defaults_snapshot(&self) -> Defaults {
        self.defaults
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn update_defaults(&self, f: impl FnOnce(&mut Defaults)) {
        let mut defaults = self.defaults.write().unwrap_or_else(|e| e.into_inner());
        f(&mut defaults);
    }

    pub(crate) fn with_colors<R>(&self, f: impl FnOnce(&ColorTable) -> R) -> R {
        let colors = self.colors.read().unwrap_or_else(|e| e.into_inner());
        f(&colors)
    }

    /// Register (or replace) a color name usable in templates.
    pub fn add_color_code(&self, name: &str, code: ColorCode) {
        let mut colors = self.colors.write().unwrap_or_else(|e| e.into_inner());
        colors.add(name, code);
    }

    /// Flush every live registered logger, completing any dangling lines.
    pub fn flush_all(&self) {
        let live: Vec<Arc<Logger>> = {
            let mut loggers = self.loggers.write().unwrap_or_else(|e| e.into_inner());
            loggers.retain(|weak| weak.strong_count() > 0);
            loggers.iter().filter_map(Weak::upgrade).collect()
        };
        for logger in live {
            logger.flush();
        }
    }

    /// Flush and close every logger attached to any sink, then terminate
    /// the process with status 1.
    ///
    /// The registry read lock and every sink lock are held through the
    /// exit: no new sinks can appear and no bytes can interleave with the
    /// final flush.
    pub fn shutdown_and_exit(&self) -> ! {
        let sinks_guard = self.sinks.read().unwrap_or_else(|e| e.into_inner());
        let live: Vec<Arc<SinkShared>> =
            sinks_guard.iter().filter_map(Weak::upgrade).collect();
        let mut guards = Vec::with_capacity(live.len());
        for shared in &live {
            let mut state = shared.lock();
            for logger in state.live_partials() {
                logger.close_core(&mut state);
            }
            state.flush_dest();
            guards.push(state);
        }
        std::process::exit(1);
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
