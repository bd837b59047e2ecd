#![forbid(unsafe_code)]

//! Per-line header construction.
//!
//! A line header is the logger's template-expanded prefix with `{…}` tokens
//! substituted, followed by whatever the [`Flags`] ask for: timestamps,
//! `file:line:`, elapsed time. Durations render as a four-character
//! magnitude plus a one or two character unit so columns stay aligned as
//! values cross unit boundaries.

use std::time::Duration;

use bitflags::bitflags;
use chrono::{Datelike, NaiveDateTime, Timelike};

bitflags! {
    /// Header content selection, one bit per ingredient.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u32 {
        /// Date as `YYYY/MM/DD`.
        const DATE = 1 << 0;
        /// Time as `HH:MM:SS`.
        const TIME = 1 << 1;
        /// Microsecond resolution for `TIME` / `ISO_DATE`.
        const MICROSECONDS = 1 << 2;
        /// Full path `file:line:`.
        const LONG_FILE = 1 << 3;
        /// Basename `file:line:`; wins over `LONG_FILE`.
        const SHORT_FILE = 1 << 4;
        /// Use UTC instead of local time.
        const UTC = 1 << 5;
        /// Elapsed time since the line was started, in parentheses.
        const ELAPSED = 1 << 6;
        /// ISO 8601 timestamp; wins over `DATE`/`TIME`.
        const ISO_DATE = 1 << 7;
    }
}

impl Flags {
    /// The conventional default: date and time.
    pub const STD: Flags = Flags::DATE.union(Flags::TIME);
}

/// Everything the header formatter needs from a logger, borrowed for one
/// line.
pub(crate) struct Header<'a> {
    pub prefix_formatted: &'a [u8],
    pub flags: Flags,
    pub now: NaiveDateTime,
    pub line_start: Option<NaiveDateTime>,
    pub caller: Option<(&'a str, u32)>,
}

impl Header<'_> {
    /// Render the full header into `out`.
    pub(crate) fn render_into(&self, out: &mut Vec<u8>) {
        self.render_prefix_tokens(out);

        if self.flags.contains(Flags::ISO_DATE) {
            self.push_isodate(out, self.flags.contains(Flags::MICROSECONDS));
            out.push(b' ');
        } else {
            if self.flags.contains(Flags::DATE) {
                self.push_date(out, b'/');
                out.push(b' ');
            }
            if self.flags.intersects(Flags::TIME | Flags::MICROSECONDS) {
                self.push_time(out, self.flags.contains(Flags::MICROSECONDS));
                out.push(b' ');
            }
        }

        if self.flags.intersects(Flags::SHORT_FILE | Flags::LONG_FILE) {
            let (file, line) = self.caller.unwrap_or(("???", 0));
            out.extend_from_slice(file.as_bytes());
            out.push(b':');
            out.extend_from_slice(line.to_string().as_bytes());
            out.extend_from_slice(b": ");
        }

        if self.flags.contains(Flags::ELAPSED) {
            if let Some(start) = self.line_start {
                if start != self.now {
                    out.push(b'(');
                    self.push_elapsed(out);
                    out.extend_from_slice(b") ");
                }
            }
        }
    }

    /// Substitute `{date}`, `{time}`, `{isodate}` and `{elapsed}` (each
    /// optionally `… micros`) in the prefix; anything else passes through
    /// byte for byte.
    fn render_prefix_tokens(&self, out: &mut Vec<u8>) {
        let prefix = self.prefix_formatted;
        let mut i = 0;
        while i < prefix.len() {
            if prefix[i] == b'{' {
                if let Some((consumed, name, micros)) = parse_token(&prefix[i..]) {
                    match name {
                        TokenName::Date => self.push_date(out, b'/'),
                        TokenName::Time => self.push_time(out, micros),
                        TokenName::IsoDate => self.push_isodate(out, micros),
                        TokenName::Elapsed => self.push_elapsed(out),
                    }
                    i += consumed;
                    continue;
                }
            }
            out.push(prefix[i]);
            i += 1;
        }
    }

    fn push_date(&self, out: &mut Vec<u8>, sep: u8) {
        let date = self.now.date();
        push_padded(out, date.year().max(0) as u32, 4);
        out.push(sep);
        push_padded(out, date.month(), 2);
        out.push(sep);
        push_padded(out, date.day(), 2);
    }

    fn push_time(&self, out: &mut Vec<u8>, micros: bool) {
        push_padded(out, self.now.hour(), 2);
        out.push(b':');
        push_padded(out, self.now.minute(), 2);
        out.push(b':');
        push_padded(out, self.now.second(), 2);
        if micros {
            out.push(b'.');
            push_padded(out, self.now.nanosecond() / 1_000, 6);
        }
    }

    fn push_isodate(&self, out: &mut Vec<u8>, micros: bool) {
        self.push_date(out, b'-');
        out.push(b'T');
        self.push_time(out, micros);
        out.push(b'Z');
    }

    fn push_elapsed(&self, out: &mut Vec<u8>) {
        match self.line_start {
            Some(start) if start != self.now => {
                let elapsed = (self.now - start).to_std().unwrap_or_default();
                out.extend_from_slice(format_duration(elapsed).as_bytes());
            }
            _ => out.push(b'-'),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TokenName {
    Date,
    Time,
    IsoDate,
    Elapsed,
}

/// Parse a `{name[ micros]}` token at the start of `buf`. Returns the
/// consumed byte count, the token, and whether ` micros` was present.
fn parse_token(buf: &[u8]) -> Option<(usize, TokenName, bool)> {
    let end = buf.iter().position(|&b| b == b'}')?;
    let body = &buf[1..end];
    let (body, micros) = match body.strip_suffix(b" micros") {
        Some(stripped) => (stripped, true),
        None => (body, false),
    };
    let name = match body {
        b"date" => TokenName::Date,
        b"time" => TokenName::Time,
        b"isodate" => TokenName::IsoDate,
        b"elapsed" => TokenName::Elapsed,
        _ => return None,
    };
    Some((end + 1, name, micros))
}

/// Zero-padded fixed-width decimal.
fn push_padded(out: &mut Vec<u8>, value: u32, width: usize) {
    let s = value.to_string();
    for _ in s.len()..width {
        out.push(b'0');
    }
    out.extend_from_slice(s.as_bytes());
}

/// Render a duration as a four-character magnitude plus unit.
///
/// The precision ladder: `9999h`, `99.9h`, ` 599m`, `59.9m`, ` 599s`,
/// `9.99s`, `999ms`, `9.9ms`. Widths are stable within each band so
/// repainted partial lines do not wobble.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    let mut out;
    if secs >= 600.0 {
        if secs >= 10.0 * 3600.0 {
            let hours = secs / 3600.0;
            if hours > 9999.0 {
                out = format!("{hours:4.0}");
            } else if hours >= 99.95 {
                out = clip(format!("{hours:4.0}"), 4);
            } else {
                out = clip(format!("{hours:4.1}"), 4);
            }
            out.push('h');
        } else {
            let mins = secs / 60.0;
            if mins >= 99.95 {
                out = clip(format!("{mins:4.0}"), 4);
            } else {
                out = clip(format!("{mins:4.1}"), 4);
            }
            out.push('m');
        }
    } else if secs >= 0.9995 {
        if secs >= 99.95 {
            out = clip(format!("{secs:4.0}"), 4);
        } else {
            out = clip(format!("{secs:4.2}"), 4);
        }
        out.push('s');
    } else {
        let millis = secs * 1000.0;
        if secs >= 0.00995 {
            out = clip(format!("{millis:3.0}"), 3);
        } else {
            out = clip(format!("{millis:3.1}"), 3);
        }
        out.push_str("ms");
    }
    out
}

/// Truncate an ASCII numeric rendering to `n` bytes.
fn clip(mut s: String, n: usize) -> String {
    s.truncate(n);
    s
}

// ── Tests ────────────────────────────────────────────────────────────────
