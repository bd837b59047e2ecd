#![forbid(unsafe_code)]

//! Bit-packed color codes and the named color table.
//!
//! A [`ColorCode`] packs a base SGR color together with reset/intensity
//! flags into one value so that names like `dim` can stand for a *sequence*
//! of SGR codes (here: bright + black). Expansion order is fixed: reset
//! first, intensity next, color last, the order a terminal needs to see
//! them in.
//!
//! # Layout
//!
//! ```text
//! [bit 9: DIM][bit 8: BRIGHT][bit 7: RESET_ALL][bits 0-6: base color]
//! ```
//!
//! The base color field holds a raw SGR code: 30–37, 39 (reset foreground),
//! or 0 for none.

use std::collections::HashMap;
use std::ops::BitOr;

/// A packed color value: base SGR color plus reset/intensity flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorCode(u16);

impl ColorCode {
    /// No color at all; expands to nothing.
    pub const NONE: Self = Self(0);

    /// Basic SGR foreground colors.
    pub const BLACK: Self = Self(30);
    pub const RED: Self = Self(31);
    pub const GREEN: Self = Self(32);
    pub const YELLOW: Self = Self(33);
    pub const BLUE: Self = Self(34);
    pub const MAGENTA: Self = Self(35);
    pub const CYAN: Self = Self(36);
    pub const WHITE: Self = Self(37);

    /// Reset the foreground color to the terminal default (SGR 39).
    pub const RESET_FORECOLOR: Self = Self(39);

    /// Reset all attributes first (SGR 0).
    pub const RESET_ALL: Self = Self(1 << 7);

    /// Bright intensity (SGR 1).
    pub const BRIGHT: Self = Self(1 << 8);

    /// Dim intensity (SGR 2).
    pub const DIM: Self = Self(1 << 9);

    const BASE_MASK: u16 = (1 << 7) - 1;

    /// Build a code from its raw packed representation.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Raw packed representation.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Expand into the ordered list of raw SGR codes this value stands for:
    /// reset first if present, intensity next, base color last.
    #[must_use]
    pub fn sgr_codes(self) -> Vec<u16> {
        let mut codes = Vec::with_capacity(3);
        if self.0 & Self::RESET_ALL.0 != 0 {
            codes.push(0);
        }
        if self.0 & Self::BRIGHT.0 != 0 {
            codes.push(1);
        }
        if self.0 & Self::DIM.0 != 0 {
            codes.push(2);
        }
        let base = self.0 & Self::BASE_MASK;
        if base != 0 {
            codes.push(base);
        }
        codes
    }
}

impl BitOr for ColorCode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// The mutable name → code table consulted by the template expander.
///
/// Starts with the stock names below and grows via
/// [`add`](ColorTable::add) (exposed as `add_color_code` on the registry):
///
/// | Name | Meaning |
/// |------|---------|
/// | `r`, `reset` | reset all attributes |
/// | `bright` | bright intensity |
/// | `dim` | bright black (reads as grey) |
/// | `black`, `grey`, `red`, `green`, `yellow`, `blue`, `magenta`, `cyan`, `white` | basic colors |
/// | `cr` | reset foreground only |
/// | `error`, `success`, `warn` | red / green / yellow |
#[derive(Debug, Clone)]
pub struct ColorTable {
    names: HashMap<String, ColorCode>,
}

impl ColorTable {
    /// Table preloaded with the stock names.
    #[must_use]
    pub fn stock() -> Self {
        let mut names = HashMap::new();
        let mut add = |name: &str, code: ColorCode| {
            names.insert(name.to_string(), code);
        };
        add("r", ColorCode::RESET_ALL);
        add("reset", ColorCode::RESET_ALL);
        add("bright", ColorCode::BRIGHT);
        add("dim", ColorCode::BRIGHT | ColorCode::BLACK);
        add("black", ColorCode::BLACK);
        add("grey", ColorCode::BLACK);
        add("red", ColorCode::RED);
        add("green", ColorCode::GREEN);
        add("yellow", ColorCode::YELLOW);
        add("blue", ColorCode::BLUE);
        add("magenta", ColorCode::MAGENTA);
        add("cyan", ColorCode::CYAN);
        add("white", ColorCode::WHITE);
        add("cr", ColorCode::RESET_FORECOLOR);
        add("error", ColorCode::RED);
        add("success", ColorCode::GREEN);
        add("warn", ColorCode::YELLOW);
        Self { names }
    }

    /// Register (or replace) a name.
    pub fn add(&mut self, name: &str, code: ColorCode) {
        self.names.insert(name.to_string(), code);
    }

    /// Look up a name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ColorCode> {
        self.names.get(name).copied()
    }
}

impl Default for ColorTable {
    fn default() -> Self {
        Self::stock()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
