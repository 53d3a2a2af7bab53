//! Number → attribute rule table.
//!
//! Maps each board number "01".."49" to its wave color and zodiac sign.
//! The mapping is hand-curated domain data, built once at startup and
//! shared read-only for the process lifetime.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Highest number on the board.
pub const BOARD_SIZE: u8 = 49;

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Wave color of a board number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Blue,
    Green,
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Red => write!(f, "red"),
            Color::Blue => write!(f, "blue"),
            Color::Green => write!(f, "green"),
        }
    }
}

/// Zodiac sign of a board number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zodiac {
    Rat,
    Ox,
    Tiger,
    Rabbit,
    Dragon,
    Snake,
    Horse,
    Goat,
    Monkey,
    Rooster,
    Dog,
    Pig,
}

impl fmt::Display for Zodiac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Zodiac::Rat => "rat",
            Zodiac::Ox => "ox",
            Zodiac::Tiger => "tiger",
            Zodiac::Rabbit => "rabbit",
            Zodiac::Dragon => "dragon",
            Zodiac::Snake => "snake",
            Zodiac::Horse => "horse",
            Zodiac::Goat => "goat",
            Zodiac::Monkey => "monkey",
            Zodiac::Rooster => "rooster",
            Zodiac::Dog => "dog",
            Zodiac::Pig => "pig",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("invalid lottery number: {0:?} (expected \"01\"..\"49\")")]
    InvalidNumber(String),
}

// ---------------------------------------------------------------------------
// Domain data
// ---------------------------------------------------------------------------

// Standard wave-color partition of the 49-number board.
const RED_NUMBERS: &[u8] = &[
    1, 2, 7, 8, 12, 13, 18, 19, 23, 24, 29, 30, 34, 35, 40, 45, 46,
];
const BLUE_NUMBERS: &[u8] = &[
    3, 4, 9, 10, 14, 15, 20, 25, 26, 31, 36, 37, 41, 42, 47, 48,
];
const GREEN_NUMBERS: &[u8] = &[
    5, 6, 11, 16, 17, 21, 22, 27, 28, 32, 33, 38, 39, 43, 44, 49,
];

// Zodiac ring anchored at 01 = Dragon, descending through the cycle.
const ZODIAC_RING: [Zodiac; 12] = [
    Zodiac::Dragon,
    Zodiac::Rabbit,
    Zodiac::Tiger,
    Zodiac::Ox,
    Zodiac::Rat,
    Zodiac::Pig,
    Zodiac::Dog,
    Zodiac::Rooster,
    Zodiac::Monkey,
    Zodiac::Goat,
    Zodiac::Horse,
    Zodiac::Snake,
];

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

/// Immutable number → {color, zodiac} lookup over "01".."49".
///
/// Constructed explicitly once during startup and handed into the
/// dependency graph; there is no lazily-built global.
#[derive(Debug, Clone)]
pub struct RuleTable {
    colors: [Color; BOARD_SIZE as usize],
    zodiacs: [Zodiac; BOARD_SIZE as usize],
}

impl RuleTable {
    pub fn new() -> Self {
        let mut colors = [Color::Red; BOARD_SIZE as usize];
        for &n in BLUE_NUMBERS {
            colors[(n - 1) as usize] = Color::Blue;
        }
        for &n in GREEN_NUMBERS {
            colors[(n - 1) as usize] = Color::Green;
        }

        let mut zodiacs = [Zodiac::Rat; BOARD_SIZE as usize];
        for (i, slot) in zodiacs.iter_mut().enumerate() {
            *slot = ZODIAC_RING[i % ZODIAC_RING.len()];
        }

        Self { colors, zodiacs }
    }

    /// Wave color of a board number. Accepts "5" or "05".
    pub fn color_of(&self, number: &str) -> Result<Color, RuleError> {
        Ok(self.colors[Self::index(number)?])
    }

    /// Zodiac sign of a board number. Accepts "5" or "05".
    pub fn zodiac_of(&self, number: &str) -> Result<Zodiac, RuleError> {
        Ok(self.zodiacs[Self::index(number)?])
    }

    /// Left-zero-pad a declared number to the canonical two-digit form,
    /// rejecting anything outside "01".."49".
    pub fn normalize(number: &str) -> Result<String, RuleError> {
        let value = Self::parse(number)?;
        Ok(format!("{value:02}"))
    }

    fn index(number: &str) -> Result<usize, RuleError> {
        Ok((Self::parse(number)? - 1) as usize)
    }

    fn parse(number: &str) -> Result<u8, RuleError> {
        let trimmed = number.trim();
        let well_formed = !trimmed.is_empty()
            && trimmed.len() <= 2
            && trimmed.chars().all(|c| c.is_ascii_digit());
        if !well_formed {
            return Err(RuleError::InvalidNumber(number.to_string()));
        }
        match trimmed.parse::<u8>() {
            Ok(value) if (1..=BOARD_SIZE).contains(&value) => Ok(value),
            _ => Err(RuleError::InvalidNumber(number.to_string())),
        }
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
