//! OHLC bar representation.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// Which side of a price level counts as touching it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Crossing {
    /// Touched when the bar's high reaches the level.
    Up,
    /// Touched when the bar's low reaches the level.
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub timestamp: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    /// high - low
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// True if any part of the bar traded inside `[lower, upper]`.
    pub fn overlaps(&self, lower: f64, upper: f64) -> bool {
        self.low <= upper && self.high >= lower
    }

    pub fn touches(&self, level: f64, crossing: Crossing) -> bool {
        match crossing {
            Crossing::Up => self.high >= level,
            Crossing::Down => self.low <= level,
        }
    }
}
