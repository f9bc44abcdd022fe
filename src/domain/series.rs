//! Bar series accessor.
//!
//! A [`BarSeries`] holds the validated, strictly time-ordered bars of one
//! instrument and answers the range and level-touch queries the setup
//! evaluator is built on.
//!
//! # Tie-break policy
//!
//! OHLC bars do not record the order in which the high and the low were
//! printed. When a single bar's range crosses both the stop and the target,
//! [`BarSeries::first_of_two_touches`] resolves it as a stop hit. The rule is
//! the same for long and short setups: a tie never favours the trade.

use chrono::{DateTime, FixedOffset};

use super::bar::{Bar, Crossing};
use super::error::EvalError;
use super::session::Interval;

/// A price level together with the side from which it counts as touched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    pub price: f64,
    pub crossing: Crossing,
}

impl Level {
    pub fn new(price: f64, crossing: Crossing) -> Self {
        Self { price, crossing }
    }
}

/// Result of racing a stop level against a target level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FirstTouch<'a> {
    Stop(&'a Bar),
    Target(&'a Bar),
    Neither,
}

#[derive(Debug, Clone)]
pub struct BarSeries {
    instrument: String,
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Validates ordering, uniqueness and bar sanity before accepting the bars.
    pub fn new(instrument: impl Into<String>, bars: Vec<Bar>) -> Result<Self, EvalError> {
        let instrument = instrument.into();
        if bars.is_empty() {
            return Err(EvalError::EmptySeries { instrument });
        }

        for (index, bar) in bars.iter().enumerate() {
            if let Some(reason) = bar_defect(bar) {
                return Err(EvalError::InvalidBar {
                    instrument,
                    index,
                    reason,
                });
            }
            if index == 0 {
                continue;
            }
            let prev = &bars[index - 1];
            if bar.timestamp == prev.timestamp {
                return Err(EvalError::DuplicateBar { instrument, index });
            }
            if bar.timestamp < prev.timestamp {
                return Err(EvalError::BarsOutOfOrder { instrument, index });
            }
        }

        Ok(Self { instrument, bars })
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn first(&self) -> &Bar {
        &self.bars[0]
    }

    pub fn last(&self) -> &Bar {
        &self.bars[self.bars.len() - 1]
    }

    /// Bars whose timestamp falls in `[interval.start, interval.end)`.
    pub fn bars_in(&self, interval: &Interval) -> &[Bar] {
        let lo = self.bars.partition_point(|b| b.timestamp < interval.start);
        let hi = self.bars.partition_point(|b| b.timestamp < interval.end);
        &self.bars[lo..hi.max(lo)]
    }

    /// Bars at or after `time`.
    pub fn bars_from(&self, time: DateTime<FixedOffset>) -> &[Bar] {
        let lo = self.bars.partition_point(|b| b.timestamp < time);
        &self.bars[lo..]
    }

    /// Bars strictly after `time`.
    pub fn bars_after(&self, time: DateTime<FixedOffset>) -> &[Bar] {
        let lo = self.bars.partition_point(|b| b.timestamp <= time);
        &self.bars[lo..]
    }

    /// First bar strictly after `after` whose range reaches `level`.
    pub fn first_touch(
        &self,
        level: f64,
        crossing: Crossing,
        after: DateTime<FixedOffset>,
    ) -> Option<&Bar> {
        self.bars_after(after)
            .iter()
            .find(|bar| bar.touches(level, crossing))
    }

    /// Races `stop` against `target` over the bars strictly after `after`.
    ///
    /// A missing level is never touched. A bar that reaches both levels
    /// resolves to [`FirstTouch::Stop`].
    pub fn first_of_two_touches(
        &self,
        stop: Option<Level>,
        target: Option<Level>,
        after: DateTime<FixedOffset>,
    ) -> FirstTouch<'_> {
        for bar in self.bars_after(after) {
            let stop_hit = stop.is_some_and(|l| bar.touches(l.price, l.crossing));
            if stop_hit {
                return FirstTouch::Stop(bar);
            }
            let target_hit = target.is_some_and(|l| bar.touches(l.price, l.crossing));
            if target_hit {
                return FirstTouch::Target(bar);
            }
        }
        FirstTouch::Neither
    }
}

fn bar_defect(bar: &Bar) -> Option<String> {
    let prices = [bar.open, bar.high, bar.low, bar.close];
    if prices.iter().any(|p| !p.is_finite()) {
        return Some("non-finite price".to_string());
    }
    if bar.high < bar.low {
        return Some(format!("high {} below low {}", bar.high, bar.low));
    }
    if bar.open < bar.low || bar.open > bar.high || bar.close < bar.low || bar.close > bar.high {
        return Some("open/close outside high-low range".to_string());
    }
    None
}
