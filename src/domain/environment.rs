//! Environment assessment and ranking scoring.
//!
//! Compares the document's per-instrument bias and volatility calls, and its
//! top/bottom ranking, with the target day's realized price action.
//! Instruments without the data a score needs are reported as `NO_DATA` and
//! left out of the rates.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use super::series::BarSeries;
use super::session::SessionCalendar;
use super::setup::{Bias, PredictionDocument, RankingEntry, VolTier};

const LOW_VOL_RATIO: f64 = 0.5;
const HIGH_VOL_RATIO: f64 = 1.5;

/// Target-day OHLC plus the previous trading day's extremes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DayStats {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub prev_high: Option<f64>,
    pub prev_low: Option<f64>,
}

impl DayStats {
    /// `None` when the series has no bar on `date`. The previous day is the
    /// latest earlier date that has bars.
    pub fn from_series(series: &BarSeries, date: NaiveDate, calendar: &SessionCalendar) -> Option<Self> {
        let day: Vec<_> = series
            .bars()
            .iter()
            .filter(|b| calendar.local_date(b.timestamp) == date)
            .collect();
        let first = day.first()?;
        let last = day.last()?;

        let prev_date = series
            .bars()
            .iter()
            .map(|b| calendar.local_date(b.timestamp))
            .filter(|d| *d < date)
            .max();
        let prev: Vec<_> = match prev_date {
            Some(pd) => series
                .bars()
                .iter()
                .filter(|b| calendar.local_date(b.timestamp) == pd)
                .collect(),
            None => Vec::new(),
        };

        Some(DayStats {
            open: first.open,
            high: day.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max),
            low: day.iter().map(|b| b.low).fold(f64::INFINITY, f64::min),
            close: last.close,
            prev_high: prev.iter().map(|b| b.high).reduce(f64::max),
            prev_low: prev.iter().map(|b| b.low).reduce(f64::min),
        })
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

pub fn classify_volatility(ratio: f64) -> VolTier {
    if ratio <= LOW_VOL_RATIO {
        VolTier::Low
    } else if ratio >= HIGH_VOL_RATIO {
        VolTier::High
    } else {
        VolTier::Medium
    }
}

pub fn classify_bias(stats: &DayStats, prev_high: f64, prev_low: f64, vol: VolTier) -> Bias {
    let trending = vol != VolTier::Low;
    if stats.close > stats.open && stats.close > prev_high && trending {
        Bias::Bullish
    } else if stats.close < stats.open && stats.close < prev_low && trending {
        Bias::Bearish
    } else if stats.open.max(stats.close) <= prev_high && stats.open.min(stats.close) >= prev_low {
        Bias::Range
    } else {
        Bias::Mixed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreStatus {
    Scored,
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentOutcome {
    pub status: ScoreStatus,
    pub predicted_bias: Option<Bias>,
    pub predicted_vol: Option<VolTier>,
    pub actual_bias: Option<Bias>,
    pub actual_vol: Option<VolTier>,
    pub vol_ratio: Option<f64>,
    pub bias_match: Option<bool>,
    pub vol_match: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnvironmentReport {
    pub instruments: BTreeMap<String, EnvironmentOutcome>,
    pub bias_accuracy: Option<f64>,
    pub vol_accuracy: Option<f64>,
}

/// Scores every instrument in the document's environment map.
pub fn score_environment(
    doc: &PredictionDocument,
    series: &BTreeMap<String, BarSeries>,
    atr: &BTreeMap<String, f64>,
    target_date: NaiveDate,
    calendar: &SessionCalendar,
) -> EnvironmentReport {
    let mut instruments = BTreeMap::new();
    for (instrument, assessment) in &doc.environment {
        let mut outcome = EnvironmentOutcome {
            status: ScoreStatus::NoData,
            predicted_bias: assessment.bias,
            predicted_vol: assessment.vol_expect,
            actual_bias: None,
            actual_vol: None,
            vol_ratio: None,
            bias_match: None,
            vol_match: None,
        };

        let stats = series
            .get(instrument)
            .and_then(|s| DayStats::from_series(s, target_date, calendar));
        let inputs = match (stats, atr.get(instrument)) {
            (Some(stats), Some(&atr)) if atr > 0.0 => stats
                .prev_high
                .zip(stats.prev_low)
                .map(|(ph, pl)| (stats, atr, ph, pl)),
            _ => None,
        };

        if let Some((stats, atr, prev_high, prev_low)) = inputs {
            let ratio = stats.range() / atr;
            let vol = classify_volatility(ratio);
            let bias = classify_bias(&stats, prev_high, prev_low, vol);
            outcome.status = ScoreStatus::Scored;
            outcome.vol_ratio = Some(ratio);
            outcome.actual_vol = Some(vol);
            outcome.actual_bias = Some(bias);
            outcome.bias_match = assessment.bias.map(|b| b == bias);
            outcome.vol_match = assessment.vol_expect.map(|v| v == vol);
        } else {
            tracing::warn!(%instrument, "insufficient data for environment scoring");
        }
        instruments.insert(instrument.clone(), outcome);
    }

    let bias_accuracy = match_rate(instruments.values().filter_map(|o| o.bias_match));
    let vol_accuracy = match_rate(instruments.values().filter_map(|o| o.vol_match));
    EnvironmentReport {
        instruments,
        bias_accuracy,
        vol_accuracy,
    }
}

fn match_rate(matches: impl Iterator<Item = bool>) -> Option<f64> {
    let (hits, total) = matches.fold((0usize, 0usize), |(h, t), m| (h + m as usize, t + 1));
    (total > 0).then(|| hits as f64 / total as f64)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankingReport {
    /// Target-day `range / open` per ranked instrument; `None` without data.
    pub volatility: BTreeMap<String, Option<f64>>,
    pub top_avg_volatility: Option<f64>,
    pub bottom_avg_volatility: Option<f64>,
    /// Top average over bottom average.
    pub top_bottom_ratio: Option<f64>,
}

pub fn score_ranking(
    doc: &PredictionDocument,
    series: &BTreeMap<String, BarSeries>,
    target_date: NaiveDate,
    calendar: &SessionCalendar,
) -> RankingReport {
    let day_volatility = |instrument: &str| {
        series
            .get(instrument)
            .and_then(|s| DayStats::from_series(s, target_date, calendar))
            .filter(|stats| stats.open > 0.0)
            .map(|stats| stats.range() / stats.open)
    };

    let mut volatility = BTreeMap::new();
    let mut average = |entries: &[RankingEntry]| {
        let values: Vec<f64> = entries
            .iter()
            .filter_map(|e| {
                let v = day_volatility(&e.instrument);
                volatility.insert(e.instrument.clone(), v);
                v
            })
            .collect();
        (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
    };

    let top_avg_volatility = average(&doc.ranking.top);
    let bottom_avg_volatility = average(&doc.ranking.bottom);
    let top_bottom_ratio = match (top_avg_volatility, bottom_avg_volatility) {
        (Some(top), Some(bottom)) if bottom > 0.0 => Some(top / bottom),
        _ => None,
    };

    RankingReport {
        volatility,
        top_avg_volatility,
        bottom_avg_volatility,
        top_bottom_ratio,
    }
}
