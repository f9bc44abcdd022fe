//! Setup evaluator.
//!
//! Scores one normalized [`Setup`] against the bar series of its instrument.
//! The evaluation window is every bar at or after `window_start`; bars before
//! it are never considered for entry.
//!
//! Per bar, before entry, the invalidation level is checked before the entry
//! zone, so a bar that does both voids the setup. After entry, stop and target
//! are raced over the full remaining series with
//! [`BarSeries::first_of_two_touches`].

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;

use super::bar::Bar;
use super::config::EvalConfig;
use super::error::EvalError;
use super::series::{BarSeries, FirstTouch, Level};
use super::session::{Interval, SessionCalendar};
use super::setup::{Bias, Direction, EntrySpec, InterventionType, Setup, SetupType, Stance};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    NoTrade,
    NotEntered,
    Invalidated,
    StopHit,
    TargetHit,
    OpenAtWindowEnd,
}

impl OutcomeStatus {
    pub const ALL: [OutcomeStatus; 6] = [
        OutcomeStatus::NoTrade,
        OutcomeStatus::NotEntered,
        OutcomeStatus::Invalidated,
        OutcomeStatus::StopHit,
        OutcomeStatus::TargetHit,
        OutcomeStatus::OpenAtWindowEnd,
    ];

    pub fn label(self) -> &'static str {
        match self {
            OutcomeStatus::NoTrade => "NO_TRADE",
            OutcomeStatus::NotEntered => "NOT_ENTERED",
            OutcomeStatus::Invalidated => "INVALIDATED",
            OutcomeStatus::StopHit => "STOP_HIT",
            OutcomeStatus::TargetHit => "TARGET_HIT",
            OutcomeStatus::OpenAtWindowEnd => "OPEN_AT_WINDOW_END",
        }
    }

    pub fn is_entered(self) -> bool {
        matches!(
            self,
            OutcomeStatus::StopHit | OutcomeStatus::TargetHit | OutcomeStatus::OpenAtWindowEnd
        )
    }

    /// Stop or target reached.
    pub fn is_resolved(self) -> bool {
        matches!(self, OutcomeStatus::StopHit | OutcomeStatus::TargetHit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RealizedDirection {
    Up,
    Down,
    Flat,
}

impl RealizedDirection {
    pub fn from_move(delta: f64) -> Self {
        if delta > 0.0 {
            RealizedDirection::Up
        } else if delta < 0.0 {
            RealizedDirection::Down
        } else {
            RealizedDirection::Flat
        }
    }

    /// FLAT never matches a declared direction.
    pub fn matches(self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (RealizedDirection::Up, Direction::Long) | (RealizedDirection::Down, Direction::Short)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeRecord {
    pub instrument: String,
    pub rank: u32,
    pub setup_type: SetupType,
    pub stance: Stance,
    pub status: OutcomeStatus,
    pub entry_hit: bool,
    pub entry_time: Option<DateTime<FixedOffset>>,
    pub entry_price: Option<f64>,
    pub exit_time: Option<DateTime<FixedOffset>>,
    pub exit_price: Option<f64>,
    pub realized_direction: RealizedDirection,
    /// `None` when there is nothing to compare the realized move against.
    pub direction_correct: Option<bool>,
    pub pips_outcome: Option<f64>,
    pub risk_reward_realized: Option<f64>,
    pub stated_risk_reward: Option<f64>,
    pub confidence: Option<f64>,
    pub calibration_error: Option<f64>,
    /// Assumed fill within the window's low/high: -1 at the best price, 1 at
    /// the worst.
    pub entry_timing_score: Option<f64>,
    pub intervention_type: Option<InterventionType>,
    /// Whether the direction held after the intervention.
    pub intervention_success: Option<bool>,
}

/// Bars of the evaluation window plus the session intervals they span.
#[derive(Debug)]
pub struct EvaluationWindow<'a> {
    pub start: DateTime<FixedOffset>,
    pub bars: &'a [Bar],
    pub dates: Vec<NaiveDate>,
}

impl<'a> EvaluationWindow<'a> {
    /// Fails with `EmptyWindow` when no bar falls at or after `start`.
    pub fn new(
        series: &'a BarSeries,
        start: DateTime<FixedOffset>,
        calendar: &SessionCalendar,
    ) -> Result<Self, EvalError> {
        let bars = series.bars_from(start);
        if bars.is_empty() {
            return Err(EvalError::EmptyWindow {
                instrument: series.instrument().to_string(),
                date: calendar.local_date(start).to_string(),
            });
        }
        let mut dates: Vec<NaiveDate> = bars
            .iter()
            .map(|b| calendar.local_date(b.timestamp))
            .collect();
        dates.dedup();
        Ok(Self { start, bars, dates })
    }

    pub fn first(&self) -> &Bar {
        &self.bars[0]
    }

    /// Union of the named sessions over every date in the window.
    pub fn session_intervals(
        &self,
        calendar: &SessionCalendar,
        sessions: &[String],
    ) -> Result<Vec<Interval>, EvalError> {
        let mut intervals = Vec::with_capacity(self.dates.len() * sessions.len());
        for date in &self.dates {
            for name in sessions {
                intervals.push(calendar.interval(*date, name)?);
            }
        }
        Ok(intervals)
    }
}

/// Evaluates one setup. `bias` is the instrument's assessed bias, used as the
/// direction comparandum for no-trade setups.
pub fn evaluate_setup(
    setup: &Setup,
    series: &BarSeries,
    window: &EvaluationWindow<'_>,
    config: &EvalConfig,
    bias: Option<Bias>,
) -> Result<OutcomeRecord, EvalError> {
    let last_close = series.last().close;
    let mut record = OutcomeRecord {
        instrument: setup.instrument.clone(),
        rank: setup.rank,
        setup_type: setup.setup_type.clone(),
        stance: setup.stance,
        status: OutcomeStatus::NoTrade,
        entry_hit: false,
        entry_time: None,
        entry_price: None,
        exit_time: None,
        exit_price: None,
        realized_direction: RealizedDirection::from_move(last_close - window.first().open),
        direction_correct: None,
        pips_outcome: None,
        risk_reward_realized: None,
        stated_risk_reward: setup.stated_risk_reward,
        confidence: setup.confidence,
        calibration_error: None,
        entry_timing_score: None,
        intervention_type: setup.intervention,
        intervention_success: None,
    };

    let (entry, direction) = match (setup.entry, setup.direction()) {
        (Some(entry), Some(direction)) => (entry, direction),
        _ => {
            let comparandum = bias.and_then(Bias::direction).or(setup.direction());
            record.direction_correct = comparandum.map(|d| record.realized_direction.matches(d));
            record.calibration_error = calibration(setup.confidence, record.direction_correct);
            record.intervention_success = record.intervention_type.and(record.direction_correct);
            return Ok(record);
        }
    };

    let intervals = window.session_intervals(&config.calendar, &setup.valid_sessions)?;
    let pip = config.pip_size(&setup.instrument);
    record.entry_timing_score = entry_timing_score(entry.price(), direction, window.bars);

    match scan_for_entry(setup, &entry, direction, window, &intervals) {
        EntryScan::Invalidated => {
            record.status = OutcomeStatus::Invalidated;
            record.pips_outcome = Some(direction.sign() * (last_close - entry.midpoint()) / pip);
        }
        EntryScan::Missed => {
            record.status = OutcomeStatus::NotEntered;
            record.pips_outcome = Some(direction.sign() * (last_close - entry.midpoint()) / pip);
        }
        EntryScan::Entered(entry_bar) => {
            let entry_price = entry.price();
            record.entry_hit = true;
            record.entry_time = Some(entry_bar.timestamp);
            record.entry_price = Some(entry_price);
            record.realized_direction = RealizedDirection::from_move(last_close - entry_price);

            let stop = setup
                .exit
                .stop
                .map(|p| Level::new(p, direction.stop_crossing()));
            let target = setup
                .exit
                .target
                .map(|p| Level::new(p, direction.target_crossing()));

            let exit_level = match series.first_of_two_touches(stop, target, entry_bar.timestamp) {
                FirstTouch::Stop(bar) => {
                    record.status = OutcomeStatus::StopHit;
                    record.exit_time = Some(bar.timestamp);
                    record.exit_price = setup.exit.stop;
                    setup.exit.stop
                }
                FirstTouch::Target(bar) => {
                    record.status = OutcomeStatus::TargetHit;
                    record.exit_time = Some(bar.timestamp);
                    record.exit_price = setup.exit.target;
                    setup.exit.target
                }
                FirstTouch::Neither => {
                    record.status = OutcomeStatus::OpenAtWindowEnd;
                    None
                }
            };

            let favorable = direction.sign() * (exit_level.unwrap_or(last_close) - entry_price);
            record.pips_outcome = Some(favorable / pip - config.spread_pips);
            record.risk_reward_realized = match (setup.exit.stop, setup.exit.target) {
                (Some(stop), Some(_)) if favorable > 0.0 => {
                    let risk = (entry_price - stop).abs();
                    (risk > 0.0).then(|| favorable / risk)
                }
                _ => None,
            };
        }
    }

    record.direction_correct = Some(record.realized_direction.matches(direction));
    record.calibration_error = calibration(setup.confidence, record.direction_correct);
    record.intervention_success = record.intervention_type.and(record.direction_correct);

    tracing::debug!(
        instrument = %record.instrument,
        rank = record.rank,
        status = record.status.label(),
        "evaluated setup"
    );
    Ok(record)
}

enum EntryScan<'a> {
    Entered(&'a Bar),
    Invalidated,
    Missed,
}

fn scan_for_entry<'a>(
    setup: &Setup,
    entry: &EntrySpec,
    direction: Direction,
    window: &EvaluationWindow<'a>,
    intervals: &[Interval],
) -> EntryScan<'a> {
    let invalidation = setup.exit.invalidation;
    for bar in window.bars {
        if invalidation.is_some_and(|level| bar.touches(level, direction.stop_crossing())) {
            return EntryScan::Invalidated;
        }
        let eligible = setup.valid_sessions.is_empty()
            || intervals.iter().any(|i| i.contains(bar.timestamp));
        if eligible && bar.overlaps(entry.zone_min, entry.zone_max) {
            return EntryScan::Entered(bar);
        }
    }
    EntryScan::Missed
}

fn entry_timing_score(price: f64, direction: Direction, bars: &[Bar]) -> Option<f64> {
    if bars.is_empty() {
        return None;
    }
    let low = bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    let high = bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let (best, worst) = match direction {
        Direction::Long => (low, high),
        Direction::Short => (high, low),
    };
    if worst == best {
        return Some(0.0);
    }
    let score = ((price - best) / (worst - best) * 2.0 - 1.0).clamp(-1.0, 1.0);
    Some((score * 1000.0).round() / 1000.0)
}

fn calibration(confidence: Option<f64>, correct: Option<bool>) -> Option<f64> {
    match (confidence, correct) {
        (Some(c), Some(hit)) => Some((c - if hit { 1.0 } else { 0.0 }).abs()),
        _ => None,
    }
}
