//! Evaluation entry point.
//!
//! [`evaluate`] drives the whole flow for one normalized document: load and
//! validate every series, evaluate each setup, aggregate, and score the
//! environment and ranking. Any failure aborts the batch before a report
//! exists.

use chrono::{DateTime, FixedOffset, NaiveDate};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::aggregate::{AggregateReport, InterventionSummary};
use super::config::EvalConfig;
use super::environment::{EnvironmentReport, RankingReport, score_environment, score_ranking};
use super::error::EvalError;
use super::evaluator::{EvaluationWindow, OutcomeRecord, evaluate_setup};
use super::schema::SchemaVersion;
use super::series::BarSeries;
use super::session::SessionCalendar;
use super::setup::{PredictionDocument, Setup};
use crate::ports::data_port::DataPort;

/// Who produced the document. Only affects labels and file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Ai,
    Hitl,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Ai => "ai",
            Mode::Hitl => "hitl",
        }
    }

    /// Report file name used when the output path is a directory.
    pub fn report_file_name(self) -> String {
        format!("{}_evaluation.json", self.label())
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub mode: Mode,
    pub regime: Option<String>,
    pub event_proximity: bool,
    /// Overrides the generation date of the document.
    pub target_date: Option<NaiveDate>,
}

impl EvaluationRequest {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            regime: None,
            event_proximity: false,
            target_date: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub mode: Mode,
    pub schema_version: SchemaVersion,
    pub generated_at: Option<DateTime<FixedOffset>>,
    pub target_date: Option<NaiveDate>,
    pub market_regime: Option<String>,
    pub event_proximity: bool,
    pub timeframe: String,
    pub spread_pips: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub metadata: RunMetadata,
    pub outcomes: Vec<OutcomeRecord>,
    pub aggregate: AggregateReport,
    pub environment: EnvironmentReport,
    pub ranking: RankingReport,
}

pub fn evaluate(
    doc: &PredictionDocument,
    data: &dyn DataPort,
    config: &EvalConfig,
    request: &EvaluationRequest,
) -> Result<EvaluationReport, EvalError> {
    if let Some(regime) = &request.regime {
        config.check_regime(regime)?;
    }
    for setup in &doc.setups {
        for name in &setup.valid_sessions {
            if !config.calendar.contains(name) {
                return Err(EvalError::UnknownSession { name: name.clone() });
            }
        }
    }

    let setup_instruments = doc.setup_instruments();
    for instrument in &setup_instruments {
        if !data.has_instrument(instrument)? {
            return Err(EvalError::MissingInstrument {
                instrument: instrument.to_string(),
            });
        }
    }

    let mut context_instruments: BTreeSet<&str> = BTreeSet::new();
    for instrument in doc
        .environment
        .keys()
        .map(String::as_str)
        .chain(doc.ranking.top.iter().map(|e| e.instrument.as_str()))
        .chain(doc.ranking.bottom.iter().map(|e| e.instrument.as_str()))
    {
        if data.has_instrument(instrument)? {
            context_instruments.insert(instrument);
        }
    }

    let mut series: BTreeMap<String, BarSeries> = BTreeMap::new();
    for instrument in setup_instruments.iter().copied().chain(context_instruments) {
        if series.contains_key(instrument) {
            continue;
        }
        let bars = data.fetch_bars(instrument, &config.timeframe)?;
        tracing::debug!(%instrument, bars = bars.len(), "loaded bar series");
        series.insert(instrument.to_string(), BarSeries::new(instrument, bars)?);
    }

    let target_date = request
        .target_date
        .or_else(|| doc.generated_at.map(|t| config.calendar.local_date(t)));

    let mut windows = BTreeMap::new();
    for instrument in &setup_instruments {
        let s = &series[*instrument];
        let start = window_start(target_date, doc.generated_at, &config.calendar)
            .unwrap_or(s.first().timestamp);
        windows.insert(
            instrument.to_string(),
            EvaluationWindow::new(s, start, &config.calendar)?,
        );
    }

    let evaluate_one = |setup: &Setup| {
        evaluate_setup(
            setup,
            &series[&setup.instrument],
            &windows[&setup.instrument],
            config,
            doc.bias_for(&setup.instrument),
        )
    };
    let outcomes: Vec<OutcomeRecord> = if config.parallel {
        doc.setups
            .par_iter()
            .map(evaluate_one)
            .collect::<Result<_, _>>()?
    } else {
        doc.setups
            .iter()
            .map(evaluate_one)
            .collect::<Result<_, _>>()?
    };

    let mut aggregate = AggregateReport::compute(&outcomes, request.regime.as_deref());
    if request.mode == Mode::Hitl {
        aggregate.interventions = Some(InterventionSummary::compute(&outcomes));
    }

    let (environment, ranking) = match target_date {
        Some(date) => {
            let mut atr = BTreeMap::new();
            for instrument in doc.environment.keys() {
                if !series.contains_key(instrument) {
                    continue;
                }
                if let Some(value) = data.daily_atr(instrument)? {
                    atr.insert(instrument.clone(), value);
                }
            }
            (
                score_environment(doc, &series, &atr, date, &config.calendar),
                score_ranking(doc, &series, date, &config.calendar),
            )
        }
        None => {
            tracing::warn!("no target date; skipping environment and ranking scoring");
            (EnvironmentReport::default(), RankingReport::default())
        }
    };

    tracing::info!(
        setups = outcomes.len(),
        instruments = series.len(),
        "evaluation complete"
    );

    Ok(EvaluationReport {
        metadata: RunMetadata {
            mode: request.mode,
            schema_version: doc.version.clone(),
            generated_at: doc.generated_at,
            target_date,
            market_regime: request.regime.clone(),
            event_proximity: request.event_proximity,
            timeframe: config.timeframe.clone(),
            spread_pips: config.spread_pips,
        },
        outcomes,
        aggregate,
        environment,
        ranking,
    })
}

/// Start of the evaluation window: the later of the target day's start and
/// the generation time. Bars printed before the prediction never count.
fn window_start(
    target_date: Option<NaiveDate>,
    generated_at: Option<DateTime<FixedOffset>>,
    calendar: &SessionCalendar,
) -> Option<DateTime<FixedOffset>> {
    match (target_date.map(|d| calendar.day_start(d)), generated_at) {
        (Some(day), Some(generated)) => Some(day.max(generated)),
        (day, generated) => day.or(generated),
    }
}
