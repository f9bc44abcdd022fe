//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_outcome_adapter::JsonOutcomeAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::adapters::markdown_report_adapter::MarkdownReportAdapter;
use crate::domain::config::EvalConfig;
use crate::domain::engine::{self, EvaluationReport, EvaluationRequest, Mode};
use crate::domain::error::EvalError;
use crate::domain::evaluator::OutcomeStatus;
use crate::domain::schema;
use crate::domain::setup::PredictionDocument;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "fxeval", about = "Evaluate FX trading predictions against realized bars")]
pub struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Ai,
    Hitl,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Ai => Mode::Ai,
            ModeArg::Hitl => Mode::Hitl,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a prediction document against actual bars
    Evaluate {
        #[arg(short, long, value_enum)]
        mode: ModeArg,
        #[arg(short, long)]
        prediction: PathBuf,
        /// Outcome JSON file, or a directory of INSTRUMENT_timeframe.csv files
        #[arg(short, long)]
        actual: PathBuf,
        /// Report file, or a directory receiving <mode>_evaluation.json
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        market_regime: Option<String>,
        #[arg(long)]
        event_proximity: bool,
        #[arg(long)]
        target_date: Option<NaiveDate>,
        #[arg(long)]
        parallel: bool,
        /// Also write a markdown summary to this path
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Validate a prediction document without evaluating it
    Validate {
        #[arg(short, long)]
        prediction: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show the session calendar for a date
    Sessions {
        #[arg(long)]
        date: NaiveDate,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Evaluate {
            mode,
            prediction,
            actual,
            output,
            config,
            market_regime,
            event_proximity,
            target_date,
            parallel,
            summary,
        } => {
            let mut request = EvaluationRequest::new(mode.into());
            request.regime = market_regime;
            request.event_proximity = event_proximity;
            request.target_date = target_date;
            run_evaluate(
                &prediction,
                &actual,
                &output,
                config.as_ref(),
                &request,
                parallel,
                summary.as_ref(),
            )
        }
        Command::Validate { prediction, config } => run_validate(&prediction, config.as_ref()),
        Command::Sessions { date, config } => run_sessions(date, config.as_ref()),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = EvalError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Loads and validates the evaluation config, falling back to defaults when
/// no file is given.
fn resolve_config(config_path: Option<&PathBuf>) -> Result<EvalConfig, ExitCode> {
    let Some(path) = config_path else {
        return Ok(EvalConfig::default());
    };
    eprintln!("Loading config from {}", path.display());
    let adapter = load_config(path)?;
    EvalConfig::from_port(&adapter).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

fn load_prediction(path: &Path, config: &EvalConfig) -> Result<PredictionDocument, EvalError> {
    let text = fs::read_to_string(path)?;
    schema::parse_document(&text, config.calendar.offset())
}

fn open_actual(path: &Path, config: &EvalConfig) -> Result<Box<dyn DataPort>, EvalError> {
    if path.is_dir() {
        Ok(Box::new(CsvAdapter::new(
            path.to_path_buf(),
            config.calendar.offset(),
        )))
    } else {
        Ok(Box::new(JsonOutcomeAdapter::from_file(path, config.calendar.offset())?))
    }
}

/// A directory (existing, or spelled with a trailing separator) receives the
/// mode's default file name.
pub fn resolve_output_path(output: &Path, mode: Mode) -> PathBuf {
    let trailing_sep = output
        .as_os_str()
        .to_string_lossy()
        .ends_with(std::path::is_separator);
    if output.is_dir() || trailing_sep {
        output.join(mode.report_file_name())
    } else {
        output.to_path_buf()
    }
}

fn run_evaluate(
    prediction_path: &Path,
    actual_path: &Path,
    output_path: &Path,
    config_path: Option<&PathBuf>,
    request: &EvaluationRequest,
    parallel: bool,
    summary_path: Option<&PathBuf>,
) -> ExitCode {
    let mut config = match resolve_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    config.parallel |= parallel;

    eprintln!("Loading predictions from {}", prediction_path.display());
    let doc = match load_prediction(prediction_path, &config) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("Loading actual data from {}", actual_path.display());
    let data = match open_actual(actual_path, &config) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!(
        "Evaluating {} setups (schema {}, mode {})",
        doc.setups.len(),
        doc.version,
        request.mode.label()
    );
    let report = match engine::evaluate(&doc, data.as_ref(), &config, request) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    print_summary(&report);

    let output = resolve_output_path(output_path, request.mode);
    if let Err(e) = JsonReportAdapter.write(&report, &output.to_string_lossy()) {
        eprintln!("error: failed to write report: {e}");
        return (&e).into();
    }
    eprintln!("\nReport written to: {}", output.display());

    if let Some(path) = summary_path {
        if let Err(e) = MarkdownReportAdapter.write(&report, &path.to_string_lossy()) {
            eprintln!("error: failed to write summary: {e}");
            return (&e).into();
        }
        eprintln!("Summary written to: {}", path.display());
    }
    ExitCode::SUCCESS
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.1}%", v * 100.0))
}

fn print_summary(report: &EvaluationReport) {
    let agg = &report.aggregate;
    eprintln!("\n=== Aggregate Results ===");
    eprintln!("Total Setups:     {}", agg.total_setups);
    eprintln!("Direction:        {}", percent(agg.overall.direction_accuracy));
    eprintln!("Entry Hit Rate:   {}", percent(agg.overall.entry_hit_rate));
    eprintln!("Target Hit Rate:  {}", percent(agg.overall.target_hit_rate));
    match agg.overall.total_pips {
        Some(pips) => eprintln!("Total Pips:       {pips:+.1}"),
        None => eprintln!("Total Pips:       n/a"),
    }
    if let Some(err) = agg.overall.avg_calibration_error {
        eprintln!("Calibration Err:  {err:.3}");
    }

    let counts: Vec<String> = OutcomeStatus::ALL
        .iter()
        .filter_map(|s| {
            agg.outcome_counts
                .get(s)
                .filter(|n| **n > 0)
                .map(|n| format!("{} {}", s.label(), n))
        })
        .collect();
    if !counts.is_empty() {
        eprintln!("Outcomes:         {}", counts.join(", "));
    }

    if !agg.by_rank.is_empty() {
        eprintln!("\n=== Per-Rank Summary ===");
        for (rank, stats) in &agg.by_rank {
            eprintln!(
                "  rank {}:  {} setups, {} direction, {} entry hit",
                rank,
                stats.count,
                percent(stats.direction_accuracy),
                percent(stats.entry_hit_rate),
            );
        }
    }

    if report.environment.bias_accuracy.is_some() || report.environment.vol_accuracy.is_some() {
        eprintln!("\n=== Environment ===");
        eprintln!("Bias Accuracy:    {}", percent(report.environment.bias_accuracy));
        eprintln!("Vol Accuracy:     {}", percent(report.environment.vol_accuracy));
    }
}

fn run_validate(prediction_path: &Path, config_path: Option<&PathBuf>) -> ExitCode {
    let config = match resolve_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    eprintln!("Validating predictions: {}", prediction_path.display());
    let doc = match load_prediction(prediction_path, &config) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("\nSchema version: {}", doc.version);
    if let Some(t) = doc.generated_at {
        eprintln!("Generated at:   {}", t.to_rfc3339());
    }

    eprintln!("\nSetups:");
    for setup in &doc.setups {
        let entry = match &setup.entry {
            Some(e) => format!("entry {:.5}-{:.5}", e.zone_min, e.zone_max),
            None => "no trade".to_string(),
        };
        let sessions = if setup.valid_sessions.is_empty() {
            "any session".to_string()
        } else {
            setup.valid_sessions.join("/")
        };
        eprintln!(
            "  #{} {} {} {:?}, {}, {}",
            setup.rank, setup.instrument, setup.setup_type, setup.stance, entry, sessions
        );
        for name in &setup.valid_sessions {
            if !config.calendar.contains(name) {
                let e = EvalError::UnknownSession { name: name.clone() };
                eprintln!("error: {e}");
                return (&e).into();
            }
        }
    }

    if !doc.environment.is_empty() {
        eprintln!("\nEnvironment: {} instruments", doc.environment.len());
    }

    eprintln!("\nPrediction document is valid.");
    ExitCode::SUCCESS
}

fn run_sessions(date: NaiveDate, config_path: Option<&PathBuf>) -> ExitCode {
    let config = match resolve_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let calendar = &config.calendar;

    for name in calendar.names() {
        match calendar.interval(date, name) {
            Ok(interval) => println!(
                "{:<14} {} .. {}",
                name,
                interval.start.to_rfc3339(),
                interval.end.to_rfc3339()
            ),
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        }
    }
    ExitCode::SUCCESS
}
