//! Markdown summary adapter implementing ReportPort.
//!
//! Renders the headline rates, the outcome table and the rank breakdown for
//! human review. The JSON report remains the machine-readable record.

use std::fmt::Write as _;
use std::path::Path;

use crate::adapters::json_report_adapter::write_atomically;
use crate::domain::aggregate::{GroupStats, InterventionSummary};
use crate::domain::engine::EvaluationReport;
use crate::domain::error::EvalError;
use crate::domain::evaluator::OutcomeRecord;
use crate::ports::report_port::ReportPort;

pub struct MarkdownReportAdapter;

impl ReportPort for MarkdownReportAdapter {
    fn write(&self, report: &EvaluationReport, output_path: &str) -> Result<(), EvalError> {
        write_atomically(Path::new(output_path), &render(report))
    }
}

pub fn render(report: &EvaluationReport) -> String {
    let meta = &report.metadata;
    let mut out = String::new();
    let _ = writeln!(out, "# Evaluation summary ({})\n", meta.mode.label());
    let _ = writeln!(out, "- Schema version: {}", meta.schema_version);
    if let Some(date) = meta.target_date {
        let _ = writeln!(out, "- Target date: {date}");
    }
    if let Some(regime) = &meta.market_regime {
        let _ = writeln!(out, "- Market regime: {regime}");
    }
    if meta.event_proximity {
        out.push_str("- Event proximity: yes\n");
    }
    out.push('\n');

    out.push_str("## Overall\n\n");
    out.push_str(&format_stats_table(
        "Group",
        [("all".to_string(), &report.aggregate.overall)],
    ));

    out.push_str("\n## Outcomes\n\n");
    out.push_str(&format_outcome_table(&report.outcomes));

    out.push_str("\n## By rank\n\n");
    out.push_str(&format_stats_table(
        "Rank",
        report
            .aggregate
            .by_rank
            .iter()
            .map(|(rank, stats)| (rank.to_string(), stats)),
    ));

    out.push_str("\n## By setup type\n\n");
    out.push_str(&format_stats_table(
        "Setup type",
        report
            .aggregate
            .by_setup_type
            .iter()
            .map(|(label, stats)| (label.clone(), stats)),
    ));

    if let Some(summary) = &report.aggregate.interventions {
        out.push_str("\n## Interventions\n\n");
        out.push_str(&format_intervention_table(summary));
    }

    if let (Some(bias), Some(vol)) = (
        report.environment.bias_accuracy,
        report.environment.vol_accuracy,
    ) {
        let _ = writeln!(
            out,
            "\n## Environment\n\nBias accuracy {}, volatility accuracy {}",
            format_rate(Some(bias)),
            format_rate(Some(vol))
        );
    }
    out
}

fn format_rate(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.1}%", v * 100.0))
}

fn format_number(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.decimals$}"))
}

fn format_stats_table<'a>(
    key_header: &str,
    rows: impl IntoIterator<Item = (String, &'a GroupStats)>,
) -> String {
    let mut out = format!(
        "| {key_header} | Setups | Direction | Entry hit | Target hit | Calibration err | Pips |\n\
         |---|---:|---:|---:|---:|---:|---:|\n"
    );
    for (key, stats) in rows {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} |",
            key,
            stats.count,
            format_rate(stats.direction_accuracy),
            format_rate(stats.entry_hit_rate),
            format_rate(stats.target_hit_rate),
            format_number(stats.avg_calibration_error, 3),
            format_number(stats.total_pips, 1),
        );
    }
    out
}

fn format_outcome_table(outcomes: &[OutcomeRecord]) -> String {
    if outcomes.is_empty() {
        return "No setups evaluated.\n".to_string();
    }
    let mut out = String::from(
        "| Instrument | Rank | Type | Stance | Status | Entry | Correct | Pips | R:R |\n\
         |---|---:|---|---|---|---:|---|---:|---:|\n",
    );
    for o in outcomes {
        let correct = match o.direction_correct {
            Some(true) => "yes",
            Some(false) => "no",
            None => "-",
        };
        let _ = writeln!(
            out,
            "| {} | {} | {} | {:?} | {} | {} | {} | {} | {} |",
            o.instrument,
            o.rank,
            o.setup_type,
            o.stance,
            o.status.label(),
            format_number(o.entry_price, 5),
            correct,
            format_number(o.pips_outcome, 1),
            format_number(o.risk_reward_realized, 2),
        );
    }
    out
}

fn format_intervention_table(summary: &InterventionSummary) -> String {
    let mut out = format!(
        "Total {}, success rate {}\n\n| Type | Count | Success |\n|---|---:|---:|\n",
        summary.total_interventions,
        format_rate(summary.intervention_success_rate)
    );
    for (kind, impact) in &summary.intervention_impact {
        let _ = writeln!(
            out,
            "| {} | {} | {} |",
            kind.label(),
            impact.count,
            format_rate(Some(impact.success_rate))
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_render_as_percentages_or_dash() {
        assert_eq!(format_rate(Some(0.5)), "50.0%");
        assert_eq!(format_rate(None), "-");
        assert_eq!(format_number(Some(-85.0), 1), "-85.0");
    }

    #[test]
    fn empty_outcome_table() {
        assert_eq!(format_outcome_table(&[]), "No setups evaluated.\n");
    }

    #[test]
    fn stats_table_has_one_row_per_group() {
        let stats = GroupStats {
            count: 2,
            direction_accuracy: Some(1.0),
            ..GroupStats::default()
        };
        let table = format_stats_table("Rank", [("1".to_string(), &stats)]);
        assert_eq!(table.lines().count(), 3);
        assert!(table.contains("| 1 | 2 | 100.0% | - |"));
    }

    #[test]
    fn intervention_table_lists_each_type() {
        use crate::domain::aggregate::InterventionImpact;
        use crate::domain::setup::InterventionType;

        let summary = InterventionSummary {
            total_interventions: 2,
            intervention_success_rate: Some(0.5),
            intervention_impact: [(
                InterventionType::RiskReduction,
                InterventionImpact {
                    count: 2,
                    success_rate: 0.5,
                },
            )]
            .into_iter()
            .collect(),
        };
        let table = format_intervention_table(&summary);
        assert!(table.starts_with("Total 2, success rate 50.0%"));
        assert!(table.contains("| risk_reduction | 2 | 50.0% |"));
    }
}
