//! Batch aggregation of outcome records.
//!
//! Every rate is taken over the records for which its metric is defined, and
//! an empty denominator yields `None`:
//!
//! | metric              | denominator                          |
//! |---------------------|--------------------------------------|
//! | direction accuracy  | records with `direction_correct`     |
//! | entry hit rate      | records that are not `NO_TRADE`      |
//! | target hit rate     | `STOP_HIT` + `TARGET_HIT`            |
//! | avg confidence      | records with a confidence            |
//! | avg calibration     | records with a calibration error     |
//! | total pips          | entered records                      |

use serde::Serialize;
use std::collections::BTreeMap;

use super::evaluator::{OutcomeRecord, OutcomeStatus};
use super::setup::InterventionType;

/// Regime label used when the caller declares none.
pub const UNSPECIFIED_REGIME: &str = "unspecified";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupStats {
    pub count: usize,
    pub direction_accuracy: Option<f64>,
    pub entry_hit_rate: Option<f64>,
    pub target_hit_rate: Option<f64>,
    pub avg_confidence: Option<f64>,
    pub avg_calibration_error: Option<f64>,
    pub total_pips: Option<f64>,
}

impl GroupStats {
    pub fn compute<'a>(outcomes: impl IntoIterator<Item = &'a OutcomeRecord>) -> Self {
        let mut count = 0usize;
        let mut direction_defined = 0usize;
        let mut direction_hits = 0usize;
        let mut tradable = 0usize;
        let mut entered = 0usize;
        let mut resolved = 0usize;
        let mut targets = 0usize;
        let mut confidence_sum = 0.0_f64;
        let mut confidence_n = 0usize;
        let mut calibration_sum = 0.0_f64;
        let mut calibration_n = 0usize;
        let mut pips_sum = 0.0_f64;

        for outcome in outcomes {
            count += 1;
            if let Some(correct) = outcome.direction_correct {
                direction_defined += 1;
                if correct {
                    direction_hits += 1;
                }
            }
            if outcome.status != OutcomeStatus::NoTrade {
                tradable += 1;
            }
            if outcome.status.is_entered() {
                entered += 1;
                pips_sum += outcome.pips_outcome.unwrap_or(0.0);
            }
            if outcome.status.is_resolved() {
                resolved += 1;
                if outcome.status == OutcomeStatus::TargetHit {
                    targets += 1;
                }
            }
            if let Some(c) = outcome.confidence {
                confidence_sum += c;
                confidence_n += 1;
            }
            if let Some(e) = outcome.calibration_error {
                calibration_sum += e;
                calibration_n += 1;
            }
        }

        GroupStats {
            count,
            direction_accuracy: ratio(direction_hits as f64, direction_defined),
            entry_hit_rate: ratio(entered as f64, tradable),
            target_hit_rate: ratio(targets as f64, resolved),
            avg_confidence: ratio(confidence_sum, confidence_n),
            avg_calibration_error: ratio(calibration_sum, calibration_n),
            total_pips: (entered > 0).then_some(pips_sum),
        }
    }
}

fn ratio(numerator: f64, denominator: usize) -> Option<f64> {
    (denominator > 0).then(|| numerator / denominator as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub total_setups: usize,
    pub overall: GroupStats,
    pub outcome_counts: BTreeMap<OutcomeStatus, usize>,
    pub by_rank: BTreeMap<u32, GroupStats>,
    pub by_regime: BTreeMap<String, GroupStats>,
    pub by_setup_type: BTreeMap<String, GroupStats>,
    /// Present for human-reviewed runs only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interventions: Option<InterventionSummary>,
}

impl AggregateReport {
    pub fn compute(outcomes: &[OutcomeRecord], regime: Option<&str>) -> Self {
        let outcome_counts = OutcomeStatus::ALL
            .iter()
            .map(|status| {
                let n = outcomes.iter().filter(|o| o.status == *status).count();
                (*status, n)
            })
            .collect();

        let mut by_rank: BTreeMap<u32, Vec<&OutcomeRecord>> = BTreeMap::new();
        let mut by_setup_type: BTreeMap<String, Vec<&OutcomeRecord>> = BTreeMap::new();
        for outcome in outcomes {
            by_rank.entry(outcome.rank).or_default().push(outcome);
            by_setup_type
                .entry(outcome.setup_type.label().to_string())
                .or_default()
                .push(outcome);
        }

        let mut by_regime = BTreeMap::new();
        if !outcomes.is_empty() {
            let label = regime.unwrap_or(UNSPECIFIED_REGIME).to_string();
            by_regime.insert(label, GroupStats::compute(outcomes));
        }

        AggregateReport {
            total_setups: outcomes.len(),
            overall: GroupStats::compute(outcomes),
            outcome_counts,
            by_rank: by_rank
                .into_iter()
                .map(|(k, v)| (k, GroupStats::compute(v)))
                .collect(),
            by_regime,
            by_setup_type: by_setup_type
                .into_iter()
                .map(|(k, v)| (k, GroupStats::compute(v)))
                .collect(),
            interventions: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterventionImpact {
    pub count: usize,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InterventionSummary {
    pub total_interventions: usize,
    pub intervention_success_rate: Option<f64>,
    pub intervention_impact: BTreeMap<InterventionType, InterventionImpact>,
}

impl InterventionSummary {
    /// Only records carrying an intervention type count. A missing success
    /// flag counts as a failure.
    pub fn compute(outcomes: &[OutcomeRecord]) -> Self {
        let mut by_type: BTreeMap<InterventionType, (usize, usize)> = BTreeMap::new();
        for outcome in outcomes {
            if let Some(kind) = outcome.intervention_type {
                let entry = by_type.entry(kind).or_default();
                entry.0 += 1;
                if outcome.intervention_success == Some(true) {
                    entry.1 += 1;
                }
            }
        }

        let total: usize = by_type.values().map(|(n, _)| n).sum();
        let successes: usize = by_type.values().map(|(_, ok)| ok).sum();
        InterventionSummary {
            total_interventions: total,
            intervention_success_rate: ratio(successes as f64, total),
            intervention_impact: by_type
                .into_iter()
                .map(|(kind, (count, ok))| {
                    let impact = InterventionImpact {
                        count,
                        success_rate: ok as f64 / count as f64,
                    };
                    (kind, impact)
                })
                .collect(),
        }
    }
}
