//! End-to-end tests of the evaluation entry point over a mock data port.

mod common;

use approx::assert_relative_eq;
use common::*;
use fxeval::domain::config::EvalConfig;
use fxeval::domain::engine::{evaluate, EvaluationReport, EvaluationRequest, Mode};
use fxeval::domain::environment::ScoreStatus;
use fxeval::domain::error::{ErrorKind, EvalError};
use fxeval::domain::evaluator::{OutcomeStatus, RealizedDirection};
use fxeval::domain::schema::parse_document;
use fxeval::domain::session::default_offset;
use fxeval::domain::setup::PredictionDocument;
use serde_json::json;

fn parse(text: &str) -> PredictionDocument {
    parse_document(text, default_offset()).unwrap()
}

fn run(doc: &PredictionDocument, data: &MockDataPort) -> Result<EvaluationReport, EvalError> {
    evaluate(
        doc,
        data,
        &EvalConfig::default(),
        &EvaluationRequest::new(Mode::Ai),
    )
}

mod scenarios {
    use super::*;

    #[test]
    fn scenario_a_stop_hit() {
        let doc = parse(&document(vec![long_strategy()], json!({})));
        let data = MockDataPort::new().with_bars("USDJPY", stop_path());
        let report = run(&doc, &data).unwrap();

        let o = &report.outcomes[0];
        assert!(o.entry_hit);
        assert_eq!(o.entry_time, Some(session_open() + chrono::Duration::minutes(60)));
        assert_eq!(o.entry_price, Some(151.60));
        assert_eq!(o.status, OutcomeStatus::StopHit);
        assert_eq!(o.exit_price, Some(150.80));
        let pips = o.pips_outcome.unwrap();
        assert_relative_eq!(pips, -80.0, epsilon = 1e-6);
        assert!((-100.0..=-70.0).contains(&pips));
        assert_eq!(o.risk_reward_realized, None);
        assert_eq!(o.realized_direction, RealizedDirection::Down);
        assert_eq!(o.direction_correct, Some(false));
    }

    #[test]
    fn scenario_b_target_hit() {
        let doc = parse(&document(vec![long_strategy()], json!({})));
        let data = MockDataPort::new().with_bars("USDJPY", target_path());
        let report = run(&doc, &data).unwrap();

        let o = &report.outcomes[0];
        assert_eq!(o.status, OutcomeStatus::TargetHit);
        let pips = o.pips_outcome.unwrap();
        assert_relative_eq!(pips, 130.0, epsilon = 1e-6);
        assert!((110.0..=140.0).contains(&pips));
        assert_relative_eq!(
            o.risk_reward_realized.unwrap(),
            (152.90 - 151.60) / (151.60 - 150.80),
            epsilon = 1e-9
        );
        assert_eq!(o.direction_correct, Some(true));
        assert_eq!(report.aggregate.overall.target_hit_rate, Some(1.0));
    }

    #[test]
    fn scenario_c_no_trade_scored_against_bias() {
        let doc = parse(&document(
            vec![wait_strategy("EURUSD")],
            json!({ "EURUSD": { "bias": "BULLISH", "vol_expect": "LOW" } }),
        ));
        let data = MockDataPort::new().with_bars("EURUSD", rising_path());
        let report = run(&doc, &data).unwrap();

        let o = &report.outcomes[0];
        assert_eq!(o.status, OutcomeStatus::NoTrade);
        assert!(!o.entry_hit);
        assert_eq!(o.direction_correct, Some(true));
        assert_eq!(o.pips_outcome, None);
        assert_eq!(o.risk_reward_realized, None);

        let overall = &report.aggregate.overall;
        assert_eq!(overall.direction_accuracy, Some(1.0));
        assert_eq!(overall.entry_hit_rate, None);
        assert_eq!(overall.total_pips, None);
    }

    #[test]
    fn scenario_d_missing_instrument_fails_batch() {
        let mut xyz = long_strategy();
        xyz["pair"] = json!("XYZABC");
        xyz["rank"] = json!(2);
        let doc = parse(&document(vec![long_strategy(), xyz], json!({})));
        let data = MockDataPort::new().with_bars("USDJPY", stop_path());

        let err = run(&doc, &data).unwrap_err();
        assert!(matches!(&err, EvalError::MissingInstrument { instrument } if instrument == "XYZABC"));
        assert_eq!(err.kind(), ErrorKind::Data);
    }
}

mod window {
    use super::*;

    /// One bar at `time`, followed by the standard rally through the target.
    fn early_bar_then_target(time: &str, ohlc: (f64, f64, f64, f64)) -> Vec<fxeval::domain::bar::Bar> {
        let mut bars = make_bars(jst(time), &[ohlc]);
        bars.extend(target_path());
        bars
    }

    #[test]
    fn bar_before_generation_cannot_invalidate() {
        let doc = parse(&document(vec![long_strategy()], json!({})));
        let bars = early_bar_then_target("2025-11-27T03:00:00+09:00", (150.60, 150.70, 150.40, 150.60));
        let data = MockDataPort::new().with_bars("USDJPY", bars);
        let report = run(&doc, &data).unwrap();

        let o = &report.outcomes[0];
        assert_eq!(o.status, OutcomeStatus::TargetHit);
        assert!(o.entry_hit);
        assert_eq!(o.entry_time, Some(session_open() + chrono::Duration::minutes(60)));
    }

    #[test]
    fn bar_before_generation_cannot_fill() {
        let mut setup = long_strategy();
        setup["valid_sessions"] = json!(["NEW_YORK_LATE", "TOKYO"]);
        let doc = parse(&document(vec![setup], json!({})));
        let bars = early_bar_then_target("2025-11-27T02:00:00+09:00", (151.60, 151.70, 151.55, 151.65));
        let data = MockDataPort::new().with_bars("USDJPY", bars);
        let report = run(&doc, &data).unwrap();

        let o = &report.outcomes[0];
        assert_eq!(o.entry_time, Some(session_open() + chrono::Duration::minutes(60)));
        assert_eq!(o.status, OutcomeStatus::TargetHit);
    }

    #[test]
    fn explicit_later_target_date_opens_at_its_midnight() {
        let doc = parse(&document(vec![long_strategy()], json!({})));
        let next_day = jst("2025-11-28T01:00:00+09:00");
        let mut bars = stop_path();
        bars.extend(make_bars(next_day, &[(151.70, 151.75, 151.55, 151.60)]));
        let data = MockDataPort::new().with_bars("USDJPY", bars);
        let mut request = EvaluationRequest::new(Mode::Ai);
        request.target_date = chrono::NaiveDate::from_ymd_opt(2025, 11, 28);

        let report = evaluate(&doc, &data, &EvalConfig::default(), &request).unwrap();
        let o = &report.outcomes[0];
        assert_eq!(o.status, OutcomeStatus::NotEntered);
        assert_eq!(report.metadata.target_date, request.target_date);
    }
}

mod batch {
    use super::*;

    fn mixed_document() -> PredictionDocument {
        let mut eurusd = wait_strategy("EURUSD");
        eurusd["rank"] = json!(3);
        parse(&document(
            vec![long_strategy(), eurusd],
            json!({
                "USDJPY": { "bias": "BEARISH", "vol_expect": "HIGH" },
                "EURUSD": { "bias": "BULLISH", "vol_expect": "LOW" }
            }),
        ))
    }

    fn mixed_data() -> MockDataPort {
        MockDataPort::new()
            .with_bars("USDJPY", stop_path())
            .with_bars("EURUSD", rising_path())
            .with_atr("USDJPY", 1.2)
    }

    #[test]
    fn outcomes_follow_document_order() {
        let report = run(&mixed_document(), &mixed_data()).unwrap();
        let order: Vec<(&str, u32)> = report
            .outcomes
            .iter()
            .map(|o| (o.instrument.as_str(), o.rank))
            .collect();
        assert_eq!(order, vec![("USDJPY", 1), ("EURUSD", 3)]);
        assert_eq!(report.aggregate.total_setups, 2);
        assert_eq!(report.aggregate.by_rank.len(), 2);
        assert_eq!(report.aggregate.outcome_counts[&OutcomeStatus::StopHit], 1);
        assert_eq!(report.aggregate.outcome_counts[&OutcomeStatus::NoTrade], 1);
    }

    #[test]
    fn direction_accuracy_spans_trade_and_no_trade() {
        let report = run(&mixed_document(), &mixed_data()).unwrap();
        let overall = &report.aggregate.overall;
        assert_eq!(overall.direction_accuracy, Some(0.5));
        assert_eq!(overall.entry_hit_rate, Some(1.0));
        assert_relative_eq!(overall.total_pips.unwrap(), -80.0, epsilon = 1e-6);
    }

    #[test]
    fn environment_without_previous_day_is_no_data() {
        let report = run(&mixed_document(), &mixed_data()).unwrap();
        let usdjpy = &report.environment.instruments["USDJPY"];
        assert_eq!(usdjpy.status, ScoreStatus::NoData);
        assert_eq!(report.environment.bias_accuracy, None);
    }

    #[test]
    fn metadata_carries_request_labels() {
        let mut request = EvaluationRequest::new(Mode::Hitl);
        request.regime = Some("trending".into());
        request.event_proximity = true;
        let report = evaluate(
            &mixed_document(),
            &mixed_data(),
            &EvalConfig::default(),
            &request,
        )
        .unwrap();
        assert_eq!(report.metadata.mode, Mode::Hitl);
        assert_eq!(report.metadata.market_regime.as_deref(), Some("trending"));
        assert!(report.metadata.event_proximity);
        assert_eq!(
            report.metadata.target_date,
            chrono::NaiveDate::from_ymd_opt(2025, 11, 27)
        );
        assert!(report.aggregate.by_regime.contains_key("trending"));
    }

    #[test]
    fn closed_regime_set_rejects_unknown_label() {
        let config = EvalConfig {
            regimes: Some(vec!["trending".into(), "ranging".into()]),
            ..EvalConfig::default()
        };
        let mut request = EvaluationRequest::new(Mode::Ai);
        request.regime = Some("sideways".into());
        let err = evaluate(&mixed_document(), &mixed_data(), &config, &request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn report_is_idempotent() {
        let doc = mixed_document();
        let data = mixed_data();
        let first = serde_json::to_string_pretty(&run(&doc, &data).unwrap()).unwrap();
        let second = serde_json::to_string_pretty(&run(&doc, &data).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn parallel_matches_sequential() {
        let doc = mixed_document();
        let data = mixed_data();
        let request = EvaluationRequest::new(Mode::Ai);
        let sequential = evaluate(&doc, &data, &EvalConfig::default(), &request).unwrap();
        let parallel_config = EvalConfig {
            parallel: true,
            ..EvalConfig::default()
        };
        let parallel = evaluate(&doc, &data, &parallel_config, &request).unwrap();
        assert_eq!(sequential, parallel);
    }
}

mod failures {
    use super::*;

    #[test]
    fn unknown_session_is_config_error() {
        let mut setup = long_strategy();
        setup["valid_sessions"] = json!(["SYDNEY"]);
        let doc = parse(&document(vec![setup], json!({})));
        let data = MockDataPort::new().with_bars("USDJPY", stop_path());
        let err = run(&doc, &data).unwrap_err();
        assert!(matches!(err, EvalError::UnknownSession { .. }));
    }

    #[test]
    fn out_of_order_bars_are_data_error() {
        let mut bars = stop_path();
        bars.swap(1, 2);
        let doc = parse(&document(vec![long_strategy()], json!({})));
        let data = MockDataPort::new().with_bars("USDJPY", bars);
        let err = run(&doc, &data).unwrap_err();
        assert!(matches!(err, EvalError::BarsOutOfOrder { .. }));
    }

    #[test]
    fn empty_series_is_data_error() {
        let doc = parse(&document(vec![long_strategy()], json!({})));
        let data = MockDataPort::new().with_bars("USDJPY", Vec::new());
        let err = run(&doc, &data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
    }

    #[test]
    fn data_port_error_propagates() {
        let doc = parse(&document(vec![long_strategy()], json!({})));
        let data = MockDataPort::new()
            .with_bars("USDJPY", stop_path())
            .with_error("USDJPY", "disk unplugged");
        let err = run(&doc, &data).unwrap_err();
        assert!(matches!(err, EvalError::DataParse { reason } if reason == "disk unplugged"));
    }
}

mod schema_checks {
    use super::*;

    fn parse_err(text: &str) -> EvalError {
        parse_document(text, default_offset()).unwrap_err()
    }

    #[test]
    fn breakdown_mismatch_rejected_before_evaluation() {
        let mut setup = long_strategy();
        setup["confidence_breakdown"]["technical"] = json!(0.9);
        let err = parse_err(&document(vec![setup], json!({})));
        assert!(matches!(err, EvalError::Schema { reason, .. } if reason == "confidence mismatch"));
    }

    #[test]
    fn alternative_probability_must_complement_confidence() {
        let mut setup = long_strategy();
        setup["alternative_scenario"]["probability"] = json!(0.4);
        let err = parse_err(&document(vec![setup], json!({})));
        assert!(matches!(err, EvalError::Schema { reason, .. } if reason == "confidence mismatch"));
    }

    #[test]
    fn tolerance_edge_is_accepted() {
        let mut setup = long_strategy();
        setup["alternative_scenario"]["probability"] = json!(0.31);
        parse(&document(vec![setup], json!({})));
    }

    #[test]
    fn breakout_without_direction_rejected_before_2_2() {
        let text = json!({
            "schema_version": "2.1",
            "strategies": [{
                "pair": "GBPUSD", "rank": 1, "strategy_type": "BREAKOUT",
                "entry": { "zone_min": 1.27, "zone_max": 1.28 }
            }]
        })
        .to_string();
        let err = parse_err(&text);
        assert!(matches!(&err, EvalError::Schema { field, .. } if field == "strategies[0].direction"));
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn direction_inferred_from_type_before_2_2() {
        let text = json!({
            "schema_version": "2.0",
            "strategies": [{
                "pair": "USDJPY", "rank": 1, "strategy_type": "PULLBACK_BUY",
                "entry": { "zone_min": 151.5, "zone_max": 151.8 },
                "exit": { "take_profit": 152.9, "stop_loss": 150.8 }
            }]
        })
        .to_string();
        let doc = parse(&text);
        assert_eq!(
            doc.setups[0].direction(),
            Some(fxeval::domain::setup::Direction::Long)
        );
        let data = MockDataPort::new().with_bars("USDJPY", target_path());
        let report = run(&doc, &data).unwrap();
        assert_eq!(report.outcomes[0].status, OutcomeStatus::TargetHit);
    }

    #[test]
    fn unknown_version_fails_closed() {
        let text = json!({ "schema_version": "3.0", "strategies": [] }).to_string();
        assert!(matches!(parse_err(&text), EvalError::UnsupportedVersion { .. }));
    }
}

mod interventions {
    use super::*;
    use fxeval::domain::setup::InterventionType;

    fn reviewed_document() -> PredictionDocument {
        let mut setup = long_strategy();
        setup["hitl_modifications"] = json!([{ "modification_type": "risk_reduction" }]);
        parse(&document(vec![setup, wait_strategy("EURUSD")], json!({})))
    }

    fn data() -> MockDataPort {
        MockDataPort::new()
            .with_bars("USDJPY", target_path())
            .with_bars("EURUSD", rising_path())
    }

    #[test]
    fn hitl_run_summarizes_interventions() {
        let doc = reviewed_document();
        let report = evaluate(
            &doc,
            &data(),
            &EvalConfig::default(),
            &EvaluationRequest::new(Mode::Hitl),
        )
        .unwrap();

        assert_eq!(report.outcomes[0].intervention_type, Some(InterventionType::RiskReduction));
        assert_eq!(report.outcomes[0].intervention_success, Some(true));
        let summary = report.aggregate.interventions.as_ref().unwrap();
        assert_eq!(summary.total_interventions, 1);
        assert_eq!(summary.intervention_success_rate, Some(1.0));
        assert_eq!(summary.intervention_impact[&InterventionType::RiskReduction].count, 1);
    }

    #[test]
    fn ai_run_scores_identically_without_summary() {
        let doc = reviewed_document();
        let ai = run(&doc, &data()).unwrap();
        let hitl = evaluate(
            &doc,
            &data(),
            &EvalConfig::default(),
            &EvaluationRequest::new(Mode::Hitl),
        )
        .unwrap();

        assert!(ai.aggregate.interventions.is_none());
        assert_eq!(ai.outcomes, hitl.outcomes);
        assert_eq!(ai.aggregate.overall, hitl.aggregate.overall);
    }
}
