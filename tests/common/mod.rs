#![allow(dead_code)]

use chrono::{DateTime, Duration, FixedOffset};
use fxeval::domain::bar::Bar;
use fxeval::domain::error::EvalError;
use fxeval::ports::data_port::DataPort;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::ExitCode;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub atr: HashMap<String, f64>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            atr: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, instrument: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(instrument.to_string(), bars);
        self
    }

    pub fn with_atr(mut self, instrument: &str, atr: f64) -> Self {
        self.atr.insert(instrument.to_string(), atr);
        self
    }

    pub fn with_error(mut self, instrument: &str, reason: &str) -> Self {
        self.errors.insert(instrument.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self, instrument: &str, _timeframe: &str) -> Result<Vec<Bar>, EvalError> {
        if let Some(reason) = self.errors.get(instrument) {
            return Err(EvalError::DataParse {
                reason: reason.clone(),
            });
        }
        self.data
            .get(instrument)
            .cloned()
            .ok_or_else(|| EvalError::MissingInstrument {
                instrument: instrument.to_string(),
            })
    }

    fn daily_atr(&self, instrument: &str) -> Result<Option<f64>, EvalError> {
        Ok(self.atr.get(instrument).copied())
    }

    fn list_instruments(&self) -> Result<Vec<String>, EvalError> {
        let mut names: Vec<String> = self.data.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

pub fn jst(value: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(value).unwrap()
}

/// 09:00 JST on the scenario date.
pub fn session_open() -> DateTime<FixedOffset> {
    jst("2025-11-27T09:00:00+09:00")
}

/// Bars every 15 minutes from `start` as (open, high, low, close).
pub fn make_bars(start: DateTime<FixedOffset>, ohlc: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    ohlc.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Bar {
            timestamp: start + Duration::minutes(15 * i as i64),
            open,
            high,
            low,
            close,
        })
        .collect()
}

/// Five bars drifting down from 152.20 into the 151.50-151.80 zone, touching
/// it on the fifth bar.
pub fn approach() -> Vec<(f64, f64, f64, f64)> {
    vec![
        (152.20, 152.30, 152.10, 152.15),
        (152.15, 152.20, 152.00, 152.05),
        (152.05, 152.10, 151.90, 151.95),
        (151.95, 152.00, 151.85, 151.90),
        (151.90, 151.95, 151.70, 151.75),
    ]
}

/// Approach, then a fall through the 150.80 stop.
pub fn stop_path() -> Vec<Bar> {
    let mut ohlc = approach();
    ohlc.push((151.75, 151.90, 151.40, 151.50));
    ohlc.push((151.50, 151.55, 150.75, 150.90));
    ohlc.push((150.90, 151.00, 150.60, 150.70));
    make_bars(session_open(), &ohlc)
}

/// Approach, then a rally through the 152.90 target.
pub fn target_path() -> Vec<Bar> {
    let mut ohlc = approach();
    ohlc.push((151.75, 152.40, 151.70, 152.30));
    ohlc.push((152.30, 152.95, 152.20, 152.85));
    ohlc.push((152.85, 152.90, 152.60, 152.70));
    make_bars(session_open(), &ohlc)
}

/// A quiet day that closes above its open.
pub fn rising_path() -> Vec<Bar> {
    make_bars(
        session_open(),
        &[
            (1.0500, 1.0515, 1.0495, 1.0510),
            (1.0510, 1.0525, 1.0505, 1.0520),
            (1.0520, 1.0540, 1.0515, 1.0535),
        ],
    )
}

/// The USDJPY pullback-buy used across scenarios, in schema 2.3 form.
pub fn long_strategy() -> Value {
    json!({
        "pair": "USDJPY",
        "rank": 1,
        "strategy_type": "PULLBACK_BUY",
        "direction": "LONG",
        "valid_sessions": ["TOKYO", "LONDON"],
        "entry": { "zone_min": 151.50, "zone_max": 151.80, "strict_limit": 151.60 },
        "exit": { "take_profit": 152.90, "stop_loss": 150.80, "invalidation": 150.50 },
        "confidence_score": 0.7,
        "confidence_breakdown": { "technical": 0.7, "trend": 0.7, "proximity": 0.7, "fundamental": 0.7 },
        "risk_reward": 1.6,
        "rationale": "pullback into prior breakout level",
        "alternative_scenario": { "direction": "SHORT", "probability": 0.3, "reason": "BoJ headline risk" }
    })
}

pub fn wait_strategy(pair: &str) -> Value {
    json!({
        "pair": pair,
        "rank": 2,
        "strategy_type": "RANGE_WATCH",
        "direction": "WAIT",
        "valid_sessions": ["TOKYO"],
        "entry": { "zone_min": null, "zone_max": null, "strict_limit": null },
        "exit": {},
        "confidence_score": 0.6
    })
}

pub fn document(strategies: Vec<Value>, environment: Value) -> String {
    json!({
        "meta": { "schema_version": "2.3", "generated_at": "2025-11-27 08:30:00 JST" },
        "market_environment": environment,
        "ranking": { "top_3": ["USDJPY"], "bottom_3": [] },
        "strategies": strategies
    })
    .to_string()
}

pub fn outcome_document(instruments: &[(&str, &[Bar])]) -> String {
    let pairs: serde_json::Map<String, Value> = instruments
        .iter()
        .map(|(name, bars)| {
            (
                name.to_string(),
                json!({ "timeframes": { "15m": { "bars": bars } } }),
            )
        })
        .collect();
    json!({ "pairs": pairs }).to_string()
}

pub fn exit_code_eq(actual: ExitCode, expected: ExitCode) -> bool {
    format!("{actual:?}") == format!("{expected:?}")
}
