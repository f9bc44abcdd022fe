//! JSON actual-outcome data adapter.
//!
//! Accepts a multi-instrument document keyed by `pairs`, or a single
//! instrument document carrying `pair` at the top level. Each instrument maps
//! timeframe labels to a bar list and an optional ATR figure.

use chrono::FixedOffset;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::domain::bar::Bar;
use crate::domain::error::EvalError;
use crate::domain::schema::parse_timestamp;
use crate::ports::data_port::DataPort;

/// Timeframe labels searched, in order, for the daily ATR.
const DAILY_TIMEFRAMES: [&str; 3] = ["1d", "d1", "daily"];

#[derive(Debug, Deserialize)]
struct RawBar {
    #[serde(alias = "datetime")]
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

#[derive(Debug, Default, Deserialize)]
struct RawTimeframe {
    #[serde(default)]
    bars: Vec<RawBar>,
    atr: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawInstrument {
    #[serde(default)]
    timeframes: BTreeMap<String, RawTimeframe>,
}

#[derive(Debug, Deserialize)]
struct MultiDocument {
    pairs: BTreeMap<String, RawInstrument>,
}

#[derive(Debug, Deserialize)]
struct SingleDocument {
    pair: String,
    #[serde(default)]
    timeframes: BTreeMap<String, RawTimeframe>,
}

#[derive(Debug, Clone, Default)]
struct TimeframeData {
    bars: Vec<Bar>,
    atr: Option<f64>,
}

pub struct JsonOutcomeAdapter {
    instruments: BTreeMap<String, BTreeMap<String, TimeframeData>>,
}

impl JsonOutcomeAdapter {
    /// `offset` applies to bar times written without one.
    pub fn from_file<P: AsRef<Path>>(path: P, offset: FixedOffset) -> Result<Self, EvalError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_str(&content, offset).map_err(|e| match e {
            EvalError::DataParse { reason } => EvalError::DataParse {
                reason: format!("{}: {reason}", path.display()),
            },
            other => other,
        })
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str, offset: FixedOffset) -> Result<Self, EvalError> {
        let value: serde_json::Value = serde_json::from_str(content).map_err(parse_error)?;
        let raw: Vec<(String, BTreeMap<String, RawTimeframe>)> = if value.get("pairs").is_some() {
            let doc: MultiDocument = serde_json::from_value(value).map_err(parse_error)?;
            doc.pairs
                .into_iter()
                .map(|(k, v)| (k, v.timeframes))
                .collect()
        } else if value.get("pair").is_some() {
            let doc: SingleDocument = serde_json::from_value(value).map_err(parse_error)?;
            vec![(doc.pair, doc.timeframes)]
        } else {
            return Err(EvalError::DataParse {
                reason: "expected a \"pairs\" map or a top-level \"pair\"".to_string(),
            });
        };

        let mut instruments = BTreeMap::new();
        for (name, timeframes) in raw {
            let name = name.trim().to_uppercase();
            let converted = convert_timeframes(&name, timeframes, offset)?;
            instruments.insert(name, converted);
        }
        Ok(Self { instruments })
    }

    fn instrument(&self, instrument: &str) -> Result<&BTreeMap<String, TimeframeData>, EvalError> {
        self.instruments
            .get(&instrument.to_uppercase())
            .ok_or_else(|| EvalError::MissingInstrument {
                instrument: instrument.to_string(),
            })
    }
}

fn convert_timeframes(
    instrument: &str,
    raw: BTreeMap<String, RawTimeframe>,
    offset: FixedOffset,
) -> Result<BTreeMap<String, TimeframeData>, EvalError> {
    let mut timeframes = BTreeMap::new();
    for (label, tf) in raw {
        let mut bars = Vec::with_capacity(tf.bars.len());
        for (index, bar) in tf.bars.into_iter().enumerate() {
            let timestamp =
                parse_timestamp(&bar.timestamp, offset).ok_or_else(|| EvalError::DataParse {
                    reason: format!(
                        "{instrument} {label} bar {index}: invalid timestamp {:?}",
                        bar.timestamp
                    ),
                })?;
            bars.push(Bar {
                timestamp,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
            });
        }
        timeframes.insert(label, TimeframeData { bars, atr: tf.atr });
    }
    Ok(timeframes)
}

fn parse_error(e: serde_json::Error) -> EvalError {
    EvalError::DataParse {
        reason: e.to_string(),
    }
}

impl DataPort for JsonOutcomeAdapter {
    fn fetch_bars(&self, instrument: &str, timeframe: &str) -> Result<Vec<Bar>, EvalError> {
        self.instrument(instrument)?
            .iter()
            .find(|(label, _)| label.eq_ignore_ascii_case(timeframe))
            .map(|(_, tf)| tf.bars.clone())
            .ok_or_else(|| EvalError::MissingTimeframe {
                instrument: instrument.to_string(),
                timeframe: timeframe.to_string(),
            })
    }

    fn daily_atr(&self, instrument: &str) -> Result<Option<f64>, EvalError> {
        let timeframes = self.instrument(instrument)?;
        Ok(DAILY_TIMEFRAMES.iter().find_map(|daily| {
            timeframes
                .iter()
                .find(|(label, _)| label.eq_ignore_ascii_case(daily))
                .and_then(|(_, tf)| tf.atr)
        }))
    }

    fn list_instruments(&self) -> Result<Vec<String>, EvalError> {
        Ok(self.instruments.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    const MULTI: &str = r#"{
        "pairs": {
            "usdjpy": { "timeframes": {
                "15m": { "bars": [
                    { "timestamp": "2025-11-27T09:00:00+09:00", "open": 151.9, "high": 152.0, "low": 151.7, "close": 151.8 },
                    { "timestamp": "2025-11-27T09:15:00+09:00", "open": 151.8, "high": 151.9, "low": 151.6, "close": 151.7 }
                ] },
                "1d": { "bars": [], "atr": 0.9 }
            } },
            "EURUSD": { "timeframes": { "15m": { "bars": [] } } }
        }
    }"#;

    #[test]
    fn reads_multi_instrument_document() {
        let adapter = JsonOutcomeAdapter::from_str(MULTI, jst()).unwrap();
        assert_eq!(adapter.list_instruments().unwrap(), vec!["EURUSD", "USDJPY"]);
        let bars = adapter.fetch_bars("USDJPY", "15m").unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp.to_rfc3339(), "2025-11-27T09:00:00+09:00");
        assert_eq!(bars[1].low, 151.6);
        assert_eq!(adapter.daily_atr("usdjpy").unwrap(), Some(0.9));
        assert_eq!(adapter.daily_atr("EURUSD").unwrap(), None);
    }

    #[test]
    fn reads_single_instrument_document() {
        let content = r#"{ "pair": "GBPJPY", "timeframes": { "15m": { "bars": [] } } }"#;
        let adapter = JsonOutcomeAdapter::from_str(content, jst()).unwrap();
        assert!(adapter.has_instrument("gbpjpy").unwrap());
        assert!(adapter.fetch_bars("GBPJPY", "15m").unwrap().is_empty());
    }

    #[test]
    fn missing_instrument_and_timeframe_are_data_errors() {
        let adapter = JsonOutcomeAdapter::from_str(MULTI, jst()).unwrap();
        let err = adapter.fetch_bars("XYZABC", "15m").unwrap_err();
        assert!(matches!(err, EvalError::MissingInstrument { instrument } if instrument == "XYZABC"));
        let err = adapter.fetch_bars("USDJPY", "1h").unwrap_err();
        assert!(matches!(err, EvalError::MissingTimeframe { .. }));
    }

    #[test]
    fn malformed_bar_is_parse_error() {
        let content = r#"{ "pairs": { "USDJPY": { "timeframes": { "15m": { "bars": [ { "timestamp": "yesterday", "open": 1, "high": 1, "low": 1, "close": 1 } ] } } } } }"#;
        let err = JsonOutcomeAdapter::from_str(content, jst()).err().unwrap();
        assert!(matches!(err, EvalError::DataParse { .. }));
    }

    #[test]
    fn unrecognized_shape_is_parse_error() {
        let err = JsonOutcomeAdapter::from_str(r#"{ "bars": [] }"#, jst()).err().unwrap();
        assert!(matches!(err, EvalError::DataParse { .. }));
    }

    #[test]
    fn naive_datetime_is_read_in_reference_offset() {
        let content = r#"{ "pair": "USDJPY", "timeframes": { "15m": { "bars": [
            { "datetime": "2025-11-27 09:00:00", "open": 151.9, "high": 152.0, "low": 151.7, "close": 151.8, "volume": 120 },
            { "timestamp": "2025-11-27T00:15:00+00:00", "open": 151.8, "high": 151.9, "low": 151.6, "close": 151.7 }
        ] } } }"#;
        let adapter = JsonOutcomeAdapter::from_str(content, jst()).unwrap();
        let bars = adapter.fetch_bars("USDJPY", "15m").unwrap();
        assert_eq!(bars[0].timestamp.to_rfc3339(), "2025-11-27T09:00:00+09:00");
        assert_eq!(
            bars[1].timestamp,
            DateTime::parse_from_rfc3339("2025-11-27T09:15:00+09:00").unwrap()
        );
    }
}
