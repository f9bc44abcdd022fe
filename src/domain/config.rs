//! Evaluation parameters.
//!
//! `EvalConfig` is built from the INI config through [`ConfigPort`] after
//! [`crate::domain::config_validation`] has accepted it.

use std::collections::BTreeMap;

use crate::domain::config_validation::{
    validate_evaluation_config, validate_pip_size_config, validate_session_config,
};
use crate::domain::error::EvalError;
use crate::domain::session::{SessionCalendar, SessionWindow, default_offset, parse_offset};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_TIMEFRAME: &str = "15m";

const JPY_PIP: f64 = 0.01;
const STANDARD_PIP: f64 = 0.0001;

#[derive(Debug, Clone)]
pub struct EvalConfig {
    pub timeframe: String,
    pub spread_pips: f64,
    pub parallel: bool,
    /// Closed set of accepted regime labels; `None` accepts any label.
    pub regimes: Option<Vec<String>>,
    pub pip_sizes: BTreeMap<String, f64>,
    pub calendar: SessionCalendar,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            timeframe: DEFAULT_TIMEFRAME.to_string(),
            spread_pips: 0.0,
            parallel: false,
            regimes: None,
            pip_sizes: BTreeMap::new(),
            calendar: SessionCalendar::default(),
        }
    }
}

impl EvalConfig {
    pub fn from_port(config: &dyn ConfigPort) -> Result<Self, EvalError> {
        validate_evaluation_config(config)?;
        validate_session_config(config)?;
        validate_pip_size_config(config)?;

        let timeframe = config
            .get_string("evaluation", "timeframe")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| DEFAULT_TIMEFRAME.to_string());

        let regimes = config.get_string("evaluation", "regimes").map(|raw| {
            raw.split(',')
                .map(|r| r.trim().to_string())
                .collect::<Vec<_>>()
        });

        let mut pip_sizes = BTreeMap::new();
        for key in config.section_keys("pip_size") {
            let size = config.get_double("pip_size", &key, STANDARD_PIP);
            pip_sizes.insert(key.to_uppercase(), size);
        }

        Ok(Self {
            timeframe,
            spread_pips: config.get_double("evaluation", "spread_pips", 0.0),
            parallel: config.get_bool("evaluation", "parallel", false),
            regimes,
            pip_sizes,
            calendar: build_calendar(config)?,
        })
    }

    /// Configured pip size, else 0.01 for JPY crosses and 0.0001 otherwise.
    pub fn pip_size(&self, instrument: &str) -> f64 {
        let instrument = instrument.to_uppercase();
        if let Some(size) = self.pip_sizes.get(&instrument) {
            return *size;
        }
        if instrument.contains("JPY") {
            JPY_PIP
        } else {
            STANDARD_PIP
        }
    }

    /// Rejects a regime label outside the configured closed set.
    pub fn check_regime(&self, regime: &str) -> Result<(), EvalError> {
        let Some(allowed) = &self.regimes else {
            return Ok(());
        };
        if allowed.iter().any(|r| r.eq_ignore_ascii_case(regime)) {
            Ok(())
        } else {
            Err(EvalError::UnknownRegime {
                regime: regime.to_string(),
                allowed: allowed.join(", "),
            })
        }
    }
}

/// A `[sessions]` section replaces the default sessions entirely.
fn build_calendar(config: &dyn ConfigPort) -> Result<SessionCalendar, EvalError> {
    let offset = match config.get_string("evaluation", "reference_offset") {
        Some(raw) => parse_offset(&raw).map_err(|reason| EvalError::ConfigInvalid {
            section: "evaluation".to_string(),
            key: "reference_offset".to_string(),
            reason,
        })?,
        None => default_offset(),
    };

    let keys = config.section_keys("sessions");
    if keys.is_empty() {
        if offset == default_offset() {
            return Ok(SessionCalendar::default());
        }
        return Err(EvalError::ConfigInvalid {
            section: "sessions".to_string(),
            key: "*".to_string(),
            reason: "a non-default reference_offset requires explicit sessions".to_string(),
        });
    }

    let mut calendar = SessionCalendar::new(offset);
    for key in keys {
        let raw = config.get_string("sessions", &key).unwrap_or_default();
        let window = SessionWindow::parse(&raw).map_err(|reason| EvalError::ConfigInvalid {
            section: "sessions".to_string(),
            key: key.clone(),
            reason,
        })?;
        calendar = calendar.with_session(&key, window);
    }
    Ok(calendar)
}
