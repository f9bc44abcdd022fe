//! Configuration validation.
//!
//! Validates every config field before an evaluation runs.

use crate::domain::error::EvalError;
use crate::domain::session::{SessionWindow, parse_offset};
use crate::ports::config_port::ConfigPort;

pub fn validate_evaluation_config(config: &dyn ConfigPort) -> Result<(), EvalError> {
    validate_timeframe(config)?;
    validate_spread(config)?;
    validate_reference_offset(config)?;
    validate_parallel(config)?;
    validate_regimes(config)?;
    Ok(())
}

pub fn validate_session_config(config: &dyn ConfigPort) -> Result<(), EvalError> {
    for key in config.section_keys("sessions") {
        let value = config.get_string("sessions", &key).unwrap_or_default();
        SessionWindow::parse(&value).map_err(|reason| invalid("sessions", &key, reason))?;
    }
    Ok(())
}

pub fn validate_pip_size_config(config: &dyn ConfigPort) -> Result<(), EvalError> {
    for key in config.section_keys("pip_size") {
        let value = config.get_string("pip_size", &key).unwrap_or_default();
        match value.trim().parse::<f64>() {
            Ok(size) if size.is_finite() && size > 0.0 => {}
            _ => {
                return Err(invalid(
                    "pip_size",
                    &key,
                    format!("pip size must be a positive number, got {value:?}"),
                ));
            }
        }
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> EvalError {
    EvalError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_timeframe(config: &dyn ConfigPort) -> Result<(), EvalError> {
    match config.get_string("evaluation", "timeframe") {
        Some(s) if s.trim().is_empty() => Err(invalid(
            "evaluation",
            "timeframe",
            "timeframe must not be empty",
        )),
        _ => Ok(()),
    }
}

fn validate_spread(config: &dyn ConfigPort) -> Result<(), EvalError> {
    let Some(raw) = config.get_string("evaluation", "spread_pips") else {
        return Ok(());
    };
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(()),
        _ => Err(invalid(
            "evaluation",
            "spread_pips",
            "spread_pips must be a non-negative number",
        )),
    }
}

fn validate_reference_offset(config: &dyn ConfigPort) -> Result<(), EvalError> {
    match config.get_string("evaluation", "reference_offset") {
        None => Ok(()),
        Some(s) => parse_offset(&s)
            .map(|_| ())
            .map_err(|reason| invalid("evaluation", "reference_offset", reason)),
    }
}

fn validate_parallel(config: &dyn ConfigPort) -> Result<(), EvalError> {
    let Some(raw) = config.get_string("evaluation", "parallel") else {
        return Ok(());
    };
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "false" | "no" | "0" => Ok(()),
        _ => Err(invalid(
            "evaluation",
            "parallel",
            format!("expected a boolean, got {raw:?}"),
        )),
    }
}

fn validate_regimes(config: &dyn ConfigPort) -> Result<(), EvalError> {
    let Some(raw) = config.get_string("evaluation", "regimes") else {
        return Ok(());
    };
    if raw.split(',').any(|r| r.trim().is_empty()) {
        return Err(invalid(
            "evaluation",
            "regimes",
            "regimes must be a comma-separated list of non-empty labels",
        ));
    }
    Ok(())
}
