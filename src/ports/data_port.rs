//! Actual-outcome data access port trait.

use crate::domain::bar::Bar;
use crate::domain::error::EvalError;

pub trait DataPort {
    /// Bars for `instrument` at `timeframe`, as stored. Ordering and
    /// uniqueness are checked by [`crate::domain::series::BarSeries`].
    fn fetch_bars(&self, instrument: &str, timeframe: &str) -> Result<Vec<Bar>, EvalError>;

    /// Daily average true range, if the source carries one.
    fn daily_atr(&self, instrument: &str) -> Result<Option<f64>, EvalError>;

    fn list_instruments(&self) -> Result<Vec<String>, EvalError>;

    fn has_instrument(&self, instrument: &str) -> Result<bool, EvalError> {
        Ok(self
            .list_instruments()?
            .iter()
            .any(|i| i.eq_ignore_ascii_case(instrument)))
    }
}
