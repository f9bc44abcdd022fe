//! Report output port trait.

use crate::domain::engine::EvaluationReport;
use crate::domain::error::EvalError;

/// Port for persisting evaluation reports.
pub trait ReportPort {
    fn write(&self, report: &EvaluationReport, output_path: &str) -> Result<(), EvalError>;
}
