//! JSON report adapter implementing ReportPort.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::engine::EvaluationReport;
use crate::domain::error::EvalError;
use crate::ports::report_port::ReportPort;

pub struct JsonReportAdapter;

impl ReportPort for JsonReportAdapter {
    fn write(&self, report: &EvaluationReport, output_path: &str) -> Result<(), EvalError> {
        let mut body = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
        body.push('\n');
        write_atomically(Path::new(output_path), &body)
    }
}

/// Writes through a sibling temp file and renames it into place, so a failed
/// write never leaves a partial report behind.
pub(crate) fn write_atomically(path: &Path, content: &str) -> Result<(), EvalError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    if let Err(e) = fs::write(&tmp, content).and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
