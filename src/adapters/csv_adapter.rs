//! CSV directory data adapter.
//!
//! Bars live in `{INSTRUMENT}_{timeframe}.csv` with a
//! `datetime,open,high,low,close[,volume]` header. Daily ATR figures come from
//! an optional `atr.csv` with `instrument,atr` rows.

use chrono::FixedOffset;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::domain::bar::Bar;
use crate::domain::error::EvalError;
use crate::domain::schema::parse_timestamp;
use crate::ports::data_port::DataPort;

const ATR_FILE: &str = "atr.csv";

pub struct CsvAdapter {
    base_path: PathBuf,
    /// Offset applied to timestamps that carry none.
    offset: FixedOffset,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf, offset: FixedOffset) -> Self {
        Self { base_path, offset }
    }

    fn csv_path(&self, instrument: &str, timeframe: &str) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", instrument.to_uppercase(), timeframe))
    }

    fn read_atr_table(&self) -> Result<BTreeMap<String, f64>, EvalError> {
        let path = self.base_path.join(ATR_FILE);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&path)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut table = BTreeMap::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| parse_error(&path, row, e))?;
            let instrument = field(&record, 0, "instrument", &path, row)?;
            let atr: f64 = field(&record, 1, "atr", &path, row)?
                .parse()
                .map_err(|e| parse_error(&path, row, e))?;
            table.insert(instrument.to_uppercase(), atr);
        }
        Ok(table)
    }
}

fn parse_error(path: &std::path::Path, row: usize, e: impl std::fmt::Display) -> EvalError {
    EvalError::DataParse {
        reason: format!("{} row {}: {}", path.display(), row + 1, e),
    }
}

fn field<'r>(
    record: &'r csv::StringRecord,
    index: usize,
    name: &str,
    path: &std::path::Path,
    row: usize,
) -> Result<&'r str, EvalError> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| parse_error(path, row, format!("missing {name} column")))
}

fn price(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    path: &std::path::Path,
    row: usize,
) -> Result<f64, EvalError> {
    field(record, index, name, path, row)?
        .parse()
        .map_err(|e| parse_error(path, row, format!("invalid {name} value: {e}")))
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, instrument: &str, timeframe: &str) -> Result<Vec<Bar>, EvalError> {
        let path = self.csv_path(instrument, timeframe);
        if !path.exists() {
            return Err(EvalError::MissingTimeframe {
                instrument: instrument.to_string(),
                timeframe: timeframe.to_string(),
            });
        }
        let content = fs::read_to_string(&path)?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| parse_error(&path, row, e))?;

            let raw_time = field(&record, 0, "datetime", &path, row)?;
            let timestamp = parse_timestamp(raw_time, self.offset).ok_or_else(|| {
                parse_error(&path, row, format!("invalid datetime {raw_time:?}"))
            })?;

            bars.push(Bar {
                timestamp,
                open: price(&record, 1, "open", &path, row)?,
                high: price(&record, 2, "high", &path, row)?,
                low: price(&record, 3, "low", &path, row)?,
                close: price(&record, 4, "close", &path, row)?,
            });
        }

        Ok(bars)
    }

    fn daily_atr(&self, instrument: &str) -> Result<Option<f64>, EvalError> {
        Ok(self.read_atr_table()?.get(&instrument.to_uppercase()).copied())
    }

    fn list_instruments(&self) -> Result<Vec<String>, EvalError> {
        let entries = fs::read_dir(&self.base_path)?;

        let mut instruments = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if name.eq_ignore_ascii_case(ATR_FILE) {
                continue;
            }
            if let Some((instrument, _)) = name
                .strip_suffix(".csv")
                .and_then(|stem| stem.rsplit_once('_'))
            {
                instruments.push(instrument.to_uppercase());
            }
        }

        instruments.sort();
        instruments.dedup();
        Ok(instruments)
    }
}
