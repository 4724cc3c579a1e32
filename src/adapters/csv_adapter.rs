//! CSV bar data and trade journal adapters.

use crate::domain::asset::{AssetHistory, CLOSE, HIGH, LOW, OPEN};
use crate::domain::error::BarreplayError;
use crate::domain::trade_record::TradeRecord;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Reads `<base_path>/<name>.csv` files with a `date` or `datetime` column
/// followed by numeric columns. Every numeric column becomes a history
/// field; open, high, low and close are required.
pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", name))
    }
}

fn data_error(reason: impl Into<String>) -> BarreplayError {
    BarreplayError::Data {
        reason: reason.into(),
    }
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime, BarreplayError> {
    let value = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .map(|date| date.and_time(NaiveTime::default()))
        })
        .ok_or_else(|| data_error(format!("invalid date '{}'", value)))
}

fn parse_value(value: &str, column: &str) -> Result<f64, BarreplayError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(f64::NAN);
    }
    value
        .parse()
        .map_err(|e| data_error(format!("invalid {} value '{}': {}", column, value, e)))
}

impl DataPort for CsvAdapter {
    fn load_history(&self, name: &str) -> Result<AssetHistory, BarreplayError> {
        let path = self.csv_path(name);
        let content = fs::read_to_string(&path)
            .map_err(|e| data_error(format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| data_error(format!("CSV parse error: {}", e)))?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        let date_column = headers
            .iter()
            .position(|h| h == "date" || h == "datetime")
            .ok_or_else(|| data_error("missing date column"))?;
        for required in [OPEN, HIGH, LOW, CLOSE] {
            if !headers.iter().any(|h| h == required) {
                return Err(data_error(format!("missing {} column", required)));
            }
        }

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| data_error(format!("CSV parse error: {}", e)))?;
            let timestamp = parse_timestamp(record.get(date_column).unwrap_or_default())?;
            let values = headers
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != date_column)
                .map(|(i, header)| parse_value(record.get(i).unwrap_or_default(), header))
                .collect::<Result<Vec<f64>, _>>()?;
            rows.push((timestamp, values));
        }
        rows.sort_by_key(|(timestamp, _)| *timestamp);

        let columns = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != date_column)
            .enumerate()
            .map(|(k, (_, header))| {
                let values = rows.iter().map(|(_, values)| values[k]).collect();
                (header.clone(), values)
            })
            .collect::<Vec<_>>();
        let timestamps = rows.into_iter().map(|(timestamp, _)| timestamp).collect();
        AssetHistory::new(timestamps, columns)
    }
}

/// One trade journal row.
#[derive(Debug, Serialize)]
struct JournalRow<'a> {
    status: &'a str,
    size: f64,
    average_price: f64,
    entry_timestamp: String,
    entry_price: f64,
    exit_timestamp: String,
    exit_price: f64,
    stop_loss_price: f64,
    trailing_stop_price: f64,
    take_profit_price: f64,
    investment: f64,
    pnl: f64,
    duration_secs: i64,
}

impl<'a> From<&'a TradeRecord> for JournalRow<'a> {
    fn from(record: &'a TradeRecord) -> Self {
        JournalRow {
            status: record.status.as_str(),
            size: record.size,
            average_price: record.average_price,
            entry_timestamp: record.entry_timestamp.format(DATETIME_FORMATS[0]).to_string(),
            entry_price: record.entry_price,
            exit_timestamp: record.exit_timestamp.format(DATETIME_FORMATS[0]).to_string(),
            exit_price: record.exit_price,
            stop_loss_price: record.stop_loss_price,
            trailing_stop_price: record.trailing_stop_price,
            take_profit_price: record.take_profit_price,
            investment: record.investment(),
            pnl: record.pnl(),
            duration_secs: record.duration().num_seconds(),
        }
    }
}

/// Writes the trade journal as CSV, one row per record.
pub struct CsvReportAdapter {
    path: PathBuf,
}

impl CsvReportAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ReportPort for CsvReportAdapter {
    fn write_journal(&self, records: &[TradeRecord]) -> Result<(), BarreplayError> {
        let write_error =
            |e: csv::Error| data_error(format!("failed to write {}: {}", self.path.display(), e));
        let mut wtr = csv::Writer::from_path(&self.path).map_err(write_error)?;
        for record in records {
            wtr.serialize(JournalRow::from(record)).map_err(write_error)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade_record::TradeStatus;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "date,open,high,low,close,volume,signal\n\
            2024-01-17,110.0,120.0,105.0,115.0,55000,3\n\
            2024-01-15,100.0,110.0,90.0,105.0,50000,1\n\
            2024-01-16,105.0,115.0,100.0,110.0,60000,\n";
        fs::write(path.join("BHP.csv"), csv_content).unwrap();

        fs::write(
            path.join("INTRADAY.csv"),
            "Datetime,Open,High,Low,Close\n\
             2024-01-15 09:30:00,1,2,0.5,1.5\n\
             2024-01-15 09:31:00,1.5,2,1,1.8\n",
        )
        .unwrap();
        fs::write(path.join("NOCLOSE.csv"), "date,open,high,low\n2024-01-15,1,2,0.5\n").unwrap();
        fs::write(path.join("BADDATE.csv"), "date,open,high,low,close\n15/01/2024,1,2,0.5,1\n")
            .unwrap();

        (dir, path)
    }

    #[test]
    fn load_history_sorts_ascending() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let history = adapter.load_history("BHP").unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(
            history.timestamps()[0],
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
        assert_eq!(history.column("open").unwrap(), &[100.0, 105.0, 110.0]);
        assert_eq!(history.column("close").unwrap(), &[105.0, 110.0, 115.0]);
        assert_eq!(history.column("volume").unwrap(), &[50000.0, 60000.0, 55000.0]);
    }

    #[test]
    fn extra_columns_are_fields() {
        let (_dir, path) = setup_test_data();
        let history = CsvAdapter::new(path).load_history("BHP").unwrap();
        let signal = history.column("signal").unwrap();
        assert_eq!(signal[0], 1.0);
        assert!(signal[1].is_nan());
        assert_eq!(signal[2], 3.0);
    }

    #[test]
    fn accepts_datetime_column() {
        let (_dir, path) = setup_test_data();
        let history = CsvAdapter::new(path).load_history("INTRADAY").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.timestamps()[1].format("%H:%M").to_string(), "09:31");
        assert!(history.column("volume").is_none());
    }

    #[test]
    fn missing_close_column_fails() {
        let (_dir, path) = setup_test_data();
        let err = CsvAdapter::new(path).load_history("NOCLOSE").unwrap_err();
        assert!(matches!(err, BarreplayError::Data { reason } if reason.contains("close")));
    }

    #[test]
    fn invalid_date_fails() {
        let (_dir, path) = setup_test_data();
        assert!(CsvAdapter::new(path).load_history("BADDATE").is_err());
    }

    #[test]
    fn missing_file_fails() {
        let (_dir, path) = setup_test_data();
        assert!(CsvAdapter::new(path).load_history("XYZ").is_err());
    }

    #[test]
    fn empty_file_is_no_data() {
        let (_dir, path) = setup_test_data();
        fs::write(path.join("EMPTY.csv"), "date,open,high,low,close\n").unwrap();
        let err = CsvAdapter::new(path).load_asset("EMPTY").unwrap_err();
        assert!(matches!(err, BarreplayError::NoData { name } if name == "EMPTY"));
    }

    #[test]
    fn writes_journal_rows() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("journal.csv");
        let day = |d: u32| {
            NaiveDate::from_ymd_opt(2024, 1, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        let record = TradeRecord {
            status: TradeStatus::ClosedTakeProfit,
            size: 2.0,
            average_price: 100.0,
            entry_timestamp: day(1),
            entry_price: 100.0,
            entry_index: 3,
            exit_timestamp: day(2),
            exit_price: 110.0,
            exit_index: 2,
            stop_loss_price: 95.0,
            trailing_stop_price: f64::NAN,
            take_profit_price: 110.0,
        };

        CsvReportAdapter::new(output.clone())
            .write_journal(&[record])
            .unwrap();

        let content = fs::read_to_string(output).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("status,size,average_price"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("closed_take_profit,2.0,100.0,2024-01-01 00:00:00"));
        assert!(row.ends_with("200.0,20.0,86400"));
        assert!(lines.next().is_none());
    }
}
