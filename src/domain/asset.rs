//! Asset history and the reverse-chronological snapshot view.
//!
//! History columns are stored oldest first. A snapshot at offset `k` exposes
//! the same data with index 0 bound to the bar `k` steps before the newest
//! one, and increasing index walking further back in time.

use crate::domain::error::BarreplayError;
use crate::domain::series::{DataSeries, Series};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

pub const OPEN: &str = "open";
pub const HIGH: &str = "high";
pub const LOW: &str = "low";
pub const CLOSE: &str = "close";
pub const VOLUME: &str = "volume";

/// Column-oriented bar history, ascending by timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetHistory {
    timestamps: Vec<NaiveDateTime>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl AssetHistory {
    /// Build a history from timestamps and named columns. Column names are
    /// matched case-insensitively, so they are stored lowercased.
    pub fn new<I>(timestamps: Vec<NaiveDateTime>, columns: I) -> Result<Self, BarreplayError>
    where
        I: IntoIterator<Item = (String, Vec<f64>)>,
    {
        let mut map = BTreeMap::new();
        for (name, values) in columns {
            if values.len() != timestamps.len() {
                return Err(BarreplayError::Data {
                    reason: format!(
                        "column '{}' has {} values, expected {}",
                        name,
                        values.len(),
                        timestamps.len()
                    ),
                });
            }
            map.insert(name.to_lowercase(), values);
        }
        if timestamps.windows(2).any(|w| w[0] > w[1]) {
            return Err(BarreplayError::Data {
                reason: "timestamps are not in ascending order".into(),
            });
        }
        Ok(Self {
            timestamps,
            columns: map,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Full column in ascending time order.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .get(&name.to_lowercase())
            .map(|values| values.as_slice())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|name| name.as_str())
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }
}

/// A named instrument and its bar history.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    name: String,
    history: AssetHistory,
}

impl Asset {
    pub fn new(name: impl Into<String>, history: AssetHistory) -> Self {
        Self {
            name: name.into(),
            history,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn history(&self) -> &AssetHistory {
        &self.history
    }

    pub fn size(&self) -> usize {
        self.history.len()
    }

    /// Snapshot whose index 0 is the bar `offset` steps back from the newest.
    pub fn snapshot(&self, offset: usize) -> AssetSnapshot<'_> {
        AssetSnapshot {
            history: &self.history,
            offset,
        }
    }
}

/// Read-only view of one bar plus everything older than it.
#[derive(Debug, Clone, Copy)]
pub struct AssetSnapshot<'a> {
    history: &'a AssetHistory,
    offset: usize,
}

impl<'a> AssetSnapshot<'a> {
    pub fn new(history: &'a AssetHistory, offset: usize) -> Self {
        Self { history, offset }
    }

    /// Distance of this snapshot's bar from the newest bar.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of bars visible from this snapshot (this bar and older).
    pub fn size(&self) -> usize {
        self.history.len().saturating_sub(self.offset)
    }

    /// The snapshot `lookback` bars further back in time.
    pub fn shifted(&self, lookback: usize) -> Self {
        Self {
            history: self.history,
            offset: self.offset + lookback,
        }
    }

    fn position(&self) -> Option<usize> {
        let len = self.history.len();
        (self.offset < len).then(|| len - 1 - self.offset)
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.position().map(|pos| self.history.timestamps[pos])
    }

    /// Value of `field` at this bar, NaN when the field or the bar is missing.
    pub fn data(&self, field: &str) -> f64 {
        self.series(field).value_at(0)
    }

    pub fn open(&self) -> f64 {
        self.data(OPEN)
    }

    pub fn high(&self) -> f64 {
        self.data(HIGH)
    }

    pub fn low(&self) -> f64 {
        self.data(LOW)
    }

    pub fn close(&self) -> f64 {
        self.data(CLOSE)
    }

    pub fn volume(&self) -> f64 {
        self.data(VOLUME)
    }

    /// Reverse-chronological series over `field` starting at this bar.
    pub fn series(&self, field: &str) -> DataSeries<'a> {
        let values = self.history.column(field).unwrap_or(&[]);
        DataSeries::new(values, self.offset)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn sample_history() -> AssetHistory {
        AssetHistory::new(
            vec![ts(1), ts(2), ts(3)],
            vec![
                ("Open".to_string(), vec![1.0, 2.0, 3.0]),
                ("Close".to_string(), vec![10.0, 20.0, 30.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn index_zero_is_newest_bar() {
        let asset = Asset::new("TEST", sample_history());
        let snapshot = asset.snapshot(0);
        assert_eq!(snapshot.close(), 30.0);
        assert_eq!(snapshot.open(), 3.0);
        assert_eq!(snapshot.timestamp(), Some(ts(3)));
        assert_eq!(snapshot.size(), 3);
    }

    #[test]
    fn shifted_walks_back_in_time() {
        let asset = Asset::new("TEST", sample_history());
        let prev = asset.snapshot(0).shifted(1);
        assert_eq!(prev.close(), 20.0);
        assert_eq!(prev.size(), 2);
        assert_eq!(prev.shifted(1).close(), 10.0);
    }

    #[test]
    fn out_of_range_is_nan() {
        let asset = Asset::new("TEST", sample_history());
        let snapshot = asset.snapshot(3);
        assert!(snapshot.close().is_nan());
        assert_eq!(snapshot.timestamp(), None);
        assert_eq!(snapshot.size(), 0);
    }

    #[test]
    fn missing_field_is_nan() {
        let asset = Asset::new("TEST", sample_history());
        assert!(asset.snapshot(0).volume().is_nan());
        assert!(asset.snapshot(0).data("rsi").is_nan());
    }

    #[test]
    fn field_lookup_is_case_insensitive() {
        let history = sample_history();
        assert!(history.column("CLOSE").is_some());
        assert_eq!(history.field_names().collect::<Vec<_>>(), vec!["close", "open"]);
    }

    #[test]
    fn rejects_mismatched_column_length() {
        let result = AssetHistory::new(vec![ts(1), ts(2)], vec![("close".to_string(), vec![1.0])]);
        assert!(matches!(result, Err(BarreplayError::Data { .. })));
    }

    #[test]
    fn rejects_descending_timestamps() {
        let result = AssetHistory::new(
            vec![ts(2), ts(1)],
            vec![("close".to_string(), vec![1.0, 2.0])],
        );
        assert!(result.is_err());
    }
}
