#![allow(dead_code)]

use barreplay::domain::asset::{Asset, AssetHistory};
use barreplay::domain::backtest::Backtest;
use barreplay::domain::broker::Broker;
use barreplay::domain::error::BarreplayError;
use barreplay::domain::market::Market;
use barreplay::domain::profile::Profile;
use barreplay::domain::strategy::Strategy;
use barreplay::domain::trade_record::TradeRecord;
use barreplay::ports::data_port::DataPort;
use barreplay::ports::report_port::ReportPort;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

pub struct MockDataPort {
    pub data: HashMap<String, AssetHistory>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, name: &str, bars: &[[f64; 4]]) -> Self {
        self.data.insert(name.to_string(), history(bars));
        self
    }

    pub fn with_error(mut self, name: &str, reason: &str) -> Self {
        self.errors.insert(name.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn load_history(&self, name: &str) -> Result<AssetHistory, BarreplayError> {
        if let Some(reason) = self.errors.get(name) {
            return Err(BarreplayError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(name).cloned().unwrap_or_default())
    }
}

/// Collects written journals in memory.
#[derive(Default)]
pub struct MockReportPort {
    pub journals: RefCell<Vec<Vec<TradeRecord>>>,
}

impl ReportPort for MockReportPort {
    fn write_journal(&self, records: &[TradeRecord]) -> Result<(), BarreplayError> {
        self.journals.borrow_mut().push(records.to_vec());
        Ok(())
    }
}

pub fn day(d: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::days(d)
}

/// Daily history from `[open, high, low, close]` rows, oldest first.
pub fn history(bars: &[[f64; 4]]) -> AssetHistory {
    let timestamps = (0..bars.len() as i64).map(day).collect();
    let column = |k: usize| bars.iter().map(|bar| bar[k]).collect::<Vec<f64>>();
    AssetHistory::new(
        timestamps,
        vec![
            ("open".to_string(), column(0)),
            ("high".to_string(), column(1)),
            ("low".to_string(), column(2)),
            ("close".to_string(), column(3)),
            ("volume".to_string(), vec![1000.0; bars.len()]),
        ],
    )
    .unwrap()
}

/// Bars that open, trade and close at `price`.
pub fn flat_bar(price: f64) -> [f64; 4] {
    [price, price, price, price]
}

/// `count` bars rising by one from `start`, each spanning one below to one
/// above its open.
pub fn rising_bars(start: f64, count: usize) -> Vec<[f64; 4]> {
    (0..count)
        .map(|i| {
            let price = start + i as f64;
            [price, price + 1.0, price - 1.0, price]
        })
        .collect()
}

pub fn backtest(bars: &[[f64; 4]], strategy: Strategy, profile: Profile) -> Backtest {
    Backtest::new(
        "test",
        Arc::new(Asset::new("TEST", history(bars))),
        Arc::new(strategy),
        Arc::new(Market::default()),
        Arc::new(Broker::default()),
        Arc::new(profile),
    )
}

pub const SMA_CROSS_STRATEGY: &str = r#"{
    "series": {
        "fast": { "method": "SMA", "period": 2 },
        "slow": { "method": "SMA", "period": 4 }
    },
    "risk": { "method": "VALUE", "value": 5 },
    "longPosition": {
        "entry": { "signal": { "filter": "CROSSOVER", "signal": "fast", "reference": "slow" } },
        "exit": { "signal": { "filter": "CROSSUNDER", "signal": "fast", "reference": "slow" } }
    },
    "stopLoss": { "enabled": true, "isTrailing": true },
    "takeProfit": { "enabled": false }
}"#;
