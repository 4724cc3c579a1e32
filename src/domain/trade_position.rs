//! An open (or just closed) position and its realized slices.

use crate::domain::error::BarreplayError;
use crate::domain::trade_action::TradeEntry;
use crate::domain::trade_record::{TradeRecord, TradeStatus, same_price};
use chrono::{Duration, NaiveDateTime};

/// Signed position state. The size never changes sign: a position is
/// closed exactly when its size reaches zero, and reversing direction means
/// closing and opening a new one.
#[derive(Debug, Clone)]
pub struct TradePosition {
    size: f64,
    average_price: f64,
    entry_price: f64,
    entry_timestamp: NaiveDateTime,
    entry_index: usize,
    stop_loss_initial_price: f64,
    stop_loss_trailing_price: f64,
    take_profit_price: f64,
    fees: f64,
    records: Vec<TradeRecord>,
}

impl TradePosition {
    /// Opens a position from `entry` at the given bar.
    pub fn open(entry: &TradeEntry, timestamp: NaiveDateTime, index: usize) -> Self {
        TradePosition {
            size: entry.size,
            average_price: entry.price,
            entry_price: entry.price,
            entry_timestamp: timestamp,
            entry_index: index,
            stop_loss_initial_price: entry.stop_loss,
            stop_loss_trailing_price: entry.trailing_price(),
            take_profit_price: entry.take_profit,
            fees: 0.0,
            records: Vec::new(),
        }
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn average_price(&self) -> f64 {
        self.average_price
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn entry_timestamp(&self) -> NaiveDateTime {
        self.entry_timestamp
    }

    pub fn entry_index(&self) -> usize {
        self.entry_index
    }

    pub fn stop_loss_initial_price(&self) -> f64 {
        self.stop_loss_initial_price
    }

    pub fn stop_loss_trailing_price(&self) -> f64 {
        self.stop_loss_trailing_price
    }

    pub fn take_profit_price(&self) -> f64 {
        self.take_profit_price
    }

    /// The stop in force: the trailing stop when one is set.
    pub fn stop_loss_price(&self) -> f64 {
        if self.stop_loss_trailing_price.is_nan() {
            self.stop_loss_initial_price
        } else {
            self.stop_loss_trailing_price
        }
    }

    /// Broker fees charged so far on entries and exits.
    pub fn fees(&self) -> f64 {
        self.fees
    }

    pub fn add_fee(&mut self, fee: f64) {
        self.fees += fee;
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn unrealized_size(&self) -> f64 {
        self.size
    }

    pub fn unrealized_investment(&self) -> f64 {
        self.size * self.average_price
    }

    pub fn unrealized_pnl(&self, market_price: f64) -> f64 {
        self.size * (market_price - self.average_price)
    }

    pub fn unrealized_duration(&self, market_timestamp: NaiveDateTime) -> Duration {
        market_timestamp - self.entry_timestamp
    }

    pub fn realized_size(&self) -> f64 {
        self.records.iter().map(|r| r.size).sum()
    }

    pub fn realized_investment(&self) -> f64 {
        self.records.iter().map(TradeRecord::investment).sum()
    }

    pub fn realized_pnl(&self) -> f64 {
        self.records.iter().map(TradeRecord::pnl).sum()
    }

    pub fn realized_duration(&self) -> Duration {
        self.records
            .iter()
            .fold(Duration::zero(), |total, r| total + r.duration())
    }

    pub fn is_closed(&self) -> bool {
        self.size == 0.0
    }

    pub fn is_long(&self) -> bool {
        self.size > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.size < 0.0
    }

    fn direction(&self) -> &'static str {
        if self.is_short() { "short" } else { "long" }
    }

    /// A record of the current state, closing out at the given bar.
    pub(crate) fn record(
        &self,
        status: TradeStatus,
        size: f64,
        exit_timestamp: NaiveDateTime,
        exit_price: f64,
        exit_index: usize,
    ) -> TradeRecord {
        TradeRecord {
            status,
            size,
            average_price: self.average_price,
            entry_timestamp: self.entry_timestamp,
            entry_price: self.entry_price,
            entry_index: self.entry_index,
            exit_timestamp,
            exit_price,
            exit_index,
            stop_loss_price: self.stop_loss_initial_price,
            trailing_stop_price: self.stop_loss_trailing_price,
            take_profit_price: self.take_profit_price,
        }
    }

    /// Adds `size` at `price`. The average becomes the size-weighted mean,
    /// and the stop and target distances shrink by old size / new size so
    /// the position's total risk is unchanged. Leaves a zero-size
    /// `ScaledIn` record of the state before scaling.
    pub fn scale_in(
        &mut self,
        size: f64,
        timestamp: NaiveDateTime,
        price: f64,
        index: usize,
    ) -> Result<(), BarreplayError> {
        if self.is_closed() {
            return Err(BarreplayError::PositionClosed);
        }
        if size.signum() != self.size.signum() {
            return Err(BarreplayError::invalid(
                "size",
                format!("cannot scale a {} position in the other direction", self.direction()),
            ));
        }

        let record = self.record(TradeStatus::ScaledIn, 0.0, timestamp, price, index);

        let last_size = self.size;
        let last_average = self.average_price;
        let new_size = last_size + size;
        let new_average = (last_size * last_average + size * price) / new_size;
        let ratio = last_size / new_size;
        let rescale = |level: f64| new_average - (last_average - level) * ratio;

        self.size = new_size;
        self.average_price = new_average;
        self.stop_loss_initial_price = rescale(self.stop_loss_initial_price);
        self.stop_loss_trailing_price = rescale(self.stop_loss_trailing_price);
        self.take_profit_price = rescale(self.take_profit_price);
        self.records.push(record);
        Ok(())
    }

    /// Removes `size` at `price`, recording the slice at the current
    /// average. Fails without changing anything when more than the held
    /// size would be removed.
    pub fn scale_out(
        &mut self,
        size: f64,
        timestamp: NaiveDateTime,
        price: f64,
        index: usize,
        status: TradeStatus,
    ) -> Result<(), BarreplayError> {
        if self.is_closed() {
            return Err(BarreplayError::PositionClosed);
        }
        let remaining = self.size - size;
        let exceeds = if self.is_long() {
            remaining < 0.0
        } else {
            remaining > 0.0
        };
        if exceeds {
            return Err(BarreplayError::ReduceExceedsHeld {
                direction: self.direction(),
            });
        }
        if size != 0.0 && size.signum() != self.size.signum() {
            return Err(BarreplayError::invalid(
                "size",
                format!("cannot reduce a {} position by the other direction", self.direction()),
            ));
        }

        let status = if remaining == 0.0 {
            status
        } else {
            TradeStatus::ScaledOut
        };
        let record = self.record(status, size, timestamp, price, index);
        self.records.push(record);
        self.size = remaining;
        Ok(())
    }

    /// Ratchets the trailing stop from the previous close, then reports
    /// whether the bar touched the stop.
    pub fn trigger_stop_loss(&mut self, prev_close: f64, high: f64, low: f64) -> bool {
        let initial = self.stop_loss_initial_price;
        if self.is_closed() || initial.is_nan() {
            return false;
        }

        let risk = self.average_price - initial;
        let new_stop = prev_close - risk;

        if self.is_short() {
            if new_stop < self.stop_loss_trailing_price {
                self.stop_loss_trailing_price = new_stop;
            }
            return high >= self.stop_loss_price();
        }

        if new_stop > self.stop_loss_trailing_price {
            self.stop_loss_trailing_price = new_stop;
        }
        low <= self.stop_loss_price()
    }

    pub fn trigger_take_profit(&self, high: f64, low: f64) -> bool {
        let target = self.take_profit_price;
        if self.is_closed() || target.is_nan() {
            return false;
        }
        if self.is_long() {
            high >= target
        } else {
            low <= target
        }
    }
}

impl PartialEq for TradePosition {
    fn eq(&self, other: &Self) -> bool {
        self.entry_timestamp == other.entry_timestamp
            && self.entry_index == other.entry_index
            && self.records == other.records
            && same_price(self.size, other.size)
            && same_price(self.average_price, other.average_price)
            && same_price(self.entry_price, other.entry_price)
            && same_price(self.stop_loss_initial_price, other.stop_loss_initial_price)
            && same_price(self.stop_loss_trailing_price, other.stop_loss_trailing_price)
            && same_price(self.take_profit_price, other.take_profit_price)
            && same_price(self.fees, other.fees)
    }
}
