//! Market clock plus the open and most recently closed positions.

use crate::domain::error::BarreplayError;
use crate::domain::trade_action::{ExitReason, TradeEntry, TradeExit};
use crate::domain::trade_position::TradePosition;
use crate::domain::trade_record::{TradeRecord, TradeStatus, same_price};
use chrono::{Duration, NaiveDateTime};

/// At most one position is open at a time. A position that closes stays
/// visible as `closed_position` until the market moves to the next bar.
#[derive(Debug, Clone)]
pub struct TradeSession {
    market_timestamp: NaiveDateTime,
    market_price: f64,
    market_index: usize,
    open_position: Option<TradePosition>,
    closed_position: Option<TradePosition>,
}

impl Default for TradeSession {
    fn default() -> Self {
        TradeSession {
            market_timestamp: NaiveDateTime::default(),
            market_price: f64::NAN,
            market_index: 0,
            open_position: None,
            closed_position: None,
        }
    }
}

impl TradeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn market_timestamp(&self) -> NaiveDateTime {
        self.market_timestamp
    }

    pub fn market_price(&self) -> f64 {
        self.market_price
    }

    /// Snapshot offset of the current bar; 0 is the newest bar.
    pub fn market_index(&self) -> usize {
        self.market_index
    }

    pub fn open_position(&self) -> Option<&TradePosition> {
        self.open_position.as_ref()
    }

    pub fn closed_position(&self) -> Option<&TradePosition> {
        self.closed_position.as_ref()
    }

    /// Moves the clock to a new bar, dropping last bar's closed position.
    pub fn market_update(&mut self, timestamp: NaiveDateTime, price: f64, index: usize) {
        self.market_timestamp = timestamp;
        self.market_price = price;
        self.market_index = index;
        self.closed_position = None;
    }

    /// Opens a position, or scales into the open one.
    pub fn entry_position(&mut self, entry: &TradeEntry, fee: f64) -> Result<(), BarreplayError> {
        if entry.size == 0.0 || entry.size.is_nan() {
            return Err(BarreplayError::invalid(
                "size",
                format!("entry size must be non-zero, got {}", entry.size),
            ));
        }
        if let Some(position) = self.open_position.as_mut() {
            position.scale_in(
                entry.size,
                self.market_timestamp,
                entry.price,
                self.market_index,
            )?;
            position.add_fee(fee);
            return Ok(());
        }
        let mut position = TradePosition::open(entry, self.market_timestamp, self.market_index);
        position.add_fee(fee);
        self.open_position = Some(position);
        Ok(())
    }

    /// Reduces the open position; once it reaches zero it becomes the
    /// closed position.
    pub fn exit_position(&mut self, exit: &TradeExit, fee: f64) -> Result<(), BarreplayError> {
        let position = self
            .open_position
            .as_mut()
            .ok_or(BarreplayError::PositionClosed)?;
        let status = match exit.reason {
            ExitReason::Signal => TradeStatus::ClosedExitSignal,
            ExitReason::StopLoss => TradeStatus::ClosedStopLoss,
            ExitReason::TakeProfit => TradeStatus::ClosedTakeProfit,
        };
        position.scale_out(
            exit.size,
            self.market_timestamp,
            exit.price,
            self.market_index,
            status,
        )?;
        position.add_fee(fee);

        if position.is_closed() {
            self.closed_position = self.open_position.take();
        }
        Ok(())
    }

    /// Forced exit for this bar, if any. The stop is checked before the
    /// target. A gap through either level fills at the open.
    pub fn evaluate_exit_conditions(
        &mut self,
        prev_close: f64,
        open: f64,
        high: f64,
        low: f64,
    ) -> Option<TradeExit> {
        let position = self.open_position.as_mut()?;
        let size = position.unrealized_size();

        if position.trigger_stop_loss(prev_close, high, low) {
            let stop = position.stop_loss_price();
            let price = if position.is_long() {
                open.min(stop)
            } else {
                open.max(stop)
            };
            return Some(TradeExit::new(size, price, ExitReason::StopLoss));
        }

        if position.trigger_take_profit(high, low) {
            let target = position.take_profit_price();
            let price = if position.is_long() {
                open.max(target)
            } else {
                open.min(target)
            };
            return Some(TradeExit::new(size, price, ExitReason::TakeProfit));
        }
        None
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.open_position
            .as_ref()
            .map_or(0.0, |p| p.unrealized_pnl(self.market_price))
    }

    /// Realized P&L of scale-outs from the still-open position.
    pub fn partial_realized_pnl(&self) -> f64 {
        self.open_position
            .as_ref()
            .map_or(0.0, TradePosition::realized_pnl)
    }

    pub fn unrealized_investment(&self) -> f64 {
        self.open_position
            .as_ref()
            .map_or(0.0, TradePosition::unrealized_investment)
    }

    pub fn unrealized_duration(&self) -> Duration {
        self.open_position
            .as_ref()
            .map_or(Duration::zero(), |p| {
                p.unrealized_duration(self.market_timestamp)
            })
    }

    pub fn realized_pnl(&self) -> f64 {
        self.closed_position
            .as_ref()
            .map_or(0.0, TradePosition::realized_pnl)
    }

    pub fn realized_investment(&self) -> f64 {
        self.closed_position
            .as_ref()
            .map_or(0.0, TradePosition::realized_investment)
    }

    pub fn realized_duration(&self) -> Duration {
        self.closed_position
            .as_ref()
            .map_or(Duration::zero(), TradePosition::realized_duration)
    }

    /// Fees of the position that closed on this bar.
    pub fn realized_fees(&self) -> f64 {
        self.closed_position
            .as_ref()
            .map_or(0.0, TradePosition::fees)
    }

    pub fn is_flat(&self) -> bool {
        self.open_position.is_none() && self.closed_position.is_none()
    }

    pub fn is_open(&self) -> bool {
        self.open_position.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.open_position.is_none() && self.closed_position.is_some()
    }

    /// Closed and reopened on the same bar.
    pub fn is_reopen(&self) -> bool {
        self.open_position.is_some() && self.closed_position.is_some()
    }

    /// Whether this session marks a trade boundary for reporting: a
    /// position closed on this bar, or one is open on the bar at
    /// `newest_index`.
    pub fn is_summary_session(&self, newest_index: usize) -> bool {
        self.closed_position.is_some()
            || (self.is_open() && self.market_index == newest_index)
    }

    /// Mark-to-market record of the open position at the current bar.
    pub fn open_record(&self) -> Option<TradeRecord> {
        self.open_position.as_ref().map(|position| {
            position.record(
                TradeStatus::Open,
                position.size(),
                self.market_timestamp,
                self.market_price,
                self.market_index,
            )
        })
    }

    /// Records of the closed position, then of the open position, then the
    /// open position's mark-to-market record.
    pub fn trade_records(&self) -> Vec<TradeRecord> {
        let closed = self.closed_position.iter().flat_map(|p| p.records());
        let open = self.open_position.iter().flat_map(|p| p.records());
        closed.chain(open).cloned().chain(self.open_record()).collect()
    }
}

impl PartialEq for TradeSession {
    fn eq(&self, other: &Self) -> bool {
        self.market_timestamp == other.market_timestamp
            && self.market_index == other.market_index
            && same_price(self.market_price, other.market_price)
            && self.open_position == other.open_position
            && self.closed_position == other.closed_position
    }
}
