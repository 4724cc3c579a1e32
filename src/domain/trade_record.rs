//! One realized or marked slice of a position.

use chrono::{Duration, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    Open,
    ScaledIn,
    ScaledOut,
    ClosedExitSignal,
    ClosedTakeProfit,
    ClosedStopLoss,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "open",
            TradeStatus::ScaledIn => "scaled_in",
            TradeStatus::ScaledOut => "scaled_out",
            TradeStatus::ClosedExitSignal => "closed_exit_signal",
            TradeStatus::ClosedTakeProfit => "closed_take_profit",
            TradeStatus::ClosedStopLoss => "closed_stop_loss",
        }
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed size (sign is direction) with the prices in force when the
/// record was written. Indices are snapshot offsets, 0 being the newest bar.
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub status: TradeStatus,
    pub size: f64,
    pub average_price: f64,
    pub entry_timestamp: NaiveDateTime,
    pub entry_price: f64,
    pub entry_index: usize,
    pub exit_timestamp: NaiveDateTime,
    pub exit_price: f64,
    pub exit_index: usize,
    pub stop_loss_price: f64,
    pub trailing_stop_price: f64,
    pub take_profit_price: f64,
}

impl TradeRecord {
    pub fn entry_value(&self) -> f64 {
        self.size * self.entry_price
    }

    pub fn exit_value(&self) -> f64 {
        self.size * self.exit_price
    }

    pub fn investment(&self) -> f64 {
        self.size * self.average_price
    }

    pub fn pnl(&self) -> f64 {
        self.exit_value() - self.investment()
    }

    pub fn duration(&self) -> Duration {
        self.exit_timestamp - self.entry_timestamp
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self.status,
            TradeStatus::ClosedExitSignal
                | TradeStatus::ClosedTakeProfit
                | TradeStatus::ClosedStopLoss
        )
    }

    pub fn is_scaled(&self) -> bool {
        matches!(self.status, TradeStatus::ScaledIn | TradeStatus::ScaledOut)
    }

    pub fn is_long(&self) -> bool {
        self.size > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.size < 0.0
    }
}

/// Price equality where two NaNs (a disabled stop or target) are equal.
pub(crate) fn same_price(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

impl PartialEq for TradeRecord {
    fn eq(&self, other: &Self) -> bool {
        self.status == other.status
            && self.entry_timestamp == other.entry_timestamp
            && self.entry_index == other.entry_index
            && self.exit_timestamp == other.exit_timestamp
            && self.exit_index == other.exit_index
            && same_price(self.size, other.size)
            && same_price(self.average_price, other.average_price)
            && same_price(self.entry_price, other.entry_price)
            && same_price(self.exit_price, other.exit_price)
            && same_price(self.stop_loss_price, other.stop_loss_price)
            && same_price(self.trailing_stop_price, other.trailing_stop_price)
            && same_price(self.take_profit_price, other.take_profit_price)
    }
}
