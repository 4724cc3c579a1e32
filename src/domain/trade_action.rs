//! Orders handed to a trade session: entries and exits.

/// What a broker needs to know about an order to price its fees.
pub trait TradeAction {
    /// Signed size; positive is long.
    fn size(&self) -> f64;
    fn price(&self) -> f64;
    fn is_entry(&self) -> bool;
    fn is_buy(&self) -> bool;

    fn is_sell(&self) -> bool {
        !self.is_buy()
    }

    fn is_long(&self) -> bool {
        self.size() > 0.0
    }

    fn is_short(&self) -> bool {
        self.size() < 0.0
    }

    fn notional_value(&self) -> f64 {
        (self.size() * self.price()).abs()
    }
}

/// Opens a position or adds to one. Disabled stops are NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeEntry {
    pub size: f64,
    pub price: f64,
    pub stop_loss: f64,
    pub trailing: bool,
    pub take_profit: f64,
}

impl TradeEntry {
    pub fn new(size: f64, price: f64) -> Self {
        TradeEntry {
            size,
            price,
            stop_loss: f64::NAN,
            trailing: false,
            take_profit: f64::NAN,
        }
    }

    pub fn with_stops(self, stop_loss: f64, trailing: bool, take_profit: f64) -> Self {
        TradeEntry {
            stop_loss,
            trailing,
            take_profit,
            ..self
        }
    }

    /// Starting trailing stop: the stop itself when trailing, else NaN.
    pub fn trailing_price(&self) -> f64 {
        if self.trailing {
            self.stop_loss
        } else {
            f64::NAN
        }
    }
}

impl TradeAction for TradeEntry {
    fn size(&self) -> f64 {
        self.size
    }

    fn price(&self) -> f64 {
        self.price
    }

    fn is_entry(&self) -> bool {
        true
    }

    fn is_buy(&self) -> bool {
        self.is_long()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Signal,
    StopLoss,
    TakeProfit,
}

/// Reduces or closes a position. `size` carries the position's sign, so a
/// long exit is a sell and a short exit is a buy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeExit {
    pub size: f64,
    pub price: f64,
    pub reason: ExitReason,
}

impl TradeExit {
    pub fn new(size: f64, price: f64, reason: ExitReason) -> Self {
        TradeExit {
            size,
            price,
            reason,
        }
    }
}

impl TradeAction for TradeExit {
    fn size(&self) -> f64 {
        self.size
    }

    fn price(&self) -> f64 {
        self.price
    }

    fn is_entry(&self) -> bool {
        false
    }

    fn is_buy(&self) -> bool {
        self.is_short()
    }
}
