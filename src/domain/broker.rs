//! Broker fee schedules.

use crate::domain::trade_action::TradeAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeType {
    /// Percent of the order's notional value.
    Percentage,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePosition {
    Long,
    Short,
    LongAndShort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeTrigger {
    Entry,
    Exit,
    Buy,
    Sell,
    All,
}

impl FeeType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "percentage" => Some(FeeType::Percentage),
            "fixed" => Some(FeeType::Fixed),
            _ => None,
        }
    }
}

impl FeePosition {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "long" => Some(FeePosition::Long),
            "short" => Some(FeePosition::Short),
            "long_and_short" => Some(FeePosition::LongAndShort),
            _ => None,
        }
    }
}

impl FeeTrigger {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "entry" => Some(FeeTrigger::Entry),
            "exit" => Some(FeeTrigger::Exit),
            "buy" => Some(FeeTrigger::Buy),
            "sell" => Some(FeeTrigger::Sell),
            "all" => Some(FeeTrigger::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerFee {
    pub name: String,
    pub fee_type: FeeType,
    pub position: FeePosition,
    pub trigger: FeeTrigger,
    pub value: f64,
}

impl BrokerFee {
    pub fn calculate_fee<A: TradeAction>(&self, action: &A) -> f64 {
        let position_applies = match self.position {
            FeePosition::Long => action.is_long(),
            FeePosition::Short => action.is_short(),
            FeePosition::LongAndShort => true,
        };
        let trigger_applies = match self.trigger {
            FeeTrigger::Entry => action.is_entry(),
            FeeTrigger::Exit => !action.is_entry(),
            FeeTrigger::Buy => action.is_buy(),
            FeeTrigger::Sell => action.is_sell(),
            FeeTrigger::All => true,
        };
        if !(position_applies && trigger_applies) {
            return 0.0;
        }
        match self.fee_type {
            FeeType::Percentage => action.notional_value() * self.value / 100.0,
            FeeType::Fixed => self.value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Broker {
    pub name: String,
    pub fees: Vec<BrokerFee>,
}

impl Broker {
    pub fn new(name: impl Into<String>, fees: Vec<BrokerFee>) -> Self {
        Broker {
            name: name.into(),
            fees,
        }
    }

    /// Sum of every fee that applies to `action`.
    pub fn calculate_fee<A: TradeAction>(&self, action: &A) -> f64 {
        self.fees.iter().map(|fee| fee.calculate_fee(action)).sum()
    }
}
