//! Trade journal output port trait.

use crate::domain::error::BarreplayError;
use crate::domain::trade_record::TradeRecord;

/// Port for writing the trade journal of a backtest.
pub trait ReportPort {
    fn write_journal(&self, records: &[TradeRecord]) -> Result<(), BarreplayError>;
}
