//! Bar-by-bar backtest driver.
//!
//! Bars are replayed oldest first. Signals are evaluated on the previous
//! bar and filled at the current bar's open; stops and targets are checked
//! against the current bar's range.

use std::sync::Arc;

use crate::domain::asset::{Asset, AssetSnapshot};
use crate::domain::backtest_summary::BacktestSummary;
use crate::domain::broker::Broker;
use crate::domain::error::BarreplayError;
use crate::domain::market::Market;
use crate::domain::profile::Profile;
use crate::domain::strategy::Strategy;
use crate::domain::trade_action::{ExitReason, TradeEntry, TradeExit};
use crate::domain::trade_record::TradeRecord;
use crate::domain::trade_session::TradeSession;

/// One strategy replayed over one asset. The bound values are shared and
/// immutable; only the summary ledger and the failed flag change.
#[derive(Debug, Clone)]
pub struct Backtest {
    name: String,
    asset: Arc<Asset>,
    strategy: Arc<Strategy>,
    market: Arc<Market>,
    broker: Arc<Broker>,
    profile: Arc<Profile>,
    summaries: Vec<BacktestSummary>,
    failed: bool,
}

impl Backtest {
    pub fn new(
        name: impl Into<String>,
        asset: Arc<Asset>,
        strategy: Arc<Strategy>,
        market: Arc<Market>,
        broker: Arc<Broker>,
        profile: Arc<Profile>,
    ) -> Self {
        Backtest {
            name: name.into(),
            asset,
            strategy,
            market,
            broker,
            profile,
            summaries: Vec::new(),
            failed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn asset(&self) -> &Arc<Asset> {
        &self.asset
    }

    pub fn strategy(&self) -> &Arc<Strategy> {
        &self.strategy
    }

    pub fn market(&self) -> &Arc<Market> {
        &self.market
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn profile(&self) -> &Arc<Profile> {
        &self.profile
    }

    /// One summary per replayed bar, oldest first.
    pub fn summaries(&self) -> &[BacktestSummary] {
        &self.summaries
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn mark_as_failed(&mut self) {
        self.failed = true;
    }

    pub fn should_run(&self) -> bool {
        !self.failed && self.summaries.len() < self.asset.size()
    }

    /// Drops the ledger and the failed flag.
    pub fn reset(&mut self) {
        self.summaries.clear();
        self.failed = false;
    }

    /// Replays the next bar and appends its summary. Does nothing once
    /// every bar is replayed or the backtest has failed. Any error marks
    /// the backtest failed.
    pub fn run(&mut self) -> Result<(), BarreplayError> {
        if !self.should_run() {
            return Ok(());
        }
        match self.next_summary() {
            Ok(summary) => {
                self.summaries.push(summary);
                Ok(())
            }
            Err(source) => {
                self.mark_as_failed();
                tracing::warn!(
                    backtest = %self.name,
                    bar = self.summaries.len(),
                    error = %source,
                    "backtest failed"
                );
                Err(BarreplayError::BacktestFailed {
                    name: self.name.clone(),
                    source: Box::new(source),
                })
            }
        }
    }

    /// Runs until every bar is replayed.
    pub fn run_all(&mut self) -> Result<(), BarreplayError> {
        while self.should_run() {
            self.run()?;
        }
        Ok(())
    }

    /// Records of every session that closed a position, plus the position
    /// still open on the newest bar.
    pub fn trade_journal(&self) -> Vec<TradeRecord> {
        self.summaries
            .iter()
            .map(BacktestSummary::trade_session)
            .filter(|session| session.is_summary_session(0))
            .flat_map(TradeSession::trade_records)
            .collect()
    }

    fn next_summary(&self) -> Result<BacktestSummary, BarreplayError> {
        let index = self.asset.size() - 1 - self.summaries.len();
        let snapshot = self.asset.snapshot(index);
        let previous = snapshot.shifted(1);
        let timestamp = snapshot.timestamp().ok_or_else(|| BarreplayError::NoData {
            name: self.asset.name().to_string(),
        })?;

        let mut summary = match self.summaries.last() {
            Some(last) => last.clone(),
            None => BacktestSummary::new(self.profile.initial_capital),
        };
        let mut session = summary.trade_session().clone();
        session.market_update(timestamp, snapshot.close(), index);

        if let Some(exit) = self.exit_trade(&mut session, snapshot, previous)? {
            let fee = self.broker.calculate_fee(&exit);
            session.exit_position(&exit, fee)?;
            tracing::info!(
                backtest = %self.name,
                %timestamp,
                size = exit.size,
                price = exit.price,
                reason = ?exit.reason,
                fee,
                "exit"
            );
        }

        if !session.is_open() {
            if let Some(entry) = self.entry_trade(snapshot, previous)? {
                let fee = self.broker.calculate_fee(&entry);
                session.entry_position(&entry, fee)?;
                tracing::info!(
                    backtest = %self.name,
                    %timestamp,
                    size = entry.size,
                    price = entry.price,
                    stop_loss = entry.stop_loss,
                    take_profit = entry.take_profit,
                    fee,
                    "entry"
                );
            }
        }

        summary.update_to_next_summary(session);
        Ok(summary)
    }

    /// A stop or target hit on this bar, else the exit signal of the
    /// previous bar filled at this bar's open.
    fn exit_trade(
        &self,
        session: &mut TradeSession,
        snapshot: AssetSnapshot<'_>,
        previous: AssetSnapshot<'_>,
    ) -> Result<Option<TradeExit>, BarreplayError> {
        let Some(size) = session.open_position().map(|position| position.size()) else {
            return Ok(None);
        };

        let forced = session.evaluate_exit_conditions(
            previous.close(),
            snapshot.open(),
            snapshot.high(),
            snapshot.low(),
        );
        if forced.is_some() {
            return Ok(forced);
        }

        let signal = if size > 0.0 {
            &self.strategy.long_exit
        } else {
            &self.strategy.short_exit
        };
        if signal.evaluate(previous, self.strategy.method_context())? {
            return Ok(Some(TradeExit::new(size, snapshot.open(), ExitReason::Signal)));
        }
        Ok(None)
    }

    /// Long entry takes precedence over short. The size puts the profile's
    /// risk value between the fill and the stop, one risk unit away.
    fn entry_trade(
        &self,
        snapshot: AssetSnapshot<'_>,
        previous: AssetSnapshot<'_>,
    ) -> Result<Option<TradeEntry>, BarreplayError> {
        let strategy = &self.strategy;
        let ctx = strategy.method_context();

        let direction = if strategy.long_entry.evaluate(previous, ctx)? {
            1.0
        } else if strategy.short_entry.evaluate(previous, ctx)? {
            -1.0
        } else {
            return Ok(None);
        };

        let risk = strategy.risk.value(previous, ctx)?;
        if !risk.is_finite() || risk <= 0.0 {
            tracing::debug!(backtest = %self.name, risk, "entry skipped: no risk");
            return Ok(None);
        }

        let risk_size = direction * risk;
        let price = snapshot.open();
        let size = self.market.snap_quantity(self.profile.risk_value() / risk_size);
        if size == 0.0 || size.is_nan() {
            tracing::debug!(backtest = %self.name, risk, "entry skipped: zero size");
            return Ok(None);
        }

        let stop_loss = if strategy.stop_loss.enabled {
            price - risk_size
        } else {
            f64::NAN
        };
        let take_profit = if strategy.take_profit.enabled {
            price + risk_size * strategy.take_profit.risk_multiplier
        } else {
            f64::NAN
        };
        Ok(Some(TradeEntry::new(size, price).with_stops(
            stop_loss,
            strategy.stop_loss.trailing,
            take_profit,
        )))
    }
}
