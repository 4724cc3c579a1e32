//! Per-bar aggregation ledger of a backtest.

use crate::domain::trade_session::TradeSession;
use chrono::Duration;

/// Running totals after one simulated bar. Each summary is the previous
/// one folded with that bar's trade session; every statistic beyond the
/// stored totals is derived on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSummary {
    trade_session: TradeSession,
    capital: f64,
    peak_equity: f64,
    max_drawdown: f64,
    cumulative_durations: Duration,
    cumulative_investments: f64,
    cumulative_fees: f64,
    profit_count: usize,
    cumulative_profits: f64,
    loss_count: usize,
    cumulative_losses: f64,
    break_even_count: usize,
}

impl BacktestSummary {
    pub fn new(initial_capital: f64) -> Self {
        BacktestSummary {
            trade_session: TradeSession::new(),
            capital: initial_capital,
            peak_equity: initial_capital,
            max_drawdown: 0.0,
            cumulative_durations: Duration::zero(),
            cumulative_investments: 0.0,
            cumulative_fees: 0.0,
            profit_count: 0,
            cumulative_profits: 0.0,
            loss_count: 0,
            cumulative_losses: 0.0,
            break_even_count: 0,
        }
    }

    /// Folds in the session of the next bar. A position closed on that bar
    /// is counted by its P&L, and its fees are charged to capital.
    pub fn update_to_next_summary(&mut self, session: TradeSession) {
        if session.closed_position().is_some() {
            let pnl = session.realized_pnl();
            let fees = session.realized_fees();

            self.cumulative_durations = self.cumulative_durations + session.realized_duration();
            self.cumulative_investments += session.realized_investment();
            self.cumulative_fees += fees;

            if pnl > 0.0 {
                self.profit_count += 1;
                self.cumulative_profits += pnl;
            } else if pnl < 0.0 {
                self.loss_count += 1;
                self.cumulative_losses += pnl;
            } else {
                self.break_even_count += 1;
            }
            self.capital += pnl - fees;
        }

        self.trade_session = session;
        self.peak_equity = self.peak_equity.max(self.equity());
        self.max_drawdown = self.max_drawdown.max(self.drawdown());
    }

    /// Rebuilds the ledger from the recorded sessions alone.
    pub fn replay<I>(initial_capital: f64, sessions: I) -> Vec<BacktestSummary>
    where
        I: IntoIterator<Item = TradeSession>,
    {
        let mut summary = BacktestSummary::new(initial_capital);
        sessions
            .into_iter()
            .map(|session| {
                summary.update_to_next_summary(session);
                summary.clone()
            })
            .collect()
    }

    pub fn trade_session(&self) -> &TradeSession {
        &self.trade_session
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn peak_equity(&self) -> f64 {
        self.peak_equity
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    pub fn cumulative_durations(&self) -> Duration {
        self.cumulative_durations
    }

    pub fn cumulative_investments(&self) -> f64 {
        self.cumulative_investments
    }

    pub fn cumulative_fees(&self) -> f64 {
        self.cumulative_fees
    }

    pub fn profit_count(&self) -> usize {
        self.profit_count
    }

    pub fn loss_count(&self) -> usize {
        self.loss_count
    }

    pub fn break_even_count(&self) -> usize {
        self.break_even_count
    }

    pub fn cumulative_profits(&self) -> f64 {
        self.cumulative_profits
    }

    /// Sum of losing P&L, zero or negative.
    pub fn cumulative_losses(&self) -> f64 {
        self.cumulative_losses
    }

    pub fn trade_count(&self) -> usize {
        self.profit_count + self.loss_count + self.break_even_count
    }

    pub fn open_trade_count(&self) -> usize {
        usize::from(self.trade_session.is_open())
    }

    fn per_trade(&self, total: f64) -> f64 {
        ratio(total, self.trade_count())
    }

    pub fn profit_rate(&self) -> f64 {
        self.per_trade(self.profit_count as f64)
    }

    pub fn loss_rate(&self) -> f64 {
        self.per_trade(self.loss_count as f64)
    }

    pub fn break_even_rate(&self) -> f64 {
        self.per_trade(self.break_even_count as f64)
    }

    pub fn average_profit(&self) -> f64 {
        ratio(self.cumulative_profits, self.profit_count)
    }

    pub fn average_loss(&self) -> f64 {
        ratio(self.cumulative_losses, self.loss_count)
    }

    pub fn average_investment(&self) -> f64 {
        self.per_trade(self.cumulative_investments)
    }

    pub fn average_pnl(&self) -> f64 {
        self.per_trade(self.cumulative_pnl())
    }

    pub fn average_duration(&self) -> Duration {
        match i32::try_from(self.trade_count()) {
            Ok(count) if count > 0 => self.cumulative_durations / count,
            _ => Duration::zero(),
        }
    }

    pub fn expected_value(&self) -> f64 {
        self.profit_rate() * self.average_profit() + self.loss_rate() * self.average_loss()
    }

    /// Expected value per unit invested.
    pub fn expected_return(&self) -> f64 {
        let investment = self.average_investment();
        if investment == 0.0 {
            0.0
        } else {
            self.expected_value() / investment
        }
    }

    /// Profits over the magnitude of losses; infinite without losses.
    pub fn profit_factor(&self) -> f64 {
        if self.cumulative_losses == 0.0 {
            f64::INFINITY
        } else {
            self.cumulative_profits / -self.cumulative_losses
        }
    }

    pub fn cumulative_pnl(&self) -> f64 {
        self.cumulative_profits + self.cumulative_losses
    }

    pub fn initial_capital(&self) -> f64 {
        self.capital - self.cumulative_pnl() + self.cumulative_fees
    }

    /// Realized P&L over initial capital.
    pub fn cumulative_return(&self) -> f64 {
        let initial = self.initial_capital();
        if initial == 0.0 {
            0.0
        } else {
            self.cumulative_pnl() / initial
        }
    }

    /// Cumulative profits as a fraction of cumulative investments.
    pub fn cumulative_profit_return(&self) -> f64 {
        self.per_investment(self.cumulative_profits)
    }

    /// Cumulative losses as a fraction of cumulative investments.
    pub fn cumulative_loss_return(&self) -> f64 {
        self.per_investment(self.cumulative_losses)
    }

    fn per_investment(&self, amount: f64) -> f64 {
        if self.cumulative_investments == 0.0 {
            0.0
        } else {
            amount / self.cumulative_investments
        }
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.trade_session.unrealized_pnl()
    }

    pub fn unrealized_investment(&self) -> f64 {
        self.trade_session.unrealized_investment()
    }

    pub fn unrealized_duration(&self) -> Duration {
        self.trade_session.unrealized_duration()
    }

    pub fn equity(&self) -> f64 {
        self.capital + self.trade_session.partial_realized_pnl() + self.trade_session.unrealized_pnl()
    }

    /// Fall from peak equity as a fraction of the peak.
    pub fn drawdown(&self) -> f64 {
        if self.peak_equity == 0.0 {
            0.0
        } else {
            (self.peak_equity - self.equity()) / self.peak_equity
        }
    }
}

fn ratio(total: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { total / count as f64 }
}
