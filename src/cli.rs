//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_adapter::{CsvAdapter, CsvReportAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::Backtest;
use crate::domain::backtest_summary::BacktestSummary;
use crate::domain::broker::Broker;
use crate::domain::config_validation::{
    broker_from_config, market_from_config, profile_from_config, validate_config,
};
use crate::domain::error::BarreplayError;
use crate::domain::market::Market;
use crate::domain::profile::Profile;
use crate::domain::strategy::{Strategy, parse_strategy_json, stringify_strategy};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "barreplay", about = "Bar-by-bar strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a strategy over a CSV bar history
    Backtest {
        #[arg(short, long)]
        strategy: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Parse a strategy and print its normalized JSON
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            strategy,
            data,
            config,
            output,
        } => run_backtest(&strategy, &data, config.as_ref(), output.as_ref()),
        Command::Validate { strategy } => run_validate(&strategy),
    }
}

fn fail(err: &BarreplayError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(err)
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Reads a strategy document; the strategy is named after the file.
pub fn load_strategy(path: &Path) -> Result<Strategy, BarreplayError> {
    let json = fs::read_to_string(path)?;
    parse_strategy_json(&file_stem(path), &json)
}

/// Profile, market and broker from the config, or their defaults.
pub fn build_environment(
    config: Option<&dyn ConfigPort>,
) -> Result<(Profile, Market, Broker), BarreplayError> {
    match config {
        Some(config) => {
            validate_config(config)?;
            Ok((
                profile_from_config(config)?,
                market_from_config(config)?,
                broker_from_config(config)?,
            ))
        }
        None => Ok((Profile::default(), Market::default(), Broker::default())),
    }
}

/// Loads `asset_name`, replays every bar, and writes the trade journal
/// when a report port is given.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    asset_name: &str,
    strategy: Strategy,
    environment: (Profile, Market, Broker),
    report: Option<&dyn ReportPort>,
) -> Result<Backtest, BarreplayError> {
    let asset = data_port.load_asset(asset_name)?;
    let (profile, market, broker) = environment;
    eprintln!("  Processing: {} bars of {}", asset.size(), asset.name());

    let mut backtest = Backtest::new(
        format!("{}/{}", strategy.name, asset.name()),
        Arc::new(asset),
        Arc::new(strategy),
        Arc::new(market),
        Arc::new(broker),
        Arc::new(profile),
    );
    backtest.run_all()?;

    if let Some(report) = report {
        report.write_journal(&backtest.trade_journal())?;
    }
    Ok(backtest)
}

/// Human readable statistics of the final summary.
pub fn format_summary(summary: &BacktestSummary) -> String {
    let mut lines = vec![
        format!("Initial Capital:  {:.2}", summary.initial_capital()),
        format!("Final Capital:    {:.2}", summary.capital()),
        format!("Equity:           {:.2}", summary.equity()),
        format!("Total Return:     {:.2}%", summary.cumulative_return() * 100.0),
        format!("Max Drawdown:     -{:.1}%", summary.max_drawdown() * 100.0),
        format!("Total Trades:     {}", summary.trade_count()),
        format!("Win Rate:         {:.1}%", summary.profit_rate() * 100.0),
        format!("Profit Factor:    {:.2}", summary.profit_factor()),
        format!("Expected Value:   {:.2}", summary.expected_value()),
        format!("Expected Return:  {:.2}%", summary.expected_return() * 100.0),
        format!("Avg P&L:          {:.2}", summary.average_pnl()),
        format!(
            "Profit / Loss:    {:.2}% / {:.2}%",
            summary.cumulative_profit_return() * 100.0,
            summary.cumulative_loss_return() * 100.0
        ),
        format!("Avg Duration:     {}h", summary.average_duration().num_hours()),
        format!("Fees:             {:.2}", summary.cumulative_fees()),
    ];
    if summary.open_trade_count() > 0 {
        lines.push(format!(
            "Open Trade P&L:   {:.2}",
            summary.unrealized_pnl()
        ));
    }
    lines.join("\n")
}

fn run_backtest(
    strategy_path: &Path,
    data_path: &Path,
    config_path: Option<&PathBuf>,
    output_path: Option<&PathBuf>,
) -> ExitCode {
    // Stage 1: Load config
    let config = match config_path {
        Some(path) => {
            eprintln!("Loading config from {}", path.display());
            match load_config(path) {
                Ok(config) => Some(config),
                Err(code) => return code,
            }
        }
        None => None,
    };
    let environment = match build_environment(config.as_ref().map(|c| c as &dyn ConfigPort)) {
        Ok(environment) => environment,
        Err(e) => return fail(&e),
    };

    // Stage 2: Load strategy
    eprintln!("Loading strategy from {}", strategy_path.display());
    let strategy = match load_strategy(strategy_path) {
        Ok(strategy) => strategy,
        Err(e) => return fail(&e),
    };

    // Stage 3: Replay
    let data_dir = data_path.parent().map(Path::to_path_buf).unwrap_or_default();
    let data_port = CsvAdapter::new(data_dir);
    let report = output_path.map(|path| CsvReportAdapter::new(path.clone()));
    let backtest = match run_backtest_pipeline(
        &data_port,
        &file_stem(data_path),
        strategy,
        environment,
        report.as_ref().map(|r| r as &dyn ReportPort),
    ) {
        Ok(backtest) => backtest,
        Err(e) => return fail(&e),
    };

    eprintln!("\n=== Results: {} ===", backtest.name());
    if let Some(summary) = backtest.summaries().last() {
        eprintln!("{}", format_summary(summary));
    }
    if let Some(output) = output_path {
        eprintln!("\nTrade journal written to: {}", output.display());
    }
    ExitCode::SUCCESS
}

fn run_validate(strategy_path: &Path) -> ExitCode {
    eprintln!("Validating strategy: {}", strategy_path.display());
    let strategy = match load_strategy(strategy_path) {
        Ok(strategy) => strategy,
        Err(e) => return fail(&e),
    };
    let normalized = match stringify_strategy(&strategy).and_then(|json| {
        serde_json::to_string_pretty(&json).map_err(BarreplayError::from)
    }) {
        Ok(normalized) => normalized,
        Err(e) => return fail(&e),
    };
    println!("{normalized}");
    eprintln!("\nStrategy '{}' is valid.", strategy.name);
    ExitCode::SUCCESS
}
