//! Core domain types and logic.

pub mod asset;
pub mod backtest;
pub mod backtest_summary;
pub mod broker;
pub mod config_parser;
pub mod config_validation;
pub mod error;
pub mod filter;
pub mod market;
pub mod method;
pub mod profile;
pub mod series;
pub mod series_registry;
pub mod strategy;
pub mod trade_action;
pub mod trade_position;
pub mod trade_record;
pub mod trade_session;
