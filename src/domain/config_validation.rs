//! Validation of the run configuration file and construction of the
//! profile, market and broker it describes.

use crate::domain::broker::{Broker, BrokerFee, FeePosition, FeeTrigger, FeeType};
use crate::domain::error::BarreplayError;
use crate::domain::market::Market;
use crate::domain::profile::Profile;
use crate::ports::config_port::ConfigPort;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), BarreplayError> {
    validate_profile_config(config)?;
    validate_market_config(config)?;
    validate_broker_config(config)?;
    Ok(())
}

pub fn validate_profile_config(config: &dyn ConfigPort) -> Result<(), BarreplayError> {
    validate_initial_capital(config)?;
    validate_capital_risk(config)?;
    Ok(())
}

pub fn validate_market_config(config: &dyn ConfigPort) -> Result<(), BarreplayError> {
    for key in ["min_order_qty", "qty_step"] {
        let value = number(config, "market", key, 1.0)?;
        if value < 0.0 {
            return Err(invalid("market", key, format!("{key} must be non-negative")));
        }
    }
    Ok(())
}

pub fn validate_broker_config(config: &dyn ConfigPort) -> Result<(), BarreplayError> {
    for name in fee_names(config) {
        validate_fee(config, &name)?;
    }
    Ok(())
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), BarreplayError> {
    let value = number(config, "profile", "initial_capital", Profile::DEFAULT_INITIAL_CAPITAL)?;
    if value <= 0.0 {
        return Err(invalid(
            "profile",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_capital_risk(config: &dyn ConfigPort) -> Result<(), BarreplayError> {
    let value = number(config, "profile", "capital_risk", Profile::DEFAULT_CAPITAL_RISK)?;
    if value <= 0.0 || value > 1.0 {
        return Err(invalid(
            "profile",
            "capital_risk",
            "capital_risk must be greater than 0 and at most 1",
        ));
    }
    Ok(())
}

fn validate_fee(config: &dyn ConfigPort, name: &str) -> Result<(), BarreplayError> {
    let section = fee_section(name);

    let fee_type = required(config, &section, "type")?;
    if FeeType::parse(&fee_type).is_none() {
        return Err(invalid(
            &section,
            "type",
            format!("unknown fee type '{fee_type}', expected percentage or fixed"),
        ));
    }
    if let Some(position) = config.get_string(&section, "position") {
        if FeePosition::parse(&position).is_none() {
            return Err(invalid(
                &section,
                "position",
                format!("unknown fee position '{position}', expected long, short or long_and_short"),
            ));
        }
    }
    if let Some(trigger) = config.get_string(&section, "trigger") {
        if FeeTrigger::parse(&trigger).is_none() {
            return Err(invalid(
                &section,
                "trigger",
                format!("unknown fee trigger '{trigger}'"),
            ));
        }
    }

    required(config, &section, "value")?;
    if number(config, &section, "value", 0.0)? < 0.0 {
        return Err(invalid(&section, "value", "value must be non-negative"));
    }
    Ok(())
}

pub fn profile_from_config(config: &dyn ConfigPort) -> Result<Profile, BarreplayError> {
    validate_profile_config(config)?;
    Ok(Profile::new(
        config
            .get_string("profile", "name")
            .unwrap_or_else(|| "default".to_string()),
        config.get_double("profile", "initial_capital", Profile::DEFAULT_INITIAL_CAPITAL),
        config.get_double("profile", "capital_risk", Profile::DEFAULT_CAPITAL_RISK),
    ))
}

pub fn market_from_config(config: &dyn ConfigPort) -> Result<Market, BarreplayError> {
    validate_market_config(config)?;
    Ok(Market::new(
        config
            .get_string("market", "name")
            .unwrap_or_else(|| "default".to_string()),
        config.get_double("market", "min_order_qty", 1.0),
        config.get_double("market", "qty_step", 1.0),
    ))
}

pub fn broker_from_config(config: &dyn ConfigPort) -> Result<Broker, BarreplayError> {
    validate_broker_config(config)?;
    let fees = fee_names(config)
        .into_iter()
        .map(|name| {
            let section = fee_section(&name);
            let text = |key: &str| config.get_string(&section, key).unwrap_or_default();
            BrokerFee {
                fee_type: FeeType::parse(&text("type")).unwrap_or(FeeType::Fixed),
                position: FeePosition::parse(&text("position")).unwrap_or(FeePosition::LongAndShort),
                trigger: FeeTrigger::parse(&text("trigger")).unwrap_or(FeeTrigger::All),
                value: config.get_double(&section, "value", 0.0),
                name,
            }
        })
        .collect();
    Ok(Broker::new(
        config
            .get_string("broker", "name")
            .unwrap_or_else(|| "default".to_string()),
        fees,
    ))
}

/// Fee section names listed under `[broker] fees`, comma separated.
fn fee_names(config: &dyn ConfigPort) -> Vec<String> {
    config
        .get_string("broker", "fees")
        .map(|fees| {
            fees.split(',')
                .map(|name| name.trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn fee_section(name: &str) -> String {
    format!("fee.{name}")
}

fn required(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, BarreplayError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(BarreplayError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

/// A numeric key, `default` when absent. Present but unparsable is an error.
fn number(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, BarreplayError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| invalid(section, key, format!("{key} must be a number, got '{s}'"))),
    }
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> BarreplayError {
    BarreplayError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}
