//! Account sizing: starting capital and the fraction risked per trade.

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub initial_capital: f64,
    pub capital_risk: f64,
}

impl Profile {
    pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;
    pub const DEFAULT_CAPITAL_RISK: f64 = 0.01;

    pub fn new(name: impl Into<String>, initial_capital: f64, capital_risk: f64) -> Self {
        Profile {
            name: name.into(),
            initial_capital,
            capital_risk,
        }
    }

    /// Capital put at risk by one trade.
    pub fn risk_value(&self) -> f64 {
        self.initial_capital * self.capital_risk
    }
}

impl Default for Profile {
    fn default() -> Self {
        Profile::new(
            "default",
            Self::DEFAULT_INITIAL_CAPITAL,
            Self::DEFAULT_CAPITAL_RISK,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_value_is_capital_times_risk() {
        let profile = Profile::new("p", 50_000.0, 0.02);
        assert!((profile.risk_value() - 1000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn defaults() {
        let profile = Profile::default();
        assert!((profile.risk_value() - 1000.0).abs() < f64::EPSILON);
    }
}
