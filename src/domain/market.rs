//! Order quantity rules of a traded market.

#[derive(Debug, Clone, PartialEq)]
pub struct Market {
    pub name: String,
    pub min_order_qty: f64,
    pub qty_step: f64,
}

impl Market {
    pub fn new(name: impl Into<String>, min_order_qty: f64, qty_step: f64) -> Self {
        Market {
            name: name.into(),
            min_order_qty,
            qty_step,
        }
    }

    /// Rounds `size` to the nearest quantity step, then lifts a non-zero
    /// size below the minimum order up to it, keeping the sign.
    pub fn snap_quantity(&self, size: f64) -> f64 {
        let mut size = size;
        if self.qty_step > 0.0 && size % self.qty_step != 0.0 {
            size = self.qty_step * (size / self.qty_step).round();
        }
        if size > 0.0 && size < self.min_order_qty {
            size = self.min_order_qty;
        } else if size < 0.0 && size > -self.min_order_qty {
            size = -self.min_order_qty;
        }
        size
    }
}

impl Default for Market {
    fn default() -> Self {
        Market::new("default", 1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_nearest_step() {
        let market = Market::new("m", 1.0, 1.0);
        assert_eq!(market.snap_quantity(12.4), 12.0);
        assert_eq!(market.snap_quantity(12.6), 13.0);
        assert_eq!(market.snap_quantity(-12.6), -13.0);
        assert_eq!(market.snap_quantity(7.0), 7.0);
    }

    #[test]
    fn lifts_to_minimum_keeping_sign() {
        let market = Market::new("m", 5.0, 1.0);
        assert_eq!(market.snap_quantity(2.2), 5.0);
        assert_eq!(market.snap_quantity(-2.2), -5.0);
        assert_eq!(market.snap_quantity(0.2), 0.0);
    }

    #[test]
    fn zero_step_keeps_fractional_size() {
        let market = Market::new("m", 0.0, 0.0);
        assert_eq!(market.snap_quantity(3.75), 3.75);
    }
}
