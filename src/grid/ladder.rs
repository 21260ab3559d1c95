//! Ladder generation
//!
//! Pure computation of the buy/sell levels and the stop-loss threshold around
//! a reference price. No I/O; identical inputs always give identical output.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::StrategyConfig;
use crate::error::GridError;
use crate::{PriceLevel, Side};

/// One cycle's worth of levels, all derived from the same reference price
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ladder {
    pub reference_price: Decimal,
    /// Ascending, nearest level first
    pub sells: Vec<PriceLevel>,
    /// Descending, nearest level first
    pub buys: Vec<PriceLevel>,
    pub stop_loss: Decimal,
}

impl Ladder {
    /// Sells then buys, each nearest first: the submission order
    pub fn levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.sells.iter().chain(self.buys.iter())
    }

    pub fn len(&self) -> usize {
        self.sells.len() + self.buys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sells.is_empty() && self.buys.is_empty()
    }
}

/// `reference * (1 - (1 + grid_count) * grid_size)`, rounded to price precision
pub fn stop_loss_threshold(
    reference_price: Decimal,
    config: &StrategyConfig,
) -> Result<Decimal, GridError> {
    check_reference_price(reference_price)?;
    check_grid_size(config)?;

    let depth = Decimal::ONE + Decimal::from(config.grid_count);
    let threshold = reference_price * (Decimal::ONE - depth * config.grid_size);
    Ok(round_price(threshold, config.price_precision))
}

/// Build the ladder for `reference_price`
///
/// For level `i` in `1..=grid_count`:
/// - sell price `reference * (1 + grid_size + i * grid_size)`
/// - buy price `reference * (1 - i * grid_size)`
/// - quantity `order_amount * (1 + i * grid_step)` on both sides
pub fn generate_ladder(
    reference_price: Decimal,
    config: &StrategyConfig,
) -> Result<Ladder, GridError> {
    check_reference_price(reference_price)?;
    check_grid_size(config)?;

    if config.grid_step < Decimal::ZERO {
        return Err(GridError::invalid("grid_step", "must be >= 0"));
    }
    if config.order_amount <= Decimal::ZERO {
        return Err(GridError::invalid("order_amount", "must be > 0"));
    }

    let base_quantity = if config.amount_in_quote {
        config.order_amount / reference_price
    } else {
        config.order_amount
    };

    let count = config.grid_count as usize;
    let mut sells = Vec::with_capacity(count);
    let mut buys = Vec::with_capacity(count);

    for index in 1..=config.grid_count {
        let i = Decimal::from(index);
        let quantity = round_quantity(
            base_quantity * (Decimal::ONE + i * config.grid_step),
            config.quantity_precision,
        );
        if quantity <= Decimal::ZERO {
            return Err(GridError::invalid(
                "order_amount",
                format!(
                    "level {} quantity rounds to zero at precision {}",
                    index, config.quantity_precision
                ),
            ));
        }

        let sell_price = round_price(
            reference_price * (Decimal::ONE + config.grid_size + i * config.grid_size),
            config.price_precision,
        );
        let buy_price = round_price(
            reference_price * (Decimal::ONE - i * config.grid_size),
            config.price_precision,
        );
        if buy_price <= Decimal::ZERO {
            return Err(GridError::invalid(
                "grid_count",
                format!("buy level {} lands at {} (must stay above zero)", index, buy_price),
            ));
        }

        sells.push(PriceLevel {
            side: Side::Sell,
            index,
            price: sell_price,
            quantity,
        });
        buys.push(PriceLevel {
            side: Side::Buy,
            index,
            price: buy_price,
            quantity,
        });
    }

    Ok(Ladder {
        reference_price,
        sells,
        buys,
        stop_loss: stop_loss_threshold(reference_price, config)?,
    })
}

/// Round a price to `precision` decimals, midpoint away from zero
pub fn round_price(value: Decimal, precision: u32) -> Decimal {
    value
        .round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

/// Round a quantity down to `precision` decimals so a level never exceeds its size
pub fn round_quantity(value: Decimal, precision: u32) -> Decimal {
    value
        .round_dp_with_strategy(precision, RoundingStrategy::ToZero)
        .normalize()
}

fn check_reference_price(reference_price: Decimal) -> Result<(), GridError> {
    if reference_price <= Decimal::ZERO {
        return Err(GridError::invalid(
            "reference_price",
            format!("must be > 0, got {}", reference_price),
        ));
    }
    Ok(())
}

fn check_grid_size(config: &StrategyConfig) -> Result<(), GridError> {
    if config.grid_size <= Decimal::ZERO {
        return Err(GridError::invalid(
            "grid_size",
            format!("must be > 0, got {}", config.grid_size),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> StrategyConfig {
        StrategyConfig {
            grid_size: dec!(0.01),
            grid_step: dec!(0.02),
            grid_count: 3,
            order_amount: dec!(1),
            price_precision: 8,
            quantity_precision: 8,
            ..StrategyConfig::default()
        }
    }

    fn prices(levels: &[PriceLevel]) -> Vec<Decimal> {
        levels.iter().map(|l| l.price).collect()
    }

    #[test]
    fn test_reference_ladder() {
        let ladder = generate_ladder(dec!(100), &config()).unwrap();

        assert_eq!(prices(&ladder.sells), vec![dec!(102), dec!(103), dec!(104)]);
        assert_eq!(prices(&ladder.buys), vec![dec!(99), dec!(98), dec!(97)]);
        assert_eq!(ladder.stop_loss, dec!(96));
        assert_eq!(ladder.len(), 6);
    }

    #[test]
    fn test_deterministic() {
        let first = generate_ladder(dec!(100), &config()).unwrap();
        let second = generate_ladder(dec!(100), &config()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_quantity_scales_symmetrically() {
        let ladder = generate_ladder(dec!(100), &config()).unwrap();
        let expected = vec![dec!(1.02), dec!(1.04), dec!(1.06)];

        let sell_qty: Vec<Decimal> = ladder.sells.iter().map(|l| l.quantity).collect();
        let buy_qty: Vec<Decimal> = ladder.buys.iter().map(|l| l.quantity).collect();
        assert_eq!(sell_qty, expected);
        assert_eq!(buy_qty, expected);
    }

    #[test]
    fn test_levels_nearest_first() {
        let ladder = generate_ladder(dec!(100), &config()).unwrap();
        let order: Vec<(Side, u32)> = ladder.levels().map(|l| (l.side, l.index)).collect();
        assert_eq!(
            order,
            vec![
                (Side::Sell, 1),
                (Side::Sell, 2),
                (Side::Sell, 3),
                (Side::Buy, 1),
                (Side::Buy, 2),
                (Side::Buy, 3),
            ]
        );
    }

    #[test]
    fn test_rejects_zero_grid_size() {
        let cfg = StrategyConfig {
            grid_size: Decimal::ZERO,
            ..config()
        };
        assert!(matches!(
            generate_ladder(dec!(100), &cfg),
            Err(GridError::InvalidParameter { name: "grid_size", .. })
        ));
    }

    #[test]
    fn test_rejects_zero_reference_price() {
        assert!(matches!(
            generate_ladder(Decimal::ZERO, &config()),
            Err(GridError::InvalidParameter {
                name: "reference_price",
                ..
            })
        ));
        assert!(generate_ladder(dec!(-5), &config()).is_err());
    }

    #[test]
    fn test_rejects_grid_below_zero() {
        let cfg = StrategyConfig {
            grid_size: dec!(0.5),
            grid_count: 2,
            ..config()
        };
        assert!(generate_ladder(dec!(100), &cfg).is_err());
    }

    #[test]
    fn test_rejects_quantity_rounding_to_zero() {
        let cfg = StrategyConfig {
            order_amount: dec!(0.0001),
            quantity_precision: 2,
            ..config()
        };
        assert!(generate_ladder(dec!(100), &cfg).is_err());
    }

    #[test]
    fn test_empty_ladder_when_grid_count_zero() {
        let cfg = StrategyConfig {
            grid_count: 0,
            ..config()
        };
        let ladder = generate_ladder(dec!(100), &cfg).unwrap();
        assert!(ladder.is_empty());
        assert_eq!(ladder.stop_loss, dec!(99));
    }

    #[test]
    fn test_amount_in_quote_converts_at_reference() {
        let cfg = StrategyConfig {
            order_amount: dec!(50),
            amount_in_quote: true,
            grid_step: Decimal::ZERO,
            ..config()
        };
        let ladder = generate_ladder(dec!(25000), &cfg).unwrap();
        assert!(ladder.levels().all(|l| l.quantity == dec!(0.002)));
    }

    #[test]
    fn test_rounding() {
        let cfg = StrategyConfig {
            price_precision: 2,
            quantity_precision: 3,
            ..config()
        };
        let ladder = generate_ladder(dec!(123.4567), &cfg).unwrap();
        // 123.4567 * 1.02 = 125.925834
        assert_eq!(ladder.sells[0].price, dec!(125.93));
        // 1 * 1.02 stays, 1.0599.. would round down
        assert_eq!(ladder.sells[0].quantity, dec!(1.02));
        assert_eq!(round_quantity(dec!(1.0599), 3), dec!(1.059));
        assert_eq!(round_price(dec!(1.005), 2), dec!(1.01));
    }
}
