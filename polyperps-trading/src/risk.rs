//! Margin, liquidation and PnL math for leveraged binary-outcome positions
//!
//! Prices are probabilities in `0..1`. A YES position is long the outcome and
//! liquidates when the price falls; a NO position is short and liquidates
//! when it rises.

use polyperps_core::{Position, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::types::{Result, TradingError};

/// Leverage presets offered on the order ticket
pub const LEVERAGE_OPTIONS: [u32; 8] = [1, 2, 3, 5, 10, 15, 20, 25];

pub const MIN_LEVERAGE: Decimal = Decimal::ONE;
pub const MAX_LEVERAGE: Decimal = dec!(25);

/// 5 bps of notional
pub const TRADING_FEE_RATE: Decimal = dec!(0.0005);

/// 0.01% per funding interval. Display only, never charged.
pub const FUNDING_RATE: Decimal = dec!(0.0001);
pub const FUNDING_INTERVAL_HOURS: Decimal = dec!(8);

/// Largest accepted order size in USDC
pub const MAX_ORDER_SIZE: Decimal = dec!(1000000000);

/// Positions closer than this to their liquidation price are flagged
pub const LIQUIDATION_WARNING_DISTANCE: Decimal = dec!(0.05);

const HUNDRED: Decimal = dec!(100);

/// Check an order ticket: `0 < size <= MAX_ORDER_SIZE`, `1 <= leverage <= 25`,
/// `0 < price < 1`
pub fn validate_order(size: Decimal, leverage: Decimal, price: Decimal) -> Result<()> {
    if size <= Decimal::ZERO {
        return Err(TradingError::InvalidOrder(format!(
            "size must be positive, got {}",
            size
        )));
    }
    if size > MAX_ORDER_SIZE {
        return Err(TradingError::InvalidOrder(format!(
            "size must not exceed {}, got {}",
            MAX_ORDER_SIZE, size
        )));
    }
    if leverage < MIN_LEVERAGE || leverage > MAX_LEVERAGE {
        return Err(TradingError::InvalidOrder(format!(
            "leverage must be between {}x and {}x, got {}x",
            MIN_LEVERAGE, MAX_LEVERAGE, leverage
        )));
    }
    if price <= Decimal::ZERO || price >= Decimal::ONE {
        return Err(TradingError::InvalidOrder(format!(
            "price must be strictly between 0 and 1, got {}",
            price
        )));
    }
    Ok(())
}

/// Collateral posted for a position, `size / leverage`
pub fn margin_required(size: Decimal, leverage: Decimal) -> Result<Decimal> {
    if leverage <= Decimal::ZERO {
        return Err(TradingError::InvalidOrder(format!(
            "leverage must be positive, got {}",
            leverage
        )));
    }
    Ok(size / leverage)
}

/// Price at which the position's margin is wiped out, clamped to `[0, 1]`
pub fn liquidation_price(entry: Decimal, leverage: Decimal, side: Side) -> Decimal {
    let leverage = leverage.max(MIN_LEVERAGE);
    match side {
        Side::Yes => (entry - entry / leverage).max(Decimal::ZERO),
        Side::No => (entry + (Decimal::ONE - entry) / leverage).min(Decimal::ONE),
    }
}

pub fn unrealized_pnl(
    entry: Decimal,
    current: Decimal,
    size: Decimal,
    leverage: Decimal,
    side: Side,
) -> Decimal {
    (current - entry) * size * leverage * side.sign()
}

/// Price to mark a position at: the quoted YES price when it is a usable
/// probability, otherwise the entry price
pub fn mark_price(quoted: Option<Decimal>, entry: Decimal) -> Decimal {
    quoted
        .filter(|p| *p > Decimal::ZERO && *p <= Decimal::ONE)
        .unwrap_or(entry)
}

/// Return on margin in percent; zero when there is no margin
pub fn roi_percent(pnl: Decimal, margin: Decimal) -> Decimal {
    if margin.is_zero() {
        return Decimal::ZERO;
    }
    pnl / margin * HUNDRED
}

pub fn trading_fee(size: Decimal) -> Decimal {
    size * TRADING_FEE_RATE
}

/// Funding that would accrue on `size` over `hours`
pub fn funding_estimate(size: Decimal, hours: Decimal) -> Decimal {
    size * FUNDING_RATE * hours / FUNDING_INTERVAL_HOURS
}

/// How far the price can move against the position before liquidation.
///
/// Negative once the liquidation price has been crossed.
pub fn distance_to_liquidation(position: &Position, price: Decimal) -> Decimal {
    match position.side {
        Side::Yes => price - position.liquidation_price,
        Side::No => position.liquidation_price - price,
    }
}

pub fn is_near_liquidation(position: &Position, price: Decimal) -> bool {
    distance_to_liquidation(position, price) < LIQUIDATION_WARNING_DISTANCE
}

/// Order ticket preview
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuote {
    pub side: Side,
    pub size: Decimal,
    pub leverage: Decimal,
    pub entry_price: Decimal,
    pub margin: Decimal,
    pub fee: Decimal,
    pub liquidation_price: Decimal,
    /// Outcome shares `size` buys at the side's price
    pub shares: Decimal,
    /// Payout minus stake if the chosen outcome resolves true
    pub potential_profit: Decimal,
    pub max_roi: Decimal,
}

fn too_large() -> TradingError {
    TradingError::InvalidOrder("order is too large to quote at this price".to_string())
}

/// Price a ticket without touching any balance
pub fn quote(side: Side, size: Decimal, leverage: Decimal, entry: Decimal) -> Result<OrderQuote> {
    validate_order(size, leverage, entry)?;

    let side_price = match side {
        Side::Yes => entry,
        Side::No => Decimal::ONE - entry,
    };
    // Near-zero prices can push share counts past Decimal's range
    let shares = size.checked_div(side_price).ok_or_else(too_large)?;
    let potential_profit = shares - size;
    let max_roi = potential_profit
        .checked_div(size)
        .and_then(|r| r.checked_mul(HUNDRED))
        .ok_or_else(too_large)?;

    Ok(OrderQuote {
        side,
        size,
        leverage,
        entry_price: entry,
        margin: margin_required(size, leverage)?,
        fee: trading_fee(size),
        liquidation_price: liquidation_price(entry, leverage, side),
        shares,
        potential_profit,
        max_roi,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn position(side: Side, entry: Decimal, leverage: Decimal) -> Position {
        Position {
            id: "p1".to_string(),
            market_id: "m1".to_string(),
            market_question: "Q?".to_string(),
            market_slug: "q".to_string(),
            side,
            size: dec!(100),
            leverage,
            entry_price: entry,
            margin: dec!(100) / leverage,
            liquidation_price: liquidation_price(entry, leverage, side),
            opened_at: Utc::now(),
        }
    }

    #[test]
    fn test_liquidation_price_examples() {
        assert_eq!(liquidation_price(dec!(0.5), dec!(2), Side::Yes), dec!(0.25));
        assert_eq!(liquidation_price(dec!(0.5), dec!(2), Side::No), dec!(0.75));
        assert_eq!(liquidation_price(dec!(0.4), dec!(1), Side::Yes), dec!(0));
        assert_eq!(liquidation_price(dec!(0.4), dec!(1), Side::No), dec!(1));
        assert_eq!(liquidation_price(dec!(0.42), dec!(10), Side::Yes), dec!(0.378));
    }

    #[test]
    fn test_liquidation_price_stays_in_unit_interval() {
        let entries = [dec!(0.01), dec!(0.1), dec!(0.33), dec!(0.5), dec!(0.77), dec!(0.99)];
        for entry in entries {
            for lev in LEVERAGE_OPTIONS {
                let lev = Decimal::from(lev);
                for side in [Side::Yes, Side::No] {
                    let liq = liquidation_price(entry, lev, side);
                    assert!(liq >= Decimal::ZERO && liq <= Decimal::ONE, "{} {} {:?}", entry, lev, side);
                }
            }
        }
    }

    #[test]
    fn test_pnl_symmetry_and_zero_at_entry() {
        let yes = unrealized_pnl(dec!(0.4), dec!(0.5), dec!(100), dec!(5), Side::Yes);
        let no = unrealized_pnl(dec!(0.4), dec!(0.5), dec!(100), dec!(5), Side::No);
        assert_eq!(yes, dec!(50));
        assert_eq!(no, -yes);

        assert_eq!(unrealized_pnl(dec!(0.4), dec!(0.4), dec!(100), dec!(5), Side::Yes), Decimal::ZERO);
    }

    #[test]
    fn test_roi_and_margin() {
        assert_eq!(margin_required(dec!(1000), dec!(10)).unwrap(), dec!(100));
        assert!(margin_required(dec!(1000), dec!(0)).is_err());
        assert_eq!(roi_percent(dec!(25), dec!(100)), dec!(25));
        assert_eq!(roi_percent(dec!(25), dec!(0)), dec!(0));
    }

    #[test]
    fn test_fee_and_funding() {
        assert_eq!(trading_fee(dec!(1000)), dec!(0.5));
        assert_eq!(funding_estimate(dec!(1000), dec!(8)), dec!(0.1));
        assert_eq!(funding_estimate(dec!(1000), dec!(24)), dec!(0.3));
    }

    #[test]
    fn test_validate_order_bounds() {
        assert!(validate_order(dec!(100), dec!(5), dec!(0.5)).is_ok());
        assert!(validate_order(dec!(100), dec!(25), dec!(0.01)).is_ok());
        assert!(validate_order(dec!(0), dec!(5), dec!(0.5)).is_err());
        assert!(validate_order(dec!(100), dec!(0.5), dec!(0.5)).is_err());
        assert!(validate_order(dec!(100), dec!(26), dec!(0.5)).is_err());
        assert!(validate_order(dec!(100), dec!(5), dec!(0)).is_err());
        assert!(validate_order(dec!(100), dec!(5), dec!(1)).is_err());
        assert!(validate_order(MAX_ORDER_SIZE, dec!(1), dec!(0.5)).is_ok());
        assert!(validate_order(MAX_ORDER_SIZE + dec!(1), dec!(1), dec!(0.5)).is_err());
    }

    #[test]
    fn test_mark_price_ignores_unusable_quotes() {
        assert_eq!(mark_price(Some(dec!(0.6)), dec!(0.4)), dec!(0.6));
        assert_eq!(mark_price(Some(dec!(1)), dec!(0.4)), dec!(1));
        assert_eq!(mark_price(None, dec!(0.4)), dec!(0.4));
        assert_eq!(mark_price(Some(dec!(0)), dec!(0.4)), dec!(0.4));
        assert_eq!(mark_price(Some(dec!(-0.2)), dec!(0.4)), dec!(0.4));
        assert_eq!(mark_price(Some(Decimal::MAX), dec!(0.4)), dec!(0.4));
    }

    #[test]
    fn test_near_liquidation_is_side_aware() {
        let long = position(Side::Yes, dec!(0.5), dec!(10)); // liq 0.45
        assert!(!is_near_liquidation(&long, dec!(0.55)));
        assert!(is_near_liquidation(&long, dec!(0.49)));
        assert_eq!(distance_to_liquidation(&long, dec!(0.40)), dec!(-0.05));

        let short = position(Side::No, dec!(0.5), dec!(10)); // liq 0.55
        assert!(!is_near_liquidation(&short, dec!(0.45)));
        assert!(is_near_liquidation(&short, dec!(0.52)));
    }

    #[test]
    fn test_quote() {
        let q = quote(Side::Yes, dec!(100), dec!(5), dec!(0.4)).unwrap();
        assert_eq!(q.margin, dec!(20));
        assert_eq!(q.fee, dec!(0.05));
        assert_eq!(q.liquidation_price, dec!(0.32));
        assert_eq!(q.shares, dec!(250));
        assert_eq!(q.potential_profit, dec!(150));
        assert_eq!(q.max_roi, dec!(150));

        let q = quote(Side::No, dec!(100), dec!(5), dec!(0.8)).unwrap();
        assert_eq!(q.shares, dec!(500));

        assert!(quote(Side::Yes, dec!(100), dec!(50), dec!(0.4)).is_err());
    }

    #[test]
    fn test_quote_rejects_overflowing_tickets() {
        let huge = Decimal::MAX / dec!(2);
        assert!(matches!(
            quote(Side::Yes, huge, dec!(1), dec!(0.0001)),
            Err(TradingError::InvalidOrder(_))
        ));

        // In range, but the share count would not fit in a Decimal
        let tiny = Decimal::new(1, 28);
        assert!(matches!(
            quote(Side::Yes, MAX_ORDER_SIZE, dec!(1), tiny),
            Err(TradingError::InvalidOrder(_))
        ));
        assert!(matches!(
            quote(Side::No, MAX_ORDER_SIZE, dec!(1), Decimal::ONE - tiny),
            Err(TradingError::InvalidOrder(_))
        ));

        let q = quote(Side::Yes, MAX_ORDER_SIZE, dec!(25), dec!(0.0001)).unwrap();
        assert_eq!(q.shares, dec!(10000000000000));
    }

    #[test]
    fn test_pnl_at_extremes_fits() {
        let pnl = unrealized_pnl(Decimal::new(1, 28), Decimal::ONE, MAX_ORDER_SIZE, MAX_LEVERAGE, Side::Yes);
        assert!(pnl > dec!(24999999999));
    }
}
