//! Paper-trading portfolio: open positions, resting orders and trade history
//!
//! The account balance lives with the account, not here. Every mutating
//! operation takes it by `&mut` and only touches it once the operation is
//! known to succeed.

use chrono::{DateTime, Utc};
use polyperps_core::{LimitOrder, OrderStatus, Position, TradeKind, TradeRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::risk::{
    liquidation_price, margin_required, mark_price, roi_percent, unrealized_pnl, validate_order,
};
use crate::types::{Result, TradeRequest, TradingError};

/// Result of closing a position
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseOutcome {
    pub position_id: String,
    pub exit_price: Decimal,
    pub pnl: Decimal,
    pub roi: Decimal,
    /// Amount credited back to the balance, `margin + pnl` floored at zero
    pub return_amount: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    /// Oldest first
    pub positions: Vec<Position>,
    /// Oldest first
    pub orders: Vec<LimitOrder>,
    /// Newest first
    pub history: Vec<TradeRecord>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn ensure_affordable(margin: Decimal, balance: Decimal) -> Result<()> {
    if margin > balance {
        return Err(TradingError::InsufficientBalance {
            required: margin,
            available: balance,
        });
    }
    Ok(())
}

impl Portfolio {
    /// Margin currently locked in positions and resting orders
    pub fn margin_in_use(&self) -> Decimal {
        self.positions.iter().map(|p| p.margin).sum::<Decimal>()
            + self.orders.iter().map(|o| o.margin).sum::<Decimal>()
    }

    /// Open a position at `request.price`, debiting its margin
    pub fn open_position(
        &mut self,
        balance: &mut Decimal,
        request: &TradeRequest,
        now: DateTime<Utc>,
    ) -> Result<Position> {
        validate_order(request.size, request.leverage, request.price)?;
        let margin = margin_required(request.size, request.leverage)?;
        ensure_affordable(margin, *balance)?;

        let position = Position {
            id: new_id(),
            market_id: request.market.id.clone(),
            market_question: request.market.question.clone(),
            market_slug: request.market.slug.clone(),
            side: request.side,
            size: request.size,
            leverage: request.leverage,
            entry_price: request.price,
            margin,
            liquidation_price: liquidation_price(request.price, request.leverage, request.side),
            opened_at: now,
        };

        *balance -= margin;
        self.positions.push(position.clone());
        self.history.insert(
            0,
            TradeRecord {
                id: new_id(),
                kind: TradeKind::Open,
                market_question: position.market_question.clone(),
                side: position.side,
                size: position.size,
                leverage: position.leverage,
                price: Some(position.entry_price),
                entry_price: None,
                exit_price: None,
                pnl: None,
                roi: None,
                timestamp: now,
            },
        );

        info!(
            "Opened {} {}x {} on {} at {} (margin {})",
            position.side, position.leverage, position.size, position.market_id, position.entry_price, margin
        );
        Ok(position)
    }

    /// Close a position at `current_price`, crediting `margin + pnl`.
    ///
    /// The recorded PnL and ROI are the full mark-to-market figures. Only the
    /// balance credit is floored at zero, so a loss past the margin costs no
    /// more than the margin.
    pub fn close_position(
        &mut self,
        balance: &mut Decimal,
        position_id: &str,
        current_price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<CloseOutcome> {
        if current_price < Decimal::ZERO || current_price > Decimal::ONE {
            return Err(TradingError::InvalidOrder(format!(
                "close price must be between 0 and 1, got {}",
                current_price
            )));
        }

        let index = self
            .positions
            .iter()
            .position(|p| p.id == position_id)
            .ok_or_else(|| TradingError::PositionNotFound(position_id.to_string()))?;
        let position = self.positions.remove(index);

        let pnl = position_pnl(&position, current_price);
        let roi = roi_percent(pnl, position.margin);
        let return_amount = (position.margin + pnl).max(Decimal::ZERO);

        *balance += return_amount;
        self.history.insert(
            0,
            TradeRecord {
                id: new_id(),
                kind: TradeKind::Close,
                market_question: position.market_question.clone(),
                side: position.side,
                size: position.size,
                leverage: position.leverage,
                price: None,
                entry_price: Some(position.entry_price),
                exit_price: Some(current_price),
                pnl: Some(pnl),
                roi: Some(roi),
                timestamp: now,
            },
        );

        info!(
            "Closed position {} at {} (pnl {}, roi {}%)",
            position.id, current_price, pnl, roi.round_dp(2)
        );
        Ok(CloseOutcome {
            position_id: position.id,
            exit_price: current_price,
            pnl,
            roi,
            return_amount,
        })
    }

    /// Rest a limit order, reserving its margin. Orders are never filled.
    pub fn place_limit_order(
        &mut self,
        balance: &mut Decimal,
        request: &TradeRequest,
        now: DateTime<Utc>,
    ) -> Result<LimitOrder> {
        validate_order(request.size, request.leverage, request.price)?;
        let margin = margin_required(request.size, request.leverage)?;
        ensure_affordable(margin, *balance)?;

        let order = LimitOrder {
            id: new_id(),
            market_id: request.market.id.clone(),
            market_question: request.market.question.clone(),
            market_slug: request.market.slug.clone(),
            side: request.side,
            size: request.size,
            leverage: request.leverage,
            limit_price: request.price,
            margin,
            status: OrderStatus::Open,
            created_at: now,
        };

        *balance -= margin;
        self.orders.push(order.clone());

        debug!("Placed limit order {} at {}", order.id, order.limit_price);
        Ok(order)
    }

    /// Cancel a resting order and refund its margin
    pub fn cancel_order(&mut self, balance: &mut Decimal, order_id: &str) -> Result<LimitOrder> {
        let index = self
            .orders
            .iter()
            .position(|o| o.id == order_id)
            .ok_or_else(|| TradingError::OrderNotFound(order_id.to_string()))?;
        let order = self.orders.remove(index);

        *balance += order.margin;

        debug!("Cancelled limit order {} (refund {})", order.id, order.margin);
        Ok(order)
    }

    /// Mark-to-market PnL across all positions.
    ///
    /// `prices` is keyed by market id; missing or unusable quotes are valued
    /// at entry.
    pub fn total_unrealized_pnl(&self, prices: &HashMap<String, Decimal>) -> Decimal {
        self.positions
            .iter()
            .map(|p| position_pnl(p, mark_price(prices.get(&p.market_id).copied(), p.entry_price)))
            .sum()
    }
}

pub fn position_pnl(position: &Position, current_price: Decimal) -> Decimal {
    unrealized_pnl(
        position.entry_price,
        current_price,
        position.size,
        position.leverage,
        position.side,
    )
}
