//! End-to-end account and ledger flow against an on-disk database
//!
//! Run with: cargo test -p polyperps-trading --test ledger_flow

use std::collections::HashMap;
use std::sync::Arc;

use polyperps_core::{MarketRef, Side, TradeKind};
use polyperps_trading::{AccountService, AccountStore, TradeRequest, TradingError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn btc_market() -> MarketRef {
    MarketRef {
        id: "1".to_string(),
        question: "Will Bitcoin reach $150,000 by end of 2025?".to_string(),
        slug: "bitcoin-150k-2025".to_string(),
    }
}

fn ticket(side: Side, size: Decimal, leverage: Decimal, price: Decimal) -> TradeRequest {
    TradeRequest {
        market: btc_market(),
        side,
        size,
        leverage,
        price,
    }
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("polyperps.db");

    let (email_token, position_id, order_id) = {
        let store = Arc::new(AccountStore::new(&db_path).unwrap());
        let service = AccountService::new(store, dec!(10000));

        let signed_in = service.register("alice@example.com", "pw").unwrap();
        let token = signed_in.token;

        let position = service
            .open_position(&token, &ticket(Side::Yes, dec!(1000), dec!(10), dec!(0.42)))
            .unwrap();
        let order = service
            .place_limit_order(&token, &ticket(Side::No, dec!(500), dec!(5), dec!(0.60)))
            .unwrap();

        let (account, portfolio) = service.portfolio(&token).unwrap();
        assert_eq!(account.balance, dec!(9800));
        assert_eq!(portfolio.margin_in_use(), dec!(200));

        (token, position.id, order.id)
    };

    // Sessions are in memory only; the data is not
    let store = Arc::new(AccountStore::new(&db_path).unwrap());
    let service = AccountService::new(store, dec!(10000));
    assert!(matches!(service.account(&email_token), Err(TradingError::SessionNotFound)));

    let token = service.login("alice@example.com", "pw").unwrap().token;
    let (account, portfolio) = service.portfolio(&token).unwrap();
    assert_eq!(account.balance, dec!(9800));
    assert_eq!(portfolio.positions[0].id, position_id);
    assert_eq!(portfolio.orders[0].id, order_id);

    let mut prices = HashMap::new();
    prices.insert("1".to_string(), dec!(0.45));
    // (0.45 - 0.42) * 1000 * 10
    assert_eq!(portfolio.total_unrealized_pnl(&prices), dec!(300));

    let outcome = service.close_position(&token, &position_id, dec!(0.45)).unwrap();
    assert_eq!(outcome.pnl, dec!(300));
    assert_eq!(outcome.return_amount, dec!(400));

    service.cancel_order(&token, &order_id).unwrap();

    let (account, portfolio) = service.portfolio(&token).unwrap();
    assert_eq!(account.balance, dec!(10300));
    assert!(portfolio.positions.is_empty());
    assert!(portfolio.orders.is_empty());

    let kinds: Vec<TradeKind> = portfolio.history.iter().map(|t| t.kind).collect();
    assert_eq!(kinds, vec![TradeKind::Close, TradeKind::Open]);
}

#[test]
fn test_accounts_are_isolated() {
    let service = AccountService::new(Arc::new(AccountStore::new_in_memory().unwrap()), dec!(1000));

    let alice = service.connect_wallet().unwrap().token;
    let bob = service.connect_wallet().unwrap().token;

    let position = service
        .open_position(&alice, &ticket(Side::Yes, dec!(100), dec!(2), dec!(0.5)))
        .unwrap();

    assert!(matches!(
        service.close_position(&bob, &position.id, dec!(0.5)),
        Err(TradingError::PositionNotFound(_))
    ));
    assert_eq!(service.account(&bob).unwrap().balance, dec!(1000));
    assert_eq!(service.account(&alice).unwrap().balance, dec!(950));
}

#[test]
fn test_rejected_trades_do_not_persist() {
    let service = AccountService::new(Arc::new(AccountStore::new_in_memory().unwrap()), dec!(100));
    let token = service.connect_wallet().unwrap().token;

    let err = service
        .open_position(&token, &ticket(Side::Yes, dec!(5000), dec!(10), dec!(0.5)))
        .unwrap_err();
    assert!(matches!(err, TradingError::InsufficientBalance { .. }));

    let err = service
        .place_limit_order(&token, &ticket(Side::Yes, dec!(10), dec!(100), dec!(0.5)))
        .unwrap_err();
    assert!(matches!(err, TradingError::InvalidOrder(_)));

    let (account, portfolio) = service.portfolio(&token).unwrap();
    assert_eq!(account.balance, dec!(100));
    assert!(portfolio.history.is_empty());
}
