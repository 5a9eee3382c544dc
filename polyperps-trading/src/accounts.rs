//! Accounts, sessions and per-account trading
//!
//! Email accounts keep a salted password hash and their wallet key sealed
//! under the password, and trade against SQLite. Wallet-connected accounts
//! have no password and are never written to disk; their key, balance and
//! portfolio live in the session and are gone after logout or expiry.
//!
//! Sessions expire after [`SESSION_TTL`] without use. Expired sessions are
//! swept whenever a new one starts.
//!
//! All methods may block on SQLite and, for password operations, on key
//! derivation. Call them from `spawn_blocking` in async code.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use polyperps_core::{Account, LimitOrder, Position};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::keystore;
use crate::ledger::{CloseOutcome, Portfolio};
use crate::storage::{AccountStore, UserRecord};
use crate::types::{Result, TradeRequest, TradingError};
use crate::wallet::TradingWallet;

/// Idle time after which a session is dropped
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Largest balance an account can be set to
pub const MAX_BALANCE: Decimal = dec!(1000000000000);

/// A wallet-only account, held in memory for the life of its session
struct WalletAccount {
    user: UserRecord,
    portfolio: Portfolio,
    private_key: String,
}

/// An authenticated bearer session
#[derive(Clone)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    /// Only set for wallet-connected accounts
    wallet: Option<Arc<Mutex<WalletAccount>>>,
    last_seen: Instant,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("wallet_only", &self.wallet.is_some())
            .finish()
    }
}

/// A freshly created session with the account it belongs to
#[derive(Debug, Clone)]
pub struct SignIn {
    pub token: String,
    pub account: Account,
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((user, domain)) if !user.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(TradingError::InvalidInput(format!("Invalid email address: {}", email))),
    }
}

fn new_token() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

pub struct AccountService {
    store: Arc<AccountStore>,
    sessions: DashMap<String, Session>,
    starting_balance: Decimal,
    session_ttl: Duration,
}

impl AccountService {
    pub fn new(store: Arc<AccountStore>, starting_balance: Decimal) -> Self {
        Self {
            store,
            sessions: DashMap::new(),
            starting_balance,
            session_ttl: SESSION_TTL,
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn store(&self) -> &AccountStore {
        &self.store
    }

    /// Number of live sessions, expired ones included until the next sweep
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn is_expired(&self, session: &Session, now: Instant) -> bool {
        now.duration_since(session.last_seen) >= self.session_ttl
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !self.is_expired(session, now));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            debug!("Swept {} expired sessions", removed);
        }
        removed
    }

    fn start_session(&self, user: &UserRecord, wallet: Option<WalletAccount>) -> SignIn {
        self.sweep_expired();

        let token = new_token();
        self.sessions.insert(
            token.clone(),
            Session {
                token: token.clone(),
                user_id: user.id.clone(),
                wallet: wallet.map(|w| Arc::new(Mutex::new(w))),
                last_seen: Instant::now(),
            },
        );
        SignIn {
            token,
            account: user.to_account(),
        }
    }

    fn new_user(&self, wallet: &TradingWallet) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4().to_string(),
            email: None,
            password_hash: None,
            sealed_key: None,
            wallet_address: wallet.address_string(),
            balance: self.starting_balance,
            created_at: Utc::now(),
        }
    }

    /// Create an email account with a freshly generated wallet
    pub fn register(&self, email: &str, password: &str) -> Result<SignIn> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(TradingError::InvalidInput("Password must not be empty".to_string()));
        }
        if self.store.find_user_by_email(&email)?.is_some() {
            return Err(TradingError::EmailTaken(email));
        }

        let wallet = TradingWallet::generate();
        let mut user = self.new_user(&wallet);
        user.email = Some(email);
        user.password_hash = Some(keystore::hash_password(password)?);
        user.sealed_key = Some(keystore::seal(wallet.private_key_hex().as_bytes(), password)?);

        self.store.insert_user(&user)?;
        info!("Registered account {} ({})", user.id, user.wallet_address);

        Ok(self.start_session(&user, None))
    }

    pub fn login(&self, email: &str, password: &str) -> Result<SignIn> {
        let email = email.trim().to_lowercase();
        let user = self
            .store
            .find_user_by_email(&email)?
            .ok_or(TradingError::InvalidCredentials)?;

        let Some(hash) = user.password_hash.as_deref() else {
            return Err(TradingError::InvalidCredentials);
        };
        if !keystore::verify_password(password, hash) {
            warn!("Failed login for account {}", user.id);
            return Err(TradingError::InvalidCredentials);
        }

        info!("Account {} logged in", user.id);
        Ok(self.start_session(&user, None))
    }

    /// Create a wallet-only account. Nothing is persisted.
    pub fn connect_wallet(&self) -> Result<SignIn> {
        let wallet = TradingWallet::generate();
        let user = self.new_user(&wallet);
        info!("Connected wallet account {} ({})", user.id, user.wallet_address);

        let account = WalletAccount {
            user: user.clone(),
            portfolio: Portfolio::default(),
            private_key: wallet.private_key_hex(),
        };
        Ok(self.start_session(&user, Some(account)))
    }

    /// End a session. Returns false if it did not exist.
    pub fn logout(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Look up a live session and mark it as used
    pub fn session(&self, token: &str) -> Result<Session> {
        let now = Instant::now();
        if let Some(mut entry) = self.sessions.get_mut(token) {
            if !self.is_expired(&entry, now) {
                entry.last_seen = now;
                return Ok(entry.value().clone());
            }
        }

        if self
            .sessions
            .remove_if(token, |_, session| self.is_expired(session, now))
            .is_some()
        {
            debug!("Session expired");
        }
        Err(TradingError::SessionNotFound)
    }

    pub fn account(&self, token: &str) -> Result<Account> {
        let session = self.session(token)?;
        match &session.wallet {
            Some(wallet) => Ok(wallet.lock().user.to_account()),
            None => self
                .store
                .get_user(&session.user_id)?
                .map(|user| user.to_account())
                .ok_or(TradingError::AccountNotFound(session.user_id)),
        }
    }

    /// Overwrite the session account's balance
    pub fn update_balance(&self, token: &str, balance: Decimal) -> Result<Account> {
        if balance < Decimal::ZERO || balance > MAX_BALANCE {
            return Err(TradingError::InvalidInput(format!(
                "Balance must be between 0 and {}, got {}",
                MAX_BALANCE, balance
            )));
        }

        let session = self.session(token)?;
        match &session.wallet {
            Some(wallet) => {
                let mut wallet = wallet.lock();
                wallet.user.balance = balance;
                Ok(wallet.user.to_account())
            }
            None => {
                self.store.set_balance(&session.user_id, balance)?;
                self.account(token)
            }
        }
    }

    /// Reveal the account's private key.
    ///
    /// Wallet sessions return the key they hold. Email accounts must supply
    /// the password to unseal the stored key.
    pub fn export_private_key(&self, token: &str, password: Option<&str>) -> Result<String> {
        let session = self.session(token)?;
        if let Some(wallet) = &session.wallet {
            return Ok(wallet.lock().private_key.clone());
        }

        let user = self
            .store
            .get_user(&session.user_id)?
            .ok_or(TradingError::AccountNotFound(session.user_id.clone()))?;
        let sealed = user.sealed_key.as_deref().ok_or(TradingError::KeyNotFound)?;
        let password = password.ok_or(TradingError::InvalidCredentials)?;

        let bytes = keystore::open(sealed, password)?;
        info!("Exported private key for account {}", user.id);
        String::from_utf8(bytes)
            .map_err(|e| TradingError::Keystore(format!("Sealed key is not UTF-8: {}", e)))
    }

    // ========================================================================
    // Trading
    // ========================================================================

    /// Run a ledger mutation against the session's account.
    ///
    /// Like [`AccountStore::with_portfolio`], nothing changes unless `f`
    /// succeeds.
    fn with_portfolio<T, F>(&self, token: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Decimal, &mut Portfolio) -> Result<T>,
    {
        let session = self.session(token)?;
        let Some(wallet) = &session.wallet else {
            return self.store.with_portfolio(&session.user_id, f);
        };

        let mut wallet = wallet.lock();
        let mut balance = wallet.user.balance;
        let mut portfolio = wallet.portfolio.clone();
        let out = f(&mut balance, &mut portfolio)?;
        wallet.user.balance = balance;
        wallet.portfolio = portfolio;
        Ok(out)
    }

    pub fn portfolio(&self, token: &str) -> Result<(Account, Portfolio)> {
        let session = self.session(token)?;
        if let Some(wallet) = &session.wallet {
            let wallet = wallet.lock();
            return Ok((wallet.user.to_account(), wallet.portfolio.clone()));
        }

        let user = self
            .store
            .get_user(&session.user_id)?
            .ok_or(TradingError::AccountNotFound(session.user_id.clone()))?;
        let portfolio = self.store.load_portfolio(&user.id)?;
        Ok((user.to_account(), portfolio))
    }

    pub fn open_position(&self, token: &str, request: &TradeRequest) -> Result<Position> {
        self.with_portfolio(token, |balance, portfolio| {
            portfolio.open_position(balance, request, Utc::now())
        })
    }

    pub fn close_position(
        &self,
        token: &str,
        position_id: &str,
        current_price: Decimal,
    ) -> Result<CloseOutcome> {
        self.with_portfolio(token, |balance, portfolio| {
            portfolio.close_position(balance, position_id, current_price, Utc::now())
        })
    }

    pub fn place_limit_order(&self, token: &str, request: &TradeRequest) -> Result<LimitOrder> {
        self.with_portfolio(token, |balance, portfolio| {
            portfolio.place_limit_order(balance, request, Utc::now())
        })
    }

    pub fn cancel_order(&self, token: &str, order_id: &str) -> Result<LimitOrder> {
        self.with_portfolio(token, |balance, portfolio| portfolio.cancel_order(balance, order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn service() -> AccountService {
        AccountService::new(Arc::new(AccountStore::new_in_memory().unwrap()), dec!(10000))
    }

    #[test]
    fn test_register_login_and_export() {
        let service = service();
        let signed_in = service.register("Trader@Example.com ", "s3cret").unwrap();

        assert_eq!(signed_in.account.email.as_deref(), Some("trader@example.com"));
        assert_eq!(signed_in.account.balance, dec!(10000));
        assert!(signed_in.account.wallet_address.starts_with("0x"));

        let key = service.export_private_key(&signed_in.token, Some("s3cret")).unwrap();
        let wallet = TradingWallet::from_private_key(&key).unwrap();
        assert_eq!(wallet.address_string(), signed_in.account.wallet_address);

        assert!(matches!(
            service.export_private_key(&signed_in.token, Some("wrong")),
            Err(TradingError::InvalidCredentials)
        ));
        assert!(matches!(
            service.export_private_key(&signed_in.token, None),
            Err(TradingError::InvalidCredentials)
        ));

        let again = service.login("trader@example.com", "s3cret").unwrap();
        assert_eq!(again.account.id, signed_in.account.id);
        assert_ne!(again.token, signed_in.token);
    }

    #[test]
    fn test_register_rejects_duplicates_and_bad_input() {
        let service = service();
        service.register("a@b.co", "pw").unwrap();

        assert!(matches!(service.register("A@B.CO", "pw2"), Err(TradingError::EmailTaken(_))));
        assert!(matches!(service.register("nope", "pw"), Err(TradingError::InvalidInput(_))));
        assert!(matches!(service.register("c@d.co", ""), Err(TradingError::InvalidInput(_))));
    }

    #[test]
    fn test_login_failures() {
        let service = service();
        service.register("a@b.co", "pw").unwrap();

        assert!(matches!(service.login("a@b.co", "bad"), Err(TradingError::InvalidCredentials)));
        assert!(matches!(service.login("x@y.co", "pw"), Err(TradingError::InvalidCredentials)));
    }

    #[test]
    fn test_wallet_session_holds_key_until_logout() {
        let service = service();
        let signed_in = service.connect_wallet().unwrap();
        assert!(signed_in.account.is_wallet_only());

        let key = service.export_private_key(&signed_in.token, None).unwrap();
        assert_eq!(
            TradingWallet::from_private_key(&key).unwrap().address_string(),
            signed_in.account.wallet_address
        );

        assert!(service.logout(&signed_in.token));
        assert!(!service.logout(&signed_in.token));
        assert!(matches!(
            service.export_private_key(&signed_in.token, None),
            Err(TradingError::SessionNotFound)
        ));
    }

    #[test]
    fn test_update_balance() {
        let service = service();
        let wallet = service.connect_wallet().unwrap();
        let email = service.register("a@b.co", "pw").unwrap();

        for token in [&wallet.token, &email.token] {
            let account = service.update_balance(token, dec!(42.5)).unwrap();
            assert_eq!(account.balance, dec!(42.5));
            assert_eq!(service.account(token).unwrap().balance, dec!(42.5));

            assert!(matches!(
                service.update_balance(token, dec!(-1)),
                Err(TradingError::InvalidInput(_))
            ));
            assert!(matches!(
                service.update_balance(token, MAX_BALANCE + dec!(1)),
                Err(TradingError::InvalidInput(_))
            ));
        }
        assert!(matches!(
            service.update_balance("ghost", dec!(1)),
            Err(TradingError::SessionNotFound)
        ));
    }

    #[test]
    fn test_wallet_accounts_are_never_persisted() {
        let service = service();
        let signed_in = service.connect_wallet().unwrap();
        let id = signed_in.account.id.clone();

        let ticket = TradeRequest {
            market: polyperps_core::MarketRef {
                id: "m1".to_string(),
                question: "Q?".to_string(),
                slug: "q".to_string(),
            },
            side: polyperps_core::Side::Yes,
            size: dec!(100),
            leverage: dec!(2),
            price: dec!(0.5),
        };
        service.open_position(&signed_in.token, &ticket).unwrap();

        let (account, portfolio) = service.portfolio(&signed_in.token).unwrap();
        assert_eq!(account.balance, dec!(9950));
        assert_eq!(portfolio.positions.len(), 1);

        assert!(service.store().get_user(&id).unwrap().is_none());
        assert!(service.store().load_portfolio(&id).unwrap().positions.is_empty());

        service.logout(&signed_in.token);
        assert!(matches!(service.portfolio(&signed_in.token), Err(TradingError::SessionNotFound)));
    }

    #[test]
    fn test_idle_sessions_expire() {
        let service = service().with_session_ttl(Duration::ZERO);
        let first = service.connect_wallet().unwrap();
        assert!(matches!(service.account(&first.token), Err(TradingError::SessionNotFound)));
        assert_eq!(service.active_sessions(), 0);

        // Starting a session sweeps the stale ones
        service.connect_wallet().unwrap();
        service.connect_wallet().unwrap();
        assert_eq!(service.active_sessions(), 1);
        assert_eq!(service.sweep_expired(), 1);
        assert_eq!(service.active_sessions(), 0);
    }

    #[test]
    fn test_sessions_survive_within_ttl() {
        let service = service().with_session_ttl(Duration::from_secs(60));
        let signed_in = service.register("a@b.co", "pw").unwrap();
        service.connect_wallet().unwrap();

        assert_eq!(service.sweep_expired(), 0);
        assert_eq!(service.active_sessions(), 2);
        assert_eq!(service.account(&signed_in.token).unwrap().id, signed_in.account.id);
    }
}
