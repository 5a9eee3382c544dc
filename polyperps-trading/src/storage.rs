//! Account Storage
//!
//! SQLite-backed persistence for users and their portfolios. Balances are
//! stored as decimal text so no precision is lost; portfolios are stored as
//! JSON documents, one row per user.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use polyperps_core::Account;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::ledger::Portfolio;
use crate::types::{Result, TradingError};

/// A user row, including the secrets that never leave this crate
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub sealed_key: Option<String>,
    pub wallet_address: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn to_account(&self) -> Account {
        Account {
            id: self.id.clone(),
            email: self.email.clone(),
            wallet_address: self.wallet_address.clone(),
            balance: self.balance,
            created_at: self.created_at,
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<(Self, String, String)> {
        Ok((
            Self {
                id: row.get(0)?,
                email: row.get(1)?,
                password_hash: row.get(2)?,
                sealed_key: row.get(3)?,
                wallet_address: row.get(4)?,
                balance: Decimal::ZERO,
                created_at: DateTime::<Utc>::MIN_UTC,
            },
            row.get(5)?,
            row.get(6)?,
        ))
    }
}

const USER_COLUMNS: &str =
    "id, email, password_hash, sealed_key, wallet_address, balance, created_at";

fn parse_balance(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| TradingError::Storage(format!("Corrupt balance '{}': {}", raw, e)))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TradingError::Storage(format!("Corrupt timestamp '{}': {}", raw, e)))
}

fn finish_user(raw: Option<(UserRecord, String, String)>) -> Result<Option<UserRecord>> {
    raw.map(|(mut user, balance, created_at)| {
        user.balance = parse_balance(&balance)?;
        user.created_at = parse_timestamp(&created_at)?;
        Ok(user)
    })
    .transpose()
}

/// User and portfolio storage using SQLite
pub struct AccountStore {
    conn: Mutex<Connection>,
}

impl AccountStore {
    /// Open (or create) the database at `db_path`
    ///
    /// Creates the parent directory and tables if they don't exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE,
                password_hash TEXT,
                sealed_key TEXT,
                wallet_address TEXT NOT NULL,
                balance TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS portfolios (
                user_id TEXT PRIMARY KEY REFERENCES users(id),
                positions TEXT NOT NULL DEFAULT '[]',
                orders TEXT NOT NULL DEFAULT '[]',
                history TEXT NOT NULL DEFAULT '[]',
                updated_at INTEGER DEFAULT (strftime('%s', 'now'))
            );
            "#,
        )?;

        Ok(())
    }

    pub fn insert_user(&self, user: &UserRecord) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        if let Some(email) = &user.email {
            let exists: Option<String> = tx
                .query_row("SELECT id FROM users WHERE email = ?1", params![email], |row| row.get(0))
                .optional()?;
            if exists.is_some() {
                return Err(TradingError::EmailTaken(email.clone()));
            }
        }

        tx.execute(
            r#"
            INSERT INTO users (id, email, password_hash, sealed_key, wallet_address, balance, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                user.id,
                user.email,
                user.password_hash,
                user.sealed_key,
                user.wallet_address,
                user.balance.to_string(),
                user.created_at.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "INSERT INTO portfolios (user_id) VALUES (?1)",
            params![user.id],
        )?;
        tx.commit()?;

        debug!("Stored user {}", user.id);
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRecord>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![id],
                UserRecord::from_row,
            )
            .optional()?;
        finish_user(raw)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
                params![email],
                UserRecord::from_row,
            )
            .optional()?;
        finish_user(raw)
    }

    pub fn set_balance(&self, id: &str, balance: Decimal) -> Result<()> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE users SET balance = ?1 WHERE id = ?2",
            params![balance.to_string(), id],
        )?;
        if updated == 0 {
            return Err(TradingError::AccountNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn load_portfolio(&self, user_id: &str) -> Result<Portfolio> {
        let conn = self.conn.lock();
        Self::read_portfolio(&conn, user_id)
    }

    fn read_portfolio(conn: &Connection, user_id: &str) -> Result<Portfolio> {
        let raw: Option<(String, String, String)> = conn
            .query_row(
                "SELECT positions, orders, history FROM portfolios WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match raw {
            Some((positions, orders, history)) => Ok(Portfolio {
                positions: serde_json::from_str(&positions)?,
                orders: serde_json::from_str(&orders)?,
                history: serde_json::from_str(&history)?,
            }),
            None => Ok(Portfolio::default()),
        }
    }

    /// Run a ledger mutation atomically.
    ///
    /// The balance and portfolio are loaded, handed to `f`, and written back
    /// only if `f` succeeds. The connection lock is held throughout, so
    /// concurrent mutations of one account never interleave.
    pub fn with_portfolio<T, F>(&self, user_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Decimal, &mut Portfolio) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let balance: Option<String> = tx
            .query_row(
                "SELECT balance FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(balance) = balance else {
            return Err(TradingError::AccountNotFound(user_id.to_string()));
        };
        let mut balance = parse_balance(&balance)?;
        let mut portfolio = Self::read_portfolio(&tx, user_id)?;

        let out = f(&mut balance, &mut portfolio)?;

        tx.execute(
            "UPDATE users SET balance = ?1 WHERE id = ?2",
            params![balance.to_string(), user_id],
        )?;
        tx.execute(
            r#"
            INSERT INTO portfolios (user_id, positions, orders, history, updated_at)
            VALUES (?1, ?2, ?3, ?4, strftime('%s', 'now'))
            ON CONFLICT(user_id) DO UPDATE SET
                positions = excluded.positions,
                orders = excluded.orders,
                history = excluded.history,
                updated_at = excluded.updated_at
            "#,
            params![
                user_id,
                serde_json::to_string(&portfolio.positions)?,
                serde_json::to_string(&portfolio.orders)?,
                serde_json::to_string(&portfolio.history)?,
            ],
        )?;
        tx.commit()?;

        Ok(out)
    }
}
