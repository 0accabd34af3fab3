//! Credential ledger
//!
//! The persisted credential/balance store is an external collaborator; the
//! core only checks that an owner can pay before starting work and deducts on
//! success. [`MemoryLedger`] is the reference implementation used by the CLI
//! and tests.

use crate::error::{AuthError, Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A credential account as seen by the core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Remaining balance
    pub balance: f64,
    /// Whether the key belongs to the deployment owner (owner keys are never
    /// charged)
    pub is_owner: bool,
    /// Optional expiry
    pub expires_at: Option<DateTime<Utc>>,
}

/// Storage-agnostic credential ledger interface
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Look up an account by credential key
    async fn lookup(&self, key: &str) -> Option<Account>;

    /// Deduct `amount` from the account, returning the new balance
    async fn deduct(&self, key: &str, amount: f64) -> Result<f64>;

    /// Credit `amount` to the account, returning the new balance
    async fn credit(&self, key: &str, amount: f64) -> Result<f64>;
}

/// In-memory ledger
#[derive(Default)]
pub struct MemoryLedger {
    accounts: Mutex<HashMap<String, Account>>,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account
    pub fn insert(&self, key: impl Into<String>, account: Account) {
        self.accounts.lock().insert(key.into(), account);
    }

    /// Seed a plain account with the given balance
    pub fn seed(&self, key: impl Into<String>, balance: f64) {
        self.insert(
            key,
            Account {
                balance,
                is_owner: false,
                expires_at: None,
            },
        );
    }
}

#[async_trait]
impl CreditLedger for MemoryLedger {
    async fn lookup(&self, key: &str) -> Option<Account> {
        self.accounts.lock().get(key).cloned()
    }

    async fn deduct(&self, key: &str, amount: f64) -> Result<f64> {
        let mut accounts = self.accounts.lock();
        let account = accounts
            .get_mut(key)
            .ok_or(Error::Auth(AuthError::UnknownKey))?;

        if account.is_owner {
            return Ok(account.balance);
        }
        if account.balance < amount {
            return Err(Error::Auth(AuthError::InsufficientBalance(account.balance)));
        }
        account.balance -= amount;
        Ok(account.balance)
    }

    async fn credit(&self, key: &str, amount: f64) -> Result<f64> {
        let mut accounts = self.accounts.lock();
        let account = accounts
            .get_mut(key)
            .ok_or(Error::Auth(AuthError::UnknownKey))?;
        account.balance += amount;
        Ok(account.balance)
    }
}

/// Check that a key exists, is unexpired, and can cover `amount`.
///
/// Shared pre-flight used before any task record is created.
pub async fn authorize(ledger: &dyn CreditLedger, key: &str, amount: f64) -> Result<Account> {
    let account = ledger
        .lookup(key)
        .await
        .ok_or(Error::Auth(AuthError::UnknownKey))?;

    if let Some(expires) = account.expires_at {
        if expires < Utc::now() {
            return Err(Error::Auth(AuthError::Expired));
        }
    }
    if !account.is_owner && account.balance < amount {
        return Err(Error::Auth(AuthError::InsufficientBalance(account.balance)));
    }
    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_lookup_and_deduct() {
        let ledger = MemoryLedger::new();
        ledger.seed("key-1", 1.0);

        let account = ledger.lookup("key-1").await.unwrap();
        assert_eq!(account.balance, 1.0);

        let remaining = ledger.deduct("key-1", 0.25).await.unwrap();
        assert_eq!(remaining, 0.75);
    }

    #[tokio::test]
    async fn test_deduct_insufficient() {
        let ledger = MemoryLedger::new();
        ledger.seed("key-1", 0.1);

        let err = ledger.deduct("key-1", 0.5).await.unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::InsufficientBalance(_))));
    }

    #[tokio::test]
    async fn test_owner_keys_not_charged() {
        let ledger = MemoryLedger::new();
        ledger.insert(
            "owner",
            Account {
                balance: 0.0,
                is_owner: true,
                expires_at: None,
            },
        );

        let balance = ledger.deduct("owner", 5.0).await.unwrap();
        assert_eq!(balance, 0.0);
        assert!(authorize(&ledger, "owner", 5.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_authorize_unknown_and_expired() {
        let ledger = MemoryLedger::new();
        let err = authorize(&ledger, "nope", 0.1).await.unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::UnknownKey)));

        ledger.insert(
            "stale",
            Account {
                balance: 10.0,
                is_owner: false,
                expires_at: Some(Utc::now() - ChronoDuration::hours(1)),
            },
        );
        let err = authorize(&ledger, "stale", 0.1).await.unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::Expired)));
    }

    #[tokio::test]
    async fn test_credit() {
        let ledger = MemoryLedger::new();
        ledger.seed("key-1", 1.0);
        let balance = ledger.credit("key-1", 0.5).await.unwrap();
        assert_eq!(balance, 1.5);
    }
}
