//! Rolling daily and monthly debit limit enforcement
//!
//! Totals reset at calendar boundaries (midnight and the first of the
//! month, UTC), not on elapsed-time windows. A check places a tentative
//! reservation keyed by transaction id; the owning transaction must commit
//! or release it, so failed transactions never consume limit headroom.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::debug;

use crate::types::{Account, LedgerError, LedgerResult, LimitScope};

/// Rolling aggregates for one account
#[derive(Debug, Clone, Default)]
struct LimitWindow {
    day: Option<NaiveDate>,
    daily_total: i64,
    month: Option<(i32, u32)>,
    monthly_total: i64,
    /// Tentative debits by transaction id, counted against both windows
    reservations: HashMap<String, i64>,
}

impl LimitWindow {
    /// Reset any window whose calendar period has rolled over
    fn roll(&mut self, at: DateTime<Utc>) {
        let today = at.date_naive();
        if self.day != Some(today) {
            self.day = Some(today);
            self.daily_total = 0;
        }
        let month = (today.year(), today.month());
        if self.month != Some(month) {
            self.month = Some(month);
            self.monthly_total = 0;
        }
    }

    fn reserved(&self) -> i64 {
        self.reservations.values().sum()
    }
}

/// Tracks per-account rolling debit totals and enforces the account's caps
#[derive(Debug, Default)]
pub struct LimitEnforcer {
    windows: RwLock<HashMap<String, LimitWindow>>,
}

impl LimitEnforcer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the account's daily and monthly caps and reserve headroom for
    /// the transaction.
    ///
    /// Fails with `LimitExceeded` and performs no mutation if the
    /// committed total plus outstanding reservations plus `amount` would
    /// breach either cap. The reservation stays tentative until
    /// [`LimitEnforcer::commit`] or [`LimitEnforcer::release`].
    pub fn check_and_reserve(
        &self,
        account: &Account,
        transaction_id: &str,
        amount: i64,
        at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let mut windows = self.windows.write().expect("limit windows poisoned");
        let window = windows.entry(account.id.clone()).or_default();
        window.roll(at);

        let reserved = window.reserved();
        let daily_projected = window.daily_total + reserved + amount;
        if daily_projected > account.daily_limit {
            return Err(LedgerError::LimitExceeded {
                scope: LimitScope::Daily,
                limit: account.daily_limit,
                attempted: daily_projected,
            });
        }
        let monthly_projected = window.monthly_total + reserved + amount;
        if monthly_projected > account.monthly_limit {
            return Err(LedgerError::LimitExceeded {
                scope: LimitScope::Monthly,
                limit: account.monthly_limit,
                attempted: monthly_projected,
            });
        }

        window
            .reservations
            .insert(transaction_id.to_string(), amount);
        debug!(account_id = %account.id, transaction_id, amount, "limit reserved");
        Ok(())
    }

    /// Fold a reservation into the committed totals; idempotent per
    /// transaction id
    pub fn commit(&self, account_id: &str, transaction_id: &str, at: DateTime<Utc>) {
        let mut windows = self.windows.write().expect("limit windows poisoned");
        if let Some(window) = windows.get_mut(account_id) {
            if let Some(amount) = window.reservations.remove(transaction_id) {
                window.roll(at);
                window.daily_total += amount;
                window.monthly_total += amount;
            }
        }
    }

    /// Drop a reservation without consuming headroom; idempotent per
    /// transaction id
    pub fn release(&self, account_id: &str, transaction_id: &str) {
        let mut windows = self.windows.write().expect("limit windows poisoned");
        if let Some(window) = windows.get_mut(account_id) {
            window.reservations.remove(transaction_id);
        }
    }

    /// Committed debit total in the given scope, for reporting
    pub fn committed_total(&self, account_id: &str, scope: LimitScope, at: DateTime<Utc>) -> i64 {
        let mut windows = self.windows.write().expect("limit windows poisoned");
        let window = windows.entry(account_id.to_string()).or_default();
        window.roll(at);
        match scope {
            LimitScope::Daily => window.daily_total,
            LimitScope::Monthly => window.monthly_total,
        }
    }
}
