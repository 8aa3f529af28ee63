//! Reversal of completed transactions
//!
//! A reversal is itself a transaction: a fresh "RV"-prefixed row whose
//! postings are the exact negation of the original's, commission postings
//! included, linked to the original in both directions. Eligibility is
//! checked before any mutation, and the negated posting group is subject
//! to the same atomicity and balance-floor rules as a forward transaction.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::ledger::posting::patterns;
use crate::traits::LedgerStore;
use crate::types::*;

/// Inverts previously completed transactions under defined eligibility
/// rules
pub struct ReversalProcessor<S: LedgerStore> {
    store: Arc<S>,
    window_days: i64,
}

impl<S: LedgerStore> ReversalProcessor<S> {
    pub fn new(store: Arc<S>, window_days: i64) -> Self {
        Self { store, window_days }
    }

    /// Reverse a completed transaction.
    ///
    /// The target must be `Completed`, not already reversed, not itself a
    /// reversal, and within the reversal window measured from its
    /// completion time. On success both rows are linked and all affected
    /// balances return to their pre-transaction values.
    pub async fn reverse(
        &self,
        transaction_id: &str,
        reason: &str,
    ) -> LedgerResult<TransactionResult> {
        let mut original = self
            .store
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::TransactionNotFound(transaction_id.to_string()))?;

        if original.status == TransactionStatus::Reversed || original.reversed_by.is_some() {
            return Err(LedgerError::AlreadyReversed(transaction_id.to_string()));
        }
        if original.reversal_of.is_some() {
            return Err(LedgerError::Validation(format!(
                "transaction '{}' is itself a reversal",
                transaction_id
            )));
        }
        if original.status != TransactionStatus::Completed {
            return Err(LedgerError::Validation(format!(
                "transaction '{}' is {:?}; only completed transactions can be reversed",
                transaction_id, original.status
            )));
        }

        let completed_at = original.completed_at.ok_or_else(|| {
            LedgerError::Storage(format!(
                "completed transaction '{}' has no completion timestamp",
                transaction_id
            ))
        })?;
        let now = Utc::now();
        if now - completed_at > Duration::days(self.window_days) {
            return Err(LedgerError::ReversalWindowExpired {
                transaction_id: transaction_id.to_string(),
            });
        }

        // One reversal per original, also across processes: the reversal
        // row's idempotency key is derived from the original id
        let reversal_key = format!("reversal:{}", original.id);
        if let Some(existing) = self.store.find_by_idempotency_key(&reversal_key).await? {
            if existing.status != TransactionStatus::Failed {
                return Err(LedgerError::AlreadyReversed(transaction_id.to_string()));
            }
        }

        let original_postings = self.store.postings_for(&original.id).await?;
        if original_postings.is_empty() {
            return Err(LedgerError::Storage(format!(
                "completed transaction '{}' has no postings",
                transaction_id
            )));
        }
        let entries = patterns::negation(&original_postings);

        let mut reversal = Transaction {
            id: Transaction::generate_id_with_prefix("RV"),
            tx_type: original.tx_type,
            initiator: original.counterparty.clone(),
            counterparty: original.initiator.clone(),
            amount: original.amount,
            charge: original.charge,
            status: TransactionStatus::Created,
            failure_reason: None,
            idempotency_key: reversal_key,
            description: Some(reason.to_string()),
            reversal_of: Some(original.id.clone()),
            reversed_by: None,
            created_at: now,
            completed_at: None,
        };
        self.store.save_transaction(&reversal).await?;

        let postings = match self.store.post(&reversal.id, &entries).await {
            Ok(postings) => postings,
            Err(err) => {
                warn!(
                    transaction_id,
                    reversal_id = %reversal.id,
                    error = %err,
                    "reversal posting failed"
                );
                reversal.status = TransactionStatus::Failed;
                reversal.failure_reason = Some(err.to_string());
                reversal.completed_at = Some(Utc::now());
                self.store.update_transaction(&reversal).await?;
                // A later attempt may succeed (e.g. once the counterparty
                // is funded again); free the derived key for it
                self.store
                    .clear_idempotency_key(&reversal.idempotency_key)
                    .await?;
                return Err(err);
            }
        };

        reversal.status = TransactionStatus::Completed;
        reversal.completed_at = Some(Utc::now());
        self.store.update_transaction(&reversal).await?;

        original.status = TransactionStatus::Reversed;
        original.reversed_by = Some(reversal.id.clone());
        self.store.update_transaction(&original).await?;

        info!(
            transaction_id,
            reversal_id = %reversal.id,
            reason,
            "transaction reversed"
        );
        Ok(TransactionResult {
            transaction: reversal,
            postings,
        })
    }
}
