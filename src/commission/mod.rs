//! Commission calculation and distribution
//!
//! Agents earn commission on deposits and withdrawals, merchants on
//! PayBill and Buy Goods receipts. A rule is keyed by transaction type and
//! role and pays either a flat amount or an integer basis-point rate
//! against the charge or the transaction amount. Distribution posts a
//! zero-sum entry from the system commission-funding account to the
//! earner's wallet, under the original transaction id, and is idempotent
//! per transaction.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::traits::LedgerStore;
use crate::types::*;

/// How a commission amount is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommissionBasis {
    /// Fixed amount in minor units
    Flat(i64),
    /// Basis points of the transaction charge (3000 = 30%)
    RateOfCharge(u32),
    /// Basis points of the transaction amount
    RateOfAmount(u32),
}

impl CommissionBasis {
    /// Commission in minor units for a given amount and charge; rates use
    /// floor division so fractional minor units are never created
    pub fn apply(&self, amount: i64, charge: i64) -> i64 {
        match self {
            CommissionBasis::Flat(value) => *value,
            CommissionBasis::RateOfCharge(bps) => charge * i64::from(*bps) / 10_000,
            CommissionBasis::RateOfAmount(bps) => amount * i64::from(*bps) / 10_000,
        }
    }
}

/// One commission rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRule {
    pub tx_type: TransactionType,
    pub role: CommissionRole,
    pub basis: CommissionBasis,
}

impl CommissionRule {
    pub fn new(tx_type: TransactionType, role: CommissionRole, basis: CommissionBasis) -> Self {
        Self {
            tx_type,
            role,
            basis,
        }
    }
}

/// Validated, immutable commission rule table
///
/// One rule per (type, role). How commission splits across a super-agent
/// hierarchy is an open product question; only the direct counterparty's
/// rule is modelled here.
#[derive(Debug, Clone, Default)]
pub struct CommissionSchedule {
    rules: HashMap<(TransactionType, CommissionRole), CommissionBasis>,
}

impl CommissionSchedule {
    /// Build a schedule, rejecting duplicate and misdirected rules
    pub fn new(rules: Vec<CommissionRule>) -> LedgerResult<Self> {
        let mut by_key = HashMap::new();
        for rule in rules {
            match rule.tx_type.commission_role() {
                Some(role) if role == rule.role => {}
                _ => {
                    return Err(LedgerError::InvalidConfig(format!(
                        "commission rule for {:?} does not apply to role {:?}",
                        rule.tx_type, rule.role
                    )));
                }
            }
            if let CommissionBasis::Flat(value) = rule.basis {
                if value < 0 {
                    return Err(LedgerError::InvalidConfig(format!(
                        "negative flat commission {} for {:?}",
                        value, rule.tx_type
                    )));
                }
            }
            if by_key.insert((rule.tx_type, rule.role), rule.basis).is_some() {
                return Err(LedgerError::InvalidConfig(format!(
                    "duplicate commission rule for {:?}/{:?}",
                    rule.tx_type, rule.role
                )));
            }
        }
        Ok(Self { rules: by_key })
    }

    /// Resolve the rule for a type and role; `CommissionRuleMissing` if the
    /// type qualifies but no rule is configured
    pub fn basis_for(
        &self,
        tx_type: TransactionType,
        role: CommissionRole,
    ) -> LedgerResult<CommissionBasis> {
        self.rules
            .get(&(tx_type, role))
            .copied()
            .ok_or(LedgerError::CommissionRuleMissing { tx_type, role })
    }
}

/// Posts commission earnings from completed transactions
pub struct CommissionDistributor<S: LedgerStore> {
    store: Arc<S>,
    /// System account funding all commission payouts
    funding_account: String,
}

impl<S: LedgerStore> CommissionDistributor<S> {
    pub fn new(store: Arc<S>, funding_account: String) -> Self {
        Self {
            store,
            funding_account,
        }
    }

    /// Role implied by the counterparty's account kind, if any
    pub fn role_of(counterparty: &Account) -> Option<CommissionRole> {
        match counterparty.kind {
            AccountKind::AgentFloat => Some(CommissionRole::Agent),
            AccountKind::MerchantSettlement => Some(CommissionRole::Merchant),
            _ => None,
        }
    }

    /// Compute and post the commission entry for a completed transaction.
    ///
    /// The earnings land in the counterparty owner's wallet, funded by the
    /// system commission account. Re-invocation for a transaction that
    /// already carries commission postings is a no-op returning the
    /// existing postings. A zero commission posts nothing.
    pub async fn distribute(
        &self,
        transaction: &Transaction,
        counterparty: &Account,
        schedule: &CommissionSchedule,
    ) -> LedgerResult<Vec<Posting>> {
        let role = match transaction.tx_type.commission_role() {
            Some(role) => role,
            None => return Ok(Vec::new()),
        };

        let existing: Vec<Posting> = self
            .store
            .postings_for(&transaction.id)
            .await?
            .into_iter()
            .filter(|p| p.kind == PostingKind::Commission)
            .collect();
        if !existing.is_empty() {
            debug!(transaction_id = %transaction.id, "commission already distributed");
            return Ok(existing);
        }

        let basis = schedule.basis_for(transaction.tx_type, role)?;
        let commission = basis.apply(transaction.amount, transaction.charge);
        if commission == 0 {
            return Ok(Vec::new());
        }

        let earnings_account = self
            .store
            .find_account_by_owner(&counterparty.owner, AccountKind::CustomerWallet)
            .await?
            .ok_or_else(|| {
                LedgerError::AccountNotFound(format!(
                    "earnings wallet for owner '{}'",
                    counterparty.owner
                ))
            })?;

        let entries = vec![
            PostingEntry::new(
                self.funding_account.clone(),
                -commission,
                PostingKind::Commission,
            ),
            PostingEntry::new(earnings_account.id, commission, PostingKind::Commission),
        ];

        debug!(
            transaction_id = %transaction.id,
            ?role,
            commission,
            "distributing commission"
        );
        self.store.post(&transaction.id, &entries).await
    }
}
