//! Posting set construction and validation
//!
//! Every balance movement is expressed as a zero-sum group of signed
//! entries committed under one transaction id. The builder validates the
//! group before it ever reaches a store; the `patterns` module holds the
//! canonical posting shapes for each transaction type.

use crate::types::*;

/// Builder for a zero-sum group of posting entries
#[derive(Debug)]
pub struct PostingSetBuilder {
    transaction_id: String,
    entries: Vec<PostingEntry>,
}

impl PostingSetBuilder {
    pub fn new(transaction_id: String) -> Self {
        Self {
            transaction_id,
            entries: Vec::new(),
        }
    }

    /// Add a debit (negative movement) against an account
    pub fn debit(mut self, account_id: String, amount: i64) -> Self {
        self.entries
            .push(PostingEntry::new(account_id, -amount, PostingKind::Debit));
        self
    }

    /// Add a credit (positive movement) to an account
    pub fn credit(mut self, account_id: String, amount: i64) -> Self {
        self.entries
            .push(PostingEntry::new(account_id, amount, PostingKind::Credit));
        self
    }

    /// Add a charge credit to the charge-collection account
    pub fn charge(mut self, account_id: String, amount: i64) -> Self {
        self.entries
            .push(PostingEntry::new(account_id, amount, PostingKind::Charge));
        self
    }

    /// Add a pre-signed entry
    pub fn entry(mut self, entry: PostingEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Validate and return the entries.
    ///
    /// A posting set needs at least two entries, no zero-amount entries,
    /// and signed amounts summing to zero.
    pub fn build(self) -> LedgerResult<Vec<PostingEntry>> {
        if self.entries.len() < 2 {
            return Err(LedgerError::Validation(
                "posting set must have at least two entries".to_string(),
            ));
        }
        for entry in &self.entries {
            if entry.amount == 0 {
                return Err(LedgerError::Validation(format!(
                    "zero-amount posting against account '{}'",
                    entry.account_id
                )));
            }
        }
        let net: i64 = self.entries.iter().map(|e| e.amount).sum();
        if net != 0 {
            return Err(LedgerError::UnbalancedPostings {
                transaction_id: self.transaction_id,
                net,
            });
        }
        Ok(self.entries)
    }
}

/// Canonical posting shapes for each transaction type
pub mod patterns {
    use super::*;

    /// Send money: sender pays amount plus charge, receiver gets the
    /// amount, the charge lands in charge collection
    pub fn send_money(
        transaction_id: &str,
        sender: &str,
        receiver: &str,
        charge_collection: &str,
        amount: i64,
        charge: i64,
    ) -> LedgerResult<Vec<PostingEntry>> {
        let builder = PostingSetBuilder::new(transaction_id.to_string())
            .debit(sender.to_string(), amount + charge)
            .credit(receiver.to_string(), amount);
        with_charge(builder, charge_collection, charge).build()
    }

    /// Cash withdrawal at an agent: the customer pays amount plus charge
    /// and the agent's float draws down by the amount; the cash-out
    /// settlement account absorbs the redeemed e-value and the float
    /// drawdown, keeping the group zero-sum
    pub fn withdrawal(
        transaction_id: &str,
        customer: &str,
        agent_float: &str,
        settlement: &str,
        charge_collection: &str,
        amount: i64,
        charge: i64,
    ) -> LedgerResult<Vec<PostingEntry>> {
        let builder = PostingSetBuilder::new(transaction_id.to_string())
            .debit(customer.to_string(), amount + charge)
            .debit(agent_float.to_string(), amount)
            .credit(settlement.to_string(), amount * 2);
        with_charge(builder, charge_collection, charge).build()
    }

    /// Cash deposit through an agent: float converts to customer e-money;
    /// deposits carry no charge
    pub fn deposit(
        transaction_id: &str,
        agent_float: &str,
        customer: &str,
        amount: i64,
    ) -> LedgerResult<Vec<PostingEntry>> {
        PostingSetBuilder::new(transaction_id.to_string())
            .debit(agent_float.to_string(), amount)
            .credit(customer.to_string(), amount)
            .build()
    }

    /// PayBill or Buy Goods: payer covers amount plus charge, the merchant
    /// settlement account receives the amount
    pub fn merchant_payment(
        transaction_id: &str,
        payer: &str,
        settlement: &str,
        charge_collection: &str,
        amount: i64,
        charge: i64,
    ) -> LedgerResult<Vec<PostingEntry>> {
        let builder = PostingSetBuilder::new(transaction_id.to_string())
            .debit(payer.to_string(), amount + charge)
            .credit(settlement.to_string(), amount);
        with_charge(builder, charge_collection, charge).build()
    }

    /// Airtime purchase: buyer funds the airtime clearing account, no charge
    pub fn airtime(
        transaction_id: &str,
        buyer: &str,
        clearing: &str,
        amount: i64,
    ) -> LedgerResult<Vec<PostingEntry>> {
        PostingSetBuilder::new(transaction_id.to_string())
            .debit(buyer.to_string(), amount)
            .credit(clearing.to_string(), amount)
            .build()
    }

    /// Simple two-leg transfer (loan disbursement/repayment, float
    /// replenishment)
    pub fn transfer(
        transaction_id: &str,
        from: &str,
        to: &str,
        amount: i64,
    ) -> LedgerResult<Vec<PostingEntry>> {
        PostingSetBuilder::new(transaction_id.to_string())
            .debit(from.to_string(), amount)
            .credit(to.to_string(), amount)
            .build()
    }

    /// Exact negation of previously committed postings, for reversals
    pub fn negation(postings: &[Posting]) -> Vec<PostingEntry> {
        postings
            .iter()
            .map(|p| {
                let kind = match p.kind {
                    PostingKind::Debit => PostingKind::Credit,
                    PostingKind::Credit => PostingKind::Debit,
                    other => other,
                };
                PostingEntry::new(p.account_id.clone(), -p.amount, kind)
            })
            .collect()
    }

    fn with_charge(
        builder: PostingSetBuilder,
        charge_collection: &str,
        charge: i64,
    ) -> PostingSetBuilder {
        if charge > 0 {
            builder.charge(charge_collection.to_string(), charge)
        } else {
            builder
        }
    }
}
