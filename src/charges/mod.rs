//! Tiered transaction charge calculation
//!
//! Charges are flat fees resolved from an admin-managed table of closed
//! amount ranges per transaction type. The table is validated once at load
//! time; lookups are pure, so the same type and amount always produce the
//! same fee.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{LedgerError, LedgerResult, TransactionType};

/// One charge band: a closed amount interval mapped to a flat fee, all in
/// minor currency units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeTier {
    pub tx_type: TransactionType,
    pub min_amount: i64,
    pub max_amount: i64,
    pub charge: i64,
}

impl ChargeTier {
    pub fn new(tx_type: TransactionType, min_amount: i64, max_amount: i64, charge: i64) -> Self {
        Self {
            tx_type,
            min_amount,
            max_amount,
            charge,
        }
    }

    /// Whether an amount falls inside this tier's closed interval
    pub fn contains(&self, amount: i64) -> bool {
        amount >= self.min_amount && amount <= self.max_amount
    }
}

/// Validated, immutable charge table
///
/// Per transaction type the tiers must be non-overlapping and contiguous:
/// sorted by lower bound, each tier starting exactly one minor unit above
/// the previous tier's upper bound. The table is replaced wholesale on
/// configuration reload, never edited in place.
#[derive(Debug, Clone, Default)]
pub struct ChargeSchedule {
    tiers: HashMap<TransactionType, Vec<ChargeTier>>,
}

impl ChargeSchedule {
    /// Build a schedule, validating the tier layout per type
    pub fn new(mut tiers: Vec<ChargeTier>) -> LedgerResult<Self> {
        tiers.sort_by_key(|t| (t.tx_type.id_prefix(), t.min_amount));

        let mut by_type: HashMap<TransactionType, Vec<ChargeTier>> = HashMap::new();
        for tier in tiers {
            if !tier.tx_type.is_chargeable() {
                return Err(LedgerError::InvalidConfig(format!(
                    "charge tier configured for non-chargeable type {:?}",
                    tier.tx_type
                )));
            }
            if tier.min_amount <= 0 || tier.max_amount < tier.min_amount {
                return Err(LedgerError::InvalidConfig(format!(
                    "invalid tier range [{}, {}] for {:?}",
                    tier.min_amount, tier.max_amount, tier.tx_type
                )));
            }
            if tier.charge < 0 {
                return Err(LedgerError::InvalidConfig(format!(
                    "negative charge {} for {:?}",
                    tier.charge, tier.tx_type
                )));
            }

            let entry = by_type.entry(tier.tx_type).or_default();
            if let Some(prev) = entry.last() {
                if tier.min_amount != prev.max_amount + 1 {
                    return Err(LedgerError::InvalidConfig(format!(
                        "tiers for {:?} are not contiguous: [{}, {}] follows [{}, {}]",
                        tier.tx_type,
                        tier.min_amount,
                        tier.max_amount,
                        prev.min_amount,
                        prev.max_amount
                    )));
                }
            }
            entry.push(tier);
        }

        Ok(Self { tiers: by_type })
    }

    /// Resolve the fee for a transaction type and amount.
    ///
    /// Non-chargeable types always cost zero. For chargeable types the
    /// amount must fall in exactly one configured tier; a gap in the table
    /// is a configuration error surfaced as `NoTierConfigured`, never a
    /// free transaction.
    pub fn charge_for(&self, tx_type: TransactionType, amount: i64) -> LedgerResult<i64> {
        if !tx_type.is_chargeable() {
            return Ok(0);
        }

        self.tiers
            .get(&tx_type)
            .and_then(|tiers| tiers.iter().find(|t| t.contains(amount)))
            .map(|t| t.charge)
            .ok_or(LedgerError::NoTierConfigured { tx_type, amount })
    }

    /// Tiers configured for a type, sorted by lower bound
    pub fn tiers_for(&self, tx_type: TransactionType) -> &[ChargeTier] {
        self.tiers.get(&tx_type).map(Vec::as_slice).unwrap_or(&[])
    }
}
