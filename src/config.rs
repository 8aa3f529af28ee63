//! Configuration documents and atomic snapshots
//!
//! Charge tiers and commission rules are admin-edited tables maintained by
//! an external configuration collaborator. They arrive as decimal
//! major-currency values and percentage rates; loading converts them to
//! integer minor units and basis points exactly, rejecting anything with a
//! fractional remainder. The engine only ever sees an immutable
//! [`ConfigSnapshot`], swapped wholesale on reload.

use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::charges::{ChargeSchedule, ChargeTier};
use crate::commission::{CommissionBasis, CommissionRule, CommissionSchedule};
use crate::types::{CommissionRole, LedgerError, LedgerResult, TransactionType};

/// Decimal places between major and minor currency units (e.g. 2 for
/// cents)
pub const CURRENCY_SCALE: i64 = 2;

/// Convert a decimal major-unit amount to minor units, exactly.
///
/// `12.34` becomes `1234`; `12.345` is rejected rather than rounded, per
/// the no-floating-point-money rule.
pub fn to_minor_units(value: &BigDecimal) -> LedgerResult<i64> {
    let scaled = value * BigDecimal::from(10_i64.pow(CURRENCY_SCALE as u32));
    if !scaled.is_integer() {
        return Err(LedgerError::InvalidConfig(format!(
            "amount {} does not convert exactly to minor units",
            value
        )));
    }
    scaled.to_i64().ok_or_else(|| {
        LedgerError::InvalidConfig(format!("amount {} overflows minor units", value))
    })
}

/// Convert a decimal percentage to integer basis points, exactly.
///
/// `30` becomes `3000`; `1.5` becomes `150`; `0.005` is rejected.
pub fn to_basis_points(percent: &BigDecimal) -> LedgerResult<u32> {
    let scaled = percent * BigDecimal::from(100);
    if !scaled.is_integer() {
        return Err(LedgerError::InvalidConfig(format!(
            "rate {}% does not convert exactly to basis points",
            percent
        )));
    }
    scaled
        .to_u32()
        .ok_or_else(|| LedgerError::InvalidConfig(format!("rate {}% is out of range", percent)))
}

/// One charge tier as maintained by the configuration collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeTierSpec {
    pub tx_type: TransactionType,
    /// Inclusive lower bound in major units
    pub min_amount: BigDecimal,
    /// Inclusive upper bound in major units
    pub max_amount: BigDecimal,
    /// Flat fee in major units
    pub charge: BigDecimal,
}

/// How a commission rule's value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionBasisKind {
    Flat,
    RateOfCharge,
    RateOfAmount,
}

/// One commission rule as maintained by the configuration collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionRuleSpec {
    pub tx_type: TransactionType,
    pub role: CommissionRole,
    pub basis: CommissionBasisKind,
    /// Major units for `Flat`, a percentage for the rate bases
    pub value: BigDecimal,
}

/// The full admin-maintained configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub charge_tiers: Vec<ChargeTierSpec>,
    #[serde(default)]
    pub commission_rules: Vec<CommissionRuleSpec>,
}

/// Immutable, validated configuration the engine executes against
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    pub charges: ChargeSchedule,
    pub commissions: CommissionSchedule,
}

impl ConfigSnapshot {
    /// Validate a configuration document into a snapshot
    pub fn load(document: &ConfigDocument) -> LedgerResult<Self> {
        let mut tiers = Vec::with_capacity(document.charge_tiers.len());
        for spec in &document.charge_tiers {
            tiers.push(ChargeTier::new(
                spec.tx_type,
                to_minor_units(&spec.min_amount)?,
                to_minor_units(&spec.max_amount)?,
                to_minor_units(&spec.charge)?,
            ));
        }

        let mut rules = Vec::with_capacity(document.commission_rules.len());
        for spec in &document.commission_rules {
            let basis = match spec.basis {
                CommissionBasisKind::Flat => CommissionBasis::Flat(to_minor_units(&spec.value)?),
                CommissionBasisKind::RateOfCharge => {
                    CommissionBasis::RateOfCharge(to_basis_points(&spec.value)?)
                }
                CommissionBasisKind::RateOfAmount => {
                    CommissionBasis::RateOfAmount(to_basis_points(&spec.value)?)
                }
            };
            rules.push(CommissionRule::new(spec.tx_type, spec.role, basis));
        }

        Ok(Self {
            charges: ChargeSchedule::new(tiers)?,
            commissions: CommissionSchedule::new(rules)?,
        })
    }

    /// Snapshot from already-minor-unit tables, for embedded setups and
    /// tests
    pub fn from_tables(
        tiers: Vec<ChargeTier>,
        rules: Vec<CommissionRule>,
    ) -> LedgerResult<Self> {
        Ok(Self {
            charges: ChargeSchedule::new(tiers)?,
            commissions: CommissionSchedule::new(rules)?,
        })
    }
}
