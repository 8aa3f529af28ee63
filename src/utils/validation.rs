//! Validation utilities

use crate::types::{LedgerError, LedgerResult};

/// Validate that a requested amount is a positive number of minor units
pub fn validate_amount(amount: i64) -> LedgerResult<()> {
    if amount <= 0 {
        Err(LedgerError::Validation(
            "amount must be a positive number of minor units".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate that an account id is well formed
pub fn validate_account_id(account_id: &str) -> LedgerResult<()> {
    if account_id.trim().is_empty() {
        return Err(LedgerError::Validation(
            "account id cannot be empty".to_string(),
        ));
    }

    if account_id.len() > 50 {
        return Err(LedgerError::Validation(
            "account id cannot exceed 50 characters".to_string(),
        ));
    }

    if !account_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(LedgerError::Validation(
            "account id can only contain alphanumeric characters, dashes, and underscores"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validate that an owner reference is well formed
pub fn validate_owner(owner: &str) -> LedgerResult<()> {
    if owner.trim().is_empty() {
        return Err(LedgerError::Validation(
            "owner reference cannot be empty".to_string(),
        ));
    }

    if owner.len() > 100 {
        return Err(LedgerError::Validation(
            "owner reference cannot exceed 100 characters".to_string(),
        ));
    }

    Ok(())
}
