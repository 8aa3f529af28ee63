//! # Wallet Core
//!
//! The ledger and transaction engine of a mobile-money service: moves
//! value between customer wallets, agent float, and merchant settlement
//! accounts with double-entry postings, tiered charges, commission
//! distribution, rolling limit enforcement, and reversal support.
//!
//! ## Features
//!
//! - **Double-entry postings**: every movement is a zero-sum group applied
//!   atomically under canonical per-account lock ordering
//! - **Integer money**: balances and fees are `i64` minor currency units;
//!   decimals exist only at the configuration boundary and must convert
//!   exactly
//! - **Tiered charges**: flat fees resolved from validated, contiguous
//!   amount bands per transaction type
//! - **Commissions**: agent and merchant earnings posted zero-sum and
//!   idempotently per transaction
//! - **Limits**: rolling daily and monthly debit caps with
//!   reserve/commit/release semantics
//! - **Reversals**: exact posting negation within a configured window
//! - **Storage abstraction**: database-agnostic `LedgerStore` trait with a
//!   reference in-memory implementation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wallet_core::{
//!     ConfigSnapshot, MemoryStore, SystemAccounts, TransactionEngine,
//!     TransactionRequest, TransactionType,
//! };
//!
//! # async fn run() -> wallet_core::LedgerResult<()> {
//! let store = Arc::new(MemoryStore::new());
//! let engine = TransactionEngine::new(
//!     store,
//!     ConfigSnapshot::default(),
//!     SystemAccounts::default(),
//! );
//!
//! let result = engine
//!     .execute(TransactionRequest {
//!         tx_type: TransactionType::Deposit,
//!         initiator: "FLOAT001".to_string(),
//!         counterparty: "WALLET001".to_string(),
//!         amount: 50_000,
//!         idempotency_key: "req-1".to_string(),
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod charges;
pub mod commission;
pub mod config;
pub mod ledger;
pub mod limits;
pub mod loans;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use charges::*;
pub use commission::*;
pub use config::{ConfigDocument, ConfigSnapshot};
pub use ledger::*;
pub use limits::*;
pub use loans::*;
pub use traits::*;
pub use types::*;
pub use utils::MemoryStore;

// Re-export posting patterns for convenience
pub use ledger::posting::patterns;
