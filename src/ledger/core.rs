//! The transaction engine: orchestrates validation, charging, limit
//! enforcement, posting, commission distribution, and notification for
//! every money movement

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::commission::CommissionDistributor;
use crate::config::ConfigSnapshot;
use crate::ledger::account::{AccountManager, SystemAccounts};
use crate::ledger::posting::patterns;
use crate::ledger::reversal::ReversalProcessor;
use crate::limits::LimitEnforcer;
use crate::traits::{LedgerStore, NotificationSink, NullNotificationSink};
use crate::types::*;
use crate::utils::validation::validate_amount;

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Days after completion during which a transaction may be reversed
    pub reversal_window_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reversal_window_days: 30,
        }
    }
}

/// Orchestrates the full lifecycle of a money movement.
///
/// State machine per transaction: `Created → Validated → Locked → Posted →
/// CommissionApplied → Completed`, with `Failed` reachable from any
/// non-terminal state and `Reversed` only from `Completed` via
/// [`TransactionEngine::reverse`]. Every row, including failed attempts,
/// is retained as an audit record.
///
/// The engine is shared across concurrent tasks; all interior state is
/// synchronized, and requests sharing an idempotency key serialize on a
/// per-key mutex so a retried request never double-executes.
pub struct TransactionEngine<S: LedgerStore> {
    store: Arc<S>,
    accounts: AccountManager<S>,
    limits: LimitEnforcer,
    distributor: CommissionDistributor<S>,
    reversals: ReversalProcessor<S>,
    system: SystemAccounts,
    snapshot: RwLock<Arc<ConfigSnapshot>>,
    notifier: Arc<dyn NotificationSink>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: LedgerStore> TransactionEngine<S> {
    /// Create an engine over a store with the default configuration and no
    /// notification collaborator
    pub fn new(store: Arc<S>, snapshot: ConfigSnapshot, system: SystemAccounts) -> Self {
        Self::with_config(
            store,
            snapshot,
            system,
            EngineConfig::default(),
            Arc::new(NullNotificationSink),
        )
    }

    pub fn with_config(
        store: Arc<S>,
        snapshot: ConfigSnapshot,
        system: SystemAccounts,
        config: EngineConfig,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            accounts: AccountManager::new(store.clone()),
            distributor: CommissionDistributor::new(
                store.clone(),
                system.commission_funding.clone(),
            ),
            reversals: ReversalProcessor::new(store.clone(), config.reversal_window_days),
            limits: LimitEnforcer::new(),
            system,
            snapshot: RwLock::new(Arc::new(snapshot)),
            notifier,
            key_locks: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Atomically replace the charge and commission tables.
    ///
    /// In-flight transactions keep the snapshot they started with.
    pub fn reload_config(&self, snapshot: ConfigSnapshot) {
        *self.snapshot.write().expect("config snapshot poisoned") = Arc::new(snapshot);
        info!("configuration snapshot reloaded");
    }

    /// Account management operations
    pub fn accounts(&self) -> &AccountManager<S> {
        &self.accounts
    }

    /// Limit window state, for reporting
    pub fn limits(&self) -> &LimitEnforcer {
        &self.limits
    }

    /// The system accounts this engine posts against
    pub fn system_accounts(&self) -> &SystemAccounts {
        &self.system
    }

    /// Balance consistent with the latest committed posting
    pub async fn get_balance(&self, account_id: &str) -> LedgerResult<i64> {
        self.store.get_balance(account_id).await
    }

    /// Account statement ordered by timestamp ascending
    pub async fn statement(
        &self,
        account_id: &str,
        range: StatementRange,
    ) -> LedgerResult<Vec<Posting>> {
        self.store.statement(account_id, range).await
    }

    /// Get a transaction row by id
    pub async fn get_transaction(&self, transaction_id: &str) -> LedgerResult<Option<Transaction>> {
        self.store.get_transaction(transaction_id).await
    }

    /// Execute a money movement end to end
    pub async fn execute(&self, request: TransactionRequest) -> LedgerResult<TransactionResult> {
        validate_amount(request.amount)?;
        if request.initiator == request.counterparty {
            return Err(LedgerError::Validation(
                "initiator and counterparty must differ".to_string(),
            ));
        }
        if request.idempotency_key.trim().is_empty() {
            return Err(LedgerError::Validation(
                "idempotency key must not be empty".to_string(),
            ));
        }

        let key_lock = self.key_lock(&request.idempotency_key).await;
        let _guard = key_lock.lock().await;

        let outcome = self.execute_locked(&request).await;

        self.drop_key_lock(&request.idempotency_key, &key_lock).await;
        outcome
    }

    /// Reverse a completed transaction; see [`ReversalProcessor`]
    pub async fn reverse(
        &self,
        transaction_id: &str,
        reason: &str,
    ) -> LedgerResult<TransactionResult> {
        let result = self.reversals.reverse(transaction_id, reason).await?;
        self.emit_notifications(&result.transaction, &result.postings);
        Ok(result)
    }

    async fn execute_locked(&self, request: &TransactionRequest) -> LedgerResult<TransactionResult> {
        if let Some(prior) = self
            .store
            .find_by_idempotency_key(&request.idempotency_key)
            .await?
        {
            return self.prior_result(prior).await;
        }

        let mut txn = Transaction {
            id: Transaction::generate_id(request.tx_type),
            tx_type: request.tx_type,
            initiator: request.initiator.clone(),
            counterparty: request.counterparty.clone(),
            amount: request.amount,
            charge: 0,
            status: TransactionStatus::Created,
            failure_reason: None,
            idempotency_key: request.idempotency_key.clone(),
            description: None,
            reversal_of: None,
            reversed_by: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.store.save_transaction(&txn).await?;
        debug!(transaction_id = %txn.id, tx_type = ?txn.tx_type, "transaction created");

        match self.run(&mut txn).await {
            Ok(postings) => {
                info!(
                    transaction_id = %txn.id,
                    tx_type = ?txn.tx_type,
                    amount = txn.amount,
                    charge = txn.charge,
                    "transaction completed"
                );
                self.emit_notifications(&txn, &postings);
                Ok(TransactionResult {
                    transaction: txn,
                    postings,
                })
            }
            Err(err) => {
                self.fail(&mut txn, &err).await;
                Err(err)
            }
        }
    }

    /// Drive a created transaction to completion; on error the caller
    /// records the failure
    async fn run(&self, txn: &mut Transaction) -> LedgerResult<Vec<Posting>> {
        let snapshot = self.current_snapshot();

        // Validate
        let initiator = self.active_account(&txn.initiator).await?;
        let counterparty = self.active_account(&txn.counterparty).await?;

        txn.charge = snapshot.charges.charge_for(txn.tx_type, txn.amount)?;

        // Resolve the commission rule before any mutation so a
        // configuration gap fails the transaction cleanly. Deposits are
        // agent-initiated, so the mediating party is the initiator there
        // and the counterparty everywhere else.
        let mediator = if txn.tx_type == TransactionType::Deposit {
            &initiator
        } else {
            &counterparty
        };
        if let Some(role) = txn.tx_type.commission_role() {
            match CommissionDistributor::<S>::role_of(mediator) {
                Some(actual) if actual == role => {
                    snapshot.commissions.basis_for(txn.tx_type, role)?;
                }
                _ => {
                    return Err(LedgerError::Validation(format!(
                        "account '{}' cannot mediate a {:?} transaction",
                        mediator.id, txn.tx_type
                    )));
                }
            }
            // The earnings wallet must exist before anything is posted
            if self
                .store
                .find_account_by_owner(&mediator.owner, AccountKind::CustomerWallet)
                .await?
                .is_none()
            {
                return Err(LedgerError::AccountNotFound(format!(
                    "earnings wallet for owner '{}'",
                    mediator.owner
                )));
            }
        }

        if initiator.balance - txn.total_debit() < initiator.min_balance {
            return Err(LedgerError::InsufficientFunds {
                account_id: initiator.id.clone(),
                requested: txn.total_debit(),
                available: initiator.available(),
            });
        }
        self.transition(txn, TransactionStatus::Validated).await?;

        // Limit check
        self.limits
            .check_and_reserve(&initiator, &txn.id, txn.total_debit(), Utc::now())?;

        // Lock & post
        self.transition(txn, TransactionStatus::Locked).await?;
        let entries = self.build_entries(txn)?;
        let postings = match self.store.post(&txn.id, &entries).await {
            Ok(postings) => postings,
            Err(err) => {
                self.limits.release(&initiator.id, &txn.id);
                return Err(err);
            }
        };
        self.transition(txn, TransactionStatus::Posted).await?;

        // Commission
        let mut all_postings = postings;
        if txn.tx_type.commission_role().is_some() {
            let commission = self
                .distributor
                .distribute(txn, mediator, &snapshot.commissions)
                .await?;
            all_postings.extend(commission);
            self.transition(txn, TransactionStatus::CommissionApplied)
                .await?;
        }

        // Commit limits and complete
        self.limits.commit(&initiator.id, &txn.id, Utc::now());
        txn.status = TransactionStatus::Completed;
        txn.completed_at = Some(Utc::now());
        self.store.update_transaction(txn).await?;

        Ok(all_postings)
    }

    /// Posting shape for the transaction's type
    fn build_entries(&self, txn: &Transaction) -> LedgerResult<Vec<PostingEntry>> {
        match txn.tx_type {
            TransactionType::SendMoney => patterns::send_money(
                &txn.id,
                &txn.initiator,
                &txn.counterparty,
                &self.system.charge_collection,
                txn.amount,
                txn.charge,
            ),
            TransactionType::Withdraw => patterns::withdrawal(
                &txn.id,
                &txn.initiator,
                &txn.counterparty,
                &self.system.cash_out_settlement,
                &self.system.charge_collection,
                txn.amount,
                txn.charge,
            ),
            TransactionType::Deposit => {
                patterns::deposit(&txn.id, &txn.initiator, &txn.counterparty, txn.amount)
            }
            TransactionType::PayBill | TransactionType::BuyGoods => patterns::merchant_payment(
                &txn.id,
                &txn.initiator,
                &txn.counterparty,
                &self.system.charge_collection,
                txn.amount,
                txn.charge,
            ),
            TransactionType::Airtime => {
                patterns::airtime(&txn.id, &txn.initiator, &txn.counterparty, txn.amount)
            }
            TransactionType::LoanDisbursement | TransactionType::LoanRepayment => {
                patterns::transfer(&txn.id, &txn.initiator, &txn.counterparty, txn.amount)
            }
        }
    }

    /// Return the recorded outcome of a previously seen idempotency key
    async fn prior_result(&self, prior: Transaction) -> LedgerResult<TransactionResult> {
        match prior.status {
            TransactionStatus::Completed | TransactionStatus::Reversed => {
                let postings = self.store.postings_for(&prior.id).await?;
                debug!(transaction_id = %prior.id, "returning prior result for retried request");
                Ok(TransactionResult {
                    transaction: prior,
                    postings,
                })
            }
            TransactionStatus::Failed => {
                let reason = prior
                    .failure_reason
                    .unwrap_or_else(|| "unknown failure".to_string());
                Err(LedgerError::Validation(format!(
                    "request already failed as transaction '{}': {}",
                    prior.id, reason
                )))
            }
            _ => Err(LedgerError::LedgerConflict(format!(
                "transaction '{}' for this idempotency key is still in flight",
                prior.id
            ))),
        }
    }

    async fn fail(&self, txn: &mut Transaction, err: &LedgerError) {
        warn!(transaction_id = %txn.id, error = %err, "transaction failed");
        self.limits.release(&txn.initiator, &txn.id);
        txn.status = TransactionStatus::Failed;
        txn.failure_reason = Some(err.to_string());
        txn.completed_at = Some(Utc::now());
        if let Err(update_err) = self.store.update_transaction(txn).await {
            warn!(
                transaction_id = %txn.id,
                error = %update_err,
                "failed to record transaction failure"
            );
        }
        // A transient conflict may be retried under the same key; free it
        if err.is_retryable() {
            if let Err(clear_err) = self.store.clear_idempotency_key(&txn.idempotency_key).await {
                warn!(
                    transaction_id = %txn.id,
                    error = %clear_err,
                    "failed to release idempotency key"
                );
            }
        }
    }

    async fn active_account(&self, account_id: &str) -> LedgerResult<Account> {
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;
        if account.status != AccountStatus::Active {
            return Err(LedgerError::Validation(format!(
                "account '{}' is {:?}",
                account_id, account.status
            )));
        }
        Ok(account)
    }

    async fn transition(&self, txn: &mut Transaction, next: TransactionStatus) -> LedgerResult<()> {
        txn.status = next;
        self.store.update_transaction(txn).await
    }

    fn current_snapshot(&self) -> Arc<ConfigSnapshot> {
        self.snapshot
            .read()
            .expect("config snapshot poisoned")
            .clone()
    }

    /// One event per affected party, carrying the party's net movement and
    /// resulting balance
    fn emit_notifications(&self, txn: &Transaction, postings: &[Posting]) {
        let timestamp = txn.completed_at.unwrap_or(txn.created_at);
        for account_id in [&txn.initiator, &txn.counterparty] {
            let own: Vec<&Posting> = postings
                .iter()
                .filter(|p| &p.account_id == account_id)
                .collect();
            let Some(last) = own.last() else { continue };
            self.notifier.notify(NotificationEvent {
                account_id: account_id.clone(),
                tx_type: txn.tx_type,
                amount: own.iter().map(|p| p.amount).sum(),
                balance: last.balance_after,
                timestamp,
            });
        }
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn drop_key_lock(&self, key: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.key_locks.lock().await;
        // Two strong references mean nobody else is waiting on this key
        if Arc::strong_count(lock) <= 2 {
            locks.remove(key);
        }
    }
}
