//! Integration tests for wallet-core

use std::sync::Arc;

use uuid::Uuid;
use wallet_core::ledger::account::utils::create_system_accounts;
use wallet_core::{
    AccountKind, ChargeTier, CollectingNotificationSink, CommissionBasis, CommissionRole,
    CommissionRule, ConfigSnapshot, EngineConfig, LedgerError, LedgerStore, LimitScope, LoanProduct,
    LoanManager, LoanStatus, MemoryStore, OpenAccount, PostingEntry, PostingKind, StatementRange,
    SystemAccounts, TransactionEngine, TransactionRequest, TransactionStatus, TransactionType,
};

struct TestContext {
    store: Arc<MemoryStore>,
    engine: Arc<TransactionEngine<MemoryStore>>,
    sink: Arc<CollectingNotificationSink>,
}

fn test_snapshot() -> ConfigSnapshot {
    ConfigSnapshot::from_tables(
        vec![
            ChargeTier::new(TransactionType::SendMoney, 1, 100_000, 50),
            ChargeTier::new(TransactionType::Withdraw, 1, 100_000, 30),
            ChargeTier::new(TransactionType::PayBill, 1, 100_000, 40),
            ChargeTier::new(TransactionType::BuyGoods, 1, 100_000, 40),
        ],
        vec![
            CommissionRule::new(
                TransactionType::Withdraw,
                CommissionRole::Agent,
                CommissionBasis::RateOfCharge(3_000),
            ),
            CommissionRule::new(
                TransactionType::Deposit,
                CommissionRole::Agent,
                CommissionBasis::RateOfAmount(100),
            ),
            CommissionRule::new(
                TransactionType::PayBill,
                CommissionRole::Merchant,
                CommissionBasis::RateOfAmount(50),
            ),
            CommissionRule::new(
                TransactionType::BuyGoods,
                CommissionRole::Merchant,
                CommissionBasis::RateOfAmount(50),
            ),
        ],
    )
    .expect("test snapshot is valid")
}

async fn setup_with_config(config: EngineConfig) -> TestContext {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CollectingNotificationSink::new());
    let engine = Arc::new(TransactionEngine::with_config(
        store.clone(),
        test_snapshot(),
        SystemAccounts::default(),
        config,
        sink.clone(),
    ));
    create_system_accounts(engine.accounts(), engine.system_accounts())
        .await
        .unwrap();

    for (id, owner, kind) in [
        ("ALICE", "alice", AccountKind::CustomerWallet),
        ("BOB", "bob", AccountKind::CustomerWallet),
        ("FLOAT1", "joe", AccountKind::AgentFloat),
        ("JOE", "joe", AccountKind::CustomerWallet),
        ("TILL1", "shopco", AccountKind::MerchantSettlement),
        ("SHOP", "shopco", AccountKind::CustomerWallet),
    ] {
        engine
            .accounts()
            .open(OpenAccount::new(id.to_string(), owner.to_string(), kind))
            .await
            .unwrap();
    }

    TestContext {
        store,
        engine,
        sink,
    }
}

async fn setup() -> TestContext {
    setup_with_config(EngineConfig::default()).await
}

/// Seed a balance from the loan funding system account
async fn fund(ctx: &TestContext, account_id: &str, amount: i64) {
    ctx.store
        .post(
            &format!("SEED{}", Uuid::new_v4().simple()),
            &[
                PostingEntry::new("SYS_LOANS".to_string(), -amount, PostingKind::Debit),
                PostingEntry::new(account_id.to_string(), amount, PostingKind::Credit),
            ],
        )
        .await
        .unwrap();
}

fn request(
    tx_type: TransactionType,
    initiator: &str,
    counterparty: &str,
    amount: i64,
    key: &str,
) -> TransactionRequest {
    TransactionRequest {
        tx_type,
        initiator: initiator.to_string(),
        counterparty: counterparty.to_string(),
        amount,
        idempotency_key: key.to_string(),
    }
}

#[tokio::test]
async fn test_send_money_scenario() {
    let ctx = setup().await;
    fund(&ctx, "ALICE", 1_000).await;
    fund(&ctx, "BOB", 1_000).await;

    let result = ctx
        .engine
        .execute(request(
            TransactionType::SendMoney,
            "ALICE",
            "BOB",
            500,
            "sm-1",
        ))
        .await
        .unwrap();

    assert_eq!(result.transaction.status, TransactionStatus::Completed);
    assert_eq!(result.transaction.charge, 50);
    assert!(result.transaction.completed_at.is_some());

    assert_eq!(ctx.engine.get_balance("ALICE").await.unwrap(), 450);
    assert_eq!(ctx.engine.get_balance("BOB").await.unwrap(), 1_500);
    assert_eq!(ctx.engine.get_balance("SYS_CHARGES").await.unwrap(), 50);

    // One posting group with three entries summing to zero
    assert_eq!(result.postings.len(), 3);
    assert_eq!(result.postings.iter().map(|p| p.amount).sum::<i64>(), 0);
}

#[tokio::test]
async fn test_withdrawal_distributes_agent_commission() {
    let ctx = setup().await;
    fund(&ctx, "ALICE", 5_000).await;
    fund(&ctx, "FLOAT1", 1_000).await;

    let result = ctx
        .engine
        .execute(request(
            TransactionType::Withdraw,
            "ALICE",
            "FLOAT1",
            500,
            "wd-1",
        ))
        .await
        .unwrap();

    // Charge 30, commission 30% of the charge = 9
    assert_eq!(ctx.engine.get_balance("ALICE").await.unwrap(), 4_470);
    assert_eq!(ctx.engine.get_balance("FLOAT1").await.unwrap(), 500);
    assert_eq!(ctx.engine.get_balance("SYS_CHARGES").await.unwrap(), 30);
    assert_eq!(ctx.engine.get_balance("JOE").await.unwrap(), 9);
    assert_eq!(ctx.engine.get_balance("SYS_COMMISSION").await.unwrap(), -9);

    // Main group plus commission group, all under one transaction id
    assert_eq!(result.postings.iter().map(|p| p.amount).sum::<i64>(), 0);
    let commission_postings: Vec<_> = result
        .postings
        .iter()
        .filter(|p| p.kind == PostingKind::Commission)
        .collect();
    assert_eq!(commission_postings.len(), 2);
}

#[tokio::test]
async fn test_withdrawal_with_insufficient_float_fails() {
    let ctx = setup().await;
    fund(&ctx, "ALICE", 5_000).await;
    fund(&ctx, "FLOAT1", 1_000).await;

    let err = ctx
        .engine
        .execute(request(
            TransactionType::Withdraw,
            "ALICE",
            "FLOAT1",
            2_000,
            "wd-fail",
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

    // No postings were created and no balance moved
    assert_eq!(ctx.engine.get_balance("ALICE").await.unwrap(), 5_000);
    assert_eq!(ctx.engine.get_balance("FLOAT1").await.unwrap(), 1_000);

    // The failed attempt is still an audit record
    let row = ctx
        .store
        .find_by_idempotency_key("wd-fail")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, TransactionStatus::Failed);
    assert!(row.failure_reason.unwrap().contains("Insufficient funds"));
    assert!(ctx.store.postings_for(&row.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_insufficient_wallet_balance_rejected_before_posting() {
    let ctx = setup().await;
    fund(&ctx, "ALICE", 100).await;

    let err = ctx
        .engine
        .execute(request(
            TransactionType::SendMoney,
            "ALICE",
            "BOB",
            500,
            "sm-poor",
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    assert_eq!(ctx.engine.get_balance("ALICE").await.unwrap(), 100);
    assert_eq!(ctx.engine.get_balance("BOB").await.unwrap(), 0);
}

#[tokio::test]
async fn test_zero_amount_and_self_transfer_rejected() {
    let ctx = setup().await;
    fund(&ctx, "ALICE", 1_000).await;

    let err = ctx
        .engine
        .execute(request(
            TransactionType::SendMoney,
            "ALICE",
            "BOB",
            0,
            "sm-zero",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let err = ctx
        .engine
        .execute(request(
            TransactionType::SendMoney,
            "ALICE",
            "ALICE",
            500,
            "sm-self",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[tokio::test]
async fn test_deposit_pays_rate_of_amount_commission() {
    let ctx = setup().await;
    fund(&ctx, "FLOAT1", 10_000).await;

    ctx.engine
        .execute(request(
            TransactionType::Deposit,
            "FLOAT1",
            "ALICE",
            1_000,
            "dp-1",
        ))
        .await
        .unwrap();

    assert_eq!(ctx.engine.get_balance("ALICE").await.unwrap(), 1_000);
    assert_eq!(ctx.engine.get_balance("FLOAT1").await.unwrap(), 9_000);
    // 1% of the deposited amount
    assert_eq!(ctx.engine.get_balance("JOE").await.unwrap(), 10);
}

#[tokio::test]
async fn test_idempotent_retry_returns_first_result() {
    let ctx = setup().await;
    fund(&ctx, "ALICE", 10_000).await;

    let first = ctx
        .engine
        .execute(request(
            TransactionType::SendMoney,
            "ALICE",
            "BOB",
            500,
            "sm-retry",
        ))
        .await
        .unwrap();
    let second = ctx
        .engine
        .execute(request(
            TransactionType::SendMoney,
            "ALICE",
            "BOB",
            500,
            "sm-retry",
        ))
        .await
        .unwrap();

    assert_eq!(first.transaction.id, second.transaction.id);
    assert_eq!(first.postings, second.postings);

    // Exactly one execution moved money
    assert_eq!(ctx.engine.get_balance("ALICE").await.unwrap(), 9_450);
    assert_eq!(ctx.engine.get_balance("BOB").await.unwrap(), 500);
}

#[tokio::test]
async fn test_concurrent_same_key_executes_exactly_once() {
    let ctx = setup().await;
    fund(&ctx, "ALICE", 10_000).await;

    let engine_a = ctx.engine.clone();
    let engine_b = ctx.engine.clone();
    let task_a = tokio::spawn(async move {
        engine_a
            .execute(request(
                TransactionType::SendMoney,
                "ALICE",
                "BOB",
                500,
                "sm-race",
            ))
            .await
    });
    let task_b = tokio::spawn(async move {
        engine_b
            .execute(request(
                TransactionType::SendMoney,
                "ALICE",
                "BOB",
                500,
                "sm-race",
            ))
            .await
    });

    let result_a = task_a.await.unwrap().unwrap();
    let result_b = task_b.await.unwrap().unwrap();

    assert_eq!(result_a.transaction.id, result_b.transaction.id);
    assert_eq!(ctx.engine.get_balance("ALICE").await.unwrap(), 9_450);
    assert_eq!(ctx.engine.get_balance("BOB").await.unwrap(), 500);
}

#[tokio::test]
async fn test_limit_breach_rejected_without_balance_change() {
    let ctx = setup().await;
    ctx.engine
        .accounts()
        .open(
            OpenAccount::new(
                "CAPPED".to_string(),
                "carol".to_string(),
                AccountKind::CustomerWallet,
            )
            .with_limits(1_000, 50_000),
        )
        .await
        .unwrap();
    fund(&ctx, "CAPPED", 10_000).await;

    // First transfer consumes 650 of the 1,000 daily cap
    ctx.engine
        .execute(request(
            TransactionType::SendMoney,
            "CAPPED",
            "BOB",
            600,
            "cap-1",
        ))
        .await
        .unwrap();

    // 400 + 50 charge would take the day to 1,100
    let err = ctx
        .engine
        .execute(request(
            TransactionType::SendMoney,
            "CAPPED",
            "BOB",
            400,
            "cap-2",
        ))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LedgerError::LimitExceeded {
            scope: LimitScope::Daily,
            limit: 1_000,
            attempted: 1_100,
        }
    ));
    assert_eq!(ctx.engine.get_balance("CAPPED").await.unwrap(), 9_350);
    assert_eq!(ctx.engine.get_balance("BOB").await.unwrap(), 600);

    // Only the completed transfer counts toward the window
    assert_eq!(
        ctx.engine
            .limits()
            .committed_total("CAPPED", LimitScope::Daily, chrono::Utc::now()),
        650
    );
}

#[tokio::test]
async fn test_float_hierarchy_and_replenishment() {
    let ctx = setup().await;
    ctx.engine
        .accounts()
        .open(OpenAccount::new(
            "SUPER1".to_string(),
            "superagent".to_string(),
            AccountKind::AgentFloat,
        ))
        .await
        .unwrap();
    ctx.engine
        .accounts()
        .open(
            OpenAccount::new(
                "FLOAT2".to_string(),
                "kim".to_string(),
                AccountKind::AgentFloat,
            )
            .with_parent("SUPER1".to_string())
            .with_floor(-10_000),
        )
        .await
        .unwrap();
    ctx.engine
        .accounts()
        .open(OpenAccount::new(
            "KIM".to_string(),
            "kim".to_string(),
            AccountKind::CustomerWallet,
        ))
        .await
        .unwrap();
    fund(&ctx, "SUPER1", 50_000).await;

    let chain = ctx.engine.accounts().float_chain("FLOAT2").await.unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].id, "SUPER1");

    ctx.engine
        .accounts()
        .replenish_float("FLOAT2", 20_000)
        .await
        .unwrap();
    assert_eq!(ctx.engine.get_balance("FLOAT2").await.unwrap(), 20_000);
    assert_eq!(ctx.engine.get_balance("SUPER1").await.unwrap(), 30_000);

    // The credit-backed float may run down to its negative floor
    ctx.engine
        .execute(request(
            TransactionType::Deposit,
            "FLOAT2",
            "ALICE",
            25_000,
            "dp-credit",
        ))
        .await
        .unwrap();
    assert_eq!(ctx.engine.get_balance("FLOAT2").await.unwrap(), -5_000);
    assert_eq!(ctx.engine.get_balance("ALICE").await.unwrap(), 25_000);

    // But not below it
    let err = ctx
        .engine
        .execute(request(
            TransactionType::Deposit,
            "FLOAT2",
            "BOB",
            6_000,
            "dp-floor",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
}

#[tokio::test]
async fn test_reversal_round_trip_including_commission() {
    let ctx = setup().await;
    fund(&ctx, "ALICE", 5_000).await;
    fund(&ctx, "FLOAT1", 1_000).await;

    let original = ctx
        .engine
        .execute(request(
            TransactionType::Withdraw,
            "ALICE",
            "FLOAT1",
            500,
            "wd-rev",
        ))
        .await
        .unwrap();

    let reversal = ctx
        .engine
        .reverse(&original.transaction.id, "customer dispute")
        .await
        .unwrap();

    // Every account is back to its pre-transaction balance
    assert_eq!(ctx.engine.get_balance("ALICE").await.unwrap(), 5_000);
    assert_eq!(ctx.engine.get_balance("FLOAT1").await.unwrap(), 1_000);
    assert_eq!(ctx.engine.get_balance("SYS_CHARGES").await.unwrap(), 0);
    assert_eq!(ctx.engine.get_balance("SYS_COMMISSION").await.unwrap(), 0);
    assert_eq!(ctx.engine.get_balance("SYS_CASHOUT").await.unwrap(), 0);
    assert_eq!(ctx.engine.get_balance("JOE").await.unwrap(), 0);

    // Rows are linked in both directions
    assert_eq!(
        reversal.transaction.reversal_of,
        Some(original.transaction.id.clone())
    );
    let reloaded = ctx
        .engine
        .get_transaction(&original.transaction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.status, TransactionStatus::Reversed);
    assert_eq!(reloaded.reversed_by, Some(reversal.transaction.id.clone()));

    // A second reversal must fail
    let err = ctx
        .engine
        .reverse(&original.transaction.id, "again")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyReversed(_)));
}

#[tokio::test]
async fn test_reversal_window_expiry() {
    let ctx = setup_with_config(EngineConfig {
        reversal_window_days: 0,
    })
    .await;
    fund(&ctx, "ALICE", 1_000).await;

    let result = ctx
        .engine
        .execute(request(
            TransactionType::SendMoney,
            "ALICE",
            "BOB",
            500,
            "sm-old",
        ))
        .await
        .unwrap();

    // Any elapsed time exceeds a zero-day window
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let err = ctx
        .engine
        .reverse(&result.transaction.id, "too late")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::ReversalWindowExpired { .. }));
    assert_eq!(ctx.engine.get_balance("ALICE").await.unwrap(), 450);
}

#[tokio::test]
async fn test_balances_equal_posting_sums() {
    let ctx = setup().await;
    fund(&ctx, "ALICE", 10_000).await;
    fund(&ctx, "FLOAT1", 10_000).await;

    ctx.engine
        .execute(request(
            TransactionType::SendMoney,
            "ALICE",
            "BOB",
            1_000,
            "mix-1",
        ))
        .await
        .unwrap();
    ctx.engine
        .execute(request(
            TransactionType::Withdraw,
            "ALICE",
            "FLOAT1",
            2_000,
            "mix-2",
        ))
        .await
        .unwrap();
    ctx.engine
        .execute(request(
            TransactionType::PayBill,
            "ALICE",
            "TILL1",
            3_000,
            "mix-3",
        ))
        .await
        .unwrap();
    ctx.engine
        .execute(request(
            TransactionType::Airtime,
            "BOB",
            "SYS_AIRTIME",
            200,
            "mix-4",
        ))
        .await
        .unwrap();

    for account_id in [
        "ALICE",
        "BOB",
        "FLOAT1",
        "JOE",
        "TILL1",
        "SHOP",
        "SYS_CHARGES",
        "SYS_COMMISSION",
        "SYS_CASHOUT",
        "SYS_AIRTIME",
        "SYS_LOANS",
    ] {
        let statement = ctx
            .engine
            .statement(account_id, StatementRange::default())
            .await
            .unwrap();
        let sum: i64 = statement.iter().map(|p| p.amount).sum();
        assert_eq!(
            sum,
            ctx.engine.get_balance(account_id).await.unwrap(),
            "posting drift on {account_id}"
        );
    }
}

#[tokio::test]
async fn test_statement_is_ordered_and_range_bounded() {
    let ctx = setup().await;
    fund(&ctx, "ALICE", 10_000).await;

    for i in 0..3 {
        ctx.engine
            .execute(request(
                TransactionType::SendMoney,
                "ALICE",
                "BOB",
                100,
                &format!("st-{i}"),
            ))
            .await
            .unwrap();
    }

    let statement = ctx
        .engine
        .statement("ALICE", StatementRange::default())
        .await
        .unwrap();
    assert_eq!(statement.len(), 4); // seed credit plus three debits
    assert!(statement.windows(2).all(|w| w[0].created_at <= w[1].created_at));

    let from_now = StatementRange {
        from: Some(chrono::Utc::now()),
        to: None,
    };
    assert!(ctx
        .engine
        .statement("ALICE", from_now)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_charge_tier_gap_fails_the_transaction() {
    let ctx = setup().await;
    fund(&ctx, "ALICE", 500_000).await;

    let err = ctx
        .engine
        .execute(request(
            TransactionType::SendMoney,
            "ALICE",
            "BOB",
            200_000,
            "sm-gap",
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::NoTierConfigured { .. }));
    assert_eq!(ctx.engine.get_balance("ALICE").await.unwrap(), 500_000);
}

#[tokio::test]
async fn test_suspended_account_cannot_transact() {
    let ctx = setup().await;
    fund(&ctx, "ALICE", 1_000).await;
    ctx.engine.accounts().suspend("BOB").await.unwrap();

    let err = ctx
        .engine
        .execute(request(
            TransactionType::SendMoney,
            "ALICE",
            "BOB",
            500,
            "sm-susp",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(ctx.engine.get_balance("ALICE").await.unwrap(), 1_000);
}

#[tokio::test]
async fn test_notifications_for_both_parties() {
    let ctx = setup().await;
    fund(&ctx, "ALICE", 1_000).await;
    fund(&ctx, "BOB", 1_000).await;

    ctx.engine
        .execute(request(
            TransactionType::SendMoney,
            "ALICE",
            "BOB",
            500,
            "sm-notify",
        ))
        .await
        .unwrap();

    let events = ctx.sink.events();
    let alice = events.iter().find(|e| e.account_id == "ALICE").unwrap();
    let bob = events.iter().find(|e| e.account_id == "BOB").unwrap();
    assert_eq!(alice.amount, -550);
    assert_eq!(alice.balance, 450);
    assert_eq!(bob.amount, 500);
    assert_eq!(bob.balance, 1_500);
}

#[tokio::test]
async fn test_config_reload_swaps_the_charge_table() {
    let ctx = setup().await;
    fund(&ctx, "ALICE", 10_000).await;

    ctx.engine.reload_config(
        ConfigSnapshot::from_tables(
            vec![ChargeTier::new(TransactionType::SendMoney, 1, 100_000, 100)],
            Vec::new(),
        )
        .unwrap(),
    );

    let result = ctx
        .engine
        .execute(request(
            TransactionType::SendMoney,
            "ALICE",
            "BOB",
            500,
            "sm-reload",
        ))
        .await
        .unwrap();
    assert_eq!(result.transaction.charge, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_opposing_transfers_conserve_money() {
    let ctx = setup().await;
    fund(&ctx, "ALICE", 50_000).await;
    fund(&ctx, "BOB", 50_000).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let engine = ctx.engine.clone();
        let (from, to) = if i % 2 == 0 {
            ("ALICE", "BOB")
        } else {
            ("BOB", "ALICE")
        };
        handles.push(tokio::spawn(async move {
            engine
                .execute(request(
                    TransactionType::SendMoney,
                    from,
                    to,
                    100,
                    &format!("race-{i}"),
                ))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Ten transfers of 100 each at a 50 charge: wallets lose 10 * 50 to
    // charge collection, nothing is created or destroyed
    let alice = ctx.engine.get_balance("ALICE").await.unwrap();
    let bob = ctx.engine.get_balance("BOB").await.unwrap();
    let charges = ctx.engine.get_balance("SYS_CHARGES").await.unwrap();
    assert_eq!(charges, 500);
    assert_eq!(alice + bob + charges, 100_000);
}

#[tokio::test]
async fn test_loan_lifecycle() {
    let ctx = setup().await;
    let loans = LoanManager::new(ctx.store.clone(), ctx.engine.clone());
    loans
        .register_product(LoanProduct {
            id: "starter".to_string(),
            name: "Starter Loan".to_string(),
            min_amount: 10_000,
            max_amount: 1_000_000,
            annual_rate_bps: 1_200,
            duration_days: 30,
            facilitation_fee: 500,
        })
        .unwrap();

    let loan = loans.apply("ALICE", "starter", 100_000).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Pending);
    assert_eq!(loan.interest, 986);
    assert_eq!(loan.total, 101_486);

    // A second application while one is open is rejected
    let err = loans.apply("ALICE", "starter", 20_000).await.unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let (loan, _result) = loans.disburse(&loan.loan_id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Disbursed);
    assert_eq!(ctx.engine.get_balance("ALICE").await.unwrap(), 100_000);

    // Cover interest and fee, then repay in two installments; the second
    // overpays and is clamped to the outstanding balance
    fund(&ctx, "ALICE", 2_000).await;
    let (loan, repayment) = loans
        .repay(&loan.loan_id, 50_000, "repay-1")
        .await
        .unwrap();
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(repayment.balance_after, 51_486);

    let (loan, repayment) = loans
        .repay(&loan.loan_id, 999_999, "repay-2")
        .await
        .unwrap();
    assert_eq!(repayment.amount, 51_486);
    assert_eq!(loan.status, LoanStatus::Paid);
    assert_eq!(loan.balance, 0);
    assert_eq!(ctx.engine.get_balance("ALICE").await.unwrap(), 514);

    assert_eq!(loans.repayments(&loan.loan_id).await.unwrap().len(), 2);
}

mod properties {
    use proptest::prelude::*;
    use wallet_core::{patterns, ChargeSchedule, ChargeTier, TransactionType};

    fn banded_schedule() -> ChargeSchedule {
        ChargeSchedule::new(vec![
            ChargeTier::new(TransactionType::SendMoney, 1, 10_000, 50),
            ChargeTier::new(TransactionType::SendMoney, 10_001, 100_000, 200),
        ])
        .expect("bands are contiguous")
    }

    proptest! {
        #[test]
        fn charge_lookup_is_total_and_deterministic(amount in 1i64..=100_000) {
            let schedule = banded_schedule();
            let expected = if amount <= 10_000 { 50 } else { 200 };
            prop_assert_eq!(
                schedule.charge_for(TransactionType::SendMoney, amount).unwrap(),
                expected
            );
        }

        #[test]
        fn send_money_posting_set_is_always_zero_sum(
            amount in 1i64..1_000_000,
            charge in 0i64..10_000,
        ) {
            let entries =
                patterns::send_money("T", "A", "B", "CHARGES", amount, charge).unwrap();
            prop_assert_eq!(entries.iter().map(|e| e.amount).sum::<i64>(), 0);
        }
    }
}
