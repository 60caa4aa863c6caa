mod common;

use rust_decimal::Decimal;

use backend_invest_platform::db::models::{
    Currency, TransactionFilter, TransactionStatus, ADDRESS_PLACEHOLDER,
};
use backend_invest_platform::db::store::Store;
use backend_invest_platform::error::CoreError;

use common::{seed_user, service};

#[tokio::test]
async fn total_balance_equals_sum_after_mixed_operations() {
    let core = service();
    let user = seed_user(&core, "alice").await;

    core.credit(user, Currency::BTC, Decimal::from(100)).await.unwrap();
    core.credit(user, Currency::ETH, Decimal::from(30)).await.unwrap();
    core.debit(user, Currency::BTC, Decimal::from(25)).await.unwrap();
    core.credit(user, Currency::USDT, Decimal::from(5)).await.unwrap();

    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::BTC), Decimal::from(75));
    assert_eq!(wallet.total_balance(), wallet.balances.total());
    assert_eq!(wallet.total_balance(), Decimal::from(110));
    assert_eq!(
        core.get_balance(user, Currency::ETH).await.unwrap(),
        Decimal::from(30)
    );
}

#[tokio::test]
async fn first_credit_creates_wallet_with_defaults() {
    let core = service();
    let user = seed_user(&core, "bob").await;

    core.credit(user, Currency::ETH, Decimal::from(7)).await.unwrap();

    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::ETH), Decimal::from(7));
    for currency in [Currency::BTC, Currency::BNB, Currency::USDT] {
        assert_eq!(wallet.balances.get(currency), Decimal::ZERO);
    }
    assert_eq!(wallet.addresses.btc, ADDRESS_PLACEHOLDER);
}

#[tokio::test]
async fn wallet_lookup_fails_for_unknown_user() {
    let core = service();
    let user = seed_user(&core, "carol").await;
    assert!(matches!(
        core.get_wallet(user).await,
        Err(CoreError::NotFound)
    ));
}

#[tokio::test]
async fn insufficient_debit_fails_and_leaves_balances_unchanged() {
    let core = service();
    let user = seed_user(&core, "dave").await;
    core.credit(user, Currency::BTC, Decimal::from(100)).await.unwrap();

    let err = core.debit(user, Currency::BTC, Decimal::from(150)).await;
    assert!(matches!(err, Err(CoreError::InsufficientFunds)));

    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::BTC), Decimal::from(100));
    assert_eq!(wallet.total_balance(), Decimal::from(100));
}

#[tokio::test]
async fn non_positive_amounts_rejected_before_any_mutation() {
    let core = service();
    let user = seed_user(&core, "erin").await;
    core.credit(user, Currency::BTC, Decimal::from(10)).await.unwrap();

    assert!(matches!(
        core.debit(user, Currency::BTC, Decimal::ZERO).await,
        Err(CoreError::InvalidAmount)
    ));
    assert!(matches!(
        core.debit(user, Currency::BTC, Decimal::from(-5)).await,
        Err(CoreError::InvalidAmount)
    ));
    assert!(matches!(
        core.credit(user, Currency::BTC, Decimal::from(-5)).await,
        Err(CoreError::InvalidAmount)
    ));

    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::BTC), Decimal::from(10));
}

#[tokio::test]
async fn concurrent_debits_never_overdraw() {
    let core = service();
    let user = seed_user(&core, "frank").await;
    core.credit(user, Currency::BTC, Decimal::from(100)).await.unwrap();

    let (c1, c2) = (core.clone(), core.clone());
    let h1 = tokio::spawn(async move { c1.debit(user, Currency::BTC, Decimal::from(60)).await });
    let h2 = tokio::spawn(async move { c2.debit(user, Currency::BTC, Decimal::from(60)).await });
    let (r1, r2) = (h1.await.unwrap(), h2.await.unwrap());

    assert_eq!(r1.is_ok() as u8 + r2.is_ok() as u8, 1, "exactly one debit succeeds");
    let loser = if r1.is_err() { r1 } else { r2 };
    assert!(matches!(loser, Err(CoreError::InsufficientFunds)));

    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::BTC), Decimal::from(40));
}

#[tokio::test]
async fn set_address_rejects_unknown_currency() {
    let core = service();
    let user = seed_user(&core, "grace").await;
    core.credit(user, Currency::BTC, Decimal::from(1)).await.unwrap();

    let err = core.set_address(user, "DOGE", "D6abc").await;
    assert!(matches!(err, Err(CoreError::InvalidCurrency)));

    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.addresses.btc, ADDRESS_PLACEHOLDER);

    core.set_address(user, "BTC", "bc1qabc").await.unwrap();
    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.addresses.btc, "bc1qabc");
    assert_eq!(wallet.addresses.eth, ADDRESS_PLACEHOLDER);
}

#[tokio::test]
async fn deposit_credits_wallet_and_confirmation_completes_records() {
    let core = service();
    let user = seed_user(&core, "heidi").await;

    let deposit = core
        .deposit(user, Currency::USDT, Decimal::from(2), Decimal::from(500))
        .await
        .unwrap();
    assert_eq!(deposit.status, TransactionStatus::Pending);

    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::USDT), Decimal::from(500));

    let pending = core
        .store()
        .query_transactions(
            user,
            &TransactionFilter { tx_type: Some("deposit".into()), status: None },
        )
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, TransactionStatus::Pending);

    // drive the confirmation job directly instead of waiting out the window
    let jobs = core.store().pending_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    core.run_job(&jobs[0]).await.unwrap();

    let confirmed = core
        .store()
        .query_transactions(
            user,
            &TransactionFilter { tx_type: Some("deposit".into()), status: None },
        )
        .await
        .unwrap();
    assert_eq!(confirmed[0].status, TransactionStatus::Completed);
    let deposits = core.store().list_deposits().await.unwrap();
    assert_eq!(deposits[0].status, TransactionStatus::Completed);
}

#[tokio::test]
async fn failed_withdrawal_is_audited_and_leaves_funds() {
    let core = service();
    let user = seed_user(&core, "ivan").await;
    core.credit(user, Currency::BTC, Decimal::from(10)).await.unwrap();

    let err = core
        .withdraw(user, Currency::BTC, Decimal::from(60), "bc1qdest")
        .await;
    assert!(matches!(err, Err(CoreError::InsufficientFunds)));

    let wallet = core.get_wallet(user).await.unwrap();
    assert_eq!(wallet.balances.get(Currency::BTC), Decimal::from(10));

    let failed = core
        .store()
        .query_transactions(
            user,
            &TransactionFilter {
                tx_type: Some("withdraw".into()),
                status: Some(TransactionStatus::Failed),
            },
        )
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].amount, Decimal::from(60));
}

#[tokio::test]
async fn successful_withdrawal_debits_and_completes() {
    let core = service();
    let user = seed_user(&core, "judy").await;
    core.credit(user, Currency::ETH, Decimal::from(80)).await.unwrap();

    let wallet = core
        .withdraw(user, Currency::ETH, Decimal::from(30), "0xdead")
        .await
        .unwrap();
    assert_eq!(wallet.balances.get(Currency::ETH), Decimal::from(50));
    assert_eq!(wallet.total_balance(), Decimal::from(50));

    let done = core
        .store()
        .query_transactions(
            user,
            &TransactionFilter {
                tx_type: Some("withdraw".into()),
                status: Some(TransactionStatus::Completed),
            },
        )
        .await
        .unwrap();
    assert_eq!(done.len(), 1);
}
