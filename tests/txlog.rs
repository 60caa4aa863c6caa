mod common;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use backend_invest_platform::db::models::{Transaction, TransactionFilter, TransactionStatus};
use backend_invest_platform::db::store::Store;
use backend_invest_platform::error::CoreError;

use common::service;

fn tx(user: Uuid, tx_type: &str, status: TransactionStatus) -> Transaction {
    let now = Utc::now();
    Transaction {
        id: Uuid::new_v4(),
        user_id: user,
        tx_type: tx_type.to_string(),
        amount: Decimal::from(10),
        status,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn type_filter_is_case_insensitive_and_user_scoped() {
    let core = service();
    let store = core.store();
    let (alice, mallory) = (Uuid::new_v4(), Uuid::new_v4());

    store.append_transaction(&tx(alice, "Deposit", TransactionStatus::Pending)).await.unwrap();
    store.append_transaction(&tx(alice, "Withdrawal", TransactionStatus::Completed)).await.unwrap();
    store.append_transaction(&tx(alice, "Investment - Gold", TransactionStatus::Pending)).await.unwrap();
    store.append_transaction(&tx(mallory, "Deposit", TransactionStatus::Pending)).await.unwrap();

    let deposits = store
        .query_transactions(
            alice,
            &TransactionFilter { tx_type: Some("deposit".into()), status: None },
        )
        .await
        .unwrap();
    assert_eq!(deposits.len(), 1);
    assert_eq!(deposits[0].tx_type, "Deposit");
    assert_eq!(deposits[0].user_id, alice);

    // substring match: "investment" hits "Investment - Gold"
    let investments = store
        .query_transactions(
            alice,
            &TransactionFilter { tx_type: Some("investment".into()), status: None },
        )
        .await
        .unwrap();
    assert_eq!(investments.len(), 1);
    assert_eq!(investments[0].tx_type, "Investment - Gold");

    let withdrawals = store
        .query_transactions(
            alice,
            &TransactionFilter { tx_type: Some("WITHDRAW".into()), status: None },
        )
        .await
        .unwrap();
    assert_eq!(withdrawals.len(), 1);
}

#[tokio::test]
async fn status_filter_matches_exactly() {
    let core = service();
    let store = core.store();
    let user = Uuid::new_v4();

    store.append_transaction(&tx(user, "Deposit", TransactionStatus::Pending)).await.unwrap();
    store.append_transaction(&tx(user, "Withdrawal", TransactionStatus::Completed)).await.unwrap();
    store.append_transaction(&tx(user, "Withdrawal", TransactionStatus::Failed)).await.unwrap();

    for (status, expected_type) in [
        (TransactionStatus::Pending, "Deposit"),
        (TransactionStatus::Completed, "Withdrawal"),
        (TransactionStatus::Failed, "Withdrawal"),
    ] {
        let found = store
            .query_transactions(
                user,
                &TransactionFilter { tx_type: None, status: Some(status) },
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tx_type, expected_type);
        assert_eq!(found[0].status, status);
    }
}

#[tokio::test]
async fn combined_filters_intersect() {
    let core = service();
    let store = core.store();
    let user = Uuid::new_v4();

    store.append_transaction(&tx(user, "Deposit", TransactionStatus::Pending)).await.unwrap();
    store.append_transaction(&tx(user, "Deposit", TransactionStatus::Completed)).await.unwrap();
    store.append_transaction(&tx(user, "Withdrawal", TransactionStatus::Completed)).await.unwrap();

    let found = store
        .query_transactions(
            user,
            &TransactionFilter {
                tx_type: Some("deposit".into()),
                status: Some(TransactionStatus::Completed),
            },
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn only_pending_transactions_can_resolve() {
    let core = service();
    let store = core.store();
    let user = Uuid::new_v4();

    let pending = tx(user, "Deposit", TransactionStatus::Pending);
    store.append_transaction(&pending).await.unwrap();

    store
        .update_transaction_status(pending.id, TransactionStatus::Completed)
        .await
        .unwrap();
    let loaded = store.load_transaction(pending.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, TransactionStatus::Completed);

    // re-affirming a terminal status is a no-op, not an error
    store
        .update_transaction_status(pending.id, TransactionStatus::Completed)
        .await
        .unwrap();

    // but a terminal record can never move to another status
    assert!(matches!(
        store
            .update_transaction_status(pending.id, TransactionStatus::Failed)
            .await,
        Err(CoreError::InvalidTransition)
    ));
    assert!(matches!(
        store
            .update_transaction_status(pending.id, TransactionStatus::Pending)
            .await,
        Err(CoreError::InvalidTransition)
    ));

    let failed = tx(user, "Withdrawal", TransactionStatus::Failed);
    store.append_transaction(&failed).await.unwrap();
    assert!(matches!(
        store
            .update_transaction_status(failed.id, TransactionStatus::Completed)
            .await,
        Err(CoreError::InvalidTransition)
    ));
}

#[tokio::test]
async fn unknown_transaction_reports_not_found() {
    let core = service();
    assert!(matches!(
        core.store()
            .update_transaction_status(Uuid::new_v4(), TransactionStatus::Completed)
            .await,
        Err(CoreError::NotFound)
    ));
}
