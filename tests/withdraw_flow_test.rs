//! End-to-end withdrawal tests: real ledger, real HTTP client, mocked BlockCypher
//!
//! Run with: cargo test --test withdraw_flow_test

mod common;

use common::*;
use dogeads::storage::db::WithdrawalStatus;
use dogeads::wallet::HouseKey;
use dogeads::{WithdrawError, WithdrawalRequest};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn request(amount: &str, key: &str) -> WithdrawalRequest {
    WithdrawalRequest {
        user_id: USER_ID,
        address: DEST_ADDRESS.to_string(),
        amount: doge(amount),
        request_key: key.to_string(),
    }
}

#[tokio::test]
async fn test_withdrawal_builds_signs_and_broadcasts() {
    let env = TestEnvironment::new("10", "100").await;

    Mock::given(method("POST"))
        .and(path("/txs/new"))
        .and(query_param("token", "test-token"))
        .and(body_partial_json(json!({
            "inputs": [{"addresses": [HOUSE_ADDRESS]}],
            "outputs": [{"addresses": [DEST_ADDRESS], "value": 350_000_000}],
            "fees": 50_000_000
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "tx": {"fees": 50_000_000},
            "tosign": ["ab".repeat(32), "cd".repeat(32)]
        })))
        .expect(1)
        .mount(&env.chain)
        .await;
    Mock::given(method("POST"))
        .and(path("/txs/send"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"tx": {"hash": TX_HASH}})))
        .expect(1)
        .mount(&env.chain)
        .await;

    let receipt = env.service.process(request("4", "flow-1")).await.unwrap();

    assert_eq!(receipt.tx_hash, TX_HASH);
    assert!(!receipt.replayed);
    assert_eq!(env.user_balance(), doge("6"));
    assert_eq!(env.house_balance(), doge("96"));

    let withdrawals = env.withdrawals();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].status, WithdrawalStatus::Sent);
    assert_eq!(withdrawals[0].tx_hash.as_deref(), Some(TX_HASH));

    // One signature and one house pubkey per digest
    let requests = env.chain.received_requests().await.unwrap();
    let send = requests.iter().find(|r| r.url.path() == "/txs/send").unwrap();
    let body: Value = serde_json::from_slice(&send.body).unwrap();
    let pubkey = HouseKey::from_hex(&"11".repeat(32)).unwrap().public_key_hex();
    assert_eq!(body["signatures"].as_array().unwrap().len(), 2);
    assert_eq!(body["pubkeys"], json!([pubkey, pubkey]));
    assert_eq!(body["tosign"], json!(["ab".repeat(32), "cd".repeat(32)]));
}

#[tokio::test]
async fn test_repeated_request_key_does_not_send_twice() {
    let env = TestEnvironment::new("10", "100").await;
    env.mount_happy_chain().await;

    let first = env.service.process(request("2", "same-key")).await.unwrap();
    let second = env.service.process(request("2", "same-key")).await.unwrap();

    assert_eq!(first.tx_hash, second.tx_hash);
    assert!(second.replayed);
    assert_eq!(env.user_balance(), doge("8"));

    let requests = env.chain.received_requests().await.unwrap();
    assert_eq!(requests.iter().filter(|r| r.url.path() == "/txs/send").count(), 1);
}

#[tokio::test]
async fn test_rejected_skeleton_refunds_both_balances() {
    let env = TestEnvironment::new("10", "100").await;
    Mock::given(method("POST"))
        .and(path("/txs/new"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errors": [{"error": "Not enough funds in 1 inputs to pay for 1 outputs"}]
        })))
        .expect(1)
        .mount(&env.chain)
        .await;

    let err = env.service.process(request("4", "rejected")).await.unwrap_err();

    assert!(matches!(err, WithdrawError::ApiRejected(_)), "got {err:?}");
    assert_eq!(env.user_balance(), doge("10"));
    assert_eq!(env.house_balance(), doge("100"));
    assert_eq!(env.withdrawals()[0].status, WithdrawalStatus::Failed);
}

#[tokio::test]
async fn test_gateway_errors_on_broadcast_keep_funds_reserved() {
    let env = TestEnvironment::new("10", "100").await;
    mount_skeleton(&env.chain).await;
    Mock::given(method("POST"))
        .and(path("/txs/send"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&env.chain)
        .await;

    let err = env.service.process(request("4", "ambiguous")).await.unwrap_err();

    assert!(matches!(err, WithdrawError::BroadcastUnknown { .. }), "got {err:?}");
    assert!(err.needs_operator());
    assert_eq!(env.user_balance(), doge("6"));
    assert_eq!(env.house_balance(), doge("96"));
    assert_eq!(env.withdrawals()[0].status, WithdrawalStatus::Unknown);

    // Retrying with the same key must not broadcast again
    let sends_before = env
        .chain
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/txs/send")
        .count();
    let err = env.service.process(request("4", "ambiguous")).await.unwrap_err();
    assert!(matches!(err, WithdrawError::InProgress(_)), "got {err:?}");
    let sends_after = env
        .chain
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/txs/send")
        .count();
    assert_eq!(sends_before, sends_after);
}

#[tokio::test]
async fn test_house_shortfall_never_reaches_the_chain() {
    let env = TestEnvironment::new("10", "2").await;
    env.mount_happy_chain().await;

    let err = env.service.process(request("4", "short")).await.unwrap_err();

    assert!(matches!(err, WithdrawError::InsufficientHouseBalance { .. }), "got {err:?}");
    assert!(env.chain.received_requests().await.unwrap().is_empty());
    assert_eq!(env.user_balance(), doge("10"));
    assert!(env.withdrawals().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_users_race_for_house_balance() {
    const OTHER_ID: i64 = 5151;
    let env = TestEnvironment::new("10", "5").await;
    env.mount_happy_chain().await;
    {
        let conn = dogeads::get_connection(&env.pool).unwrap();
        dogeads::storage::db::register_user(&conn, OTHER_ID, Some("Bruno")).unwrap();
        dogeads::storage::db::add_balance(&conn, OTHER_ID, doge("10")).unwrap();
    }

    let first = {
        let service = env.service.clone();
        tokio::spawn(async move { service.process(request("4", "race-a")).await })
    };
    let second = {
        let service = env.service.clone();
        tokio::spawn(async move {
            service
                .process(WithdrawalRequest {
                    user_id: OTHER_ID,
                    ..request("4", "race-b")
                })
                .await
        })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let kinds: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).map(|e| e.kind()).collect();
    assert_eq!(kinds, vec!["insufficient_house_balance"]);
    assert_eq!(env.house_balance(), doge("1"));

    // Only the winner was debited
    let conn = dogeads::get_connection(&env.pool).unwrap();
    let other = dogeads::storage::db::get_user(&conn, OTHER_ID).unwrap().unwrap().doge;
    let mut user_balances = [env.user_balance(), other];
    user_balances.sort();
    assert_eq!(user_balances, [doge("6"), doge("10")]);

    let requests = env.chain.received_requests().await.unwrap();
    assert_eq!(requests.iter().filter(|r| r.url.path() == "/txs/send").count(), 1);
}
