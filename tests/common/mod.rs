//! Shared fixtures for the integration tests
//!
//! `TestEnvironment` wires a real `WithdrawalService` to a temporary SQLite
//! ledger and a wiremock server standing in for BlockCypher.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use dogeads::core::retry::RetryConfig;
use dogeads::storage::{create_pool, db, get_connection, DbPool};
use dogeads::wallet::{BlockCypherClient, WalletSettings};
use dogeads::{Doge, WithdrawalLimits, WithdrawalService};
use secrecy::SecretString;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const HOUSE_ID: i64 = 0;
pub const USER_ID: i64 = 4242;
pub const HOUSE_ADDRESS: &str = "DH5yaieqoZN36fDVciNyRueRGvGLR3mr7L";
pub const DEST_ADDRESS: &str = "DBXu2kgc3xtvCUWFcxFE3r9hEYgmuaaCyD";
pub const TX_HASH: &str = "4f1b9a3c2e7d6f80a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718";

pub fn doge(raw: &str) -> Doge {
    raw.parse().unwrap()
}

pub struct TestEnvironment {
    /// Keeps the database file alive
    _dir: TempDir,
    pub pool: DbPool,
    pub chain: MockServer,
    pub service: Arc<WithdrawalService>,
}

impl TestEnvironment {
    /// Ledger with a registered user and both balances funded.
    pub async fn new(user_balance: &str, house_balance: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("ledger.sqlite");
        let pool = create_pool(db_path.to_str().unwrap()).unwrap();
        {
            let conn = get_connection(&pool).unwrap();
            db::ensure_house_account(&conn, HOUSE_ID).unwrap();
            db::register_user(&conn, USER_ID, Some("Ana")).unwrap();
            db::add_balance(&conn, USER_ID, doge(user_balance)).unwrap();
            db::add_balance(&conn, HOUSE_ID, doge(house_balance)).unwrap();
        }

        let chain = MockServer::start().await;
        let client = BlockCypherClient::new(
            &chain.uri(),
            Some(SecretString::from("test-token".to_string())),
            Duration::from_secs(5),
        )
        .unwrap();

        let wallet = WalletSettings {
            address: Some(HOUSE_ADDRESS.to_string()),
            private_key: Some(SecretString::from("11".repeat(32))),
            api_token: Some(SecretString::from("test-token".to_string())),
        };
        let limits = WithdrawalLimits {
            house_id: HOUSE_ID,
            minimum: doge("1"),
            fee: doge("0.5"),
        };
        let service = WithdrawalService::new(pool.clone(), Arc::new(client), wallet, limits).with_retry(RetryConfig::quick());

        Self {
            _dir: dir,
            pool,
            chain,
            service: Arc::new(service),
        }
    }

    pub fn user_balance(&self) -> Doge {
        let conn = get_connection(&self.pool).unwrap();
        db::get_user(&conn, USER_ID).unwrap().unwrap().doge
    }

    pub fn house_balance(&self) -> Doge {
        let conn = get_connection(&self.pool).unwrap();
        db::get_user(&conn, HOUSE_ID).unwrap().unwrap().doge
    }

    pub fn withdrawals(&self) -> Vec<db::WithdrawalRecord> {
        let conn = get_connection(&self.pool).unwrap();
        db::list_user_withdrawals(&conn, USER_ID, 100).unwrap()
    }

    /// BlockCypher answers both steps successfully.
    pub async fn mount_happy_chain(&self) {
        mount_skeleton(&self.chain).await;
        Mock::given(method("POST"))
            .and(path("/txs/send"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"tx": {"hash": TX_HASH}})))
            .mount(&self.chain)
            .await;
    }
}

pub async fn mount_skeleton(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/txs/new"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "tx": {"fees": 50_000_000},
            "tosign": ["ab".repeat(32), "cd".repeat(32)]
        })))
        .mount(server)
        .await;
}
