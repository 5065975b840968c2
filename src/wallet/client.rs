//! BlockCypher transaction API.
//!
//! Two calls move a withdrawal on chain: `txs/new` builds an unsigned skeleton
//! with the digests to sign, `txs/send` broadcasts the skeleton together with
//! the signatures.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::metrics::BLOCKCHAIN_REQUEST_DURATION_SECONDS;
use crate::core::retry::Retryable;

/// Failure of a single blockchain API call.
///
/// `Unreachable` means the request certainly had no effect. `Indeterminate`
/// means it may have been processed, which matters for broadcasts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("API unreachable: {0}")]
    Unreachable(String),

    #[error("API rejected the request: {0}")]
    Rejected(String),

    #[error("API outcome indeterminate: {0}")]
    Indeterminate(String),
}

impl ChainError {
    /// True unless the API definitely refused the request.
    pub fn may_have_been_processed(&self) -> bool {
        matches!(self, ChainError::Indeterminate(_))
    }
}

impl Retryable for ChainError {
    fn is_retryable(&self) -> bool {
        !matches!(self, ChainError::Rejected(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiErrorEntry {
    #[serde(default)]
    pub error: String,
}

/// Transaction skeleton as returned by `txs/new` and sent back to `txs/send`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TxSkeleton {
    pub tx: serde_json::Value,
    #[serde(default)]
    pub tosign: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pubkeys: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiErrorEntry>,
}

impl TxSkeleton {
    /// Attaches one signature and public key per `tosign` digest.
    #[must_use]
    pub fn signed(mut self, signatures: Vec<String>, pubkeys: Vec<String>) -> Self {
        self.signatures = signatures;
        self.pubkeys = pubkeys;
        self
    }
}

/// Single-input single-output transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer<'a> {
    pub from: &'a str,
    pub to: &'a str,
    /// Output value in koinu
    pub value: i64,
    /// Miner fee in koinu
    pub fee: i64,
}

#[derive(Serialize)]
struct NewTxRequest<'a> {
    inputs: Vec<Addresses<'a>>,
    outputs: Vec<Output<'a>>,
    fees: i64,
}

#[derive(Serialize)]
struct Addresses<'a> {
    addresses: Vec<&'a str>,
}

#[derive(Serialize)]
struct Output<'a> {
    addresses: Vec<&'a str>,
    value: i64,
}

#[derive(Deserialize)]
struct SendResponse {
    tx: SentTx,
}

#[derive(Deserialize)]
struct SentTx {
    hash: String,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    errors: Vec<ApiErrorEntry>,
}

impl ErrorBody {
    fn describe(self, status: StatusCode) -> String {
        let mut parts: Vec<String> = self.error.into_iter().collect();
        parts.extend(self.errors.into_iter().map(|e| e.error).filter(|e| !e.is_empty()));
        if parts.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, parts.join("; "))
        }
    }
}

/// Blockchain operations the withdrawal pipeline depends on.
#[async_trait]
pub trait ChainApi: Send + Sync {
    /// Builds an unsigned transaction spending from the house address.
    async fn create_skeleton(&self, transfer: &Transfer<'_>) -> Result<TxSkeleton, ChainError>;

    /// Broadcasts a signed skeleton and returns the transaction hash.
    async fn broadcast(&self, signed: &TxSkeleton) -> Result<String, ChainError>;
}

/// [`ChainApi`] backed by the BlockCypher REST API.
pub struct BlockCypherClient {
    http: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl fmt::Debug for BlockCypherClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCypherClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl BlockCypherClient {
    pub fn new(base_url: &str, token: Option<SecretString>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn token(&self) -> Result<&str, ChainError> {
        self.token
            .as_ref()
            .map(|t| t.expose_secret())
            .ok_or_else(|| ChainError::Rejected("BLOCKCYPHER_TOKEN is not configured".to_string()))
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ChainError>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .query(&[("token", self.token()?)])
            .json(body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ChainError::Indeterminate(format!("reading {} response: {}", path, e.without_url())))?;

        if status.is_success() {
            return serde_json::from_str(&text)
                .map_err(|e| ChainError::Indeterminate(format!("unexpected {} response: {}", path, e)));
        }

        let reason = serde_json::from_str::<ErrorBody>(&text)
            .unwrap_or_default()
            .describe(status);
        Err(classify_status(status, reason))
    }
}

fn classify_transport(err: reqwest::Error) -> ChainError {
    let err = err.without_url();
    if err.is_connect() || err.is_builder() {
        ChainError::Unreachable(err.to_string())
    } else {
        ChainError::Indeterminate(err.to_string())
    }
}

fn classify_status(status: StatusCode, reason: String) -> ChainError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ChainError::Unreachable(reason)
    } else if status.is_client_error() {
        ChainError::Rejected(reason)
    } else {
        ChainError::Indeterminate(reason)
    }
}

#[async_trait]
impl ChainApi for BlockCypherClient {
    async fn create_skeleton(&self, transfer: &Transfer<'_>) -> Result<TxSkeleton, ChainError> {
        let _timer = BLOCKCHAIN_REQUEST_DURATION_SECONDS
            .with_label_values(&["create"])
            .start_timer();

        let request = NewTxRequest {
            inputs: vec![Addresses {
                addresses: vec![transfer.from],
            }],
            outputs: vec![Output {
                addresses: vec![transfer.to],
                value: transfer.value,
            }],
            fees: transfer.fee,
        };

        let skeleton: TxSkeleton = self.post("txs/new", &request).await?;
        if !skeleton.errors.is_empty() {
            let reasons: Vec<String> = skeleton.errors.into_iter().map(|e| e.error).collect();
            return Err(ChainError::Rejected(reasons.join("; ")));
        }
        if skeleton.tosign.is_empty() {
            return Err(ChainError::Rejected("skeleton has no digests to sign".to_string()));
        }
        log::debug!(
            "Created skeleton for {} koinu to {} ({} inputs to sign)",
            transfer.value,
            transfer.to,
            skeleton.tosign.len()
        );
        Ok(skeleton)
    }

    async fn broadcast(&self, signed: &TxSkeleton) -> Result<String, ChainError> {
        let _timer = BLOCKCHAIN_REQUEST_DURATION_SECONDS
            .with_label_values(&["broadcast"])
            .start_timer();

        let response: SendResponse = self.post("txs/send", signed).await?;
        if response.tx.hash.is_empty() {
            return Err(ChainError::Indeterminate("broadcast response without hash".to_string()));
        }
        Ok(response.tx.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HOUSE: &str = "DH5yaieqoZN36fDVciNyRueRGvGLR3mr7L";
    const DEST: &str = "DBXu2kgc3xtvCUWFcxFE3r9hEYgmuaaCyD";

    fn client(server: &MockServer) -> BlockCypherClient {
        BlockCypherClient::new(
            &server.uri(),
            Some(SecretString::from("tok".to_string())),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn transfer() -> Transfer<'static> {
        Transfer {
            from: HOUSE,
            to: DEST,
            value: 150_000_000,
            fee: 50_000_000,
        }
    }

    #[tokio::test]
    async fn test_create_skeleton_sends_transfer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/txs/new"))
            .and(query_param("token", "tok"))
            .and(body_partial_json(json!({
                "inputs": [{"addresses": [HOUSE]}],
                "outputs": [{"addresses": [DEST], "value": 150_000_000}],
                "fees": 50_000_000
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "tx": {"fees": 50_000_000},
                "tosign": ["aa".repeat(32)]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let skeleton = client(&server).create_skeleton(&transfer()).await.unwrap();
        assert_eq!(skeleton.tosign, vec!["aa".repeat(32)]);
        assert_eq!(skeleton.tx["fees"], json!(50_000_000));
    }

    #[tokio::test]
    async fn test_create_skeleton_reports_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/txs/new"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "errors": [{"error": "Not enough funds in 1 inputs to pay for 1 outputs"}]
            })))
            .mount(&server)
            .await;

        let err = client(&server).create_skeleton(&transfer()).await.unwrap_err();
        match err {
            ChainError::Rejected(reason) => assert!(reason.contains("Not enough funds")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_broadcast_returns_hash() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/txs/send"))
            .and(body_partial_json(json!({"signatures": ["3044"], "pubkeys": ["02ab"]})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"tx": {"hash": "deadbeef"}})))
            .mount(&server)
            .await;

        let signed = TxSkeleton {
            tx: json!({}),
            tosign: vec!["aa".repeat(32)],
            signatures: vec![],
            pubkeys: vec![],
            errors: vec![],
        }
        .signed(vec!["3044".into()], vec!["02ab".into()]);

        let hash = client(&server).broadcast(&signed).await.unwrap();
        assert_eq!(hash, "deadbeef");
    }

    #[tokio::test]
    async fn test_server_errors_are_indeterminate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/txs/send"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let signed = TxSkeleton {
            tx: json!({}),
            tosign: vec![],
            signatures: vec![],
            pubkeys: vec![],
            errors: vec![],
        };
        let err = client(&server).broadcast(&signed).await.unwrap_err();
        assert!(err.may_have_been_processed());
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        // Nothing listens on port 9 on the test host
        let client = BlockCypherClient::new(
            "http://127.0.0.1:9",
            Some(SecretString::from("tok".to_string())),
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client.create_skeleton(&transfer()).await.unwrap_err();
        assert!(matches!(err, ChainError::Unreachable(_)), "{err:?}");
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "x".into()),
            ChainError::Rejected(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "x".into()),
            ChainError::Unreachable(_)
        ));
        assert!(classify_status(StatusCode::INTERNAL_SERVER_ERROR, "x".into()).may_have_been_processed());
    }
}
