use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use teloxide::types::ChatId;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{OperatorAlert, Resolution, WithdrawalLimits, WithdrawalReceipt, WithdrawalRequest};
use crate::core::amount::Doge;
use crate::core::error::WithdrawError;
use crate::core::metrics;
use crate::core::rate_limiter::RateLimiter;
use crate::core::retry::{retry, RetryConfig};
use crate::storage::db::{self, NewWithdrawal, Reservation, WithdrawalRecord, WithdrawalStatus};
use crate::storage::{get_connection, DbPool};
use crate::wallet::{validate_doge_address, ChainApi, ChainError, Transfer, WalletCredentials, WalletSettings};

/// How a transfer attempt ended when it did not produce a hash.
enum TransferFailure {
    /// Nothing reached the network; safe to refund
    Definite(WithdrawError),
    /// The signed transaction may have been relayed
    Ambiguous(String),
}

fn chain_error(err: ChainError) -> WithdrawError {
    match err {
        ChainError::Rejected(reason) => WithdrawError::ApiRejected(reason),
        ChainError::Unreachable(reason) | ChainError::Indeterminate(reason) => WithdrawError::Network(reason),
    }
}

/// Held for the whole pipeline of one user. On drop the map entry is removed
/// unless another task still holds or waits for the same lock.
struct UserLock<'a> {
    locks: &'a DashMap<i64, Arc<Mutex<()>>>,
    user_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Executes withdrawals against the ledger and the blockchain API.
///
/// Shared behind an `Arc` by the bot handlers, the HTTP API and the CLI.
pub struct WithdrawalService {
    pool: DbPool,
    chain: Arc<dyn ChainApi>,
    wallet: WalletSettings,
    limits: WithdrawalLimits,
    retry: RetryConfig,
    cooldown: Option<Arc<RateLimiter>>,
    alerts: Option<Arc<dyn OperatorAlert>>,
    user_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl WithdrawalService {
    pub fn new(pool: DbPool, chain: Arc<dyn ChainApi>, wallet: WalletSettings, limits: WithdrawalLimits) -> Self {
        Self {
            pool,
            chain,
            wallet,
            limits,
            retry: RetryConfig::default(),
            cooldown: None,
            alerts: None,
            user_locks: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Enforces a cooldown between new withdrawals of the same user.
    #[must_use]
    pub fn with_cooldown(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.cooldown = Some(limiter);
        self
    }

    #[must_use]
    pub fn with_alerts(mut self, alerts: Arc<dyn OperatorAlert>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn limits(&self) -> &WithdrawalLimits {
        &self.limits
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn lock_user(&self, user_id: i64) -> UserLock<'_> {
        let lock = self
            .user_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        UserLock {
            locks: &self.user_locks,
            user_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Checks a requested amount against the configured minimum and fee.
    pub fn check_amount(&self, amount: Doge) -> Result<(), WithdrawError> {
        let minimum = self.limits.effective_minimum();
        if amount < minimum {
            return Err(WithdrawError::BelowMinimum { amount, minimum });
        }
        Ok(())
    }

    /// Runs one withdrawal to completion.
    pub async fn process(&self, request: WithdrawalRequest) -> Result<WithdrawalReceipt, WithdrawError> {
        let result = self.run(&request).await;
        match &result {
            Ok(receipt) if receipt.replayed => metrics::record_withdrawal("replayed"),
            Ok(_) => metrics::record_withdrawal("sent"),
            Err(err) => {
                log::warn!(
                    "Withdrawal for user {} (key {}) ended with {}: {}",
                    request.user_id,
                    request.request_key,
                    err.kind(),
                    err
                );
                metrics::record_withdrawal(err.kind());
                if err.needs_operator() {
                    self.alert(&format!(
                        "🚨 Saque precisa de verificação\nUsuário: {}\nValor: {} DOGE\nDestino: {}\nErro: {}",
                        request.user_id, request.amount, request.address, err
                    ))
                    .await;
                }
            }
        }
        result
    }

    async fn run(&self, request: &WithdrawalRequest) -> Result<WithdrawalReceipt, WithdrawError> {
        let credentials = WalletCredentials::validate(&self.wallet)?;
        let address = validate_doge_address(&request.address)?;
        self.check_amount(request.amount)?;
        if request.user_id == self.limits.house_id {
            return Err(WithdrawError::UnknownUser(request.user_id));
        }

        let _lock = self.lock_user(request.user_id).await;

        let new = NewWithdrawal {
            request_key: &request.request_key,
            user_id: request.user_id,
            address: &address,
            amount: request.amount,
            fee: self.limits.fee,
        };

        let existing = {
            let conn = get_connection(&self.pool)?;
            db::find_withdrawal_by_key(&conn, &request.request_key)?
        };
        if let Some(existing) = existing {
            return replay(existing, &new);
        }

        let chat = ChatId(request.user_id);
        if let Some(limiter) = &self.cooldown {
            if let Some(remaining) = limiter.get_remaining_time(chat).await {
                return Err(WithdrawError::Cooldown(remaining.as_secs().max(1)));
            }
        }

        let reservation = {
            let mut conn = get_connection(&self.pool)?;
            db::reserve_withdrawal(&mut conn, &new, self.limits.house_id)?
        };
        let record = match reservation {
            Reservation::Created(record) => record,
            Reservation::Existing(existing) => return replay(existing, &new),
        };
        if let Some(limiter) = &self.cooldown {
            limiter.update_rate_limit(chat).await;
        }

        log::info!(
            "💸 Withdrawal {} reserved: user {} → {} ({} DOGE, fee {} DOGE)",
            record.id,
            record.user_id,
            record.address,
            record.amount,
            record.fee
        );

        match self.transfer(&credentials, &record).await {
            Ok(tx_hash) => self.settle(&record, tx_hash),
            Err(TransferFailure::Definite(err)) => {
                self.refund(&record, &err)?;
                Err(err)
            }
            Err(TransferFailure::Ambiguous(reason)) => {
                let conn = get_connection(&self.pool)?;
                if !db::mark_withdrawal_unknown(&conn, record.id, &reason)? {
                    log::error!("Withdrawal {} left reserved state before it could be flagged", record.id);
                }
                Err(WithdrawError::BroadcastUnknown { id: record.id, reason })
            }
        }
    }

    async fn transfer(&self, credentials: &WalletCredentials, record: &WithdrawalRecord) -> Result<String, TransferFailure> {
        let value = record
            .amount
            .checked_sub(record.fee)
            .filter(|v| !v.is_zero())
            .ok_or_else(|| TransferFailure::Definite(WithdrawError::Ledger(format!("withdrawal {} has no value after fee", record.id))))?;

        let chain: &dyn ChainApi = self.chain.as_ref();
        let transfer = Transfer {
            from: &credentials.address,
            to: &record.address,
            value: value.koinu(),
            fee: record.fee.koinu(),
        };
        let transfer = &transfer;

        // Building a skeleton never moves funds, every failure here is definite
        let created = retry(&self.retry, "create", move || chain.create_skeleton(transfer)).await;
        let skeleton = created
            .result
            .map_err(|e| TransferFailure::Definite(chain_error(e)))?;

        let (signatures, pubkeys) = credentials
            .key
            .sign_all(&skeleton.tosign)
            .map_err(TransferFailure::Definite)?;
        let signed = skeleton.signed(signatures, pubkeys);
        let signed = &signed;

        // Re-sending the same signed payload cannot spend twice, so it is
        // retried; once any attempt may have been relayed the outcome is ambiguous
        let maybe_relayed = AtomicBool::new(false);
        let relayed = &maybe_relayed;
        let sent = retry(&self.retry, "broadcast", move || async move {
            let result = chain.broadcast(signed).await;
            if let Err(err) = &result {
                if err.may_have_been_processed() {
                    relayed.store(true, Ordering::SeqCst);
                }
            }
            result
        })
        .await;

        match sent.result {
            Ok(hash) => Ok(hash),
            Err(err) if maybe_relayed.load(Ordering::SeqCst) => Err(TransferFailure::Ambiguous(format!(
                "{} after {} attempt(s)",
                err, sent.attempts
            ))),
            Err(err) => Err(TransferFailure::Definite(chain_error(err))),
        }
    }

    fn settle(&self, record: &WithdrawalRecord, tx_hash: String) -> Result<WithdrawalReceipt, WithdrawError> {
        let marked = get_connection(&self.pool)
            .map_err(WithdrawError::from)
            .and_then(|conn| db::mark_withdrawal_sent(&conn, record.id, &tx_hash).map_err(WithdrawError::from));

        match marked {
            Ok(true) => {
                metrics::WITHDRAWN_KOINU_TOTAL.inc_by(record.amount.koinu().unsigned_abs());
                log::info!("✅ Withdrawal {} sent: tx {}", record.id, tx_hash);
                Ok(WithdrawalReceipt {
                    withdrawal_id: record.id,
                    tx_hash,
                    amount: record.amount,
                    fee: record.fee,
                    replayed: false,
                })
            }
            Ok(false) => {
                log::error!(
                    "🚨 Withdrawal {} broadcast as {} but the row was no longer open",
                    record.id,
                    tx_hash
                );
                Err(WithdrawError::Ledger(format!(
                    "withdrawal {} broadcast as {} but was not open",
                    record.id, tx_hash
                )))
            }
            Err(err) => {
                log::error!(
                    "🚨 Withdrawal {} broadcast as {} but could not be marked sent: {}",
                    record.id,
                    tx_hash,
                    err
                );
                Err(WithdrawError::Ledger(format!(
                    "withdrawal {} broadcast as {} but not recorded: {}",
                    record.id, tx_hash, err
                )))
            }
        }
    }

    fn refund(&self, record: &WithdrawalRecord, cause: &WithdrawError) -> Result<(), WithdrawError> {
        let mut conn = get_connection(&self.pool)?;
        match db::refund_withdrawal(&mut conn, record.id, self.limits.house_id, &cause.to_string()) {
            Ok(true) => {
                log::info!("↩️ Withdrawal {} refunded: {}", record.id, cause);
                Ok(())
            }
            Ok(false) => Err(WithdrawError::Ledger(format!(
                "withdrawal {} was closed before its refund",
                record.id
            ))),
            Err(err) => {
                log::error!(
                    "🚨 Withdrawal {} failed ({}) and the refund did not apply: {}",
                    record.id,
                    cause,
                    err
                );
                Err(WithdrawError::Ledger(format!("refund of withdrawal {} failed: {}", record.id, err)))
            }
        }
    }

    /// Settles a stuck withdrawal by hand.
    ///
    /// Holds the owner's lock, so a withdrawal still in flight is never resolved
    /// underneath its pipeline.
    pub async fn resolve(&self, id: i64, resolution: Resolution) -> Result<WithdrawalRecord, WithdrawError> {
        let owner = {
            let conn = get_connection(&self.pool)?;
            db::get_withdrawal(&conn, id)?.ok_or_else(|| WithdrawError::Ledger(format!("withdrawal {id} does not exist")))?
        };
        let _lock = self.lock_user(owner.user_id).await;

        let mut conn = get_connection(&self.pool)?;
        let record = db::get_withdrawal(&conn, id)?
            .ok_or_else(|| WithdrawError::Ledger(format!("withdrawal {id} does not exist")))?;
        if !record.status.is_open() {
            return Err(WithdrawError::Ledger(format!(
                "withdrawal {} is already {}",
                id,
                record.status.as_str()
            )));
        }

        match resolution {
            Resolution::Sent(hash) => {
                if !db::mark_withdrawal_sent(&conn, id, hash.trim())? {
                    return Err(WithdrawError::Ledger(format!("withdrawal {id} could not be marked sent")));
                }
                metrics::WITHDRAWN_KOINU_TOTAL.inc_by(record.amount.koinu().unsigned_abs());
                log::info!("🛠️ Withdrawal {} resolved as sent: {}", id, hash.trim());
            }
            Resolution::Refund => {
                if !db::refund_withdrawal(&mut conn, id, self.limits.house_id, "refunded by operator")? {
                    return Err(WithdrawError::Ledger(format!("withdrawal {id} could not be refunded")));
                }
                log::info!("🛠️ Withdrawal {} resolved as refunded", id);
            }
        }

        db::get_withdrawal(&conn, id)?.ok_or_else(|| WithdrawError::Ledger(format!("withdrawal {id} vanished")))
    }

    async fn alert(&self, text: &str) {
        if let Some(alerts) = &self.alerts {
            alerts.alert(text).await;
        }
    }
}

/// Answers a request whose key already has a row.
fn replay(existing: WithdrawalRecord, new: &NewWithdrawal<'_>) -> Result<WithdrawalReceipt, WithdrawError> {
    if existing.user_id != new.user_id || existing.address != new.address || existing.amount != new.amount {
        return Err(WithdrawError::DuplicateRequest(existing.request_key));
    }

    match existing.status {
        WithdrawalStatus::Sent => {
            let tx_hash = existing
                .tx_hash
                .ok_or_else(|| WithdrawError::Ledger(format!("withdrawal {} is sent without a hash", existing.id)))?;
            log::info!("🔁 Replayed withdrawal {} for key {}", existing.id, existing.request_key);
            Ok(WithdrawalReceipt {
                withdrawal_id: existing.id,
                tx_hash,
                amount: existing.amount,
                fee: existing.fee,
                replayed: true,
            })
        }
        WithdrawalStatus::Reserved | WithdrawalStatus::Unknown => Err(WithdrawError::InProgress(existing.id)),
        WithdrawalStatus::Failed => Err(WithdrawError::ApiRejected(format!(
            "withdrawal {} already failed: {}",
            existing.id,
            existing.error.unwrap_or_else(|| "no details".to_string())
        ))),
    }
}
