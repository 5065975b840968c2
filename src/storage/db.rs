use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Result, Row, TransactionBehavior};

use crate::core::amount::Doge;
use crate::core::error::{AppResult, WithdrawError};
use crate::storage::migrations;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// A ledger account. The house account is a regular row with a reserved id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Telegram ID
    pub telegram_id: i64,
    /// Display name (Telegram first name)
    pub name: Option<String>,
    /// Fiat-like balance in cents, kept for legacy reward schemes
    pub balance_usd_cents: i64,
    /// Withdrawable DOGE
    pub doge: Doge,
    pub created_at: String,
}

/// Create a new database connection pool
///
/// Initializes a pool with up to 10 connections and applies the embedded
/// schema migrations on the first connection.
///
/// # Example
///
/// ```no_run
/// use dogeads::storage::create_pool;
///
/// let pool = create_pool("dogeads.sqlite")?;
/// # Ok::<(), dogeads::core::AppError>(())
/// ```
pub fn create_pool(database_path: &str) -> AppResult<DbPool> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(Duration::from_secs(10))?;
        conn.pragma_update(None, "foreign_keys", true)
    });
    let pool = Pool::builder().max_size(10).build(manager)?;

    let mut conn = pool.get()?;
    migrations::run_migrations(&mut conn)?;

    Ok(pool)
}

/// Get a connection from the pool
///
/// The connection is returned to the pool when dropped.
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}

fn user_from_row(row: &Row<'_>) -> Result<User> {
    Ok(User {
        telegram_id: row.get(0)?,
        name: row.get(1)?,
        balance_usd_cents: row.get(2)?,
        doge: Doge::from_koinu(row.get(3)?),
        created_at: row.get(4)?,
    })
}

/// Registers a user on first contact; refreshes the display name otherwise.
///
/// Returns `true` if the row was created.
pub fn register_user(conn: &Connection, telegram_id: i64, name: Option<&str>) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO users (telegram_id, name) VALUES (?1, ?2)",
        params![telegram_id, name],
    )?;
    if inserted == 0 && name.is_some() {
        conn.execute(
            "UPDATE users SET name = ?2 WHERE telegram_id = ?1",
            params![telegram_id, name],
        )?;
    }
    Ok(inserted == 1)
}

/// Returns `Ok(None)` if the user does not exist.
pub fn get_user(conn: &Connection, telegram_id: i64) -> Result<Option<User>> {
    conn.query_row(
        "SELECT telegram_id, name, balance_usd_cents, doge_koinu, created_at FROM users WHERE telegram_id = ?1",
        params![telegram_id],
        user_from_row,
    )
    .optional()
}

/// Creates the house row if missing.
pub fn ensure_house_account(conn: &Connection, house_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (telegram_id, name) VALUES (?1, 'house')",
        params![house_id],
    )?;
    Ok(())
}

/// Credits `amount` to the user.
///
/// Returns the new balance, or `None` when the user is not registered.
pub fn add_balance(conn: &Connection, telegram_id: i64, amount: Doge) -> Result<Option<Doge>> {
    let changed = conn.execute(
        "UPDATE users SET doge_koinu = doge_koinu + ?1 WHERE telegram_id = ?2",
        params![amount.koinu(), telegram_id],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    Ok(get_user(conn, telegram_id)?.map(|u| u.doge))
}

// ---------------------------------------------------------------------------
// Ads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ad {
    pub id: i64,
    pub url: String,
    pub watch_seconds: i64,
    pub reward: Doge,
    pub active: bool,
}

fn ad_from_row(row: &Row<'_>) -> Result<Ad> {
    Ok(Ad {
        id: row.get(0)?,
        url: row.get(1)?,
        watch_seconds: row.get(2)?,
        reward: Doge::from_koinu(row.get(3)?),
        active: row.get::<_, i64>(4)? != 0,
    })
}

pub fn create_ad(conn: &Connection, url: &str, watch_seconds: i64, reward: Doge) -> Result<i64> {
    conn.execute(
        "INSERT INTO ads (url, watch_seconds, reward_koinu) VALUES (?1, ?2, ?3)",
        params![url, watch_seconds, reward.koinu()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn set_ad_active(conn: &Connection, ad_id: i64, active: bool) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE ads SET active = ?2 WHERE id = ?1",
        params![ad_id, active as i64],
    )?;
    Ok(changed == 1)
}

pub fn list_active_ads(conn: &Connection) -> Result<Vec<Ad>> {
    let mut stmt =
        conn.prepare("SELECT id, url, watch_seconds, reward_koinu, active FROM ads WHERE active = 1 ORDER BY id")?;
    let rows = stmt.query_map([], ad_from_row)?;
    rows.collect()
}

/// First active ad the user has not been rewarded for yet.
pub fn next_ad_for_user(conn: &Connection, telegram_id: i64) -> Result<Option<Ad>> {
    conn.query_row(
        "SELECT a.id, a.url, a.watch_seconds, a.reward_koinu, a.active FROM ads a
         WHERE a.active = 1
           AND NOT EXISTS (
               SELECT 1 FROM ad_views v
               WHERE v.ad_id = a.id AND v.user_id = ?1 AND v.rewarded_at IS NOT NULL
           )
         ORDER BY a.id LIMIT 1",
        params![telegram_id],
        ad_from_row,
    )
    .optional()
}

/// Records that the user opened the ad. The first start time wins.
pub fn start_ad_view(conn: &Connection, telegram_id: i64, ad_id: i64, now: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO ad_views (user_id, ad_id, started_at) VALUES (?1, ?2, ?3)",
        params![telegram_id, ad_id, now],
    )?;
    Ok(())
}

/// Outcome of [`confirm_ad_view`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdConfirmation {
    Rewarded { ad_id: i64, reward: Doge, balance: Doge },
    TooEarly { ad_id: i64, remaining_secs: i64 },
    NothingPending,
}

/// Credits the latest unrewarded ad view once its watch time has elapsed.
///
/// The reward flag and the balance credit are written in one transaction, so a
/// view is paid at most once.
pub fn confirm_ad_view(conn: &mut Connection, telegram_id: i64, now: i64) -> Result<AdConfirmation> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let pending = tx
        .query_row(
            "SELECT v.ad_id, v.started_at, a.watch_seconds, a.reward_koinu
             FROM ad_views v JOIN ads a ON a.id = v.ad_id
             WHERE v.user_id = ?1 AND v.rewarded_at IS NULL
             ORDER BY v.started_at DESC, v.ad_id DESC LIMIT 1",
            params![telegram_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((ad_id, started_at, watch_seconds, reward_koinu)) = pending else {
        return Ok(AdConfirmation::NothingPending);
    };

    let elapsed = now - started_at;
    if elapsed < watch_seconds {
        return Ok(AdConfirmation::TooEarly {
            ad_id,
            remaining_secs: watch_seconds - elapsed,
        });
    }

    tx.execute(
        "UPDATE ad_views SET rewarded_at = ?3 WHERE user_id = ?1 AND ad_id = ?2 AND rewarded_at IS NULL",
        params![telegram_id, ad_id, now],
    )?;
    tx.execute(
        "UPDATE users SET doge_koinu = doge_koinu + ?1 WHERE telegram_id = ?2",
        params![reward_koinu, telegram_id],
    )?;
    let balance: i64 = tx.query_row(
        "SELECT doge_koinu FROM users WHERE telegram_id = ?1",
        params![telegram_id],
        |row| row.get(0),
    )?;
    tx.commit()?;

    Ok(AdConfirmation::Rewarded {
        ad_id,
        reward: Doge::from_koinu(reward_koinu),
        balance: Doge::from_koinu(balance),
    })
}

// ---------------------------------------------------------------------------
// Withdrawals
// ---------------------------------------------------------------------------

/// Lifecycle of a withdrawal row.
///
/// `Reserved` holds the debit while the transfer is in flight. `Unknown` means
/// the broadcast may or may not have reached the network; only an operator can
/// move it to `Sent` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalStatus {
    Reserved,
    Sent,
    Failed,
    Unknown,
}

impl WithdrawalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WithdrawalStatus::Reserved => "reserved",
            WithdrawalStatus::Sent => "sent",
            WithdrawalStatus::Failed => "failed",
            WithdrawalStatus::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "reserved" => Some(WithdrawalStatus::Reserved),
            "sent" => Some(WithdrawalStatus::Sent),
            "failed" => Some(WithdrawalStatus::Failed),
            "unknown" => Some(WithdrawalStatus::Unknown),
            _ => None,
        }
    }

    /// Funds are still debited and no final outcome is recorded.
    pub fn is_open(self) -> bool {
        matches!(self, WithdrawalStatus::Reserved | WithdrawalStatus::Unknown)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRecord {
    pub id: i64,
    pub request_key: String,
    pub user_id: i64,
    pub address: String,
    pub amount: Doge,
    pub fee: Doge,
    pub status: WithdrawalStatus,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

const WITHDRAWAL_COLUMNS: &str =
    "id, request_key, user_id, address, amount_koinu, fee_koinu, status, tx_hash, error, created_at, updated_at";

fn withdrawal_from_row(row: &Row<'_>) -> Result<WithdrawalRecord> {
    let status: String = row.get(6)?;
    let status = WithdrawalStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("unknown withdrawal status {status}").into(),
        )
    })?;
    Ok(WithdrawalRecord {
        id: row.get(0)?,
        request_key: row.get(1)?,
        user_id: row.get(2)?,
        address: row.get(3)?,
        amount: Doge::from_koinu(row.get(4)?),
        fee: Doge::from_koinu(row.get(5)?),
        status,
        tx_hash: row.get(7)?,
        error: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Input of [`reserve_withdrawal`].
#[derive(Debug, Clone)]
pub struct NewWithdrawal<'a> {
    pub request_key: &'a str,
    pub user_id: i64,
    pub address: &'a str,
    /// Debited from both balances; includes `fee`
    pub amount: Doge,
    pub fee: Doge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// Balances were debited and a new row inserted
    Created(WithdrawalRecord),
    /// A row with the same request key already exists; nothing was debited
    Existing(WithdrawalRecord),
}

pub fn get_withdrawal(conn: &Connection, id: i64) -> Result<Option<WithdrawalRecord>> {
    conn.query_row(
        &format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = ?1"),
        params![id],
        withdrawal_from_row,
    )
    .optional()
}

pub fn find_withdrawal_by_key(conn: &Connection, request_key: &str) -> Result<Option<WithdrawalRecord>> {
    conn.query_row(
        &format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE request_key = ?1"),
        params![request_key],
        withdrawal_from_row,
    )
    .optional()
}

/// Debits user and house and records the withdrawal, all-or-nothing.
///
/// Runs under `BEGIN IMMEDIATE`, so concurrent reservations against the same
/// house balance are serialized by SQLite's write lock.
pub fn reserve_withdrawal(
    conn: &mut Connection,
    new: &NewWithdrawal<'_>,
    house_id: i64,
) -> std::result::Result<Reservation, WithdrawError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(existing) = find_withdrawal_by_key(&tx, new.request_key)? {
        return Ok(Reservation::Existing(existing));
    }

    let user = get_user(&tx, new.user_id)?.ok_or(WithdrawError::UnknownUser(new.user_id))?;
    if user.doge < new.amount {
        return Err(WithdrawError::InsufficientUserBalance {
            available: user.doge,
            requested: new.amount,
        });
    }

    let house = get_user(&tx, house_id)?
        .ok_or_else(|| WithdrawError::Ledger(format!("house account {house_id} does not exist")))?;
    if house.doge < new.amount {
        return Err(WithdrawError::InsufficientHouseBalance {
            available: house.doge,
            requested: new.amount,
        });
    }

    for account in [new.user_id, house_id] {
        let changed = tx.execute(
            "UPDATE users SET doge_koinu = doge_koinu - ?1 WHERE telegram_id = ?2 AND doge_koinu >= ?1",
            params![new.amount.koinu(), account],
        )?;
        if changed != 1 {
            return Err(WithdrawError::Ledger(format!("debit of account {account} did not apply")));
        }
    }

    tx.execute(
        "INSERT INTO withdrawals (request_key, user_id, address, amount_koinu, fee_koinu, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new.request_key,
            new.user_id,
            new.address,
            new.amount.koinu(),
            new.fee.koinu(),
            WithdrawalStatus::Reserved.as_str()
        ],
    )?;
    let id = tx.last_insert_rowid();
    let record = get_withdrawal(&tx, id)?
        .ok_or_else(|| WithdrawError::Ledger(format!("withdrawal {id} vanished after insert")))?;
    tx.commit()?;

    Ok(Reservation::Created(record))
}

/// Records the broadcast transaction hash. Only open rows can be settled.
pub fn mark_withdrawal_sent(conn: &Connection, id: i64, tx_hash: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE withdrawals SET status = 'sent', tx_hash = ?2, error = NULL, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?1 AND status IN ('reserved', 'unknown')",
        params![id, tx_hash],
    )?;
    Ok(changed == 1)
}

/// Flags a reserved row whose broadcast outcome could not be determined.
pub fn mark_withdrawal_unknown(conn: &Connection, id: i64, error: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE withdrawals SET status = 'unknown', error = ?2, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?1 AND status = 'reserved'",
        params![id, error],
    )?;
    Ok(changed == 1)
}

/// Returns the reserved amount to user and house and closes the row as failed.
///
/// Returns `false` if the row is not open (already sent or already refunded).
pub fn refund_withdrawal(
    conn: &mut Connection,
    id: i64,
    house_id: i64,
    error: &str,
) -> std::result::Result<bool, WithdrawError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(record) = get_withdrawal(&tx, id)? else {
        return Err(WithdrawError::Ledger(format!("withdrawal {id} does not exist")));
    };
    if !record.status.is_open() {
        return Ok(false);
    }

    for account in [record.user_id, house_id] {
        let changed = tx.execute(
            "UPDATE users SET doge_koinu = doge_koinu + ?1 WHERE telegram_id = ?2",
            params![record.amount.koinu(), account],
        )?;
        if changed != 1 {
            return Err(WithdrawError::Ledger(format!("refund of account {account} did not apply")));
        }
    }
    tx.execute(
        "UPDATE withdrawals SET status = 'failed', error = ?2, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
        params![id, error],
    )?;
    tx.commit()?;
    Ok(true)
}

/// Rows still holding funds: `reserved` and `unknown`.
pub fn list_open_withdrawals(conn: &Connection) -> Result<Vec<WithdrawalRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE status IN ('reserved', 'unknown') ORDER BY id"
    ))?;
    let rows = stmt.query_map([], withdrawal_from_row)?;
    rows.collect()
}

pub fn list_user_withdrawals(conn: &Connection, telegram_id: i64, limit: usize) -> Result<Vec<WithdrawalRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![telegram_id, limit as i64], withdrawal_from_row)?;
    rows.collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    pub(crate) fn test_pool() -> (TempDir, DbPool) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.sqlite");
        let pool = create_pool(path.to_str().unwrap()).unwrap();
        (dir, pool)
    }

    fn doge(s: &str) -> Doge {
        s.parse().unwrap()
    }

    const HOUSE: i64 = 0;

    fn seeded(user_balance: &str, house_balance: &str) -> (TempDir, DbPool) {
        let (dir, pool) = test_pool();
        let conn = pool.get().unwrap();
        ensure_house_account(&conn, HOUSE).unwrap();
        register_user(&conn, 10, Some("Ana")).unwrap();
        add_balance(&conn, 10, doge(user_balance)).unwrap();
        add_balance(&conn, HOUSE, doge(house_balance)).unwrap();
        (dir, pool)
    }

    #[test]
    fn test_register_user_is_idempotent_and_updates_name() {
        let (_dir, pool) = test_pool();
        let conn = pool.get().unwrap();

        assert!(register_user(&conn, 5, Some("Bia")).unwrap());
        assert!(!register_user(&conn, 5, Some("Beatriz")).unwrap());

        let user = get_user(&conn, 5).unwrap().unwrap();
        assert_eq!(user.name.as_deref(), Some("Beatriz"));
        assert_eq!(user.doge, Doge::ZERO);
        assert!(get_user(&conn, 6).unwrap().is_none());
    }

    #[test]
    fn test_add_balance_unknown_user() {
        let (_dir, pool) = test_pool();
        let conn = pool.get().unwrap();
        assert_eq!(add_balance(&conn, 99, doge("1")).unwrap(), None);
    }

    #[test]
    fn test_ad_reward_paid_once_after_watch_time() {
        let (_dir, pool) = test_pool();
        let mut conn = pool.get().unwrap();
        register_user(&conn, 1, None).unwrap();
        let ad = create_ad(&conn, "https://ads.example/1", 30, doge("0.25")).unwrap();

        assert_eq!(confirm_ad_view(&mut conn, 1, 1000).unwrap(), AdConfirmation::NothingPending);

        let next = next_ad_for_user(&conn, 1).unwrap().unwrap();
        assert_eq!(next.id, ad);
        start_ad_view(&conn, 1, ad, 1000).unwrap();
        // a second /ganhar keeps the first start time
        start_ad_view(&conn, 1, ad, 1020).unwrap();

        assert_eq!(
            confirm_ad_view(&mut conn, 1, 1010).unwrap(),
            AdConfirmation::TooEarly {
                ad_id: ad,
                remaining_secs: 20
            }
        );
        assert_eq!(
            confirm_ad_view(&mut conn, 1, 1030).unwrap(),
            AdConfirmation::Rewarded {
                ad_id: ad,
                reward: doge("0.25"),
                balance: doge("0.25")
            }
        );
        assert_eq!(confirm_ad_view(&mut conn, 1, 1040).unwrap(), AdConfirmation::NothingPending);
        assert!(next_ad_for_user(&conn, 1).unwrap().is_none());
    }

    #[test]
    fn test_inactive_ads_are_not_served() {
        let (_dir, pool) = test_pool();
        let conn = pool.get().unwrap();
        register_user(&conn, 1, None).unwrap();
        let ad = create_ad(&conn, "https://ads.example/x", 5, doge("1")).unwrap();
        assert!(set_ad_active(&conn, ad, false).unwrap());
        assert!(next_ad_for_user(&conn, 1).unwrap().is_none());
        assert!(list_active_ads(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_reserve_debits_both_balances() {
        let (_dir, pool) = seeded("10", "100");
        let mut conn = pool.get().unwrap();

        let new = NewWithdrawal {
            request_key: "k1",
            user_id: 10,
            address: "DAddr",
            amount: doge("4"),
            fee: doge("0.5"),
        };
        let Reservation::Created(record) = reserve_withdrawal(&mut conn, &new, HOUSE).unwrap() else {
            panic!("expected a new reservation");
        };
        assert_eq!(record.status, WithdrawalStatus::Reserved);
        assert_eq!(get_user(&conn, 10).unwrap().unwrap().doge, doge("6"));
        assert_eq!(get_user(&conn, HOUSE).unwrap().unwrap().doge, doge("96"));

        // same key: no second debit
        assert!(matches!(
            reserve_withdrawal(&mut conn, &new, HOUSE).unwrap(),
            Reservation::Existing(r) if r.id == record.id
        ));
        assert_eq!(get_user(&conn, 10).unwrap().unwrap().doge, doge("6"));
    }

    #[test]
    fn test_reserve_rejects_insufficient_balances() {
        let (_dir, pool) = seeded("3", "2");
        let mut conn = pool.get().unwrap();

        let too_much = NewWithdrawal {
            request_key: "a",
            user_id: 10,
            address: "DAddr",
            amount: doge("5"),
            fee: doge("0.5"),
        };
        assert!(matches!(
            reserve_withdrawal(&mut conn, &too_much, HOUSE),
            Err(WithdrawError::InsufficientUserBalance { .. })
        ));

        let house_short = NewWithdrawal {
            request_key: "b",
            amount: doge("2.5"),
            ..too_much
        };
        assert!(matches!(
            reserve_withdrawal(&mut conn, &house_short, HOUSE),
            Err(WithdrawError::InsufficientHouseBalance { .. })
        ));

        assert_eq!(get_user(&conn, 10).unwrap().unwrap().doge, doge("3"));
        assert_eq!(get_user(&conn, HOUSE).unwrap().unwrap().doge, doge("2"));
        assert!(list_open_withdrawals(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_refund_restores_balances_once() {
        let (_dir, pool) = seeded("10", "10");
        let mut conn = pool.get().unwrap();
        let new = NewWithdrawal {
            request_key: "r",
            user_id: 10,
            address: "DAddr",
            amount: doge("10"),
            fee: doge("1"),
        };
        let Reservation::Created(record) = reserve_withdrawal(&mut conn, &new, HOUSE).unwrap() else {
            panic!("expected a new reservation");
        };

        assert!(refund_withdrawal(&mut conn, record.id, HOUSE, "rejected").unwrap());
        assert!(!refund_withdrawal(&mut conn, record.id, HOUSE, "rejected").unwrap());

        assert_eq!(get_user(&conn, 10).unwrap().unwrap().doge, doge("10"));
        assert_eq!(get_user(&conn, HOUSE).unwrap().unwrap().doge, doge("10"));
        let stored = get_withdrawal(&conn, record.id).unwrap().unwrap();
        assert_eq!(stored.status, WithdrawalStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("rejected"));
    }

    #[test]
    fn test_status_transitions() {
        let (_dir, pool) = seeded("10", "10");
        let mut conn = pool.get().unwrap();
        let new = NewWithdrawal {
            request_key: "s",
            user_id: 10,
            address: "DAddr",
            amount: doge("2"),
            fee: doge("1"),
        };
        let Reservation::Created(record) = reserve_withdrawal(&mut conn, &new, HOUSE).unwrap() else {
            panic!("expected a new reservation");
        };

        assert!(mark_withdrawal_unknown(&conn, record.id, "timeout").unwrap());
        assert!(!mark_withdrawal_unknown(&conn, record.id, "timeout").unwrap());
        assert_eq!(list_open_withdrawals(&conn).unwrap().len(), 1);

        assert!(mark_withdrawal_sent(&conn, record.id, "abc").unwrap());
        assert!(!mark_withdrawal_sent(&conn, record.id, "def").unwrap());
        assert!(!refund_withdrawal(&mut conn, record.id, HOUSE, "late").unwrap());

        let stored = get_withdrawal(&conn, record.id).unwrap().unwrap();
        assert_eq!(stored.status, WithdrawalStatus::Sent);
        assert_eq!(stored.tx_hash.as_deref(), Some("abc"));
        assert!(stored.error.is_none());
        assert_eq!(list_user_withdrawals(&conn, 10, 5).unwrap().len(), 1);
        assert!(list_open_withdrawals(&conn).unwrap().is_empty());
    }
}
