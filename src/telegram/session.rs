//! Withdrawal dialog state
//!
//! Each user walks through amount → address → confirmation. State lives in
//! process memory only and expires after `SESSION_TTL_SECS` of inactivity.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use tokio::sync::Mutex;

use crate::core::amount::Doge;
use crate::wallet::validate_doge_address;
use crate::withdraw::WithdrawalLimits;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Idle,
    AwaitingAmount,
    AwaitingAddress {
        amount: Doge,
    },
    AwaitingConfirm {
        amount: Doge,
        address: String,
        /// Generated once per dialog; every confirm of this dialog reuses it
        request_key: String,
    },
}

impl Session {
    pub fn is_active(&self) -> bool {
        !matches!(self, Session::Idle)
    }
}

/// What the user did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input<'a> {
    Start,
    Text(&'a str),
    Confirm,
    Cancel,
}

/// What the bot should answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    AskAmount { minimum: Doge },
    InvalidAmount,
    BelowMinimum { minimum: Doge },
    AskAddress { amount: Doge },
    InvalidAddress,
    AskConfirm { amount: Doge, fee: Doge, receive: Doge, address: String },
    /// Run the withdrawal now
    Execute { amount: Doge, address: String, request_key: String },
    /// Typed text while the confirm buttons are shown
    UseButtons,
    Cancelled,
    NothingPending,
}

/// Pure transition function of the dialog.
pub fn advance(state: Session, input: Input<'_>, limits: &WithdrawalLimits) -> (Session, Prompt) {
    let minimum = limits.effective_minimum();

    match (state, input) {
        (_, Input::Start) => (Session::AwaitingAmount, Prompt::AskAmount { minimum }),
        (Session::Idle, Input::Cancel) => (Session::Idle, Prompt::NothingPending),
        (_, Input::Cancel) => (Session::Idle, Prompt::Cancelled),

        (Session::AwaitingAmount, Input::Text(text)) => match text.trim().parse::<Doge>() {
            Ok(amount) if amount < minimum => (Session::AwaitingAmount, Prompt::BelowMinimum { minimum }),
            Ok(amount) => (Session::AwaitingAddress { amount }, Prompt::AskAddress { amount }),
            Err(_) => (Session::AwaitingAmount, Prompt::InvalidAmount),
        },

        (Session::AwaitingAddress { amount }, Input::Text(text)) => match validate_doge_address(text) {
            Ok(address) => {
                let receive = amount.checked_sub(limits.fee).unwrap_or(Doge::ZERO);
                let prompt = Prompt::AskConfirm {
                    amount,
                    fee: limits.fee,
                    receive,
                    address: address.clone(),
                };
                let next = Session::AwaitingConfirm {
                    amount,
                    address,
                    request_key: uuid::Uuid::new_v4().to_string(),
                };
                (next, prompt)
            }
            Err(_) => (Session::AwaitingAddress { amount }, Prompt::InvalidAddress),
        },

        (
            Session::AwaitingConfirm {
                amount,
                address,
                request_key,
            },
            Input::Confirm,
        ) => (
            Session::Idle,
            Prompt::Execute {
                amount,
                address,
                request_key,
            },
        ),
        (state @ Session::AwaitingConfirm { .. }, Input::Text(_)) => (state, Prompt::UseButtons),

        (Session::Idle, Input::Text(_)) => (Session::Idle, Prompt::NothingPending),
        (state, Input::Confirm) => (state, Prompt::NothingPending),
    }
}

struct Entry {
    session: Session,
    touched: Instant,
}

/// Per-user dialog states
static SESSIONS: Lazy<Mutex<HashMap<i64, Entry>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Applies `input` to the user's dialog and stores the result atomically.
pub async fn apply(user_id: i64, input: Input<'_>, limits: &WithdrawalLimits, ttl: Duration) -> Prompt {
    let mut sessions = SESSIONS.lock().await;
    let current = match sessions.remove(&user_id) {
        Some(entry) if entry.touched.elapsed() <= ttl => entry.session,
        Some(_) => {
            log::debug!("Withdrawal dialog of user {} expired", user_id);
            Session::Idle
        }
        None => Session::Idle,
    };

    let (next, prompt) = advance(current, input, limits);
    if next.is_active() {
        sessions.insert(
            user_id,
            Entry {
                session: next,
                touched: Instant::now(),
            },
        );
    }
    prompt
}

/// True if the user has an unexpired dialog.
pub async fn is_active(user_id: i64, ttl: Duration) -> bool {
    let sessions = SESSIONS.lock().await;
    sessions
        .get(&user_id)
        .map(|entry| entry.session.is_active() && entry.touched.elapsed() <= ttl)
        .unwrap_or(false)
}

/// Drops expired dialogs; returns how many were removed.
pub async fn cleanup_expired(ttl: Duration) -> usize {
    let mut sessions = SESSIONS.lock().await;
    let before = sessions.len();
    sessions.retain(|_, entry| entry.touched.elapsed() <= ttl);
    before - sessions.len()
}
