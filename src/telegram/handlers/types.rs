//! Handler types, dependencies, and user management helpers

use std::sync::Arc;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::Message;

use crate::storage::db::{self, DbPool};
use crate::storage::get_connection;
use crate::telegram::notifications::notify_admins_new_user;
use crate::withdraw::{WithdrawalLimits, WithdrawalService};

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub db_pool: Arc<DbPool>,
    pub withdrawals: Arc<WithdrawalService>,
    pub session_ttl: Duration,
}

impl HandlerDeps {
    /// Create new handler dependencies
    pub fn new(db_pool: Arc<DbPool>, withdrawals: Arc<WithdrawalService>, session_ttl: Duration) -> Self {
        Self {
            db_pool,
            withdrawals,
            session_ttl,
        }
    }

    pub fn limits(&self) -> &WithdrawalLimits {
        self.withdrawals.limits()
    }
}

/// User info extracted from an update
#[derive(Clone, Debug)]
pub struct UserInfo {
    pub user_id: i64,
    pub first_name: Option<String>,
    pub username: Option<String>,
}

impl UserInfo {
    /// Extract user info from a Telegram message
    pub fn from_message(msg: &Message) -> Self {
        Self {
            user_id: msg
                .from
                .as_ref()
                .and_then(|u| i64::try_from(u.id.0).ok())
                .unwrap_or(msg.chat.id.0),
            first_name: msg.from.as_ref().map(|u| u.first_name.clone()),
            username: msg.from.as_ref().and_then(|u| u.username.clone()),
        }
    }

    pub fn display_name(&self) -> &str {
        self.first_name.as_deref().unwrap_or("amigo")
    }
}

/// Telegram user id of the sender, falling back to the chat id.
pub fn sender_id(msg: &Message) -> i64 {
    msg.from
        .as_ref()
        .and_then(|u| i64::try_from(u.id.0).ok())
        .unwrap_or(msg.chat.id.0)
}

/// Registers the user, notifying admins in the background when the account is new.
///
/// Returns `true` if the account was created by this call.
pub fn ensure_user_exists(db_pool: &DbPool, bot: &Bot, user: &UserInfo) -> Result<bool, HandlerError> {
    let conn = get_connection(db_pool)?;
    let created = db::register_user(&conn, user.user_id, user.first_name.as_deref())?;

    if created {
        log::info!("👤 New user registered: {} ({:?})", user.user_id, user.username);
        let bot = bot.clone();
        let user = user.clone();
        tokio::spawn(async move {
            notify_admins_new_user(&bot, &user).await;
        });
    }
    Ok(created)
}
