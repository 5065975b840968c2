//! Admin direct messages

use async_trait::async_trait;
use teloxide::prelude::*;

use crate::core::config::admin::ADMIN_IDS;
use crate::telegram::handlers::UserInfo;
use crate::withdraw::OperatorAlert;

/// Sends `text` to every configured admin. Failures are logged, never returned.
pub async fn notify_admins_text(bot: &Bot, text: &str) {
    if ADMIN_IDS.is_empty() {
        log::warn!("ADMIN_IDS is empty, admin notification dropped: {}", text);
        return;
    }

    for admin_id in ADMIN_IDS.iter() {
        if let Err(e) = bot.send_message(ChatId(*admin_id), text).await {
            log::error!("Failed to send admin notification to {}: {}", admin_id, e);
        }
    }
}

pub async fn notify_admins_new_user(bot: &Bot, user: &UserInfo) {
    let username = user
        .username
        .as_deref()
        .map(|u| format!("@{}", u))
        .unwrap_or_else(|| "-".to_string());
    let text = format!(
        "👤 Novo usuário\nID: {}\nNome: {}\nUsername: {}",
        user.user_id,
        user.display_name(),
        username
    );
    notify_admins_text(bot, &text).await;
}

/// Routes withdrawal alerts to the admin chats.
#[derive(Clone)]
pub struct AdminNotifier {
    bot: Bot,
}

impl AdminNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl OperatorAlert for AdminNotifier {
    async fn alert(&self, text: &str) {
        notify_admins_text(&self.bot, &format!("{}\n\nUse /pending e /resolve", text)).await;
    }
}
