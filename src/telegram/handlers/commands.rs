//! Command handler implementations (/start, /saldo, /ganhar, /confirmar, /historico, /ajuda)

use teloxide::prelude::*;
use teloxide::types::Message;
use teloxide::utils::command::BotCommands;

use super::types::{ensure_user_exists, sender_id, HandlerDeps, HandlerError, UserInfo};
use crate::core::amount::Doge;
use crate::core::metrics;
use crate::storage::db::{self, AdConfirmation, WithdrawalRecord, WithdrawalStatus};
use crate::storage::get_connection;
use crate::telegram::bot::Command;

const HISTORY_LIMIT: usize = 5;

/// Handle /start command
pub(super) async fn handle_start_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let user = UserInfo::from_message(msg);
    if let Err(e) = ensure_user_exists(&deps.db_pool, bot, &user) {
        log::error!("Failed to register user {}: {}", user.user_id, e);
    }

    bot.send_message(
        msg.chat.id,
        format!(
            "👋 Olá {}!\nBem-vindo ao bot oficial!\nUse /saldo para ver seu saldo\nUse /ganhar para ver anúncios\nUse /sacar para sacar DOGE",
            user.display_name()
        ),
    )
    .await?;
    Ok(())
}

/// Handle /saldo command
pub(super) async fn handle_balance_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let user_id = sender_id(msg);
    let user = {
        let conn = get_connection(&deps.db_pool)?;
        db::get_user(&conn, user_id)?
    };

    let text = match user {
        None => "⚠️ Você ainda não tem conta. Use /start".to_string(),
        Some(user) if user.balance_usd_cents != 0 => format!(
            "💰 Seu saldo: {} DOGE\n💵 Saldo antigo: {}.{:02} USD",
            user.doge,
            user.balance_usd_cents / 100,
            (user.balance_usd_cents % 100).abs()
        ),
        Some(user) => format!("💰 Seu saldo: {} DOGE", user.doge),
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Handle /ganhar command
pub(super) async fn handle_earn_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let user_id = sender_id(msg);
    let (registered, ad) = {
        let conn = get_connection(&deps.db_pool)?;
        if db::get_user(&conn, user_id)?.is_none() {
            (false, None)
        } else {
            let ad = db::next_ad_for_user(&conn, user_id)?;
            if let Some(ad) = &ad {
                db::start_ad_view(&conn, user_id, ad.id, chrono::Utc::now().timestamp())?;
            }
            (true, ad)
        }
    };

    let text = match ad {
        _ if !registered => "⚠️ Você ainda não tem conta. Use /start".to_string(),
        Some(ad) => format!(
            "📢 Anúncio disponível!\n🔗 {}\n⏳ Tempo: {}s\n💵 Recompensa: {} DOGE\nUse /confirmar depois de ver.",
            ad.url, ad.watch_seconds, ad.reward
        ),
        None => "⚠️ Nenhum anúncio disponível agora. Tente mais tarde.".to_string(),
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Handle /confirmar command
pub(super) async fn handle_confirm_view_command(
    bot: &Bot,
    msg: &Message,
    deps: &HandlerDeps,
) -> Result<(), HandlerError> {
    let user_id = sender_id(msg);
    let outcome = {
        let mut conn = get_connection(&deps.db_pool)?;
        db::confirm_ad_view(&mut conn, user_id, chrono::Utc::now().timestamp())?
    };

    let text = match outcome {
        AdConfirmation::Rewarded { ad_id, reward, balance } => {
            metrics::AD_REWARDS_TOTAL.inc();
            log::info!("🎉 User {} rewarded {} DOGE for ad {}", user_id, reward, ad_id);
            format!("🎉 Recompensa recebida: {} DOGE\n💰 Saldo: {} DOGE", reward, balance)
        }
        AdConfirmation::TooEarly { remaining_secs, .. } => {
            format!("⏳ Ainda não passou o tempo. Aguarde mais {}s.", remaining_secs)
        }
        AdConfirmation::NothingPending => "⚠️ Ainda não passou o tempo ou você já recebeu a recompensa.".to_string(),
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

fn status_label(status: WithdrawalStatus) -> &'static str {
    match status {
        WithdrawalStatus::Reserved => "⏳ processando",
        WithdrawalStatus::Sent => "✅ enviado",
        WithdrawalStatus::Failed => "❌ falhou (estornado)",
        WithdrawalStatus::Unknown => "🔎 em verificação",
    }
}

/// One /historico line. The received amount is shown only once the transfer is sent.
fn history_entry(w: &WithdrawalRecord) -> String {
    let mut entry = format!("\n#{} · {} DOGE → {}\n{}", w.id, w.amount, w.address, status_label(w.status));
    if w.status == WithdrawalStatus::Sent {
        let received = w.amount.checked_sub(w.fee).unwrap_or(Doge::ZERO);
        entry.push_str(&format!(" · recebido {} DOGE", received));
    }
    if let Some(hash) = &w.tx_hash {
        entry.push_str(&format!("\ntx: {}", hash));
    }
    entry.push('\n');
    entry
}

/// Handle /historico command
pub(super) async fn handle_history_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let user_id = sender_id(msg);
    let withdrawals = {
        let conn = get_connection(&deps.db_pool)?;
        db::list_user_withdrawals(&conn, user_id, HISTORY_LIMIT)?
    };

    if withdrawals.is_empty() {
        bot.send_message(msg.chat.id, "📭 Você ainda não fez saques.").await?;
        return Ok(());
    }

    let mut text = String::from("📜 Últimos saques:\n");
    for w in &withdrawals {
        text.push_str(&history_entry(w));
    }
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Handle /ajuda command
pub(super) async fn handle_help_command(bot: &Bot, msg: &Message) -> Result<(), HandlerError> {
    bot.send_message(msg.chat.id, Command::descriptions().to_string()).await?;
    Ok(())
}
