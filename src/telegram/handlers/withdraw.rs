//! Withdrawal dialog handlers (/sacar, /cancelar, dialog text and buttons)

use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, Message};

use super::types::{sender_id, HandlerDeps, HandlerError};
use crate::core::amount::Doge;
use crate::storage::db;
use crate::storage::get_connection;
use crate::telegram::session::{self, Input, Prompt};
use crate::withdraw::{WithdrawalLimits, WithdrawalRequest};

pub const CALLBACK_CONFIRM: &str = "wd:confirm";
pub const CALLBACK_CANCEL: &str = "wd:cancel";

fn confirm_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ Confirmar", CALLBACK_CONFIRM),
        InlineKeyboardButton::callback("❌ Cancelar", CALLBACK_CANCEL),
    ]])
}

/// Chat text for a prompt. `Execute` has none, it starts the withdrawal.
pub(crate) fn prompt_text(prompt: &Prompt) -> Option<String> {
    let text = match prompt {
        Prompt::AskAmount { minimum } => format!(
            "💸 Quanto você quer sacar? Envie apenas o número em DOGE (mínimo {}).\nUse /cancelar para desistir.",
            minimum
        ),
        Prompt::InvalidAmount => "⚠️ Valor inválido. Envie apenas o número, ex: 10 ou 2.5".to_string(),
        Prompt::BelowMinimum { minimum } => format!("⚠️ O valor mínimo para saque é {} DOGE.", minimum),
        Prompt::AskAddress { amount } => format!("📬 Envie o endereço DOGE para receber {} DOGE.", amount),
        Prompt::InvalidAddress => "⚠️ Endereço DOGE inválido. Confira e envie novamente.".to_string(),
        Prompt::AskConfirm {
            amount,
            fee,
            receive,
            address,
        } => format!(
            "🧾 Confirme o saque:\n\nValor: {} DOGE\nTaxa de rede: {} DOGE\nVocê recebe: {} DOGE\nDestino: {}",
            amount, fee, receive, address
        ),
        Prompt::UseButtons => "👆 Use os botões acima para confirmar ou cancelar.".to_string(),
        Prompt::Cancelled => "❌ Saque cancelado.".to_string(),
        Prompt::NothingPending => "ℹ️ Nenhum saque em andamento. Use /sacar para começar.".to_string(),
        Prompt::Execute { .. } => return None,
    };
    Some(text)
}

async fn send_prompt(
    bot: &Bot,
    chat_id: ChatId,
    user_id: i64,
    prompt: Prompt,
    deps: &HandlerDeps,
) -> Result<(), HandlerError> {
    match prompt {
        Prompt::Execute {
            amount,
            address,
            request_key,
        } => execute_withdrawal(bot, chat_id, user_id, amount, address, request_key, deps).await,
        prompt @ Prompt::AskConfirm { .. } => {
            let text = prompt_text(&prompt).unwrap_or_default();
            bot.send_message(chat_id, text).reply_markup(confirm_keyboard()).await?;
            Ok(())
        }
        prompt => {
            if let Some(text) = prompt_text(&prompt) {
                bot.send_message(chat_id, text).await?;
            }
            Ok(())
        }
    }
}

async fn execute_withdrawal(
    bot: &Bot,
    chat_id: ChatId,
    user_id: i64,
    amount: Doge,
    address: String,
    request_key: String,
    deps: &HandlerDeps,
) -> Result<(), HandlerError> {
    bot.send_message(chat_id, "⏳ Processando seu saque...").await?;

    let request = WithdrawalRequest {
        user_id,
        address,
        amount,
        request_key,
    };
    let text = match deps.withdrawals.process(request).await {
        Ok(receipt) => {
            let received = receipt.amount.checked_sub(receipt.fee).unwrap_or(Doge::ZERO);
            format!(
                "✅ Saque enviado!\n💸 {} DOGE (você recebe {} DOGE)\n🔗 tx: {}",
                receipt.amount, received, receipt.tx_hash
            )
        }
        Err(e) => e.user_message(),
    };
    bot.send_message(chat_id, text).await?;
    Ok(())
}

/// The dialog only starts when the balance covers the smallest valid amount.
fn can_start_withdrawal(balance: Doge, limits: &WithdrawalLimits) -> bool {
    balance >= limits.effective_minimum()
}

/// Handle /sacar command
pub(super) async fn handle_withdraw_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let user_id = sender_id(msg);
    let user = {
        let conn = get_connection(&deps.db_pool)?;
        db::get_user(&conn, user_id)?
    };

    let Some(user) = user else {
        bot.send_message(msg.chat.id, "⚠️ Você ainda não tem conta. Use /start").await?;
        return Ok(());
    };
    let minimum = deps.limits().effective_minimum();
    if !can_start_withdrawal(user.doge, deps.limits()) {
        bot.send_message(
            msg.chat.id,
            format!(
                "⚠️ Saldo insuficiente. Seu saldo: {} DOGE\nO mínimo para saque é {} DOGE.",
                user.doge, minimum
            ),
        )
        .await?;
        return Ok(());
    }

    let prompt = session::apply(user_id, Input::Start, deps.limits(), deps.session_ttl).await;
    send_prompt(bot, msg.chat.id, user_id, prompt, deps).await
}

/// Handle /cancelar command
pub(super) async fn handle_cancel_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let user_id = sender_id(msg);
    let prompt = session::apply(user_id, Input::Cancel, deps.limits(), deps.session_ttl).await;
    send_prompt(bot, msg.chat.id, user_id, prompt, deps).await
}

/// Plain text while a dialog is active
pub(super) async fn handle_session_text(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let user_id = sender_id(msg);
    let text = msg.text().unwrap_or_default();
    let prompt = session::apply(user_id, Input::Text(text), deps.limits(), deps.session_ttl).await;
    send_prompt(bot, msg.chat.id, user_id, prompt, deps).await
}

/// Confirm/cancel buttons of the last step
pub(super) async fn handle_withdraw_callback(
    bot: &Bot,
    q: &CallbackQuery,
    deps: &HandlerDeps,
) -> Result<(), HandlerError> {
    let input = match q.data.as_deref() {
        Some(CALLBACK_CONFIRM) => Input::Confirm,
        Some(CALLBACK_CANCEL) => Input::Cancel,
        _ => return Ok(()),
    };

    let user_id = i64::try_from(q.from.id.0)?;
    let chat_id = q.message.as_ref().map(|m| m.chat().id).unwrap_or(ChatId(user_id));

    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        log::warn!("Failed to answer callback query: {}", e);
    }
    if let Some(message) = &q.message {
        // Drop the buttons so the dialog cannot be confirmed from an old message
        if let Err(e) = bot.edit_message_reply_markup(chat_id, message.id()).await {
            log::debug!("Could not remove confirm keyboard: {}", e);
        }
    }

    let prompt = session::apply(user_id, input, deps.limits(), deps.session_ttl).await;
    send_prompt(bot, chat_id, user_id, prompt, deps).await
}
