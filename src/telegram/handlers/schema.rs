//! Dispatcher schema and handler chain builders

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;

use super::admin::{handle_admin_message, is_admin_command};
use super::commands::{
    handle_balance_command, handle_confirm_view_command, handle_earn_command, handle_help_command,
    handle_history_command, handle_start_command,
};
use super::types::{sender_id, HandlerDeps, HandlerError};
use super::withdraw::{handle_cancel_command, handle_session_text, handle_withdraw_callback, handle_withdraw_command};
use crate::core::metrics;
use crate::telegram::bot::Command;
use crate::telegram::session;

/// Creates the main dispatcher schema for the Telegram bot.
///
/// The same schema is used in production and can be used in integration tests.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_admin = deps.clone();
    let deps_commands = deps.clone();
    let deps_session = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        // Hidden admin commands (not in Command enum)
        .branch(admin_handler(deps_admin))
        .branch(command_handler(deps_commands))
        // Plain text feeding an active withdrawal dialog
        .branch(session_text_handler(deps_session))
        .branch(callback_handler(deps_callback))
}

fn admin_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.text().map(is_admin_command).unwrap_or(false))
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                metrics::record_command("admin");
                if let Err(e) = handle_admin_message(&bot, &msg, &deps).await {
                    log::error!("❌ Admin command failed for user {}: {}", sender_id(&msg), e);
                    let _ = bot.send_message(msg.chat.id, format!("❌ Erro: {}", e)).await;
                }
                Ok(())
            }
        })
}

/// Handler for bot commands (/start, /saldo, /sacar, etc.)
fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("🎯 Received command: {:?} from chat {}", cmd, msg.chat.id);
                metrics::record_command(cmd.name());

                let result = match cmd {
                    Command::Start => handle_start_command(&bot, &msg, &deps).await,
                    Command::Saldo => handle_balance_command(&bot, &msg, &deps).await,
                    Command::Ganhar => handle_earn_command(&bot, &msg, &deps).await,
                    Command::Confirmar => handle_confirm_view_command(&bot, &msg, &deps).await,
                    Command::Sacar => handle_withdraw_command(&bot, &msg, &deps).await,
                    Command::Cancelar => handle_cancel_command(&bot, &msg, &deps).await,
                    Command::Historico => handle_history_command(&bot, &msg, &deps).await,
                    Command::Ajuda => handle_help_command(&bot, &msg).await,
                };

                if let Err(e) = result {
                    log::error!("❌ Command {:?} failed for chat {}: {}", cmd, msg.chat.id, e);
                    let _ = bot
                        .send_message(msg.chat.id, "⚠️ Ocorreu um erro. Tente novamente mais tarde.")
                        .await;
                }
                Ok(())
            }
        },
    ))
}

fn session_text_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let ttl = deps.session_ttl;

    Update::filter_message()
        .filter(|msg: Message| msg.text().map(|t| !t.starts_with('/')).unwrap_or(false))
        .filter_async(move |msg: Message| async move { session::is_active(sender_id(&msg), ttl).await })
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                if let Err(e) = handle_session_text(&bot, &msg, &deps).await {
                    log::error!("❌ Withdrawal dialog failed for chat {}: {}", msg.chat.id, e);
                    let _ = bot
                        .send_message(msg.chat.id, "⚠️ Ocorreu um erro. Tente novamente mais tarde.")
                        .await;
                }
                Ok(())
            }
        })
}

fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            if let Err(e) = handle_withdraw_callback(&bot, &q, &deps).await {
                log::error!("❌ Callback {:?} failed for user {}: {}", q.data, q.from.id.0, e);
            }
            Ok(())
        }
    })
}
