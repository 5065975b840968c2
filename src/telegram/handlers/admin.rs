//! Hidden admin commands: /addad, /ads, /adoff, /credit, /house, /pending, /resolve

use teloxide::prelude::*;
use teloxide::types::Message;

use super::types::{sender_id, HandlerDeps, HandlerError};
use crate::core::amount::Doge;
use crate::core::config;
use crate::storage::db;
use crate::storage::get_connection;
use crate::withdraw::Resolution;

/// Admin commands recognised by [`parse_admin_command`].
pub(super) const ADMIN_PREFIXES: [&str; 7] = ["/addad", "/ads", "/adoff", "/credit", "/house", "/pending", "/resolve"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AdminCommand {
    AddAd { url: String, watch_seconds: i64, reward: Doge },
    ListAds,
    DisableAd { ad_id: i64 },
    Credit { user_id: i64, amount: Doge },
    House,
    Pending,
    Resolve { id: i64, resolution: Resolution },
}

pub(crate) fn is_admin_command(text: &str) -> bool {
    let word = text.split_whitespace().next().unwrap_or_default();
    let word = word.split('@').next().unwrap_or_default();
    ADMIN_PREFIXES.contains(&word)
}

/// Parses an admin command line; `Err` carries the usage text.
pub(crate) fn parse_admin_command(text: &str) -> Result<AdminCommand, &'static str> {
    let mut parts = text.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let command = command.split('@').next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match (command, args.as_slice()) {
        ("/addad", [url, seconds, reward]) => {
            let url = url::Url::parse(url).map_err(|_| "Uso: /addad <url> <segundos> <recompensa>")?;
            let watch_seconds = seconds
                .parse::<i64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or("Uso: /addad <url> <segundos> <recompensa>")?;
            let reward = reward
                .parse::<Doge>()
                .ok()
                .filter(|r| !r.is_zero())
                .ok_or("Uso: /addad <url> <segundos> <recompensa>")?;
            Ok(AdminCommand::AddAd {
                url: url.to_string(),
                watch_seconds,
                reward,
            })
        }
        ("/addad", _) => Err("Uso: /addad <url> <segundos> <recompensa>"),
        ("/ads", []) => Ok(AdminCommand::ListAds),
        ("/adoff", [id]) => id
            .parse()
            .map(|ad_id| AdminCommand::DisableAd { ad_id })
            .map_err(|_| "Uso: /adoff <id>"),
        ("/credit", [user, amount]) => {
            let user_id = user.parse().map_err(|_| "Uso: /credit <user_id> <valor>")?;
            let amount = amount.parse().map_err(|_| "Uso: /credit <user_id> <valor>")?;
            Ok(AdminCommand::Credit { user_id, amount })
        }
        ("/credit", _) => Err("Uso: /credit <user_id> <valor>"),
        ("/house", []) => Ok(AdminCommand::House),
        ("/pending", []) => Ok(AdminCommand::Pending),
        ("/resolve", [id, "sent", hash]) => id
            .parse()
            .map(|id| AdminCommand::Resolve {
                id,
                resolution: Resolution::Sent((*hash).to_string()),
            })
            .map_err(|_| "Uso: /resolve <id> sent <hash> | /resolve <id> refund"),
        ("/resolve", [id, "refund"]) => id
            .parse()
            .map(|id| AdminCommand::Resolve {
                id,
                resolution: Resolution::Refund,
            })
            .map_err(|_| "Uso: /resolve <id> sent <hash> | /resolve <id> refund"),
        ("/resolve", _) => Err("Uso: /resolve <id> sent <hash> | /resolve <id> refund"),
        _ => Err("Comando desconhecido"),
    }
}

/// Entry point for every hidden admin command
pub(super) async fn handle_admin_message(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let user_id = sender_id(msg);
    let text = msg.text().unwrap_or_default();

    if !config::admin::is_admin(user_id) {
        log::warn!("🚫 Non-admin {} tried admin command: {}", user_id, text);
        bot.send_message(msg.chat.id, "⛔ Comando restrito a administradores.").await?;
        return Ok(());
    }

    let command = match parse_admin_command(text) {
        Ok(command) => command,
        Err(usage) => {
            bot.send_message(msg.chat.id, usage).await?;
            return Ok(());
        }
    };
    log::info!("🛠️ Admin {} ran {:?}", user_id, command);

    let reply = run_admin_command(command, deps).await?;
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn run_admin_command(command: AdminCommand, deps: &HandlerDeps) -> Result<String, HandlerError> {
    let house_id = deps.limits().house_id;

    let reply = match command {
        AdminCommand::AddAd {
            url,
            watch_seconds,
            reward,
        } => {
            let conn = get_connection(&deps.db_pool)?;
            let id = db::create_ad(&conn, &url, watch_seconds, reward)?;
            format!("✅ Anúncio #{} criado: {} ({}s, {} DOGE)", id, url, watch_seconds, reward)
        }
        AdminCommand::ListAds => {
            let conn = get_connection(&deps.db_pool)?;
            let ads = db::list_active_ads(&conn)?;
            if ads.is_empty() {
                "📭 Nenhum anúncio ativo.".to_string()
            } else {
                ads.iter()
                    .map(|ad| format!("#{} · {} · {}s · {} DOGE", ad.id, ad.url, ad.watch_seconds, ad.reward))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        AdminCommand::DisableAd { ad_id } => {
            let conn = get_connection(&deps.db_pool)?;
            if db::set_ad_active(&conn, ad_id, false)? {
                format!("✅ Anúncio #{} desativado.", ad_id)
            } else {
                format!("⚠️ Anúncio #{} não existe.", ad_id)
            }
        }
        AdminCommand::Credit { user_id, amount } => {
            let conn = get_connection(&deps.db_pool)?;
            match db::add_balance(&conn, user_id, amount)? {
                Some(balance) if user_id == house_id => {
                    format!("🏦 Casa creditada com {} DOGE. Saldo: {} DOGE", amount, balance)
                }
                Some(balance) => format!("✅ {} DOGE creditados para {}. Saldo: {} DOGE", amount, user_id, balance),
                None => format!("⚠️ Usuário {} não existe.", user_id),
            }
        }
        AdminCommand::House => {
            let conn = get_connection(&deps.db_pool)?;
            let house = db::get_user(&conn, house_id)?;
            let open = db::list_open_withdrawals(&conn)?;
            let reserved = open
                .iter()
                .try_fold(Doge::ZERO, |acc, w| acc.checked_add(w.amount))
                .unwrap_or(Doge::ZERO);
            match house {
                Some(house) => format!(
                    "🏦 Saldo da casa: {} DOGE\n⏳ Reservado em {} saque(s) abertos: {} DOGE",
                    house.doge,
                    open.len(),
                    reserved
                ),
                None => format!("⚠️ Conta da casa {} não existe.", house_id),
            }
        }
        AdminCommand::Pending => {
            let conn = get_connection(&deps.db_pool)?;
            let open = db::list_open_withdrawals(&conn)?;
            if open.is_empty() {
                "✅ Nenhum saque pendente.".to_string()
            } else {
                open.iter()
                    .map(|w| {
                        format!(
                            "#{} · {} · user {} · {} DOGE → {}\n{}",
                            w.id,
                            w.status.as_str(),
                            w.user_id,
                            w.amount,
                            w.address,
                            w.error.as_deref().unwrap_or("-")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n")
            }
        }
        AdminCommand::Resolve { id, resolution } => match deps.withdrawals.resolve(id, resolution).await {
            Ok(record) => format!("✅ Saque #{} agora está {}.", record.id, record.status.as_str()),
            Err(e) => format!("⚠️ {}", e),
        },
    };
    Ok(reply)
}
