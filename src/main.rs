use anyhow::Result;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;
use tokio::net::TcpListener;
use tokio::time::{interval, sleep};

use dogeads::cli::{Cli, Commands};
use dogeads::core::web_server::{self, ApiState};
use dogeads::core::{config, init_logger, log_wallet_configuration, rate_limiter::RateLimiter, Doge};
use dogeads::storage::db;
use dogeads::storage::{create_pool, get_connection, DbPool};
use dogeads::telegram::{create_bot, schema, session, setup_bot_commands, AdminNotifier, HandlerDeps};
use dogeads::wallet::{BlockCypherClient, WalletSettings};
use dogeads::withdraw::{WithdrawalLimits, WithdrawalRequest, WithdrawalService};

/// Main entry point
///
/// Parses CLI arguments and dispatches to the matching subcommand; no
/// subcommand runs the bot in polling mode.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Log panics inside spawned tasks instead of losing them
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
        if let Some(msg) = panic_info.payload().downcast_ref::<&str>() {
            log::error!("Panic message: {}", msg);
        }
    }));

    // Load environment variables from .env before any config static is read
    let _ = dotenv();

    init_logger(&config::LOG_FILE_PATH)?;

    match cli.command {
        Some(Commands::Run { webhook }) => {
            log::info!("Running bot (webhook: {})", webhook);
            run_bot(webhook).await
        }
        Some(Commands::Serve { port }) => run_api_only(port.unwrap_or(*config::PORT)).await,
        Some(Commands::Withdraw {
            user,
            address,
            amount,
            request_id,
        }) => run_cli_withdraw(user, address, amount, request_id).await,
        Some(Commands::Credit { user, amount }) => run_cli_credit(user, amount),
        Some(Commands::Pending) => run_cli_pending(),
        None => {
            log::info!("No command specified, running bot in default mode");
            run_bot(false).await
        }
    }
}

/// Opens the ledger and makes sure the house account exists.
fn open_ledger(limits: &WithdrawalLimits) -> Result<DbPool> {
    let pool = create_pool(&config::DATABASE_PATH).map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?;
    let conn = get_connection(&pool)?;
    db::ensure_house_account(&conn, limits.house_id)?;
    Ok(pool)
}

fn build_withdrawal_service(pool: DbPool, limits: WithdrawalLimits) -> Result<WithdrawalService> {
    let client = BlockCypherClient::new(
        &config::wallet::BLOCKCYPHER_BASE_URL,
        config::wallet::BLOCKCYPHER_TOKEN.clone(),
        config::network::timeout(),
    )?;

    let cooldown = Arc::new(RateLimiter::new(config::rate_limit::withdraw_cooldown()));
    // Drop expired cooldown entries every 5 minutes
    Arc::clone(&cooldown).spawn_cleanup_task(Duration::from_secs(300));

    Ok(WithdrawalService::new(pool, Arc::new(client), WalletSettings::from_env(), limits).with_cooldown(cooldown))
}

/// Run only the HTTP API
async fn run_api_only(port: u16) -> Result<()> {
    dogeads::core::metrics::init_metrics();
    log_wallet_configuration();

    let limits = WithdrawalLimits::from_env();
    let pool = open_ledger(&limits)?;
    let service = Arc::new(build_withdrawal_service(pool, limits)?);

    let app = web_server::router(ApiState::new(service, config::API_KEY.clone()));
    web_server::start_web_server(port, app).await?;
    Ok(())
}

/// Run one withdrawal from the command line
async fn run_cli_withdraw(user: i64, address: String, amount: String, request_id: Option<String>) -> Result<()> {
    let amount: Doge = amount.parse()?;
    let limits = WithdrawalLimits::from_env();
    let pool = open_ledger(&limits)?;
    let service = build_withdrawal_service(pool, limits)?;

    let request_key = request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    println!("🐕 Withdrawing {} DOGE for user {} to {}", amount, user, address);
    println!("   Request key: {}", request_key);

    let receipt = service
        .process(WithdrawalRequest {
            user_id: user,
            address,
            amount,
            request_key,
        })
        .await?;

    if receipt.replayed {
        println!("↩️  Already processed earlier");
    }
    println!("✅ Withdrawal #{} sent", receipt.withdrawal_id);
    println!("   TX: {}", receipt.tx_hash);
    println!("   Fee: {} DOGE", receipt.fee);
    Ok(())
}

/// Credit a ledger account from the command line
fn run_cli_credit(user: i64, amount: String) -> Result<()> {
    let amount: Doge = amount.parse()?;
    let limits = WithdrawalLimits::from_env();
    let pool = open_ledger(&limits)?;
    let conn = get_connection(&pool)?;

    match db::add_balance(&conn, user, amount)? {
        Some(balance) => {
            println!("✅ Credited {} DOGE to {}. Balance: {} DOGE", amount, user, balance);
            Ok(())
        }
        None => Err(anyhow::anyhow!("User {} is not registered", user)),
    }
}

/// List withdrawals in `reserved` or `unknown`
fn run_cli_pending() -> Result<()> {
    let limits = WithdrawalLimits::from_env();
    let pool = open_ledger(&limits)?;
    let conn = get_connection(&pool)?;
    let open = db::list_open_withdrawals(&conn)?;

    if open.is_empty() {
        println!("✅ No open withdrawals");
        return Ok(());
    }
    for w in open {
        println!(
            "#{}\t{}\tuser {}\t{} DOGE\t{}\tkey {}\t{}",
            w.id,
            w.status.as_str(),
            w.user_id,
            w.amount,
            w.address,
            w.request_key,
            w.error.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// Waits for the Bot API, retrying while it is still starting up.
async fn wait_for_bot_api(bot: &Bot) -> Result<teloxide::types::Me> {
    let max_retries = config::retry::STARTUP_MAX_RETRIES;
    let mut attempt = 0;
    loop {
        match bot.get_me().await {
            Ok(info) => return Ok(info),
            Err(e) => {
                let retryable = matches!(e, teloxide::RequestError::Network(_) | teloxide::RequestError::Io(_))
                    || e.to_string().contains("restart");
                attempt += 1;
                if attempt >= max_retries || !retryable {
                    return Err(anyhow::anyhow!(
                        "Failed to connect to Bot API after {} attempts: {}",
                        attempt,
                        e
                    ));
                }
                log::warn!(
                    "Bot API not ready (attempt {}/{}): {}. Retrying in 5 seconds...",
                    attempt,
                    max_retries,
                    e
                );
                sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

/// Run the bot
///
/// Polling mode serves the HTTP API on a background task. Webhook mode
/// serves the update route and the API on the same port.
async fn run_bot(use_webhook: bool) -> Result<()> {
    let bot_init_start = std::time::Instant::now();
    log::info!("Starting bot...");

    dogeads::core::metrics::init_metrics();
    log_wallet_configuration();

    let bot = create_bot()?;
    let bot_info = wait_for_bot_api(&bot).await?;
    log::info!("Bot username: {:?}, Bot ID: {}", bot_info.username.as_deref(), bot_info.id);

    setup_bot_commands(&bot).await?;

    let limits = WithdrawalLimits::from_env();
    let db_pool = open_ledger(&limits)?;
    let withdrawals = Arc::new(
        build_withdrawal_service(db_pool.clone(), limits)?.with_alerts(Arc::new(AdminNotifier::new(bot.clone()))),
    );

    // Drop abandoned withdrawal dialogs every minute
    let session_ttl = config::session::ttl();
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let removed = session::cleanup_expired(session_ttl).await;
            if removed > 0 {
                log::debug!("Dropped {} expired withdrawal dialog(s)", removed);
            }
        }
    });

    let api_state = ApiState::new(Arc::clone(&withdrawals), config::API_KEY.clone());
    let handler_deps = HandlerDeps::new(Arc::new(db_pool), withdrawals, session_ttl);
    let handler = schema(handler_deps);
    let port = *config::PORT;

    let webhook_url = if use_webhook { config::WEBHOOK_URL.clone() } else { None };
    if use_webhook && webhook_url.is_none() {
        log::warn!("--webhook given but WEBHOOK_URL is not set, falling back to long polling");
    }

    if let Some(base) = webhook_url {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let url = url::Url::parse(&format!("{}/webhook/{}", base.trim_end_matches('/'), config::BOT_TOKEN.as_str()))?;
        // The URL carries the token, log only the base
        log::info!("Starting bot in webhook mode at {}/webhook/<token>", base.trim_end_matches('/'));

        let options = webhooks::Options::new(addr, url).drop_pending_updates();
        let (listener, stop_flag, webhook_router) = webhooks::axum_to_router(bot.clone(), options).await?;
        let app = webhook_router.merge(web_server::router(api_state));

        let tcp = TcpListener::bind(&addr).await?;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(tcp, app).with_graceful_shutdown(stop_flag).await {
                log::error!("Web server error: {}", e);
            }
        });

        log::info!("🎉 Bot initialization complete in {:.2}s", bot_init_start.elapsed().as_secs_f64());
        Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("An error from the update listener"),
            )
            .await;
        return Ok(());
    }

    tokio::spawn(async move {
        if let Err(e) = web_server::start_web_server(port, web_server::router(api_state)).await {
            log::error!("Web server error: {}", e);
        }
    });

    log::info!("Starting bot in long polling mode");
    log::info!("================================================");
    log::info!("🎉 Bot initialization complete in {:.2}s", bot_init_start.elapsed().as_secs_f64());
    log::info!("📡 Ready to receive updates!");
    log::info!("================================================");

    let mut retry_count = 0;
    let max_retries = config::retry::MAX_DISPATCHER_RETRIES;

    // Run the dispatcher with retry logic
    loop {
        let bot_clone = bot.clone();
        let handler_clone = handler.clone();

        // Separate task so a panic surfaces through the JoinHandle
        let handle = tokio::spawn(async move {
            use teloxide::update_listeners::Polling;

            let listener = Polling::builder(bot_clone.clone()).drop_pending_updates().build();

            Dispatcher::builder(bot_clone, handler_clone)
                .enable_ctrlc_handler()
                .build()
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("An error from the update listener"),
                )
                .await
        });

        match handle.await {
            Ok(()) => {
                log::info!("Dispatcher shutdown gracefully");
                break;
            }
            Err(join_err) if join_err.is_panic() => {
                log::error!("Dispatcher panicked: {}", join_err);
                if retry_count >= max_retries {
                    log::error!("Max retries reached after panic. Exiting...");
                    break;
                }
                retry_count += 1;
                log::info!(
                    "Retrying dispatcher after panic (attempt {}/{})...",
                    retry_count,
                    max_retries
                );
                exponential_backoff(retry_count).await;
            }
            Err(join_err) => {
                log::warn!("Dispatcher task was cancelled: {}", join_err);
                break;
            }
        }

        sleep(config::retry::dispatcher_delay()).await;
    }

    Ok(())
}

async fn exponential_backoff(retry_count: u32) {
    let delay = Duration::from_secs(config::retry::EXPONENTIAL_BACKOFF_BASE.pow(retry_count));
    sleep(delay).await;
}
