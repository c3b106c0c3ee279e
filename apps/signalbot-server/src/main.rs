use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use signalbot_db::db::init_db;
use signalbot_db::repositories::UserRepository;
use signalbot_shared::PlanCatalog;
use teloxide::Bot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod bot;
mod config;
mod error;
mod handlers;
mod services;
mod state;
mod texts;

#[cfg(test)]
mod testing;

use config::{Cli, Command, Config};
use services::notification_service::{Dispatcher, TelegramMessenger};
use services::payment::razorpay::RazorpayGateway;
use services::user_service::UserService;
use state::{AppState, Stores};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signalbot=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config).await?,
        Command::Plans => print_plans(&config.catalog()?),
        Command::Ban { tg_id } => {
            let user = user_service(&config).await?.set_banned(tg_id, true).await?;
            println!("Banned {} ({})", user.label(), user.id);
        }
        Command::Unban { tg_id } => {
            let user = user_service(&config).await?.set_banned(tg_id, false).await?;
            println!("Unbanned {} ({})", user.label(), user.id);
        }
        Command::Refund { link_id } => {
            let bot = Bot::new(config.bot_token()?);
            let (state, _worker) = build_state(&config, bot).await?;
            let record = state.admin.refund(&link_id).await?;
            println!("Refunded {} (user {})", record.link_id, record.user_id);
        }
    }

    Ok(())
}

fn print_plans(catalog: &PlanCatalog) {
    println!("{:<8} {:<12} {:>10} {:>6}", "ID", "NAME", "PRICE", "DAYS");
    for plan in catalog.plans() {
        println!(
            "{:<8} {:<12} {:>10} {:>6}",
            plan.id,
            plan.name,
            plan.price_display(),
            plan.duration_days()
        );
    }
}

async fn user_service(config: &Config) -> Result<UserService> {
    let pool = init_db(config.database_url()?).await?;
    Ok(UserService::new(Arc::new(UserRepository::new(pool))))
}

async fn build_state(config: &Config, bot: Bot) -> Result<(AppState, tokio::task::JoinHandle<()>)> {
    let catalog = config.catalog()?;
    let pool = init_db(config.database_url()?).await?;

    let (dispatcher, worker) = Dispatcher::spawn(
        Arc::new(TelegramMessenger::new(bot)),
        config.dispatch_options(),
    );
    let gateway = RazorpayGateway::new(
        config.razorpay_key_id.clone(),
        config.razorpay_key_secret.clone(),
        config.razorpay_webhook_secret.clone(),
    );

    let state = AppState::new(
        catalog,
        Stores::postgres(pool),
        Arc::new(gateway),
        dispatcher,
        config.admin_id()?,
        &config.currency,
    );
    Ok((state, worker))
}

async fn run_server(config: Config) -> Result<()> {
    if config.razorpay_webhook_secret.is_empty() {
        warn!("RAZORPAY_WEBHOOK_SECRET is empty, every webhook will be rejected");
    }
    let bot = Bot::new(config.bot_token()?);
    let (state, _worker) = build_state(&config, bot.clone()).await?;
    info!(
        "Loaded {} plan(s): {}",
        state.catalog.plans().len(),
        state
            .catalog
            .plans()
            .iter()
            .map(|p| p.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let bot_task = tokio::spawn(bot::run_bot(bot, shutdown_rx, state.clone()));

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Webhook server listening on {}", addr);

    axum::serve(listener, handlers::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server failed")?;

    let _ = shutdown_tx.send(());
    let _ = bot_task.await;
    info!("Stopped");
    Ok(())
}
