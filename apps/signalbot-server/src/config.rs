use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use signalbot_shared::PlanCatalog;
use tracing::info;

use crate::services::notification_service::DispatchOptions;

#[derive(Parser, Debug)]
#[command(name = "signalbot")]
#[command(author, version, about = "Telegram trading-signal subscriptions paid through Razorpay", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the bot and the webhook server (default)
    Serve,
    /// Print the plan catalog
    Plans,
    /// Ban a user by Telegram id
    Ban { tg_id: i64 },
    /// Lift a ban
    Unban { tg_id: i64 },
    /// Mark a paid payment refunded and end the access it bought
    Refund { link_id: String },
}

#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Telegram bot token
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Telegram id of the operator
    #[arg(long, env = "ADMIN_ID")]
    pub admin_id: Option<i64>,

    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    #[arg(long, env = "RAZORPAY_KEY_ID", default_value = "")]
    pub razorpay_key_id: String,

    #[arg(long, env = "RAZORPAY_KEY_SECRET", default_value = "", hide_env_values = true)]
    pub razorpay_key_secret: String,

    /// Webhooks are rejected while this is empty
    #[arg(long, env = "RAZORPAY_WEBHOOK_SECRET", default_value = "", hide_env_values = true)]
    pub razorpay_webhook_secret: String,

    /// Full bind address; overrides PORT
    #[arg(long, env = "LISTEN_ADDR")]
    pub listen_addr: Option<String>,

    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// TOML file with `[[plans]]` entries; built-in plans when unset
    #[arg(long, env = "PLANS_FILE")]
    pub plans_file: Option<PathBuf>,

    #[arg(long, env = "CURRENCY", default_value = "INR")]
    pub currency: String,

    #[arg(long, env = "DISPATCH_CONCURRENCY", default_value_t = 4)]
    pub dispatch_concurrency: usize,

    #[arg(long, env = "DISPATCH_INTERVAL_MS", default_value_t = 40)]
    pub dispatch_interval_ms: u64,
}

impl Config {
    pub fn bot_token(&self) -> Result<&str> {
        self.bot_token.as_deref().context("BOT_TOKEN is not set")
    }

    pub fn admin_id(&self) -> Result<i64> {
        self.admin_id.context("ADMIN_ID is not set")
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database_url.as_deref().context("DATABASE_URL is not set")
    }

    pub fn listen_addr(&self) -> String {
        match (&self.listen_addr, self.port) {
            (Some(addr), _) => addr.clone(),
            (None, Some(port)) => format!("0.0.0.0:{}", port),
            (None, None) => "0.0.0.0:5000".to_string(),
        }
    }

    pub fn catalog(&self) -> Result<PlanCatalog> {
        match &self.plans_file {
            Some(path) => {
                let catalog = PlanCatalog::load(path)
                    .with_context(|| format!("Failed to load plans from {}", path.display()))?;
                info!("Loaded {} plan(s) from {}", catalog.plans().len(), path.display());
                Ok(catalog)
            }
            None => Ok(PlanCatalog::default()),
        }
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            concurrency: self.dispatch_concurrency,
            interval: Duration::from_millis(self.dispatch_interval_ms),
            ..DispatchOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["signalbot"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn listen_addr_prefers_explicit_address() {
        let cli = parse(&["--listen-addr", "127.0.0.1:8080", "--port", "9000"]);
        assert_eq!(cli.config.listen_addr(), "127.0.0.1:8080");

        let cli = parse(&["--port", "9000"]);
        assert_eq!(cli.config.listen_addr(), "0.0.0.0:9000");
    }

    #[test]
    fn parses_admin_subcommands() {
        assert_eq!(parse(&["ban", "42"]).command, Some(Command::Ban { tg_id: 42 }));
        assert_eq!(
            parse(&["refund", "plink_1"]).command,
            Some(Command::Refund {
                link_id: "plink_1".into()
            })
        );
    }

    #[test]
    fn dispatch_options_follow_flags() {
        let cli = parse(&["--dispatch-concurrency", "2", "--dispatch-interval-ms", "100"]);
        let options = cli.config.dispatch_options();
        assert_eq!(options.concurrency, 2);
        assert_eq!(options.interval, Duration::from_millis(100));
    }
}
