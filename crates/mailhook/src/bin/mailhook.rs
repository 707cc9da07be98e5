//! mailhook: validate mail hook configuration and send test notifications.
//!
//! Commands:
//! - `check`: load the config file and list the configured hooks
//! - `send-test`: deliver a sample anomaly notification through one hook

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use mailhook::{MailConfig, MailHook};

// ── CLI ─────────────────────────────────────────────────────────────

/// Mail notification hooks for anomaly detection.
#[derive(Parser, Debug)]
#[command(name = "mailhook", version, about)]
struct Cli {
    /// Path to the mail hook TOML config file.
    #[arg(long, env = "MAILHOOK_CONFIG", default_value = "config/mailhook.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the config file and print the configured hooks.
    Check,
    /// Send a sample `anomaly_start` notification through a hook.
    SendTest {
        /// Name of the hook under `[hooks.<name>]`.
        #[arg(long)]
        hook: String,
    },
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = MailConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config))?;
    info!(path = %cli.config, hooks = config.hooks.len(), "loaded mail config");

    match cli.command {
        Command::Check => {
            match config.smtp.as_deref() {
                Some(smtp) => println!(
                    "smtp: {}:{} (tls={}, auth={})",
                    smtp.host,
                    smtp.effective_port(),
                    smtp.tls,
                    smtp.login_user().is_some()
                ),
                None => println!("smtp: not configured"),
            }
            for (name, hook) in &config.hooks {
                println!("hook {name}: {} -> {}", hook.from, hook.to);
            }
        }
        Command::SendTest { hook } => {
            let hook_config = config
                .hook(&hook)
                .cloned()
                .with_context(|| format!("no hook named '{hook}' in {}", cli.config))?;
            let mail_hook = MailHook::from_config(hook.as_str(), hook_config, config.smtp.clone());
            mail_hook
                .send_test()
                .await
                .with_context(|| format!("test notification through '{hook}' failed"))?;
            info!(hook = %hook, "test notification sent");
        }
    }

    Ok(())
}
