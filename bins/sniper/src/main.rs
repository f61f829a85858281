use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use snipe_bot::SniperLoop;
use snipe_core::config::{AppConfig, Credentials, ObservabilityConfig};
use snipe_core::utils::mask_secret;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sniper", version, about = "Multi-chain new-pair sniper")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch factories and buy qualifying tokens (default).
    Run {
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Print the effective configuration with secrets masked.
    PrintConfig {
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run { config: None }) {
        Commands::Run { config } => {
            let cfg = AppConfig::load(config.as_deref())?;
            let _guard = init_tracing(&cfg.observability)?;
            let creds = match Credentials::from_env(&cfg) {
                Ok(creds) => creds,
                Err(err) => {
                    error!(%err, "startup aborted");
                    return Err(err.into());
                }
            };
            info!(
                chains = ?cfg.enabled_chains().map(|chain| chain.id).collect::<Vec<_>>(),
                wallet = ?creds.wallet_address,
                max_investment = %creds.max_investment_amount,
                "starting sniper"
            );

            let sniper = SniperLoop::connect(&cfg, &creds).await?;
            let cancel = CancellationToken::new();
            let signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received");
                }
                signal.cancel();
            });
            sniper.run(cancel).await?;
        }
        Commands::PrintConfig { config } => {
            let cfg = AppConfig::load(config.as_deref())?;
            let mut value = serde_json::to_value(&cfg)?;
            if let Some(chains) = value.get_mut("chains").and_then(|v| v.as_array_mut()) {
                for chain in chains {
                    if let Some(url) = chain.get_mut("rpc_url") {
                        if let Some(raw) = url.as_str() {
                            *url = serde_json::Value::String(mask_secret(raw));
                        }
                    }
                }
            }
            println!("{}", serde_json::to_string_pretty(&value)?);
            match Credentials::from_env(&cfg) {
                Ok(creds) => println!("{creds:#?}"),
                Err(err) => println!("credentials: {err}"),
            }
        }
    }

    Ok(())
}

/// Console plus a per-start log file, both as `timestamp - LEVEL - message`.
fn init_tracing(obs: &ObservabilityConfig) -> Result<WorkerGuard> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(value) => EnvFilter::try_new(value).unwrap_or_else(|_| EnvFilter::new("info")),
        Err(_) => EnvFilter::try_new(&obs.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
    };

    std::fs::create_dir_all(&obs.log_dir)?;
    let file_name = format!("sniper_bot-{}.log", Local::now().format("%Y%m%d-%H%M%S"));
    let file_appender = tracing_appender::rolling::never(&obs.log_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().event_format(LineFormat))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .event_format(LineFormat),
        )
        .init();
    Ok(guard)
}

struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let now = Local::now().format("%Y-%m-%d %H:%M:%S,%3f");
        write!(writer, "{now} - {} - ", event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
