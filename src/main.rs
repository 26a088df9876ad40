use anyhow::{anyhow, Result};
use clap::Parser;
use frigate_notify::chat::{ChatTransport, TelegramClient};
use frigate_notify::config::{self, Config};
use frigate_notify::db::repositories::CorrelationsRepository;
use frigate_notify::db::{DatabaseService, KvStore};
use frigate_notify::media::{FrigateClient, MediaSource};
use frigate_notify::messaging::broker::create_message_broker;
use frigate_notify::messaging::EventSource;
use frigate_notify::services::{Bridge, CorrelationCleanupService};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Relay Frigate NVR detections to a Telegram chat
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to a .json, .toml or .yaml configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read settings from environment variables instead of a file
    #[arg(long, conflicts_with = "config")]
    from_env: bool,
}

async fn run_app(config: Config) -> Result<()> {
    info!("Starting frigate-notify {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded:\n{}",
        serde_json::to_string_pretty(&config.redacted())?
    );

    let db = DatabaseService::new(&config.database).await?;
    let kv: Arc<dyn KvStore> = Arc::new(CorrelationsRepository::new(db.pool.clone()));

    let telegram = Arc::new(TelegramClient::connect(&config.telegram).await?);
    let chat: Arc<dyn ChatTransport> = telegram;
    let media: Arc<dyn MediaSource> = Arc::new(FrigateClient::new(&config.frigate)?);

    let bridge = Arc::new(Bridge::new(
        chat.clone(),
        media,
        kv.clone(),
        config.telegram.chat_id,
        config.notifications.required_zone_count.clone(),
    ));

    tokio::spawn(bridge.clone().run_chat_listener(
        chat,
        Duration::from_millis(config.telegram.retry_delay_ms),
    ));

    let cleanup = Arc::new(CorrelationCleanupService::new(
        kv,
        config.database.cleanup_interval_secs,
    ));
    cleanup.start().await?;

    let message_broker = create_message_broker(config.message_broker.clone()).await?;
    info!("Message broker initialized");

    let mut shutdown = Shutdown::new()?;

    let events = message_broker
        .subscribe(&config.message_broker.routing_pattern)
        .await?;
    let listener = tokio::spawn(bridge.run_event_listener(events));
    info!(
        "Listening for Frigate events on {} ({})",
        config.message_broker.exchange, config.message_broker.routing_pattern
    );

    let result = supervise(&mut shutdown, listener).await;

    message_broker.shutdown().await;

    result
}

/// Termination signals the process stops on
struct Shutdown {
    #[cfg(unix)]
    terminate: Signal,
}

impl Shutdown {
    /// Install the handlers; signals received from here on are not lost
    fn new() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for SIGINT or SIGTERM and name the one received
    async fn wait(&mut self) -> &'static str {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = self.terminate.recv() => "SIGTERM",
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            "ctrl-c"
        }
    }
}

/// Run until a termination signal arrives or the event listener stops
async fn supervise(shutdown: &mut Shutdown, listener: JoinHandle<Result<()>>) -> Result<()> {
    tokio::select! {
        biased;

        finished = listener => {
            let err = match finished {
                Ok(Ok(())) => anyhow!("Event listener stopped"),
                Ok(Err(e)) => e,
                Err(e) => anyhow!("Event listener task failed: {}", e),
            };
            error!("Lost the Frigate event feed: {:#}", err);
            Err(err)
        }
        received = shutdown.wait() => {
            info!("Received {}, shutting down...", received);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = if args.from_env {
        Config::from_env()
    } else {
        config::load_config(args.config.as_deref())
    };

    let config = match config.and_then(|config| config.validate().map(|_| config)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(2);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    if let Err(e) = run_app(config).await {
        error!("Application error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_event_feed_ends_the_process_with_an_error() -> Result<()> {
        let mut shutdown = Shutdown::new()?;
        let listener = tokio::spawn(async { Err(anyhow!("Event subscription closed")) });

        let result = tokio::time::timeout(Duration::from_secs(5), supervise(&mut shutdown, listener))
            .await?;

        assert!(result.is_err());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sigterm_is_a_clean_shutdown() -> Result<()> {
        let mut shutdown = Shutdown::new()?;
        let listener = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()?;
        assert!(status.success());

        let result = tokio::time::timeout(Duration::from_secs(5), supervise(&mut shutdown, listener))
            .await?;

        assert!(result.is_ok());
        Ok(())
    }
}
