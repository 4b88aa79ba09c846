//! Ledgervoice entry point: wire the components and run the poll loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use ledgervoice::agents::{Orchestrator, ReplyAgent};
use ledgervoice::catalog::Catalog;
use ledgervoice::config::AppConfig;
use ledgervoice::ledger::{LedgerStore, SheetsStore};
use ledgervoice::oracle::{ExtractionOracle, OpenAiOracle};
use ledgervoice::telegram::{ChatTransport, TelegramApi};
use ledgervoice::transcribe;
use ledgervoice::Bot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("ledgervoice.toml"));
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.validate()?;
    tracing::info!(config = %config_path.display(), "starting ledgervoice");

    let store: Arc<dyn LedgerStore> = Arc::new(SheetsStore::new(
        config.sheets.clone(),
        Duration::from_secs(config.behavior.store_timeout_secs),
    )?);
    let catalog = Arc::new(Catalog::new(
        Arc::clone(&store),
        config.sheets.catalog.clone(),
        Duration::from_secs(config.behavior.catalog_ttl_secs),
    ));
    let oracle: Arc<dyn ExtractionOracle> = Arc::new(OpenAiOracle::new(config.oracle.clone())?);
    let transcriber: Arc<dyn transcribe::Transcriber> =
        Arc::from(transcribe::from_config(&config.transcription)?);

    let api = Arc::new(TelegramApi::new(
        config.telegram.clone(),
        config.behavior.max_reply_hops,
    )?);
    let transport: Arc<dyn ChatTransport> = Arc::clone(&api) as Arc<dyn ChatTransport>;

    let orchestrator = Orchestrator::new(Arc::clone(&oracle));
    let reply_agent = ReplyAgent::new(
        Arc::clone(&oracle),
        Arc::clone(&store),
        config.sheets.clone(),
        config.behavior.edit_context_messages,
    );
    let bot = Bot::new(
        config,
        transport,
        transcriber,
        store,
        catalog,
        orchestrator,
        reply_agent,
    );

    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let poller = tokio::spawn(async move { api.run(inbound_tx).await });
    bot.run(inbound_rx).await;

    match poller.await {
        Ok(result) => result.map_err(Into::into),
        Err(err) => {
            tracing::error!(%err, "poll task panicked");
            Ok(())
        }
    }
}
