use anyhow::Context;
use classifier::ProxyClassifier;
use filter_engine::{
    event_channel, Clock, Dispatcher, EngineEvent, FilterEngine, PageContext, SettingsService,
    SystemClock,
};
use std::sync::Arc;
use storage::SqliteStorage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use webtone_core::AppConfig;

const DEFAULT_PAGE_URL: &str = "https://x.com/home";

/// Usage: `webtone [config.toml] [page-url]`
///
/// Reads JSON-lines engine events from stdin and writes one JSON effect per
/// line to stdout. Logs go to stderr.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("webtone=info,filter_engine=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => AppConfig::load(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => {
            let mut config = AppConfig::default();
            config.apply_overrides(|name| std::env::var(name).ok());
            config.validate()?;
            config
        }
    };
    let page = PageContext::new(args.next().unwrap_or_else(|| DEFAULT_PAGE_URL.to_string()));

    info!("Starting WebTone filter engine for {}", page.page_url);

    let storage = Arc::new(
        SqliteStorage::connect(&config.storage.database_url)
            .await
            .context("opening settings database")?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let settings = SettingsService::new(
        storage.clone(),
        clock.clone(),
        config.engine.settings_ttl(),
    );
    if let Err(e) = settings.seed_defaults().await {
        warn!("Could not seed default settings: {}", e);
    }
    let client_id = settings.client_id().await;

    let classifier = Arc::new(ProxyClassifier::new(&config.classifier, client_id)?);
    let (engine, mut effects) = FilterEngine::new(
        storage.clone(),
        classifier.clone(),
        clock,
        page,
        &config.engine,
    );
    let engine = Arc::new(engine);

    let printer = tokio::spawn(async move {
        while let Some(effect) = effects.recv().await {
            match serde_json::to_string(&effect) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Could not encode effect: {}", e),
            }
        }
    });

    let (events, receiver) = event_channel();
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match serde_json::from_str::<EngineEvent>(&line) {
                    Ok(event) => {
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Ignoring malformed event: {}", e),
                },
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    Dispatcher::new(engine.clone(), receiver).run().await;
    reader.await?;

    // Closing the effect channel lets the printer finish.
    drop(engine);
    printer.await?;

    let metrics = classifier.get_metrics().await;
    let health = classifier.health().await;
    info!(
        "Classifier requests: {} ok, {} failed; {} recent errors",
        metrics.successful_requests(),
        metrics.failed_requests(),
        health.last_errors.len()
    );

    storage.close().await;
    Ok(())
}
