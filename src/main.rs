use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iptv_aggregator::{
    config::Config,
    models::PipelineState,
    notifications::BroadcastNotifier,
    pipeline::Pipeline,
    services::hybrid::HybridUrlTable,
    sources::{m3u::M3uChannelSource, xmltv::XmltvEpgSource},
    utils::channel_alias::FileAliasLoader,
};

#[derive(Parser)]
#[command(name = "iptv-aggregator")]
#[command(version)]
#[command(about = "Aggregate IPTV channel lists and program-guide data into one view")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Skip the program-guide fetch regardless of configuration
    #[arg(long)]
    no_epg: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("iptv_aggregator={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting iptv-aggregator v{}", env!("CARGO_PKG_VERSION"));

    std::env::set_var("CONFIG_FILE", &cli.config);
    let mut config = Config::load()?;
    info!("configuration loaded from: {}", cli.config);

    if cli.no_epg {
        config.epg.enabled = false;
    }

    let channels = Arc::new(M3uChannelSource::new(&config.source, &config.cache.dir));
    let epg = Arc::new(XmltvEpgSource::new(&config.epg, &config.cache.dir));
    let hybrid = Arc::new(HybridUrlTable::load_or_empty(
        config.hybrid.table_file.as_ref(),
    ));
    let aliases = Arc::new(FileAliasLoader::new(config.merge.alias_file.clone()));
    let notifier = Arc::new(BroadcastNotifier::new());

    let pipeline = Pipeline::new(config, channels, epg, hybrid, aliases, notifier);

    let mut states = pipeline.subscribe();
    let logger = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            match &*states.borrow_and_update() {
                PipelineState::Loading { message: Some(msg) } => info!("loading: {}", msg),
                PipelineState::Loading { message: None } => info!("loading..."),
                PipelineState::Ready { .. } => info!("channel list published"),
                PipelineState::Error { .. } | PipelineState::Idle => {}
            }
        }
    });

    pipeline.init().await;
    logger.abort();

    match pipeline.current_state() {
        PipelineState::Ready {
            channel_groups,
            epg,
        } => {
            info!(
                "done: {} groups, {} channels, guide entries for {} channels ({} programmes)",
                channel_groups.groups().len(),
                channel_groups.channel_count(),
                epg.channel_count(),
                epg.programme_count()
            );
            Ok(())
        }
        PipelineState::Error { message } => {
            let message = message.unwrap_or_else(|| "unknown failure".to_string());
            error!("aggregation failed: {}", message);
            anyhow::bail!("aggregation failed: {message}")
        }
        other => anyhow::bail!("pipeline stopped in unexpected state: {other:?}"),
    }
}
