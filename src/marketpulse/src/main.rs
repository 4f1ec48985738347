//! MarketPulse — marketing event ingestion and segmentation pipeline.
//!
//! The binary wires the in-memory stores and services together, seeds a
//! demo batch for each source type, and prints the resulting analysis.

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use uuid::Uuid;

use pulse_core::config::AppConfig;
use pulse_core::types::SourceType;
use pulse_ingestion::adapters::default_adapters;
use pulse_ingestion::credentials::InMemoryCredentialStore;
use pulse_ingestion::processor::EventProcessor;
use pulse_ingestion::schema::SchemaRegistry;
use pulse_ingestion::store::{
    EventRepository, InMemoryDataSourceRepository, InMemoryEventRepository,
};
use pulse_ingestion::transformer::Transformer;
use pulse_ingestion::IntegrationService;
use pulse_segmentation::analyze_user_data;

#[derive(Parser, Debug)]
#[command(name = "marketpulse")]
#[command(about = "Marketing event ingestion and segmentation pipeline")]
#[command(version)]
struct Cli {
    /// Pretty-print the analysis JSON
    #[arg(long, default_value_t = false)]
    pretty: bool,

    /// PII hash salt (overrides config)
    #[arg(long, env = "MARKETPULSE__HASHING__SALT")]
    salt: Option<String>,

    /// Cap on events considered by the analysis (overrides config)
    #[arg(long, env = "MARKETPULSE__ANALYSIS__EVENT_WINDOW")]
    event_window: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketpulse=info,pulse_ingestion=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(salt) = cli.salt {
        config.hashing.salt = salt;
    }
    if let Some(window) = cli.event_window {
        config.analysis.event_window = window;
    }

    info!("MarketPulse starting up");

    let data_sources = Arc::new(InMemoryDataSourceRepository::new());
    let events = Arc::new(InMemoryEventRepository::new());
    let credentials = Arc::new(InMemoryCredentialStore::new());

    let processor = Arc::new(EventProcessor::new(
        events.clone(),
        Arc::new(Transformer::with_salt(&config.hashing.salt)),
        Arc::new(SchemaRegistry::new()),
    ));

    let adapters = default_adapters(&config.ingestion, &config.oauth, credentials);
    let service = IntegrationService::new(data_sources, events.clone(), processor, adapters);

    // Seed one mixed demo batch per source and run the whole pipeline.
    let user_id = Uuid::new_v4();
    let mut demo_source_ids = Vec::new();
    for source_type in [SourceType::TagManager, SourceType::Pixel, SourceType::Commerce] {
        let stored = service.seed_bulk_demo_events(user_id, source_type).await?;
        info!(
            source = source_type.as_str(),
            events = stored.len(),
            "seeded demo source"
        );
    }
    for data_source in service.get_data_sources(user_id).await {
        demo_source_ids.push(data_source.id);
    }

    let recent = events
        .find_recent_for_sources(&demo_source_ids, config.analysis.event_window)
        .await;
    let analysis = analyze_user_data(&recent);

    info!(
        total_events = analysis.total_events,
        users = analysis.user_segments.total_users,
        "analysis complete"
    );

    let output = if cli.pretty {
        serde_json::to_string_pretty(&analysis)?
    } else {
        serde_json::to_string(&analysis)?
    };
    println!("{output}");

    Ok(())
}
