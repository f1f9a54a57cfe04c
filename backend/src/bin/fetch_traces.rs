use std::path::PathBuf;

use clap::Parser;
use gpx_speed::{
    aggregate::{PagePolicy, TraceAggregate},
    config::Config,
    geo::{BoundingBox, SAMPLE_BBOX},
    source::OsmTraceClient,
    storage::{StorageError, TrackStore},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Fetch public GPS traces for a bounding box and annotate them with speeds"
)]
struct Args {
    #[arg(long, default_value_t = SAMPLE_BBOX.min_lon, allow_negative_numbers = true)]
    min_lon: f64,
    #[arg(long, default_value_t = SAMPLE_BBOX.min_lat, allow_negative_numbers = true)]
    min_lat: f64,
    #[arg(long, default_value_t = SAMPLE_BBOX.max_lon, allow_negative_numbers = true)]
    max_lon: f64,
    #[arg(long, default_value_t = SAMPLE_BBOX.max_lat, allow_negative_numbers = true)]
    max_lat: f64,

    /// Maximum number of trace pages to request (defaults to TRACES_MAX_PAGES)
    #[arg(long)]
    max_pages: Option<u32>,

    /// Abort on the first page that is not readable GPX instead of skipping it
    #[arg(long)]
    fail_fast: bool,

    /// Persist the enriched tracks (requires DATABASE_URL)
    #[arg(long)]
    store: bool,

    /// Write the JSON result here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

impl Args {
    fn bbox(&self) -> BoundingBox {
        BoundingBox::new(self.min_lon, self.min_lat, self.max_lon, self.max_lat)
    }

    fn policy(&self) -> PagePolicy {
        if self.fail_fast {
            PagePolicy::FailFast
        } else {
            PagePolicy::SkipMalformed
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let bbox = args.bbox();
    bbox.validate()?;

    let client = OsmTraceClient::new(config.traces_api_url.clone(), config.request_timeout)?;
    let max_pages = args.max_pages.unwrap_or(config.max_pages);
    let aggregate = TraceAggregate::fetch(&client, bbox, max_pages, args.policy()).await?;
    tracing::info!(
        "{} tracks kept, {} pages skipped",
        aggregate.tracks().len(),
        aggregate.skipped_pages()
    );

    if args.store {
        let url = config
            .database_url
            .as_deref()
            .ok_or(StorageError::NotConfigured)?;
        let store = TrackStore::connect(url).await?;
        store.migrate().await?;
        let ids = store.store_aggregate(&aggregate).await?;
        tracing::info!("stored {} tracks", ids.len());
    }

    let json = serde_json::to_string_pretty(&aggregate)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)?;
            tracing::info!("result written to {:?}", path);
        }
        None => println!("{json}"),
    }

    Ok(())
}
