use std::{path::PathBuf, process, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use url::Url;

use shared::domain::ItemId;
use storage::{CatalogStore, HttpCatalogStore, JsonFileCatalogStore};
use worker::{
    budget::PostBudget,
    config::{is_remote_catalog, load_settings},
    remote::{HttpPlatform, HttpRenderer},
    runner::{PublishWorker, RunOutcome, WorkerError},
};

/// Publishes one catalog item: renders its thread, posts it to the
/// platform, and records the outcome in the shared catalog document.
#[derive(Parser, Debug)]
struct Args {
    /// Catalog item to publish, e.g. GSW_vs_LAL_2026-02-10.
    item_id: String,
    /// Re-run an item that previously failed.
    #[arg(long)]
    retry: bool,
    /// Settings file; defaults to ./worker.toml.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();
    let settings = load_settings(args.config.as_deref());

    let store: Arc<dyn CatalogStore> = if is_remote_catalog(&settings.catalog_url) {
        let url = Url::parse(&settings.catalog_url)
            .with_context(|| format!("invalid catalog url '{}'", settings.catalog_url))?;
        Arc::new(HttpCatalogStore::new(url, settings.catalog_token.clone()))
    } else {
        Arc::new(JsonFileCatalogStore::new(&settings.catalog_url))
    };

    let render_url = Url::parse(&settings.render_url)
        .with_context(|| format!("invalid render url '{}'", settings.render_url))?;
    let platform_url = Url::parse(&settings.platform_url)
        .with_context(|| format!("invalid platform url '{}'", settings.platform_url))?;

    let worker = PublishWorker::new(
        store,
        Arc::new(HttpRenderer::new(render_url)),
        Arc::new(HttpPlatform::new(platform_url, settings.platform_token)),
        PostBudget::new(&settings.budget_path, settings.budget_limit),
    );

    let item_id = ItemId::new(&args.item_id);
    match worker.run(&item_id, args.retry).await {
        Ok(RunOutcome::Published { post_ids }) => {
            info!(item_id = %item_id, ?post_ids, "published");
            Ok(())
        }
        Ok(RunOutcome::SkippedAlreadyPublished)
        | Ok(RunOutcome::SkippedInFlight)
        | Ok(RunOutcome::SkippedNeedsRetry) => {
            info!(item_id = %item_id, "nothing to do");
            Ok(())
        }
        Ok(RunOutcome::Failed { reason }) => {
            error!(item_id = %item_id, reason, "publish failed");
            process::exit(1);
        }
        Err(error @ WorkerError::StoreWriteExhausted { .. }) => {
            // Exit code 2 marks the reconciliation gap for the job runner.
            error!(%error, "publish outcome was not recorded");
            process::exit(2);
        }
        Err(error) => Err(error.into()),
    }
}
