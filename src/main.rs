use std::process;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use regprune::cli::Cli;
use regprune::executor::execute;
use regprune::graph::ManifestCache;
use regprune::output::{print_plan, print_summary, write_summary};
use regprune::planner::build_plan;
use regprune::registry::init_registry;
use regprune::settings::Settings;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(&cli).await {
        Ok(0) => {}
        Ok(_) => process::exit(1),
        Err(e) => {
            error!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn init_tracing(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// One cleanup run. Returns the number of failed deletions.
async fn run(cli: &Cli) -> Result<usize> {
    let settings = Settings::from_cli(cli)?;
    let registry = init_registry(&settings)?;
    let policy = &settings.policy;

    let images = registry
        .list_images()
        .await
        .context("Failed to list images")?;

    info!(
        "Registry: {} | Test={}d, Others={}d | Dry run: {}",
        registry.describe(),
        policy.test_retention_days,
        policy.others_retention_days,
        settings.dry_run
    );
    info!("Found {} image(s)", images.len());

    let mut cache = ManifestCache::new(registry.as_ref());
    let plan = build_plan(&images, policy, &mut cache, Utc::now()).await;

    info!(
        "Summary: {} images to delete ({} tags), {} images to keep ({} tags)",
        plan.images_to_delete().count(),
        plan.tags_to_delete_count(),
        plan.images_to_keep().count(),
        plan.tags_to_keep_count()
    );

    print_plan(&plan, &registry.describe(), settings.dry_run);

    let report = execute(&plan, registry.as_ref(), settings.dry_run).await;

    if let Some(path) = &settings.step_summary {
        if let Err(e) = write_summary(path, &plan, report.errors, policy, settings.dry_run) {
            warn!("Failed to write summary to {}: {}", path.display(), e);
        }
    }

    print_summary(&plan, &report, settings.dry_run);

    Ok(report.errors)
}
