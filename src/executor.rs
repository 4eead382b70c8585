use tracing::{error, info, warn};

use crate::error::AppError;
use crate::models::DeletionPlan;
use crate::registry::RegistryClient;

/// Tally of one execution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub deleted: usize,
    /// Deletions the registry cannot perform; not errors
    pub skipped: usize,
    pub errors: usize,
}

/// Delete every image the plan marks for deletion, in plan order.
///
/// A failed deletion is logged and counted, and the remaining deletions still
/// run. Dry runs and empty plans make no registry calls.
pub async fn execute(
    plan: &DeletionPlan,
    registry: &dyn RegistryClient,
    dry_run: bool,
) -> ExecutionReport {
    let mut report = ExecutionReport::default();

    if plan.images_to_delete().next().is_none() {
        info!("No images to delete");
        return report;
    }
    if dry_run {
        return report;
    }

    info!("PERFORMING DELETIONS...");
    for decision in plan.images_to_delete() {
        let image = &decision.image;
        match registry.delete_image(image).await {
            Ok(()) => {
                info!("Deleted {} ({})", image.short_id(), decision.message());
                report.deleted += 1;
            }
            Err(e) if AppError::is_unsupported(&e) => {
                warn!("Cannot delete {}. {:#}. Skipping.", image.short_id(), e);
                report.skipped += 1;
            }
            Err(e) => {
                error!("Error deleting image {}: {:#}", image.short_id(), e);
                report.errors += 1;
            }
        }
    }

    info!(
        "Deleted: {} images, {} skipped, {} errors",
        report.deleted, report.skipped, report.errors
    );
    report
}
