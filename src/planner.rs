use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::graph::{ManifestCache, ManifestGraph};
use crate::models::{DeletionPlan, ImageVersion, ManifestInfo, Reason};
use crate::policy::decide;
use crate::settings::RetentionPolicy;

/// Classify every image and link manifest lists to their children.
///
/// Relationship discovery covers all tagged images before anything is
/// classified, so an untagged child sees its parent regardless of listing
/// order. Decisions keep input order.
pub async fn build_plan(
    images: &[ImageVersion],
    policy: &RetentionPolicy,
    cache: &mut ManifestCache<'_>,
    now: DateTime<Utc>,
) -> DeletionPlan {
    let graph = ManifestGraph::build(images, cache).await;

    // Tagged images were fetched while building the graph; these are memo hits.
    let mut manifests = HashMap::new();
    for image in images {
        manifests.insert(image.identifier.clone(), cache.get(image).await);
    }

    let mut plan = plan_with_graph(images, policy, &graph, &manifests, now);
    link_relationships(&mut plan, images, &graph);
    plan
}

/// Pure classification pass over already-fetched manifest data.
pub fn plan_with_graph(
    images: &[ImageVersion],
    policy: &RetentionPolicy,
    graph: &ManifestGraph,
    manifests: &HashMap<String, ManifestInfo>,
    now: DateTime<Utc>,
) -> DeletionPlan {
    let mut plan = DeletionPlan::new();

    for image in images {
        let manifest = image.manifest.as_ref().or_else(|| manifests.get(&image.identifier));
        let decision = decide(image, policy, graph, manifest, now);

        for tag in decision.tag_verdicts.iter().filter(|t| t.verdict.should_delete()) {
            info!("{}: DELETE - {}", tag.tag, tag.verdict.reason);
        }
        match &decision.reason {
            Reason::Orphaned => info!("{}: DELETE - {}", image.short_id(), decision.reason),
            Reason::Untagged { .. } if decision.is_delete() => {
                info!("UNTAGGED {}: DELETE - {}", image.short_id(), decision.reason)
            }
            _ => debug!("{}: {} - {}", image.short_id(), decision.action, decision.message()),
        }

        let key = plan_key(&plan, image);
        plan.insert(key, decision);
    }

    plan
}

/// Short id, or the full identifier when the short form is already taken.
/// A numeric suffix settles the rare case where both are taken.
fn plan_key(plan: &DeletionPlan, image: &ImageVersion) -> String {
    let short = image.short_id();
    if !plan.contains_key(short) {
        return short.to_string();
    }
    if !plan.contains_key(&image.identifier) {
        return image.identifier.clone();
    }
    (2..)
        .map(|n| format!("{}#{}", image.identifier, n))
        .find(|key| !plan.contains_key(key))
        .unwrap_or_default()
}

/// Fill in parent and child links. Child digests are reported as the
/// identifier of the listed image carrying that digest when there is one.
pub fn link_relationships(plan: &mut DeletionPlan, images: &[ImageVersion], graph: &ManifestGraph) {
    let by_digest: HashMap<&str, &str> = images
        .iter()
        .map(|i| (i.content_digest(), i.identifier.as_str()))
        .collect();

    for decision in plan.decisions_mut() {
        let image = &decision.image;
        decision.parent_id = graph.parent_of(image.content_digest()).map(str::to_string);
        decision.child_ids = graph
            .children_of(&image.identifier)
            .iter()
            .map(|digest| {
                by_digest
                    .get(digest.as_str())
                    .map_or_else(|| digest.clone(), |id| id.to_string())
            })
            .collect();
    }
}
