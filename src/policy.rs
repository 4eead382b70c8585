use chrono::{DateTime, Utc};

use crate::graph::ManifestGraph;
use crate::models::{
    Action, ImageDecision, ImageVersion, ManifestInfo, ManifestType, Reason, TagVerdict, Verdict,
};
use crate::settings::RetentionPolicy;

/// Whole days elapsed since `created_at`, truncated.
pub fn age_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_days()
}

/// Retention `0` means immediately eligible; otherwise strictly older than the window.
fn expired(retention_days: u32, age_days: i64) -> bool {
    retention_days == 0 || age_days > i64::from(retention_days)
}

/// Classify one tag. The version pattern takes precedence over everything else.
pub fn classify_tag(
    name: &str,
    created_at: DateTime<Utc>,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Verdict {
    let age_days = age_days(created_at, now);

    if policy.version_pattern.is_match(name) {
        return Verdict {
            action: Action::Keep,
            reason: Reason::VersionTag { age_days },
        };
    }

    if policy.test_pattern.is_match(name) {
        let retention_days = policy.test_retention_days;
        return Verdict {
            action: Action::from_delete(expired(retention_days, age_days)),
            reason: Reason::TestTag {
                retention_days,
                age_days,
            },
        };
    }

    let retention_days = policy.others_retention_days;
    Verdict {
        action: Action::from_delete(expired(retention_days, age_days)),
        reason: Reason::OtherTag {
            retention_days,
            age_days,
        },
    }
}

/// Age-based rule for images without tags.
pub fn classify_untagged(
    created_at: DateTime<Utc>,
    others_retention_days: u32,
    now: DateTime<Utc>,
) -> Verdict {
    let age_days = age_days(created_at, now);
    Verdict {
        action: Action::from_delete(expired(others_retention_days, age_days)),
        reason: Reason::Untagged {
            retention_days: others_retention_days,
            age_days,
            parent: None,
        },
    }
}

/// An untagged single-arch manifest nobody references is deleted regardless of
/// age. Children of a live manifest list and everything else age out normally.
pub fn classify_untagged_image(
    image: &ImageVersion,
    manifest: &ManifestInfo,
    parent: Option<&str>,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Verdict {
    if manifest.manifest_type == ManifestType::Manifest && parent.is_none() {
        return Verdict {
            action: Action::Delete,
            reason: Reason::Orphaned,
        };
    }

    let mut verdict = classify_untagged(image.created_at, policy.others_retention_days, now);
    if let (Some(parent), Action::Keep) = (parent, verdict.action) {
        if let Reason::Untagged { parent: slot, .. } = &mut verdict.reason {
            *slot = Some(parent.to_string());
        }
    }
    verdict
}

/// Decide the fate of a whole image. A tagged image is deleted only when every
/// one of its tags has expired; registries delete versions, not single tags.
pub fn decide(
    image: &ImageVersion,
    policy: &RetentionPolicy,
    graph: &ManifestGraph,
    manifest: Option<&ManifestInfo>,
    now: DateTime<Utc>,
) -> ImageDecision {
    if image.is_untagged() {
        let unknown = ManifestInfo::unknown();
        let manifest = manifest.unwrap_or(&unknown);
        let parent = graph.parent_of(image.content_digest());
        let verdict = classify_untagged_image(image, manifest, parent, policy, now);
        let mut decision = ImageDecision::new(image.clone(), verdict.action, verdict.reason);
        decision.manifest_type = Some(manifest.manifest_type);
        return decision;
    }

    let tag_verdicts: Vec<TagVerdict> = image
        .tags
        .iter()
        .map(|tag| TagVerdict {
            tag: tag.clone(),
            verdict: classify_tag(tag, image.created_at, policy, now),
        })
        .collect();

    let (action, reason) = if tag_verdicts.iter().all(|t| t.verdict.should_delete()) {
        (Action::Delete, Reason::AllTagsExpired)
    } else {
        (Action::Keep, Reason::HasTagsToKeep)
    };

    let mut decision = ImageDecision::new(image.clone(), action, reason);
    decision.tag_verdicts = tag_verdicts;
    decision.manifest_type = manifest.map(|m| m.manifest_type);
    decision
}
