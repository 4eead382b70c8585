use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A single registry artifact: one manifest or manifest list.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageVersion {
    /// Digest or vendor-specific version id, unique within a repository
    pub identifier: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Content digest, when `identifier` is not the digest itself
    pub digest: Option<String>,
    /// Manifest descriptor, when the listing already carried it
    pub manifest: Option<ManifestInfo>,
}

impl ImageVersion {
    pub fn new(
        identifier: impl Into<String>,
        tags: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            tags,
            created_at,
            digest: None,
            manifest: None,
        }
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    pub fn with_manifest(mut self, manifest: ManifestInfo) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// The digest other manifests use to reference this one.
    pub fn content_digest(&self) -> &str {
        self.digest.as_deref().unwrap_or(&self.identifier)
    }

    /// First 12 characters of the identifier, used as the plan key.
    pub fn short_id(&self) -> &str {
        match self.identifier.char_indices().nth(12) {
            Some((end, _)) => &self.identifier[..end],
            None => &self.identifier,
        }
    }

    pub fn is_untagged(&self) -> bool {
        self.tags.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestType {
    Manifest,
    ManifestList,
    Unknown,
}

impl ManifestType {
    /// Classify a manifest media type (Docker or OCI).
    pub fn from_media_type(media_type: &str) -> Self {
        if media_type.contains("manifest.list") || media_type.contains("image.index") {
            ManifestType::ManifestList
        } else if media_type.contains("manifest.v2")
            || media_type.contains("manifest.v1")
            || media_type.contains("image.manifest")
        {
            ManifestType::Manifest
        } else {
            ManifestType::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestType::Manifest => "manifest",
            ManifestType::ManifestList => "manifest_list",
            ManifestType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ManifestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manifest descriptor derived from the registry, fetched at most once per image.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestInfo {
    pub manifest_type: ManifestType,
    pub architectures: BTreeSet<String>,
    /// Children of a manifest list
    pub referenced_digests: Vec<String>,
}

impl ManifestInfo {
    pub fn unknown() -> Self {
        Self {
            manifest_type: ManifestType::Unknown,
            architectures: BTreeSet::new(),
            referenced_digests: Vec::new(),
        }
    }

    pub fn single() -> Self {
        Self {
            manifest_type: ManifestType::Manifest,
            ..Self::unknown()
        }
    }

    pub fn list<I, S>(children: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<S>)>,
        S: Into<String>,
    {
        let mut info = Self {
            manifest_type: ManifestType::ManifestList,
            ..Self::unknown()
        };
        for (digest, arch) in children {
            info.referenced_digests.push(digest.into());
            if let Some(arch) = arch {
                info.architectures.insert(arch.into());
            }
        }
        info
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Keep,
    Delete,
}

impl Action {
    pub fn from_delete(should_delete: bool) -> Self {
        if should_delete {
            Action::Delete
        } else {
            Action::Keep
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Keep => f.write_str("keep"),
            Action::Delete => f.write_str("delete"),
        }
    }
}

/// Why a tag or image was kept or deleted. `Display` renders the log/report text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    VersionTag {
        age_days: i64,
    },
    TestTag {
        retention_days: u32,
        age_days: i64,
    },
    OtherTag {
        retention_days: u32,
        age_days: i64,
    },
    Untagged {
        retention_days: u32,
        age_days: i64,
        parent: Option<String>,
    },
    Orphaned,
    HasTagsToKeep,
    AllTagsExpired,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::VersionTag { age_days } => {
                write!(f, "version tag (protected, {}d old)", age_days)
            }
            Reason::TestTag {
                retention_days,
                age_days,
            } => write_retention(f, "test tag", *retention_days, *age_days),
            Reason::OtherTag {
                retention_days,
                age_days,
            } => write_retention(f, "other tag", *retention_days, *age_days),
            Reason::Untagged {
                retention_days,
                age_days,
                parent,
            } => {
                write_retention(f, "untagged", *retention_days, *age_days)?;
                if let Some(parent) = parent {
                    write!(f, " (parent: {})", parent)?;
                }
                Ok(())
            }
            Reason::Orphaned => f.write_str("orphaned manifest (no parent)"),
            Reason::HasTagsToKeep => f.write_str("has_tags_to_keep"),
            Reason::AllTagsExpired => f.write_str("all_tags_expired"),
        }
    }
}

fn write_retention(
    f: &mut fmt::Formatter<'_>,
    label: &str,
    retention_days: u32,
    age_days: i64,
) -> fmt::Result {
    if retention_days == 0 {
        write!(f, "{} (retention=0d, {}d old)", label, age_days)
    } else {
        write!(f, "{} >{}d ({}d old)", label, retention_days, age_days)
    }
}

/// Classifier output for a single tag or untagged image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub action: Action,
    pub reason: Reason,
}

impl Verdict {
    pub fn should_delete(&self) -> bool {
        self.action == Action::Delete
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagVerdict {
    pub tag: String,
    pub verdict: Verdict,
}

/// The classifier's verdict for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDecision {
    pub image: ImageVersion,
    pub action: Action,
    pub reason: Reason,
    /// Per-tag verdicts; empty for untagged images
    pub tag_verdicts: Vec<TagVerdict>,
    pub manifest_type: Option<ManifestType>,
    pub parent_id: Option<String>,
    pub child_ids: Vec<String>,
}

impl ImageDecision {
    pub fn new(image: ImageVersion, action: Action, reason: Reason) -> Self {
        Self {
            image,
            action,
            reason,
            tag_verdicts: Vec::new(),
            manifest_type: None,
            parent_id: None,
            child_ids: Vec::new(),
        }
    }

    pub fn is_delete(&self) -> bool {
        self.action == Action::Delete
    }

    /// Human-readable reason. For an expired multi-tag image this is the first
    /// tag's reason, which is more useful in reports than the aggregate code.
    pub fn message(&self) -> String {
        match (&self.reason, self.tag_verdicts.first()) {
            (Reason::AllTagsExpired, Some(first)) => first.verdict.reason.to_string(),
            (reason, _) => reason.to_string(),
        }
    }
}

/// Result of planning one run. Decisions keep input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeletionPlan {
    decisions: Vec<(String, ImageDecision)>,
    index: HashMap<String, usize>,
}

impl DeletionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a decision, replacing any previous decision under the same key.
    pub fn insert(&mut self, key: String, decision: ImageDecision) {
        match self.index.get(&key) {
            Some(&pos) => self.decisions[pos].1 = decision,
            None => {
                self.index.insert(key.clone(), self.decisions.len());
                self.decisions.push((key, decision));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&ImageDecision> {
        self.index.get(key).map(|&pos| &self.decisions[pos].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn decisions(&self) -> impl Iterator<Item = (&str, &ImageDecision)> {
        self.decisions.iter().map(|(k, d)| (k.as_str(), d))
    }

    pub(crate) fn decisions_mut(&mut self) -> impl Iterator<Item = &mut ImageDecision> {
        self.decisions.iter_mut().map(|(_, d)| d)
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn images_to_delete(&self) -> impl Iterator<Item = &ImageDecision> {
        self.decisions.iter().map(|(_, d)| d).filter(|d| d.is_delete())
    }

    pub fn images_to_keep(&self) -> impl Iterator<Item = &ImageDecision> {
        self.decisions.iter().map(|(_, d)| d).filter(|d| !d.is_delete())
    }

    pub fn tags_to_delete_count(&self) -> usize {
        self.images_to_delete().map(|d| d.image.tags.len()).sum()
    }

    pub fn tags_to_keep_count(&self) -> usize {
        self.images_to_keep().map(|d| d.image.tags.len()).sum()
    }
}

// Registry API responses

/// GET /v2/<repo>/manifests/<reference> — only the fields needed to tell a
/// manifest list from a single-architecture manifest.
#[derive(Debug, Deserialize)]
pub struct ManifestDocument {
    #[serde(rename = "mediaType")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub manifests: Vec<ManifestDescriptor>,
    pub config: Option<ManifestConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ManifestDescriptor {
    pub digest: String,
    pub platform: Option<Platform>,
}

#[derive(Debug, Deserialize)]
pub struct Platform {
    pub architecture: String,
}

#[derive(Debug, Deserialize)]
pub struct ManifestConfig {
    #[serde(rename = "mediaType")]
    pub media_type: Option<String>,
    pub digest: String,
}

impl ManifestDocument {
    /// Interpret the document, falling back to the response Content-Type when
    /// the body does not carry a media type.
    pub fn into_info(self, content_type: Option<&str>) -> ManifestInfo {
        let manifest_type = self
            .media_type
            .as_deref()
            .or(content_type)
            .map(ManifestType::from_media_type)
            .unwrap_or(ManifestType::Unknown);

        let manifest_type = match manifest_type {
            ManifestType::Unknown if !self.manifests.is_empty() => ManifestType::ManifestList,
            ManifestType::Unknown if self.config.is_some() => ManifestType::Manifest,
            other => other,
        };

        if manifest_type != ManifestType::ManifestList {
            return ManifestInfo {
                manifest_type,
                ..ManifestInfo::unknown()
            };
        }

        ManifestInfo::list(
            self.manifests
                .into_iter()
                .map(|m| (m.digest, m.platform.map(|p| p.architecture))),
        )
    }
}

/// GET /orgs/<org>/packages/container/<package>/versions
#[derive(Debug, Deserialize)]
pub struct GhcrPackageVersion {
    pub id: u64,
    /// The version's content digest
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: GhcrVersionMetadata,
}

#[derive(Debug, Default, Deserialize)]
pub struct GhcrVersionMetadata {
    #[serde(default)]
    pub container: GhcrContainerMetadata,
}

#[derive(Debug, Default, Deserialize)]
pub struct GhcrContainerMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<GhcrPackageVersion> for ImageVersion {
    fn from(version: GhcrPackageVersion) -> Self {
        ImageVersion::new(
            version.id.to_string(),
            version.metadata.container.tags,
            version.created_at,
        )
        .with_digest(version.name)
    }
}

/// GET /api/v2.0/projects/<project>/repositories/<repo>/artifacts
#[derive(Debug, Deserialize)]
pub struct HarborArtifact {
    pub digest: String,
    pub push_time: Option<String>,
    pub tags: Option<Vec<HarborTag>>,
    pub manifest_media_type: Option<String>,
    pub references: Option<Vec<HarborReference>>,
}

#[derive(Debug, Deserialize)]
pub struct HarborTag {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HarborReference {
    pub child_digest: String,
    pub platform: Option<Platform>,
}

impl HarborArtifact {
    /// Manifest descriptor carried inline by the artifact listing, if any.
    pub fn manifest_info(&self) -> Option<ManifestInfo> {
        let manifest_type = ManifestType::from_media_type(self.manifest_media_type.as_deref()?);
        match manifest_type {
            ManifestType::ManifestList => Some(ManifestInfo::list(
                self.references.iter().flatten().map(|r| {
                    (
                        r.child_digest.clone(),
                        r.platform.as_ref().map(|p| p.architecture.clone()),
                    )
                }),
            )),
            other => Some(ManifestInfo {
                manifest_type: other,
                ..ManifestInfo::unknown()
            }),
        }
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.tags
            .iter()
            .flatten()
            .filter_map(|t| t.name.clone())
            .filter(|n| !n.is_empty())
            .collect()
    }
}
