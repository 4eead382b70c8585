use std::collections::HashMap;

use tracing::debug;

use crate::models::{ImageVersion, ManifestInfo, ManifestType};
use crate::registry::RegistryClient;

/// Per-run memo of manifest descriptors, keyed by image identifier.
pub struct ManifestCache<'a> {
    client: &'a dyn RegistryClient,
    memo: HashMap<String, ManifestInfo>,
}

impl<'a> ManifestCache<'a> {
    pub fn new(client: &'a dyn RegistryClient) -> Self {
        Self {
            client,
            memo: HashMap::new(),
        }
    }

    /// Descriptor for `image`: the one carried by the listing, else the memo,
    /// else a single lookup through the client.
    pub async fn get(&mut self, image: &ImageVersion) -> ManifestInfo {
        if let Some(info) = &image.manifest {
            return info.clone();
        }
        if let Some(info) = self.memo.get(&image.identifier) {
            return info.clone();
        }

        let info = self.client.get_manifest_info(image).await;
        debug!(
            image = image.short_id(),
            manifest_type = %info.manifest_type,
            "Fetched manifest"
        );
        self.memo.insert(image.identifier.clone(), info.clone());
        info
    }

    pub fn fetched(&self) -> usize {
        self.memo.len()
    }
}

/// Parent/child links between manifest lists and the manifests they reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestGraph {
    /// child digest -> parent identifier
    parents: HashMap<String, String>,
    /// parent identifier -> child digests, in manifest order
    children: HashMap<String, Vec<String>>,
}

impl ManifestGraph {
    /// Walk every tagged image and record the children of each manifest list.
    pub async fn build(images: &[ImageVersion], cache: &mut ManifestCache<'_>) -> Self {
        let mut graph = Self::default();
        for image in images.iter().filter(|i| !i.is_untagged()) {
            let info = cache.get(image).await;
            graph.record(image, &info);
        }
        graph
    }

    pub fn record(&mut self, image: &ImageVersion, info: &ManifestInfo) {
        if info.manifest_type != ManifestType::ManifestList {
            return;
        }
        for digest in &info.referenced_digests {
            self.parents
                .entry(digest.clone())
                .or_insert_with(|| image.identifier.clone());
        }
        self.children
            .entry(image.identifier.clone())
            .or_default()
            .extend(info.referenced_digests.iter().cloned());
    }

    pub fn parent_of(&self, digest: &str) -> Option<&str> {
        self.parents.get(digest).map(String::as_str)
    }

    pub fn children_of(&self, identifier: &str) -> &[String] {
        self.children
            .get(identifier)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
