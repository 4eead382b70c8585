use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use tracing::debug;

use super::{check_status, http_client, RegistryClient, PAGE_SIZE};
use crate::error::AppError;
use crate::models::{GhcrPackageVersion, ImageVersion, ManifestDocument, ManifestInfo};
use crate::settings::Settings;

const GITHUB_API: &str = "https://api.github.com";
const GHCR_REGISTRY: &str = "https://ghcr.io";
const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";
const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
    application/vnd.docker.distribution.manifest.list.v2+json, \
    application/vnd.oci.image.manifest.v1+json, \
    application/vnd.docker.distribution.manifest.v2+json";

/// GitHub Container Registry, through the GitHub Packages REST API.
///
/// Versions are identified by their numeric package version id. The API can
/// only delete whole versions, so removing a single tag from a version that
/// carries several is refused.
pub struct GhcrClient {
    client: Client,
    token: String,
    org_name: String,
    repository_name: String,
    api_base: String,
    registry_base: String,
}

impl GhcrClient {
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        if settings.repository_name.is_empty() {
            return Err(AppError::RegistryConfig {
                registry: "GHCR",
                setting: "REPOSITORY_NAME",
            });
        }
        let token = settings.ghcr.token.clone().ok_or(AppError::RegistryConfig {
            registry: "GHCR",
            setting: "GITHUB_TOKEN",
        })?;
        let org_name = settings.ghcr.org_name.clone().ok_or(AppError::RegistryConfig {
            registry: "GHCR",
            setting: "ORG_NAME (or GITHUB_REPO_OWNER)",
        })?;
        Self::new(&token, &org_name, &settings.repository_name)
    }

    pub fn new(token: &str, org_name: &str, repository_name: &str) -> Result<Self, AppError> {
        Ok(Self {
            client: http_client()?,
            token: token.to_string(),
            org_name: org_name.to_string(),
            repository_name: repository_name.to_string(),
            api_base: GITHUB_API.to_string(),
            registry_base: GHCR_REGISTRY.to_string(),
        })
    }

    fn api_headers(&self) -> Result<HeaderMap, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer(&self.token)?);
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_MEDIA_TYPE));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(GITHUB_API_VERSION));
        Ok(headers)
    }

    fn versions_url(&self) -> String {
        format!(
            "{}/orgs/{}/packages/container/{}/versions",
            self.api_base, self.org_name, self.repository_name
        )
    }

    fn version_url(&self, image: &ImageVersion) -> String {
        format!("{}/{}", self.versions_url(), image.identifier)
    }

    /// The registry expects lowercase names; the packages API does not care.
    fn manifest_url(&self, reference: &str) -> String {
        format!(
            "{}/v2/{}/{}/manifests/{}",
            self.registry_base,
            self.org_name.to_lowercase(),
            self.repository_name.to_lowercase(),
            reference
        )
    }

    async fn fetch_manifest(&self, image: &ImageVersion) -> Result<ManifestInfo> {
        let url = self.manifest_url(image.content_digest());
        debug!("GET {}", url);
        // ghcr.io accepts a base64-encoded token as a registry bearer token.
        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, bearer(&BASE64.encode(&self.token))?)
            .header(ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await
            .with_context(|| format!("Failed to GET manifest {}", url))?;
        let resp = check_status(resp, "GET", &url)?;

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let doc: ManifestDocument = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse manifest {}", url))?;
        Ok(doc.into_info(content_type.as_deref()))
    }
}

fn bearer(token: &str) -> Result<HeaderValue, AppError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| AppError::RegistryConfig {
            registry: "GHCR",
            setting: "GITHUB_TOKEN",
        })?;
    value.set_sensitive(true);
    Ok(value)
}

#[async_trait]
impl RegistryClient for GhcrClient {
    fn describe(&self) -> String {
        format!("GHCR: {}/{}", self.org_name, self.repository_name)
    }

    async fn list_images(&self) -> Result<Vec<ImageVersion>> {
        let url = self.versions_url();
        let headers = self.api_headers()?;
        let mut images = Vec::new();
        let mut page: u32 = 1;

        loop {
            debug!("GET {} (page {})", url, page);
            let resp = self
                .client
                .get(&url)
                .headers(headers.clone())
                .query(&[
                    ("page", page.to_string()),
                    ("per_page", PAGE_SIZE.to_string()),
                    ("state", "active".to_string()),
                ])
                .send()
                .await
                .with_context(|| format!("Failed to list versions of {}", self.repository_name))?;
            let resp = check_status(resp, "GET", &url)?;

            let versions: Vec<GhcrPackageVersion> = resp
                .json()
                .await
                .context("Failed to parse package versions JSON")?;
            if versions.is_empty() {
                break;
            }

            images.extend(versions.into_iter().map(ImageVersion::from));
            page += 1;
        }

        Ok(images)
    }

    async fn delete_image(&self, image: &ImageVersion) -> Result<()> {
        let url = self.version_url(image);
        debug!("DELETE {}", url);
        let resp = self
            .client
            .delete(&url)
            .headers(self.api_headers()?)
            .send()
            .await
            .with_context(|| format!("Failed to DELETE version {}", image.identifier))?;
        check_status(resp, "DELETE", &url)?;
        Ok(())
    }

    async fn delete_tag(&self, image: &ImageVersion, tag: &str) -> Result<()> {
        let others: Vec<&str> = image
            .tags
            .iter()
            .map(String::as_str)
            .filter(|t| *t != tag)
            .collect();
        if !others.is_empty() {
            return Err(AppError::Unsupported(format!(
                "GHCR's REST API would delete the entire version, which also carries: {}",
                others.join(", ")
            ))
            .into());
        }
        self.delete_image(image).await
    }

    async fn get_manifest_info(&self, image: &ImageVersion) -> ManifestInfo {
        match self.fetch_manifest(image).await {
            Ok(info) => info,
            Err(e) => {
                debug!("Manifest lookup for {} failed: {:#}", image.short_id(), e);
                ManifestInfo::unknown()
            }
        }
    }
}
