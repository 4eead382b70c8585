use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::{check_status, http_client, parse_time, RegistryClient, PAGE_SIZE};
use crate::error::AppError;
use crate::models::{HarborArtifact, ImageVersion, ManifestInfo};
use crate::settings::Settings;

/// Harbor registry, through its v2.0 REST API. Artifacts are identified by digest.
pub struct HarborClient {
    client: Client,
    harbor_url: String,
    username: String,
    password: String,
    project_name: String,
    repository_name: String,
}

impl HarborClient {
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        if settings.repository_name.is_empty() {
            return Err(missing("REPOSITORY_NAME"));
        }
        let harbor = &settings.harbor;
        Self::new(
            harbor.url.as_deref().ok_or_else(|| missing("HARBOR_URL"))?,
            harbor.username.as_deref().ok_or_else(|| missing("HARBOR_USERNAME"))?,
            harbor.password.as_deref().ok_or_else(|| missing("HARBOR_PASSWORD"))?,
            harbor
                .project_name
                .as_deref()
                .ok_or_else(|| missing("HARBOR_PROJECT_NAME"))?,
            &settings.repository_name,
        )
    }

    pub fn new(
        harbor_url: &str,
        username: &str,
        password: &str,
        project_name: &str,
        repository_name: &str,
    ) -> Result<Self, AppError> {
        Ok(Self {
            client: http_client()?,
            harbor_url: normalize_url(harbor_url),
            username: username.to_string(),
            password: password.to_string(),
            project_name: project_name.to_string(),
            repository_name: repository_name.to_string(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v2.0{}", self.harbor_url, path)
    }

    /// Nested repository names must be double-encoded in Harbor paths.
    fn artifacts_url(&self) -> String {
        self.api_url(&format!(
            "/projects/{}/repositories/{}/artifacts",
            self.project_name,
            self.repository_name.replace('/', "%252F")
        ))
    }

    fn artifact_url(&self, reference: &str) -> String {
        format!("{}/{}", self.artifacts_url(), reference)
    }

    fn to_image(&self, artifact: HarborArtifact) -> Result<ImageVersion> {
        let created_at = match artifact.push_time.as_deref() {
            Some(push_time) => parse_time(push_time)
                .with_context(|| format!("Invalid push_time for {}", artifact.digest))?,
            None => {
                warn!("Artifact {} has no push_time; treating it as new", artifact.digest);
                chrono::Utc::now()
            }
        };
        let mut image =
            ImageVersion::new(artifact.digest.clone(), artifact.tag_names(), created_at);
        image.manifest = artifact.manifest_info();
        Ok(image)
    }

    async fn fetch_manifest(&self, image: &ImageVersion) -> Result<ManifestInfo> {
        let url = self.artifact_url(&image.identifier);
        debug!("GET {}", url);
        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("with_tag", "false")])
            .send()
            .await
            .with_context(|| format!("Failed to GET artifact {}", image.identifier))?;
        let resp = check_status(resp, "GET", &url)?;
        let artifact: HarborArtifact = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse artifact {}", image.identifier))?;
        Ok(artifact.manifest_info().unwrap_or_else(ManifestInfo::unknown))
    }
}

fn missing(setting: &'static str) -> AppError {
    AppError::RegistryConfig {
        registry: "Harbor",
        setting,
    }
}

/// Strip trailing slashes and default to https.
fn normalize_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

#[async_trait]
impl RegistryClient for HarborClient {
    fn describe(&self) -> String {
        format!("HARBOR: {}/{}", self.project_name, self.repository_name)
    }

    async fn list_images(&self) -> Result<Vec<ImageVersion>> {
        let url = self.artifacts_url();
        let mut images = Vec::new();
        let mut page: u32 = 1;

        loop {
            debug!("GET {} (page {})", url, page);
            let resp = self
                .client
                .get(&url)
                .basic_auth(&self.username, Some(&self.password))
                .query(&[
                    ("page", page.to_string()),
                    ("page_size", PAGE_SIZE.to_string()),
                    ("with_tag", "true".to_string()),
                ])
                .send()
                .await
                .with_context(|| format!("Failed to list artifacts of {}", self.repository_name))?;
            let resp = check_status(resp, "GET", &url)?;

            let artifacts: Vec<HarborArtifact> =
                resp.json().await.context("Failed to parse artifacts JSON")?;
            if artifacts.is_empty() {
                break;
            }

            for artifact in artifacts {
                images.push(self.to_image(artifact)?);
            }
            page += 1;
        }

        Ok(images)
    }

    async fn delete_image(&self, image: &ImageVersion) -> Result<()> {
        let url = self.artifact_url(&image.identifier);
        debug!("DELETE {}", url);
        let resp = self
            .client
            .delete(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .with_context(|| format!("Failed to DELETE artifact {}", image.identifier))?;
        check_status(resp, "DELETE", &url)?;
        Ok(())
    }

    async fn delete_tag(&self, image: &ImageVersion, tag: &str) -> Result<()> {
        let url = format!("{}/tags/{}", self.artifact_url(&image.identifier), tag);
        debug!("DELETE {}", url);
        let resp = self
            .client
            .delete(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .with_context(|| format!("Failed to DELETE tag {}", tag))?;
        check_status(resp, "DELETE", &url)?;
        Ok(())
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

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    use super::*;
    use crate::models::ManifestType;
    use crate::registry::testing::serve;

    const ARTIFACTS_PATH: &str = "/api/v2.0/projects/proj/repositories/repo/artifacts";

    fn client() -> HarborClient {
        HarborClient::new("https://harbor.example.com", "user", "pass", "proj", "repo").unwrap()
    }

    #[test]
    fn test_url_normalization() {
        assert_eq!(normalize_url("harbor.example.com"), "https://harbor.example.com");
        assert_eq!(normalize_url("https://harbor.example.com"), "https://harbor.example.com");
        assert_eq!(normalize_url("http://harbor.example.com/"), "http://harbor.example.com");
    }

    #[test]
    fn test_api_url_construction() {
        let c = HarborClient::new("harbor.example.com", "user", "pass", "proj", "repo").unwrap();
        assert_eq!(c.api_url("/test/path"), "https://harbor.example.com/api/v2.0/test/path");
    }

    #[test]
    fn test_nested_repository_is_double_encoded() {
        let c = HarborClient::new("harbor.example.com", "u", "p", "proj", "team/app").unwrap();
        assert_eq!(
            c.artifact_url("sha256:abc"),
            concat!(
                "https://harbor.example.com/api/v2.0/projects/proj/repositories/",
                "team%252Fapp/artifacts/sha256:abc"
            )
        );
    }

    #[test]
    fn test_to_image_carries_tags_and_manifest() {
        let artifact: HarborArtifact = serde_json::from_value(serde_json::json!({
            "digest": "sha256:abc123",
            "push_time": "2024-01-01T00:00:00Z",
            "tags": [{"name": "tag1"}, {"name": "tag2"}],
            "manifest_media_type": "application/vnd.docker.distribution.manifest.v2+json"
        }))
        .unwrap();
        let image = client().to_image(artifact).unwrap();
        assert_eq!(image.identifier, "sha256:abc123");
        assert_eq!(image.tags, vec!["tag1", "tag2"]);
        assert_eq!(image.created_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(
            image.manifest.map(|m| m.manifest_type),
            Some(ManifestType::Manifest)
        );
    }

    #[test]
    fn test_to_image_rejects_bad_push_time() {
        let artifact: HarborArtifact = serde_json::from_value(serde_json::json!({
            "digest": "sha256:abc123",
            "push_time": "not a time"
        }))
        .unwrap();
        assert!(client().to_image(artifact).is_err());
    }

    #[test]
    fn test_from_settings_requires_harbor_url() {
        use clap::Parser;

        let cli = crate::cli::Cli::try_parse_from([
            "regprune",
            "--registry-type",
            "harbor",
            "--repository-name",
            "repo",
            "--harbor-url",
            "",
        ])
        .unwrap();
        let settings = Settings::from_cli(&cli).unwrap();
        assert!(matches!(
            HarborClient::from_settings(&settings),
            Err(AppError::RegistryConfig { setting: "HARBOR_URL", .. })
        ));
    }

    async fn client_for(router: Router) -> HarborClient {
        let base = serve(router).await;
        HarborClient::new(&base, "user", "pass", "proj", "repo").unwrap()
    }

    #[tokio::test]
    async fn test_list_images_accumulates_pages_until_empty() {
        async fn artifacts(Query(q): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
            match q.get("page").map(String::as_str) {
                Some("1") => {
                    let page = json!([
                        {
                            "digest": "sha256:list",
                            "push_time": "2024-01-01T12:00:00.000Z",
                            "tags": [{"name": "v1.0.0"}],
                            "manifest_media_type": "application/vnd.oci.image.index.v1+json",
                            "references": [{
                                "child_digest": "sha256:amd",
                                "platform": {"architecture": "amd64"}
                            }]
                        },
                        {"digest": "sha256:amd", "push_time": "2024-01-01T12:00:00Z", "tags": null}
                    ]);
                    (StatusCode::OK, Json(page))
                }
                Some("2") => {
                    let page = json!([
                        {"digest": "sha256:naive", "push_time": "2024-03-05T08:30:00.000"}
                    ]);
                    (StatusCode::OK, Json(page))
                }
                Some("3") => (StatusCode::OK, Json(json!([]))),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!([]))),
            }
        }
        let c = client_for(Router::new().route(ARTIFACTS_PATH, get(artifacts))).await;

        let images = c.list_images().await.unwrap();

        let ids: Vec<&str> = images.iter().map(|i| i.identifier.as_str()).collect();
        assert_eq!(ids, vec!["sha256:list", "sha256:amd", "sha256:naive"]);
        let list = images[0].manifest.as_ref().unwrap();
        assert_eq!(list.manifest_type, ManifestType::ManifestList);
        assert_eq!(list.referenced_digests, vec!["sha256:amd"]);
        assert!(images[1].is_untagged());
        assert_eq!(images[2].created_at, Utc.with_ymd_and_hms(2024, 3, 5, 8, 30, 0).unwrap());
    }

    #[tokio::test]
    async fn test_list_images_fails_on_error_status() {
        let router = Router::new().route(
            ARTIFACTS_PATH,
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let c = client_for(router).await;

        let err = c.list_images().await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AppError>(),
            Some(AppError::Status { method: "GET", status, .. })
                if *status == reqwest::StatusCode::INTERNAL_SERVER_ERROR
        ));
    }
}
