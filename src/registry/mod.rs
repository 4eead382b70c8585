mod ghcr;
mod harbor;

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;

pub use ghcr::GhcrClient;
pub use harbor::HarborClient;

use crate::error::AppError;
use crate::models::{ImageVersion, ManifestInfo};
use crate::settings::Settings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: u32 = 100;

/// Vendor-specific access to one repository's image versions.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Short description for logs, e.g. `GHCR: org/repo`
    fn describe(&self) -> String;

    /// Every version in the repository. Pages are fetched one after another
    /// until an empty page comes back.
    async fn list_images(&self) -> Result<Vec<ImageVersion>>;

    async fn delete_image(&self, image: &ImageVersion) -> Result<()>;

    /// Remove one tag. Fails with [`AppError::Unsupported`] when the registry
    /// can only do this by deleting other tags as well.
    async fn delete_tag(&self, image: &ImageVersion, tag: &str) -> Result<()>;

    /// Best effort: any failure yields [`ManifestInfo::unknown`].
    async fn get_manifest_info(&self, image: &ImageVersion) -> ManifestInfo;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Ghcr,
    Harbor,
}

impl FromStr for RegistryKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ghcr" => Ok(RegistryKind::Ghcr),
            "harbor" => Ok(RegistryKind::Harbor),
            other => Err(AppError::UnknownRegistryType(other.to_string())),
        }
    }
}

/// Build the client selected by `REGISTRY_TYPE`.
pub fn init_registry(settings: &Settings) -> Result<Box<dyn RegistryClient>, AppError> {
    let client: Box<dyn RegistryClient> = match settings.registry_type.parse()? {
        RegistryKind::Ghcr => Box::new(GhcrClient::from_settings(settings)?),
        RegistryKind::Harbor => Box::new(HarborClient::from_settings(settings)?),
    };
    Ok(client)
}

fn http_client() -> Result<Client, AppError> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// Turn a non-success status into an error.
fn check_status(
    resp: reqwest::Response,
    method: &'static str,
    url: &str,
) -> Result<reqwest::Response, AppError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(AppError::Status {
            method,
            url: url.to_string(),
            status,
        })
    }
}

/// Parse a registry timestamp. Values without an offset are taken as UTC.
pub fn parse_time(value: &str) -> Result<DateTime<Utc>, AppError> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => {
            let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")?;
            Ok(naive.and_utc())
        }
    }
}


#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn settings(args: &[&str]) -> Settings {
        let mut argv = vec!["regprune"];
        argv.extend_from_slice(args);
        Settings::from_cli(&Cli::try_parse_from(argv).unwrap()).unwrap()
    }

    #[test]
    fn test_registry_kind_parsing() {
        assert_eq!("ghcr".parse::<RegistryKind>().unwrap(), RegistryKind::Ghcr);
        assert_eq!("Harbor".parse::<RegistryKind>().unwrap(), RegistryKind::Harbor);
        assert!(matches!(
            "quay".parse::<RegistryKind>(),
            Err(AppError::UnknownRegistryType(t)) if t == "quay"
        ));
    }

    #[test]
    fn test_init_ghcr() {
        let s = settings(&[
            "--registry-type",
            "ghcr",
            "--repository-name",
            "repo",
            "--github-token",
            "token",
            "--org-name",
            "org",
        ]);
        let registry = init_registry(&s).unwrap();
        assert_eq!(registry.describe(), "GHCR: org/repo");
    }

    #[test]
    fn test_init_harbor() {
        let s = settings(&[
            "--registry-type",
            "harbor",
            "--repository-name",
            "repo",
            "--harbor-url",
            "harbor.example.com",
            "--harbor-username",
            "user",
            "--harbor-password",
            "pass",
            "--harbor-project-name",
            "proj",
        ]);
        let registry = init_registry(&s).unwrap();
        assert_eq!(registry.describe(), "HARBOR: proj/repo");
    }

    #[test]
    fn test_init_invalid_registry() {
        let s = settings(&[
            "--registry-type",
            "invalid",
            "--repository-name",
            "repo",
        ]);
        assert!(matches!(
            init_registry(&s),
            Err(AppError::UnknownRegistryType(_))
        ));
    }

    #[test]
    fn test_parse_time_with_offset() {
        let parsed = parse_time("2024-01-01T12:00:00Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-01-01T12:00:00+00:00");
        let shifted = parse_time("2024-01-01T14:00:00+02:00").unwrap();
        assert_eq!(shifted, parsed);
    }

    #[test]
    fn test_parse_time_naive_is_utc() {
        let parsed = parse_time("2024-01-01T12:00:00.123").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-01 12:00:00");
    }

    #[test]
    fn test_parse_time_garbage() {
        assert!(matches!(parse_time("yesterday"), Err(AppError::DateParse(_))));
    }
}
