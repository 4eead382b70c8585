use std::path::PathBuf;

use regex::Regex;

use crate::cli::Cli;
#[cfg(test)]
use crate::cli::{DEFAULT_TEST_PATTERN, DEFAULT_VERSION_PATTERN};
use crate::error::AppError;

/// Tag patterns and retention windows consumed by the classifiers.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub version_pattern: Regex,
    pub test_pattern: Regex,
    pub test_retention_days: u32,
    pub others_retention_days: u32,
}

impl RetentionPolicy {
    pub fn new(
        version_pattern: &str,
        test_pattern: &str,
        test_retention_days: u32,
        others_retention_days: u32,
    ) -> Result<Self, AppError> {
        Ok(Self {
            version_pattern: compile_prefix_pattern(version_pattern)?,
            test_pattern: compile_prefix_pattern(test_pattern)?,
            test_retention_days,
            others_retention_days,
        })
    }
}

#[cfg(test)]
impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_VERSION_PATTERN, DEFAULT_TEST_PATTERN, 30, 7).unwrap()
    }
}

/// Patterns match from the start of the tag name, like an anchored match.
fn compile_prefix_pattern(pattern: &str) -> Result<Regex, AppError> {
    Ok(Regex::new(&format!("^(?:{})", pattern))?)
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub registry_type: String,
    pub repository_name: String,
    pub policy: RetentionPolicy,
    pub dry_run: bool,
    pub debug: bool,
    pub step_summary: Option<PathBuf>,
    pub ghcr: GhcrSettings,
    pub harbor: HarborSettings,
}

#[derive(Debug, Clone, Default)]
pub struct GhcrSettings {
    pub token: Option<String>,
    pub org_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct HarborSettings {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub project_name: Option<String>,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Result<Self, AppError> {
        let policy = RetentionPolicy::new(
            &cli.version_pattern,
            &cli.test_pattern,
            cli.test_retention_days,
            cli.others_retention_days,
        )?;

        Ok(Self {
            registry_type: cli.registry_type.trim().to_lowercase(),
            repository_name: cli.repository_name.clone(),
            policy,
            dry_run: cli.dry_run,
            debug: cli.debug,
            step_summary: cli.step_summary.clone(),
            ghcr: GhcrSettings {
                token: non_empty(&cli.github_token),
                org_name: non_empty(&cli.org_name).or_else(|| non_empty(&cli.github_repo_owner)),
            },
            harbor: HarborSettings {
                url: non_empty(&cli.harbor_url),
                username: non_empty(&cli.harbor_username),
                password: non_empty(&cli.harbor_password),
                project_name: non_empty(&cli.harbor_project_name),
            },
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn matches(re: &Regex, s: &str) -> bool {
        re.is_match(s)
    }

    #[test]
    fn test_default_test_pattern() {
        let policy = RetentionPolicy::default();
        assert!(matches(&policy.test_pattern, "pr-123"));
        assert!(matches(&policy.test_pattern, "pr-9999"));
        assert!(!matches(&policy.test_pattern, "pr-abc"));
        assert!(!matches(&policy.test_pattern, "pr123"));
    }

    #[test]
    fn test_default_version_pattern() {
        let policy = RetentionPolicy::default();
        for tag in ["v1.0.0", "v2.3.4-beta", "1.0.0", "0.8.1", "latest"] {
            assert!(matches(&policy.version_pattern, tag), "{tag} should match");
        }
        for tag in ["v1", "20240101-120000", "my-latest"] {
            assert!(!matches(&policy.version_pattern, tag), "{tag} should not match");
        }
    }

    #[test]
    fn test_custom_pattern_is_anchored_at_start() {
        let policy = RetentionPolicy::new("release", "tmp-", 1, 1).unwrap();
        assert!(matches(&policy.version_pattern, "release-2024"));
        assert!(!matches(&policy.version_pattern, "pre-release"));
        assert!(matches(&policy.test_pattern, "tmp-1"));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = RetentionPolicy::new("(", "pr-", 1, 1).unwrap_err();
        assert!(matches!(err, AppError::InvalidPattern(_)));
    }

    #[test]
    fn test_from_cli_normalizes_and_falls_back() {
        let cli = Cli::try_parse_from([
            "regprune",
            "--registry-type",
            " GHCR ",
            "--repository-name",
            "app",
            "--github-token",
            "",
            "--github-repo-owner",
            "acme",
        ])
        .unwrap();
        let settings = Settings::from_cli(&cli).unwrap();
        assert_eq!(settings.registry_type, "ghcr");
        assert_eq!(settings.repository_name, "app");
        assert_eq!(settings.ghcr.token, None);
        assert_eq!(settings.ghcr.org_name.as_deref(), Some("acme"));
    }
}
