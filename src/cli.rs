use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};

pub const DEFAULT_VERSION_PATTERN: &str = r"^(v?\d+\.\d+\.\d+.*|latest)$";
pub const DEFAULT_TEST_PATTERN: &str = r"^pr-\d+$";

/// regprune — retire stale container image versions from a registry
#[derive(Parser, Debug, Clone)]
#[command(name = "regprune", version, about)]
pub struct Cli {
    /// Registry backend: ghcr or harbor
    #[arg(long, env = "REGISTRY_TYPE", default_value = "")]
    pub registry_type: String,

    /// Repository (package) name
    #[arg(long, env = "REPOSITORY_NAME", default_value = "")]
    pub repository_name: String,

    /// Tags matching this regex are never deleted
    #[arg(long, env = "VERSION_PATTERN", default_value = DEFAULT_VERSION_PATTERN)]
    pub version_pattern: String,

    /// Tags matching this regex use the test retention window
    #[arg(long, env = "TEST_PATTERN", default_value = DEFAULT_TEST_PATTERN)]
    pub test_pattern: String,

    /// Days to keep test tags (0 = delete immediately)
    #[arg(long, env = "TEST_RETENTION_DAYS", default_value_t = 30)]
    pub test_retention_days: u32,

    /// Days to keep all other tags and untagged images (0 = delete immediately)
    #[arg(long, env = "OTHERS_RETENTION_DAYS", default_value_t = 7)]
    pub others_retention_days: u32,

    /// Preview changes without deleting
    #[arg(
        long,
        env = "DRY_RUN",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub dry_run: bool,

    /// Debug logging
    #[arg(
        long,
        env = "DEBUG",
        default_value_t = false,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub debug: bool,

    /// Write a markdown summary to this file
    #[arg(long, env = "GITHUB_STEP_SUMMARY")]
    pub step_summary: Option<PathBuf>,

    /// GHCR: GitHub token with packages scope
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// GHCR: organization owning the package
    #[arg(long, env = "ORG_NAME")]
    pub org_name: Option<String>,

    /// GHCR: fallback owner, as set by GitHub Actions
    #[arg(long, env = "GITHUB_REPO_OWNER", hide = true)]
    pub github_repo_owner: Option<String>,

    /// Harbor: base URL (scheme optional)
    #[arg(long, env = "HARBOR_URL")]
    pub harbor_url: Option<String>,

    /// Harbor: username
    #[arg(long, env = "HARBOR_USERNAME")]
    pub harbor_username: Option<String>,

    /// Harbor: password
    #[arg(long, env = "HARBOR_PASSWORD", hide_env_values = true)]
    pub harbor_password: Option<String>,

    /// Harbor: project name
    #[arg(long, env = "HARBOR_PROJECT_NAME")]
    pub harbor_project_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_accepts_boolish_values() {
        let cli = Cli::try_parse_from(["regprune", "--dry-run", "false"]).unwrap();
        assert!(!cli.dry_run);
        let cli = Cli::try_parse_from(["regprune", "--dry-run", "yes"]).unwrap();
        assert!(cli.dry_run);
    }

    #[test]
    fn test_retention_flags() {
        let cli = Cli::try_parse_from([
            "regprune",
            "--registry-type",
            "ghcr",
            "--test-retention-days",
            "0",
            "--others-retention-days",
            "14",
        ])
        .unwrap();
        assert_eq!(cli.registry_type, "ghcr");
        assert_eq!(cli.test_retention_days, 0);
        assert_eq!(cli.others_retention_days, 14);
    }

    #[test]
    fn test_negative_retention_is_rejected() {
        assert!(Cli::try_parse_from(["regprune", "--test-retention-days", "-1"]).is_err());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
