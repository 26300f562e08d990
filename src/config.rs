//! tfteam configuration.
//!
//! Loaded from `~/.tfteam/config.toml`, or the path given with `--config`.
//! Every key is optional; a missing default file means built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use serde::Deserialize;

use crate::model::Collection;
use crate::pipeline::DEFAULT_WORKERS;

/// Errors loading configuration or resolving the credential.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0}")]
    Invalid(String),

    #[error(
        "no GitHub token: set GITHUB_API_TOKEN (or GH_TOKEN) to a personal access token"
    )]
    MissingCredential,
}

/// tfteam configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Config {
    /// Organization whose repositories `releases` and `--every-repo` walk.
    pub organization: String,

    /// Team whose members' pull requests `prs` lists.
    pub team_id: u64,

    /// Logins whose comments count as a team review.
    pub team_members: Vec<String>,

    /// Team members left out of `prs` (bots and service accounts).
    pub excluded_members: Vec<String>,

    /// Substrings a notification's repository name or owner must contain.
    pub accepted_repositories: Vec<String>,

    /// Substrings a pull request URL must contain.
    pub pull_request_markers: Vec<String>,

    /// Repositories `triage` and `waiting` search by default, `owner/name`.
    pub triage_repositories: Vec<String>,

    /// Repository reported alongside the organization's in `releases`.
    pub core_repository: String,

    pub workers: usize,

    /// Per remote call.
    pub call_timeout_secs: u64,

    /// Whole-run deadline. None means no deadline.
    pub run_timeout_secs: Option<u64>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            organization: "terraform-providers".to_string(),
            team_id: 1_836_975,
            team_members: strings(&[
                "mitchellh",
                "apparentlymart",
                "jbardin",
                "phinze",
                "paddycarver",
                "catsby",
                "radeksimko",
                "tombuildsstuff",
                "grubernaut",
                "mbfrahry",
                "vancluever",
            ]),
            excluded_members: strings(&["hashicorp-fossa", "tf-release-bot"]),
            accepted_repositories: strings(&["terraform", "tfteam"]),
            pull_request_markers: strings(&["terraform", "tfteam", "tf-deploy"]),
            triage_repositories: strings(&[
                "terraform-providers/terraform-provider-aws",
                "terraform-providers/terraform-provider-azurerm",
                "terraform-providers/terraform-provider-consul",
                "terraform-providers/terraform-provider-google",
                "terraform-providers/terraform-provider-kubernetes",
                "terraform-providers/terraform-provider-nomad",
                "terraform-providers/terraform-provider-opc",
                "terraform-providers/terraform-provider-vault",
                "terraform-providers/terraform-provider-vsphere",
            ]),
            core_repository: "hashicorp/terraform".to_string(),
            workers: DEFAULT_WORKERS,
            call_timeout_secs: 60,
            run_timeout_secs: None,
        }
    }
}

impl Config {
    /// Load from `explicit`, or from the default path when none is given.
    ///
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => match Self::path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Load and validate one file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// The default config file path: `~/.tfteam/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".tfteam").join("config.toml"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "call-timeout-secs must be at least 1".to_string(),
            ));
        }
        if let Some(bad) = self
            .triage_repositories
            .iter()
            .find(|r| Collection::parse(r).is_none())
        {
            return Err(ConfigError::Invalid(format!(
                "triage-repositories entry {bad:?} is not owner/name"
            )));
        }
        if Collection::parse(&self.core_repository).is_none() {
            return Err(ConfigError::Invalid(format!(
                "core-repository {:?} is not owner/name",
                self.core_repository
            )));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}
