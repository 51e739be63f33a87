//! Git adapter configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapter::{Result, VcsError};

/// Git adapter configuration, the `[git]` table of the repofs config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Remote URL for a tenant; `{org}` and `{repo}` are substituted
    #[serde(default = "default_remote_url_template")]
    pub remote_url_template: String,

    /// Git remote name
    #[serde(default = "default_remote")]
    pub remote: String,

    /// The single branch mirrors track
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Commit author name
    #[serde(default = "default_author_name")]
    pub author_name: String,

    /// Commit author email
    #[serde(default = "default_author_email")]
    pub author_email: String,

    /// Upper bound for clone, fetch and push, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote_url_template: default_remote_url_template(),
            remote: default_remote(),
            branch: default_branch(),
            author_name: default_author_name(),
            author_email: default_author_email(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GitConfig {
    /// Remote origin URL for a tenant.
    pub fn remote_url(&self, org: &str, repo: &str) -> String {
        self.remote_url_template
            .replace("{org}", org)
            .replace("{repo}", repo)
    }

    /// Timeout applied to network-facing git commands.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reject configurations that cannot produce a per-tenant remote.
    pub fn validate(&self) -> Result<()> {
        if !self.remote_url_template.contains("{org}")
            || !self.remote_url_template.contains("{repo}")
        {
            return Err(VcsError::ConfigError(format!(
                "remote_url_template must contain {{org}} and {{repo}}: '{}'",
                self.remote_url_template
            )));
        }
        if self.remote.is_empty() || self.branch.is_empty() {
            return Err(VcsError::ConfigError(
                "remote and branch must not be empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(VcsError::ConfigError(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// `remote/branch`, the upstream ref mirrors are compared against.
    pub fn upstream_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }
}

// Serde default functions
fn default_remote_url_template() -> String {
    "https://github.com/{org}/{repo}.git".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_author_name() -> String {
    "repofs".to_string()
}

fn default_author_email() -> String {
    "repofs@localhost".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}
