// tenant.rs — Tenant identifiers.
//
// A tenant is an (organization, repository) pair. Both halves become path
// segments under the working directory and are substituted into the remote
// URL, so they are restricted to a conservative character set.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WorkspaceError;

/// Longest accepted organization or repository identifier, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 100;

/// A validated (org, repo) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId {
    org: String,
    repo: String,
}

impl TenantId {
    /// Validate and build a tenant identifier.
    ///
    /// Each half must be non-empty, at most [`MAX_IDENTIFIER_LEN`] bytes of
    /// ASCII alphanumerics, `-`, `_` or `.`, and must not start with `.`.
    pub fn new(org: impl Into<String>, repo: impl Into<String>) -> Result<Self, WorkspaceError> {
        let org = org.into();
        let repo = repo.into();
        validate_identifier("org", &org)?;
        validate_identifier("repo", &repo)?;
        Ok(Self { org, repo })
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.repo)
    }
}

fn validate_identifier(field: &'static str, value: &str) -> Result<(), WorkspaceError> {
    let invalid = |reason| WorkspaceError::InvalidIdentifier {
        field,
        value: value.to_string(),
        reason,
    };

    if value.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(invalid("too long"));
    }
    if value.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid("only ASCII letters, digits, '-', '_' and '.' are allowed"));
    }
    Ok(())
}
