//! Core VcsAdapter trait and result types

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during version-control operations
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("VCS operation failed: {0}")]
    CommandFailed(String),

    #[error("git {command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Local revisions could not be replayed on top of the remote branch.
    #[error("local revisions conflict with remote: {0}")]
    Conflict(String),

    /// The path could not be staged. Retrying the same path fails the same way.
    #[error("failed to stage change: {0}")]
    Staging(String),
}

impl VcsError {
    /// Whether repeating the operation unchanged may succeed.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, VcsError::Staging(_) | VcsError::ConfigError(_))
    }
}

pub type Result<T> = std::result::Result<T, VcsError>;

/// Result of updating a working copy from its remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResult {
    /// HEAD before the update (None for an unborn branch)
    pub previous_head: Option<String>,

    /// HEAD after the update
    pub head: Option<String>,
}

impl PullResult {
    /// Whether the update moved HEAD.
    pub fn updated(&self) -> bool {
        self.previous_head != self.head
    }
}

/// Result of a commit operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    /// Commit hash
    pub commit_id: String,

    /// Human-readable message
    pub message: String,
}

/// Result of a push operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    /// Remote reference that was updated, e.g. `origin/main`
    pub remote_ref: String,

    /// Human-readable message
    pub message: String,
}

/// Pluggable adapter over the version-control engine backing tenant mirrors
///
/// All methods take the working-copy directory explicitly: one adapter
/// serves every tenant.
pub trait VcsAdapter: Send + Sync {
    /// Clone `remote_url` into `dest`. `dest` must not exist yet.
    fn clone_repo(&self, remote_url: &str, dest: &Path) -> Result<()>;

    /// Bring the working copy up to date with its remote branch.
    ///
    /// Local-only revisions are replayed on top of the remote. If that
    /// fails the working copy is restored and `VcsError::Conflict` is
    /// returned.
    fn pull(&self, work_dir: &Path) -> Result<PullResult>;

    /// Number of local revisions not yet on the remote branch.
    fn unpushed_revisions(&self, work_dir: &Path) -> Result<usize>;

    /// Paths whose working-copy state differs from the last revision,
    /// including untracked files.
    fn uncommitted_paths(&self, work_dir: &Path) -> Result<Vec<String>>;

    /// Stage `path` (addition, modification or removal) and commit it.
    ///
    /// The path is staged even if ignore rules match it. Returns `None`
    /// when staging produced no change; a staging failure is
    /// `VcsError::Staging`.
    fn commit(&self, work_dir: &Path, path: &str, message: &str) -> Result<Option<CommitResult>>;

    /// Restore `path` to its state in the last revision, removing it if the
    /// revision does not contain it.
    fn discard(&self, work_dir: &Path, path: &str) -> Result<()>;

    /// Push local revisions to the remote branch.
    fn push(&self, work_dir: &Path) -> Result<PushResult>;

    /// Adapter display name (for logs)
    fn name(&self) -> &str;
}
