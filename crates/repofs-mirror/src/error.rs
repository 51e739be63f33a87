// error.rs — Error types for the mirror layer.
//
// Each failure carries a tag (`ErrorKind`) so the boundary can choose a
// response without inspecting message text.

use repofs_vcs::VcsError;
use repofs_workspace::WorkspaceError;
use thiserror::Error;

/// Category of a mirror failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The path does not exist in a successfully synchronized mirror.
    NotFound,
    /// Malformed identifiers or a path escaping the tenant root.
    PathViolation,
    /// Clone or pull against the remote failed.
    SyncFailure,
    /// Local file access failed.
    IoFailure,
    /// The local change was made but could not be committed or pushed.
    PropagationFailure,
    /// Unpushed local revisions conflict with the remote.
    Diverged,
}

/// Errors returned by [`crate::MirrorService`] operations.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("not found: '{path}'")]
    NotFound { path: String },

    #[error("{0}")]
    PathViolation(WorkspaceError),

    #[error("failed to clone {tenant}: {source}")]
    CloneFailed { tenant: String, source: VcsError },

    #[error("failed to update {tenant}: {source}")]
    PullFailed { tenant: String, source: VcsError },

    #[error("{0}")]
    Io(WorkspaceError),

    #[error("failed to propagate change to {tenant}: {source}")]
    PropagationFailed { tenant: String, source: VcsError },

    #[error("{tenant} has local revisions that conflict with the remote: {source}")]
    Diverged { tenant: String, source: VcsError },
}

impl MirrorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MirrorError::NotFound { .. } => ErrorKind::NotFound,
            MirrorError::PathViolation(_) => ErrorKind::PathViolation,
            MirrorError::CloneFailed { .. } | MirrorError::PullFailed { .. } => {
                ErrorKind::SyncFailure
            }
            MirrorError::Io(_) => ErrorKind::IoFailure,
            MirrorError::PropagationFailed { .. } => ErrorKind::PropagationFailure,
            MirrorError::Diverged { .. } => ErrorKind::Diverged,
        }
    }
}

/// Classify workspace errors by what went wrong rather than where.
impl From<WorkspaceError> for MirrorError {
    fn from(e: WorkspaceError) -> Self {
        match e {
            WorkspaceError::NotFound { path } => MirrorError::NotFound { path },
            WorkspaceError::PathTraversal { .. } | WorkspaceError::InvalidIdentifier { .. } => {
                MirrorError::PathViolation(e)
            }
            WorkspaceError::IoError { .. } | WorkspaceError::IsDirectory { .. } => {
                MirrorError::Io(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_errors_map_to_kinds() {
        let not_found: MirrorError = WorkspaceError::NotFound {
            path: "a.txt".to_string(),
        }
        .into();
        assert_eq!(not_found.kind(), ErrorKind::NotFound);

        let traversal: MirrorError = WorkspaceError::PathTraversal {
            path: "../x".to_string(),
        }
        .into();
        assert_eq!(traversal.kind(), ErrorKind::PathViolation);

        let is_dir: MirrorError = WorkspaceError::IsDirectory {
            path: "docs".to_string(),
        }
        .into();
        assert_eq!(is_dir.kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn vcs_failures_are_tagged_by_phase() {
        let pull = MirrorError::PullFailed {
            tenant: "a/b".to_string(),
            source: VcsError::CommandFailed("boom".to_string()),
        };
        assert_eq!(pull.kind(), ErrorKind::SyncFailure);
        assert!(pull.to_string().contains("failed to update a/b"));

        let push = MirrorError::PropagationFailed {
            tenant: "a/b".to_string(),
            source: VcsError::CommandFailed("rejected".to_string()),
        };
        assert_eq!(push.kind(), ErrorKind::PropagationFailure);
    }
}
