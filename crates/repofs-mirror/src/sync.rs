// sync.rs — Clone-or-pull policy for tenant mirrors.
//
// Absent mirror: clone into a temporary sibling directory and rename it
// into place, so a failed clone leaves nothing behind and the next request
// starts from scratch. Present mirror: pull, then finish any propagation a
// previous request (or a previous process) left undone: commit queued and
// uncommitted changes, push unpushed revisions. The tenant is not served
// until that succeeds. A change that cannot be committed is discarded after
// `MAX_COMMIT_ATTEMPTS`, or at once when retrying cannot help.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use repofs_vcs::{GitConfig, PullResult, PushResult, VcsAdapter, VcsError};
use repofs_workspace::{mutation, Resolver, TenantId, WorkspaceError};

use crate::error::MirrorError;
use crate::tenants::{PendingCommit, TenantState, MAX_COMMIT_ATTEMPTS};

/// What a synchronize step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No local mirror existed; it was cloned.
    Cloned,
    /// The existing mirror was updated from its remote.
    Pulled(PullResult),
    /// The mirror was updated and leftover local changes were propagated.
    Reconciled {
        pull: PullResult,
        /// Pending changes committed during reconciliation.
        recorded: usize,
        push: Option<PushResult>,
    },
}

/// Ensures a tenant's mirror exists and matches its remote.
pub struct Synchronizer {
    vcs: Arc<dyn VcsAdapter>,
    resolver: Resolver,
    git: GitConfig,
}

impl Synchronizer {
    pub fn new(vcs: Arc<dyn VcsAdapter>, resolver: Resolver, git: GitConfig) -> Self {
        Self { vcs, resolver, git }
    }

    /// Remote origin of a tenant.
    pub fn remote_url(&self, tenant: &TenantId) -> String {
        self.git.remote_url(tenant.org(), tenant.repo())
    }

    /// Clone or update the tenant's mirror.
    ///
    /// `state` is the tenant's lock-protected state; holding it is what
    /// makes the check-then-act sequence safe.
    pub fn ensure_synced(
        &self,
        tenant: &TenantId,
        state: &mut TenantState,
    ) -> Result<SyncOutcome, MirrorError> {
        let root = self.resolver.tenant_root(tenant);

        let present = match fs::symlink_metadata(&root) {
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(source) => return Err(io_error(&root, source)),
        };

        if !present {
            self.clone_mirror(tenant, &root)?;
            *state = TenantState::default();
            return Ok(SyncOutcome::Cloned);
        }

        let pull = self.vcs.pull(&root).map_err(|source| match source {
            VcsError::Conflict(_) => MirrorError::Diverged {
                tenant: tenant.to_string(),
                source,
            },
            _ => MirrorError::PullFailed {
                tenant: tenant.to_string(),
                source,
            },
        })?;

        self.adopt_uncommitted(tenant, &root, state)?;
        let recorded = self.record_pending(tenant, &root, state)?;

        let ahead = self
            .vcs
            .unpushed_revisions(&root)
            .map_err(|source| propagation(tenant, source))?;

        if ahead == 0 {
            state.locally_ahead = false;
            if recorded == 0 {
                return Ok(SyncOutcome::Pulled(pull));
            }
            return Ok(SyncOutcome::Reconciled {
                pull,
                recorded,
                push: None,
            });
        }

        tracing::warn!(
            "{} is {} revision(s) ahead of its remote, pushing before serving",
            tenant,
            ahead
        );

        match self.vcs.push(&root) {
            Ok(push) => {
                state.locally_ahead = false;
                tracing::info!("reconciled {}: {}", tenant, push.message);
                Ok(SyncOutcome::Reconciled {
                    pull,
                    recorded,
                    push: Some(push),
                })
            }
            Err(source) => {
                state.locally_ahead = true;
                tracing::warn!("{} still ahead of its remote: {}", tenant, source);
                Err(MirrorError::PropagationFailed {
                    tenant: tenant.to_string(),
                    source,
                })
            }
        }
    }

    fn clone_mirror(&self, tenant: &TenantId, root: &Path) -> Result<(), MirrorError> {
        let org_dir = self.resolver.org_dir(tenant);
        fs::create_dir_all(&org_dir).map_err(|source| io_error(&org_dir, source))?;

        // Dropped on every path out of this function, taking any partial
        // clone with it.
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}.clone-", tenant.repo()))
            .tempdir_in(&org_dir)
            .map_err(|source| io_error(&org_dir, source))?;
        let dest = staging.path().join(tenant.repo());

        let url = self.remote_url(tenant);
        tracing::info!("cloning {} from {}", tenant, url);

        self.vcs
            .clone_repo(&url, &dest)
            .map_err(|source| MirrorError::CloneFailed {
                tenant: tenant.to_string(),
                source,
            })?;

        fs::rename(&dest, root).map_err(|source| io_error(root, source))?;
        Ok(())
    }

    /// Queue local changes no request accounts for: an edit made directly
    /// in the mirror, or a commit that failed before a restart.
    fn adopt_uncommitted(
        &self,
        tenant: &TenantId,
        root: &Path,
        state: &mut TenantState,
    ) -> Result<(), MirrorError> {
        let paths = self
            .vcs
            .uncommitted_paths(root)
            .map_err(|source| propagation(tenant, source))?;

        for path in paths {
            if is_scratch(&path) || state.unrecorded.iter().any(|p| p.path == path) {
                continue;
            }
            tracing::warn!("{} has an unrecorded change to {}", tenant, path);
            let message = format!("Record local change to {}", path);
            state.unrecorded.push(PendingCommit::new(path, message));
        }
        Ok(())
    }

    /// Commit queued changes, oldest first. Returns how many were recorded.
    fn record_pending(
        &self,
        tenant: &TenantId,
        root: &Path,
        state: &mut TenantState,
    ) -> Result<usize, MirrorError> {
        let mut recorded = 0;
        while let Some(pending) = state.unrecorded.first_mut() {
            match self.vcs.commit(root, &pending.path, &pending.message) {
                Ok(_) => {
                    state.unrecorded.remove(0);
                    recorded += 1;
                }
                Err(source) => {
                    pending.attempts += 1;
                    if source.is_retriable() && pending.attempts < MAX_COMMIT_ATTEMPTS {
                        return Err(propagation(tenant, source));
                    }
                    let pending = state.unrecorded.remove(0);
                    self.abandon(tenant, root, &pending.path, &source);
                    return Err(propagation(tenant, source));
                }
            }
        }
        Ok(recorded)
    }

    /// Give up on committing `path`: restore it to the last revision so the
    /// mirror matches its remote again.
    pub fn abandon(&self, tenant: &TenantId, root: &Path, path: &str, reason: &VcsError) {
        tracing::warn!("abandoning change to {}:{}: {}", tenant, path, reason);
        if let Err(e) = self.vcs.discard(root, path) {
            tracing::error!("failed to discard change to {}:{}: {}", tenant, path, e);
        }
    }
}

/// Temporary files of an interrupted write; never committed.
fn is_scratch(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.starts_with(mutation::SCRATCH_PREFIX)
}

fn propagation(tenant: &TenantId, source: VcsError) -> MirrorError {
    MirrorError::PropagationFailed {
        tenant: tenant.to_string(),
        source,
    }
}

fn io_error(path: &Path, source: io::Error) -> MirrorError {
    MirrorError::Io(WorkspaceError::IoError {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{Call, RecordingVcs};
    use tempfile::tempdir;

    fn setup(dir: &Path) -> (Arc<RecordingVcs>, Synchronizer, TenantId) {
        let vcs = Arc::new(RecordingVcs::new());
        let git = GitConfig {
            remote_url_template: "file:///remotes/{org}/{repo}.git".to_string(),
            ..GitConfig::default()
        };
        let sync = Synchronizer::new(vcs.clone(), Resolver::new(dir), git);
        (vcs, sync, TenantId::new("acme", "site").unwrap())
    }

    #[test]
    fn absent_mirror_is_cloned_from_tenant_url() {
        let dir = tempdir().unwrap();
        let (vcs, sync, tenant) = setup(dir.path());
        let mut state = TenantState::default();

        let outcome = sync.ensure_synced(&tenant, &mut state).unwrap();

        assert_eq!(outcome, SyncOutcome::Cloned);
        assert_eq!(
            vcs.calls(),
            vec![Call::Clone("file:///remotes/acme/site.git".to_string())]
        );
        assert!(dir.path().join("acme/site").is_dir());
    }

    #[test]
    fn present_mirror_is_pulled() {
        let dir = tempdir().unwrap();
        let (vcs, sync, tenant) = setup(dir.path());
        let mut state = TenantState::default();

        sync.ensure_synced(&tenant, &mut state).unwrap();
        let outcome = sync.ensure_synced(&tenant, &mut state).unwrap();

        assert!(matches!(outcome, SyncOutcome::Pulled(_)));
        assert_eq!(vcs.count(|c| matches!(c, Call::Clone(_))), 1);
        assert_eq!(vcs.count(|c| matches!(c, Call::Pull)), 1);
    }

    #[test]
    fn failed_clone_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let (vcs, sync, tenant) = setup(dir.path());
        let mut state = TenantState::default();
        vcs.fail_clone(true);

        let err = sync.ensure_synced(&tenant, &mut state).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyncFailure);
        assert!(!dir.path().join("acme/site").exists());
        assert_eq!(
            fs::read_dir(dir.path().join("acme")).unwrap().count(),
            0,
            "no clone staging directory may survive"
        );

        vcs.fail_clone(false);
        assert_eq!(
            sync.ensure_synced(&tenant, &mut state).unwrap(),
            SyncOutcome::Cloned
        );
        assert_eq!(vcs.count(|c| matches!(c, Call::Clone(_))), 2);
    }

    #[test]
    fn failed_pull_keeps_existing_mirror() {
        let dir = tempdir().unwrap();
        let (vcs, sync, tenant) = setup(dir.path());
        let mut state = TenantState::default();
        sync.ensure_synced(&tenant, &mut state).unwrap();
        fs::write(dir.path().join("acme/site/kept.txt"), "kept").unwrap();

        vcs.fail_pull(true);
        let err = sync.ensure_synced(&tenant, &mut state).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SyncFailure);
        assert_eq!(
            fs::read_to_string(dir.path().join("acme/site/kept.txt")).unwrap(),
            "kept"
        );
    }

    #[test]
    fn conflicting_pull_is_diverged() {
        let dir = tempdir().unwrap();
        let (vcs, sync, tenant) = setup(dir.path());
        let mut state = TenantState::default();
        sync.ensure_synced(&tenant, &mut state).unwrap();

        vcs.conflict_on_pull(true);
        let err = sync.ensure_synced(&tenant, &mut state).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Diverged);
    }

    #[test]
    fn unpushed_revisions_are_pushed_before_serving() {
        let dir = tempdir().unwrap();
        let (vcs, sync, tenant) = setup(dir.path());
        let mut state = TenantState::default();
        sync.ensure_synced(&tenant, &mut state).unwrap();

        vcs.set_ahead(2);
        state.locally_ahead = true;

        vcs.fail_push(true);
        let err = sync.ensure_synced(&tenant, &mut state).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PropagationFailure);
        assert!(state.locally_ahead);

        vcs.fail_push(false);
        let outcome = sync.ensure_synced(&tenant, &mut state).unwrap();
        assert!(matches!(
            outcome,
            SyncOutcome::Reconciled { push: Some(_), .. }
        ));
        assert!(!state.locally_ahead);
        assert_eq!(vcs.ahead(), 0);
    }

    #[test]
    fn pending_commits_are_recorded_then_pushed() {
        let dir = tempdir().unwrap();
        let (vcs, sync, tenant) = setup(dir.path());
        let mut state = TenantState::default();
        sync.ensure_synced(&tenant, &mut state).unwrap();

        state
            .unrecorded
            .push(PendingCommit::new("a.txt", "Update a.txt"));

        let outcome = sync.ensure_synced(&tenant, &mut state).unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Reconciled {
                pull: PullResult {
                    previous_head: Some("abc".to_string()),
                    head: Some("abc".to_string()),
                },
                recorded: 1,
                push: Some(PushResult {
                    remote_ref: "origin/main".to_string(),
                    message: "Pushed to origin/main".to_string(),
                }),
            }
        );
        assert!(state.unrecorded.is_empty());
        assert!(vcs
            .calls()
            .contains(&Call::Commit("a.txt".to_string(), "Update a.txt".to_string())));
    }

    #[test]
    fn uncommitted_changes_are_recorded() {
        let dir = tempdir().unwrap();
        let (vcs, sync, tenant) = setup(dir.path());
        let mut state = TenantState::default();
        sync.ensure_synced(&tenant, &mut state).unwrap();

        vcs.set_dirty(&["README.md", "docs/.repofs-x1y2z3"]);
        let outcome = sync.ensure_synced(&tenant, &mut state).unwrap();

        assert!(matches!(
            outcome,
            SyncOutcome::Reconciled {
                recorded: 1,
                push: Some(_),
                ..
            }
        ));
        assert_eq!(
            vcs.count(|c| matches!(c, Call::Commit(..))),
            1,
            "scratch files are never committed"
        );
        assert!(vcs.calls().contains(&Call::Commit(
            "README.md".to_string(),
            "Record local change to README.md".to_string()
        )));
    }

    #[test]
    fn queued_message_wins_over_generic_one() {
        let dir = tempdir().unwrap();
        let (vcs, sync, tenant) = setup(dir.path());
        let mut state = TenantState::default();
        sync.ensure_synced(&tenant, &mut state).unwrap();

        vcs.set_dirty(&["a.txt"]);
        state
            .unrecorded
            .push(PendingCommit::new("a.txt", "Update a.txt"));
        sync.ensure_synced(&tenant, &mut state).unwrap();

        assert_eq!(vcs.count(|c| matches!(c, Call::Commit(..))), 1);
        assert!(vcs
            .calls()
            .contains(&Call::Commit("a.txt".to_string(), "Update a.txt".to_string())));
    }

    #[test]
    fn failing_commit_is_abandoned_after_max_attempts() {
        let dir = tempdir().unwrap();
        let (vcs, sync, tenant) = setup(dir.path());
        let mut state = TenantState::default();
        sync.ensure_synced(&tenant, &mut state).unwrap();

        vcs.set_dirty(&["a.txt"]);
        vcs.fail_commit(true);
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let err = sync.ensure_synced(&tenant, &mut state).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::PropagationFailure, "attempt {}", attempt);
        }

        assert!(state.unrecorded.is_empty());
        assert!(vcs.calls().contains(&Call::Discard("a.txt".to_string())));
        assert!(matches!(
            sync.ensure_synced(&tenant, &mut state).unwrap(),
            SyncOutcome::Pulled(_)
        ));
    }

    #[test]
    fn staging_failure_is_abandoned_at_once() {
        let dir = tempdir().unwrap();
        let (vcs, sync, tenant) = setup(dir.path());
        let mut state = TenantState::default();
        sync.ensure_synced(&tenant, &mut state).unwrap();

        vcs.set_dirty(&["a.txt"]);
        vcs.fail_staging(true);
        let err = sync.ensure_synced(&tenant, &mut state).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PropagationFailure);
        assert!(state.unrecorded.is_empty());
        assert_eq!(vcs.count(|c| matches!(c, Call::Discard(_))), 1);

        assert!(matches!(
            sync.ensure_synced(&tenant, &mut state).unwrap(),
            SyncOutcome::Pulled(_)
        ));
    }
}
