// service.rs — Read, write and delete against tenant mirrors.
//
// Order of every operation:
//   1. validate (org, repo) and resolve the logical path (no I/O)
//   2. take the tenant lock
//   3. synchronize (clone or pull, then reconcile)
//   4. read, or mutate and propagate (commit + push)
// The lock is released when the guard drops, on every path out.

use std::io::Read;
use std::sync::{Arc, Mutex};

use repofs_vcs::{CommitResult, GitAdapter, PushResult, VcsAdapter};
use repofs_workspace::{accessor, mutation, Content, ResolvedPath, Resolver, TenantId};

use crate::config::MirrorConfig;
use crate::error::MirrorError;
use crate::sync::{SyncOutcome, Synchronizer};
use crate::tenants::{lock, PendingCommit, TenantLocks, TenantState};

type Slot = Arc<Mutex<TenantState>>;

/// Result of a write or delete.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    /// Normalized tenant-relative path that changed.
    pub path: String,

    /// None when the change left the tree identical to the last revision.
    pub commit: Option<CommitResult>,

    pub push: Option<PushResult>,
}

/// Entry point for tenant file operations.
pub struct MirrorService {
    resolver: Resolver,
    vcs: Arc<dyn VcsAdapter>,
    sync: Synchronizer,
    locks: TenantLocks,
}

impl MirrorService {
    /// Service backed by the git CLI.
    pub fn new(config: &MirrorConfig) -> Self {
        let vcs: Arc<dyn VcsAdapter> = Arc::new(GitAdapter::new(config.git.clone()));
        Self::with_adapter(config, vcs)
    }

    /// Service backed by any VCS adapter.
    pub fn with_adapter(config: &MirrorConfig, vcs: Arc<dyn VcsAdapter>) -> Self {
        let resolver = Resolver::new(&config.workdir);
        Self {
            sync: Synchronizer::new(vcs.clone(), resolver.clone(), config.git.clone()),
            resolver,
            vcs,
            locks: TenantLocks::new(),
        }
    }

    pub fn locks(&self) -> &TenantLocks {
        &self.locks
    }

    fn target(&self, org: &str, repo: &str, path: &str) -> Result<(TenantId, ResolvedPath), MirrorError> {
        let tenant = TenantId::new(org, repo)?;
        let resolved = self.resolver.resolve(&tenant, path)?;
        Ok((tenant, resolved))
    }

    /// Clone or update a tenant's mirror without touching any path.
    pub fn ensure_synced(&self, org: &str, repo: &str) -> Result<SyncOutcome, MirrorError> {
        let tenant = TenantId::new(org, repo)?;
        let slot = self.locks.slot(&tenant);
        let mut state = lock(&slot);
        self.synced(&tenant, &slot, &mut state)
    }

    /// Synchronize under the tenant's lock. A tenant left without a mirror
    /// and with nothing to reconcile gives its lock slot back, so requests
    /// for remotes that do not exist leave no trace.
    fn synced(
        &self,
        tenant: &TenantId,
        slot: &Slot,
        state: &mut TenantState,
    ) -> Result<SyncOutcome, MirrorError> {
        let result = self.sync.ensure_synced(tenant, state);
        if result.is_err()
            && !state.needs_reconcile()
            && !self.resolver.tenant_root(tenant).exists()
        {
            self.locks.release(tenant, slot);
        }
        result
    }

    /// Read a file or list a directory.
    ///
    /// The returned file handle stays valid after the tenant lock is
    /// released: later writes replace the file by rename, so the handle
    /// keeps seeing the bytes it opened.
    pub fn read(&self, org: &str, repo: &str, path: &str) -> Result<Content, MirrorError> {
        let (tenant, resolved) = self.target(org, repo, path)?;
        let slot = self.locks.slot(&tenant);
        let mut state = lock(&slot);

        self.synced(&tenant, &slot, &mut state)?;
        tracing::debug!("read {}:{}", tenant, resolved.relative());

        Ok(accessor::read(&resolved)?)
    }

    /// Replace a file's content and propagate the change to the remote.
    pub fn write<R: Read>(
        &self,
        org: &str,
        repo: &str,
        path: &str,
        content: R,
    ) -> Result<MutationOutcome, MirrorError> {
        let (tenant, resolved) = self.target(org, repo, path)?;
        let slot = self.locks.slot(&tenant);
        let mut state = lock(&slot);

        self.synced(&tenant, &slot, &mut state)?;

        let written = mutation::write_file(&resolved, content)?;
        tracing::info!("wrote {} bytes to {}:{}", written, tenant, resolved.relative());

        let message = format!("Update {}", resolved.relative());
        self.propagate(&tenant, &resolved, message, &mut state)
    }

    /// Delete a file and propagate the removal to the remote.
    ///
    /// `body` is opaque request metadata; when it is non-empty UTF-8 it
    /// becomes the commit message.
    pub fn delete(
        &self,
        org: &str,
        repo: &str,
        path: &str,
        body: &[u8],
    ) -> Result<MutationOutcome, MirrorError> {
        let (tenant, resolved) = self.target(org, repo, path)?;
        let slot = self.locks.slot(&tenant);
        let mut state = lock(&slot);

        self.synced(&tenant, &slot, &mut state)?;

        mutation::remove_file(&resolved)?;
        tracing::info!("deleted {}:{}", tenant, resolved.relative());

        let message = delete_message(resolved.relative(), body);
        self.propagate(&tenant, &resolved, message, &mut state)
    }

    /// Commit and push one changed path. On failure the tenant state
    /// records what is left to do so the next synchronize finishes it.
    fn propagate(
        &self,
        tenant: &TenantId,
        resolved: &ResolvedPath,
        message: String,
        state: &mut TenantState,
    ) -> Result<MutationOutcome, MirrorError> {
        let root = resolved.tenant_root();
        let path = resolved.relative().to_string();

        let commit = match self.vcs.commit(root, &path, &message) {
            Ok(commit) => commit,
            Err(source) => {
                if source.is_retriable() {
                    tracing::warn!("commit of {}:{} failed: {}", tenant, path, source);
                    let mut pending = PendingCommit::new(path, message);
                    pending.attempts = 1;
                    state.unrecorded.push(pending);
                } else {
                    self.sync.abandon(tenant, root, &path, &source);
                }
                return Err(MirrorError::PropagationFailed {
                    tenant: tenant.to_string(),
                    source,
                });
            }
        };

        let Some(commit) = commit else {
            tracing::debug!("{}:{} unchanged, nothing to propagate", tenant, path);
            return Ok(MutationOutcome {
                path,
                commit: None,
                push: None,
            });
        };

        match self.vcs.push(root) {
            Ok(push) => {
                tracing::info!("{}:{} {}, {}", tenant, path, commit.message, push.message);
                Ok(MutationOutcome {
                    path,
                    commit: Some(commit),
                    push: Some(push),
                })
            }
            Err(source) => {
                state.locally_ahead = true;
                tracing::warn!(
                    "push of {}:{} failed, mirror is ahead of its remote: {}",
                    tenant,
                    path,
                    source
                );
                Err(MirrorError::PropagationFailed {
                    tenant: tenant.to_string(),
                    source,
                })
            }
        }
    }
}

/// Commit message for a delete request.
pub fn delete_message(path: &str, body: &[u8]) -> String {
    match std::str::from_utf8(body).map(str::trim) {
        Ok(message) if !message.is_empty() => message.to_string(),
        _ => format!("Delete {}", path),
    }
}
