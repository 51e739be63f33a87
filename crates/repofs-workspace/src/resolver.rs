// resolver.rs — Logical path → physical path mapping.
//
// Layout: `<workdir>/<org>/<repo>/<logical path>`. Resolution is purely
// lexical: segments are normalized and checked without touching the disk,
// so a rejected path never causes a filesystem or VCS operation.
// `ResolvedPath::verify_contained` adds the on-disk check (symlinks) for
// callers that are about to do I/O anyway.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::WorkspaceError;
use crate::tenant::TenantId;

/// Name of the VCS metadata directory; never addressable by callers.
const VCS_DIR: &str = ".git";

/// Maps tenant-scoped logical paths to locations under the working directory.
#[derive(Debug, Clone)]
pub struct Resolver {
    workdir: PathBuf,
}

/// A logical path that passed resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    tenant_root: PathBuf,
    relative: String,
    physical: PathBuf,
}

impl Resolver {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Directory holding all mirrors of one organization.
    pub fn org_dir(&self, tenant: &TenantId) -> PathBuf {
        self.workdir.join(tenant.org())
    }

    /// Root of a tenant's mirror.
    pub fn tenant_root(&self, tenant: &TenantId) -> PathBuf {
        self.org_dir(tenant).join(tenant.repo())
    }

    /// Resolve `logical` under the tenant's mirror.
    ///
    /// Empty and `.` segments are dropped, so `""` and `"./"` both name the
    /// tenant root. `..`, absolute paths, backslashes, NUL bytes and any
    /// `.git` segment are rejected.
    pub fn resolve(&self, tenant: &TenantId, logical: &str) -> Result<ResolvedPath, WorkspaceError> {
        let segments = normalize(logical)?;
        let tenant_root = self.tenant_root(tenant);

        let mut physical = tenant_root.clone();
        for segment in &segments {
            physical.push(segment);
        }

        if !physical.starts_with(&tenant_root) {
            return Err(WorkspaceError::PathTraversal {
                path: logical.to_string(),
            });
        }

        Ok(ResolvedPath {
            tenant_root,
            relative: segments.join("/"),
            physical,
        })
    }
}

/// Split a logical path into its meaningful segments.
fn normalize(logical: &str) -> Result<Vec<&str>, WorkspaceError> {
    let traversal = || WorkspaceError::PathTraversal {
        path: logical.to_string(),
    };

    if logical.starts_with('/') || logical.contains('\\') || logical.contains('\0') {
        return Err(traversal());
    }
    if has_drive_prefix(logical) {
        return Err(traversal());
    }

    let mut segments = Vec::new();
    for segment in logical.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(traversal()),
            s if s.eq_ignore_ascii_case(VCS_DIR) => return Err(traversal()),
            s => segments.push(s),
        }
    }
    Ok(segments)
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

impl ResolvedPath {
    /// Root directory of the tenant's mirror.
    pub fn tenant_root(&self) -> &Path {
        &self.tenant_root
    }

    /// Normalized `/`-joined path relative to the tenant root ("" for the root).
    pub fn relative(&self) -> &str {
        &self.relative
    }

    /// Absolute location on disk.
    pub fn physical(&self) -> &Path {
        &self.physical
    }

    pub fn is_root(&self) -> bool {
        self.relative.is_empty()
    }

    /// Check that the path, as it exists on disk, stays inside the tenant root.
    ///
    /// A mirror may contain symlinks; lexical resolution cannot see where
    /// they point. The deepest existing ancestor of the path is
    /// canonicalized and compared with the canonical tenant root. With
    /// `follow_leaf` false, the final component itself is not followed (used
    /// when removing a symlink rather than its target).
    pub fn verify_contained(&self, follow_leaf: bool) -> Result<(), WorkspaceError> {
        let root = canonicalize(&self.tenant_root)?;

        let mut probe: &Path = if follow_leaf || self.is_root() {
            &self.physical
        } else {
            self.physical.parent().unwrap_or(&self.tenant_root)
        };

        loop {
            match fs::symlink_metadata(probe) {
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::NotFound => match probe.parent() {
                    Some(parent) if probe != self.tenant_root.as_path() => probe = parent,
                    _ => break,
                },
                Err(source) => {
                    return Err(WorkspaceError::IoError {
                        path: probe.to_path_buf(),
                        source,
                    })
                }
            }
        }

        let real = match fs::canonicalize(probe) {
            Ok(real) => real,
            // Dangling symlink: whatever it names cannot be inside the root.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(WorkspaceError::PathTraversal {
                    path: self.relative.clone(),
                })
            }
            Err(source) => {
                return Err(WorkspaceError::IoError {
                    path: probe.to_path_buf(),
                    source,
                })
            }
        };

        if !real.starts_with(&root) {
            tracing::warn!(
                "rejecting '{}': resolves to {} outside {}",
                self.relative,
                real.display(),
                root.display()
            );
            return Err(WorkspaceError::PathTraversal {
                path: self.relative.clone(),
            });
        }
        Ok(())
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf, WorkspaceError> {
    fs::canonicalize(path).map_err(|source| WorkspaceError::IoError {
        path: path.to_path_buf(),
        source,
    })
}
