// mutation.rs — Local file replacement and removal.
//
// Writes go to a temporary file in the target's directory and are renamed
// over the target, so a reader sees either the old bytes or the new bytes.
// Recording the change in the VCS is the mirror layer's job.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::error::WorkspaceError;
use crate::resolver::ResolvedPath;

/// File-name prefix of the temporary file a write goes through.
pub const SCRATCH_PREFIX: &str = ".repofs-";

/// Replace the file at `resolved` with everything `content` yields.
///
/// Parent directories are created as needed. Returns the number of bytes
/// written.
pub fn write_file<R: Read>(resolved: &ResolvedPath, mut content: R) -> Result<u64, WorkspaceError> {
    let target = resolved.physical();

    if resolved.is_root() || target.is_dir() {
        return Err(WorkspaceError::IsDirectory {
            path: resolved.relative().to_string(),
        });
    }
    resolved.verify_contained(true)?;

    let parent = target.parent().unwrap_or(resolved.tenant_root());
    fs::create_dir_all(parent).map_err(|source| WorkspaceError::IoError {
        path: parent.to_path_buf(),
        source,
    })?;

    let io_err = |source| WorkspaceError::IoError {
        path: target.to_path_buf(),
        source,
    };

    let mut staged = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempfile_in(parent)
        .map_err(io_err)?;
    let written = io::copy(&mut content, &mut staged).map_err(io_err)?;
    staged.flush().map_err(io_err)?;
    staged.as_file().sync_all().map_err(io_err)?;
    staged.persist(target).map_err(|e| io_err(e.error))?;

    tracing::debug!("wrote {} bytes to {}", written, target.display());
    Ok(written)
}

/// Remove the file at `resolved`.
///
/// Directories are never removed, empty or not. Parent directories left
/// empty by the removal are pruned up to the tenant root, since the VCS does
/// not track empty directories.
pub fn remove_file(resolved: &ResolvedPath) -> Result<(), WorkspaceError> {
    let target = resolved.physical();

    if resolved.is_root() {
        return Err(WorkspaceError::IsDirectory {
            path: String::new(),
        });
    }

    let metadata = match fs::symlink_metadata(target) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(WorkspaceError::NotFound {
                path: resolved.relative().to_string(),
            })
        }
        Err(source) => {
            return Err(WorkspaceError::IoError {
                path: target.to_path_buf(),
                source,
            })
        }
    };
    if metadata.is_dir() {
        return Err(WorkspaceError::IsDirectory {
            path: resolved.relative().to_string(),
        });
    }
    resolved.verify_contained(false)?;

    fs::remove_file(target).map_err(|source| WorkspaceError::IoError {
        path: target.to_path_buf(),
        source,
    })?;

    prune_empty_parents(target, resolved.tenant_root());
    Ok(())
}

fn prune_empty_parents(removed: &Path, root: &Path) {
    let mut dir = removed.parent();
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        // Fails on non-empty directories, which ends the walk.
        if fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}
