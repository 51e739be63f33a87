// accessor.rs — Read side of a mirror: file handles and directory listings.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::WorkspaceError;
use crate::resolver::ResolvedPath;

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// One immediate child of a listed directory.
///
/// Serializes as `{"name": "...", "type": "file" | "dir"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

/// An open file inside a mirror. Dropping it closes the file.
#[derive(Debug)]
pub struct FileHandle {
    file: File,
    len: u64,
}

impl FileHandle {
    /// Size in bytes when the file was opened.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn into_file(self) -> File {
        self.file
    }
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

/// What a read produced.
#[derive(Debug)]
pub enum Content {
    File(FileHandle),
    Listing(Vec<DirEntry>),
}

/// Read a resolved path: open it if it is a file, list it if it is a directory.
pub fn read(resolved: &ResolvedPath) -> Result<Content, WorkspaceError> {
    let physical = resolved.physical();

    let metadata = match fs::metadata(physical) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(WorkspaceError::NotFound {
                path: resolved.relative().to_string(),
            })
        }
        Err(source) => {
            return Err(WorkspaceError::IoError {
                path: physical.to_path_buf(),
                source,
            })
        }
    };

    resolved.verify_contained(true)?;

    if metadata.is_dir() {
        return Ok(Content::Listing(list_dir(physical)?));
    }

    let file = File::open(physical).map_err(|source| WorkspaceError::IoError {
        path: physical.to_path_buf(),
        source,
    })?;

    Ok(Content::File(FileHandle {
        file,
        len: metadata.len(),
    }))
}

/// Immediate children of `dir`, in the order the filesystem returns them.
///
/// The VCS metadata directory is omitted. Entries are classified without
/// following symlinks.
pub fn list_dir(dir: &Path) -> Result<Vec<DirEntry>, WorkspaceError> {
    let io_err = |source| WorkspaceError::IoError {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name == ".git" {
            continue;
        }

        let kind = if entry.file_type().map_err(io_err)?.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };
        entries.push(DirEntry { name, kind });
    }

    Ok(entries)
}
