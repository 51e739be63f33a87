//! # repofs-workspace
//!
//! Local side of a repofs tenant mirror: where files live and how they are
//! read and replaced. Nothing here talks to the remote; the mirror layer
//! synchronizes first and then calls into this crate.
//!
//! ## Key components
//!
//! - [`TenantId`] — validated (org, repo) pair naming one mirror.
//! - [`Resolver`] — maps a tenant-relative logical path to a physical path
//!   under the working directory, refusing anything that escapes the
//!   tenant root. Pure; no I/O.
//! - [`accessor`] — reads a resolved path as a file handle or a directory
//!   listing of [`DirEntry`] values.
//! - [`mutation`] — atomic whole-file replacement and single-file removal.

pub mod accessor;
pub mod error;
pub mod mutation;
pub mod resolver;
pub mod tenant;

pub use accessor::{Content, DirEntry, EntryKind, FileHandle};
pub use error::WorkspaceError;
pub use resolver::{ResolvedPath, Resolver};
pub use tenant::TenantId;
