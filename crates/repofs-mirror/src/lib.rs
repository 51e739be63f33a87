//! # repofs-mirror
//!
//! Synchronization-and-access layer for repofs.
//!
//! Every operation on a tenant runs under that tenant's lock and starts with
//! a synchronize step: clone when no local mirror exists, pull otherwise,
//! then finish any propagation an earlier request left undone. Only then is
//! the path read, written or deleted; writes and deletes are committed and
//! pushed before the call returns.
//!
//! ## Key components
//!
//! - [`MirrorService`] — the read/write/delete entry points.
//! - [`Synchronizer`] — the clone-or-pull policy and reconciliation.
//! - [`TenantLocks`] — per-(org, repo) mutual exclusion holding each
//!   tenant's reconciliation state.
//! - [`MirrorError`] / [`ErrorKind`] — tagged failures for the boundary.

pub mod config;
pub mod error;
pub mod service;
pub mod sync;
pub mod tenants;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, MirrorConfig, SettingsFile};
pub use error::{ErrorKind, MirrorError};
pub use service::{MirrorService, MutationOutcome};
pub use sync::{SyncOutcome, Synchronizer};
pub use tenants::{PendingCommit, TenantLocks, TenantState};
