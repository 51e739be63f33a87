//! Version-control adapters for repofs
//!
//! Every tenant mirror is a working copy of a remote origin. This crate
//! provides the `VcsAdapter` trait that the mirror layer drives (clone, pull,
//! commit, push) and the `GitAdapter` implementation, which shells out to the
//! `git` executable rather than reimplementing it.

pub mod adapter;
pub mod config;
pub mod git;

pub use adapter::{CommitResult, PullResult, PushResult, Result, VcsAdapter, VcsError};
pub use config::GitConfig;
pub use git::GitAdapter;
