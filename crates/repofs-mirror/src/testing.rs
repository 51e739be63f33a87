// testing.rs — In-memory VcsAdapter that records every call.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use repofs_vcs::{CommitResult, PullResult, PushResult, Result, VcsAdapter, VcsError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Clone(String),
    Pull,
    Commit(String, String),
    Discard(String),
    Push,
}

/// Stands in for git. Clones create the directory (plus a `.git` dir and
/// any seeded files); commits and pushes only move a counter. Uncommitted
/// paths are whatever the test declares with `set_dirty`.
#[derive(Default)]
pub struct RecordingVcs {
    calls: Mutex<Vec<Call>>,
    seed: Vec<(String, Vec<u8>)>,
    ahead: AtomicUsize,
    dirty: Mutex<Vec<String>>,
    fail_clone: AtomicBool,
    fail_pull: AtomicBool,
    conflict_on_pull: AtomicBool,
    fail_staging: AtomicBool,
    fail_commit: AtomicBool,
    fail_push: AtomicBool,
}

impl RecordingVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files every clone starts with.
    pub fn with_seed(mut self, path: &str, content: &[u8]) -> Self {
        self.seed.push((path.to_string(), content.to_vec()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn ahead(&self) -> usize {
        self.ahead.load(Ordering::SeqCst)
    }

    pub fn set_ahead(&self, n: usize) {
        self.ahead.store(n, Ordering::SeqCst);
    }

    pub fn set_dirty(&self, paths: &[&str]) {
        *self.dirty.lock().unwrap() = paths.iter().map(|p| p.to_string()).collect();
    }

    pub fn dirty(&self) -> Vec<String> {
        self.dirty.lock().unwrap().clone()
    }

    pub fn fail_clone(&self, fail: bool) {
        self.fail_clone.store(fail, Ordering::SeqCst);
    }

    pub fn fail_pull(&self, fail: bool) {
        self.fail_pull.store(fail, Ordering::SeqCst);
    }

    pub fn conflict_on_pull(&self, conflict: bool) {
        self.conflict_on_pull.store(conflict, Ordering::SeqCst);
    }

    pub fn fail_staging(&self, fail: bool) {
        self.fail_staging.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl VcsAdapter for RecordingVcs {
    fn clone_repo(&self, remote_url: &str, dest: &Path) -> Result<()> {
        self.record(Call::Clone(remote_url.to_string()));
        fs::create_dir_all(dest.join(".git"))?;
        if self.fail_clone.load(Ordering::SeqCst) {
            return Err(VcsError::CommandFailed("remote unreachable".to_string()));
        }
        for (path, content) in &self.seed {
            let target = dest.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, content)?;
        }
        Ok(())
    }

    fn pull(&self, _work_dir: &Path) -> Result<PullResult> {
        self.record(Call::Pull);
        if self.conflict_on_pull.load(Ordering::SeqCst) {
            return Err(VcsError::Conflict("both modified README.md".to_string()));
        }
        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(VcsError::CommandFailed("remote unreachable".to_string()));
        }
        Ok(PullResult {
            previous_head: Some("abc".to_string()),
            head: Some("abc".to_string()),
        })
    }

    fn unpushed_revisions(&self, _work_dir: &Path) -> Result<usize> {
        Ok(self.ahead())
    }

    fn uncommitted_paths(&self, _work_dir: &Path) -> Result<Vec<String>> {
        Ok(self.dirty())
    }

    fn commit(&self, _work_dir: &Path, path: &str, message: &str) -> Result<Option<CommitResult>> {
        self.record(Call::Commit(path.to_string(), message.to_string()));
        if self.fail_staging.load(Ordering::SeqCst) {
            return Err(VcsError::Staging(format!("cannot add {}", path)));
        }
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(VcsError::CommandFailed("index.lock exists".to_string()));
        }
        self.dirty.lock().unwrap().retain(|p| p != path);
        let n = self.ahead.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(CommitResult {
            commit_id: format!("{:040}", n),
            message: format!("Committed as {:08}", n),
        }))
    }

    fn discard(&self, _work_dir: &Path, path: &str) -> Result<()> {
        self.record(Call::Discard(path.to_string()));
        self.dirty.lock().unwrap().retain(|p| p != path);
        Ok(())
    }

    fn push(&self, _work_dir: &Path) -> Result<PushResult> {
        self.record(Call::Push);
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(VcsError::CommandFailed("rejected".to_string()));
        }
        self.ahead.store(0, Ordering::SeqCst);
        Ok(PushResult {
            remote_ref: "origin/main".to_string(),
            message: "Pushed to origin/main".to_string(),
        })
    }

    fn name(&self) -> &str {
        "recording"
    }
}
