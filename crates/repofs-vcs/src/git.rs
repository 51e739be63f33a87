//! Git adapter: tenant mirrors as plain git working copies

use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::adapter::{CommitResult, PullResult, PushResult, Result, VcsAdapter, VcsError};
use crate::config::GitConfig;

/// Git adapter driving the `git` executable
///
/// Features:
/// - Clone into a fresh directory
/// - Fetch + rebase updates that keep unpushed local revisions
/// - Single-path commits authored with the configured identity
/// - Network steps bounded by `GitConfig::timeout_secs`
pub struct GitAdapter {
    config: GitConfig,
}

impl GitAdapter {
    /// Create a new GitAdapter
    pub fn new(config: GitConfig) -> Self {
        Self { config }
    }

    fn command(&self, dir: &Path, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-c")
            .arg(format!("user.name={}", self.config.author_name))
            .arg("-c")
            .arg(format!("user.email={}", self.config.author_email))
            .args(args)
            .current_dir(dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null());
        cmd
    }

    /// Run a git command, killing it if `timeout` elapses first.
    fn run(&self, dir: &Path, args: &[&str], timeout: Option<Duration>) -> Result<Output> {
        let mut cmd = self.command(dir, args);
        let Some(timeout) = timeout else {
            return Ok(cmd.output()?);
        };

        let mut child = cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).spawn()?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        match child.wait_timeout(timeout)? {
            Some(status) => Ok(Output {
                status,
                stdout: stdout.join().unwrap_or_default(),
                stderr: stderr.join().unwrap_or_default(),
            }),
            None => {
                // Helpers spawned by git may keep the pipes open, so the
                // drain threads are left to finish on their own.
                if let Err(e) = child.kill() {
                    tracing::warn!("failed to kill timed out git {}: {}", args.join(" "), e);
                }
                let _ = child.wait();
                Err(VcsError::Timeout {
                    command: args.join(" "),
                    secs: timeout.as_secs(),
                })
            }
        }
    }

    fn checked(&self, dir: &Path, args: &[&str], timeout: Option<Duration>) -> Result<String> {
        let output = self.run(dir, args, timeout)?;

        if !output.status.success() {
            return Err(failure(args, &output));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a local git command in the working directory
    fn git_cmd(&self, dir: &Path, args: &[&str]) -> Result<String> {
        self.checked(dir, args, None)
    }

    /// Current HEAD commit, or None on an unborn branch.
    pub fn head(&self, dir: &Path) -> Result<Option<String>> {
        let output = self.run(dir, &["rev-parse", "-q", "--verify", "HEAD"], None)?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }

    /// Stage `path` as it is on disk. Removal when it is gone, forced
    /// addition otherwise: the caller named the path, so ignore rules do
    /// not apply.
    fn stage(&self, dir: &Path, path: &str) -> Result<()> {
        let present = dir.join(path).symlink_metadata().is_ok();
        let args = if present {
            vec!["add", "-A", "-f", "--", path]
        } else {
            vec!["rm", "-q", "--cached", "--ignore-unmatch", "--", path]
        };

        match self.git_cmd(dir, &args) {
            Ok(_) => Ok(()),
            Err(VcsError::CommandFailed(msg)) => Err(VcsError::Staging(msg)),
            Err(e) => Err(e),
        }
    }

    fn upstream_exists(&self, dir: &Path) -> Result<bool> {
        let upstream = format!("refs/remotes/{}", self.config.upstream_ref());
        let output = self.run(dir, &["rev-parse", "-q", "--verify", &upstream], None)?;
        Ok(output.status.success())
    }
}

fn failure(args: &[&str], output: &Output) -> VcsError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    VcsError::CommandFailed(format!("git {} failed: {}", args.join(" "), stderr.trim()))
}

/// Paths named by `git status --porcelain -z` output.
fn parse_status(raw: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut fields = raw.split('\0').filter(|f| !f.is_empty());

    while let Some(entry) = fields.next() {
        if entry.len() < 4 {
            continue;
        }
        let (code, path) = entry.split_at(3);
        // Renames and copies are followed by their source path.
        if code.starts_with('R') || code.starts_with('C') {
            if let Some(source) = fields.next() {
                paths.push(source.to_string());
            }
        }
        paths.push(path.to_string());
    }

    paths.sort();
    paths.dedup();
    paths
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

impl VcsAdapter for GitAdapter {
    fn clone_repo(&self, remote_url: &str, dest: &Path) -> Result<()> {
        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        let dest_arg = dest.to_string_lossy();

        tracing::info!("GitAdapter: cloning {} into {}", remote_url, dest.display());

        self.checked(
            parent,
            &[
                "clone",
                "-q",
                "--origin",
                &self.config.remote,
                "--",
                remote_url,
                &dest_arg,
            ],
            Some(self.config.timeout()),
        )?;

        Ok(())
    }

    fn pull(&self, work_dir: &Path) -> Result<PullResult> {
        let previous_head = self.head(work_dir)?;
        let upstream = self.config.upstream_ref();

        self.checked(
            work_dir,
            &["fetch", "-q", &self.config.remote],
            Some(self.config.timeout()),
        )?;

        if !self.upstream_exists(work_dir)? {
            // Empty remote: nothing to integrate yet.
            tracing::debug!("GitAdapter: {} has no {}", work_dir.display(), upstream);
            return Ok(PullResult {
                head: previous_head.clone(),
                previous_head,
            });
        }

        if previous_head.is_none() {
            self.git_cmd(
                work_dir,
                &["checkout", "-q", "-B", &self.config.branch, &upstream],
            )?;
        } else {
            let rebase = self.run(
                work_dir,
                &["rebase", "-q", "--autostash", &upstream],
                None,
            )?;
            if !rebase.status.success() {
                let stderr = String::from_utf8_lossy(&rebase.stderr).trim().to_string();
                if let Err(e) = self.git_cmd(work_dir, &["rebase", "--abort"]) {
                    tracing::warn!(
                        "GitAdapter: rebase --abort in {} failed: {}",
                        work_dir.display(),
                        e
                    );
                }
                return Err(VcsError::Conflict(format!(
                    "rebase onto {} failed: {}",
                    upstream, stderr
                )));
            }
        }

        let head = self.head(work_dir)?;
        tracing::debug!(
            "GitAdapter: pulled {} ({:?} -> {:?})",
            work_dir.display(),
            previous_head,
            head
        );

        Ok(PullResult {
            previous_head,
            head,
        })
    }

    fn unpushed_revisions(&self, work_dir: &Path) -> Result<usize> {
        if self.head(work_dir)?.is_none() {
            return Ok(0);
        }

        let range = if self.upstream_exists(work_dir)? {
            format!("{}..HEAD", self.config.upstream_ref())
        } else {
            "HEAD".to_string()
        };

        let count = self.git_cmd(work_dir, &["rev-list", "--count", &range])?;
        count.parse::<usize>().map_err(|e| {
            VcsError::CommandFailed(format!("unexpected rev-list output '{}': {}", count, e))
        })
    }

    fn uncommitted_paths(&self, work_dir: &Path) -> Result<Vec<String>> {
        let args = ["status", "--porcelain", "-z", "--untracked-files=all"];
        let output = self.run(work_dir, &args, None)?;
        if !output.status.success() {
            return Err(failure(&args, &output));
        }
        Ok(parse_status(&String::from_utf8_lossy(&output.stdout)))
    }

    fn commit(&self, work_dir: &Path, path: &str, message: &str) -> Result<Option<CommitResult>> {
        self.stage(work_dir, path)?;

        let staged = self.git_cmd(work_dir, &["diff", "--cached", "--name-only"])?;
        if staged.is_empty() {
            tracing::debug!("GitAdapter: nothing to commit for {}", path);
            return Ok(None);
        }

        self.git_cmd(work_dir, &["commit", "-q", "-m", message])?;

        let commit_id = self.git_cmd(work_dir, &["rev-parse", "HEAD"])?;
        let short = &commit_id[..commit_id.len().min(8)];

        tracing::info!("GitAdapter: committed {} as {}", path, short);

        Ok(Some(CommitResult {
            message: format!("Committed as {}", short),
            commit_id,
        }))
    }

    fn discard(&self, work_dir: &Path, path: &str) -> Result<()> {
        let in_head = format!("HEAD:{}", path);
        let tracked = self
            .run(work_dir, &["cat-file", "-e", &in_head], None)?
            .status
            .success();

        if tracked {
            self.git_cmd(work_dir, &["checkout", "-q", "HEAD", "--", path])?;
        } else {
            self.git_cmd(
                work_dir,
                &["rm", "-q", "--cached", "--ignore-unmatch", "--", path],
            )?;
            match fs::remove_file(work_dir.join(path)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!("GitAdapter: discarded local change to {}", path);
        Ok(())
    }

    fn push(&self, work_dir: &Path) -> Result<PushResult> {
        let upstream = self.config.upstream_ref();
        let refspec = format!("HEAD:refs/heads/{}", self.config.branch);

        tracing::info!("GitAdapter: pushing {} to {}", work_dir.display(), upstream);

        self.checked(
            work_dir,
            &["push", "-q", &self.config.remote, &refspec],
            Some(self.config.timeout()),
        )?;

        Ok(PushResult {
            message: format!("Pushed to {}", upstream),
            remote_ref: upstream,
        })
    }

    fn name(&self) -> &str {
        "git"
    }
}
