//! Session-branch auto-commit engine.
//!
//! On start the engine switches the workspace repository to a
//! `mob/session-<id>` branch. Change notifications arm a debounced
//! commit-and-push; stop makes a final commit and restores the branch that
//! was checked out originally. Commits are a rolling best-effort backup,
//! not transactional snapshots: a commit may capture a partially-written
//! file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::process::Command;

use crate::debounce::Debouncer;

/// Quiet period between the last change notification and the commit.
pub const COMMIT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum GitError {
    #[error("not a git repository: {0}")]
    NotARepository(String),

    #[error("git {args}: {output}")]
    Command { args: String, output: String },

    #[error("spawn git: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Run git with the given arguments in `dir`, capturing combined output.
pub async fn run_git(dir: &Path, args: &[&str]) -> Result<String, GitError> {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await?;

    let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&out.stderr));

    if out.status.success() {
        Ok(text)
    } else {
        Err(GitError::Command {
            args: args.join(" "),
            output: text.trim().to_string(),
        })
    }
}

struct CommitInner {
    root: PathBuf,
    branch: String,
    delay: Duration,
    original_branch: Mutex<Option<String>>,
    // Serializes commit_and_push independently of the debouncer, so a final
    // commit racing the last scheduled fire cannot corrupt the index.
    commit_lock: tokio::sync::Mutex<()>,
}

impl CommitInner {
    async fn commit_and_push(&self) -> Result<(), GitError> {
        let _serialized = self.commit_lock.lock().await;

        run_git(&self.root, &["add", "-A"]).await?;

        // Exit 0 means the index matches HEAD: nothing to commit.
        if run_git(&self.root, &["diff", "--cached", "--quiet"])
            .await
            .is_ok()
        {
            return Ok(());
        }

        let message = format!(
            "mob: auto-save at {}",
            chrono::Local::now().format("%H:%M:%S")
        );
        run_git(&self.root, &["commit", "-m", &message]).await?;
        tracing::info!(message = %message, "auto-committed");

        if let Err(err) = run_git(&self.root, &["push", "-u", "origin", &self.branch]).await {
            tracing::warn!(error = %err, "push failed (no remote?)");
        }

        Ok(())
    }
}

/// Auto-commit engine bound to one workspace and session.
pub struct AutoCommit {
    inner: Arc<CommitInner>,
    debouncer: Mutex<Option<Debouncer>>,
}

impl AutoCommit {
    /// Probe the workspace; fails when it is not a git repository, in which
    /// case the host runs without the safety net.
    pub async fn new(root: impl Into<PathBuf>, session_id: &str) -> Result<Self, GitError> {
        Self::with_delay(root, session_id, COMMIT_DELAY).await
    }

    /// Like [`AutoCommit::new`] with an explicit debounce delay.
    pub async fn with_delay(
        root: impl Into<PathBuf>,
        session_id: &str,
        delay: Duration,
    ) -> Result<Self, GitError> {
        let root = root.into();

        run_git(&root, &["rev-parse", "--git-dir"])
            .await
            .map_err(|err| GitError::NotARepository(err.to_string()))?;

        Ok(Self {
            inner: Arc::new(CommitInner {
                root,
                branch: format!("mob/session-{session_id}"),
                delay,
                original_branch: Mutex::new(None),
                commit_lock: tokio::sync::Mutex::new(()),
            }),
            debouncer: Mutex::new(None),
        })
    }

    pub fn branch(&self) -> &str {
        &self.inner.branch
    }

    /// Create the session branch and arm the debounced auto-commit.
    pub async fn start(&self) -> Result<(), GitError> {
        let out = run_git(&self.inner.root, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        let original = out.trim().to_string();

        run_git(&self.inner.root, &["checkout", "-b", &self.inner.branch]).await?;
        *self.inner.original_branch.lock() = Some(original.clone());

        tracing::info!(
            branch = %self.inner.branch,
            from = %original,
            "created session branch"
        );

        let inner = Arc::clone(&self.inner);
        let debouncer = Debouncer::new(self.inner.delay, move || {
            let inner = Arc::clone(&inner);
            async move {
                if let Err(err) = inner.commit_and_push().await {
                    tracing::warn!(error = %err, "auto-commit failed");
                }
            }
        });
        *self.debouncer.lock() = Some(debouncer);

        Ok(())
    }

    /// Arm (or re-arm) the debounced commit. No-op before start or after
    /// stop.
    pub fn notify_change(&self) {
        if let Some(debouncer) = &*self.debouncer.lock() {
            debouncer.trigger();
        }
    }

    /// Final commit, then restore the originally checked-out branch.
    pub async fn stop(&self) {
        if let Some(debouncer) = self.debouncer.lock().take() {
            debouncer.stop();
        }

        if let Err(err) = self.inner.commit_and_push().await {
            tracing::warn!(error = %err, "final commit failed");
        }

        let original = self.inner.original_branch.lock().take();
        if let Some(branch) = original {
            match run_git(&self.inner.root, &["checkout", &branch]).await {
                Ok(_) => tracing::info!(branch = %branch, "restored original branch"),
                Err(err) => {
                    tracing::error!(branch = %branch, error = %err, "failed to restore original branch");
                }
            }
        }
    }
}
