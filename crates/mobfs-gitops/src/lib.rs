//! Version-control safety net for mobfs hosts.
//!
//! Collapses bursts of filesystem change notifications into debounced
//! commits on a dedicated `mob/session-<id>` branch, pushed best-effort to
//! `origin`. Git is driven as an external command-line tool.

pub mod debounce;
pub mod gitops;

pub use debounce::Debouncer;
pub use gitops::{run_git, AutoCommit, GitError, COMMIT_DELAY};
