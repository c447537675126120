//! Error types for the neuron synchronization engine.
//!
//! Errors are grouped by the component that raises them: configuration
//! parsing, the Git Driver, the Sync/Export engines, export policy gating,
//! and interactive prompt abandonment. `ConfigError` and `GitError` use a
//! multi-line "Error / Cause / Fix" message shape for the failures a user
//! is most likely to hit directly; the others stay single-line.

use std::path::PathBuf;

/// Errors raised while loading or parsing a brain or consumer descriptor.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Error: Descriptor file not found at {path}\nCause: No file exists at that path\nFix: Create it, or run the appropriate init command for this repository role."
    )]
    NotFound { path: PathBuf },

    #[error(
        "Error: Failed to parse descriptor at {path}\nCause: {reason}\nFix: Check for unbalanced `[section]` headers and `key = value` lines."
    )]
    ParseFailed { path: PathBuf, reason: String },

    #[error("missing required section [{section}]")]
    MissingSection { section: String },

    #[error("missing required key '{key}' in section [{section}]")]
    MissingKey { section: String, key: String },

    #[error("key '{key}' in section [{section}] must not be empty")]
    EmptyValue { section: String, key: String },

    #[error("invalid value for '{key}' in section [{section}]: '{value}' ({reason})")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("malformed [MAP] entry '{key}' = '{value}': {reason}")]
    MalformedMapping {
        key: String,
        value: String,
        reason: String,
    },

    #[error("mapping '{key}' references unknown brain '{brain_id}'")]
    UnknownBrain { key: String, brain_id: String },
}

/// Errors raised by the Git Driver.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error(
        "Error: Failed to execute git {args}\nCause: {reason}\nFix: Confirm git is installed and on PATH."
    )]
    Execution { args: String, reason: String },

    #[error(
        "Error: git {args} exited with status {code}\nCause: {stderr}\nFix: Inspect the command output above and retry."
    )]
    NonZeroExit {
        args: String,
        code: i32,
        stderr: String,
    },

    #[error(
        "Error: git {args} timed out after {secs}s\nCause: The subprocess did not complete in time\nFix: Check network connectivity to the remote, or raise the timeout."
    )]
    Timeout { args: String, secs: u64 },

    #[error(
        "Error: git executable not found\nCause: No `git` binary is on PATH\nFix: Install git and ensure it is reachable from this shell."
    )]
    ExecutableMissing,

    #[error("Error: failed to clone {url}\nCause: {reason}\nFix: {hint}")]
    AuthenticationLikely {
        url: String,
        reason: String,
        hint: String,
    },
}

/// Errors raised while materializing or exporting a neuron.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("mapping references unknown brain '{0}'")]
    UnknownBrain(String),

    #[error("source path '{source}' not found in brain '{brain_id}'")]
    SourceNotFound { brain_id: String, source: String },

    #[error("failed to copy '{from}' to '{to}': {reason}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },

    #[error("failed to write '{path}': {reason}")]
    WriteFailed { path: PathBuf, reason: String },
}

/// Raised when an export is attempted but the consumer's policy disallows it.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("export to brain is disallowed by consumer policy (allow-push-to-brain = false)")]
    ExportDisallowed,
}

/// Raised when an interactive conflict prompt is declined or abandoned.
#[derive(Debug, thiserror::Error)]
pub enum UserAbort {
    #[error("user declined to resolve conflict for '{destination}'")]
    PromptDeclined { destination: String },
}
