//! Git Driver: a thin wrapper over the `git` executable.
//!
//! Every other component treats Git as an external collaborator and speaks
//! to it only through the [`GitDriver`] trait, so that tests can substitute
//! a [`testing::FakeGitDriver`] that returns canned output and records the
//! argument vectors it was called with, instead of shelling out for real.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::GitError;

/// Default timeout applied to every git subprocess invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Hosts for which an auth-failure hint is worth adding to a clone error.
const POPULAR_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

/// Stderr substrings that heuristically indicate an authentication failure.
const AUTH_HINTS: &[&str] = &[
    "authentication",
    "permission denied",
    "403",
    "could not read",
    "ssh key",
    "publickey",
];

/// The result of [`GitDriver::merge_file`]: the merged content, and whether
/// conflict markers were left in it.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub content: Vec<u8>,
    pub had_conflicts: bool,
}

/// Abstraction over the `git` executable, so engines never shell out directly.
pub trait GitDriver: Send + Sync {
    /// Run `git <args>` in `cwd`, returning stdout with trailing whitespace trimmed.
    fn run(&self, args: &[&str], cwd: &Path, timeout: Duration) -> Result<String, GitError>;

    /// True iff `path` is inside a git working tree or a bare repository.
    fn is_repo(&self, path: &Path) -> bool;

    /// True iff `path` is a bare repository; false for non-repo paths.
    fn is_bare(&self, path: &Path) -> bool;

    /// Absolute repository root for `path`.
    fn toplevel(&self, path: &Path) -> Result<PathBuf, GitError>;

    /// True iff `path` is tracked by the repository at `cwd`.
    fn is_tracked(&self, path: &Path, cwd: &Path) -> bool;

    /// True iff `path` has pending modifications relative to HEAD.
    fn is_modified(&self, path: &Path, cwd: &Path) -> bool;

    /// Hex blob hash of `path` at HEAD.
    fn blob_hash_at_head(&self, path: &Path, cwd: &Path) -> Result<String, GitError>;

    /// Repo-relative paths with non-clean porcelain status, unquoted.
    fn changed_files(&self, cwd: &Path) -> Result<Vec<String>, GitError>;

    /// Clone `url` into `target`, passing through any extra `args`.
    fn clone_repo(&self, url: &str, target: &Path, args: &[&str]) -> Result<(), GitError>;

    /// Clone `url` (on `branch`, if given) into a fresh temp directory.
    ///
    /// Shallow (`--depth=1 --quiet`) unless `url` is a `file://` URL or an
    /// absolute path to an existing directory, in which case it clones in
    /// full (`--quiet`).
    fn temp_clone(&self, url: &str, branch: Option<&str>) -> Result<TempClone, GitError>;

    /// Three-way merge of `local`/`base`/`brain` via `git merge-file`.
    fn merge_file(&self, local: &[u8], base: &[u8], brain: &[u8])
    -> Result<MergeOutcome, GitError>;
}

/// A brain clone that lives in a temp directory removed on drop.
///
/// Every exit path out of a `sync_one` or single-brain export call —
/// success, error, or early return — drops this handle, so no clone
/// created for that call outlives it (P6).
pub struct TempClone {
    dir: tempfile::TempDir,
}

impl TempClone {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Production [`GitDriver`] backed by the real `git` executable.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealGitDriver;

impl RealGitDriver {
    pub fn new() -> Self {
        Self
    }

    fn run_with_timeout(
        &self,
        args: &[&str],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<std::process::Output, GitError> {
        debug!(?args, cwd = %cwd.display(), "running git");

        let mut child = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GitError::ExecutableMissing
                } else {
                    GitError::Execution {
                        args: args.join(" "),
                        reason: e.to_string(),
                    }
                }
            })?;

        // Drain stdout/stderr on their own threads as the child produces
        // them. Polling `try_wait` without reading the pipes would let a
        // chatty subprocess (a verbose clone, a large diff) fill the pipe
        // buffer and stall until the timeout killed it for no real reason.
        let mut stdout = child.stdout.take().expect("stdout was piped");
        let mut stderr = child.stderr.take().expect("stderr was piped");
        let stdout_reader = std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = std::io::Read::read_to_end(&mut stdout, &mut buf);
            buf
        });
        let stderr_reader = std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = std::io::Read::read_to_end(&mut stderr, &mut buf);
            buf
        });

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if start.elapsed() >= timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(GitError::Timeout {
                            args: args.join(" "),
                            secs: timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    return Err(GitError::Execution {
                        args: args.join(" "),
                        reason: e.to_string(),
                    });
                }
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        Ok(std::process::Output {
            status,
            stdout,
            stderr,
        })
    }
}

impl GitDriver for RealGitDriver {
    fn run(&self, args: &[&str], cwd: &Path, timeout: Duration) -> Result<String, GitError> {
        let output = self.run_with_timeout(args, cwd, timeout)?;
        if !output.status.success() {
            return Err(GitError::NonZeroExit {
                args: args.join(" "),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.trim_end().to_string())
    }

    fn is_repo(&self, path: &Path) -> bool {
        self.run(&["rev-parse", "--git-dir"], path, DEFAULT_TIMEOUT)
            .is_ok()
    }

    fn is_bare(&self, path: &Path) -> bool {
        match self.run_with_timeout(
            &["rev-parse", "--is-bare-repository"],
            path,
            DEFAULT_TIMEOUT,
        ) {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim() == "true"
            }
            Ok(_) | Err(_) => false,
        }
    }

    fn toplevel(&self, path: &Path) -> Result<PathBuf, GitError> {
        let out = self.run(&["rev-parse", "--show-toplevel"], path, DEFAULT_TIMEOUT)?;
        Ok(PathBuf::from(out))
    }

    fn is_tracked(&self, path: &Path, cwd: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.run(
            &["ls-files", "--error-unmatch", path_str.as_ref()],
            cwd,
            DEFAULT_TIMEOUT,
        )
        .is_ok()
    }

    fn is_modified(&self, path: &Path, cwd: &Path) -> bool {
        let path_str = path.to_string_lossy();
        match self.run(
            &["status", "--porcelain", "--", path_str.as_ref()],
            cwd,
            DEFAULT_TIMEOUT,
        ) {
            Ok(out) => !out.trim().is_empty(),
            Err(_) => false,
        }
    }

    fn blob_hash_at_head(&self, path: &Path, cwd: &Path) -> Result<String, GitError> {
        let path_str = path.to_string_lossy();
        self.run(
            &["rev-parse", &format!("HEAD:{path_str}")],
            cwd,
            DEFAULT_TIMEOUT,
        )
    }

    fn changed_files(&self, cwd: &Path) -> Result<Vec<String>, GitError> {
        let out = self.run(&["status", "--porcelain"], cwd, DEFAULT_TIMEOUT)?;
        Ok(out
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| {
                // Porcelain status lines are "XY <path>" or "XY <old> -> <new>"
                // for renames; the new path is what we report as changed.
                let rest = &line[3.min(line.len())..];
                let path = rest.rsplit(" -> ").next().unwrap_or(rest);
                unquote_porcelain_path(path.trim())
            })
            .collect())
    }

    fn clone_repo(&self, url: &str, target: &Path, args: &[&str]) -> Result<(), GitError> {
        let target_str = target.to_string_lossy();
        let mut full_args: Vec<&str> = vec!["clone"];
        full_args.extend_from_slice(args);
        full_args.push(url);
        full_args.push(target_str.as_ref());
        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        self.run(&full_args, parent, DEFAULT_TIMEOUT).map(|_| ())
    }

    fn temp_clone(&self, url: &str, branch: Option<&str>) -> Result<TempClone, GitError> {
        let dir = tempfile::Builder::new()
            .prefix("git-brain-")
            .tempdir()
            .map_err(|e| GitError::Execution {
                args: "clone".to_string(),
                reason: format!("failed to create temp directory: {e}"),
            })?;

        let is_local = url.starts_with("file://")
            || (Path::new(url).is_absolute() && Path::new(url).is_dir());

        let mut args: Vec<&str> = if is_local {
            vec!["--quiet"]
        } else {
            vec!["--depth=1", "--quiet"]
        };
        if let Some(branch) = branch {
            args.push("--branch");
            args.push(branch);
        }

        match self.clone_repo(url, dir.path(), &args) {
            Ok(()) => Ok(TempClone { dir }),
            Err(GitError::NonZeroExit { stderr, .. }) => {
                let stderr_lower = stderr.to_lowercase();
                let looks_popular = POPULAR_HOSTS.iter().any(|h| url.contains(h));
                let looks_like_auth = AUTH_HINTS.iter().any(|h| stderr_lower.contains(h));
                if looks_popular && looks_like_auth {
                    Err(GitError::AuthenticationLikely {
                        url: url.to_string(),
                        reason: stderr,
                        hint: "Check your credentials (SSH key or token) for this host and retry."
                            .to_string(),
                    })
                } else {
                    Err(GitError::NonZeroExit {
                        args: "clone".to_string(),
                        code: 1,
                        stderr,
                    })
                }
            }
            Err(other) => Err(other),
        }
    }

    fn merge_file(
        &self,
        local: &[u8],
        base: &[u8],
        brain: &[u8],
    ) -> Result<MergeOutcome, GitError> {
        let dir = tempfile::tempdir().map_err(|e| GitError::Execution {
            args: "merge-file".to_string(),
            reason: e.to_string(),
        })?;
        let local_path = dir.path().join("local");
        let base_path = dir.path().join("base");
        let brain_path = dir.path().join("brain");
        std::fs::write(&local_path, local).map_err(|e| GitError::Execution {
            args: "merge-file".to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(&base_path, base).map_err(|e| GitError::Execution {
            args: "merge-file".to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(&brain_path, brain).map_err(|e| GitError::Execution {
            args: "merge-file".to_string(),
            reason: e.to_string(),
        })?;

        let local_str = local_path.to_string_lossy().into_owned();
        let base_str = base_path.to_string_lossy().into_owned();
        let brain_str = brain_path.to_string_lossy().into_owned();

        let output = Command::new("git")
            .args(["merge-file", "-p", &local_str, &base_str, &brain_str])
            .current_dir(dir.path())
            .output()
            .map_err(|e| GitError::Execution {
                args: "merge-file".to_string(),
                reason: e.to_string(),
            })?;

        // git merge-file exits 0 on clean merge, >0 = number of conflicts, <0 on error.
        match output.status.code() {
            Some(code) if code >= 0 => Ok(MergeOutcome {
                content: output.stdout,
                had_conflicts: code > 0,
            }),
            _ => Err(GitError::NonZeroExit {
                args: "merge-file".to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

/// Undo git's C-style quoting of porcelain paths containing spaces, quotes,
/// or non-ASCII bytes (`"with \"quote\"\302\240.txt"` -> `with "quote" .txt`).
pub fn unquote_porcelain_path(raw: &str) -> String {
    let Some(inner) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return raw.to_string();
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let chars: Vec<char> = inner.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() {
            match chars[i + 1] {
                'n' => {
                    bytes.push(b'\n');
                    i += 2;
                }
                't' => {
                    bytes.push(b'\t');
                    i += 2;
                }
                '\\' => {
                    bytes.push(b'\\');
                    i += 2;
                }
                '"' => {
                    bytes.push(b'"');
                    i += 2;
                }
                c if c.is_digit(8) && i + 3 < chars.len() + 1 => {
                    // octal escape: \NNN, one byte per escape
                    let mut j = i + 1;
                    let mut octal = String::new();
                    while j < chars.len() && octal.len() < 3 && chars[j].is_digit(8) {
                        octal.push(chars[j]);
                        j += 1;
                    }
                    if let Ok(byte) = u8::from_str_radix(&octal, 8) {
                        bytes.push(byte);
                        i = j;
                    } else {
                        bytes.push(chars[i] as u8);
                        i += 1;
                    }
                }
                other => {
                    bytes.push(other as u8);
                    i += 2;
                }
            }
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(chars[i].encode_utf8(&mut buf).as_bytes());
            i += 1;
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Fakes and helpers shared by the engines' unit tests.
#[cfg(test)]
pub mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Records every call and returns canned answers, so engine tests don't
    /// depend on a real `git` binary or network access.
    #[derive(Default)]
    pub struct FakeGitDriver {
        pub calls: RefCell<Vec<Vec<String>>>,
        pub changed_files: RefCell<Vec<String>>,
        pub clone_sources: RefCell<HashMap<String, PathBuf>>,
        pub merge_conflicts: RefCell<bool>,
        /// Returned for a `rev-parse --abbrev-ref HEAD` call, so export
        /// tests can exercise the local-direct branch-match check.
        pub current_branch: RefCell<String>,
    }

    impl FakeGitDriver {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a source tree to materialize into the next `temp_clone`
        /// for `url` (by recursive-copying it into a real temp directory).
        pub fn register_brain(&self, url: &str, source_tree: PathBuf) {
            self.clone_sources
                .borrow_mut()
                .insert(url.to_string(), source_tree);
        }

        fn record(&self, args: &[&str]) {
            self.calls
                .borrow_mut()
                .push(args.iter().map(|s| s.to_string()).collect());
        }
    }

    impl GitDriver for FakeGitDriver {
        fn run(&self, args: &[&str], _cwd: &Path, _timeout: Duration) -> Result<String, GitError> {
            self.record(args);
            if args == ["rev-parse", "--abbrev-ref", "HEAD"] {
                return Ok(self.current_branch.borrow().clone());
            }
            Ok(String::new())
        }

        fn is_repo(&self, _path: &Path) -> bool {
            true
        }

        fn is_bare(&self, _path: &Path) -> bool {
            false
        }

        fn toplevel(&self, path: &Path) -> Result<PathBuf, GitError> {
            Ok(path.to_path_buf())
        }

        fn is_tracked(&self, _path: &Path, _cwd: &Path) -> bool {
            true
        }

        fn is_modified(&self, _path: &Path, _cwd: &Path) -> bool {
            true
        }

        fn blob_hash_at_head(&self, _path: &Path, _cwd: &Path) -> Result<String, GitError> {
            Ok("deadbeef".to_string())
        }

        fn changed_files(&self, _cwd: &Path) -> Result<Vec<String>, GitError> {
            Ok(self.changed_files.borrow().clone())
        }

        fn clone_repo(&self, url: &str, target: &Path, args: &[&str]) -> Result<(), GitError> {
            self.record(&["clone", url]);
            let _ = args;
            if let Some(source) = self.clone_sources.borrow().get(url) {
                crate::fsutil::copy_tree(source, target).map_err(|e| GitError::Execution {
                    args: "clone".to_string(),
                    reason: e.to_string(),
                })?;
            } else {
                std::fs::create_dir_all(target).map_err(|e| GitError::Execution {
                    args: "clone".to_string(),
                    reason: e.to_string(),
                })?;
            }
            Ok(())
        }

        fn temp_clone(&self, url: &str, branch: Option<&str>) -> Result<TempClone, GitError> {
            let dir = tempfile::tempdir().map_err(|e| GitError::Execution {
                args: "clone".to_string(),
                reason: e.to_string(),
            })?;
            self.clone_repo(url, dir.path(), &[])?;
            let _ = branch;
            Ok(TempClone { dir })
        }

        fn merge_file(
            &self,
            local: &[u8],
            _base: &[u8],
            brain: &[u8],
        ) -> Result<MergeOutcome, GitError> {
            self.record(&["merge-file"]);
            if *self.merge_conflicts.borrow() {
                let mut content = Vec::new();
                content.extend_from_slice(b"<<<<<<< local\n");
                content.extend_from_slice(local);
                content.extend_from_slice(b"=======\n");
                content.extend_from_slice(brain);
                content.extend_from_slice(b">>>>>>> brain\n");
                Ok(MergeOutcome {
                    content,
                    had_conflicts: true,
                })
            } else {
                let mut content = local.to_vec();
                content.extend_from_slice(brain);
                Ok(MergeOutcome {
                    content,
                    had_conflicts: false,
                })
            }
        }
    }
}
