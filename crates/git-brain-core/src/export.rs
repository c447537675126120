//! Export Engine: commits the consumer's current neuron bytes back into
//! their brains.

use std::path::{Path, PathBuf};

use crate::config::{BrainEntry, ConsumerDescriptor, Mapping};
use crate::error::{PolicyError, SyncError};
use crate::fsutil;
use crate::git::{DEFAULT_TIMEOUT, GitDriver};

/// Whether a single brain's export committed (and, on the clone path,
/// pushed) successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    Success,
    Error,
}

/// One neuron carried by an export commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedNeuron {
    pub source: String,
    pub destination: String,
}

/// The outcome of exporting to a single brain.
#[derive(Debug, Clone)]
pub struct BrainExportOutcome {
    pub brain_id: String,
    pub status: ExportStatus,
    pub message: String,
    pub exported_neurons: Vec<ExportedNeuron>,
}

/// Export `mappings` (typically the result of [`crate::detector::modified_mappings`])
/// back into their brains, grouped one commit per brain.
///
/// Gated by the consumer's `allow-push-to-brain` policy; a failing brain
/// does not prevent the others in the same call from being processed.
pub fn export(
    consumer: &ConsumerDescriptor,
    mappings: &[Mapping],
    repo_root: &Path,
    commit_message: Option<&str>,
    git: &dyn GitDriver,
) -> Result<Vec<BrainExportOutcome>, PolicyError> {
    if !consumer.policy.allow_push_to_brain {
        return Err(PolicyError::ExportDisallowed);
    }

    let mut groups: Vec<(String, Vec<&Mapping>)> = Vec::new();
    for mapping in mappings {
        match groups.iter_mut().find(|(id, _)| *id == mapping.brain_id) {
            Some((_, group)) => group.push(mapping),
            None => groups.push((mapping.brain_id.clone(), vec![mapping])),
        }
    }

    Ok(groups
        .into_iter()
        .map(|(brain_id, group)| {
            export_group(consumer, &brain_id, &group, repo_root, commit_message, git)
        })
        .collect())
}

fn export_group(
    consumer: &ConsumerDescriptor,
    brain_id: &str,
    group: &[&Mapping],
    repo_root: &Path,
    commit_message: Option<&str>,
    git: &dyn GitDriver,
) -> BrainExportOutcome {
    let Some(entry) = consumer.brain(brain_id) else {
        return BrainExportOutcome {
            brain_id: brain_id.to_string(),
            status: ExportStatus::Error,
            message: format!("mapping references unknown brain '{brain_id}'"),
            exported_neurons: vec![],
        };
    };

    let message = commit_message
        .map(str::to_string)
        .unwrap_or_else(|| default_commit_message(group));

    let result = match local_direct_target(entry, git) {
        Some(brain_path) => {
            export_local_direct(&brain_path, group, repo_root, &message, git).map(|exported| {
                (exported, "committed directly to local brain working tree".to_string())
            })
        }
        None => export_clone_commit_push(entry, group, repo_root, &message, git)
            .map(|exported| (exported, "committed and pushed to brain".to_string())),
    };

    match result {
        Ok((exported_neurons, message)) => BrainExportOutcome {
            brain_id: brain_id.to_string(),
            status: ExportStatus::Success,
            message,
            exported_neurons,
        },
        Err(e) => BrainExportOutcome {
            brain_id: brain_id.to_string(),
            status: ExportStatus::Error,
            message: e.to_string(),
            exported_neurons: vec![],
        },
    }
}

/// `file://…` URL resolving to an existing non-bare repo whose current
/// branch matches the configured branch (or none is configured) and whose
/// working tree is clean.
fn local_direct_target(entry: &BrainEntry, git: &dyn GitDriver) -> Option<PathBuf> {
    let path = entry.remote.strip_prefix("file://").map(PathBuf::from)?;
    if !path.is_dir() || !git.is_repo(&path) || git.is_bare(&path) {
        return None;
    }
    if let Some(branch) = &entry.branch {
        let current = git
            .run(&["rev-parse", "--abbrev-ref", "HEAD"], &path, DEFAULT_TIMEOUT)
            .ok()?;
        if &current != branch {
            return None;
        }
    }
    let changed = git.changed_files(&path).ok()?;
    if !changed.is_empty() {
        return None;
    }
    Some(path)
}

fn copy_neurons(
    group: &[&Mapping],
    repo_root: &Path,
    brain_root: &Path,
) -> Result<Vec<ExportedNeuron>, SyncError> {
    let mut exported = Vec::with_capacity(group.len());
    for mapping in group {
        let consumer_path = repo_root.join(&mapping.destination);
        let target = brain_root.join(&mapping.source);
        fsutil::copy_tree(&consumer_path, &target).map_err(|e| SyncError::CopyFailed {
            from: consumer_path.clone(),
            to: target.clone(),
            reason: e.to_string(),
        })?;
        exported.push(ExportedNeuron {
            source: mapping.source.clone(),
            destination: mapping.destination.clone(),
        });
    }
    Ok(exported)
}

fn export_local_direct(
    brain_path: &Path,
    group: &[&Mapping],
    repo_root: &Path,
    message: &str,
    git: &dyn GitDriver,
) -> Result<Vec<ExportedNeuron>, SyncError> {
    let exported = copy_neurons(group, repo_root, brain_path)?;
    run_git(git, &["add", "."], brain_path)?;
    run_git(git, &["commit", "-m", message], brain_path)?;
    Ok(exported)
}

fn export_clone_commit_push(
    entry: &BrainEntry,
    group: &[&Mapping],
    repo_root: &Path,
    message: &str,
    git: &dyn GitDriver,
) -> Result<Vec<ExportedNeuron>, SyncError> {
    let clone = git
        .temp_clone(&entry.remote, Some(entry.effective_branch()))
        .map_err(|e| SyncError::WriteFailed {
            path: PathBuf::from(&entry.remote),
            reason: e.to_string(),
        })?;

    let exported = copy_neurons(group, repo_root, clone.path())?;
    run_git(git, &["add", "."], clone.path())?;
    run_git(git, &["commit", "-m", message], clone.path())?;
    run_git(git, &["push"], clone.path())?;
    Ok(exported)
}

fn run_git(git: &dyn GitDriver, args: &[&str], cwd: &Path) -> Result<(), SyncError> {
    git.run(args, cwd, DEFAULT_TIMEOUT)
        .map(|_| ())
        .map_err(|e| SyncError::WriteFailed {
            path: cwd.to_path_buf(),
            reason: e.to_string(),
        })
}

fn default_commit_message(group: &[&Mapping]) -> String {
    let mut lines = vec!["Export neurons from consumer".to_string()];
    for mapping in group {
        lines.push(format!("{} <- {}", mapping.source, mapping.destination));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncPolicy;
    use crate::git::testing::FakeGitDriver;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn temp_dir(label: &str) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("git-brain-export-{label}-{id}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn mapping(source: &str, destination: &str) -> Mapping {
        Mapping {
            brain_id: "our-lib".to_string(),
            source: source.to_string(),
            destination: destination.to_string(),
            key: "m".to_string(),
        }
    }

    #[test]
    fn export_disallowed_by_default_policy() {
        let git = FakeGitDriver::new();
        let consumer = ConsumerDescriptor {
            brains: vec![],
            policy: SyncPolicy::default(),
            mappings: vec![],
        };
        let err = export(&consumer, &[], Path::new("/repo"), None, &git).unwrap_err();
        assert!(matches!(err, PolicyError::ExportDisallowed));
    }

    #[test]
    fn exports_to_local_clean_brain_directly_without_pushing() {
        let root = temp_dir("local-direct");
        let brain_path = root.join("brain");
        std::fs::create_dir_all(&brain_path).unwrap();
        let repo_root = root.join("consumer");
        std::fs::create_dir_all(repo_root.join("src/shared")).unwrap();
        std::fs::write(repo_root.join("src/shared/common_utils.py"), b"v2\n").unwrap();

        let git = FakeGitDriver::new();
        *git.current_branch.borrow_mut() = "main".to_string();

        let consumer = ConsumerDescriptor {
            brains: vec![(
                "our-lib".to_string(),
                BrainEntry {
                    remote: format!("file://{}", brain_path.display()),
                    branch: Some("main".to_string()),
                    args: None,
                },
            )],
            policy: SyncPolicy {
                allow_push_to_brain: true,
                ..SyncPolicy::default()
            },
            mappings: vec![mapping("utils/common.py", "src/shared/common_utils.py")],
        };

        let outcomes = export(
            &consumer,
            &consumer.mappings,
            &repo_root,
            None,
            &git,
        )
        .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, ExportStatus::Success);
        assert_eq!(
            std::fs::read(brain_path.join("utils/common.py")).unwrap(),
            b"v2\n"
        );

        let calls = git.calls.borrow();
        assert!(calls.iter().any(|c| c == &["add", "."]));
        assert!(calls.iter().any(|c| c.first().map(String::as_str) == Some("commit")));
        assert!(!calls.iter().any(|c| c.first().map(String::as_str) == Some("push")));
    }

    #[test]
    fn falls_back_to_clone_commit_push_for_remote_brain() {
        let root = temp_dir("clone-push");
        let repo_root = root.join("consumer");
        std::fs::create_dir_all(repo_root.join("src")).unwrap();
        std::fs::write(repo_root.join("src/f.py"), b"v2\n").unwrap();
        let brain_seed = root.join("brain-seed");
        std::fs::create_dir_all(&brain_seed).unwrap();

        let git = FakeGitDriver::new();
        git.register_brain("https://example.com/our-lib.git", brain_seed);

        let consumer = ConsumerDescriptor {
            brains: vec![(
                "our-lib".to_string(),
                BrainEntry {
                    remote: "https://example.com/our-lib.git".to_string(),
                    branch: None,
                    args: None,
                },
            )],
            policy: SyncPolicy {
                allow_push_to_brain: true,
                ..SyncPolicy::default()
            },
            mappings: vec![mapping("f.py", "src/f.py")],
        };

        let outcomes = export(&consumer, &consumer.mappings, &repo_root, None, &git).unwrap();
        assert_eq!(outcomes[0].status, ExportStatus::Success);

        let calls = git.calls.borrow();
        assert!(calls.iter().any(|c| c.first().map(String::as_str) == Some("push")));
    }

    #[test]
    fn unknown_brain_is_reported_per_group() {
        let git = FakeGitDriver::new();
        let consumer = ConsumerDescriptor {
            brains: vec![],
            policy: SyncPolicy {
                allow_push_to_brain: true,
                ..SyncPolicy::default()
            },
            mappings: vec![mapping("a", "b")],
        };
        let outcomes = export(&consumer, &consumer.mappings, Path::new("/repo"), None, &git).unwrap();
        assert_eq!(outcomes[0].status, ExportStatus::Error);
    }

    #[test]
    fn default_commit_message_enumerates_pairs() {
        let m = mapping("utils/common.py", "src/shared/common_utils.py");
        let message = default_commit_message(&[&m]);
        assert!(message.contains("utils/common.py <- src/shared/common_utils.py"));
    }
}
