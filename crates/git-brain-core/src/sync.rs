//! Sync Engine: materializes one or all configured neurons into the
//! consumer working tree.

use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use crate::config::{ConflictStrategy, ConsumerDescriptor, Mapping};
use crate::conflict;
use crate::error::SyncError;
use crate::fsutil;
use crate::git::GitDriver;
use crate::requirements;

/// What happened to a single neuron's destination during a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Added,
    Updated,
    Unchanged,
    Skipped,
}

/// Whether a neuron's sync completed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Success,
    Error,
}

/// The outcome of syncing a single neuron.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub brain_id: String,
    pub source: String,
    pub destination: String,
    pub status: SyncStatus,
    pub action: SyncAction,
    pub message: String,
    pub requirements_merged: bool,
}

impl SyncOutcome {
    fn error(brain_id: String, source: String, destination: String, message: String) -> Self {
        Self {
            brain_id,
            source,
            destination,
            status: SyncStatus::Error,
            action: SyncAction::Skipped,
            message,
            requirements_merged: false,
        }
    }
}

/// Sync a single mapping into `repo_root`.
///
/// `strategy_override`, when given, replaces the policy's configured
/// conflict strategy for this call only (the CLI's `--strategy` flag);
/// `interactive` reflects whether the controlling input is a TTY, passed in
/// explicitly rather than probed internally (no global state). Per-neuron
/// failures are captured into the returned outcome rather than propagated,
/// so a batch of these never aborts partway through.
pub fn sync_one(
    consumer: &ConsumerDescriptor,
    mapping: &Mapping,
    repo_root: &Path,
    strategy_override: Option<ConflictStrategy>,
    interactive: bool,
    git: &dyn GitDriver,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
) -> SyncOutcome {
    let brain_id = mapping.brain_id.clone();
    let source = mapping.source.clone();
    let destination = mapping.destination.clone();

    let Some(brain_entry) = consumer.brain(&brain_id) else {
        return SyncOutcome::error(
            brain_id.clone(),
            source,
            destination,
            SyncError::UnknownBrain(brain_id).to_string(),
        );
    };

    let strategy = effective_call_strategy(consumer, strategy_override);

    let clone = match git.temp_clone(&brain_entry.remote, Some(brain_entry.effective_branch())) {
        Ok(clone) => clone,
        Err(e) => return SyncOutcome::error(brain_id, source, destination, e.to_string()),
    };

    let src = clone.path().join(&source);
    let dst = repo_root.join(&destination);
    if let Some(parent) = dst.parent() {
        if let Err(e) = fsutil::ensure_dir(parent) {
            return SyncOutcome::error(brain_id, source, destination, e.to_string());
        }
    }

    if !src.exists() {
        let err = SyncError::SourceNotFound {
            brain_id: brain_id.clone(),
            source: source.clone(),
        };
        return SyncOutcome::error(brain_id, source, destination, err.to_string());
    }

    let src_is_dir = src.is_dir();
    let mut any_added = false;
    let mut any_updated = false;

    let walk_result = if src_is_dir {
        sync_directory_neuron(
            &src,
            &dst,
            strategy,
            interactive,
            git,
            reader,
            writer,
            &mut any_added,
            &mut any_updated,
        )
    } else {
        sync_file_neuron(
            &src,
            &dst,
            strategy,
            interactive,
            git,
            reader,
            writer,
            &mut any_added,
            &mut any_updated,
        )
    };

    if let Err(e) = walk_result {
        return SyncOutcome::error(brain_id, source, destination, e.to_string());
    }

    let action = if any_updated {
        SyncAction::Updated
    } else if any_added {
        SyncAction::Added
    } else {
        SyncAction::Unchanged
    };

    let requirements_merged = match merge_requirements(&src, src_is_dir, repo_root) {
        Ok(merged) => merged,
        Err(e) => {
            return SyncOutcome {
                brain_id,
                source,
                destination,
                status: SyncStatus::Error,
                action,
                message: format!("requirements merge failed: {e}"),
                requirements_merged: false,
            };
        }
    };

    SyncOutcome {
        brain_id,
        source,
        destination,
        status: SyncStatus::Success,
        action,
        message: "ok".to_string(),
        requirements_merged,
    }
}

/// Sync every mapping in `consumer`'s mapping list, in order. A per-neuron
/// failure never aborts the batch.
pub fn sync_all(
    consumer: &ConsumerDescriptor,
    repo_root: &Path,
    strategy_override: Option<ConflictStrategy>,
    interactive: bool,
    git: &dyn GitDriver,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
) -> Vec<SyncOutcome> {
    consumer
        .mappings
        .iter()
        .map(|mapping| {
            sync_one(
                consumer,
                mapping,
                repo_root,
                strategy_override,
                interactive,
                git,
                reader,
                writer,
            )
        })
        .collect()
}

/// Per-action neuron counts across a batch, for a one-line CLI summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Tally a batch of [`sync_all`] outcomes into a [`SyncSummary`].
pub fn summarize(outcomes: &[SyncOutcome]) -> SyncSummary {
    let mut summary = SyncSummary::default();
    for outcome in outcomes {
        if outcome.status == SyncStatus::Error {
            summary.errors += 1;
            continue;
        }
        match outcome.action {
            SyncAction::Added => summary.added += 1,
            SyncAction::Updated => summary.updated += 1,
            SyncAction::Unchanged => summary.unchanged += 1,
            SyncAction::Skipped => summary.skipped += 1,
        }
    }
    summary
}

fn effective_call_strategy(
    consumer: &ConsumerDescriptor,
    strategy_override: Option<ConflictStrategy>,
) -> ConflictStrategy {
    let requested = strategy_override.unwrap_or(consumer.policy.conflict_strategy);
    conflict::effective_strategy(requested, consumer.policy.allow_local_modifications)
}

#[allow(clippy::too_many_arguments)]
fn sync_directory_neuron(
    src: &Path,
    dst: &Path,
    strategy: ConflictStrategy,
    interactive: bool,
    git: &dyn GitDriver,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
    any_added: &mut bool,
    any_updated: &mut bool,
) -> Result<(), SyncError> {
    let skip: HashSet<PathBuf> = neuron_manifest_candidates(src, true).into_iter().collect();

    if !dst.is_dir() {
        // Route the fresh-destination case through the same file-by-file
        // walk as an existing directory, rather than a whole-tree copy, so
        // the neuron-owned manifest in `skip` is excluded here too instead
        // of only when `dst` already existed as a directory.
        let existed = dst.exists();
        if existed {
            remove_any(dst)?;
        }
        walk_directory(
            src,
            dst,
            strategy,
            interactive,
            git,
            reader,
            writer,
            &skip,
            any_added,
            any_updated,
        )?;
        if existed {
            *any_updated = true;
        }
        return Ok(());
    }

    walk_directory(
        src,
        dst,
        strategy,
        interactive,
        git,
        reader,
        writer,
        &skip,
        any_added,
        any_updated,
    )
}

#[allow(clippy::too_many_arguments)]
fn walk_directory(
    src: &Path,
    dst: &Path,
    strategy: ConflictStrategy,
    interactive: bool,
    git: &dyn GitDriver,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
    skip: &HashSet<PathBuf>,
    any_added: &mut bool,
    any_updated: &mut bool,
) -> Result<(), SyncError> {
    fsutil::ensure_dir(dst).map_err(|e| SyncError::WriteFailed {
        path: dst.to_path_buf(),
        reason: e.to_string(),
    })?;

    let entries = std::fs::read_dir(src).map_err(|e| SyncError::CopyFailed {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        reason: e.to_string(),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| SyncError::CopyFailed {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            reason: e.to_string(),
        })?;
        let child_src = entry.path();
        if skip.contains(&child_src) {
            continue;
        }
        let child_dst = dst.join(entry.file_name());

        if child_src.is_dir() {
            walk_directory(
                &child_src,
                &child_dst,
                strategy,
                interactive,
                git,
                reader,
                writer,
                skip,
                any_added,
                any_updated,
            )?;
            continue;
        }

        let brain_bytes = fsutil::read_bytes(&child_src).map_err(|e| SyncError::CopyFailed {
            from: child_src.clone(),
            to: child_dst.clone(),
            reason: e.to_string(),
        })?;

        if !child_dst.exists() {
            fsutil::write_bytes(&child_dst, &brain_bytes).map_err(|e| SyncError::WriteFailed {
                path: child_dst.clone(),
                reason: e.to_string(),
            })?;
            *any_added = true;
            continue;
        }

        let local_bytes = fsutil::read_bytes(&child_dst).map_err(|e| SyncError::CopyFailed {
            from: child_dst.clone(),
            to: child_dst.clone(),
            reason: e.to_string(),
        })?;

        if conflict::contents_differ(&local_bytes, &brain_bytes) {
            let label = child_dst.display().to_string();
            let resolved = conflict::resolve(
                &label,
                &local_bytes,
                &brain_bytes,
                strategy,
                interactive,
                git,
                reader,
                writer,
            )
            .map_err(|e| SyncError::WriteFailed {
                path: child_dst.clone(),
                reason: e.to_string(),
            })?;

            if resolved.content != local_bytes {
                fsutil::write_bytes(&child_dst, &resolved.content).map_err(|e| {
                    SyncError::WriteFailed {
                        path: child_dst.clone(),
                        reason: e.to_string(),
                    }
                })?;
                *any_updated = true;
            }
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn sync_file_neuron(
    src: &Path,
    dst: &Path,
    strategy: ConflictStrategy,
    interactive: bool,
    git: &dyn GitDriver,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
    any_added: &mut bool,
    any_updated: &mut bool,
) -> Result<(), SyncError> {
    let brain_bytes = fsutil::read_bytes(src).map_err(|e| SyncError::CopyFailed {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        reason: e.to_string(),
    })?;

    if !dst.exists() {
        fsutil::write_bytes(dst, &brain_bytes).map_err(|e| SyncError::WriteFailed {
            path: dst.to_path_buf(),
            reason: e.to_string(),
        })?;
        *any_added = true;
        return Ok(());
    }

    if dst.is_dir() {
        remove_any(dst)?;
        fsutil::write_bytes(dst, &brain_bytes).map_err(|e| SyncError::WriteFailed {
            path: dst.to_path_buf(),
            reason: e.to_string(),
        })?;
        *any_updated = true;
        return Ok(());
    }

    let local_bytes = fsutil::read_bytes(dst).map_err(|e| SyncError::CopyFailed {
        from: dst.to_path_buf(),
        to: dst.to_path_buf(),
        reason: e.to_string(),
    })?;

    if conflict::contents_differ(&local_bytes, &brain_bytes) {
        let label = dst.display().to_string();
        let resolved = conflict::resolve(
            &label,
            &local_bytes,
            &brain_bytes,
            strategy,
            interactive,
            git,
            reader,
            writer,
        )
        .map_err(|e| SyncError::WriteFailed {
            path: dst.to_path_buf(),
            reason: e.to_string(),
        })?;

        if resolved.content != local_bytes {
            fsutil::write_bytes(dst, &resolved.content).map_err(|e| SyncError::WriteFailed {
                path: dst.to_path_buf(),
                reason: e.to_string(),
            })?;
            *any_updated = true;
        }
    }

    Ok(())
}

fn remove_any(path: &Path) -> Result<(), SyncError> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|e| SyncError::WriteFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Candidate neuron-owned manifest paths for a source on disk, per the
/// location rules: `S/requirements.txt` and `S/<basename(S)>requirements.txt`
/// for a directory neuron, `file.extrequirements.txt` adjacent to a file
/// neuron.
fn neuron_manifest_candidates(src: &Path, is_dir: bool) -> Vec<PathBuf> {
    if is_dir {
        let basename = src.file_name().and_then(|s| s.to_str()).unwrap_or("");
        vec![
            src.join("requirements.txt"),
            src.join(format!("{basename}requirements.txt")),
        ]
    } else {
        let filename = src.file_name().and_then(|s| s.to_str()).unwrap_or("");
        let dir = src.parent().map(Path::to_path_buf).unwrap_or_default();
        vec![dir.join(format!("{filename}requirements.txt"))]
    }
}

fn merge_requirements(src: &Path, is_dir: bool, repo_root: &Path) -> Result<bool, SyncError> {
    let Some(found) = neuron_manifest_candidates(src, is_dir)
        .into_iter()
        .find(|p| p.is_file())
    else {
        return Ok(false);
    };

    let neuron_bytes = fsutil::read_bytes(&found).map_err(|e| SyncError::WriteFailed {
        path: found.clone(),
        reason: e.to_string(),
    })?;

    let consumer_manifest = repo_root.join("requirements.txt");
    requirements::merge_into_file(&consumer_manifest, &[neuron_bytes]).map_err(|e| {
        SyncError::WriteFailed {
            path: consumer_manifest,
            reason: e.to_string(),
        }
    })?;

    Ok(true)
}
