//! Modified-Neuron Detector: maps Git's changed-file set onto the
//! consumer's mapping table.

use std::path::Path;

use crate::config::{ConsumerDescriptor, Mapping};
use crate::error::GitError;
use crate::git::GitDriver;

/// Normalize a path for comparison: forward slashes, no leading `./`.
fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.strip_prefix("./").unwrap_or(&path).to_string()
}

/// True iff `destination` (mapping-relative, already normalized) names a
/// directory: it ends with a separator, or it exists as a directory on disk
/// under `repo_root`.
fn destination_is_directory(repo_root: &Path, destination: &str) -> bool {
    destination.ends_with('/') || repo_root.join(destination).is_dir()
}

/// Mappings whose destination matches at least one changed file, in
/// mapping order, deduplicated by (brain-id, source, destination).
pub fn modified_mappings(
    consumer: &ConsumerDescriptor,
    repo_root: &Path,
    git: &dyn GitDriver,
) -> Result<Vec<Mapping>, GitError> {
    let changed: Vec<String> = git
        .changed_files(repo_root)?
        .iter()
        .map(|p| normalize(p))
        .collect();

    let mut matched = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for mapping in &consumer.mappings {
        let destination = normalize(&mapping.destination);
        let is_dir = destination_is_directory(repo_root, &destination);

        let hit = if is_dir {
            let prefix = if destination.ends_with('/') {
                destination.clone()
            } else {
                format!("{destination}/")
            };
            changed
                .iter()
                .any(|c| c == &destination || c.starts_with(&prefix))
        } else {
            changed.iter().any(|c| c == &destination)
        };

        if hit {
            let key = (
                mapping.brain_id.clone(),
                mapping.source.clone(),
                mapping.destination.clone(),
            );
            if seen.insert(key) {
                matched.push(mapping.clone());
            }
        }
    }

    Ok(matched)
}
