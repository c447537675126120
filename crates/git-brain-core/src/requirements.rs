//! Requirements Merger: combines a consumer's own dependency manifest with
//! the manifests carried by its neurons, keeping the newest version of each
//! package and preserving the consumer's own pins.
//!
//! The line format is the common `name==version` / `name>=version` /
//! bare-`name` shape; comments (`#`) and blank lines pass through
//! unrecognized and are dropped from the merged output, matching how the
//! upstream ecosystem's own tooling treats a frozen-requirements file as a
//! flat, comment-stripped set.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};

/// One `name<op>version` requirement line, or a bare `name` with no pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub operator: Option<String>,
    pub version: Option<String>,
}

impl Requirement {
    /// `name==version` when `version` is non-empty, else bare `name` —
    /// the manifest format has no way to round-trip an operator other than
    /// `==`, since every other specifier stores an empty version (see
    /// [`parse_line`]).
    fn render(&self) -> String {
        match &self.version {
            Some(version) if !version.is_empty() => format!("{}=={}", self.name, version),
            _ => self.name.clone(),
        }
    }
}

const OPERATORS: &[&str] = &["==", ">=", "<=", "~=", "!=", ">", "<"];

/// Parse one non-comment, non-blank requirements line.
///
/// Only `==` captures a version; any other recognized specifier is kept as
/// the operator but its version is stored empty, matching the manifest
/// format's documented (if unusual) precedence rule.
fn parse_line(line: &str) -> Option<Requirement> {
    let line = line.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return None;
    }

    for op in OPERATORS {
        if let Some(idx) = line.find(op) {
            let name = line[..idx].trim().to_string();
            let rhs = line[idx + op.len()..].trim().to_string();
            if name.is_empty() || rhs.is_empty() {
                continue;
            }
            let version = if *op == "==" { Some(rhs) } else { Some(String::new()) };
            return Some(Requirement {
                name,
                operator: Some((*op).to_string()),
                version,
            });
        }
    }

    Some(Requirement {
        name: line.to_string(),
        operator: None,
        version: None,
    })
}

/// Parse a whole requirements file's text into an ordered list, skipping
/// blank lines and pure-comment lines.
pub fn parse(text: &str) -> Vec<Requirement> {
    text.lines().filter_map(parse_line).collect()
}

/// Serialize requirements back to file text, one per line, sorted by name.
pub fn serialize(requirements: &[Requirement]) -> String {
    let mut sorted: Vec<&Requirement> = requirements.iter().collect();
    sorted.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    let mut out = String::new();
    for req in sorted {
        out.push_str(&req.render());
        out.push('\n');
    }
    out
}

/// Compare two dotted-numeric version strings the way PEP 440 compares
/// release segments: component-wise numeric comparison, with a missing
/// trailing component treated as `0` (so `1.2` == `1.2.0`). Non-numeric
/// components compare lexically, which is enough for the simple pinned
/// versions requirement manifests actually carry.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a_parts: Vec<&str> = a.split(|c| c == '.' || c == '-' || c == '+').collect();
    let b_parts: Vec<&str> = b.split(|c| c == '.' || c == '-' || c == '+').collect();
    let len = a_parts.len().max(b_parts.len());

    for i in 0..len {
        let a_part = a_parts.get(i).copied().unwrap_or("0");
        let b_part = b_parts.get(i).copied().unwrap_or("0");

        let ordering = match (a_part.parse::<u64>(), b_part.parse::<u64>()) {
            (Ok(a_num), Ok(b_num)) => a_num.cmp(&b_num),
            _ => a_part.cmp(b_part),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// True iff every dotted/dashed/plus-separated segment of `version` parses
/// as a plain non-negative integer — the PEP-440-like case §4.3 means by
/// "a parser is available and both versions parse".
fn is_numeric_version(version: &str) -> bool {
    !version.is_empty()
        && version
            .split(|c| c == '.' || c == '-' || c == '+')
            .all(|segment| segment.parse::<u64>().is_ok())
}

/// Merge a consumer's requirements with one or more neuron-supplied
/// requirement sets.
///
/// For each package name, across every source: when both sides' versions
/// are fully numeric (PEP-440-like), the higher one wins; otherwise the
/// neuron's (later) string wins whenever it differs from the existing one,
/// except that a non-empty existing version is kept when the neuron's is
/// empty — a bare/unpinned neuron requirement never overrides a pinned
/// consumer one.
pub fn merge(sources: &[Vec<Requirement>]) -> Vec<Requirement> {
    let mut merged: BTreeMap<String, Requirement> = BTreeMap::new();

    for source in sources {
        for req in source {
            let key = req.name.to_lowercase();
            match merged.get(&key) {
                None => {
                    merged.insert(key, req.clone());
                }
                Some(existing) => {
                    let should_replace = match (&existing.version, &req.version) {
                        (None, Some(_)) => true,
                        (Some(_), None) => false,
                        (Some(existing_version), Some(new_version)) => {
                            match (existing_version.is_empty(), new_version.is_empty()) {
                                (true, true) => false,
                                (true, false) => true,
                                (false, true) => false,
                                (false, false) => {
                                    if is_numeric_version(existing_version)
                                        && is_numeric_version(new_version)
                                    {
                                        compare_versions(new_version, existing_version)
                                            == Ordering::Greater
                                    } else {
                                        new_version != existing_version
                                    }
                                }
                            }
                        }
                        (None, None) => false,
                    };
                    if should_replace {
                        merged.insert(key, req.clone());
                    }
                }
            }
        }
    }

    merged.into_values().collect()
}

/// Merge a consumer's own requirements file (if any) with a set of
/// neuron-supplied manifests named `<basename>requirements.txt`, and write
/// the merged result back to the consumer's manifest path.
pub fn merge_into_file(consumer_manifest: &Path, neuron_manifests: &[Vec<u8>]) -> Result<()> {
    let own_text = if consumer_manifest.exists() {
        std::fs::read_to_string(consumer_manifest)
            .with_context(|| format!("failed to read {}", consumer_manifest.display()))?
    } else {
        String::new()
    };

    let mut sources = vec![parse(&own_text)];
    for raw in neuron_manifests {
        let text = String::from_utf8_lossy(raw);
        sources.push(parse(&text));
    }

    let merged = merge(&sources);
    let serialized = serialize(&merged);

    if let Some(parent) = consumer_manifest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    std::fs::write(consumer_manifest, serialized)
        .with_context(|| format!("failed to write {}", consumer_manifest.display()))
}
