//! Conflict Resolver: decides, for a single destination, whose bytes win
//! when local and brain content differ.
//!
//! The non-prompt strategies are pure (P2); the interactive prompt path
//! takes an input reader and output writer as explicit collaborators
//! (per the design notes) so it can be driven by tests without a real TTY.

use std::io::{BufRead, Write};

use crate::config::ConflictStrategy;
use crate::git::GitDriver;

/// How a conflict was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Brain,
    Local,
    Merged,
    MergedWithConflicts,
}

/// The outcome of [`resolve`]: which side won, and the bytes to write.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub resolution: Resolution,
    pub content: Vec<u8>,
}

/// True iff `local` and `brain` disagree.
///
/// This is a byte compare. When both sides are valid UTF-8 a string compare
/// of the decoded text agrees with it by construction (a UTF-8 byte
/// difference is always a string difference), so there is nothing further
/// to special-case; any byte difference yields a conflict.
pub fn contents_differ(local: &[u8], brain: &[u8]) -> bool {
    local != brain
}

/// Apply the policy-level degradation rule: a `prompt` strategy behaves as
/// `prefer-brain` whenever local modifications are disallowed, regardless
/// of interactivity (P3).
pub fn effective_strategy(
    strategy: ConflictStrategy,
    allow_local_modifications: bool,
) -> ConflictStrategy {
    if strategy == ConflictStrategy::Prompt && !allow_local_modifications {
        ConflictStrategy::PreferBrain
    } else {
        strategy
    }
}

/// Resolve a conflict given the *effective* strategy (see [`effective_strategy`]).
///
/// `prefer-brain` and `prefer-local` are pure and ignore `interactive`,
/// `git`, `reader`, and `writer` entirely. `prompt` degrades to
/// `prefer-brain` when `interactive` is false; otherwise it shows a diff and
/// asks the user to pick a side (or merge, for text files).
pub fn resolve(
    destination: &str,
    local: &[u8],
    brain: &[u8],
    strategy: ConflictStrategy,
    interactive: bool,
    git: &dyn GitDriver,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
) -> std::io::Result<Resolved> {
    match strategy {
        ConflictStrategy::PreferBrain => Ok(Resolved {
            resolution: Resolution::Brain,
            content: brain.to_vec(),
        }),
        ConflictStrategy::PreferLocal => Ok(Resolved {
            resolution: Resolution::Local,
            content: local.to_vec(),
        }),
        ConflictStrategy::Prompt => {
            if !interactive {
                return Ok(Resolved {
                    resolution: Resolution::Brain,
                    content: brain.to_vec(),
                });
            }
            prompt(destination, local, brain, git, reader, writer)
        }
    }
}

fn prompt(
    destination: &str,
    local: &[u8],
    brain: &[u8],
    git: &dyn GitDriver,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
) -> std::io::Result<Resolved> {
    let local_text = std::str::from_utf8(local).ok();
    let brain_text = std::str::from_utf8(brain).ok();
    let is_text = local_text.is_some() && brain_text.is_some();

    writeln!(writer, "conflict in {destination}:")?;
    if let (Some(local_text), Some(brain_text)) = (local_text, brain_text) {
        let diff = similar::TextDiff::from_lines(local_text, brain_text);
        for change in diff.iter_all_changes() {
            let sign = match change.tag() {
                similar::ChangeTag::Delete => "-",
                similar::ChangeTag::Insert => "+",
                similar::ChangeTag::Equal => " ",
            };
            write!(writer, "{sign}{change}")?;
        }
    } else {
        writeln!(writer, "(binary content; diff unavailable)")?;
    }

    loop {
        if is_text {
            write!(writer, "(b)rain, (l)ocal, (m)erge? ")?;
        } else {
            write!(writer, "(b)rain, (l)ocal? ")?;
        }
        writer.flush()?;

        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            return Err(std::io::Error::other(
                crate::error::UserAbort::PromptDeclined {
                    destination: destination.to_string(),
                },
            ));
        }
        match line.trim() {
            "b" => {
                return Ok(Resolved {
                    resolution: Resolution::Brain,
                    content: brain.to_vec(),
                });
            }
            "l" => {
                return Ok(Resolved {
                    resolution: Resolution::Local,
                    content: local.to_vec(),
                });
            }
            "m" if is_text => {
                let outcome = git
                    .merge_file(local, &[], brain)
                    .map_err(|e| std::io::Error::other(e.to_string()))?;
                let resolution = if outcome.had_conflicts {
                    Resolution::MergedWithConflicts
                } else {
                    Resolution::Merged
                };
                return Ok(Resolved {
                    resolution,
                    content: outcome.content,
                });
            }
            _ => {
                writeln!(writer, "unrecognized input, try again")?;
            }
        }
    }
}
