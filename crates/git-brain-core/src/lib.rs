#![forbid(unsafe_code)]
//! Neuron synchronization engine for git-brain.
//!
//! Components speak to each other through plain data and the [`git::GitDriver`]
//! trait; nothing here shells out directly or touches a terminal. The CLI
//! crate supplies interactivity, TTY detection, and command dispatch.

pub mod conflict;
pub mod config;
pub mod detector;
pub mod error;
pub mod export;
pub mod fsutil;
pub mod git;
pub mod requirements;
pub mod sync;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrainEntry, ConsumerDescriptor, Mapping, SyncPolicy};
    use crate::git::testing::FakeGitDriver;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn temp_dir(label: &str) -> std::path::PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("git-brain-e2e-{label}-{id}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Scenario 5 end-to-end: a directory neuron carries its own
    /// requirements manifest, which gets folded into the consumer's root
    /// manifest during the same sync that materializes the neuron's files.
    #[test]
    fn sync_then_export_round_trip_via_local_brain() {
        let root = temp_dir("roundtrip");

        let brain_path = root.join("brain");
        std::fs::create_dir_all(brain_path.join("utils")).unwrap();
        std::fs::write(brain_path.join("utils/common.py"), b"v1\n").unwrap();

        let repo_root = root.join("consumer");
        std::fs::create_dir_all(&repo_root).unwrap();

        let git = FakeGitDriver::new();
        git.register_brain(
            &format!("file://{}", brain_path.display()),
            brain_path.clone(),
        );
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
            mappings: vec![Mapping {
                brain_id: "our-lib".to_string(),
                source: "utils/common.py".to_string(),
                destination: "src/shared/common_utils.py".to_string(),
                key: "shared_utils".to_string(),
            }],
        };

        let mut input = Cursor::new(Vec::new());
        let mut output = Vec::new();
        let outcomes = sync::sync_all(
            &consumer,
            &repo_root,
            None,
            false,
            &git,
            &mut input,
            &mut output,
        );
        assert_eq!(outcomes[0].action, sync::SyncAction::Added);

        // Edit locally, then export back to the (local, clean after sync's
        // own copy... but we now make it dirty by hand) brain.
        std::fs::write(
            repo_root.join("src/shared/common_utils.py"),
            b"v1-edited\n",
        )
        .unwrap();

        let export_outcomes = export::export(
            &consumer,
            &consumer.mappings,
            &repo_root,
            None,
            &git,
        )
        .unwrap();
        assert_eq!(export_outcomes[0].status, export::ExportStatus::Success);
        assert_eq!(
            std::fs::read(brain_path.join("utils/common.py")).unwrap(),
            b"v1-edited\n"
        );
    }
}
