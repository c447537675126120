//! Filesystem utilities shared by the Sync and Export engines.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Create `path` and all missing ancestors, succeeding if it already exists.
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory {}", path.display()))
}

/// Copy a file or directory tree from `src` to `dst`, overwriting whatever
/// already exists at `dst`.
///
/// If `dst` exists and its file/directory-ness doesn't match `src`, the
/// existing entry is removed first so the copy always leaves `dst` matching
/// `src`'s shape.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    let src_meta = fs::symlink_metadata(src)
        .with_context(|| format!("failed to stat {}", src.display()))?;

    if src_meta.is_dir() {
        if dst.exists() && !dst.is_dir() {
            fs::remove_file(dst)
                .with_context(|| format!("failed to remove {}", dst.display()))?;
        }
        ensure_dir(dst)?;
        for entry in fs::read_dir(src)
            .with_context(|| format!("failed to read directory {}", src.display()))?
        {
            let entry = entry?;
            let child_src = entry.path();
            let child_dst = dst.join(entry.file_name());
            copy_tree(&child_src, &child_dst)?;
        }
    } else {
        if dst.is_dir() {
            fs::remove_dir_all(dst)
                .with_context(|| format!("failed to remove directory {}", dst.display()))?;
        }
        if let Some(parent) = dst.parent() {
            ensure_dir(parent)?;
        }
        fs::copy(src, dst)
            .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))?;
    }
    Ok(())
}

/// Read a file as raw bytes.
pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Read a file as UTF-8 text, returning an empty string if it doesn't exist.
pub fn read_text_or_empty(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Write bytes to `path`, creating parent directories as needed.
pub fn write_bytes(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

/// Format a byte count the way a human reads it: `512 B`, `3.4 KiB`, `1.2 GiB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn temp_dir(label: &str) -> std::path::PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("git-brain-fsutil-{label}-{id}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("failed to create temp dir");
        dir
    }

    #[test]
    fn copy_tree_copies_nested_directories() {
        let root = temp_dir("nested");
        let src = root.join("src");
        fs::create_dir_all(src.join("a/b")).unwrap();
        fs::write(src.join("a/b/file.txt"), b"hello").unwrap();

        let dst = root.join("dst");
        copy_tree(&src, &dst).unwrap();

        assert_eq!(fs::read(dst.join("a/b/file.txt")).unwrap(), b"hello");
    }

    #[test]
    fn copy_tree_overwrites_file_with_directory() {
        let root = temp_dir("overwrite-file-with-dir");
        let src = root.join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("thing.txt"), b"content").unwrap();

        let dst = root.join("dst");
        fs::write(&dst, b"old file").unwrap();

        copy_tree(&src.join("thing.txt"), &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"content");
    }

    #[test]
    fn read_text_or_empty_on_missing_file() {
        let root = temp_dir("missing");
        let path = root.join("does-not-exist.txt");
        assert_eq!(read_text_or_empty(&path).unwrap(), "");
    }

    #[test]
    fn human_size_formats_common_magnitudes() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(1024 * 1024 * 3), "3.0 MiB");
    }
}
