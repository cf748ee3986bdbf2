//! Moves superseded files into archival folders.

use crate::config::{ArchiveConfig, ConflictPolicy};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Moves `src` into `dir` under its own file name and returns the new path.
///
/// The directory is created when absent. A name collision is resolved per
/// the configured [`ConflictPolicy`].
pub fn move_into(src: &Path, dir: &Path, archive: &ArchiveConfig) -> Result<PathBuf> {
    let file_name = src
        .file_name()
        .with_context(|| format!("{} has no file name", src.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut dest = dir.join(file_name);
    if dest.exists() && archive.conflict == ConflictPolicy::Rename {
        dest = resolve_conflict(&dest);
    }
    apply_move(src, &dest, archive.copy_then_delete)
        .with_context(|| format!("failed to move {} to {}", src.display(), dest.display()))?;
    tracing::debug!(from = %src.display(), to = %dest.display(), "moved");
    Ok(dest)
}

fn resolve_conflict(dest: &Path) -> PathBuf {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let stem = dest
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file")
        .to_string();
    let ext = dest
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string();
    let mut counter = 1;
    loop {
        let name = if ext.is_empty() {
            format!("{}_{}", stem, counter)
        } else {
            format!("{}_{}.{}", stem, counter, ext)
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

fn apply_move(from: &Path, to: &Path, copy_then_delete: bool) -> std::io::Result<()> {
    if copy_then_delete {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    } else {
        fs::rename(from, to)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.json");
        fs::write(&src, "{}").unwrap();

        let dest = move_into(&src, &dir.path().join("json_files"), &ArchiveConfig::default())
            .unwrap();
        assert_eq!(dest, dir.path().join("json_files").join("a.json"));
        assert!(dest.exists());
        assert!(!src.exists());
    }

    #[test]
    fn overwrite_policy_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let archive_dir = dir.path().join("archive");
        fs::create_dir(&archive_dir).unwrap();
        fs::write(archive_dir.join("a.json"), "old").unwrap();
        let src = dir.path().join("a.json");
        fs::write(&src, "new").unwrap();

        let dest = move_into(&src, &archive_dir, &ArchiveConfig::default()).unwrap();
        assert_eq!(fs::read_to_string(dest).unwrap(), "new");
    }

    #[test]
    fn rename_policy_keeps_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let archive_dir = dir.path().join("archive");
        fs::create_dir(&archive_dir).unwrap();
        fs::write(archive_dir.join("a.json"), "old").unwrap();
        fs::write(archive_dir.join("a_1.json"), "older").unwrap();
        let src = dir.path().join("a.json");
        fs::write(&src, "new").unwrap();

        let archive = ArchiveConfig {
            conflict: ConflictPolicy::Rename,
            copy_then_delete: true,
            ..ArchiveConfig::default()
        };
        let dest = move_into(&src, &archive_dir, &archive).unwrap();
        assert_eq!(dest, archive_dir.join("a_2.json"));
        assert_eq!(fs::read_to_string(archive_dir.join("a.json")).unwrap(), "old");
        assert!(!src.exists());
    }

    #[test]
    fn missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let res = move_into(
            &dir.path().join("gone.heic"),
            &dir.path().join("heic_files"),
            &ArchiveConfig::default(),
        );
        assert!(res.is_err());
    }
}
