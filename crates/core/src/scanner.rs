//! Takes the one-time directory snapshot that a batch matches against.
//!
//! The snapshot is never rescanned during a run: assets converted or consumed
//! mid-batch keep their original entry, so matching stays stable for every
//! sidecar in the listing.

use crate::config::ScanConfig;
use crate::models::{MediaAsset, SidecarEntry};
use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub sidecars: Vec<SidecarEntry>,
    pub assets: Vec<MediaAsset>,
}

/// Lists the top level of `root`, sorted by file name.
pub fn snapshot(root: &Path, scan: &ScanConfig) -> anyhow::Result<Snapshot> {
    let exclude_set = build_globset(&scan.exclude)?;
    let sidecar_ext = scan.sidecar_extension.to_lowercase();
    let media_exts: Vec<String> = scan
        .media_extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    let mut sidecars = Vec::new();
    let mut assets = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry =
            entry.with_context(|| format!("failed to list directory {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if (!scan.include_hidden && is_hidden(path)) || is_excluded(path, &exclude_set) {
            continue;
        }
        let Some(ext) = extension_of(path) else {
            continue;
        };

        if path.file_name().and_then(|n| n.to_str()).is_none() {
            tracing::warn!(path = %path.display(), "skipping file whose name is not valid UTF-8");
            continue;
        }

        if ext == sidecar_ext {
            if let Some(sidecar) = SidecarEntry::from_path(path) {
                sidecars.push(sidecar);
            }
        } else if media_exts.contains(&ext) {
            match MediaAsset::from_path(path) {
                Some(asset) => assets.push(asset),
                None => tracing::debug!(path = %path.display(), "skipping unrecognised media type"),
            }
        }
    }

    tracing::debug!(
        sidecars = sidecars.len(),
        assets = assets.len(),
        "snapshot of {} taken",
        root.display()
    );

    Ok(Snapshot {
        sidecars,
        assets,
    })
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat)?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn is_excluded(path: &Path, excludes: &GlobSet) -> bool {
    let by_name = path
        .file_name()
        .map(|name| excludes.is_match(name))
        .unwrap_or(false);
    by_name || excludes.is_match(path)
}
