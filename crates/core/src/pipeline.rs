//! The per-sidecar batch: match, convert if HEIC, fuse, archive.
//!
//! Each sidecar runs to completion or failure before the next one starts.
//! Failures are recorded in the returned [`BatchReport`]; only a listing
//! failure before the loop aborts the run.

use crate::config::AppConfig;
use crate::convert::{self, HeicDecoder};
use crate::error::ItemError;
use crate::fusion::{self, Strategy};
use crate::models::{
    MatchCandidate, MediaAsset, MetadataSidecar, OutcomeStatus, ProcessingOutcome, SidecarEntry,
};
use crate::report::BatchReport;
use crate::scanner::{self, Snapshot};
use crate::{fs_ops, matcher};
use serde::Serialize;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Matching,
    Converting,
    Fusing,
    Archiving,
}

struct Fused {
    asset_index: usize,
    asset_path: PathBuf,
    strategy: Strategy,
}

struct Failed {
    error: ItemError,
    asset: Option<PathBuf>,
}

fn failed_at(asset: &Path, error: impl Into<ItemError>) -> Failed {
    Failed {
        error: error.into(),
        asset: Some(asset.to_path_buf()),
    }
}

impl From<ItemError> for Failed {
    fn from(error: ItemError) -> Self {
        Failed { error, asset: None }
    }
}

/// Runs the whole batch over the top level of `root`.
pub fn run_batch(
    root: &Path,
    config: &AppConfig,
    decoder: &dyn HeicDecoder,
) -> anyhow::Result<BatchReport> {
    let snapshot = scanner::snapshot(root, &config.scan)?;
    let sidecar_dir = root.join(&config.archive.sidecar_dir);
    info!(
        sidecars = snapshot.sidecars.len(),
        assets = snapshot.assets.len(),
        "processing {}",
        root.display()
    );

    let mut consumed: HashSet<usize> = HashSet::new();
    let mut report = BatchReport::default();

    for sidecar in &snapshot.sidecars {
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
            process_one(sidecar, &snapshot, &consumed, &sidecar_dir, config, decoder)
        }));

        let outcome = match attempt {
            Ok(Ok(done)) => {
                if !config.matching.allow_shared_assets {
                    consumed.insert(done.asset_index);
                }
                ProcessingOutcome {
                    sidecar_name: sidecar.name.clone(),
                    status: OutcomeStatus::Fused,
                    detail: format!(
                        "Metadata from {} successfully incorporated into {} ({:?}).",
                        sidecar.name,
                        done.asset_path.display(),
                        done.strategy
                    ),
                    asset: Some(done.asset_path.display().to_string()),
                }
            }
            Ok(Err(failed)) => ProcessingOutcome {
                sidecar_name: sidecar.name.clone(),
                status: failed.error.status(),
                detail: failed.error.to_string(),
                asset: failed.asset.map(|p| p.display().to_string()),
            },
            Err(payload) => ProcessingOutcome {
                sidecar_name: sidecar.name.clone(),
                status: OutcomeStatus::UnexpectedError,
                detail: format!("Unexpected error - {}", panic_message(payload.as_ref())),
                asset: None,
            },
        };

        if outcome.status.is_failure() {
            warn!("{}: {}", outcome.sidecar_name, outcome.detail);
        } else {
            info!("{}", outcome.detail);
        }
        report.outcomes.push(outcome);
    }

    let summary = report.summary();
    info!(
        fused = summary.fused,
        failed = summary.failed(),
        "batch finished"
    );
    Ok(report)
}

fn process_one(
    entry: &SidecarEntry,
    snapshot: &Snapshot,
    consumed: &HashSet<usize>,
    sidecar_dir: &Path,
    config: &AppConfig,
    decoder: &dyn HeicDecoder,
) -> Result<Fused, Failed> {
    let sidecar = MetadataSidecar::load(&entry.path).map_err(ItemError::from)?;

    enter(entry, Stage::Matching);
    let (asset_index, candidate) = find_asset(entry, &sidecar.stem, &snapshot.assets, consumed)
        .ok_or(ItemError::NoMatchFound)?;
    let asset = &candidate.asset;
    info!("match found: {} -> {}", entry.name, asset.name);

    let mut working = asset.path.clone();
    if asset.is_heic() {
        enter(entry, Stage::Converting);
        let converted = convert::convert_heic(&asset.path, config, decoder)
            .map_err(|e| failed_at(&asset.path, e))?;
        working = converted.jpeg_path;
    }

    enter(entry, Stage::Fusing);
    let strategy = fusion::fuse(&working, &sidecar.fields, &config.fusion)
        .map_err(|e| failed_at(&working, e))?;

    enter(entry, Stage::Archiving);
    fs_ops::move_into(&entry.path, sidecar_dir, &config.archive)
        .map_err(|e| failed_at(&working, e))?;

    Ok(Fused {
        asset_index,
        asset_path: working,
        strategy,
    })
}

fn enter(entry: &SidecarEntry, stage: Stage) {
    debug!(sidecar = %entry.name, ?stage, "stage");
}

/// Best candidate among assets not yet consumed, with its snapshot index.
fn find_asset(
    entry: &SidecarEntry,
    stem: &str,
    assets: &[MediaAsset],
    consumed: &HashSet<usize>,
) -> Option<(usize, MatchCandidate)> {
    let candidates = assets
        .iter()
        .enumerate()
        .filter(|(i, _)| !consumed.contains(i))
        .map(|(i, a)| (i, a.stem.as_str()));
    let hit = matcher::best_match(stem, candidates)?;
    debug!(score = hit.score, "best candidate for {stem}");
    Some((
        hit.index,
        MatchCandidate {
            sidecar: entry.path.clone(),
            asset: assets[hit.index].clone(),
            score: hit.score,
        },
    ))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// What `run_batch` would pair up, without touching the filesystem.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedMatch {
    pub sidecar: String,
    pub asset: Option<String>,
    pub score: Option<f64>,
    pub needs_conversion: bool,
}

/// Dry run: one entry per sidecar, assuming every match would fuse.
pub fn plan(root: &Path, config: &AppConfig) -> anyhow::Result<Vec<PlannedMatch>> {
    let snapshot = scanner::snapshot(root, &config.scan)?;
    let mut consumed = HashSet::new();
    let mut planned = Vec::with_capacity(snapshot.sidecars.len());

    for entry in &snapshot.sidecars {
        match find_asset(entry, &entry.stem, &snapshot.assets, &consumed) {
            Some((index, candidate)) => {
                if !config.matching.allow_shared_assets {
                    consumed.insert(index);
                }
                planned.push(PlannedMatch {
                    sidecar: entry.name.clone(),
                    asset: Some(candidate.asset.name.clone()),
                    score: Some(candidate.score),
                    needs_conversion: candidate.asset.is_heic(),
                });
            }
            None => planned.push(PlannedMatch {
                sidecar: entry.name.clone(),
                asset: None,
                score: None,
                needs_conversion: false,
            }),
        }
    }
    Ok(planned)
}
