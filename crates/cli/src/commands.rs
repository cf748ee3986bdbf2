use anyhow::Result;
use metafuse_core::config::{AppConfig, ConflictPolicy, ExifMode};
use metafuse_core::{convert, dates, pipeline, report};
use std::io::Write;
use std::path::Path;

/// Command-line overrides layered on top of the loaded configuration.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub exclusive_assets: bool,
    pub exif_mode: Option<ExifMode>,
    pub conflict: Option<ConflictPolicy>,
    pub decoder: Option<String>,
}

impl Overrides {
    pub fn apply(self, cfg: &mut AppConfig) {
        if self.exclusive_assets {
            cfg.matching.allow_shared_assets = false;
        }
        if let Some(mode) = self.exif_mode {
            cfg.fusion.exif_mode = mode;
        }
        if let Some(policy) = self.conflict {
            cfg.archive.conflict = policy;
        }
        if let Some(decoder) = self.decoder {
            cfg.conversion.decoder = decoder;
        }
    }
}

pub fn run_fuse(
    cfg: &AppConfig,
    dir: &Path,
    dry_run: bool,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    if dry_run {
        let planned = pipeline::plan(dir, cfg)?;
        if json {
            writeln!(out, "{}", serde_json::to_string_pretty(&planned)?)?;
        } else {
            for p in &planned {
                match (&p.asset, p.score) {
                    (Some(asset), Some(score)) => writeln!(
                        out,
                        "{} -> {} (score {:.2}{})",
                        p.sidecar,
                        asset,
                        score,
                        if p.needs_conversion { ", convert" } else { "" }
                    )?,
                    _ => writeln!(out, "{} -> no match", p.sidecar)?,
                }
            }
            writeln!(out, "planned: {}", planned.len())?;
        }
        return Ok(());
    }

    let decoder = convert::build_decoder(&cfg.conversion)?;
    let batch = pipeline::run_batch(dir, cfg, decoder.as_ref())?;
    if json {
        let value = serde_json::json!({
            "status": "ok",
            "summary": batch.summary(),
            "outcomes": batch.outcomes,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
    } else {
        writeln!(out, "{}", report::render_text(&batch))?;
    }
    Ok(())
}

pub fn run_convert(cfg: &AppConfig, dir: &Path, json: bool, out: &mut impl Write) -> Result<()> {
    let decoder = convert::build_decoder(&cfg.conversion)?;
    let converted = convert::convert_all(dir, cfg, decoder.as_ref())?;
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&converted)?)?;
    } else {
        writeln!(out, "{}", report::render_conversion(&converted))?;
    }
    Ok(())
}

pub fn run_dates(cfg: &AppConfig, dir: &Path, json: bool, out: &mut impl Write) -> Result<()> {
    let fixed = dates::fix_dates(dir, &cfg.scan)?;
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&fixed)?)?;
    } else {
        writeln!(out, "{}", report::render_dates(&fixed))?;
    }
    Ok(())
}
