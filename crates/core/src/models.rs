use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    StillImage,
    Video,
}

impl MediaKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "heic" => Some(MediaKind::StillImage),
            "mp4" | "mkv" | "avi" | "mov" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// A media file captured in the directory snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub name: String,
    pub stem: String,
    /// Lowercased, without the leading dot.
    pub extension: String,
    pub kind: MediaKind,
}

impl MediaAsset {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_string();
        let extension = path.extension()?.to_str()?.to_lowercase();
        let kind = MediaKind::from_extension(&extension)?;
        let stem = file_stem(path);
        Some(Self {
            path: path.to_path_buf(),
            name,
            stem,
            extension,
            kind,
        })
    }

    pub fn is_heic(&self) -> bool {
        self.extension == "heic"
    }
}

/// A sidecar file listed in the snapshot; its fields are read when the item is processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarEntry {
    pub path: PathBuf,
    pub name: String,
    pub stem: String,
}

impl SidecarEntry {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_string();
        Some(Self {
            path: path.to_path_buf(),
            name,
            stem: file_stem(path),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MetadataSidecar {
    pub stem: String,
    pub fields: Map<String, Value>,
}

impl MetadataSidecar {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read sidecar {}", path.display()))?;
        let doc: Value = serde_json::from_str(&raw)
            .with_context(|| format!("invalid JSON in {}", path.display()))?;
        let Value::Object(fields) = doc else {
            anyhow::bail!("{} does not hold a JSON object", path.display());
        };
        Ok(Self {
            stem: file_stem(path),
            fields,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchCandidate {
    pub sidecar: PathBuf,
    pub asset: MediaAsset,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Fused,
    NoMatch,
    ConversionFailed,
    FusionFailed,
    UnexpectedError,
}

impl OutcomeStatus {
    pub fn is_failure(&self) -> bool {
        !matches!(self, OutcomeStatus::Fused)
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OutcomeStatus::Fused => "fused",
            OutcomeStatus::NoMatch => "no_match",
            OutcomeStatus::ConversionFailed => "conversion_failed",
            OutcomeStatus::FusionFailed => "fusion_failed",
            OutcomeStatus::UnexpectedError => "unexpected_error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    pub sidecar_name: String,
    pub status: OutcomeStatus,
    pub detail: String,
    /// Final asset path for fused items, the matched asset for later-stage failures.
    pub asset: Option<String>,
}

/// Filename without its last extension, matching what the export tools emit.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
