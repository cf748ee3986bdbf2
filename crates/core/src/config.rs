use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub matching: MatchConfig,
    pub conversion: ConversionConfig,
    pub fusion: FusionConfig,
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub media_extensions: Vec<String>,
    pub sidecar_extension: String,
    pub exclude: Vec<String>,
    pub include_hidden: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            media_extensions: ["jpg", "jpeg", "png", "mp4", "mkv", "avi", "mov", "heic"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sidecar_extension: "json".to_string(),
            exclude: Vec::new(),
            include_hidden: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// When false, an asset already fused in this run is withheld from later sidecars.
    pub allow_shared_assets: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            allow_shared_assets: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// `auto`, `libheif` or `command`.
    pub decoder: String,
    /// External program invoked as `<command> <input.heic> <output.png>`.
    pub command: String,
    pub jpeg_extension: String,
    pub quality: u8,
    pub carry_exif: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            decoder: "auto".to_string(),
            command: "heif-convert".to_string(),
            jpeg_extension: "jpeg".to_string(),
            quality: 90,
            carry_exif: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub exif_mode: ExifMode,
    pub jpeg_quality: u8,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            exif_mode: ExifMode::Preserve,
            jpeg_quality: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub sidecar_dir: String,
    pub heic_dir: String,
    pub conflict: ConflictPolicy,
    pub copy_then_delete: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            sidecar_dir: "json_files".to_string(),
            heic_dir: "heic_files".to_string(),
            conflict: ConflictPolicy::Overwrite,
            copy_then_delete: false,
        }
    }
}

/// How JPEG fusion treats the EXIF block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExifMode {
    /// Carry the existing EXIF block forward byte-for-byte.
    #[default]
    Preserve,
    /// Rewrite the primary IFD and store the sidecar document in `UserComment`.
    Embed,
}

impl FromStr for ExifMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "preserve" => Ok(ExifMode::Preserve),
            "embed" => Ok(ExifMode::Embed),
            other => Err(format!("unknown exif mode: {other} (expected preserve|embed)")),
        }
    }
}

impl fmt::Display for ExifMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExifMode::Preserve => f.write_str("preserve"),
            ExifMode::Embed => f.write_str("embed"),
        }
    }
}

/// What to do when an archival folder already holds a file with the same name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    Overwrite,
    Rename,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            "rename" => Ok(ConflictPolicy::Rename),
            other => Err(format!(
                "unknown conflict policy: {other} (expected overwrite|rename)"
            )),
        }
    }
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
