//! Writes sidecar fields into an asset's own metadata container.
//!
//! Still images are routed by their actual content (a `.jpg` holding PNG
//! data takes the PNG path); videos go through the container tag table.

pub mod jpeg_exif;
pub mod png_text;
pub mod video_tags;

use crate::config::FusionConfig;
use crate::error::FusionError;
use crate::models::MediaKind;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One text chunk per field, value JSON-encoded.
    PngText,
    /// Re-encode, carrying the EXIF block forward.
    JpegExif,
    /// One container tag per field, value stringified.
    VideoTags,
}

/// Fuses `fields` into the file at `path` and reports which strategy ran.
pub fn fuse(
    path: &Path,
    fields: &Map<String, Value>,
    fusion: &FusionConfig,
) -> Result<Strategy, FusionError> {
    let strategy = select_strategy(path)?;
    tracing::debug!(path = %path.display(), ?strategy, fields = fields.len(), "fusing");
    match strategy {
        Strategy::PngText => png_text::fuse(path, fields)?,
        Strategy::JpegExif => jpeg_exif::fuse(path, fields, fusion)?,
        Strategy::VideoTags => video_tags::fuse(path, fields)?,
    }
    Ok(strategy)
}

pub fn select_strategy(path: &Path) -> Result<Strategy, FusionError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let unsupported = |reason: &str| FusionError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    match MediaKind::from_extension(&ext) {
        Some(MediaKind::Video) => Ok(Strategy::VideoTags),
        Some(MediaKind::StillImage) => {
            let sniffed = infer::get_from_path(path).map_err(|source| FusionError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            match sniffed.map(|t| t.mime_type()) {
                Some("image/png") => Ok(Strategy::PngText),
                Some("image/jpeg") => Ok(Strategy::JpegExif),
                Some("image/heif") | Some("image/heic") => {
                    Err(unsupported("HEIC data must be converted before fusion"))
                }
                Some(other) => Err(unsupported(&format!("content is {other}"))),
                // Unrecognised bytes: let the extension's decoder report the cause.
                None => match ext.as_str() {
                    "png" => Ok(Strategy::PngText),
                    "jpg" | "jpeg" => Ok(Strategy::JpegExif),
                    _ => Err(unsupported("HEIC data must be converted before fusion")),
                },
            }
        }
        None => Err(unsupported(&format!("unknown extension {ext:?}"))),
    }
}

/// JSON with `", "` and `": "` separators and every non-ASCII character
/// escaped as `\uXXXX`, the shape `json.dumps` gives by default.
pub fn to_ascii_json(value: &Value) -> anyhow::Result<String> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, SpacedAscii);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8(out)?)
}

struct SpacedAscii;

impl serde_json::ser::Formatter for SpacedAscii {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> std::io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> std::io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> std::io::Result<()>
    where
        W: ?Sized + Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> std::io::Result<()>
    where
        W: ?Sized + Write,
    {
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Plain string form used for container tags: strings verbatim, everything else as JSON.
pub fn tag_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replaces `path` with `bytes` through a sibling temp file so readers never see a partial write.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), FusionError> {
    let io_err = |source: std::io::Error| FusionError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
