//! HEIC to JPEG conversion: decode, flatten to RGB, encode next to the
//! source, then archive the original.

use crate::config::{AppConfig, ConversionConfig};
use crate::error::ConvertError;
use crate::fs_ops;
use crate::fusion::jpeg_exif::{encode_jpeg, insert_exif};
use crate::scanner;
use anyhow::{bail, Context};
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Produces pixels from a HEIC file.
pub trait HeicDecoder {
    fn decode(&self, path: &Path) -> anyhow::Result<DynamicImage>;
}

/// Decodes in-process through libheif.
#[cfg(feature = "libheif")]
pub struct LibheifDecoder {
    lib: libheif_rs::LibHeif,
}

#[cfg(feature = "libheif")]
impl LibheifDecoder {
    pub fn new() -> Self {
        Self {
            lib: libheif_rs::LibHeif::new(),
        }
    }
}

#[cfg(feature = "libheif")]
impl HeicDecoder for LibheifDecoder {
    fn decode(&self, path: &Path) -> anyhow::Result<DynamicImage> {
        use libheif_rs::{ColorSpace, HeifContext, RgbChroma};

        let name = path
            .to_str()
            .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
        let ctx = HeifContext::read_from_file(name)?;
        let handle = ctx.primary_image_handle()?;
        let image = self
            .lib
            .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)?;
        let planes = image.planes();
        let plane = planes
            .interleaved
            .context("decoded image has no interleaved RGB plane")?;

        let row = plane.width as usize * 3;
        let mut pixels = Vec::with_capacity(row * plane.height as usize);
        for y in 0..plane.height as usize {
            let start = y * plane.stride;
            pixels.extend_from_slice(&plane.data[start..start + row]);
        }
        let rgb = image::RgbImage::from_raw(plane.width, plane.height, pixels)
            .context("decoded plane does not match its dimensions")?;
        Ok(DynamicImage::ImageRgb8(rgb))
    }
}

/// Shells out to an external converter that writes PNG, e.g. `heif-convert in.heic out.png`.
pub struct CommandDecoder {
    pub program: String,
}

impl HeicDecoder for CommandDecoder {
    fn decode(&self, path: &Path) -> anyhow::Result<DynamicImage> {
        let out = tempfile::Builder::new().suffix(".png").tempfile()?;
        let output = Command::new(&self.program)
            .arg(path)
            .arg(out.path())
            .output()
            .with_context(|| format!("failed to run {}", self.program))?;
        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        image::open(out.path())
            .with_context(|| format!("{} produced an unreadable PNG", self.program))
    }
}

/// Picks the decoder named by `conversion.decoder`.
pub fn build_decoder(conversion: &ConversionConfig) -> anyhow::Result<Box<dyn HeicDecoder>> {
    let command = || -> Box<dyn HeicDecoder> {
        Box::new(CommandDecoder {
            program: conversion.command.clone(),
        })
    };
    match conversion.decoder.to_lowercase().as_str() {
        #[cfg(feature = "libheif")]
        "auto" | "libheif" => Ok(Box::new(LibheifDecoder::new())),
        #[cfg(not(feature = "libheif"))]
        "auto" => Ok(command()),
        #[cfg(not(feature = "libheif"))]
        "libheif" => bail!("this build has no libheif support; use decoder = \"command\""),
        "command" => Ok(command()),
        other => bail!("unknown HEIC decoder: {other} (expected auto|libheif|command)"),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Converted {
    pub jpeg_path: PathBuf,
    pub archived_path: PathBuf,
}

/// Converts one HEIC file and moves the original into the HEIC archive next to it.
///
/// Fails with [`ConvertError::InvalidFormat`] before touching anything when
/// the extension is not `.heic`. A JPEG written before a failed archive move
/// is left where it is; the item still counts as failed.
pub fn convert_heic(
    path: &Path,
    config: &AppConfig,
    decoder: &dyn HeicDecoder,
) -> Result<Converted, ConvertError> {
    let is_heic = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("heic"))
        .unwrap_or(false);
    if !is_heic {
        return Err(ConvertError::InvalidFormat(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(ConvertError::SourceNotFound(path.to_path_buf()));
    }

    let decoded = match misnamed_raster(path) {
        Some(format) => {
            tracing::debug!(path = %path.display(), ?format, "decoding in-process");
            fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))
                .and_then(|bytes| {
                    image::load_from_memory_with_format(&bytes, format).with_context(|| {
                        format!("{} is not a valid {format:?} image", path.display())
                    })
                })
        }
        None => decoder.decode(path),
    };
    let image = decoded.map_err(|source| ConvertError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let exif = if config.conversion.carry_exif {
        read_exif(path)
    } else {
        None
    };

    let jpeg_path = path.with_extension(&config.conversion.jpeg_extension);
    let encode_err = |source: anyhow::Error| ConvertError::Encode {
        path: jpeg_path.clone(),
        source,
    };
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut bytes = encode_jpeg(&rgb, config.conversion.quality).map_err(encode_err)?;
    if let Some(block) = exif {
        bytes = insert_exif(bytes, &block).map_err(encode_err)?;
    }
    fs::write(&jpeg_path, &bytes)
        .with_context(|| format!("failed to write {}", jpeg_path.display()))
        .map_err(encode_err)?;
    tracing::info!("converted {} to {}", path.display(), jpeg_path.display());

    let archive_dir = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&config.archive.heic_dir);
    let archived_path = fs_ops::move_into(path, &archive_dir, &config.archive).map_err(
        |source| ConvertError::Archive {
            path: path.to_path_buf(),
            source,
        },
    )?;
    tracing::info!("moved {} to {}", path.display(), archived_path.display());

    Ok(Converted {
        jpeg_path,
        archived_path,
    })
}

/// Some exporters write JPEG or PNG data under a `.heic` name.
fn misnamed_raster(path: &Path) -> Option<ImageFormat> {
    match infer::get_from_path(path).ok().flatten()?.mime_type() {
        "image/jpeg" => Some(ImageFormat::Jpeg),
        "image/png" => Some(ImageFormat::Png),
        _ => None,
    }
}

/// Raw EXIF block of the source container, when it carries a readable one.
fn read_exif(path: &Path) -> Option<Vec<u8>> {
    let bytes = fs::read(path).ok()?;
    match exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => Some(exif.buf().to_vec()),
        Err(e) => {
            tracing::debug!(path = %path.display(), "no EXIF carried over: {e}");
            None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertedFile {
    pub name: String,
    pub jpeg_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedConversion {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ConversionReport {
    pub converted: Vec<ConvertedFile>,
    pub failed: Vec<FailedConversion>,
}

/// Converts every top-level HEIC file under `root`, without any metadata fusion.
pub fn convert_all(
    root: &Path,
    config: &AppConfig,
    decoder: &dyn HeicDecoder,
) -> anyhow::Result<ConversionReport> {
    let snapshot = scanner::snapshot(root, &config.scan)?;
    let mut report = ConversionReport::default();

    for asset in snapshot.assets.iter().filter(|a| a.is_heic()) {
        match convert_heic(&asset.path, config, decoder) {
            Ok(done) => report.converted.push(ConvertedFile {
                name: asset.name.clone(),
                jpeg_path: done.jpeg_path.display().to_string(),
            }),
            Err(e) => {
                tracing::warn!("could not convert {}: {e}", asset.name);
                report.failed.push(FailedConversion {
                    name: asset.name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(report)
}
