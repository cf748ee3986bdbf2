//! JPEG fusion: decode, re-encode, and splice an EXIF block back in.
//!
//! In `preserve` mode the existing block travels through untouched. In `embed`
//! mode the primary IFD is rewritten and the sidecar document lands in
//! `UserComment`.

use super::{to_ascii_json, write_atomically};
use crate::config::{ExifMode, FusionConfig};
use crate::error::FusionError;
use anyhow::{bail, Context};
use exif::experimental::Writer;
use exif::{Field, In, Tag};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageFormat};
use serde_json::{Map, Value};
use std::fs;
use std::io::Cursor;
use std::path::Path;

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const MAX_SEGMENT_PAYLOAD: usize = 65_533;
/// Character-code prefix for an ASCII `UserComment`.
const ASCII_COMMENT: &[u8] = b"ASCII\0\0\0";

pub fn fuse(
    path: &Path,
    fields: &Map<String, Value>,
    fusion: &FusionConfig,
) -> Result<(), FusionError> {
    let bytes = fs::read(path).map_err(|source| FusionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let image = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).map_err(|e| {
        FusionError::Decode {
            path: path.to_path_buf(),
            source: e.into(),
        }
    })?;

    let existing = exif_segment(&bytes);
    let block = match fusion.exif_mode {
        ExifMode::Preserve => existing.map(|b| b.to_vec()),
        ExifMode::Embed => Some(embed_fields(existing, fields).map_err(|source| {
            FusionError::Tags {
                path: path.to_path_buf(),
                source,
            }
        })?),
    };

    let encode_err = |source: anyhow::Error| FusionError::Encode {
        path: path.to_path_buf(),
        source,
    };
    let mut out = encode_jpeg(&image, fusion.jpeg_quality).map_err(encode_err)?;
    if let Some(block) = block {
        out = insert_exif(out, &block).map_err(encode_err)?;
    }
    write_atomically(path, &out)
}

/// Encodes `image` as baseline JPEG. Grayscale stays single-channel, everything else becomes RGB.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    match image {
        DynamicImage::ImageLuma8(gray) => {
            encoder.encode(gray.as_raw(), gray.width(), gray.height(), ColorType::L8)?
        }
        other => {
            let rgb = other.to_rgb8();
            encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?
        }
    }
    Ok(out)
}

/// The TIFF payload of the first `APP1` EXIF segment, if any.
pub fn exif_segment(jpeg: &[u8]) -> Option<&[u8]> {
    if !jpeg.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= jpeg.len() {
        if jpeg[pos] != 0xFF {
            return None;
        }
        let marker = jpeg[pos + 1];
        match marker {
            0xFF => {
                pos += 1;
                continue;
            }
            // Start of scan or end of image: no more metadata segments.
            0xDA | 0xD9 => return None,
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            _ => {}
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let end = pos + 2 + len;
        if len < 2 || end > jpeg.len() {
            return None;
        }
        let payload = &jpeg[pos + 4..end];
        if marker == 0xE1 && payload.starts_with(EXIF_HEADER) {
            return Some(&payload[EXIF_HEADER.len()..]);
        }
        pos = end;
    }
    None
}

/// Splices `tiff` in as an `APP1` segment, after the JFIF header when there is one.
pub fn insert_exif(jpeg: Vec<u8>, tiff: &[u8]) -> anyhow::Result<Vec<u8>> {
    if !jpeg.starts_with(&[0xFF, 0xD8]) {
        bail!("encoded stream does not start with SOI");
    }
    let payload_len = EXIF_HEADER.len() + tiff.len();
    if payload_len > MAX_SEGMENT_PAYLOAD {
        bail!("EXIF block of {} bytes does not fit in one APP1 segment", tiff.len());
    }

    let mut at = 2;
    if jpeg.len() >= 6 && jpeg[2] == 0xFF && jpeg[3] == 0xE0 {
        at = 4 + u16::from_be_bytes([jpeg[4], jpeg[5]]) as usize;
        if at > jpeg.len() {
            bail!("truncated APP0 segment");
        }
    }

    let mut out = Vec::with_capacity(jpeg.len() + payload_len + 4);
    out.extend_from_slice(&jpeg[..at]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload_len + 2) as u16).to_be_bytes());
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(tiff);
    out.extend_from_slice(&jpeg[at..]);
    Ok(out)
}

/// Rebuilds the primary IFD from `existing` and stores `fields` in `UserComment`.
fn embed_fields(existing: Option<&[u8]>, fields: &Map<String, Value>) -> anyhow::Result<Vec<u8>> {
    let mut kept: Vec<Field> = Vec::new();
    let mut little_endian = false;
    if let Some(raw) = existing {
        let exif = exif::Reader::new()
            .read_raw(raw.to_vec())
            .context("existing EXIF block is unreadable")?;
        little_endian = exif.little_endian();
        kept = exif
            .fields()
            .filter(|f| f.ifd_num == In::PRIMARY && is_rewritable(f))
            .cloned()
            .collect();
    }

    let mut comment = ASCII_COMMENT.to_vec();
    let json = to_ascii_json(&Value::Object(fields.clone()))?;
    comment.extend_from_slice(json.as_bytes());
    let user_comment = Field {
        tag: Tag::UserComment,
        ifd_num: In::PRIMARY,
        value: exif::Value::Undefined(comment, 0),
    };

    let mut writer = Writer::new();
    for field in &kept {
        writer.push_field(field);
    }
    writer.push_field(&user_comment);
    let mut out = Cursor::new(Vec::new());
    writer
        .write(&mut out, little_endian)
        .context("failed to serialize EXIF block")?;
    Ok(out.into_inner())
}

fn is_rewritable(field: &Field) -> bool {
    let pointer = [
        Tag::ExifIFDPointer,
        Tag::GPSInfoIFDPointer,
        Tag::InteropIFDPointer,
    ]
    .contains(&field.tag);
    !pointer && field.tag != Tag::UserComment && !matches!(field.value, exif::Value::Unknown(..))
}
