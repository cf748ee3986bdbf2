//! Text-chunk fusion for PNG: every field becomes a `tEXt` chunk keyed by its
//! name, appended after the chunks the file already carries. The colour
//! profile, gamma, chromaticities, sRGB intent, pixel density and eXIf block
//! are written back unchanged.

use super::{to_ascii_json, write_atomically};
use crate::error::FusionError;
use anyhow::Context;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fs;
use std::io::Cursor;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
enum TextChunk {
    Latin1 { keyword: String, text: String },
    Compressed { keyword: String, text: String },
    Utf8 { keyword: String, text: String },
}

struct DecodedPng {
    width: u32,
    height: u32,
    color: png::ColorType,
    depth: png::BitDepth,
    pixels: Vec<u8>,
    text: Vec<TextChunk>,
    ancillary: Ancillary,
}

#[derive(Debug)]
struct Ancillary {
    icc_profile: Option<Vec<u8>>,
    exif: Option<Vec<u8>>,
    gamma: Option<png::ScaledFloat>,
    chromaticities: Option<png::SourceChromaticities>,
    srgb: Option<png::SrgbRenderingIntent>,
    pixel_dims: Option<png::PixelDimensions>,
}

pub fn fuse(path: &Path, fields: &Map<String, Value>) -> Result<(), FusionError> {
    let bytes = fs::read(path).map_err(|source| FusionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = decode(&bytes).map_err(|source| FusionError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let encode_err = |source: anyhow::Error| FusionError::Encode {
        path: path.to_path_buf(),
        source,
    };
    let mut text = decoded.text.clone();
    for (key, value) in fields {
        text.push(TextChunk::Latin1 {
            keyword: key.clone(),
            text: to_ascii_json(value).map_err(encode_err)?,
        });
    }

    let encoded = encode(&decoded, &text).map_err(encode_err)?;
    write_atomically(path, &encoded)
}

fn decode(bytes: &[u8]) -> anyhow::Result<DecodedPng> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND);
    let mut reader = decoder.read_info().context("invalid PNG header")?;
    let mut pixels = vec![0; reader.output_buffer_size()];
    let frame = reader
        .next_frame(&mut pixels)
        .context("failed to decode PNG image data")?;
    pixels.truncate(frame.buffer_size());

    let info = reader.info();
    let mut text = Vec::new();
    for chunk in &info.uncompressed_latin1_text {
        text.push(TextChunk::Latin1 {
            keyword: chunk.keyword.clone(),
            text: chunk.text.clone(),
        });
    }
    for chunk in &info.compressed_latin1_text {
        text.push(TextChunk::Compressed {
            keyword: chunk.keyword.clone(),
            text: chunk.get_text().context("unreadable zTXt chunk")?,
        });
    }
    for chunk in &info.utf8_text {
        text.push(TextChunk::Utf8 {
            keyword: chunk.keyword.clone(),
            text: chunk.get_text().context("unreadable iTXt chunk")?,
        });
    }

    Ok(DecodedPng {
        width: frame.width,
        height: frame.height,
        color: frame.color_type,
        depth: frame.bit_depth,
        pixels,
        text,
        ancillary: Ancillary {
            icc_profile: info.icc_profile.as_ref().map(|p| p.to_vec()),
            exif: exif_chunk(bytes).map(<[u8]>::to_vec),
            gamma: info.source_gamma,
            chromaticities: info.source_chromaticities,
            srgb: info.srgb,
            pixel_dims: info.pixel_dims,
        },
    })
}

/// Payload of the `eXIf` chunk; the decoder does not surface it.
fn exif_chunk(bytes: &[u8]) -> Option<&[u8]> {
    let mut pos = 8;
    while pos + 8 <= bytes.len() {
        let len = u32::from_be_bytes(bytes[pos..pos + 4].try_into().ok()?) as usize;
        let kind = &bytes[pos + 4..pos + 8];
        let data = bytes.get(pos + 8..(pos + 8).checked_add(len)?)?;
        match kind {
            b"eXIf" => return Some(data),
            b"IDAT" | b"IEND" => return None,
            _ => pos += 12 + len,
        }
    }
    None
}

fn encode(decoded: &DecodedPng, text: &[TextChunk]) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut info = png::Info::with_size(decoded.width, decoded.height);
        info.color_type = decoded.color;
        info.bit_depth = decoded.depth;
        let kept = &decoded.ancillary;
        info.icc_profile = kept.icc_profile.clone().map(Cow::Owned);
        info.exif_metadata = kept.exif.clone().map(Cow::Owned);
        info.source_gamma = kept.gamma;
        info.source_chromaticities = kept.chromaticities;
        info.srgb = kept.srgb;
        info.pixel_dims = kept.pixel_dims;
        let mut encoder =
            png::Encoder::with_info(&mut out, info).context("unsupported PNG layout")?;
        for chunk in text {
            let added = match chunk {
                TextChunk::Latin1 { keyword, text } => {
                    encoder.add_text_chunk(keyword.clone(), text.clone())
                }
                TextChunk::Compressed { keyword, text } => {
                    encoder.add_ztxt_chunk(keyword.clone(), text.clone())
                }
                TextChunk::Utf8 { keyword, text } => {
                    encoder.add_itxt_chunk(keyword.clone(), text.clone())
                }
            };
            added.with_context(|| format!("cannot store text chunk {:?}", chunk_keyword(chunk)))?;
        }
        let mut writer = encoder.write_header().context("failed to write PNG header")?;
        writer
            .write_image_data(&decoded.pixels)
            .context("failed to write PNG image data")?;
        writer.finish().context("failed to finish PNG stream")?;
    }
    Ok(out)
}

fn chunk_keyword(chunk: &TextChunk) -> &str {
    match chunk {
        TextChunk::Latin1 { keyword, .. }
        | TextChunk::Compressed { keyword, .. }
        | TextChunk::Utf8 { keyword, .. } => keyword,
    }
}
