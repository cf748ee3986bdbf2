//! Capture-date lookup and filesystem timestamp repair.
//!
//! Stills read `DateTimeOriginal` from EXIF; MP4/MOV read the `mvhd`
//! creation time. Dates are handled as local wall-clock time throughout.

use crate::config::ScanConfig;
use crate::models::MediaKind;
use crate::scanner;
use anyhow::{bail, Context};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use exif::{In, Tag};
use filetime::FileTime;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";
/// Seconds between 1904-01-01 (QuickTime epoch) and 1970-01-01.
const MP4_EPOCH_OFFSET: u64 = 2_082_844_800;
const DATED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "mp4", "mov"];

/// `DateTimeOriginal` from the image's EXIF block; `None` when the block or tag is absent.
pub fn image_date_taken(path: &Path) -> anyhow::Result<Option<NaiveDateTime>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let exif = match exif::Reader::new().read_from_container(&mut BufReader::new(file)) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("unreadable EXIF in {}", path.display()))
        }
    };
    let Some(field) = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY) else {
        return Ok(None);
    };
    let exif::Value::Ascii(parts) = &field.value else {
        return Ok(None);
    };
    let Some(raw) = parts.first() else {
        return Ok(None);
    };
    let text = std::str::from_utf8(raw)
        .context("DateTimeOriginal is not ASCII")?
        .trim_end_matches('\0')
        .trim();
    let taken = NaiveDateTime::parse_from_str(text, EXIF_DATE_FORMAT)
        .with_context(|| format!("malformed DateTimeOriginal {text:?}"))?;
    Ok(Some(taken))
}

/// Creation time from the movie header, in local time; `None` when unset.
pub fn video_creation_date(path: &Path) -> anyhow::Result<Option<NaiveDateTime>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let end = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let Some((moov_start, moov_len)) = find_box(&mut reader, 0, end, b"moov")? else {
        return Ok(None);
    };
    let Some((mvhd_start, _)) = find_box(&mut reader, moov_start, moov_start + moov_len, b"mvhd")?
    else {
        return Ok(None);
    };

    reader.seek(SeekFrom::Start(mvhd_start))?;
    let mut version = [0u8; 4];
    reader.read_exact(&mut version)?;
    let created = if version[0] == 1 {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        u64::from_be_bytes(buf)
    } else {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        u32::from_be_bytes(buf) as u64
    };
    if created == 0 || created < MP4_EPOCH_OFFSET {
        return Ok(None);
    }

    let unix = i64::try_from(created - MP4_EPOCH_OFFSET).context("creation time out of range")?;
    let utc = DateTime::from_timestamp(unix, 0).context("creation time out of range")?;
    Ok(Some(utc.with_timezone(&Local).naive_local()))
}

/// Finds the first `kind` box in `[start, end)`; returns its body offset and length.
fn find_box<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    end: u64,
    kind: &[u8; 4],
) -> anyhow::Result<Option<(u64, u64)>> {
    let mut pos = start;
    while pos + 8 <= end {
        reader.seek(SeekFrom::Start(pos))?;
        let mut header = [0u8; 8];
        reader.read_exact(&mut header)?;
        let mut size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let mut header_len = 8;
        if size == 1 {
            let mut large = [0u8; 8];
            reader.read_exact(&mut large)?;
            size = u64::from_be_bytes(large);
            header_len = 16;
        } else if size == 0 {
            size = end - pos;
        }
        if size < header_len || pos.checked_add(size).map_or(true, |stop| stop > end) {
            bail!("malformed box at offset {pos}");
        }
        if &header[4..8] == kind {
            return Ok(Some((pos + header_len, size - header_len)));
        }
        pos += size;
    }
    Ok(None)
}

/// Sets access and modification times, reading `when` as local time.
pub fn set_file_times(path: &Path, when: NaiveDateTime) -> anyhow::Result<()> {
    let local = Local
        .from_local_datetime(&when)
        .earliest()
        .with_context(|| format!("{when} does not exist in the local time zone"))?;
    let stamp = FileTime::from_unix_time(local.timestamp(), local.timestamp_subsec_nanos());
    filetime::set_file_times(path, stamp, stamp)
        .with_context(|| format!("failed to set times on {}", path.display()))
}

#[derive(Debug, Clone, Serialize)]
pub struct DatedFile {
    pub name: String,
    pub date: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDate {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct DateFixReport {
    pub updated: Vec<DatedFile>,
    pub missing_metadata: Vec<String>,
    pub failed: Vec<FailedDate>,
}

/// Stamps every top-level still or MP4/MOV under `root` with its capture date.
pub fn fix_dates(root: &Path, scan: &ScanConfig) -> anyhow::Result<DateFixReport> {
    let snapshot = scanner::snapshot(root, scan)?;
    let mut report = DateFixReport::default();

    for asset in snapshot
        .assets
        .iter()
        .filter(|a| DATED_EXTENSIONS.contains(&a.extension.as_str()))
    {
        let found = match asset.kind {
            MediaKind::StillImage => image_date_taken(&asset.path),
            MediaKind::Video => video_creation_date(&asset.path),
        };
        let outcome = found.and_then(|date| match date {
            Some(date) => set_file_times(&asset.path, date).map(|_| Some(date)),
            None => Ok(None),
        });
        match outcome {
            Ok(Some(date)) => {
                tracing::info!("updated creation date for {} to {date}", asset.name);
                report.updated.push(DatedFile {
                    name: asset.name.clone(),
                    date,
                });
            }
            Ok(None) => {
                tracing::warn!("{}: missing creation metadata", asset.name);
                report.missing_metadata.push(asset.name.clone());
            }
            Err(e) => {
                tracing::warn!("{}: {e:#}", asset.name);
                report.failed.push(FailedDate {
                    name: asset.name.clone(),
                    reason: format!("{e:#}"),
                });
            }
        }
    }
    Ok(report)
}
