//! Container-tag fusion for MP4-family videos through the `ilst` tag table.
//!
//! Each field becomes a freeform `----` atom under the iTunes namespace, so
//! arbitrary keys survive without colliding with the well-known atoms.

use super::tag_value;
use crate::error::FusionError;
use anyhow::Context;
use lofty::config::{ParseOptions, WriteOptions};
use lofty::file::AudioFile;
use lofty::mp4::{Atom, AtomData, AtomIdent, Ilst, Mp4File};
use lofty::tag::TagExt;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fs::File;
use std::path::Path;

const FREEFORM_MEAN: &str = "com.apple.iTunes";

pub fn fuse(path: &Path, fields: &Map<String, Value>) -> Result<(), FusionError> {
    let mut ilst = open_tag_table(path).map_err(|source| FusionError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    for (key, value) in fields {
        ilst.replace_atom(Atom::new(
            freeform_ident(key),
            AtomData::UTF8(tag_value(value)),
        ));
    }

    ilst.save_to_path(path, WriteOptions::default())
        .map_err(|e| FusionError::Tags {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
    tracing::debug!(path = %path.display(), tags = fields.len(), "container tags written");
    Ok(())
}

/// Freeform tags stored under the iTunes namespace, keyed by name.
#[cfg(test)]
pub fn read_tags(path: &Path) -> anyhow::Result<std::collections::BTreeMap<String, String>> {
    let ilst = open_tag_table(path)?;
    let mut tags = std::collections::BTreeMap::new();
    for atom in ilst {
        let AtomIdent::Freeform { mean, name } = atom.ident() else {
            continue;
        };
        if mean != FREEFORM_MEAN {
            continue;
        }
        let name = name.to_string();
        for data in atom.data() {
            if let AtomData::UTF8(text) = data {
                tags.insert(name.clone(), text.clone());
            }
        }
    }
    Ok(tags)
}

/// The file's tag table, or an empty one when it carries none.
fn open_tag_table(path: &Path) -> anyhow::Result<Ilst> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mp4 = Mp4File::read_from(&mut file, ParseOptions::new().read_properties(false))
        .with_context(|| format!("{} is not a readable MP4 container", path.display()))?;
    Ok(mp4.ilst().cloned().unwrap_or_default())
}

fn freeform_ident(key: &str) -> AtomIdent<'static> {
    AtomIdent::Freeform {
        mean: Cow::Borrowed(FREEFORM_MEAN),
        name: Cow::Owned(key.to_string()),
    }
}
