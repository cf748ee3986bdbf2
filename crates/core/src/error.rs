//! Error types for conversion, fusion and per-sidecar processing.

use crate::models::OutcomeStatus;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{0} is not a .heic file")]
    InvalidFormat(PathBuf),
    #[error("source not found: {0}")]
    SourceNotFound(PathBuf),
    #[error("failed to decode {path}: {source:#}")]
    Decode {
        path: PathBuf,
        source: anyhow::Error,
    },
    #[error("failed to encode {path}: {source:#}")]
    Encode {
        path: PathBuf,
        source: anyhow::Error,
    },
    #[error("failed to archive {path}: {source:#}")]
    Archive {
        path: PathBuf,
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum FusionError {
    #[error("unsupported format for {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },
    #[error("failed to decode {path}: {source:#}")]
    Decode {
        path: PathBuf,
        source: anyhow::Error,
    },
    #[error("failed to encode {path}: {source:#}")]
    Encode {
        path: PathBuf,
        source: anyhow::Error,
    },
    #[error("failed to write tags into {path}: {source:#}")]
    Tags {
        path: PathBuf,
        source: anyhow::Error,
    },
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Why a single sidecar did not reach the fused state.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("Corresponding media file not found (no match above similarity threshold).")]
    NoMatchFound,
    #[error("HEIC conversion failed: {0}")]
    ConversionFailed(#[from] ConvertError),
    #[error("Fusion failed: {0}")]
    FusionFailed(#[from] FusionError),
    #[error("Unexpected error - {0:#}")]
    Unexpected(#[from] anyhow::Error),
}

impl ItemError {
    pub fn status(&self) -> OutcomeStatus {
        match self {
            ItemError::NoMatchFound => OutcomeStatus::NoMatch,
            ItemError::ConversionFailed(_) => OutcomeStatus::ConversionFailed,
            ItemError::FusionFailed(_) => OutcomeStatus::FusionFailed,
            ItemError::Unexpected(_) => OutcomeStatus::UnexpectedError,
        }
    }
}
