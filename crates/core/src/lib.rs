//! Core library: directory snapshot, sidecar matching, HEIC conversion,
//! metadata fusion and batch reporting.

pub mod config;
pub mod convert;
pub mod dates;
pub mod error;
pub mod fs_ops;
pub mod fusion;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod scanner;

#[cfg(test)]
mod fixtures;
