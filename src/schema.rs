//! JSON file helpers shared by every loader and writer.
//!
//! All input files (benchmark, answer records, graded results, run logs) are
//! JSON. A file that cannot be read or does not have the expected shape is a
//! [`SchemaError`]; batch scans skip such files, single-file loads surface it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Malformed or unreadable input file
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid schema in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

impl SchemaError {
    /// Build an `Invalid` error for a path
    pub fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// File the error refers to
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. } | Self::Json { path, .. } | Self::Invalid { path, .. } => path,
        }
    }
}

/// Deserialize any JSON value as text: strings as-is, `null` as empty,
/// anything else in its JSON form (`1905` -> `"1905"`).
///
/// # Errors
///
/// Only fails if the input is not valid JSON at all.
pub fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => text,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Read a file to a string, tagging errors with the path
///
/// # Errors
///
/// Returns `SchemaError::Io` if the file cannot be read.
pub fn read_text(path: &Path) -> Result<String, SchemaError> {
    std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read and deserialize a JSON file
///
/// # Errors
///
/// Returns a `SchemaError` if the file cannot be read or does not match `T`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, SchemaError> {
    let content = read_text(path)?;
    serde_json::from_str(&content).map_err(|source| SchemaError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Pretty-print `value` into `<path>.tmp`; the caller renames it into place.
///
/// # Errors
///
/// Returns a `SchemaError` if serialization or the write fails.
pub fn write_json_tmp<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<PathBuf, SchemaError> {
    let tmp_path = tmp_sibling(path);
    let mut body = serde_json::to_string_pretty(value).map_err(|source| SchemaError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    body.push('\n');
    std::fs::write(&tmp_path, body).map_err(|source| SchemaError::Io {
        path: tmp_path.clone(),
        source,
    })?;
    Ok(tmp_path)
}

/// Move a temporary file written by [`write_json_tmp`] into place
///
/// # Errors
///
/// Returns `SchemaError::Io` if the rename fails.
pub fn commit_tmp(tmp_path: &Path, path: &Path) -> Result<(), SchemaError> {
    std::fs::rename(tmp_path, path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write JSON atomically: temp file, then rename
///
/// # Errors
///
/// Returns a `SchemaError` if the write or rename fails.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SchemaError> {
    let tmp_path = write_json_tmp(path, value)?;
    commit_tmp(&tmp_path, path)
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// File stem as an owned string (empty when the path has none)
#[must_use]
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Paths matching a glob pattern, sorted. Unreadable entries are skipped.
///
/// # Errors
///
/// Returns a `glob::PatternError` if the pattern is invalid.
pub fn glob_sorted(pattern: &str) -> Result<Vec<PathBuf>, glob::PatternError> {
    let mut paths: Vec<PathBuf> = glob::glob(pattern)?.filter_map(Result::ok).collect();
    paths.sort();
    Ok(paths)
}

/// Files directly inside `dir` with the given extension, sorted
///
/// # Errors
///
/// Returns a `glob::PatternError` if `dir` contains glob metacharacters that
/// make the pattern invalid.
pub fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, glob::PatternError> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    glob_sorted(&format!("{escaped}/*.{extension}"))
}
