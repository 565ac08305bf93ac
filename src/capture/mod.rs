//! Loading capture files from disk.
//!
//! A capture directory holds one JSON document per run. Files that cannot be
//! read or decoded are skipped with a warning so that a single bad capture
//! never hides the rest.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::de::DeserializeOwned;

use crate::error_handling::CaptureError;

/// Result of [`load_captures`].
#[derive(Debug)]
pub struct LoadedCaptures<T> {
    /// Decoded captures, in file name order
    pub items: Vec<T>,
    /// Files that could not be read or decoded
    pub skipped: Vec<PathBuf>,
}

impl<T> LoadedCaptures<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Reads every `*.json` file directly inside `dir` as a `T`.
///
/// # Errors
///
/// Only failing to list `dir` itself is an error.
pub async fn load_captures<T>(dir: &Path) -> Result<LoadedCaptures<T>, CaptureError>
where
    T: DeserializeOwned,
{
    let read_dir_error = |source| CaptureError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_dir_error)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_dir_error)? {
        let path = entry.path();
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut loaded = LoadedCaptures {
        items: Vec::with_capacity(paths.len()),
        skipped: Vec::new(),
    };
    for path in paths {
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Skipping unreadable capture {}: {}", path.display(), e);
                loaded.skipped.push(path);
                continue;
            }
        };
        match serde_json::from_slice::<T>(&contents) {
            Ok(item) => loaded.items.push(item),
            Err(e) => {
                warn!("Skipping malformed capture {}: {}", path.display(), e);
                loaded.skipped.push(path);
            }
        }
    }

    debug!(
        "Loaded {} capture(s) from {} ({} skipped)",
        loaded.items.len(),
        dir.display(),
        loaded.skipped.len()
    );
    Ok(loaded)
}
