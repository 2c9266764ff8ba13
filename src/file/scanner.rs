// ncm-core - NCM container decoder
// Copyright (C) 2025 ncm-core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Discovery of container files on disk
//!
//! Candidates are picked by the `.ncm` extension (any case) during the
//! directory walk. [`is_container_file`] confirms a single file by its
//! signature when the extension is not trusted.

use crate::container::section::fill_window;
use crate::container::MAGIC;
use crate::error::{NcmError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File extension of containers
pub const CONTAINER_EXTENSION: &str = "ncm";

/// Check whether `path` starts with the container signature
///
/// Files shorter than the signature are not containers.
///
/// # Errors
/// - SourceReadError if the file cannot be opened or read
pub fn is_container_file(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 8];
    if fill_window(&mut file, &mut magic)? < magic.len() {
        return Ok(false);
    }
    Ok(&magic == MAGIC)
}

/// Check if file has the container extension
pub fn has_container_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(CONTAINER_EXTENSION))
        .unwrap_or(false)
}

/// List container files in `directory`, sorted by path
///
/// # Errors
/// - InvalidPath if `directory` does not exist or is not a directory
/// - SourceReadError if a directory cannot be listed
pub async fn scan_for_containers(directory: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let metadata = fs::metadata(directory).await.map_err(|_| {
        NcmError::InvalidPath(format!("Directory does not exist: {}", directory.display()))
    })?;
    if !metadata.is_dir() {
        return Err(NcmError::InvalidPath(format!(
            "Path is not a directory: {}",
            directory.display()
        )));
    }

    let mut found = Vec::new();
    scan_recursive(directory, recursive, &mut found).await?;
    found.sort();

    debug!(directory = %directory.display(), count = found.len(), "scan finished");
    Ok(found)
}

fn scan_recursive<'a>(
    dir: &'a Path,
    recursive: bool,
    found: &'a mut Vec<PathBuf>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                if recursive {
                    scan_recursive(&path, recursive, found).await?;
                }
            } else if has_container_extension(&path) {
                found.push(path);
            }
        }

        Ok(())
    })
}
