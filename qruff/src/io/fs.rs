/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Whole-file asynchronous read.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::debug;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IoError {
    fn from_io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            ErrorKind::NotFound => IoError::NotFound {
                path: path.to_path_buf(),
            },
            _ => IoError::Read {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Read the whole file at `path`.
///
/// # Errors
/// [`IoError::NotFound`] for a missing file, [`IoError::Read`] for anything
/// else (permissions, a directory, an I/O failure mid-read).
pub async fn read_all(path: impl AsRef<Path>) -> Result<Vec<u8>, IoError> {
    let path = path.as_ref();
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| IoError::from_io(path, e))?;

    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .await
        .map_err(|e| IoError::from_io(path, e))?;

    debug!(path = %path.display(), bytes = contents.len(), "file read");
    Ok(contents)
}

/// [`read_all`] followed by UTF-8 decoding.
pub async fn read_to_string(path: impl AsRef<Path>) -> Result<String, IoError> {
    let path = path.as_ref();
    let bytes = read_all(path).await?;
    String::from_utf8(bytes).map_err(|e| IoError::Read {
        path: path.to_path_buf(),
        source: std::io::Error::new(ErrorKind::InvalidData, e),
    })
}
