//! Content-addressed file layout under the data directory.
//!
//! Uploaded files wait in `incoming/<document id>.<ext>` until the hash step
//! moves them to `documents/<h0h1>/<h2h3>/<hash>.<ext>`. Thumbnails live in a
//! parallel `thumbnails/` tree keyed by the same hash.

use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::document::Document;
use crate::error::StorageError;

/// Move a file from `src` to `dst`. Uses `rename` first and falls back to
/// copy and delete when rename fails across filesystems.
fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Hex-encoded SHA-256 digest of the file, read in chunks.
pub fn hash_file(path: &Path) -> Result<String, StorageError> {
    let read_err = |e| StorageError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = std::fs::File::open(path).map_err(read_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer).map_err(read_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

fn validate_hash(hash: &str) -> Result<(), StorageError> {
    if hash.len() < 4 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(StorageError::InvalidHash(hash.to_string()));
    }
    Ok(())
}

fn with_extension(stem: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) if !ext.is_empty() => format!("{}.{}", stem, ext),
        _ => stem.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a stored file with the given content hash.
    pub fn content_path(&self, hash: &str, extension: Option<&str>) -> Result<PathBuf, StorageError> {
        validate_hash(hash)?;
        Ok(self
            .root
            .join("documents")
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(with_extension(hash, extension)))
    }

    /// Path of the PNG preview for the given content hash.
    pub fn thumbnail_path(&self, hash: &str) -> Result<PathBuf, StorageError> {
        validate_hash(hash)?;
        Ok(self
            .root
            .join("thumbnails")
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(format!("{}.png", hash)))
    }

    /// Where an upload waits before its first hash.
    pub fn incoming_path(&self, document: &Document) -> PathBuf {
        self.root
            .join("incoming")
            .join(with_extension(&document.id, document.extension().as_deref()))
    }

    /// Current backing file of the document.
    pub fn document_path(&self, document: &Document) -> Result<PathBuf, StorageError> {
        if document.hash.is_empty() {
            Ok(self.incoming_path(document))
        } else {
            self.content_path(&document.hash, document.extension().as_deref())
        }
    }

    /// Copies an uploaded file into `incoming/` and records its size.
    pub fn import(&self, source: &Path, document: &mut Document) -> Result<PathBuf, StorageError> {
        let target = self.incoming_path(document);
        if let Some(parent) = target.parent() {
            self.ensure_directory(parent)?;
        }

        let size = std::fs::copy(source, &target).map_err(|e| StorageError::WriteFile {
            path: target.clone(),
            source: e,
        })?;
        document.size = i64::try_from(size).unwrap_or(i64::MAX);
        Ok(target)
    }

    /// Moves the document's file to the location of `new_hash` and returns
    /// the new path. A file already present there is identical content and
    /// is kept; the source is removed.
    pub fn relocate(&self, document: &Document, new_hash: &str) -> Result<PathBuf, StorageError> {
        let from = self.document_path(document)?;
        let to = self.content_path(new_hash, document.extension().as_deref())?;
        if from == to {
            return Ok(to);
        }

        if let Some(parent) = to.parent() {
            self.ensure_directory(parent)?;
        }

        if to.exists() {
            log::debug!("Content {} already stored, dropping duplicate", new_hash);
            std::fs::remove_file(&from).map_err(|e| StorageError::MoveFile {
                from: from.clone(),
                to: to.clone(),
                source: e,
            })?;
        } else {
            move_file(&from, &to)?;
        }
        Ok(to)
    }

    /// Puts a copy of the `new_hash` content back at the document's current
    /// path, undoing [`relocate`](Self::relocate). The content file stays
    /// since other documents may share it.
    pub fn restore(&self, document: &Document, new_hash: &str) -> Result<PathBuf, StorageError> {
        let from = self.content_path(new_hash, document.extension().as_deref())?;
        let to = self.document_path(document)?;
        if from == to || to.exists() {
            return Ok(to);
        }

        if let Some(parent) = to.parent() {
            self.ensure_directory(parent)?;
        }
        std::fs::copy(&from, &to).map_err(|e| StorageError::WriteFile {
            path: to.clone(),
            source: e,
        })?;
        Ok(to)
    }

    pub fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}
