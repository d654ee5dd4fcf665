//! Local source tree to be pushed.
//!
//! Loading is purely local and happens before any remote call, so a
//! broken tree (no manifest, unreadable files) fails the push phase
//! without consuming a retry.

use crate::error::DeployError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Manifest file every project must carry.
pub const DEFAULT_MANIFEST_FILE: &str = "appsscript.json";

/// File kinds the platform accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileKind {
    ServerJs,
    Html,
    Json,
}

impl FileKind {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "gs" | "js" => Some(FileKind::ServerJs),
            "html" => Some(FileKind::Html),
            _ => None,
        }
    }
}

/// One uploadable file. `name` is the relative path without extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct SourceBundle {
    pub root: PathBuf,
    pub files: Vec<SourceFile>,
    /// Hex SHA-256 over names and contents, in upload order.
    pub digest: String,
}

impl SourceBundle {
    /// Collect the tree under `root`. Dot-directories and unknown
    /// extensions are skipped; the manifest is mandatory.
    pub fn load(root: impl AsRef<Path>, manifest_file: &str) -> Result<Self, DeployError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(DeployError::Validation(format!(
                "source directory {} does not exist",
                root.display()
            )));
        }

        let manifest_path = root.join(manifest_file);
        if !manifest_path.is_file() {
            return Err(DeployError::Validation(format!(
                "missing manifest {} in {}",
                manifest_file,
                root.display()
            )));
        }

        let manifest_src = std::fs::read_to_string(&manifest_path)
            .map_err(|e| DeployError::Validation(format!("failed to read manifest: {}", e)))?;
        serde_json::from_str::<serde_json::Value>(&manifest_src)
            .map_err(|e| DeployError::Validation(format!("manifest is not valid JSON: {}", e)))?;

        let mut files = vec![SourceFile {
            name: strip_extension(manifest_file),
            kind: FileKind::Json,
            source: manifest_src,
        }];

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

        for entry in walker {
            let entry = entry
                .map_err(|e| DeployError::Validation(format!("failed to walk source tree: {}", e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(kind) = path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(FileKind::from_extension)
            else {
                continue;
            };
            let rel = path.strip_prefix(root).unwrap_or(path);
            let name = strip_extension(&rel.to_string_lossy().replace('\\', "/"));
            let source = std::fs::read_to_string(path).map_err(|e| {
                DeployError::Validation(format!("failed to read {}: {}", path.display(), e))
            })?;
            files.push(SourceFile { name, kind, source });
        }

        if files.len() == 1 {
            return Err(DeployError::Validation(format!(
                "no source files found under {}",
                root.display()
            )));
        }

        let digest = digest_files(&files);
        debug!(event = "source.loaded", files = files.len(), %digest);

        Ok(Self {
            root: root.to_path_buf(),
            files,
            digest,
        })
    }
}

fn strip_extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

fn digest_files(files: &[SourceFile]) -> String {
    let mut hasher = Sha256::new();
    for f in files {
        hasher.update(f.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(f.source.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
