use std::path::Path;

use crate::db::models::VersionRecord;
use crate::db::Store;
use crate::error::{Result, StoreError};
use crate::extract::{annotate_dependencies, Extractor};
use crate::paths::{normalize_path, FileFingerprint};

/// Result of [`Store::load_or_extract`]
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOutcome {
    pub version: VersionRecord,
    /// `true` when the file was unchanged and the latest version was reused
    pub cached: bool,
}

impl Store {
    /// Return the latest version of a workbook, extracting it again only when
    /// the file's contents changed since the last sighting (or `force` is set).
    pub fn load_or_extract(
        &self,
        path: impl AsRef<Path>,
        extractor: &dyn Extractor,
        force: bool,
    ) -> Result<ExtractOutcome> {
        let path = normalize_path(path.as_ref())?;
        let fingerprint = FileFingerprint::read(&path)?
            .ok_or_else(|| StoreError::InvalidPath(format!("{} does not exist", path.display())))?;

        let stored_hash = self.get_workbook(&path)?.and_then(|w| w.content_hash);
        if !force && stored_hash.as_deref() == Some(fingerprint.hash.as_str()) {
            if let Some(version) = self.get_latest_version(&path)? {
                tracing::info!(
                    "{} unchanged, reusing version {}",
                    path.display(),
                    version.version_number
                );
                return Ok(ExtractOutcome {
                    version,
                    cached: true,
                });
            }
        }

        let mut extract = extractor
            .extract(&path)
            .map_err(|e| StoreError::Extraction(format!("{e:#}")))?;
        let graph = annotate_dependencies(&mut extract);
        tracing::info!(
            "Extracted {}: {} chunks, {} dependency edges",
            path.display(),
            extract.chunks.len(),
            graph.edge_count()
        );

        let description = if stored_hash.is_some() {
            "Re-extracted after file change"
        } else {
            "Initial extraction"
        };
        let version_id = self.record_extraction(&path, description, &extract)?;
        let version = self
            .get_version(version_id)?
            .ok_or(StoreError::VersionNotFound(version_id))?;

        Ok(ExtractOutcome {
            version,
            cached: false,
        })
    }
}
