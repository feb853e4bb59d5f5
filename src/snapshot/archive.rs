//! Snapshot archive container: one ZIP holding a metadata section plus one
//! JSON section per registered dataset.
//!
//! Records are encoded field-named (JSON objects, not positional arrays) so
//! forward/backward field additions don't break parsing. Validation confirms
//! the container is structurally complete before any store mutation happens;
//! row-level referential integrity is enforced later by load order and the
//! database's foreign-key constraints.

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Write};

use serde::{Deserialize, Serialize};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::AppError;
use crate::snapshot::flatten::FlatRecord;
use crate::snapshot::registry::DATASETS;

/// Archive format version; bumped on incompatible layout changes.
pub const FORMAT_VERSION: u32 = 1;

/// Name of the metadata entry inside the archive.
pub const METADATA_ENTRY: &str = "metadata.json";

/// Archive entry name for a dataset.
pub fn dataset_entry(name: &str) -> String {
    format!("datasets/{}.json", name)
}

/// Metadata section of a snapshot archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    pub format_version: u32,
    /// Capture time, RFC 3339.
    pub captured_at: String,
    /// Identity of the actor who requested the export.
    pub captured_by: String,
    /// Correlation id shared with log lines and audit entries.
    pub operation_id: String,
    /// Per-dataset counts of records excluded for dangling references.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub skipped_records: BTreeMap<String, u64>,
}

/// One dataset's flattened records, ready for packing.
#[derive(Debug)]
pub struct DatasetPayload {
    pub name: &'static str,
    pub records: Vec<FlatRecord>,
}

/// A snapshot archive that passed structural validation.
#[derive(Debug)]
pub struct ValidatedArchive {
    pub metadata: ArchiveMetadata,
    pub datasets: HashMap<&'static str, Vec<FlatRecord>>,
}

/// Pack metadata and datasets into a compressed archive.
pub fn write_archive(
    metadata: &ArchiveMetadata,
    datasets: &[DatasetPayload],
) -> Result<Vec<u8>, AppError> {
    let mut cursor = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut cursor);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(METADATA_ENTRY, options)
        .map_err(write_error)?;
    let metadata_bytes = serde_json::to_vec_pretty(metadata)
        .map_err(|e| AppError::Internal(format!("Failed to serialize metadata: {}", e)))?;
    zip.write_all(&metadata_bytes)
        .map_err(|e| AppError::Internal(format!("Failed to write archive: {}", e)))?;

    for payload in datasets {
        zip.start_file(dataset_entry(payload.name), options)
            .map_err(write_error)?;
        let bytes = serde_json::to_vec(&payload.records).map_err(|e| {
            AppError::Internal(format!(
                "Failed to serialize dataset {}: {}",
                payload.name, e
            ))
        })?;
        zip.write_all(&bytes)
            .map_err(|e| AppError::Internal(format!("Failed to write archive: {}", e)))?;
    }

    zip.finish().map_err(write_error)?;
    Ok(cursor.into_inner())
}

fn write_error(err: ZipError) -> AppError {
    AppError::Internal(format!("Failed to write archive: {}", err))
}

/// Open and structurally validate a snapshot archive.
///
/// No mutation occurs here. Missing datasets are reported as the exact list
/// of missing names; entries the registry doesn't know are tolerated for
/// forward compatibility.
pub fn validate(bytes: &[u8]) -> Result<ValidatedArchive, AppError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AppError::structural(format!("Not a readable snapshot archive: {}", e)))?;

    let metadata: ArchiveMetadata = {
        let mut entry = match archive.by_name(METADATA_ENTRY) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                return Err(AppError::structural("Archive has no metadata section"));
            }
            Err(e) => {
                return Err(AppError::structural(format!(
                    "Cannot read archive metadata: {}",
                    e
                )));
            }
        };
        let mut raw = String::new();
        entry
            .read_to_string(&mut raw)
            .map_err(|e| AppError::structural(format!("Cannot read archive metadata: {}", e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| AppError::structural(format!("Archive metadata is malformed: {}", e)))?
    };

    if metadata.format_version > FORMAT_VERSION {
        return Err(AppError::structural(format!(
            "Unsupported archive format version {} (supported up to {})",
            metadata.format_version, FORMAT_VERSION
        )));
    }

    let mut datasets = HashMap::with_capacity(DATASETS.len());
    let mut missing = Vec::new();

    for def in DATASETS {
        let mut entry = match archive.by_name(&dataset_entry(def.name)) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                missing.push(def.name.to_string());
                continue;
            }
            Err(e) => {
                return Err(AppError::structural(format!(
                    "Cannot read dataset {}: {}",
                    def.name, e
                )));
            }
        };

        let mut raw = String::new();
        entry.read_to_string(&mut raw).map_err(|e| {
            AppError::structural(format!("Cannot read dataset {}: {}", def.name, e))
        })?;
        let records: Vec<FlatRecord> = serde_json::from_str(&raw).map_err(|e| {
            AppError::structural(format!("Dataset {} is malformed: {}", def.name, e))
        })?;

        datasets.insert(def.name, records);
    }

    if !missing.is_empty() {
        return Err(AppError::Structural {
            message: format!("Archive is missing required datasets: {}", missing.join(", ")),
            missing_datasets: missing,
        });
    }

    Ok(ValidatedArchive { metadata, datasets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::codes;
    use serde_json::json;

    fn sample_metadata() -> ArchiveMetadata {
        ArchiveMetadata {
            format_version: FORMAT_VERSION,
            captured_at: "2026-01-01T00:00:00Z".to_string(),
            captured_by: "tester".to_string(),
            operation_id: "00000000-0000-0000-0000-000000000000".to_string(),
            skipped_records: BTreeMap::new(),
        }
    }

    fn empty_payloads() -> Vec<DatasetPayload> {
        DATASETS
            .iter()
            .map(|def| DatasetPayload {
                name: def.name,
                records: Vec::new(),
            })
            .collect()
    }

    #[test]
    fn test_round_trip_empty_archive() {
        let bytes = write_archive(&sample_metadata(), &empty_payloads()).unwrap();
        let validated = validate(&bytes).unwrap();

        assert_eq!(validated.metadata.captured_by, "tester");
        assert_eq!(validated.datasets.len(), DATASETS.len());
        assert!(validated.datasets.values().all(|v| v.is_empty()));
    }

    #[test]
    fn test_garbage_container_rejected() {
        let err = validate(b"this is not a zip archive").unwrap_err();
        assert_eq!(err.error_code(), codes::STRUCTURAL_ERROR);
    }

    #[test]
    fn test_missing_dataset_rejected_with_names() {
        // Each dataset must be rejected identically regardless of which one
        // is missing.
        for skipped in ["settings", "orders", "audit_log"] {
            let payloads: Vec<_> = empty_payloads()
                .into_iter()
                .filter(|p| p.name != skipped)
                .collect();
            let bytes = write_archive(&sample_metadata(), &payloads).unwrap();

            match validate(&bytes).unwrap_err() {
                AppError::Structural {
                    missing_datasets, ..
                } => assert_eq!(missing_datasets, vec![skipped.to_string()]),
                other => panic!("expected structural error, got {}", other),
            }
        }
    }

    #[test]
    fn test_missing_metadata_rejected() {
        // A container with datasets but no metadata section is incomplete.
        let mut cursor = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();
        for def in DATASETS {
            zip.start_file(dataset_entry(def.name), options).unwrap();
            zip.write_all(b"[]").unwrap();
        }
        zip.finish().unwrap();

        let err = validate(&cursor.into_inner()).unwrap_err();
        assert_eq!(err.error_code(), codes::STRUCTURAL_ERROR);
        assert!(err.message().contains("metadata"));
    }

    #[test]
    fn test_malformed_dataset_rejected() {
        let mut payloads = empty_payloads();
        let bytes = write_archive(&sample_metadata(), &payloads).unwrap();

        // Rebuild the archive with one dataset replaced by invalid JSON.
        let mut archive = ZipArchive::new(Cursor::new(&bytes[..])).unwrap();
        let mut cursor = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            let name = entry.name().to_string();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            if name == dataset_entry("payments") {
                content = b"{not json".to_vec();
            }
            zip.start_file(name, options).unwrap();
            zip.write_all(&content).unwrap();
        }
        zip.finish().unwrap();

        let err = validate(&cursor.into_inner()).unwrap_err();
        assert_eq!(err.error_code(), codes::STRUCTURAL_ERROR);
        assert!(err.message().contains("payments"));

        // Sanity: a well-formed record still validates.
        payloads
            .iter_mut()
            .find(|p| p.name == "roles")
            .unwrap()
            .records
            .push(
                json!({ "id": 1, "name": "admin" })
                    .as_object()
                    .unwrap()
                    .clone(),
            );
        let bytes = write_archive(&sample_metadata(), &payloads).unwrap();
        let validated = validate(&bytes).unwrap();
        assert_eq!(validated.datasets["roles"].len(), 1);
    }

    #[test]
    fn test_future_format_version_rejected() {
        let mut metadata = sample_metadata();
        metadata.format_version = FORMAT_VERSION + 1;
        let bytes = write_archive(&metadata, &empty_payloads()).unwrap();

        let err = validate(&bytes).unwrap_err();
        assert_eq!(err.error_code(), codes::STRUCTURAL_ERROR);
        assert!(err.message().contains("format version"));
    }

    #[test]
    fn test_unknown_extra_entries_tolerated() {
        let bytes = write_archive(&sample_metadata(), &empty_payloads()).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(&bytes[..])).unwrap();
        let mut cursor = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            let name = entry.name().to_string();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            zip.start_file(name, options).unwrap();
            zip.write_all(&content).unwrap();
        }
        zip.start_file("datasets/future_dataset.json", options)
            .unwrap();
        zip.write_all(b"[]").unwrap();
        zip.finish().unwrap();

        assert!(validate(&cursor.into_inner()).is_ok());
    }
}
