//! Snapshot exporter.
//!
//! Reads every registered dataset inside one transaction so the archive
//! reflects a single moment in time, flattens rows to scalar-only records,
//! filters dangling references, and packs everything into one archive.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::snapshot::archive::{write_archive, ArchiveMetadata, DatasetPayload, FORMAT_VERSION};
use crate::snapshot::flatten::{flatten_row, record_id, select_sql};
use crate::snapshot::registry::{load_order, DATASETS};

/// Capture the full operational dataset into a snapshot archive.
///
/// Read-only; the store is never mutated. Any read or serialization failure
/// aborts the whole export and no partial archive is produced.
pub async fn export(pool: &SqlitePool, actor: &str) -> Result<Vec<u8>, AppError> {
    let operation_id = Uuid::new_v4().to_string();
    tracing::info!(operation_id = %operation_id, actor = %actor, "Starting snapshot export");

    // One transaction for all dataset reads keeps the archive referentially
    // consistent even while ordinary traffic keeps writing.
    let mut tx = pool.begin().await?;

    let mut exported_ids: HashMap<&'static str, HashSet<i64>> = HashMap::new();
    let mut skipped_records: BTreeMap<String, u64> = BTreeMap::new();
    let mut datasets = Vec::with_capacity(DATASETS.len());

    for def in load_order() {
        let rows = sqlx::query(&select_sql(def)).fetch_all(&mut *tx).await?;

        let mut records = Vec::with_capacity(rows.len());
        let mut kept_ids = HashSet::new();
        let mut skipped = 0u64;

        'rows: for row in &rows {
            let record = flatten_row(def, row)?;

            // A record whose parent identifier is absent from the already
            // exported parent dataset cannot be restored; exclude it rather
            // than produce an archive that fails to load. Children of an
            // excluded parent cascade out the same way because kept_ids only
            // holds surviving records.
            for fk in def.parents {
                if let Some(parent_id) = record.get(fk.column).and_then(Value::as_i64) {
                    let parent_has = exported_ids
                        .get(fk.references)
                        .is_some_and(|ids| ids.contains(&parent_id));
                    if !parent_has {
                        skipped += 1;
                        tracing::warn!(
                            dataset = def.name,
                            column = fk.column,
                            parent = fk.references,
                            parent_id,
                            "Excluding record with dangling reference from snapshot"
                        );
                        continue 'rows;
                    }
                }
            }

            if let Some(id) = record_id(def, &record) {
                kept_ids.insert(id);
            }
            records.push(record);
        }

        tracing::debug!(dataset = def.name, rows = records.len(), skipped, "Dataset captured");
        if skipped > 0 {
            skipped_records.insert(def.name.to_string(), skipped);
        }
        exported_ids.insert(def.name, kept_ids);
        datasets.push(DatasetPayload {
            name: def.name,
            records,
        });
    }

    tx.commit().await?;

    let metadata = ArchiveMetadata {
        format_version: FORMAT_VERSION,
        captured_at: Utc::now().to_rfc3339(),
        captured_by: actor.to_string(),
        operation_id: operation_id.clone(),
        skipped_records,
    };

    let bytes = write_archive(&metadata, &datasets)?;
    tracing::info!(
        operation_id = %operation_id,
        datasets = datasets.len(),
        bytes = bytes.len(),
        "Snapshot export complete"
    );

    record_export_audit(pool, actor, &operation_id).await;

    Ok(bytes)
}

/// Best-effort audit entry for an export; never fails the export itself.
async fn record_export_audit(pool: &SqlitePool, actor: &str, operation_id: &str) {
    let result = sqlx::query(
        "INSERT INTO audit_log (user_id, action, detail, created_at)
         VALUES ((SELECT id FROM users WHERE username = ?), 'snapshot.export', ?, ?)",
    )
    .bind(actor)
    .bind(format!("{{\"operationId\":\"{}\"}}", operation_id))
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!("Failed to record export audit entry: {}", e);
    }
}
