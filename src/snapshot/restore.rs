//! Snapshot restore pipeline.
//!
//! Precondition guard, destructive reset, bulk load, and identity
//! resynchronization all run inside one transaction: the store either ends
//! exactly matching the archive or provably unchanged. Outcome recording runs
//! after the transaction settles and is best-effort by contract.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};

use crate::errors::AppError;
use crate::models::OrderStatus;
use crate::snapshot::archive::{validate, ValidatedArchive};
use crate::snapshot::flatten::{batch_rows, bind_column, insert_prefix};
use crate::snapshot::registry::{load_order, reset_order, DatasetDef, DATASETS};

/// Result of a successful restore, returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
    pub datasets: usize,
    pub rows_loaded: u64,
    /// When the restored archive was captured.
    pub captured_at: String,
    /// Who captured the restored archive.
    pub captured_by: String,
    /// Correlation id of the original export.
    pub operation_id: String,
}

/// Destructively replace the entire operational dataset with the archive.
///
/// The attempt is atomic; the subsequent audit/notification recording is not
/// part of that guarantee and can never fail the restore.
pub async fn restore(
    pool: &SqlitePool,
    archive_bytes: &[u8],
    actor: &str,
) -> Result<RestoreSummary, AppError> {
    let result = attempt_restore(pool, archive_bytes, actor).await;
    record_outcome(pool, actor, &result).await;
    result
}

async fn attempt_restore(
    pool: &SqlitePool,
    archive_bytes: &[u8],
    actor: &str,
) -> Result<RestoreSummary, AppError> {
    // Structural validation happens before any mutation.
    let archive = validate(archive_bytes)?;
    tracing::info!(
        operation_id = %archive.metadata.operation_id,
        captured_at = %archive.metadata.captured_at,
        actor = %actor,
        "Starting snapshot restore"
    );

    let mut tx = pool.begin().await?;

    // The guard runs in the same transaction as the reset, so no open order
    // can appear between check and act.
    guard_no_open_orders(&mut tx).await?;
    reset_all(&mut tx).await?;
    let rows_loaded = load_all(&mut tx, &archive).await?;
    resync_identities(&mut tx).await?;

    tx.commit().await?;

    tracing::info!(
        operation_id = %archive.metadata.operation_id,
        rows_loaded,
        "Snapshot restore complete"
    );

    Ok(RestoreSummary {
        datasets: DATASETS.len(),
        rows_loaded,
        captured_at: archive.metadata.captured_at.clone(),
        captured_by: archive.metadata.captured_by.clone(),
        operation_id: archive.metadata.operation_id.clone(),
    })
}

/// Refuse to destroy in-flight business state.
async fn guard_no_open_orders(tx: &mut Transaction<'_, Sqlite>) -> Result<(), AppError> {
    let sql = format!(
        "SELECT COUNT(*) AS open_count FROM orders WHERE status NOT IN ('{}', '{}')",
        OrderStatus::Paid.as_str(),
        OrderStatus::Cancelled.as_str()
    );
    let row = sqlx::query(&sql).fetch_one(&mut **tx).await?;
    let open_count: i64 = row.get("open_count");

    if open_count > 0 {
        return Err(AppError::Precondition(format!(
            "{} open order(s) must be finalized or cancelled before a restore",
            open_count
        )));
    }
    Ok(())
}

/// Empty every managed table, children before parents, and clear the
/// identifier generators.
async fn reset_all(tx: &mut Transaction<'_, Sqlite>) -> Result<(), AppError> {
    for def in reset_order() {
        sqlx::query(&format!("DELETE FROM {}", def.name))
            .execute(&mut **tx)
            .await?;

        if def.id_column.is_some() {
            sqlx::query("DELETE FROM sqlite_sequence WHERE name = ?")
                .bind(def.name)
                .execute(&mut **tx)
                .await?;
        }
        tracing::debug!(dataset = def.name, "Table reset");
    }
    Ok(())
}

/// Insert every dataset's records, parents before children, preserving the
/// original identifiers from the archive.
async fn load_all(
    tx: &mut Transaction<'_, Sqlite>,
    archive: &ValidatedArchive,
) -> Result<u64, AppError> {
    let mut total = 0u64;

    for def in load_order() {
        let records = archive.datasets.get(def.name).ok_or_else(|| {
            AppError::Internal(format!("Validated archive lost dataset {}", def.name))
        })?;

        // Batch size is a throughput knob only; a failure in any batch still
        // aborts the whole restore via the enclosing transaction.
        for chunk in records.chunks(batch_rows(def)) {
            let mut builder = QueryBuilder::<Sqlite>::new(insert_prefix(def));
            builder.push_values(chunk, |mut row, record| {
                for col in def.columns {
                    bind_column(&mut row, col, record);
                }
            });
            builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(|e| load_error(def, e))?;
            total += chunk.len() as u64;
        }

        tracing::debug!(dataset = def.name, rows = records.len(), "Dataset loaded");
    }

    Ok(total)
}

/// A constraint violation during load means the archive itself is internally
/// inconsistent; load order already guarantees parents are present.
fn load_error(def: &DatasetDef, err: sqlx::Error) -> AppError {
    tracing::error!(dataset = def.name, "Bulk load failed: {}", err);
    AppError::Database(format!(
        "Failed to load dataset {} (archive may be internally inconsistent): {}",
        def.name, err
    ))
}

/// Advance every identifier generator past the highest loaded identifier.
///
/// Runs once after all datasets are loaded so a later dataset's explicit
/// identifiers can never collide with ordinary inserts afterwards. An empty
/// table gets its generator back in the initial state.
async fn resync_identities(tx: &mut Transaction<'_, Sqlite>) -> Result<(), AppError> {
    for def in load_order() {
        let Some(id_column) = def.id_column else {
            continue;
        };

        let row = sqlx::query(&format!(
            "SELECT COALESCE(MAX({}), 0) AS max_id FROM {}",
            id_column, def.name
        ))
        .fetch_one(&mut **tx)
        .await?;
        let max_id: i64 = row.get("max_id");

        sqlx::query("DELETE FROM sqlite_sequence WHERE name = ?")
            .bind(def.name)
            .execute(&mut **tx)
            .await?;
        if max_id > 0 {
            sqlx::query("INSERT INTO sqlite_sequence (name, seq) VALUES (?, ?)")
                .bind(def.name)
                .bind(max_id)
                .execute(&mut **tx)
                .await?;
        }
        tracing::debug!(dataset = def.name, max_id, "Identifier generator resynchronized");
    }
    Ok(())
}

/// Write one audit entry and one system notification describing the attempt.
///
/// Strictly best-effort: a recording failure is logged and discarded, never
/// escalated into the restore result.
async fn record_outcome(pool: &SqlitePool, actor: &str, result: &Result<RestoreSummary, AppError>) {
    let now = Utc::now().to_rfc3339();
    let (detail, title, body, severity) = match result {
        Ok(summary) => (
            serde_json::json!({
                "success": true,
                "operationId": summary.operation_id,
                "rowsLoaded": summary.rows_loaded,
            })
            .to_string(),
            "Snapshot restore succeeded",
            format!(
                "Restored snapshot captured at {} by {} ({} rows)",
                summary.captured_at, summary.captured_by, summary.rows_loaded
            ),
            "info",
        ),
        Err(err) => (
            serde_json::json!({
                "success": false,
                "errorCode": err.error_code(),
                "error": err.message(),
            })
            .to_string(),
            "Snapshot restore failed",
            format!("Restore attempted by {} failed: {}", actor, err),
            "error",
        ),
    };

    let recorded: Result<(), sqlx::Error> = async {
        sqlx::query(
            "INSERT INTO audit_log (user_id, action, detail, created_at)
             VALUES ((SELECT id FROM users WHERE username = ?), 'snapshot.restore', ?, ?)",
        )
        .bind(actor)
        .bind(&detail)
        .bind(&now)
        .execute(pool)
        .await?;

        sqlx::query(
            "INSERT INTO notifications (title, body, severity, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(title)
        .bind(&body)
        .bind(severity)
        .bind(&now)
        .execute(pool)
        .await?;

        Ok(())
    }
    .await;

    if let Err(e) = recorded {
        tracing::warn!("Failed to record restore outcome: {}", e);
    }
}
