use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::{Statement, StatementStatus};
use crate::error::{AppError, AppResult};

/// Statements persist as one row: indexed scalar columns for querying plus
/// the full typed aggregate as a `doc` jsonb column, so totals, line
/// items, warnings, and the policy snapshot land in a single atomic write.

fn doc_to_statement(doc: serde_json::Value) -> AppResult<Statement> {
    serde_json::from_value(doc)
        .map_err(|e| AppError::Internal(format!("Corrupt statement document: {e}")))
}

fn statement_to_doc(statement: &Statement) -> AppResult<serde_json::Value> {
    serde_json::to_value(statement)
        .map_err(|e| AppError::Internal(format!("Failed to encode statement: {e}")))
}

pub async fn get(pool: &PgPool, id: Uuid) -> AppResult<Statement> {
    let row = sqlx::query("SELECT doc FROM statements WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Statement {id} not found.")))?;
    doc_to_statement(row.try_get("doc")?)
}

/// Look up by the idempotency key `(owner, property, period)`.
pub async fn find_by_period_key(
    pool: &PgPool,
    owner_id: &str,
    property_id: Option<Uuid>,
    week_start: NaiveDate,
    week_end: NaiveDate,
) -> AppResult<Option<Statement>> {
    let row = sqlx::query(
        "SELECT doc FROM statements
         WHERE owner_id = $1
           AND property_id IS NOT DISTINCT FROM $2
           AND week_start_date = $3
           AND week_end_date = $4",
    )
    .bind(owner_id)
    .bind(property_id)
    .bind(week_start)
    .bind(week_end)
    .fetch_optional(pool)
    .await?;
    match row {
        Some(row) => Ok(Some(doc_to_statement(row.try_get("doc")?)?)),
        None => Ok(None),
    }
}

pub async fn list(
    pool: &PgPool,
    owner_id: Option<&str>,
    property_id: Option<Uuid>,
    status: Option<StatementStatus>,
    limit: i64,
) -> AppResult<Vec<Statement>> {
    let rows = sqlx::query(
        "SELECT doc FROM statements
         WHERE ($1::text IS NULL OR owner_id = $1)
           AND ($2::uuid IS NULL OR property_id = $2)
           AND ($3::text IS NULL OR status = $3)
         ORDER BY week_start_date DESC, created_at DESC
         LIMIT $4",
    )
    .bind(owner_id)
    .bind(property_id)
    .bind(status.map(|s| s.as_str().to_string()))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| doc_to_statement(row.try_get("doc")?))
        .collect()
}

/// Insert a brand-new statement. A unique index over the idempotency key
/// turns racing inserts into a typed conflict instead of a duplicate row.
pub async fn insert(pool: &PgPool, statement: &Statement) -> AppResult<()> {
    let doc = statement_to_doc(statement)?;
    let result = sqlx::query(
        "INSERT INTO statements
            (id, owner_id, property_id, week_start_date, week_end_date,
             status, version, doc, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)",
    )
    .bind(statement.id)
    .bind(&statement.owner_id)
    .bind(statement.property_id)
    .bind(statement.week_start_date)
    .bind(statement.week_end_date)
    .bind(statement.status.as_str())
    .bind(statement.version)
    .bind(&doc)
    .bind(Utc::now())
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
            Err(AppError::Conflict(
                "A statement already exists for this owner, property, and period.".to_string(),
            ))
        }
        Err(other) => Err(other.into()),
    }
}

/// Overwrite a draft wholesale (rebuild/reconfigure). The status guard in
/// the WHERE clause is the concurrency protection: losing a race against a
/// finalize surfaces as a conflict, never a silent overwrite.
pub async fn replace_draft(pool: &PgPool, statement: &Statement) -> AppResult<()> {
    let doc = statement_to_doc(statement)?;
    let result = sqlx::query(
        "UPDATE statements
         SET doc = $2, status = $3, version = $4, updated_at = now()
         WHERE id = $1 AND status = 'draft' AND version = $5",
    )
    .bind(statement.id)
    .bind(&doc)
    .bind(statement.status.as_str())
    .bind(statement.version)
    .bind(statement.version - 1)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::PersistenceConflict(format!(
            "statement {} was finalized or modified concurrently",
            statement.id
        )));
    }
    Ok(())
}

/// Conditional status transition: bumps the version and writes the updated
/// document only when the stored row still matches the expected state.
pub async fn transition(
    pool: &PgPool,
    statement: &mut Statement,
    expected: StatementStatus,
) -> AppResult<()> {
    let expected_version = statement.version;
    statement.version += 1;
    statement.updated_at = Utc::now();
    let doc = statement_to_doc(statement)?;

    let result = sqlx::query(
        "UPDATE statements
         SET doc = $2, status = $3, version = $4, updated_at = now()
         WHERE id = $1 AND status = $5 AND version = $6",
    )
    .bind(statement.id)
    .bind(&doc)
    .bind(statement.status.as_str())
    .bind(statement.version)
    .bind(expected.as_str())
    .bind(expected_version)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        statement.version = expected_version;
        return Err(AppError::PersistenceConflict(format!(
            "statement {} changed concurrently (expected status '{}')",
            statement.id,
            expected.as_str()
        )));
    }
    Ok(())
}

/// Physical delete, allowed only while the row is still a draft.
pub async fn delete_draft(pool: &PgPool, id: Uuid) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM statements WHERE id = $1 AND status = 'draft'")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::PersistenceConflict(format!(
            "statement {id} is no longer a draft"
        )));
    }
    Ok(())
}
