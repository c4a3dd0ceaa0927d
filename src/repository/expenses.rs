use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::{Expense, ExpenseSource};
use crate::error::{AppError, AppResult};

/// Manually uploaded expenses live in our own table; synced expenses come
/// from the accounting provider at build time and are never stored here.

pub async fn insert_manual(pool: &PgPool, expense: &Expense) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO manual_expenses
            (id, property_id, expense_date, description, category, amount,
             hidden, is_ll_cover, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())",
    )
    .bind(&expense.id)
    .bind(expense.property_id)
    .bind(expense.date)
    .bind(&expense.description)
    .bind(&expense.category)
    .bind(expense.amount)
    .bind(expense.hidden)
    .bind(expense.is_ll_cover)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_manual(
    pool: &PgPool,
    property_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> AppResult<Vec<Expense>> {
    let rows = sqlx::query(
        "SELECT id, property_id, expense_date, description, category, amount,
                hidden, is_ll_cover
         FROM manual_expenses
         WHERE property_id = $1 AND expense_date BETWEEN $2 AND $3
         ORDER BY expense_date, description",
    )
    .bind(property_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(Expense {
                id: row.try_get("id")?,
                property_id: row.try_get("property_id")?,
                date: row.try_get("expense_date")?,
                description: row.try_get("description")?,
                category: row.try_get("category")?,
                amount: row.try_get("amount")?,
                hidden: row.try_get("hidden")?,
                is_ll_cover: row.try_get("is_ll_cover")?,
                source: ExpenseSource::Manual,
            })
        })
        .collect()
}

/// Toggle visibility; hidden rows stay out of totals but remain listed.
pub async fn set_hidden(pool: &PgPool, id: &str, hidden: bool) -> AppResult<()> {
    let result = sqlx::query("UPDATE manual_expenses SET hidden = $2 WHERE id = $1")
        .bind(id)
        .bind(hidden)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Expense {id} not found.")));
    }
    Ok(())
}
