use std::collections::HashSet;

use chrono::NaiveDate;

use crate::domain::{round2, Expense};
use crate::error::{AppError, AppResult};

/// Merged expense set for one property and period.
#[derive(Debug, Clone, Default)]
pub struct ExpenseCollection {
    /// Every retained row, hidden and company-absorbed ones included, so
    /// the UI can toggle them. Ordered by date.
    pub rows: Vec<Expense>,
    /// Sum over rows that are neither hidden nor company-absorbed.
    pub billable_total: f64,
    /// Sources that were unreachable; their rows are missing from `rows`.
    pub partial_sources: Vec<String>,
}

/// Merge externally synced and manually uploaded expenses for the period.
///
/// Fail-soft: one unreachable source degrades to partial data; both
/// unreachable is a hard failure.
pub fn collect(
    synced: Result<Vec<Expense>, AppError>,
    manual: Result<Vec<Expense>, AppError>,
    start: NaiveDate,
    end: NaiveDate,
) -> AppResult<ExpenseCollection> {
    let mut collection = ExpenseCollection::default();

    let (synced_rows, manual_rows) = match (synced, manual) {
        (Ok(s), Ok(m)) => (s, m),
        (Ok(s), Err(err)) => {
            tracing::warn!(error = %err, "manual expense source unavailable, continuing partial");
            collection.partial_sources.push("manual".to_string());
            (s, Vec::new())
        }
        (Err(err), Ok(m)) => {
            tracing::warn!(error = %err, "accounting provider unavailable, continuing partial");
            collection.partial_sources.push("accounting".to_string());
            (Vec::new(), m)
        }
        (Err(synced_err), Err(_)) => {
            return Err(AppError::ProviderUnavailable(format!(
                "no expense source reachable: {synced_err}"
            )));
        }
    };

    // Synced rows win duplicate resolution, so index them first.
    let mut seen: HashSet<(NaiveDate, String, i64)> = HashSet::new();
    let mut rows: Vec<Expense> = Vec::new();
    for expense in synced_rows.into_iter().chain(manual_rows) {
        if expense.date < start || expense.date > end {
            continue;
        }
        if !seen.insert(dedup_key(&expense)) {
            continue;
        }
        rows.push(expense);
    }

    rows.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.description.cmp(&b.description))
            .then_with(|| a.id.cmp(&b.id))
    });

    collection.billable_total = round2(
        rows.iter()
            .filter(|row| row.is_owner_billable())
            .map(|row| row.amount)
            .sum(),
    );
    collection.rows = rows;
    Ok(collection)
}

fn dedup_key(expense: &Expense) -> (NaiveDate, String, i64) {
    (
        expense.date,
        expense.description.trim().to_ascii_lowercase(),
        (expense.amount * 100.0).round() as i64,
    )
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::collect;
    use crate::domain::{Expense, ExpenseSource};
    use crate::error::AppError;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn expense(id: &str, day: &str, description: &str, amount: f64, source: ExpenseSource) -> Expense {
        Expense {
            id: id.to_string(),
            property_id: Uuid::nil(),
            date: date(day),
            description: description.to_string(),
            category: "maintenance".to_string(),
            amount,
            hidden: false,
            is_ll_cover: false,
            source,
        }
    }

    #[test]
    fn merges_and_prefers_synced_on_exact_duplicates() {
        let synced = vec![expense("s1", "2025-01-03", "Pool service", 80.0, ExpenseSource::Synced)];
        let manual = vec![
            expense("m1", "2025-01-03", "pool service ", 80.0, ExpenseSource::Manual),
            expense("m2", "2025-01-04", "Light bulbs", 12.5, ExpenseSource::Manual),
        ];
        let merged = collect(Ok(synced), Ok(manual), date("2025-01-01"), date("2025-01-07")).unwrap();
        assert_eq!(merged.rows.len(), 2);
        assert_eq!(merged.rows[0].id, "s1");
        assert_eq!(merged.billable_total, 92.5);
        assert!(merged.partial_sources.is_empty());
    }

    #[test]
    fn hidden_and_company_absorbed_rows_are_kept_but_not_billed() {
        let mut hidden = expense("s1", "2025-01-02", "Disputed charge", 40.0, ExpenseSource::Synced);
        hidden.hidden = true;
        let mut covered = expense("s2", "2025-01-03", "Welcome basket", 25.0, ExpenseSource::Synced);
        covered.is_ll_cover = true;
        let billed = expense("s3", "2025-01-04", "Cleaning", 120.0, ExpenseSource::Synced);

        let merged = collect(
            Ok(vec![hidden, covered, billed]),
            Ok(Vec::new()),
            date("2025-01-01"),
            date("2025-01-07"),
        )
        .unwrap();
        assert_eq!(merged.rows.len(), 3);
        assert_eq!(merged.billable_total, 120.0);
    }

    #[test]
    fn out_of_period_rows_are_dropped() {
        let merged = collect(
            Ok(vec![expense("s1", "2025-02-01", "Late fee", 10.0, ExpenseSource::Synced)]),
            Ok(Vec::new()),
            date("2025-01-01"),
            date("2025-01-07"),
        )
        .unwrap();
        assert!(merged.rows.is_empty());
        assert_eq!(merged.billable_total, 0.0);
    }

    #[test]
    fn one_unreachable_source_degrades_to_partial_data() {
        let merged = collect(
            Err(AppError::ProviderUnavailable("accounting down".to_string())),
            Ok(vec![expense("m1", "2025-01-03", "Supplies", 30.0, ExpenseSource::Manual)]),
            date("2025-01-01"),
            date("2025-01-07"),
        )
        .unwrap();
        assert_eq!(merged.rows.len(), 1);
        assert_eq!(merged.partial_sources, vec!["accounting".to_string()]);
    }

    #[test]
    fn both_sources_unreachable_is_a_hard_failure() {
        let result = collect(
            Err(AppError::ProviderUnavailable("a".to_string())),
            Err(AppError::ProviderUnavailable("b".to_string())),
            date("2025-01-01"),
            date("2025-01-07"),
        );
        assert!(matches!(result, Err(AppError::ProviderUnavailable(_))));
    }
}
