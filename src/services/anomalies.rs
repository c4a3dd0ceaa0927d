use chrono::NaiveDate;

use crate::domain::{
    round2, CalculationType, CleaningMismatchWarning, DuplicateWarning, Expense, Reservation,
    ReservationLine,
};

/// Cluster likely double-imported reservations: same guest, overlapping
/// dates, gross payout within `payout_tolerance` (0.0 = exact match).
/// One warning per cluster; generation is never blocked.
pub fn detect_duplicates(
    reservations: &[Reservation],
    payout_tolerance: f64,
) -> Vec<DuplicateWarning> {
    let mut warnings: Vec<DuplicateWarning> = Vec::new();
    let mut clustered = vec![false; reservations.len()];

    for i in 0..reservations.len() {
        if clustered[i] {
            continue;
        }
        let mut cluster = vec![i];
        for j in (i + 1)..reservations.len() {
            if clustered[j] {
                continue;
            }
            if is_duplicate_pair(&reservations[i], &reservations[j], payout_tolerance) {
                cluster.push(j);
                clustered[j] = true;
            }
        }
        if cluster.len() < 2 {
            continue;
        }
        clustered[i] = true;
        warnings.push(DuplicateWarning {
            guest_name: reservations[i].guest_name.clone(),
            reservation_ids: cluster
                .iter()
                .map(|&idx| reservations[idx].id.clone())
                .collect(),
            gross_payouts: cluster
                .iter()
                .map(|&idx| reservations[idx].financials.gross_payout)
                .collect(),
        });
    }

    warnings
}

fn is_duplicate_pair(a: &Reservation, b: &Reservation, payout_tolerance: f64) -> bool {
    if !a
        .guest_name
        .trim()
        .eq_ignore_ascii_case(b.guest_name.trim())
    {
        return false;
    }
    let dates_overlap = a.check_in < b.check_out && b.check_in < a.check_out;
    if !dates_overlap {
        return false;
    }
    (a.financials.gross_payout - b.financials.gross_payout).abs() <= payout_tolerance
}

/// Compare actual cleaning expenses against the stay-weighted default fee
/// expectation; warn when the relative difference exceeds `threshold`.
pub fn cleaning_mismatch(
    lines: &[ReservationLine],
    expenses: &[Expense],
    default_cleaning_fee: f64,
    threshold: f64,
) -> Option<CleaningMismatchWarning> {
    if default_cleaning_fee <= 0.0 || lines.is_empty() {
        return None;
    }
    let expected = round2(
        lines
            .iter()
            .map(|line| default_cleaning_fee * line.share)
            .sum(),
    );
    let actual = round2(
        expenses
            .iter()
            .filter(|expense| expense.is_cleaning() && !expense.hidden)
            .map(|expense| expense.amount)
            .sum(),
    );
    if expected <= 0.0 {
        return None;
    }
    let relative = (expected - actual).abs() / expected;
    if relative <= threshold {
        return None;
    }
    Some(CleaningMismatchWarning {
        expected_default_total: expected,
        actual_expense_total: actual,
    })
}

/// Advisory only: checkout mode showed nothing (or negative) for a period
/// that several in-progress stays span, so calendar proration would likely
/// paint a truer picture. Never auto-switches.
pub fn should_convert_to_calendar(
    mode: CalculationType,
    checkout_revenue: f64,
    reservations: &[Reservation],
    start: NaiveDate,
    end: NaiveDate,
) -> bool {
    if mode != CalculationType::Checkout || checkout_revenue > 0.0 {
        return false;
    }
    let boundary_spanning = reservations
        .iter()
        .filter(|r| !r.cancelled && r.date_nights() > 0)
        .filter(|r| r.check_in < end + chrono::Duration::days(1) && r.check_out > start)
        .filter(|r| r.check_in < start || r.check_out > end)
        .count();
    boundary_spanning > 1
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::{cleaning_mismatch, detect_duplicates, should_convert_to_calendar};
    use crate::domain::{
        CalculationType, Expense, ExpenseSource, Platform, Reservation, ReservationFinancials,
        ReservationLine,
    };
    use crate::services::attribution::attribute;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn reservation(id: &str, guest: &str, check_in: &str, check_out: &str, payout: f64) -> Reservation {
        let check_in = date(check_in);
        let check_out = date(check_out);
        Reservation {
            id: id.to_string(),
            property_id: Uuid::nil(),
            guest_name: guest.to_string(),
            check_in,
            check_out,
            nights: (check_out - check_in).num_days(),
            financials: ReservationFinancials {
                gross_payout: payout,
                ..Default::default()
            },
            platform: Platform::Airbnb,
            cancelled: false,
            manual: false,
        }
    }

    fn cleaning_line(share: f64) -> ReservationLine {
        ReservationLine {
            reservation_id: "r1".to_string(),
            guest_name: "Alex Guest".to_string(),
            check_in: date("2025-01-02"),
            check_out: date("2025-01-05"),
            nights: 3,
            overlap_nights: 3,
            share,
            platform: Platform::Direct,
            attributed: ReservationFinancials::default(),
            original: ReservationFinancials::default(),
            zero_night_fallback: false,
        }
    }

    fn cleaning_expense(amount: f64) -> Expense {
        Expense {
            id: "e1".to_string(),
            property_id: Uuid::nil(),
            date: date("2025-01-05"),
            description: "Turnover clean".to_string(),
            category: "cleaning".to_string(),
            amount,
            hidden: false,
            is_ll_cover: false,
            source: ExpenseSource::Synced,
        }
    }

    #[test]
    fn exact_duplicates_cluster_once() {
        let rows = vec![
            reservation("a", "Sam Lee", "2025-01-02", "2025-01-05", 354.0),
            reservation("b", "sam lee", "2025-01-02", "2025-01-05", 354.0),
            reservation("c", "Sam Lee", "2025-01-02", "2025-01-05", 354.0),
            reservation("d", "Other Guest", "2025-01-02", "2025-01-05", 354.0),
        ];
        let warnings = detect_duplicates(&rows, 0.0);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].reservation_ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn payouts_outside_tolerance_are_not_duplicates() {
        let rows = vec![
            reservation("a", "Sam Lee", "2025-01-02", "2025-01-05", 354.0),
            reservation("b", "Sam Lee", "2025-01-02", "2025-01-05", 360.0),
        ];
        assert!(detect_duplicates(&rows, 0.0).is_empty());
        assert_eq!(detect_duplicates(&rows, 10.0).len(), 1);
    }

    #[test]
    fn cancelled_copy_still_clusters_with_its_active_twin() {
        let active = reservation("a", "Sam Lee", "2025-01-02", "2025-01-05", 354.0);
        let mut cancelled = reservation("b", "Sam Lee", "2025-01-02", "2025-01-05", 354.0);
        cancelled.cancelled = true;

        let outcome = attribute(
            &[active, cancelled],
            date("2025-01-01"),
            date("2025-01-07"),
            CalculationType::Checkout,
        );
        let mut pool: Vec<Reservation> = outcome
            .included
            .iter()
            .map(|item| item.reservation.clone())
            .collect();
        pool.extend(outcome.cancelled_in_period.iter().cloned());

        let warnings = detect_duplicates(&pool, 0.0);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].reservation_ids, vec!["a", "b"]);
    }

    #[test]
    fn non_overlapping_repeat_guests_are_not_duplicates() {
        let rows = vec![
            reservation("a", "Sam Lee", "2025-01-02", "2025-01-05", 354.0),
            reservation("b", "Sam Lee", "2025-02-02", "2025-02-05", 354.0),
        ];
        assert!(detect_duplicates(&rows, 0.0).is_empty());
    }

    #[test]
    fn cleaning_mismatch_reports_both_values() {
        let warning = cleaning_mismatch(&[cleaning_line(1.0)], &[cleaning_expense(120.0)], 150.0, 0.10)
            .expect("mismatch expected");
        assert_eq!(warning.expected_default_total, 150.0);
        assert_eq!(warning.actual_expense_total, 120.0);
    }

    #[test]
    fn cleaning_within_threshold_is_quiet() {
        assert!(
            cleaning_mismatch(&[cleaning_line(1.0)], &[cleaning_expense(145.0)], 150.0, 0.10)
                .is_none()
        );
    }

    #[test]
    fn conversion_hint_requires_multiple_boundary_spanning_stays() {
        let start = date("2025-01-01");
        let end = date("2025-01-07");
        let spanning = vec![
            reservation("a", "G1", "2025-01-05", "2025-01-10", 200.0),
            reservation("b", "G2", "2025-01-06", "2025-01-12", 300.0),
        ];
        assert!(should_convert_to_calendar(
            CalculationType::Checkout,
            0.0,
            &spanning,
            start,
            end
        ));
        assert!(!should_convert_to_calendar(
            CalculationType::Checkout,
            0.0,
            &spanning[..1],
            start,
            end
        ));
        assert!(!should_convert_to_calendar(
            CalculationType::Checkout,
            500.0,
            &spanning,
            start,
            end
        ));
        assert!(!should_convert_to_calendar(
            CalculationType::Calendar,
            0.0,
            &spanning,
            start,
            end
        ));
    }
}
