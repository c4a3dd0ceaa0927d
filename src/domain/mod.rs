pub mod expense;
pub mod listing;
pub mod reservation;
pub mod statement;

pub use expense::{Expense, ExpenseSource};
pub use listing::{
    parse_tags, serialize_tags, EffectivePolicy, Listing, ListingGroup,
};
pub use reservation::{Platform, Reservation, ReservationFinancials};
pub use statement::{
    CalculationType, CleaningMismatchWarning, DuplicateWarning, ExpenseLine, LineItem,
    ReservationLine, Statement, StatementStatus,
};

/// Money amounts are plain f64 rounded to cents at every aggregation point.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::round2;

    #[test]
    fn rounds_to_cents() {
        assert_eq!(round2(10.006), 10.01);
        assert_eq!(round2(10.004), 10.0);
        assert_eq!(round2(-1.239), -1.24);
    }
}
