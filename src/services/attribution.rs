use chrono::NaiveDate;

use crate::domain::{CalculationType, Reservation, ReservationLine};

/// One reservation's in-period contribution, paired with the untouched
/// original for display and audit.
#[derive(Debug, Clone)]
pub struct AttributedReservation {
    pub reservation: Reservation,
    pub line: ReservationLine,
}

#[derive(Debug, Clone, Default)]
pub struct AttributionOutcome {
    /// Ordered by check-in date, then reservation id.
    pub included: Vec<AttributedReservation>,
    /// Cancelled stays touching the period; excluded from totals, handed
    /// to anomaly detection.
    pub cancelled_in_period: Vec<Reservation>,
}

/// Attribute each reservation's revenue to `[start, end]` (inclusive)
/// under the requested proration mode.
pub fn attribute(
    reservations: &[Reservation],
    start: NaiveDate,
    end: NaiveDate,
    mode: CalculationType,
) -> AttributionOutcome {
    let mut outcome = AttributionOutcome::default();

    let mut sorted: Vec<&Reservation> = reservations.iter().collect();
    sorted.sort_by(|a, b| a.check_in.cmp(&b.check_in).then_with(|| a.id.cmp(&b.id)));

    for reservation in sorted {
        // Cancelled first: even a same-day or corrupt-dated cancellation
        // must surface for anomaly detection.
        if reservation.cancelled {
            if stay_intersects(reservation, start, end) {
                outcome.cancelled_in_period.push(reservation.clone());
            }
            continue;
        }
        if reservation.date_nights() <= 0 {
            // Same-day rows carry no nights to attribute.
            continue;
        }

        let line = match mode {
            CalculationType::Checkout => attribute_checkout(reservation, start, end),
            CalculationType::Calendar => attribute_calendar(reservation, start, end),
        };
        if let Some(line) = line {
            outcome.included.push(AttributedReservation {
                reservation: reservation.clone(),
                line,
            });
        }
    }

    outcome
}

/// Nights of `[check_in, check_out)` whose date falls inside `[start, end]`.
pub fn overlap_nights(reservation: &Reservation, start: NaiveDate, end: NaiveDate) -> i64 {
    let first = reservation.check_in.max(start);
    let last_exclusive = reservation.check_out.min(end + chrono::Duration::days(1));
    (last_exclusive - first).num_days().max(0)
}

fn stay_intersects(reservation: &Reservation, start: NaiveDate, end: NaiveDate) -> bool {
    if overlap_nights(reservation, start, end) > 0 {
        return true;
    }
    // Zero-night rows have no overlapping nights; go by the check-in date.
    reservation.check_in >= start && reservation.check_in <= end
}

fn attribute_checkout(
    reservation: &Reservation,
    start: NaiveDate,
    end: NaiveDate,
) -> Option<ReservationLine> {
    if reservation.check_out < start || reservation.check_out > end {
        return None;
    }
    Some(full_line(reservation, reservation.nights.max(reservation.date_nights()), false))
}

fn attribute_calendar(
    reservation: &Reservation,
    start: NaiveDate,
    end: NaiveDate,
) -> Option<ReservationLine> {
    let overlap = overlap_nights(reservation, start, end);
    if overlap <= 0 {
        return None;
    }

    if reservation.nights <= 0 {
        // Stored night count disagrees with the dates; fall back to
        // checkout attribution for this row rather than divide by zero.
        if reservation.check_out < start || reservation.check_out > end {
            return None;
        }
        return Some(full_line(reservation, overlap, true));
    }

    let share = (overlap as f64 / reservation.nights as f64).min(1.0);
    Some(ReservationLine {
        reservation_id: reservation.id.clone(),
        guest_name: reservation.guest_name.clone(),
        check_in: reservation.check_in,
        check_out: reservation.check_out,
        nights: reservation.nights,
        overlap_nights: overlap,
        share,
        platform: reservation.platform.clone(),
        attributed: reservation.financials.scaled(share),
        original: reservation.financials.clone(),
        zero_night_fallback: false,
    })
}

fn full_line(reservation: &Reservation, overlap: i64, fallback: bool) -> ReservationLine {
    ReservationLine {
        reservation_id: reservation.id.clone(),
        guest_name: reservation.guest_name.clone(),
        check_in: reservation.check_in,
        check_out: reservation.check_out,
        nights: reservation.nights,
        overlap_nights: overlap,
        share: 1.0,
        platform: reservation.platform.clone(),
        attributed: reservation.financials.clone(),
        original: reservation.financials.clone(),
        zero_night_fallback: fallback,
    }
}
