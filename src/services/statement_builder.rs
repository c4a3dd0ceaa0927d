use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::{
    round2, CalculationType, CleaningMismatchWarning, DuplicateWarning, EffectivePolicy, Expense,
    ExpenseLine, LineItem, Listing, Reservation, ReservationLine, Statement, StatementStatus,
};
use crate::error::{AppError, AppResult};
use crate::providers::{accounting, booking};
use crate::repository::{expenses as expense_repo, statements as statement_repo};
use crate::services::{anomalies, attribution, expenses as expense_collector, fees, policy};
use crate::state::AppState;

/// One statement build request: single property, or several for a
/// combined statement.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub owner_id: String,
    pub listing_ids: Vec<Uuid>,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub calculation_type: Option<CalculationType>,
    pub include_inactive: bool,
    /// Manually authored reservations to include alongside provider rows.
    pub custom_reservations: Vec<Reservation>,
    pub internal_notes: Option<String>,
}

/// What the builder did for the idempotency key.
#[derive(Debug)]
pub enum BuildOutcome {
    Created(Statement),
    /// An existing draft was overwritten wholesale.
    Rebuilt(Statement),
    /// A finalized-or-later statement already covers this key.
    AlreadyExists(Statement),
}

impl BuildOutcome {
    pub fn statement(&self) -> &Statement {
        match self {
            Self::Created(s) | Self::Rebuilt(s) | Self::AlreadyExists(s) => s,
        }
    }
}

/// Everything computed for one listing before aggregation.
struct ListingComputation {
    policy: EffectivePolicy,
    mode: CalculationType,
    reservation_lines: Vec<ReservationLine>,
    manual_ids: HashSet<String>,
    expense_rows: Vec<Expense>,
    fee: fees::FeeBreakdown,
    duplicates: Vec<DuplicateWarning>,
    cancelled_count: i64,
    cleaning_expected: f64,
    cleaning_actual: f64,
    should_convert: bool,
    partial_sources: Vec<String>,
    group: Option<(Uuid, String, std::collections::BTreeSet<String>)>,
}

/// Build (or rebuild) the statement for a request, persisting atomically.
///
/// Strictly ordered per build: policy, then attribution + collection,
/// then anomalies + fees, then the persist. Rebuilding an existing draft
/// replaces it wholesale; anything past draft yields `AlreadyExists`.
pub async fn build_statement(state: &AppState, request: BuildRequest) -> AppResult<BuildOutcome> {
    if request.week_start > request.week_end {
        return Err(AppError::InvalidPeriod(format!(
            "start {} is after end {}",
            request.week_start, request.week_end
        )));
    }
    if request.listing_ids.is_empty() {
        return Err(AppError::BadRequest("No properties selected.".to_string()));
    }

    let pool = state.db()?;
    state.listing_directory.ensure_loaded(pool).await?;

    let mut computations = Vec::with_capacity(request.listing_ids.len());
    for listing_id in &request.listing_ids {
        let listing = state.listing_directory.get(*listing_id).await;
        let listing = policy::ensure_generatable(
            listing.as_ref(),
            &listing_id.to_string(),
            request.include_inactive,
        )?
        .clone();
        if listing.owner_id != request.owner_id {
            return Err(AppError::BadRequest(format!(
                "Listing {} does not belong to owner {}.",
                listing_id, request.owner_id
            )));
        }
        let computation = compute_for_listing(state, &listing, &request).await?;
        computations.push(computation);
    }

    let is_combined = request.listing_ids.len() > 1;
    let property_id = if is_combined {
        None
    } else {
        Some(request.listing_ids[0])
    };

    // Reads are safe to retry; the write below is not, so the existence
    // check runs before assembling the new aggregate.
    let existing = statement_repo::find_by_period_key(
        pool,
        &request.owner_id,
        property_id,
        request.week_start,
        request.week_end,
    )
    .await?;

    if let Some(existing) = &existing {
        if existing.status != StatementStatus::Draft {
            return Ok(BuildOutcome::AlreadyExists(existing.clone()));
        }
    }

    let statement = assemble(&request, property_id, is_combined, computations, &existing);

    match existing {
        Some(_) => {
            statement_repo::replace_draft(pool, &statement).await?;
            tracing::info!(
                statement_id = %statement.id,
                owner_id = %statement.owner_id,
                "draft statement rebuilt"
            );
            Ok(BuildOutcome::Rebuilt(statement))
        }
        None => {
            statement_repo::insert(pool, &statement).await?;
            tracing::info!(
                statement_id = %statement.id,
                owner_id = %statement.owner_id,
                "statement created"
            );
            Ok(BuildOutcome::Created(statement))
        }
    }
}

async fn compute_for_listing(
    state: &AppState,
    listing: &Listing,
    request: &BuildRequest,
) -> AppResult<ListingComputation> {
    let pool = state.db()?;
    let group = match listing.group_id {
        Some(group_id) => state.listing_directory.group(group_id).await,
        None => None,
    };

    let as_of = Utc::now().date_naive();
    let effective = policy::resolve_policy(listing, as_of);
    let mode = policy::effective_calculation_type(request.calculation_type, listing, group.as_ref());

    let mut reservations = booking::fetch_reservations(
        &state.http_client,
        &state.config,
        listing.id,
        request.week_start,
        request.week_end,
    )
    .await?;
    reservations.extend(
        request
            .custom_reservations
            .iter()
            .filter(|r| r.property_id == listing.id)
            .cloned(),
    );

    let synced = accounting::fetch_synced_expenses(
        &state.http_client,
        &state.config,
        listing.id,
        request.week_start,
        request.week_end,
    )
    .await;
    let manual =
        expense_repo::list_manual(pool, listing.id, request.week_start, request.week_end).await;
    let collection =
        expense_collector::collect(synced, manual, request.week_start, request.week_end)?;

    let attributed = attribution::attribute(
        &reservations,
        request.week_start,
        request.week_end,
        mode,
    );
    let manual_ids: HashSet<String> = reservations
        .iter()
        .filter(|r| r.manual)
        .map(|r| r.id.clone())
        .collect();

    let lines: Vec<ReservationLine> = attributed
        .included
        .iter()
        .map(|item| item.line.clone())
        .collect();
    let (lines, cohost_excluded) = fees::apply_cohost_exclusion(lines, &effective);
    if cohost_excluded > 0 {
        tracing::debug!(
            listing_id = %listing.id,
            cohost_excluded,
            "airbnb lines dropped for cohosted listing"
        );
    }

    let fee = fees::calculate(
        &lines,
        &effective,
        collection.billable_total,
        0.0,
        0.0,
        0.0,
    );

    // Cancelled copies take part in duplicate clustering too; a pair whose
    // second import was cancelled is still worth an operator's look.
    let mut in_period: Vec<Reservation> = attributed
        .included
        .iter()
        .map(|item| item.reservation.clone())
        .collect();
    in_period.extend(attributed.cancelled_in_period.iter().cloned());
    let duplicates = anomalies::detect_duplicates(
        &in_period,
        state.config.duplicate_payout_tolerance,
    );
    let cleaning = anomalies::cleaning_mismatch(
        &lines,
        &collection.rows,
        effective.default_cleaning_fee,
        state.config.cleaning_mismatch_threshold,
    );
    let (cleaning_expected, cleaning_actual) = cleaning
        .as_ref()
        .map(|w| (w.expected_default_total, w.actual_expense_total))
        .unwrap_or((0.0, 0.0));
    let should_convert = anomalies::should_convert_to_calendar(
        mode,
        fee.total_revenue,
        &reservations,
        request.week_start,
        request.week_end,
    );

    Ok(ListingComputation {
        policy: effective,
        mode,
        reservation_lines: lines,
        manual_ids,
        expense_rows: collection.rows,
        fee,
        duplicates,
        cancelled_count: attributed.cancelled_in_period.len() as i64,
        cleaning_expected,
        cleaning_actual,
        should_convert,
        partial_sources: collection.partial_sources,
        group: group.map(|g| (g.id, g.name, g.tags)),
    })
}

fn assemble(
    request: &BuildRequest,
    property_id: Option<Uuid>,
    is_combined: bool,
    computations: Vec<ListingComputation>,
    existing: &Option<Statement>,
) -> Statement {
    let now = Utc::now();
    let mut line_items: Vec<LineItem> = Vec::new();
    let mut duplicate_warnings: Vec<DuplicateWarning> = Vec::new();
    let mut partial_data_sources: Vec<String> = Vec::new();

    let mut total_revenue = 0.0;
    let mut total_expenses = 0.0;
    let mut pm_commission = 0.0;
    let mut deducted_commission = 0.0;
    let mut tax_adjustment = 0.0;
    let mut commissionable_base = 0.0;
    let mut owner_payout = 0.0;
    let mut cancelled_reservation_count = 0;
    let mut cleaning_expected = 0.0;
    let mut cleaning_actual = 0.0;
    let mut cleaning_flagged = false;
    let mut should_convert = false;
    let mut all_waived = true;

    // The snapshot statements carry; combined statements freeze the first
    // member listing's policy (the group's members share flags in practice).
    let snapshot = computations[0].policy.clone();
    let mode = computations[0].mode;
    let group = computations[0].group.clone();

    for computation in computations {
        for line in &computation.reservation_lines {
            let item = if computation.manual_ids.contains(&line.reservation_id) {
                LineItem::CustomReservation(line.clone())
            } else {
                LineItem::Reservation(line.clone())
            };
            line_items.push(item);
        }
        for expense in &computation.expense_rows {
            line_items.push(LineItem::Expense(ExpenseLine {
                expense_id: expense.id.clone(),
                date: expense.date,
                description: expense.description.clone(),
                category: expense.category.clone(),
                amount: expense.amount,
                hidden: expense.hidden,
                is_ll_cover: expense.is_ll_cover,
                source: expense.source,
            }));
        }

        total_revenue += computation.fee.total_revenue;
        pm_commission += computation.fee.pm_commission;
        deducted_commission += computation.fee.deducted_commission;
        tax_adjustment += computation.fee.tax_adjustment;
        commissionable_base += computation.fee.commissionable_base;
        owner_payout += computation.fee.owner_payout;
        all_waived &= computation.fee.commission_waived;

        total_expenses += computation
            .expense_rows
            .iter()
            .filter(|row| row.is_owner_billable())
            .map(|row| row.amount)
            .sum::<f64>();

        duplicate_warnings.extend(computation.duplicates);
        cancelled_reservation_count += computation.cancelled_count;
        if computation.cleaning_expected > 0.0 || computation.cleaning_actual > 0.0 {
            cleaning_flagged = true;
            cleaning_expected += computation.cleaning_expected;
            cleaning_actual += computation.cleaning_actual;
        }
        should_convert |= computation.should_convert;
        for source in computation.partial_sources {
            if !partial_data_sources.contains(&source) {
                partial_data_sources.push(source);
            }
        }
    }

    let cleaning_mismatch_warning = if cleaning_flagged {
        Some(CleaningMismatchWarning {
            expected_default_total: round2(cleaning_expected),
            actual_expense_total: round2(cleaning_actual),
        })
    } else {
        None
    };

    let (id, created_at, version) = match existing {
        Some(existing) => (existing.id, existing.created_at, existing.version + 1),
        None => (Uuid::new_v4(), now, 1),
    };

    Statement {
        id,
        owner_id: request.owner_id.clone(),
        property_id,
        property_ids: if is_combined {
            request.listing_ids.clone()
        } else {
            Vec::new()
        },
        is_combined,
        week_start_date: request.week_start,
        week_end_date: request.week_end,
        calculation_type: mode,
        total_revenue: round2(total_revenue),
        total_expenses: round2(total_expenses),
        pm_commission: round2(pm_commission),
        commission_waived: all_waived,
        deducted_commission: round2(deducted_commission),
        tech_fees: 0.0,
        insurance_fees: 0.0,
        adjustments: 0.0,
        tax_adjustment: round2(tax_adjustment),
        commissionable_base: round2(commissionable_base),
        owner_payout: round2(owner_payout),
        line_items,
        duplicate_warnings,
        cancelled_reservation_count,
        cleaning_mismatch_warning,
        should_convert_to_calendar: should_convert,
        partial_data_sources,
        internal_notes: request.internal_notes.clone(),
        listing_settings_snapshot: snapshot,
        status: StatementStatus::Draft,
        sent_at: None,
        payout_status: None,
        paid_at: None,
        transfer_id: None,
        payout_fee: None,
        payout_error: None,
        group_id: group.as_ref().map(|(id, _, _)| *id),
        group_name: group.as_ref().map(|(_, name, _)| name.clone()),
        group_tags: group.map(|(_, _, tags)| tags).unwrap_or_default(),
        version,
        created_at,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashSet};

    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::{assemble, BuildRequest, ListingComputation};
    use crate::domain::{
        CalculationType, EffectivePolicy, Listing, Platform, ReservationFinancials,
        ReservationLine,
    };
    use crate::services::{fees, policy};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn effective_policy(waived: bool) -> EffectivePolicy {
        EffectivePolicy {
            pm_percentage: 15.0,
            waive_commission: waived,
            disregard_tax: false,
            airbnb_pass_through_tax: false,
            cleaning_fee_pass_through: false,
            is_cohost_on_airbnb: false,
            guest_paid_damage_coverage: false,
            default_cleaning_fee: 150.0,
            default_pet_fee: 0.0,
        }
    }

    fn line(id: &str, payout: f64) -> ReservationLine {
        ReservationLine {
            reservation_id: id.to_string(),
            guest_name: "Alex Guest".to_string(),
            check_in: date("2025-01-02"),
            check_out: date("2025-01-05"),
            nights: 3,
            overlap_nights: 3,
            share: 1.0,
            platform: Platform::Direct,
            attributed: ReservationFinancials {
                gross_payout: payout,
                ..Default::default()
            },
            original: ReservationFinancials {
                gross_payout: payout,
                ..Default::default()
            },
            zero_night_fallback: false,
        }
    }

    fn computation(revenue: f64, commission: f64, waived: bool) -> ListingComputation {
        let deducted = if waived { 0.0 } else { commission };
        ListingComputation {
            policy: effective_policy(waived),
            mode: CalculationType::Checkout,
            reservation_lines: vec![line("r1", revenue)],
            manual_ids: HashSet::new(),
            expense_rows: Vec::new(),
            fee: fees::FeeBreakdown {
                total_revenue: revenue,
                cleaning_pass_through: 0.0,
                commissionable_base: revenue,
                pm_commission: commission,
                commission_waived: waived,
                deducted_commission: deducted,
                tax_adjustment: 0.0,
                owner_payout: revenue - deducted,
            },
            duplicates: Vec::new(),
            cancelled_count: 0,
            cleaning_expected: 0.0,
            cleaning_actual: 0.0,
            should_convert: false,
            partial_sources: Vec::new(),
            group: None,
        }
    }

    fn request(listing_ids: Vec<Uuid>) -> BuildRequest {
        BuildRequest {
            owner_id: "owner-1".to_string(),
            listing_ids,
            week_start: date("2025-01-01"),
            week_end: date("2025-01-07"),
            calculation_type: None,
            include_inactive: false,
            custom_reservations: Vec::new(),
            internal_notes: None,
        }
    }

    #[test]
    fn mixed_waiver_combined_statement_keeps_the_payout_identity() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let request = request(ids.clone());
        let statement = assemble(
            &request,
            None,
            true,
            vec![computation(300.0, 45.0, true), computation(200.0, 30.0, false)],
            &None,
        );

        // Waived listing pays out fully; only the other one is deducted.
        assert_eq!(statement.owner_payout, 470.0);
        assert_eq!(statement.pm_commission, 75.0);
        assert_eq!(statement.deducted_commission, 30.0);
        assert!(!statement.commission_waived);
        assert_eq!(statement.recompute_owner_payout(), statement.owner_payout);
    }

    #[test]
    fn rebuilding_with_identical_inputs_yields_identical_figures() {
        let id = Uuid::new_v4();
        let request = request(vec![id]);
        let first = assemble(
            &request,
            Some(id),
            false,
            vec![computation(300.0, 45.0, false)],
            &None,
        );
        let rebuilt = assemble(
            &request,
            Some(id),
            false,
            vec![computation(300.0, 45.0, false)],
            &Some(first.clone()),
        );

        assert_eq!(rebuilt.id, first.id);
        assert_eq!(rebuilt.created_at, first.created_at);
        assert_eq!(rebuilt.version, first.version + 1);
        assert_eq!(rebuilt.total_revenue, first.total_revenue);
        assert_eq!(rebuilt.total_expenses, first.total_expenses);
        assert_eq!(rebuilt.pm_commission, first.pm_commission);
        assert_eq!(rebuilt.deducted_commission, first.deducted_commission);
        assert_eq!(rebuilt.owner_payout, first.owner_payout);
        assert_eq!(rebuilt.line_items, first.line_items);
        assert_eq!(rebuilt.listing_settings_snapshot, first.listing_settings_snapshot);
    }

    #[test]
    fn snapshot_shields_recompute_from_live_listing_changes() {
        let mut listing = Listing {
            id: Uuid::new_v4(),
            owner_id: "owner-1".to_string(),
            name: "Seaside Cottage".to_string(),
            active: true,
            pm_percentage: 15.0,
            waive_commission: false,
            waive_commission_until: None,
            disregard_tax: false,
            airbnb_pass_through_tax: false,
            cleaning_fee_pass_through: false,
            is_cohost_on_airbnb: false,
            guest_paid_damage_coverage: false,
            include_child_listings: false,
            default_cleaning_fee: 150.0,
            default_pet_fee: 0.0,
            tags: BTreeSet::new(),
            group_id: None,
            calculation_type: None,
        };
        let as_of = date("2025-01-08");
        let frozen = policy::resolve_policy(&listing, as_of);

        let mut comp = computation(300.0, 45.0, false);
        comp.policy = frozen.clone();
        let request = request(vec![listing.id]);
        let statement = assemble(&request, Some(listing.id), false, vec![comp], &None);
        let payout_before = statement.recompute_owner_payout();

        listing.pm_percentage = 25.0;
        listing.waive_commission = true;
        let live = policy::resolve_policy(&listing, as_of);

        assert_ne!(live, statement.listing_settings_snapshot);
        assert_eq!(statement.listing_settings_snapshot, frozen);
        assert_eq!(statement.recompute_owner_payout(), payout_before);
        assert_eq!(statement.recompute_owner_payout(), statement.owner_payout);
    }
}
