use crate::domain::{round2, EffectivePolicy, Platform, ReservationLine};

/// Fee, tax, and payout figures for one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeBreakdown {
    pub total_revenue: f64,
    /// Default-fee revenue added when cleaning pass-through is active.
    pub cleaning_pass_through: f64,
    pub commissionable_base: f64,
    pub pm_commission: f64,
    pub commission_waived: bool,
    /// What was actually subtracted: zero when the waiver applied,
    /// otherwise `pm_commission`.
    pub deducted_commission: f64,
    pub tax_adjustment: f64,
    pub owner_payout: f64,
}

/// Drop Airbnb-sourced lines entirely when the company cohosts that
/// channel: its payouts never flow through these statements.
pub fn apply_cohost_exclusion(
    lines: Vec<ReservationLine>,
    policy: &EffectivePolicy,
) -> (Vec<ReservationLine>, usize) {
    if !policy.is_cohost_on_airbnb {
        return (lines, 0);
    }
    let before = lines.len();
    let kept: Vec<ReservationLine> = lines
        .into_iter()
        .filter(|line| line.platform != Platform::Airbnb)
        .collect();
    let excluded = before - kept.len();
    (kept, excluded)
}

/// Apply commission, tax, and pass-through rules to attributed revenue.
///
/// `lines` must already have cohost exclusions applied.
pub fn calculate(
    lines: &[ReservationLine],
    policy: &EffectivePolicy,
    expense_total: f64,
    tech_fees: f64,
    insurance_fees: f64,
    adjustments: f64,
) -> FeeBreakdown {
    let stay_revenue: f64 = lines.iter().map(|line| line.attributed.gross_payout).sum();

    let cleaning_pass_through = if policy.cleaning_fee_pass_through {
        round2(
            lines
                .iter()
                .map(|line| policy.default_cleaning_fee * line.share)
                .sum(),
        )
    } else {
        0.0
    };

    let damage_pass_through = if policy.guest_paid_damage_coverage {
        lines
            .iter()
            .map(|line| line.attributed.damage_coverage)
            .sum()
    } else {
        0.0
    };

    // Pass-through components are forwarded to the owner, never commissioned.
    let commissionable_base = round2(stay_revenue - damage_pass_through);
    let pm_commission = round2(commissionable_base * policy.pm_percentage / 100.0);

    // disregard_tax is an unconditional override of platform pass-through.
    let tax_adjustment = if policy.airbnb_pass_through_tax && !policy.disregard_tax {
        round2(
            lines
                .iter()
                .filter(|line| line.platform == Platform::Airbnb)
                .map(|line| line.attributed.tax_amount)
                .sum(),
        )
    } else {
        0.0
    };

    let total_revenue = round2(stay_revenue + cleaning_pass_through);
    let deducted_commission = if policy.waive_commission {
        0.0
    } else {
        pm_commission
    };
    let owner_payout = round2(
        total_revenue - expense_total - deducted_commission - tech_fees - insurance_fees
            + adjustments
            + tax_adjustment,
    );

    FeeBreakdown {
        total_revenue,
        cleaning_pass_through,
        commissionable_base,
        pm_commission,
        commission_waived: policy.waive_commission,
        deducted_commission,
        tax_adjustment,
        owner_payout,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{apply_cohost_exclusion, calculate};
    use crate::domain::{EffectivePolicy, Platform, ReservationFinancials, ReservationLine};

    fn policy() -> EffectivePolicy {
        EffectivePolicy {
            pm_percentage: 15.0,
            waive_commission: false,
            disregard_tax: false,
            airbnb_pass_through_tax: false,
            cleaning_fee_pass_through: false,
            is_cohost_on_airbnb: false,
            guest_paid_damage_coverage: false,
            default_cleaning_fee: 150.0,
            default_pet_fee: 0.0,
        }
    }

    fn line(platform: Platform, share: f64, financials: ReservationFinancials) -> ReservationLine {
        let date = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        ReservationLine {
            reservation_id: "r1".to_string(),
            guest_name: "Alex Guest".to_string(),
            check_in: date("2025-01-02"),
            check_out: date("2025-01-05"),
            nights: 3,
            overlap_nights: 3,
            share,
            platform,
            attributed: financials.scaled(share),
            original: financials,
            zero_night_fallback: false,
        }
    }

    fn payout(amount: f64) -> ReservationFinancials {
        ReservationFinancials {
            base_rate: amount,
            gross_payout: amount,
            ..Default::default()
        }
    }

    #[test]
    fn checkout_scenario_commission_fifteen_percent_of_three_hundred() {
        let lines = vec![line(Platform::Airbnb, 1.0, payout(300.0))];
        let breakdown = calculate(&lines, &policy(), 0.0, 0.0, 0.0, 0.0);
        assert_eq!(breakdown.commissionable_base, 300.0);
        assert_eq!(breakdown.pm_commission, 45.0);
        assert_eq!(breakdown.owner_payout, 255.0);
    }

    #[test]
    fn waived_commission_is_displayed_but_not_deducted() {
        let mut p = policy();
        p.waive_commission = true;
        let lines = vec![line(Platform::Airbnb, 1.0, payout(300.0))];
        let breakdown = calculate(&lines, &p, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(breakdown.pm_commission, 45.0);
        assert!(breakdown.commission_waived);
        assert_eq!(breakdown.deducted_commission, 0.0);
        assert_eq!(breakdown.owner_payout, 300.0);
    }

    #[test]
    fn airbnb_tax_added_back_only_for_airbnb_lines() {
        let mut p = policy();
        p.airbnb_pass_through_tax = true;
        let mut airbnb = payout(200.0);
        airbnb.tax_amount = 20.0;
        let mut vrbo = payout(100.0);
        vrbo.tax_amount = 10.0;
        let lines = vec![
            line(Platform::Airbnb, 1.0, airbnb),
            line(Platform::Vrbo, 1.0, vrbo),
        ];
        let breakdown = calculate(&lines, &p, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(breakdown.tax_adjustment, 20.0);
    }

    #[test]
    fn disregard_tax_unconditionally_overrides_pass_through() {
        let mut p = policy();
        p.airbnb_pass_through_tax = true;
        p.disregard_tax = true;
        let mut financials = payout(200.0);
        financials.tax_amount = 20.0;
        let lines = vec![line(Platform::Airbnb, 1.0, financials)];
        let breakdown = calculate(&lines, &p, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(breakdown.tax_adjustment, 0.0);
    }

    #[test]
    fn cohost_excludes_airbnb_revenue_entirely() {
        let mut p = policy();
        p.is_cohost_on_airbnb = true;
        let lines = vec![
            line(Platform::Airbnb, 1.0, payout(400.0)),
            line(Platform::Direct, 1.0, payout(250.0)),
        ];
        let (kept, excluded) = apply_cohost_exclusion(lines, &p);
        assert_eq!(excluded, 1);
        assert_eq!(kept.len(), 1);
        let breakdown = calculate(&kept, &p, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(breakdown.total_revenue, 250.0);
    }

    #[test]
    fn damage_coverage_is_excluded_from_the_commissionable_base() {
        let mut p = policy();
        p.guest_paid_damage_coverage = true;
        let mut financials = payout(300.0);
        financials.damage_coverage = 50.0;
        let lines = vec![line(Platform::Direct, 1.0, financials)];
        let breakdown = calculate(&lines, &p, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(breakdown.commissionable_base, 250.0);
        assert_eq!(breakdown.pm_commission, 37.5);
    }

    #[test]
    fn cleaning_pass_through_bills_the_default_fee_as_revenue() {
        let mut p = policy();
        p.cleaning_fee_pass_through = true;
        let lines = vec![line(Platform::Direct, 1.0, payout(300.0))];
        let breakdown = calculate(&lines, &p, 120.0, 0.0, 0.0, 0.0);
        assert_eq!(breakdown.cleaning_pass_through, 150.0);
        assert_eq!(breakdown.total_revenue, 450.0);
        // Actual cleaning expense still hits the expense side.
        assert_eq!(breakdown.owner_payout, 450.0 - 120.0 - breakdown.pm_commission);
    }

    #[test]
    fn payout_identity_holds_with_fees_and_adjustments() {
        let lines = vec![line(Platform::Direct, 1.0, payout(1000.0))];
        let breakdown = calculate(&lines, &policy(), 200.0, 25.0, 15.0, 10.0);
        assert_eq!(
            breakdown.owner_payout,
            1000.0 - 200.0 - 150.0 - 25.0 - 15.0 + 10.0
        );
    }
}
