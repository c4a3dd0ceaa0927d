use chrono::Utc;
use reqwest::Client;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::domain::{Statement, StatementStatus};
use crate::error::{AppError, AppResult};
use crate::providers::{email, payments};
use crate::repository::statements as statement_repo;

/// The statement lifecycle: draft -> final -> sent -> paid, with a single
/// back-edge to draft from `final` and `paid`. A sent statement can never
/// revert because the owner already has the email in hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Finalize,
    Send,
    MarkPaid,
    RevertToDraft,
    Delete,
}

impl LifecycleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Finalize => "finalize",
            Self::Send => "send",
            Self::MarkPaid => "mark-paid",
            Self::RevertToDraft => "revert-to-draft",
            Self::Delete => "delete",
        }
    }
}

/// Guard every transition before touching storage. The conditional UPDATE
/// in the repository re-checks the same state, so a race between two
/// callers surfaces as a persistence conflict rather than a double apply.
pub fn check_transition(status: StatementStatus, action: LifecycleAction) -> AppResult<()> {
    use LifecycleAction::*;
    use StatementStatus::*;

    let allowed = matches!(
        (status, action),
        (Draft, Finalize) | (Final, Send) | (Sent, MarkPaid) | (Final, RevertToDraft)
            | (Paid, RevertToDraft)
            | (Draft, Delete)
    );
    if allowed {
        return Ok(());
    }

    let reason = match (status, action) {
        (Draft, RevertToDraft) => "statement is already a draft".to_string(),
        (Sent, RevertToDraft) => {
            "statement has been sent to the owner and can no longer revert".to_string()
        }
        (status, Delete) => format!(
            "only drafts can be deleted, statement is '{}'",
            status.as_str()
        ),
        (status, action) => format!(
            "cannot {} a '{}' statement",
            action.as_str(),
            status.as_str()
        ),
    };
    Err(AppError::InvalidTransition(reason))
}

/// Freeze a draft. The policy snapshot was captured at build time, so from
/// here on recomputation never reads the live listing row.
pub async fn finalize(pool: &PgPool, statement: &mut Statement) -> AppResult<()> {
    check_transition(statement.status, LifecycleAction::Finalize)?;
    statement.status = StatementStatus::Final;
    statement_repo::transition(pool, statement, StatementStatus::Draft).await?;
    tracing::info!(statement_id = %statement.id, "statement finalized");
    Ok(())
}

/// Email the finalized statement to the owner and mark it sent. The email
/// leaves first; if the status write then loses a race the operator sees a
/// conflict and the statement stays `final` with the delivery logged.
pub async fn send(
    pool: &PgPool,
    http: &Client,
    config: &AppConfig,
    statement: &mut Statement,
    recipient: &str,
    subject: &str,
    html: &str,
) -> AppResult<()> {
    check_transition(statement.status, LifecycleAction::Send)?;

    let message_id = email::send_statement_email(http, config, recipient, subject, html).await?;
    email::record_email_log(pool, statement.id, recipient, &message_id).await?;

    statement.status = StatementStatus::Sent;
    statement.sent_at = Some(Utc::now());
    statement_repo::transition(pool, statement, StatementStatus::Final).await?;
    tracing::info!(statement_id = %statement.id, recipient, "statement sent");
    Ok(())
}

/// Pay out a sent statement. A provider failure records the error on the
/// statement and leaves it `sent` so the operator can retry.
pub async fn mark_paid(
    pool: &PgPool,
    http: &Client,
    config: &AppConfig,
    statement: &mut Statement,
) -> AppResult<()> {
    check_transition(statement.status, LifecycleAction::MarkPaid)?;

    let transfer = match payments::create_owner_transfer(
        http,
        config,
        statement.id,
        &statement.owner_id,
        statement.owner_payout,
    )
    .await
    {
        Ok(transfer) => transfer,
        Err(provider_error) => {
            statement.payout_status = Some("failed".to_string());
            statement.payout_error = Some(provider_error.to_string());
            statement_repo::transition(pool, statement, StatementStatus::Sent).await?;
            return Err(provider_error);
        }
    };

    statement.status = StatementStatus::Paid;
    statement.payout_status = Some("paid".to_string());
    statement.paid_at = Some(Utc::now());
    statement.transfer_id = Some(transfer.transfer_id);
    statement.payout_fee = Some(transfer.fee);
    statement.payout_error = None;
    statement_repo::transition(pool, statement, StatementStatus::Sent).await?;
    tracing::info!(
        statement_id = %statement.id,
        payout = statement.owner_payout,
        "statement paid"
    );
    Ok(())
}

/// Reopen a final or paid statement for editing. Delivery and payout
/// bookkeeping resets; the policy snapshot is kept so a later finalize
/// still reflects the terms the period was built under.
pub async fn revert_to_draft(pool: &PgPool, statement: &mut Statement) -> AppResult<()> {
    check_transition(statement.status, LifecycleAction::RevertToDraft)?;
    let expected = statement.status;

    statement.status = StatementStatus::Draft;
    statement.sent_at = None;
    statement.payout_status = None;
    statement.paid_at = None;
    statement.transfer_id = None;
    statement.payout_fee = None;
    statement.payout_error = None;
    statement_repo::transition(pool, statement, expected).await?;
    tracing::info!(statement_id = %statement.id, "statement reverted to draft");
    Ok(())
}

pub async fn delete(pool: &PgPool, statement: &Statement) -> AppResult<()> {
    check_transition(statement.status, LifecycleAction::Delete)?;
    statement_repo::delete_draft(pool, statement.id).await?;
    tracing::info!(statement_id = %statement.id, "draft statement deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{check_transition, LifecycleAction};
    use crate::domain::StatementStatus;
    use crate::error::AppError;

    const ALL_STATUSES: [StatementStatus; 4] = [
        StatementStatus::Draft,
        StatementStatus::Final,
        StatementStatus::Sent,
        StatementStatus::Paid,
    ];

    const ALL_ACTIONS: [LifecycleAction; 5] = [
        LifecycleAction::Finalize,
        LifecycleAction::Send,
        LifecycleAction::MarkPaid,
        LifecycleAction::RevertToDraft,
        LifecycleAction::Delete,
    ];

    fn allowed(status: StatementStatus, action: LifecycleAction) -> bool {
        check_transition(status, action).is_ok()
    }

    #[test]
    fn forward_path_is_draft_final_sent_paid() {
        assert!(allowed(StatementStatus::Draft, LifecycleAction::Finalize));
        assert!(allowed(StatementStatus::Final, LifecycleAction::Send));
        assert!(allowed(StatementStatus::Sent, LifecycleAction::MarkPaid));
    }

    #[test]
    fn revert_allowed_only_from_final_and_paid() {
        assert!(allowed(StatementStatus::Final, LifecycleAction::RevertToDraft));
        assert!(allowed(StatementStatus::Paid, LifecycleAction::RevertToDraft));
        assert!(!allowed(StatementStatus::Draft, LifecycleAction::RevertToDraft));
        assert!(!allowed(StatementStatus::Sent, LifecycleAction::RevertToDraft));
    }

    #[test]
    fn delete_is_draft_only() {
        assert!(allowed(StatementStatus::Draft, LifecycleAction::Delete));
        assert!(!allowed(StatementStatus::Final, LifecycleAction::Delete));
        assert!(!allowed(StatementStatus::Sent, LifecycleAction::Delete));
        assert!(!allowed(StatementStatus::Paid, LifecycleAction::Delete));
    }

    #[test]
    fn every_disallowed_pair_yields_invalid_transition() {
        for status in ALL_STATUSES {
            for action in ALL_ACTIONS {
                match check_transition(status, action) {
                    Ok(()) => {}
                    Err(AppError::InvalidTransition(_)) => {}
                    Err(other) => panic!("unexpected error kind: {other}"),
                }
            }
        }
    }

    #[test]
    fn exactly_six_pairs_are_allowed() {
        let count = ALL_STATUSES
            .iter()
            .flat_map(|s| ALL_ACTIONS.iter().map(move |a| (*s, *a)))
            .filter(|(s, a)| allowed(*s, *a))
            .count();
        assert_eq!(count, 6);
    }

    #[test]
    fn sent_revert_message_mentions_delivery() {
        let err = check_transition(StatementStatus::Sent, LifecycleAction::RevertToDraft)
            .unwrap_err();
        assert!(err.to_string().contains("sent"));
    }
}
