use crate::entities::order::{self, OrderStatus, PaymentStatus};
use crate::errors::ServiceError;
use crate::services::notifications::NotificationService;
use crate::stripe::{session_from_value, GatewaySession, PaymentGateway, SessionStatus, WebhookEvent};
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Settled state of a hosted checkout session, as far as the order is
/// concerned. Sessions still open map to no outcome at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid { payment_intent: Option<String> },
    Expired,
}

/// Derives the order-facing outcome from a processor session. Open, unpaid
/// sessions yield nothing; reconciliation simply waits.
pub fn outcome_from_session(session: &GatewaySession) -> Option<PaymentOutcome> {
    if session.is_paid() {
        return Some(PaymentOutcome::Paid {
            payment_intent: session.payment_intent.clone(),
        });
    }
    if session.status == SessionStatus::Expired {
        return Some(PaymentOutcome::Expired);
    }
    None
}

/// True when a pending order is recent enough for the sweep to touch. Older
/// orders are left alone for manual review.
pub fn within_sweep_window(
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    window_hours: i64,
) -> bool {
    created_at >= now - Duration::hours(window_hours)
}

/// Result of one reconciliation sweep run.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SweepSummary {
    /// Pending orders examined this run.
    pub total: u64,
    /// Orders moved to paid.
    pub synced: u64,
    /// Orders whose sessions had expired, moved to failed.
    pub failed: u64,
    /// Orders left untouched (still open, already transitioned elsewhere, or
    /// the processor could not be reached for them).
    pub skipped: u64,
    pub timestamp: DateTime<Utc>,
}

/// Poll result for one order.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VerifyResult {
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    /// Raw processor-side session status, when one was consulted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_status: Option<String>,
}

#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    notifications: NotificationService,
    sweep_window_hours: i64,
    sweep_batch_size: u64,
}

impl ReconciliationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        notifications: NotificationService,
        sweep_window_hours: i64,
        sweep_batch_size: u64,
    ) -> Self {
        Self {
            db,
            gateway,
            notifications,
            sweep_window_hours,
            sweep_batch_size,
        }
    }

    /// Applies a settled outcome to an order as a single conditional update
    /// scoped to `payment_status = pending`. Returns false when no row
    /// matched, which makes every trigger (webhook, poll, sweep) idempotent:
    /// an order already transitioned is simply left alone, and completed
    /// orders can never regress to failed.
    #[instrument(skip(self))]
    pub async fn apply_payment_outcome(
        &self,
        order_id: Uuid,
        outcome: PaymentOutcome,
    ) -> Result<bool, ServiceError> {
        let now = Utc::now();
        let mut update = order::Entity::update_many()
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending));

        update = match &outcome {
            PaymentOutcome::Paid { payment_intent } => update
                .col_expr(
                    order::Column::PaymentStatus,
                    Expr::value(PaymentStatus::Completed),
                )
                .col_expr(order::Column::Status, Expr::value(OrderStatus::Processing))
                .col_expr(
                    order::Column::PaymentIntentId,
                    Expr::value(payment_intent.clone()),
                )
                .col_expr(order::Column::UpdatedAt, Expr::value(Some(now))),
            PaymentOutcome::Expired => update
                .col_expr(
                    order::Column::PaymentStatus,
                    Expr::value(PaymentStatus::Failed),
                )
                .col_expr(order::Column::Status, Expr::value(OrderStatus::Cancelled))
                .col_expr(order::Column::UpdatedAt, Expr::value(Some(now))),
        };

        let result = update.exec(&*self.db).await?;
        let applied = result.rows_affected > 0;

        match (&outcome, applied) {
            (PaymentOutcome::Paid { .. }, true) => {
                info!(%order_id, "Payment confirmed; order moved to processing");
                // Fires exactly once per order because only the winning
                // transition reaches this branch.
                self.notifications.notify_payment_completed(order_id).await;
            }
            (PaymentOutcome::Expired, true) => {
                info!(%order_id, "Checkout session expired; order cancelled");
            }
            (_, false) => {
                info!(%order_id, "Payment outcome already applied; no-op");
            }
        }

        Ok(applied)
    }

    /// Webhook trigger. Handles session completion and expiry events; other
    /// event types are acknowledged and ignored.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn confirm_from_webhook(&self, event: WebhookEvent) -> Result<(), ServiceError> {
        match event.event_type.as_str() {
            "checkout.session.completed" | "checkout.session.expired"
            | "checkout.session.async_payment_succeeded"
            | "checkout.session.async_payment_failed" => {}
            other => {
                info!(event_type = other, "Ignoring unhandled webhook event");
                return Ok(());
            }
        }

        let session = session_from_value(event.data.object)?;
        let Some(order_id) = session.order_id() else {
            warn!(session_id = %session.id, "Webhook session carries no order id; skipping");
            return Ok(());
        };

        match outcome_from_session(&session) {
            Some(outcome) => {
                self.apply_payment_outcome(order_id, outcome).await?;
            }
            None => {
                info!(%order_id, session_id = %session.id, "Session not settled yet; skipping");
            }
        }

        Ok(())
    }

    /// Poll trigger, driven by the storefront's success-page redirect. Looks
    /// up the order's session at the processor and applies whatever outcome
    /// it reports.
    #[instrument(skip(self))]
    pub async fn verify_payment(&self, order_id: Uuid) -> Result<VerifyResult, ServiceError> {
        let order = self.load_order(order_id).await?;

        // Already settled locally; no processor round-trip needed.
        if order.payment_status != PaymentStatus::Pending {
            return Ok(VerifyResult {
                order_id,
                payment_status: order.payment_status,
                order_status: order.status,
                stripe_status: None,
            });
        }

        let session = match &order.stripe_session_id {
            Some(session_id) => Some(self.gateway.fetch_checkout_session(session_id).await?),
            // No session recorded locally; fall back to metadata search. A
            // session created just before a crash would be found this way.
            None => {
                let sessions = self.gateway.find_sessions_for_order(order_id).await?;
                sessions.into_iter().find(|s| s.is_paid())
            }
        };

        let Some(session) = session else {
            return Ok(VerifyResult {
                order_id,
                payment_status: order.payment_status,
                order_status: order.status,
                stripe_status: None,
            });
        };

        let stripe_status = Some(format!("{:?}", session.status).to_lowercase());
        if let Some(outcome) = outcome_from_session(&session) {
            self.apply_payment_outcome(order_id, outcome).await?;
        }

        let refreshed = self.load_order(order_id).await?;
        Ok(VerifyResult {
            order_id,
            payment_status: refreshed.payment_status,
            order_status: refreshed.status,
            stripe_status,
        })
    }

    /// Sweep trigger: reconciles recent pending card/FPX orders in bulk.
    /// Errors on individual orders are isolated; one unreachable session must
    /// not abort the run.
    #[instrument(skip(self))]
    pub async fn sweep_pending(&self) -> Result<SweepSummary, ServiceError> {
        let now = Utc::now();
        let cutoff = now - Duration::hours(self.sweep_window_hours);

        let candidates = order::Entity::find()
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .filter(order::Column::StripeSessionId.is_not_null())
            .filter(order::Column::CreatedAt.gte(cutoff))
            .order_by_asc(order::Column::CreatedAt)
            .limit(self.sweep_batch_size)
            .all(&*self.db)
            .await?;

        let mut summary = SweepSummary {
            total: candidates.len() as u64,
            synced: 0,
            failed: 0,
            skipped: 0,
            timestamp: now,
        };

        for candidate in candidates {
            if !within_sweep_window(candidate.created_at, now, self.sweep_window_hours) {
                summary.skipped += 1;
                continue;
            }
            let session_id = match &candidate.stripe_session_id {
                Some(id) => id.clone(),
                None => {
                    summary.skipped += 1;
                    continue;
                }
            };

            let session = match self.gateway.fetch_checkout_session(&session_id).await {
                Ok(session) => session,
                Err(e) => {
                    warn!(order_id = %candidate.id, error = %e, "Sweep could not reach processor; skipping order");
                    summary.skipped += 1;
                    continue;
                }
            };

            match outcome_from_session(&session) {
                Some(outcome @ PaymentOutcome::Paid { .. }) => {
                    match self.apply_payment_outcome(candidate.id, outcome).await {
                        Ok(true) => summary.synced += 1,
                        Ok(false) => summary.skipped += 1,
                        Err(e) => {
                            warn!(order_id = %candidate.id, error = %e, "Sweep transition failed");
                            summary.skipped += 1;
                        }
                    }
                }
                Some(outcome @ PaymentOutcome::Expired) => {
                    match self.apply_payment_outcome(candidate.id, outcome).await {
                        Ok(true) => summary.failed += 1,
                        Ok(false) => summary.skipped += 1,
                        Err(e) => {
                            warn!(order_id = %candidate.id, error = %e, "Sweep transition failed");
                            summary.skipped += 1;
                        }
                    }
                }
                None => summary.skipped += 1,
            }
        }

        info!(
            total = summary.total,
            synced = summary.synced,
            failed = summary.failed,
            skipped = summary.skipped,
            "Reconciliation sweep complete"
        );
        Ok(summary)
    }

    async fn load_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stripe::SessionPaymentStatus;
    use std::collections::HashMap;

    fn session(status: SessionStatus, payment_status: SessionPaymentStatus) -> GatewaySession {
        GatewaySession {
            id: "cs_test".into(),
            url: None,
            status,
            payment_status,
            payment_intent: Some("pi_1".into()),
            amount_total: Some(14999),
            currency: Some("myr".into()),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn paid_sessions_settle_as_paid() {
        let outcome =
            outcome_from_session(&session(SessionStatus::Complete, SessionPaymentStatus::Paid));
        assert_eq!(
            outcome,
            Some(PaymentOutcome::Paid {
                payment_intent: Some("pi_1".into())
            })
        );
    }

    #[test]
    fn expired_unpaid_sessions_settle_as_expired() {
        let outcome = outcome_from_session(&session(
            SessionStatus::Expired,
            SessionPaymentStatus::Unpaid,
        ));
        assert_eq!(outcome, Some(PaymentOutcome::Expired));
    }

    #[test]
    fn open_sessions_have_no_outcome_yet() {
        let outcome =
            outcome_from_session(&session(SessionStatus::Open, SessionPaymentStatus::Unpaid));
        assert_eq!(outcome, None);
    }

    #[test]
    fn sweep_window_bounds() {
        let now = Utc::now();
        assert!(within_sweep_window(now - Duration::hours(47), now, 48));
        assert!(!within_sweep_window(now - Duration::hours(49), now, 48));
    }
}
