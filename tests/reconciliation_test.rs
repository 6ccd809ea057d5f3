mod common;

use aurum_api::entities::order::{OrderStatus, PaymentStatus};
use aurum_api::services::reconciliation::PaymentOutcome;
use aurum_api::stripe::webhook::WebhookEvent;
use aurum_api::stripe::{SessionPaymentStatus, SessionStatus};
use common::{insert_order, OrderFixture, TestApp};
use serde_json::json;

fn paid_session_event(session_id: &str, order_id: uuid::Uuid) -> WebhookEvent {
    serde_json::from_value(json!({
        "id": "evt_test",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "status": "complete",
                "payment_status": "paid",
                "payment_intent": "pi_webhook",
                "metadata": { "order_id": order_id.to_string() }
            }
        }
    }))
    .expect("build webhook event")
}

#[tokio::test]
async fn paid_session_completes_order_and_notifies_once() {
    let app = TestApp::new().await;
    let order = insert_order(&app.db, OrderFixture::default().with_session("cs_1")).await;
    app.gateway.put_session(
        "cs_1",
        order.id,
        SessionStatus::Complete,
        SessionPaymentStatus::Paid,
        Some("pi_1"),
    );

    let result = app.reconciliation.verify_payment(order.id).await.unwrap();
    assert_eq!(result.payment_status, PaymentStatus::Completed);
    assert_eq!(result.order_status, OrderStatus::Processing);

    let stored = app.order(order.id).await;
    assert_eq!(stored.payment_status, PaymentStatus::Completed);
    assert_eq!(stored.status, OrderStatus::Processing);
    assert_eq!(stored.payment_intent_id.as_deref(), Some("pi_1"));
    assert_eq!(app.notification_count(order.id).await, 1);

    // Polling again is a no-op; the notification does not duplicate.
    let again = app.reconciliation.verify_payment(order.id).await.unwrap();
    assert_eq!(again.payment_status, PaymentStatus::Completed);
    assert_eq!(app.notification_count(order.id).await, 1);
}

#[tokio::test]
async fn webhook_and_poll_agree_on_a_single_transition() {
    let app = TestApp::new().await;
    let order = insert_order(&app.db, OrderFixture::default().with_session("cs_1")).await;
    app.gateway.put_session(
        "cs_1",
        order.id,
        SessionStatus::Complete,
        SessionPaymentStatus::Paid,
        Some("pi_1"),
    );

    app.reconciliation
        .confirm_from_webhook(paid_session_event("cs_1", order.id))
        .await
        .unwrap();
    app.reconciliation.verify_payment(order.id).await.unwrap();

    let stored = app.order(order.id).await;
    assert_eq!(stored.payment_status, PaymentStatus::Completed);
    // Webhook set the intent it carried; poll did not overwrite anything.
    assert_eq!(stored.payment_intent_id.as_deref(), Some("pi_webhook"));
    assert_eq!(app.notification_count(order.id).await, 1);
}

#[tokio::test]
async fn completed_order_never_regresses_to_failed() {
    let app = TestApp::new().await;
    let order = insert_order(
        &app.db,
        OrderFixture {
            payment_status: PaymentStatus::Completed,
            status: OrderStatus::Processing,
            ..OrderFixture::default().with_session("cs_1")
        },
    )
    .await;

    let applied = app
        .reconciliation
        .apply_payment_outcome(order.id, PaymentOutcome::Expired)
        .await
        .unwrap();
    assert!(!applied);

    let stored = app.order(order.id).await;
    assert_eq!(stored.payment_status, PaymentStatus::Completed);
    assert_eq!(stored.status, OrderStatus::Processing);
}

#[tokio::test]
async fn expired_session_fails_and_cancels_the_order() {
    let app = TestApp::new().await;
    let order = insert_order(&app.db, OrderFixture::default().with_session("cs_1")).await;
    app.gateway.put_session(
        "cs_1",
        order.id,
        SessionStatus::Expired,
        SessionPaymentStatus::Unpaid,
        None,
    );

    let result = app.reconciliation.verify_payment(order.id).await.unwrap();
    assert_eq!(result.payment_status, PaymentStatus::Failed);
    assert_eq!(result.order_status, OrderStatus::Cancelled);
    assert_eq!(app.notification_count(order.id).await, 0);
}

#[tokio::test]
async fn open_session_leaves_the_order_pending() {
    let app = TestApp::new().await;
    let order = insert_order(&app.db, OrderFixture::default().with_session("cs_1")).await;
    app.gateway.put_session(
        "cs_1",
        order.id,
        SessionStatus::Open,
        SessionPaymentStatus::Unpaid,
        None,
    );

    let result = app.reconciliation.verify_payment(order.id).await.unwrap();
    assert_eq!(result.payment_status, PaymentStatus::Pending);
    assert_eq!(result.order_status, OrderStatus::Pending);
}

#[tokio::test]
async fn webhook_ignores_unrelated_event_types() {
    let app = TestApp::new().await;
    let order = insert_order(&app.db, OrderFixture::default().with_session("cs_1")).await;

    let event: WebhookEvent = serde_json::from_value(json!({
        "id": "evt_other",
        "type": "invoice.created",
        "data": { "object": { "id": "in_1" } }
    }))
    .unwrap();

    app.reconciliation.confirm_from_webhook(event).await.unwrap();
    assert_eq!(app.order(order.id).await.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn sweep_only_touches_orders_within_the_window() {
    let app = TestApp::new().await;

    let recent = insert_order(&app.db, OrderFixture::aged(47).with_session("cs_recent")).await;
    let stale = insert_order(&app.db, OrderFixture::aged(49).with_session("cs_stale")).await;

    for (session, order_id) in [("cs_recent", recent.id), ("cs_stale", stale.id)] {
        app.gateway.put_session(
            session,
            order_id,
            SessionStatus::Complete,
            SessionPaymentStatus::Paid,
            Some("pi_sweep"),
        );
    }

    let summary = app.reconciliation.sweep_pending().await.unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.synced, 1);
    assert_eq!(summary.failed, 0);

    assert_eq!(app.order(recent.id).await.payment_status, PaymentStatus::Completed);
    // The stale order is left for manual review.
    assert_eq!(app.order(stale.id).await.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn sweep_isolates_processor_failures_per_order() {
    let app = TestApp::new().await;

    let broken = insert_order(&app.db, OrderFixture::default().with_session("cs_broken")).await;
    let paid = insert_order(&app.db, OrderFixture::default().with_session("cs_paid")).await;
    let expired = insert_order(&app.db, OrderFixture::default().with_session("cs_expired")).await;

    app.gateway.put_session(
        "cs_paid",
        paid.id,
        SessionStatus::Complete,
        SessionPaymentStatus::Paid,
        Some("pi_1"),
    );
    app.gateway.put_session(
        "cs_expired",
        expired.id,
        SessionStatus::Expired,
        SessionPaymentStatus::Unpaid,
        None,
    );
    app.gateway.put_session(
        "cs_broken",
        broken.id,
        SessionStatus::Open,
        SessionPaymentStatus::Unpaid,
        None,
    );
    app.gateway.fail_fetch_for("cs_broken");

    let summary = app.reconciliation.sweep_pending().await.unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.synced, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 1);

    assert_eq!(app.order(paid.id).await.payment_status, PaymentStatus::Completed);
    assert_eq!(app.order(expired.id).await.payment_status, PaymentStatus::Failed);
    assert_eq!(app.order(broken.id).await.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn poll_falls_back_to_metadata_search_without_a_stored_session() {
    let app = TestApp::new().await;
    let order = insert_order(&app.db, OrderFixture::default()).await;

    app.gateway.put_session(
        "cs_orphan",
        order.id,
        SessionStatus::Complete,
        SessionPaymentStatus::Paid,
        Some("pi_orphan"),
    );

    let result = app.reconciliation.verify_payment(order.id).await.unwrap();
    assert_eq!(result.payment_status, PaymentStatus::Completed);
    assert_eq!(
        app.order(order.id).await.payment_intent_id.as_deref(),
        Some("pi_orphan")
    );
}
