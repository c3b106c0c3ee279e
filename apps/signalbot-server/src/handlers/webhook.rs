use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

/// Razorpay webhook. Nothing is parsed or touched before the signature checks out.
#[instrument(skip_all)]
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if let Err(e) = state.gateway.verify_webhook_signature(&body, signature) {
        warn!("Rejected webhook: {}", e);
        return e.into_response();
    }

    let event = match state.gateway.parse_event(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("Unreadable webhook: {}", e);
            return e.into_response();
        }
    };

    match state.payments.handle_event(event).await {
        Ok(outcome) => {
            info!("Webhook handled: {:?}", outcome);
            (StatusCode::OK, Json(json!({ "status": outcome.label() }))).into_response()
        }
        // The operator already has the alert; a retry would only repeat it
        Err(e) if e.needs_operator() => {
            (StatusCode::OK, Json(json!({ "status": "rejected", "error": e.to_string() })))
                .into_response()
        }
        Err(e) => {
            warn!("Webhook processing failed: {}", e);
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use std::sync::Arc;

    use signalbot_db::models::PaymentStatus;
    use signalbot_shared::{Plan, PlanCatalog, PlanId};
    use tower::ServiceExt;

    use crate::handlers::router;
    use crate::testing::{ADMIN_ID, FlakyPeriods, Harness, wait_for_sent};

    fn paid_body(link_id: &str, user_id: i64, plan: &str, amount: i64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "entity": "event",
            "event": "payment_link.paid",
            "payload": {
                "payment_link": { "entity": {
                    "id": link_id,
                    "status": "paid",
                    "amount_paid": amount,
                    "notes": { "telegram_id": user_id.to_string(), "plan": plan }
                }},
                "payment": { "entity": { "id": "pay_1", "amount": amount } }
            }
        }))
        .unwrap()
    }

    async fn post(h: &Harness, body: Vec<u8>, signature: Option<String>) -> (StatusCode, Value) {
        let mut request = Request::post("/razorpay-webhook").header("content-type", "application/json");
        if let Some(sig) = signature {
            request = request.header(SIGNATURE_HEADER, sig);
        }
        let response = router(h.state.clone())
            .oneshot(request.body(Body::from(body)).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn signed_paid_event_activates_subscription() {
        let h = Harness::new();
        h.seed_user(42).await;
        h.state
            .payments
            .create_record(42, "bronze", 199, "plink_1", None)
            .await
            .unwrap();

        let body = paid_body("plink_1", 42, "bronze", 199);
        let sig = h.gateway.sign(&body);
        let (status, json) = post(&h, body.clone(), Some(sig.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "confirmed");
        assert!(h.state.subscriptions.status_of(42).await.unwrap().is_active());

        let (status, json) = post(&h, body, Some(sig)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "duplicate");
        assert_eq!(h.state.subscriptions.history(42).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tampered_or_unsigned_payload_changes_nothing() {
        let h = Harness::new();
        h.seed_user(42).await;
        h.state
            .payments
            .create_record(42, "gold", 1499, "plink_1", None)
            .await
            .unwrap();

        let genuine = paid_body("plink_1", 42, "gold", 1499);
        let sig = h.gateway.sign(&genuine);
        let forged = paid_body("plink_1", 42, "gold", 1);

        let (status, _) = post(&h, forged, Some(sig)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, json) = post(&h, genuine, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");

        let record = h.state.payments.get("plink_1").await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Created);
        assert!(h.state.subscriptions.history(42).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retired_plan_is_rejected_after_payment() {
        let before = Harness::new();
        before.seed_user(42).await;
        before
            .state
            .payments
            .create_record(42, "gold", 1499, "plink_1", None)
            .await
            .unwrap();
        let h = before.reopen(PlanCatalog::new(vec![Plan::new(PlanId::Bronze, "Bronze", 199, 30)]).unwrap());

        let body = paid_body("plink_1", 42, "gold", 1499);
        let sig = h.gateway.sign(&body);
        let (status, json) = post(&h, body, Some(sig)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "rejected");

        let record = h.state.payments.get("plink_1").await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Paid);
        assert!(h.state.subscriptions.history(42).await.unwrap().is_empty());
        let sent = wait_for_sent(&h.messenger, 1).await;
        assert!(
            sent.iter()
                .any(|(chat, text)| *chat == ADMIN_ID && text.contains("gold"))
        );
    }

    #[tokio::test]
    async fn store_outage_is_retried_until_access_is_granted() {
        let h = Harness::with_periods(|store| Arc::new(FlakyPeriods::new(store)));
        h.seed_user(42).await;
        h.state
            .payments
            .create_record(42, "bronze", 199, "plink_1", None)
            .await
            .unwrap();

        let body = paid_body("plink_1", 42, "bronze", 199);
        let sig = h.gateway.sign(&body);
        let (status, json) = post(&h, body.clone(), Some(sig.clone())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "internal error");

        let (status, json) = post(&h, body, Some(sig)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "confirmed");
        assert!(h.state.subscriptions.status_of(42).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn malformed_notes_are_a_bad_request() {
        let h = Harness::new();
        let body = serde_json::to_vec(&json!({
            "event": "payment_link.paid",
            "payload": {
                "payment_link": { "entity": { "id": "plink_1", "notes": { "plan": "gold" } } },
                "payment": { "entity": { "id": "pay_1", "amount": 1499 } }
            }
        }))
        .unwrap();
        let sig = h.gateway.sign(&body);

        let (status, _) = post(&h, body, Some(sig)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unrelated_events_are_acknowledged() {
        let h = Harness::new();
        let body = serde_json::to_vec(&json!({ "event": "payment.captured", "payload": {} })).unwrap();
        let sig = h.gateway.sign(&body);

        let (status, json) = post(&h, body, Some(sig)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ignored");
    }

    #[tokio::test]
    async fn health_reports_version() {
        let h = Harness::new();
        let response = router(h.state.clone())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}
