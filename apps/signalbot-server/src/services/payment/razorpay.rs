use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use crate::error::BillingError;
use crate::services::payment::{
    CreatedLink, GatewayEvent, LinkRequest, LinkState, LinkStatus, PaymentGateway,
};

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.razorpay.com/v1";

pub struct RazorpayGateway {
    client: reqwest::Client,
    key_id: String,
    key_secret: String,
    webhook_secret: String,
}

impl RazorpayGateway {
    pub fn new(key_id: String, key_secret: String, webhook_secret: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            key_id,
            key_secret,
            webhook_secret,
        }
    }

    /// Hex HMAC-SHA256 of the raw body, as Razorpay puts in `X-Razorpay-Signature`.
    #[cfg(test)]
    pub fn sign(&self, payload: &[u8]) -> String {
        sign_payload(&self.webhook_secret, payload)
    }
}

#[cfg(test)]
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Debug, Deserialize)]
struct LinkEntity {
    id: String,
    #[serde(default)]
    short_url: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    amount_paid: i64,
    #[serde(default)]
    notes: Value,
    #[serde(default)]
    payments: Option<Vec<LinkPayment>>,
}

#[derive(Debug, Deserialize)]
struct LinkPayment {
    payment_id: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    notes: Value,
}

#[derive(Debug, Deserialize)]
struct Wrapped<T> {
    entity: T,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    payment_link: Option<Wrapped<LinkEntity>>,
    payment: Option<Wrapped<PaymentEntity>>,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    payload: WebhookPayload,
}

fn link_state(status: &str) -> LinkState {
    match status {
        "created" => LinkState::Created,
        "partially_paid" => LinkState::PartiallyPaid,
        "paid" => LinkState::Paid,
        "cancelled" => LinkState::Cancelled,
        "expired" => LinkState::Expired,
        other => {
            warn!("Unknown Razorpay link status {:?}, treating as unpaid", other);
            LinkState::Created
        }
    }
}

fn gateway_error(err: reqwest::Error) -> BillingError {
    BillingError::Gateway(err.to_string())
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[instrument(skip(self, request), fields(plan = %request.notes.plan, user = request.notes.telegram_id))]
    async fn create_payment_link(&self, request: &LinkRequest) -> Result<CreatedLink, BillingError> {
        let body = json!({
            "amount": request.amount,
            "currency": request.currency,
            "description": request.description,
            "notes": request.notes.to_value(),
            "reminder_enable": false,
        });

        let resp = self
            .client
            .post(format!("{}/payment_links", API_BASE))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(gateway_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BillingError::Gateway(format!(
                "payment link creation failed ({}): {}",
                status, text
            )));
        }

        let link: LinkEntity = resp.json().await.map_err(gateway_error)?;
        if link.short_url.is_empty() {
            return Err(BillingError::Gateway(format!(
                "payment link {} has no short_url",
                link.id
            )));
        }
        debug!("Created Razorpay link {}", link.id);

        Ok(CreatedLink {
            id: link.id,
            short_url: link.short_url,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_link_status(&self, link_id: &str) -> Result<LinkStatus, BillingError> {
        let resp = self
            .client
            .get(format!("{}/payment_links/{}", API_BASE, link_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(gateway_error)?;

        if resp.status() == StatusCode::NOT_FOUND || resp.status() == StatusCode::BAD_REQUEST {
            return Err(BillingError::NotFound(link_id.to_string()));
        }
        let link: LinkEntity = resp
            .error_for_status()
            .map_err(gateway_error)?
            .json()
            .await
            .map_err(gateway_error)?;

        let payment_id = link
            .payments
            .unwrap_or_default()
            .into_iter()
            .find(|p| p.status == "captured")
            .map(|p| p.payment_id);

        Ok(LinkStatus {
            state: link_state(&link.status),
            amount_paid: link.amount_paid,
            payment_id,
        })
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<(), BillingError> {
        if self.webhook_secret.is_empty() {
            warn!("Webhook secret is not configured, rejecting webhook");
            return Err(BillingError::SignatureInvalid);
        }
        let signature = signature.ok_or(BillingError::SignatureInvalid)?;
        let expected = hex::decode(signature.trim()).map_err(|_| BillingError::SignatureInvalid)?;

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| BillingError::SignatureInvalid)?;
        mac.update(payload);
        // verify_slice compares in constant time
        mac.verify_slice(&expected)
            .map_err(|_| BillingError::SignatureInvalid)
    }

    fn parse_event(&self, payload: &[u8]) -> Result<GatewayEvent, BillingError> {
        let envelope: WebhookEnvelope = serde_json::from_slice(payload)
            .map_err(|e| BillingError::MalformedPayload(e.to_string()))?;

        match envelope.event.as_str() {
            "payment_link.paid" => {
                let link = envelope
                    .payload
                    .payment_link
                    .ok_or_else(|| BillingError::MalformedPayload("missing payment_link".into()))?
                    .entity;
                let payment = envelope
                    .payload
                    .payment
                    .ok_or_else(|| BillingError::MalformedPayload("missing payment".into()))?
                    .entity;

                let amount_paid = if link.amount_paid > 0 {
                    link.amount_paid
                } else {
                    payment.amount
                };
                let notes = if link.notes.is_object() {
                    link.notes
                } else {
                    payment.notes
                };

                Ok(GatewayEvent::LinkPaid {
                    link_id: link.id,
                    payment_id: payment.id,
                    amount_paid,
                    notes,
                })
            }
            "payment_link.cancelled" | "payment_link.expired" => {
                let link = envelope
                    .payload
                    .payment_link
                    .ok_or_else(|| BillingError::MalformedPayload("missing payment_link".into()))?
                    .entity;
                let state = if envelope.event.ends_with("expired") {
                    LinkState::Expired
                } else {
                    LinkState::Cancelled
                };
                Ok(GatewayEvent::LinkClosed {
                    link_id: link.id,
                    state,
                })
            }
            other => Ok(GatewayEvent::Ignored(other.to_string())),
        }
    }

    fn name(&self) -> &str {
        "razorpay"
    }
}
