use async_trait::async_trait;
use serde_json::Value;
use signalbot_shared::PaymentNotes;

use crate::error::BillingError;

pub mod razorpay;

#[derive(Debug, Clone)]
pub struct LinkRequest {
    /// Paise
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub notes: PaymentNotes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedLink {
    pub id: String,
    pub short_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Created,
    PartiallyPaid,
    Paid,
    Cancelled,
    Expired,
}

impl LinkState {
    pub fn is_closed(&self) -> bool {
        matches!(self, LinkState::Cancelled | LinkState::Expired)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: LinkState,
    pub amount_paid: i64,
    /// Captured payment, once there is one
    pub payment_id: Option<String>,
}

/// A verified webhook, reduced to what the payment flow acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    LinkPaid {
        link_id: String,
        payment_id: String,
        amount_paid: i64,
        notes: Value,
    },
    LinkClosed {
        link_id: String,
        state: LinkState,
    },
    Ignored(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment link and return its id and the URL shown to the user
    async fn create_payment_link(&self, request: &LinkRequest) -> Result<CreatedLink, BillingError>;

    /// Pull the current state of a link (for users whose webhook never arrived)
    async fn fetch_link_status(&self, link_id: &str) -> Result<LinkStatus, BillingError>;

    /// Verify the webhook signature. Must run before anything reads the payload.
    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<(), BillingError>;

    fn parse_event(&self, payload: &[u8]) -> Result<GatewayEvent, BillingError>;

    fn name(&self) -> &str;
}
