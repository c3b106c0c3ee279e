use tracing::{error, warn};

use crate::error::BillingError;
use crate::services::notification_service::Dispatcher;
use crate::texts;

/// Routes integrity problems to the operator's chat and the error log.
#[derive(Clone)]
pub struct AlertService {
    admin_chat: i64,
    dispatcher: Dispatcher,
}

impl AlertService {
    pub fn new(admin_chat: i64, dispatcher: Dispatcher) -> Self {
        Self {
            admin_chat,
            dispatcher,
        }
    }

    pub async fn raise(&self, err: &BillingError, context: &str) {
        error!("OPERATOR ALERT: {} ({})", err, context);
        if let Err(e) = self
            .dispatcher
            .enqueue(self.admin_chat, texts::operator_alert(context, err))
            .await
        {
            warn!("Could not queue operator alert: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::services::notification_service::DispatchOptions;
    use crate::testing::{RecordingMessenger, wait_for_sent};

    #[tokio::test]
    async fn alert_reaches_admin_chat() {
        let messenger = Arc::new(RecordingMessenger::default());
        let (dispatcher, _worker) = Dispatcher::spawn(messenger.clone(), DispatchOptions::default());
        let alerts = AlertService::new(77, dispatcher);

        alerts
            .raise(&BillingError::UnknownPlan("platinum".into()), "payment plink_1")
            .await;

        let sent = wait_for_sent(&messenger, 1).await;
        assert_eq!(sent[0].0, 77);
        assert!(sent[0].1.contains("platinum"));
        assert!(sent[0].1.contains("plink_1"));
    }
}
