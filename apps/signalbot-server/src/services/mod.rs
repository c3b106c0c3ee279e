pub mod admin_service;
pub mod alert_service;
pub mod broadcast_service;
pub mod ledger_service;
pub mod notification_service;
pub mod payment;
pub mod payment_service;
pub mod subscription_service;
pub mod user_service;
