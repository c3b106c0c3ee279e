pub mod payment;
pub mod subscription;
pub mod user;

pub use payment::{NewPaymentRecord, PaymentRecord, PaymentStatus};
pub use subscription::{NewPeriod, SubscriptionPeriod};
pub use user::User;
