pub mod notes;
pub mod plans;

pub use notes::{NotesError, PaymentNotes};
pub use plans::{CatalogError, Plan, PlanCatalog, PlanId, format_amount};
