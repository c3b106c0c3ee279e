pub mod db;
pub mod error;
pub mod memory;
pub mod models;
pub mod repositories;

pub use db::init_db;
pub use error::{DbError, DbResult};
pub use sqlx;
