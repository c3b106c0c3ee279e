use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Unique constraint violated (duplicate link id, second period for one payment)
    #[error("record already exists: {0}")]
    Conflict(String),

    /// Foreign key points at a user or payment that does not exist
    #[error("missing reference: {0}")]
    MissingReference(String),

    #[error("invalid period: ends_at must be after starts_at")]
    InvalidPeriod,

    #[error("database error: {0}")]
    Sqlx(#[source] sqlx::Error),
}

pub type DbResult<T> = Result<T, DbError>;

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return DbError::Conflict(db_err.message().to_string());
            }
            if db_err.is_foreign_key_violation() {
                return DbError::MissingReference(db_err.message().to_string());
            }
        }
        DbError::Sqlx(err)
    }
}

#[derive(Error, Debug)]
#[error("unknown payment status {0:?}")]
pub struct UnknownStatus(pub String);
