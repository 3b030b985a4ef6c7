use chrono::NaiveDate;
use thiserror::Error;

/// Error surface of the engine. The REST collaborator maps these onto HTTP
/// codes; background jobs collect them per item instead of propagating.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: u64 },

    /// Overlapping leave, duplicate balance assignment, or a write into an
    /// already-finalized payroll month.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Grace, advance-days, consecutive-days or balance violations.
    #[error("policy violation: {0}")]
    Policy(String),

    #[error("check-out within {0} seconds of check-in")]
    TooShortPunch(i64),

    #[error("attendance {attendance_id} belongs to a finalized payroll month {month}/{year}")]
    PayrollFrozen {
        attendance_id: u64,
        month: u32,
        year: i32,
    },

    #[error("no active salary structure for employee {employee_id} on {on}")]
    NoStructure { employee_id: u64, on: NaiveDate },

    #[error("no payroll settings for organization {0}")]
    NoPayrollSettings(u64),

    #[error("inconsistent attendance for employee {employee_id} {month}/{year}: {reason}")]
    InconsistentAttendance {
        employee_id: u64,
        month: u32,
        year: i32,
        reason: String,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }
}
