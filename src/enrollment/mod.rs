//! Transactional workshop enrollment.
//!
//! Every operation runs in a single Postgres transaction with row locks on
//! the contended rows, so quota and credit invariants hold under concurrent
//! requests without any application-level mutex.

mod engine;

pub use engine::{EnrollmentEngine, EnrollmentOutcome, StudentEnrollments};

/// Errors from enrollment operations. Conflict variants surface verbatim as
/// their coded strings; database faults collapse to a retryable 500.
#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    #[error("registration has not opened yet")]
    RegistrationNotOpen,
    #[error("registration has closed")]
    RegistrationClosed,
    #[error("workshop is already full")]
    QuotaExceeded,
    #[error("credit limit exceeded")]
    CreditLimitExceeded,
    #[error("schedule conflict with an existing enrollment")]
    ScheduleConflict,
    #[error("already enrolled in this session")]
    AlreadyEnrolled,
    #[error("seat is not reserved by this user")]
    SeatNotReservedByUser,
    #[error("seat not found")]
    SeatNotFound,
    #[error("enrollment not found")]
    EnrollmentNotFound,
    #[error("enrollment is not active")]
    EnrollmentNotActive,
    #[error("quota below current enrollment of {enrolled}")]
    QuotaTooSmall { enrolled: i64 },
    #[error("{blocked} seats to remove are reserved or occupied")]
    CannotReduceQuota { blocked: i64 },
    #[error("workshop session not found or not owned by caller")]
    SessionNotFound,
    #[error("student not found")]
    StudentNotFound,
    #[error("credit limit must be between 0 and 30")]
    InvalidCreditLimit,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
