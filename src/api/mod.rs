//! HTTP handlers for the gateway API.
//!
//! Handlers stay thin: extract identity, call the domain service, map the
//! domain error onto the HTTP taxonomy. Conflict and validation codes are
//! surfaced verbatim; infrastructure faults collapse to a retryable 500
//! with the detail kept in the log.

pub mod enrollment;
pub mod mentor;
pub mod queue;
pub mod seats;
pub mod websocket;

use crate::admission::AdmissionError;
use crate::enrollment::EnrollmentError;
use crate::error::AppError;
use crate::seats::SeatError;

pub(crate) fn admission_error(e: AdmissionError) -> AppError {
    match e {
        AdmissionError::NotActive => {
            AppError::forbidden("NOT_ACTIVE", "You are not in an active session")
        }
        AdmissionError::Store(e) => AppError::internal("QUEUE_ERROR", "Queue operation failed")
            .with_source(anyhow::anyhow!(e)),
    }
}

pub(crate) fn enrollment_error(e: EnrollmentError) -> AppError {
    match e {
        EnrollmentError::RegistrationNotOpen => {
            AppError::conflict("REGISTRATION_NOT_OPEN", "Registration has not opened yet")
        }
        EnrollmentError::RegistrationClosed => {
            AppError::conflict("REGISTRATION_CLOSED", "Registration has closed")
        }
        EnrollmentError::QuotaExceeded => {
            AppError::conflict("QUOTA_EXCEEDED", "Workshop is already full")
        }
        EnrollmentError::CreditLimitExceeded => {
            AppError::conflict("CREDIT_LIMIT_EXCEEDED", "Maximum 24 credit limit reached")
        }
        EnrollmentError::ScheduleConflict => {
            AppError::conflict("SCHEDULE_CONFLICT", "Time conflict with an existing enrollment")
        }
        EnrollmentError::AlreadyEnrolled => {
            AppError::conflict("ALREADY_ENROLLED", "Already enrolled in this session")
        }
        EnrollmentError::SeatNotReservedByUser => AppError::conflict(
            "SEAT_NOT_RESERVED_BY_USER",
            "Seat is not reserved by this user",
        ),
        EnrollmentError::SeatNotFound => AppError::not_found("SEAT_NOT_FOUND", "Seat not found"),
        EnrollmentError::EnrollmentNotFound => {
            AppError::not_found("ENROLLMENT_NOT_FOUND", "Enrollment not found")
        }
        EnrollmentError::EnrollmentNotActive => {
            AppError::conflict("ENROLLMENT_NOT_ACTIVE", "Enrollment is not active")
        }
        EnrollmentError::QuotaTooSmall { enrolled } => AppError::bad_request(
            "QUOTA_TOO_SMALL",
            format!("Current enrollment is {enrolled}"),
        ),
        EnrollmentError::CannotReduceQuota { blocked } => AppError::bad_request(
            "CANNOT_REDUCE_QUOTA",
            format!("{blocked} seats to remove are currently reserved or occupied"),
        ),
        EnrollmentError::SessionNotFound => AppError::not_found(
            "SESSION_NOT_FOUND",
            "Workshop session not found or not owned by caller",
        ),
        EnrollmentError::StudentNotFound => {
            AppError::not_found("STUDENT_NOT_FOUND", "Student not found")
        }
        EnrollmentError::InvalidCreditLimit => AppError::bad_request(
            "INVALID_CREDIT_LIMIT",
            "Credit limit must be between 0 and 30",
        ),
        EnrollmentError::Database(e) => {
            AppError::internal("DATABASE_ERROR", "Enrollment operation failed")
                .with_source(anyhow::anyhow!(e))
        }
    }
}

pub(crate) fn seat_error(e: SeatError) -> AppError {
    match e {
        SeatError::SeatNotFound => AppError::not_found("SEAT_NOT_FOUND", "Seat not found"),
        SeatError::SeatNotAvailable => {
            AppError::conflict("SEAT_NOT_AVAILABLE", "Seat is not available")
        }
        SeatError::SeatLockedByAnotherUser => AppError::conflict(
            "SEAT_LOCKED_BY_ANOTHER_USER",
            "Seat is being reserved by another user",
        ),
        SeatError::AlreadyEnrolledInSession => AppError::conflict(
            "ALREADY_ENROLLED_IN_SESSION",
            "Already enrolled in this session",
        ),
        SeatError::NotYourReservation => {
            AppError::forbidden("NOT_YOUR_RESERVATION", "Seat is not reserved by you")
        }
        SeatError::Store(e) => AppError::internal("SEAT_ERROR", "Seat operation failed")
            .with_source(anyhow::anyhow!(e)),
        SeatError::Database(e) => AppError::internal("SEAT_ERROR", "Seat operation failed")
            .with_source(anyhow::anyhow!(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn conflicts_map_to_409() {
        for e in [
            EnrollmentError::QuotaExceeded,
            EnrollmentError::CreditLimitExceeded,
            EnrollmentError::ScheduleConflict,
            EnrollmentError::AlreadyEnrolled,
        ] {
            assert_eq!(enrollment_error(e).status(), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn quota_shrink_failures_are_400() {
        assert_eq!(
            enrollment_error(EnrollmentError::CannotReduceQuota { blocked: 3 }).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            enrollment_error(EnrollmentError::QuotaTooSmall { enrolled: 12 }).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn seat_race_losers_get_conflicts() {
        assert_eq!(
            seat_error(SeatError::SeatLockedByAnotherUser).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            seat_error(SeatError::SeatNotAvailable).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            seat_error(SeatError::NotYourReservation).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn heartbeat_failure_is_403_not_active() {
        let err = admission_error(AdmissionError::NotActive);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "NOT_ACTIVE");
    }
}
