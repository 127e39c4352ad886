//! The enrollment engine: enroll, drop, quota update and seat sync.

use super::EnrollmentError;
use crate::hub::{NotificationHub, WsEvent};
use crate::store::SeatHoldStore;
use crate::types::{
    seat_position, EnrollmentId, EnrollmentRecord, EnrollmentStatus, ScheduleEntry, SeatId,
    SeatStatus, SessionId, UserId,
};
use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Hard ceiling on a student's total enrolled credits. Per-student
/// `max_credits` may be set lower (or up to 30) by a mentor, but the engine
/// never admits past this cap.
pub const CREDIT_HARD_CAP: i64 = 24;

/// Result of a successful enrollment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentOutcome {
    pub enrollment_id: EnrollmentId,
    pub total_credits: i64,
}

/// A student's active enrollments with credit totals.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentEnrollments {
    pub workshops: Vec<EnrollmentRecord>,
    pub total_credits: i64,
    pub max_credits: i32,
}

/// Quota-safe enrollment over the durable store.
pub struct EnrollmentEngine {
    pool: PgPool,
    holds: SeatHoldStore,
    hub: Arc<NotificationHub>,
}

impl EnrollmentEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(pool: PgPool, holds: SeatHoldStore, hub: Arc<NotificationHub>) -> Self {
        Self { pool, holds, hub }
    }

    /// Enroll a student into a workshop session, optionally confirming a
    /// previously reserved seat.
    ///
    /// Runs in one transaction: the session row is locked first, so the
    /// quota check counts ACTIVE enrollments that no concurrent request can
    /// change underneath us. Exactly one of two concurrent enrollments into
    /// a quota-1 session succeeds.
    pub async fn enroll(
        &self,
        user_id: UserId,
        class_id: SessionId,
        seat_id: Option<SeatId>,
    ) -> Result<EnrollmentOutcome, EnrollmentError> {
        let mut tx = self.pool.begin().await?;

        let session: Option<(i32, i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>)> =
            sqlx::query_as(
                "SELECT ws.quota,
                        (SELECT COUNT(*) FROM enrollments e
                         WHERE e.class_id = ws.id AND e.status = 'ACTIVE'),
                        ws.registration_start,
                        ws.registration_end
                 FROM workshop_sessions ws
                 WHERE ws.id = $1
                 FOR UPDATE",
            )
            .bind(class_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;

        let Some((quota, enrolled_count, reg_start, reg_end)) = session else {
            return Err(EnrollmentError::SessionNotFound);
        };

        let now = Utc::now();
        if reg_start.is_some_and(|start| now < start) {
            return Err(EnrollmentError::RegistrationNotOpen);
        }
        if reg_end.is_some_and(|end| now > end) {
            return Err(EnrollmentError::RegistrationClosed);
        }
        if enrolled_count >= i64::from(quota) {
            return Err(EnrollmentError::QuotaExceeded);
        }

        let (current_credits,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(w.credits), 0)
             FROM enrollments e
             JOIN workshop_sessions ws ON e.class_id = ws.id
             JOIN workshops w ON ws.workshop_id = w.id
             WHERE e.student_id = $1 AND e.status = 'ACTIVE'",
        )
        .bind(user_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        let (session_credits,): (i32,) = sqlx::query_as(
            "SELECT w.credits
             FROM workshop_sessions ws
             JOIN workshops w ON ws.workshop_id = w.id
             WHERE ws.id = $1",
        )
        .bind(class_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        if current_credits + i64::from(session_credits) > CREDIT_HARD_CAP {
            return Err(EnrollmentError::CreditLimitExceeded);
        }

        // Half-open interval intersection on the same day of week.
        let (conflicts,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*)
             FROM enrollments e
             JOIN schedules s1 ON s1.class_id = e.class_id
             JOIN schedules s2 ON s2.class_id = $1
             WHERE e.student_id = $2
               AND e.status = 'ACTIVE'
               AND s1.day_of_week = s2.day_of_week
               AND s1.start_time < s2.end_time
               AND s2.start_time < s1.end_time",
        )
        .bind(class_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        if conflicts > 0 {
            return Err(EnrollmentError::ScheduleConflict);
        }

        let existing: Option<(Uuid, String)> = sqlx::query_as(
            "SELECT id, status FROM enrollments WHERE student_id = $1 AND class_id = $2",
        )
        .bind(user_id.as_uuid())
        .bind(class_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let enrollment_id = match existing {
            Some((_, ref status)) if status == EnrollmentStatus::Active.as_str() => {
                return Err(EnrollmentError::AlreadyEnrolled);
            }
            Some((id, _)) => {
                // Reactivate the dropped row instead of inserting a second.
                sqlx::query(
                    "UPDATE enrollments
                     SET status = 'ACTIVE', enrolled_at = now(), updated_at = now()
                     WHERE id = $1",
                )
                .bind(id)
                .execute(&mut *tx)
                .await?;
                EnrollmentId::from_uuid(id)
            }
            None => {
                let (id,): (Uuid,) = sqlx::query_as(
                    "INSERT INTO enrollments (student_id, class_id, status)
                     VALUES ($1, $2, 'ACTIVE')
                     RETURNING id",
                )
                .bind(user_id.as_uuid())
                .bind(class_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
                EnrollmentId::from_uuid(id)
            }
        };

        let mut occupied_seat = None;
        if let Some(seat_id) = seat_id {
            let seat: Option<(String, Option<Uuid>)> = sqlx::query_as(
                "SELECT status, reserved_by FROM seats WHERE id = $1 FOR UPDATE",
            )
            .bind(seat_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;

            let Some((seat_status, reserved_by)) = seat else {
                return Err(EnrollmentError::SeatNotFound);
            };
            if seat_status != SeatStatus::Reserved.as_str()
                || reserved_by != Some(*user_id.as_uuid())
            {
                return Err(EnrollmentError::SeatNotReservedByUser);
            }

            sqlx::query("UPDATE seats SET status = 'OCCUPIED' WHERE id = $1")
                .bind(seat_id.as_uuid())
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                "INSERT INTO enrollment_seats (enrollment_id, seat_id)
                 VALUES ($1, $2)
                 ON CONFLICT (enrollment_id) DO UPDATE SET seat_id = EXCLUDED.seat_id",
            )
            .bind(enrollment_id.as_uuid())
            .bind(seat_id.as_uuid())
            .execute(&mut *tx)
            .await?;

            occupied_seat = Some(seat_id);
        }

        sqlx::query(
            "UPDATE workshop_sessions SET enrolled_count = enrolled_count + 1 WHERE id = $1",
        )
        .bind(class_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        // Broadcasts and hold cleanup only after commit, so no observer ever
        // sees the seat OCCUPIED under a transaction that may roll back.
        if let Some(seat_id) = occupied_seat {
            if let Err(e) = self.holds.clear_hold(user_id).await {
                warn!(error = %e, user_id = %user_id, "failed to clear seat hold after enroll");
            }
            self.hub.broadcast(&WsEvent::SeatStatusUpdate {
                seat_id,
                status: SeatStatus::Occupied,
                reserved_by: None,
            });
        }

        let total_credits = current_credits + i64::from(session_credits);
        info!(user_id = %user_id, class_id = %class_id, enrollment_id = %enrollment_id, total_credits, "enrolled");

        Ok(EnrollmentOutcome {
            enrollment_id,
            total_credits,
        })
    }

    /// Drop an active enrollment, freeing any linked seat.
    pub async fn drop_enrollment(
        &self,
        user_id: UserId,
        enrollment_id: EnrollmentId,
    ) -> Result<(), EnrollmentError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Uuid, String, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT e.class_id, e.status, ws.registration_end
             FROM enrollments e
             JOIN workshop_sessions ws ON e.class_id = ws.id
             WHERE e.id = $1 AND e.student_id = $2
             FOR UPDATE OF e",
        )
        .bind(enrollment_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((class_id, status, reg_end)) = row else {
            return Err(EnrollmentError::EnrollmentNotFound);
        };
        if status != EnrollmentStatus::Active.as_str() {
            return Err(EnrollmentError::EnrollmentNotActive);
        }
        if reg_end.is_some_and(|end| Utc::now() > end) {
            return Err(EnrollmentError::RegistrationClosed);
        }

        sqlx::query("UPDATE enrollments SET status = 'DROPPED', updated_at = now() WHERE id = $1")
            .bind(enrollment_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        let linked_seat: Option<(Uuid,)> = sqlx::query_as(
            "SELECT seat_id FROM enrollment_seats WHERE enrollment_id = $1",
        )
        .bind(enrollment_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((seat_id,)) = linked_seat {
            sqlx::query(
                "UPDATE seats
                 SET status = 'AVAILABLE', reserved_by = NULL, reserved_at = NULL
                 WHERE id = $1",
            )
            .bind(seat_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM enrollment_seats WHERE enrollment_id = $1")
                .bind(enrollment_id.as_uuid())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "UPDATE workshop_sessions SET enrolled_count = enrolled_count - 1 WHERE id = $1",
        )
        .bind(class_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if let Some((seat_id,)) = linked_seat {
            self.hub.broadcast(&WsEvent::SeatStatusUpdate {
                seat_id: SeatId::from_uuid(seat_id),
                status: SeatStatus::Available,
                reserved_by: None,
            });
        }

        info!(user_id = %user_id, enrollment_id = %enrollment_id, "enrollment dropped");
        Ok(())
    }

    /// Change a session's quota and conform its seat map, in one
    /// transaction. Only the owning mentor may do this; the quota may never
    /// drop below the current ACTIVE enrollment.
    pub async fn update_quota(
        &self,
        mentor_user_id: UserId,
        class_id: SessionId,
        new_quota: i32,
    ) -> Result<(), EnrollmentError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM enrollments e
                     WHERE e.class_id = ws.id AND e.status = 'ACTIVE')
             FROM workshop_sessions ws
             WHERE ws.id = $1 AND ws.mentor_id = $2
             FOR UPDATE",
        )
        .bind(class_id.as_uuid())
        .bind(mentor_user_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((enrolled,)) = row else {
            return Err(EnrollmentError::SessionNotFound);
        };
        if i64::from(new_quota) < enrolled {
            return Err(EnrollmentError::QuotaTooSmall { enrolled });
        }

        sqlx::query("UPDATE workshop_sessions SET quota = $1 WHERE id = $2")
            .bind(new_quota)
            .bind(class_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        Self::sync_seats(&mut tx, class_id, new_quota).await?;

        tx.commit().await?;

        self.hub.broadcast(&WsEvent::SeatsRegenerated {
            session_id: class_id,
            new_quota,
            message: "Seats have been updated. Refreshing...".to_string(),
        });

        info!(class_id = %class_id, new_quota, "quota updated and seats synced");
        Ok(())
    }

    /// Conform the seat count to `new_quota` inside the caller's
    /// transaction. Grows row-major from the current count; shrinks from the
    /// tail, deleting only AVAILABLE seats. RESERVED and OCCUPIED seats are
    /// never deleted: if they block the shrink the whole transaction
    /// aborts.
    pub async fn sync_seats(
        tx: &mut Transaction<'_, Postgres>,
        class_id: SessionId,
        new_quota: i32,
    ) -> Result<(), EnrollmentError> {
        let seats: Vec<(Uuid, String)> = sqlx::query_as(
            "SELECT id, status
             FROM seats
             WHERE workshop_session_id = $1
             ORDER BY length(row_letter), row_letter, column_number",
        )
        .bind(class_id.as_uuid())
        .fetch_all(&mut **tx)
        .await?;

        let current = seats.len();
        let target = new_quota.max(0) as usize;

        if current < target {
            for index in current..target {
                let (row_letter, column_number, label) = seat_position(index);
                sqlx::query(
                    "INSERT INTO seats
                         (workshop_session_id, seat_number, row_letter, column_number, status)
                     VALUES ($1, $2, $3, $4, 'AVAILABLE')
                     ON CONFLICT (workshop_session_id, seat_number) DO NOTHING",
                )
                .bind(class_id.as_uuid())
                .bind(&label)
                .bind(&row_letter)
                .bind(column_number)
                .execute(&mut **tx)
                .await?;
            }
        } else if current > target {
            let need = (current - target) as i64;
            let mut removed = 0_i64;
            for (seat_id, status) in seats.iter().rev() {
                if removed >= need {
                    break;
                }
                if status == SeatStatus::Available.as_str() {
                    sqlx::query("DELETE FROM seats WHERE id = $1")
                        .bind(seat_id)
                        .execute(&mut **tx)
                        .await?;
                    removed += 1;
                }
            }
            if removed < need {
                return Err(EnrollmentError::CannotReduceQuota {
                    blocked: need - removed,
                });
            }
        }

        Ok(())
    }

    /// A student's active enrollments with schedules, seat labels and
    /// credit totals.
    pub async fn list_student_enrollments(
        &self,
        user_id: UserId,
    ) -> Result<StudentEnrollments, EnrollmentError> {
        let rows: Vec<(
            Uuid,
            Uuid,
            String,
            String,
            i32,
            DateTime<Utc>,
            String,
            Option<String>,
        )> = sqlx::query_as(
            "SELECT e.id, ws.id, w.code, w.name, w.credits, e.enrolled_at, u.name,
                    st.seat_number
             FROM enrollments e
             JOIN workshop_sessions ws ON e.class_id = ws.id
             JOIN workshops w ON ws.workshop_id = w.id
             JOIN users u ON ws.mentor_id = u.id
             LEFT JOIN enrollment_seats es ON e.id = es.enrollment_id
             LEFT JOIN seats st ON es.seat_id = st.id
             WHERE e.student_id = $1 AND e.status = 'ACTIVE'
             ORDER BY e.enrolled_at DESC",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let mut workshops = Vec::with_capacity(rows.len());
        let mut total_credits = 0_i64;
        for (id, session_id, code, name, credits, enrolled_at, mentor, seat_number) in rows {
            let schedule_rows: Vec<(String, NaiveTime, NaiveTime, String)> = sqlx::query_as(
                "SELECT day_of_week, start_time, end_time, room
                 FROM schedules
                 WHERE class_id = $1
                 ORDER BY start_time",
            )
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;

            let schedules = schedule_rows
                .into_iter()
                .map(|(day, start, end, room)| ScheduleEntry {
                    day_of_week: day,
                    start_time: start.format("%H:%M").to_string(),
                    end_time: end.format("%H:%M").to_string(),
                    room,
                })
                .collect();

            total_credits += i64::from(credits);
            workshops.push(EnrollmentRecord {
                id: EnrollmentId::from_uuid(id),
                session_id: SessionId::from_uuid(session_id),
                workshop_code: code,
                workshop_name: name,
                credits,
                enrolled_at,
                mentor,
                seat_number,
                schedules,
            });
        }

        let max_credits: Option<(i32,)> =
            sqlx::query_as("SELECT max_credits FROM students WHERE user_id = $1")
                .bind(user_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        Ok(StudentEnrollments {
            workshops,
            total_credits,
            max_credits: max_credits.map_or(CREDIT_HARD_CAP as i32, |(m,)| m),
        })
    }

    /// Set a student's personal credit limit (mentor operation). The hard
    /// engine cap of [`CREDIT_HARD_CAP`] still applies on enroll.
    pub async fn update_student_credit_limit(
        &self,
        student_user_id: UserId,
        new_limit: i32,
    ) -> Result<(), EnrollmentError> {
        if !(0..=30).contains(&new_limit) {
            return Err(EnrollmentError::InvalidCreditLimit);
        }

        let result = sqlx::query("UPDATE students SET max_credits = $1 WHERE user_id = $2")
            .bind(new_limit)
            .bind(student_user_id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EnrollmentError::StudentNotFound);
        }

        info!(student = %student_user_id, new_limit, "student credit limit updated");
        Ok(())
    }
}
