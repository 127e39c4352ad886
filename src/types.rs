//! Core domain types for the registration gateway.
//!
//! Identifiers are newtype wrappers over UUIDs so that a seat id can never
//! be passed where a workshop-session id is expected. Status enums carry
//! their wire spelling (SCREAMING_SNAKE_CASE) for both JSON and the TEXT
//! columns in Postgres.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Generates a UUID-backed identifier newtype.
macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Access the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id! {
    /// A user of the system (student or mentor).
    UserId
}

uuid_id! {
    /// A workshop session (a scheduled occurrence of a workshop with its own
    /// quota, seats and registration window).
    SessionId
}

uuid_id! {
    /// An enrollment row linking a student to a workshop session.
    EnrollmentId
}

uuid_id! {
    /// A single seat within a workshop session.
    SeatId
}

/// User role. Mentors bypass admission control entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Mentor,
}

impl Role {
    /// Wire / database spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "STUDENT",
            Self::Mentor => "MENTOR",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STUDENT" => Ok(Self::Student),
            "MENTOR" => Ok(Self::Mentor),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Admission state of a user as reported by the queue status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueState {
    Active,
    Waiting,
}

/// Lifecycle status of a durable seat row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    Reserved,
    Occupied,
}

impl SeatStatus {
    /// Wire / database spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Reserved => "RESERVED",
            Self::Occupied => "OCCUPIED",
        }
    }
}

impl FromStr for SeatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(Self::Available),
            "RESERVED" => Ok(Self::Reserved),
            "OCCUPIED" => Ok(Self::Occupied),
            other => Err(format!("unknown seat status: {other}")),
        }
    }
}

/// Lifecycle status of an enrollment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Active,
    Dropped,
}

impl EnrollmentStatus {
    /// Wire / database spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Dropped => "DROPPED",
        }
    }
}

impl FromStr for EnrollmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "DROPPED" => Ok(Self::Dropped),
            other => Err(format!("unknown enrollment status: {other}")),
        }
    }
}

/// A durable seat row as served to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub id: SeatId,
    pub workshop_session_id: SessionId,
    pub seat_number: String,
    pub row_letter: String,
    pub column_number: i32,
    pub status: SeatStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_by: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_at: Option<DateTime<Utc>>,
}

/// A weekly schedule slot attached to a workshop session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    #[serde(rename = "day")]
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    pub room: String,
}

/// One active enrollment as listed for a student, with schedule and seat.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRecord {
    pub id: EnrollmentId,
    pub session_id: SessionId,
    pub workshop_code: String,
    pub workshop_name: String,
    pub credits: i32,
    pub enrolled_at: DateTime<Utc>,
    pub mentor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat_number: Option<String>,
    pub schedules: Vec<ScheduleEntry>,
}

/// Number of seat columns per row in the row-major layout.
pub const SEAT_COLS_PER_ROW: usize = 10;

/// Row letter for a zero-based row index: `A`..`Z`, then `AA`, `AB`, ...
#[must_use]
pub fn seat_row_letter(row_index: usize) -> String {
    if row_index < 26 {
        char::from(b'A' + row_index as u8).to_string()
    } else {
        let first = char::from(b'A' + (row_index / 26 - 1) as u8);
        let second = char::from(b'A' + (row_index % 26) as u8);
        format!("{first}{second}")
    }
}

/// Row letter, column number (1-based) and label for the seat at a
/// zero-based absolute index in row-major order.
#[must_use]
pub fn seat_position(abs_index: usize) -> (String, i32, String) {
    let row = seat_row_letter(abs_index / SEAT_COLS_PER_ROW);
    let col = (abs_index % SEAT_COLS_PER_ROW) as i32 + 1;
    let label = format!("{row}{col}");
    (row, col, label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_positions_are_row_major() {
        assert_eq!(seat_position(0), ("A".to_string(), 1, "A1".to_string()));
        assert_eq!(seat_position(9), ("A".to_string(), 10, "A10".to_string()));
        assert_eq!(seat_position(10), ("B".to_string(), 1, "B1".to_string()));
        assert_eq!(seat_position(25), ("C".to_string(), 6, "C6".to_string()));
    }

    #[test]
    fn seat_rows_wrap_past_z() {
        assert_eq!(seat_row_letter(25), "Z");
        assert_eq!(seat_row_letter(26), "AA");
        assert_eq!(seat_row_letter(27), "AB");
        assert_eq!(seat_row_letter(51), "AZ");
        assert_eq!(seat_row_letter(52), "BA");
    }

    #[test]
    fn role_round_trips_through_wire_spelling() {
        assert_eq!("MENTOR".parse::<Role>().unwrap(), Role::Mentor);
        assert_eq!(Role::Student.as_str(), "STUDENT");
        assert!("ADMIN".parse::<Role>().is_err());
    }

    #[test]
    fn status_enums_serialize_screaming() {
        assert_eq!(
            serde_json::to_string(&SeatStatus::Reserved).unwrap(),
            "\"RESERVED\""
        );
        assert_eq!(
            serde_json::to_string(&QueueState::Waiting).unwrap(),
            "\"WAITING\""
        );
        assert_eq!(
            serde_json::to_string(&EnrollmentStatus::Dropped).unwrap(),
            "\"DROPPED\""
        );
    }

    #[test]
    fn ids_serialize_as_bare_uuids() {
        let id = UserId::from_uuid(Uuid::nil());
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            "\"00000000-0000-0000-0000-000000000000\""
        );
    }
}
