use core::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use staydesk_core::{DomainError, ValueObject};

/// Longest room label accepted ("12A", "PH-3", "Annex 204", ...).
pub const MAX_ROOM_NUMBER_LEN: usize = 16;

/// A guest's current room assignment, or the absence of one.
///
/// Exactly one variant holds at any time; there is no "active without a room"
/// or "inactive with stale dates" representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Occupancy {
    Active {
        room_number: String,
        check_in_date: NaiveDate,
        check_out_date: NaiveDate,
    },
    Inactive,
}

/// Occupancy discriminant, used for directory filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccupancyStatus {
    Active,
    Inactive,
}

impl OccupancyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccupancyStatus::Active => "active",
            OccupancyStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for OccupancyStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(OccupancyStatus::Active),
            "inactive" => Ok(OccupancyStatus::Inactive),
            other => Err(DomainError::validation(format!(
                "unknown occupancy status '{other}' (expected active or inactive)"
            ))),
        }
    }
}

impl Occupancy {
    /// Build a validated `Active` occupancy.
    pub fn active(
        room_number: &str,
        check_in_date: NaiveDate,
        check_out_date: NaiveDate,
    ) -> Result<Self, DomainError> {
        let room_number = normalize_room_number(room_number)?;
        validate_stay_dates(check_in_date, check_out_date)?;
        Ok(Occupancy::Active {
            room_number,
            check_in_date,
            check_out_date,
        })
    }

    pub fn status(&self) -> OccupancyStatus {
        match self {
            Occupancy::Active { .. } => OccupancyStatus::Active,
            Occupancy::Inactive => OccupancyStatus::Inactive,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Occupancy::Active { .. })
    }

    pub fn room_number(&self) -> Option<&str> {
        match self {
            Occupancy::Active { room_number, .. } => Some(room_number),
            Occupancy::Inactive => None,
        }
    }

    pub fn check_in_date(&self) -> Option<NaiveDate> {
        match self {
            Occupancy::Active { check_in_date, .. } => Some(*check_in_date),
            Occupancy::Inactive => None,
        }
    }

    pub fn check_out_date(&self) -> Option<NaiveDate> {
        match self {
            Occupancy::Active { check_out_date, .. } => Some(*check_out_date),
            Occupancy::Inactive => None,
        }
    }

    /// The history entry this occupancy becomes when the guest checks out.
    pub fn to_stay_record(&self) -> Option<StayRecord> {
        match self {
            Occupancy::Active {
                room_number,
                check_in_date,
                check_out_date,
            } => Some(StayRecord::new(room_number.clone(), *check_in_date, *check_out_date)),
            Occupancy::Inactive => None,
        }
    }
}

/// An archived stay. Immutable once appended to a guest's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRecord {
    pub room_number: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub number_of_nights: u32,
}

impl ValueObject for StayRecord {}

impl StayRecord {
    pub fn new(room_number: String, check_in_date: NaiveDate, check_out_date: NaiveDate) -> Self {
        Self {
            room_number,
            check_in_date,
            check_out_date,
            number_of_nights: nights_between(check_in_date, check_out_date),
        }
    }
}

/// Whole days between check-in and check-out, never negative.
pub fn nights_between(check_in_date: NaiveDate, check_out_date: NaiveDate) -> u32 {
    let days = (check_out_date - check_in_date).num_days().max(0);
    u32::try_from(days).unwrap_or(u32::MAX)
}

/// Trim and validate a room label.
pub fn normalize_room_number(room_number: &str) -> Result<String, DomainError> {
    let trimmed = room_number.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("room number cannot be empty"));
    }
    if trimmed.chars().count() > MAX_ROOM_NUMBER_LEN {
        return Err(DomainError::validation(format!(
            "room number cannot exceed {MAX_ROOM_NUMBER_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn validate_stay_dates(
    check_in_date: NaiveDate,
    check_out_date: NaiveDate,
) -> Result<(), DomainError> {
    if check_out_date < check_in_date {
        return Err(DomainError::validation(format!(
            "check-out date {check_out_date} is before check-in date {check_in_date}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn nights_are_whole_day_difference() {
        assert_eq!(nights_between(date(2025, 3, 1), date(2025, 3, 4)), 3);
        assert_eq!(nights_between(date(2025, 3, 1), date(2025, 3, 1)), 0);
        // Crosses a month boundary.
        assert_eq!(nights_between(date(2025, 1, 30), date(2025, 2, 2)), 3);
    }

    #[test]
    fn nights_never_go_negative() {
        assert_eq!(nights_between(date(2025, 3, 4), date(2025, 3, 1)), 0);
    }

    #[test]
    fn active_trims_room_and_validates_dates() {
        let occ = Occupancy::active("  12A ", date(2025, 1, 1), date(2025, 1, 5)).unwrap();
        assert_eq!(occ.room_number(), Some("12A"));
        assert_eq!(occ.status(), OccupancyStatus::Active);

        let err = Occupancy::active("12A", date(2025, 1, 5), date(2025, 1, 1)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn room_number_rules() {
        assert!(matches!(
            normalize_room_number("   ").unwrap_err(),
            DomainError::Validation(_)
        ));
        assert!(normalize_room_number(&"9".repeat(MAX_ROOM_NUMBER_LEN)).is_ok());
        assert!(normalize_room_number(&"9".repeat(MAX_ROOM_NUMBER_LEN + 1)).is_err());
    }

    #[test]
    fn stay_record_carries_computed_nights() {
        let occ = Occupancy::active("205", date(2025, 3, 1), date(2025, 3, 4)).unwrap();
        let stay = occ.to_stay_record().unwrap();
        assert_eq!(stay.room_number, "205");
        assert_eq!(stay.number_of_nights, 3);
        assert!(Occupancy::Inactive.to_stay_record().is_none());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Active".parse::<OccupancyStatus>().unwrap(), OccupancyStatus::Active);
        assert_eq!(" INACTIVE ".parse::<OccupancyStatus>().unwrap(), OccupancyStatus::Inactive);
        assert!("checked-out".parse::<OccupancyStatus>().is_err());
    }

    #[test]
    fn occupancy_serializes_as_tagged_union() {
        let json = serde_json::to_value(Occupancy::Inactive).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "inactive" }));

        let occ = Occupancy::active("101", date(2025, 1, 1), date(2025, 1, 5)).unwrap();
        let json = serde_json::to_value(&occ).unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["room_number"], "101");
        assert_eq!(json["check_in_date"], "2025-01-01");
    }
}
