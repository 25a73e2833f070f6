use axum::http::StatusCode;
use axum::response::Response;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use staydesk_core::AggregateRoot;
use staydesk_guests::{Guest, Loyalty, OccupancyStatus, StayRecord};
use staydesk_infra::projections::{DirectoryPage, DirectoryQuery, DirectorySort};
use staydesk_infra::{NewGuest, OccupancyChange, ProfileCorrection};

use crate::app::errors::json_error;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterGuestRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub room_number: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
}

impl From<RegisterGuestRequest> for NewGuest {
    fn from(body: RegisterGuestRequest) -> Self {
        NewGuest {
            profile: staydesk_guests::GuestProfile {
                first_name: body.first_name,
                last_name: body.last_name,
                email: body.email,
                phone: body.phone,
            },
            room_number: body.room_number,
            check_in_date: body.check_in_date,
            check_out_date: body.check_out_date,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<CorrectProfileRequest> for ProfileCorrection {
    fn from(body: CorrectProfileRequest) -> Self {
        ProfileCorrection {
            first_name: body.first_name,
            last_name: body.last_name,
            email: body.email,
            phone: body.phone,
        }
    }
}

/// Body of `PATCH /guests/:id` and `PATCH /guests/:id/status`.
///
/// The status route requires `isActive`; the general patch treats it as optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyRequest {
    pub room_number: Option<String>,
    pub check_in_date: Option<NaiveDate>,
    pub check_out_date: Option<NaiveDate>,
    pub is_active: Option<bool>,
}

impl OccupancyRequest {
    pub fn change(&self) -> OccupancyChange {
        OccupancyChange {
            room_number: self.room_number.clone(),
            check_in_date: self.check_in_date,
            check_out_date: self.check_out_date,
        }
    }

    /// Room and both dates, all required for a check-in.
    pub fn check_in(&self) -> Result<(String, NaiveDate, NaiveDate), Response> {
        match (&self.room_number, self.check_in_date, self.check_out_date) {
            (Some(room), Some(check_in), Some(check_out)) => Ok((room.clone(), check_in, check_out)),
            _ => Err(json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                "activating a guest requires roomNumber, checkInDate and checkOutDate",
            )),
        }
    }
}

/// `GET /guests` query string. `page` and `limit` are taken as raw text:
/// empty or non-numeric values fall back to the defaults and are clamped later,
/// never rejected.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub search: Option<String>,
    pub status: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
}

impl SearchParams {
    pub fn to_query(&self) -> Result<DirectoryQuery, Response> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<OccupancyStatus>().map_err(validation)?),
        };
        let sort = self
            .sort
            .as_deref()
            .unwrap_or_default()
            .parse::<DirectorySort>()
            .map_err(validation)?;

        Ok(DirectoryQuery {
            text: self.search.clone(),
            status,
            sort,
            page: lenient_number(self.page.as_deref(), DEFAULT_PAGE),
            page_size: lenient_number(self.limit.as_deref(), DEFAULT_PAGE_SIZE),
        })
    }
}

fn lenient_number(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok()).unwrap_or(default)
}

fn validation(err: impl ToString) -> Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
}

pub fn guest_to_json(guest: &Guest) -> JsonValue {
    let profile = guest.profile();
    let occupancy = guest.occupancy();
    json!({
        "id": guest.id_typed().to_string(),
        "tenantId": guest.tenant_id().map(|t| t.to_string()),
        "firstName": profile.first_name,
        "lastName": profile.last_name,
        "email": profile.email,
        "phone": profile.phone,
        "isActive": guest.is_active(),
        "roomNumber": occupancy.room_number(),
        "checkInDate": occupancy.check_in_date(),
        "checkOutDate": occupancy.check_out_date(),
        "stayHistory": stays_to_json(guest.stay_history()),
        "loyalty": loyalty_to_json(guest.loyalty()),
        "createdAt": guest.created_at(),
        "lastLogin": guest.last_login(),
        "version": guest.version(),
    })
}

pub fn stays_to_json(stays: &[StayRecord]) -> JsonValue {
    JsonValue::Array(
        stays
            .iter()
            .map(|s| {
                json!({
                    "roomNumber": s.room_number,
                    "checkInDate": s.check_in_date,
                    "checkOutDate": s.check_out_date,
                    "numberOfNights": s.number_of_nights,
                })
            })
            .collect(),
    )
}

fn loyalty_to_json(loyalty: &Loyalty) -> JsonValue {
    match loyalty {
        Loyalty::NotEnrolled => json!({ "enrolled": false }),
        Loyalty::Enrolled {
            tier,
            points,
            available_points,
        } => json!({
            "enrolled": true,
            "tier": tier.as_str(),
            "points": points,
            "availablePoints": available_points,
        }),
    }
}

pub fn page_to_json(page: &DirectoryPage) -> JsonValue {
    json!({
        "items": page.items.iter().map(guest_to_json).collect::<Vec<_>>(),
        "total": page.total,
        "totalPages": page.total_pages,
        "page": page.page,
        "pageSize": page.page_size,
    })
}
