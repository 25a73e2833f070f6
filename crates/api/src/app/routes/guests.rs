use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use tracing::info;

use staydesk_core::TenantId;
use staydesk_guests::{Guest, GuestId};
use staydesk_infra::GuestError;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_guest).get(search_guests))
        .route("/:id", get(get_guest).patch(update_guest))
        .route("/:id/stays", get(stay_history))
        .route("/:id/profile", patch(correct_profile))
        .route("/:id/login", post(record_login))
        .route("/:id/status", patch(set_status))
        .route("/:id/loyalty/activate", post(enroll_loyalty))
        .route("/:id/loyalty/deactivate", post(unenroll_loyalty))
}

pub async fn register_guest(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    body: Result<Json<dto::RegisterGuestRequest>, JsonRejection>,
) -> Response {
    let body = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let tenant_id = tenant.tenant_id();
    match services.run(move |g| g.register(tenant_id, body.into())).await {
        Ok(guest) => {
            info!(tenant_id = %tenant_id, guest_id = %guest.id_typed(), "guest registered");
            (StatusCode::CREATED, Json(dto::guest_to_json(&guest))).into_response()
        }
        Err(e) => errors::guest_error_to_response(e),
    }
}

pub async fn search_guests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    params: Result<Query<dto::SearchParams>, QueryRejection>,
) -> Response {
    let query = match params {
        Ok(Query(p)) => match p.to_query() {
            Ok(q) => q,
            Err(resp) => return resp,
        },
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.body_text()),
    };

    let page = services.guests().search(tenant.tenant_id(), &query);
    (StatusCode::OK, Json(dto::page_to_json(&page))).into_response()
}

pub async fn get_guest(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let guest_id = match parse_guest_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tenant_id = tenant.tenant_id();
    guest_response(services.run(move |g| g.get(tenant_id, guest_id)).await)
}

pub async fn stay_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let guest_id = match parse_guest_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tenant_id = tenant.tenant_id();
    match services.run(move |g| g.stay_history(tenant_id, guest_id)).await {
        Ok(stays) => (StatusCode::OK, Json(serde_json::json!({ "items": dto::stays_to_json(&stays) }))).into_response(),
        Err(e) => errors::guest_error_to_response(e),
    }
}

pub async fn correct_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::CorrectProfileRequest>, JsonRejection>,
) -> Response {
    let guest_id = match parse_guest_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let tenant_id = tenant.tenant_id();
    guest_response(
        services
            .run(move |g| g.correct_profile(tenant_id, guest_id, body.into()))
            .await,
    )
}

pub async fn record_login(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let guest_id = match parse_guest_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tenant_id = tenant.tenant_id();
    let at = Utc::now();
    guest_response(services.run(move |g| g.record_login(tenant_id, guest_id, at)).await)
}

/// Check a guest out (`isActive: false`) or back in (`isActive: true` with a
/// room and both dates).
pub async fn set_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::OccupancyRequest>, JsonRejection>,
) -> Response {
    let guest_id = match parse_guest_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let tenant_id = tenant.tenant_id();
    match body.is_active {
        Some(false) => guest_response(services.run(move |g| g.deactivate(tenant_id, guest_id)).await),
        Some(true) => activate(&services, tenant_id, guest_id, &body).await,
        None => errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "isActive is required"),
    }
}

/// General occupancy edit.
///
/// `isActive: false` checks the guest out and ignores the other fields.
/// `isActive: true` on an inactive guest is a check-in; on an active guest it
/// is an ordinary edit of room and dates.
pub async fn update_guest(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::OccupancyRequest>, JsonRejection>,
) -> Response {
    let guest_id = match parse_guest_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = match parse_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let tenant_id = tenant.tenant_id();
    match body.is_active {
        Some(false) => return guest_response(services.run(move |g| g.deactivate(tenant_id, guest_id)).await),
        Some(true) => {
            let current = match services.run(move |g| g.get(tenant_id, guest_id)).await {
                Ok(guest) => guest,
                Err(e) => return errors::guest_error_to_response(e),
            };
            if !current.is_active() {
                return activate(&services, tenant_id, guest_id, &body).await;
            }
        }
        None => {}
    }

    let change = body.change();
    guest_response(
        services
            .run(move |g| g.update_occupancy(tenant_id, guest_id, change))
            .await,
    )
}

pub async fn enroll_loyalty(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let guest_id = match parse_guest_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tenant_id = tenant.tenant_id();
    guest_response(services.run(move |g| g.enroll(tenant_id, guest_id)).await)
}

pub async fn unenroll_loyalty(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Response {
    let guest_id = match parse_guest_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tenant_id = tenant.tenant_id();
    guest_response(services.run(move |g| g.unenroll(tenant_id, guest_id)).await)
}

async fn activate(
    services: &Arc<AppServices>,
    tenant_id: TenantId,
    guest_id: GuestId,
    body: &dto::OccupancyRequest,
) -> Response {
    let (room_number, check_in_date, check_out_date) = match body.check_in() {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    guest_response(
        services
            .run(move |g| g.activate(tenant_id, guest_id, room_number, check_in_date, check_out_date))
            .await,
    )
}

fn guest_response(result: Result<Guest, GuestError>) -> Response {
    match result {
        Ok(guest) => (StatusCode::OK, Json(dto::guest_to_json(&guest))).into_response(),
        Err(e) => errors::guest_error_to_response(e),
    }
}

fn parse_guest_id(id: &str) -> Result<GuestId, Response> {
    id.parse::<GuestId>()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid guest id"))
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    match body {
        Ok(Json(b)) => Ok(b),
        Err(e) => Err(errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.body_text())),
    }
}
