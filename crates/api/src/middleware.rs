use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use staydesk_core::TenantId;

use crate::app::errors::json_error;
use crate::context::TenantContext;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Resolve the hotel from `X-Tenant-Id` and attach a [`TenantContext`].
pub async fn tenant_middleware(mut req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let tenant_id = match extract_tenant(req.headers()) {
        Ok(id) => id,
        Err(msg) => return json_error(StatusCode::BAD_REQUEST, "missing_tenant", msg),
    };

    req.extensions_mut().insert(TenantContext::new(tenant_id));
    next.run(req).await
}

fn extract_tenant(headers: &HeaderMap) -> Result<TenantId, &'static str> {
    let header = headers
        .get(TENANT_HEADER)
        .ok_or("X-Tenant-Id header is required")?;

    let raw = header.to_str().map_err(|_| "X-Tenant-Id must be a UUID")?.trim();
    if raw.is_empty() {
        return Err("X-Tenant-Id header is required");
    }

    raw.parse::<TenantId>().map_err(|_| "X-Tenant-Id must be a UUID")
}
