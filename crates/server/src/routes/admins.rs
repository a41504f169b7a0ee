use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{delete, post},
};
use db::models::{
    employee::Employee,
    vendor::{CreateAdmin, Vendor, VendorDeleted},
};
use deployment::Deployment;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

/// Registers a tenant: mints the vendor id and writes the admin as the
/// vendor's first employee record.
pub async fn register_admin(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CreateAdmin>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Employee>>), ApiError> {
    tracing::debug!(email = %payload.email, "Registering admin");

    let admin = Vendor::create(&deployment.db().pool, &payload).await?;

    Ok((
        StatusCode::CREATED,
        ResponseJson(ApiResponse::success_with_message(
            admin,
            "Admin registered successfully!",
        )),
    ))
}

pub async fn delete_admin(
    State(deployment): State<DeploymentImpl>,
    Path(vendor_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<VendorDeleted>>, ApiError> {
    let deleted = Vendor::delete(&deployment.db().pool, vendor_id).await?;

    Ok(ResponseJson(ApiResponse::success_with_message(
        deleted,
        "Admin and all related employees & tasks deleted successfully!",
    )))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new()
        .route("/admins", post(register_admin))
        .route("/admins/{vendor_id}", delete(delete_admin))
}
