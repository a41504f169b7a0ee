use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::employee::{CreateEmployee, Employee, EmployeeDeleted, UpdateEmployee};
use deployment::Deployment;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, middleware::load_employee_middleware};

pub async fn register_employee(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CreateEmployee>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<Employee>>), ApiError> {
    tracing::debug!(
        vendor_id = payload.vendor_id,
        email = %payload.email,
        "Registering employee"
    );

    let employee = Employee::create(&deployment.db().pool, &payload).await?;

    Ok((
        StatusCode::CREATED,
        ResponseJson(ApiResponse::success_with_message(
            employee,
            "Employee registered successfully!",
        )),
    ))
}

pub async fn list_by_vendor(
    State(deployment): State<DeploymentImpl>,
    Path(vendor_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<Vec<Employee>>>, ApiError> {
    let employees = Employee::find_by_vendor(&deployment.db().pool, vendor_id).await?;
    Ok(ResponseJson(ApiResponse::success(employees)))
}

pub async fn get_employee(
    Extension(employee): Extension<Employee>,
    State(_deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Employee>>, ApiError> {
    Ok(ResponseJson(ApiResponse::success(employee)))
}

pub async fn update_employee(
    Extension(employee): Extension<Employee>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<UpdateEmployee>,
) -> Result<ResponseJson<ApiResponse<Employee>>, ApiError> {
    let employee = Employee::update(&deployment.db().pool, employee.employee_id, &payload).await?;

    Ok(ResponseJson(ApiResponse::success_with_message(
        employee,
        "Employee details updated successfully",
    )))
}

/// Deletes the employee and pulls them out of every task's assignee list
/// for the vendor.
pub async fn delete_employee(
    Extension(employee): Extension<Employee>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<EmployeeDeleted>>, ApiError> {
    let deleted = Employee::delete(
        &deployment.db().pool,
        employee.vendor_id,
        employee.employee_id,
    )
    .await?;

    Ok(ResponseJson(ApiResponse::success_with_message(
        deleted,
        "Employee deleted successfully!",
    )))
}

pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let employee_id_router = Router::new()
        .route(
            "/",
            get(get_employee).put(update_employee).delete(delete_employee),
        )
        .layer(from_fn_with_state(
            deployment.clone(),
            load_employee_middleware::<DeploymentImpl>,
        ));

    Router::new()
        .route("/employees", post(register_employee))
        .route("/employees/vendor/{vendor_id}", get(list_by_vendor))
        .nest("/employees/{vendor_id}/{employee_id}", employee_id_router)
}
