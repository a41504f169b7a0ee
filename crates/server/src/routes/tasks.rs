use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post, put},
};
use db::models::{
    employee::Principal,
    task::{CreateTask, Task, TaskError, TaskWithAssignees, UpdateTask},
};
use deployment::Deployment;
use serde::Serialize;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, middleware::load_task_middleware};

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TaskDeleted {
    pub vendor_id: i64,
    pub deleted_task_id: String,
}

pub async fn create_task(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CreateTask>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<TaskWithAssignees>>), ApiError> {
    tracing::debug!(
        vendor_id = payload.vendor_id,
        title = %payload.title,
        "Creating task"
    );

    let pool = &deployment.db().pool;
    let task = Task::create(pool, &payload).await?;
    let mut projected = Task::with_assignees(pool, task.vendor_id, vec![task])
        .await
        .map_err(TaskError::from)?;
    let Some(task) = projected.pop() else {
        return Err(ApiError::Internal(
            "Task projection lost the freshly created task".to_string(),
        ));
    };

    Ok((
        StatusCode::CREATED,
        ResponseJson(ApiResponse::success_with_message(
            task,
            "Task created successfully!",
        )),
    ))
}

pub async fn list_by_vendor(
    State(deployment): State<DeploymentImpl>,
    Path(vendor_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<Vec<TaskWithAssignees>>>, ApiError> {
    let pool = &deployment.db().pool;
    let tasks = Task::find_by_vendor(pool, vendor_id).await?;
    let tasks = Task::with_assignees(pool, vendor_id, tasks)
        .await
        .map_err(TaskError::from)?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub async fn list_assigned_by(
    State(deployment): State<DeploymentImpl>,
    Path((vendor_id, employee_id)): Path<(i64, i64)>,
) -> Result<ResponseJson<ApiResponse<Vec<TaskWithAssignees>>>, ApiError> {
    let pool = &deployment.db().pool;
    let tasks = Task::find_by_assigned_by(pool, vendor_id, employee_id).await?;
    let tasks = Task::with_assignees(pool, vendor_id, tasks)
        .await
        .map_err(TaskError::from)?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub async fn list_assigned_to(
    State(deployment): State<DeploymentImpl>,
    Path((vendor_id, employee_id)): Path<(i64, i64)>,
) -> Result<ResponseJson<ApiResponse<Vec<TaskWithAssignees>>>, ApiError> {
    let pool = &deployment.db().pool;
    let tasks = Task::find_by_assigned_to(pool, vendor_id, employee_id).await?;
    let tasks = Task::with_assignees(pool, vendor_id, tasks)
        .await
        .map_err(TaskError::from)?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub async fn get_task(
    State(deployment): State<DeploymentImpl>,
    Path((vendor_id, task_id)): Path<(i64, String)>,
) -> Result<ResponseJson<ApiResponse<TaskWithAssignees>>, ApiError> {
    let task = Task::find_with_assignees(&deployment.db().pool, vendor_id, &task_id).await?;
    let Some(task) = task else {
        return Err(ApiError::NotFound("Task not found for this vendor".to_string()));
    };
    Ok(ResponseJson(ApiResponse::success(task)))
}

/// Partial update and reassignment. A supplied `assignedTo` replaces the
/// prior set; a `dueDate` change requires the resolved principal to be an
/// admin of the task's vendor.
pub async fn update_task(
    Extension(task): Extension<Task>,
    principal: Option<Extension<Principal>>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<UpdateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let actor = principal.as_ref().map(|Extension(principal)| principal);
    let updated = Task::update(
        &deployment.db().pool,
        task.vendor_id,
        &task.task_id,
        &payload,
        actor,
    )
    .await?;

    Ok(ResponseJson(ApiResponse::success_with_message(
        updated,
        "Task reassigned successfully!",
    )))
}

pub async fn delete_task(
    Extension(task): Extension<Task>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<TaskDeleted>>, ApiError> {
    Task::delete_by_task_id(&deployment.db().pool, task.vendor_id, &task.task_id).await?;

    Ok(ResponseJson(ApiResponse::success_with_message(
        TaskDeleted {
            vendor_id: task.vendor_id,
            deleted_task_id: task.task_id,
        },
        "Task deleted successfully!",
    )))
}

pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let task_id_router = Router::new()
        .route("/", put(update_task).delete(delete_task))
        .layer(from_fn_with_state(
            deployment.clone(),
            load_task_middleware::<DeploymentImpl>,
        ));

    Router::new()
        .route("/tasks", post(create_task))
        .route("/tasks/vendor/{vendor_id}", get(list_by_vendor))
        .route(
            "/tasks/assigned-by/{vendor_id}/{employee_id}",
            get(list_assigned_by),
        )
        .route(
            "/tasks/assigned-to/{vendor_id}/{employee_id}",
            get(list_assigned_to),
        )
        .route("/tasks/task/{vendor_id}/{task_id}", get(get_task))
        .nest("/tasks/{vendor_id}/{task_id}", task_id_router)
}
