use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use db::models::employee::{Employee, Principal};
use deployment::Deployment;

use crate::DeploymentImpl;

/// Set by the upstream auth layer once it has verified the caller.
pub const EMPLOYEE_ID_HEADER: &str = "x-employee-id";

/// Resolves the `X-Employee-Id` header into a [`Principal`] request
/// extension. Requests without the header pass through anonymously;
/// role-gated operations reject those downstream. A header that does not
/// resolve to an employee is rejected outright.
pub async fn load_principal(
    State(deployment): State<DeploymentImpl>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let raw = request
        .headers()
        .get(EMPLOYEE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(raw) = raw {
        let Ok(employee_id) = raw.parse::<i64>() else {
            tracing::warn!(header = raw, "Malformed principal header");
            return Err(StatusCode::UNAUTHORIZED);
        };
        match Employee::find_by_id(&deployment.db().pool, employee_id).await {
            Ok(Some(employee)) => {
                request.extensions_mut().insert(Principal::from(&employee));
            }
            Ok(None) => {
                tracing::warn!(employee_id, "Principal header names an unknown employee");
                return Err(StatusCode::UNAUTHORIZED);
            }
            Err(error) => {
                tracing::error!(%error, "Failed to resolve principal");
                return Err(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    Ok(next.run(request).await)
}
