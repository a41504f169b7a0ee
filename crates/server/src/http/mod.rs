use axum::{Router, middleware::from_fn_with_state, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{DeploymentImpl, routes};

mod auth;

pub use auth::EMPLOYEE_ID_HEADER;

pub fn router(deployment: DeploymentImpl) -> Router {
    let api_routes = Router::new()
        .merge(routes::admins::router())
        .merge(routes::employees::router(&deployment))
        .merge(routes::tasks::router(&deployment))
        .layer(from_fn_with_state(deployment.clone(), auth::load_principal));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(deployment)
}
