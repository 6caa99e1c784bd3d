use std::sync::Arc;

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    clients::health::HealthChecker,
    metrics::PrometheusMetrics,
    models::{
        health::HealthStatus,
        response::{ApiResponse, PaginationMeta},
        user::UserError,
    },
    usecases::user::{
        CreateUserInput, CreateUserUseCase, DeleteUserUseCase, GetUserUseCase, ListUsersUseCase,
        UpdateUserInput, UpdateUserUseCase, page_bounds,
    },
};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub struct UserUseCases {
    pub create: CreateUserUseCase,
    pub get: GetUserUseCase,
    pub list: ListUsersUseCase,
    pub update: UpdateUserUseCase,
    pub delete: DeleteUserUseCase,
}

pub struct AppState {
    pub health_checker: HealthChecker,
    pub metrics: Arc<PrometheusMetrics>,
    pub users: UserUseCases,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserBody {
    pub name: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .route("/v1/users", get(list_users).post(create_user))
        .route(
            "/v1/users/{id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until `cancel` fires, then drains in-flight requests.
pub async fn run_api_server(
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> Result<(), Error> {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.health_checker.check_database().await.status {
        HealthStatus::Unhealthy => (StatusCode::SERVICE_UNAVAILABLE, "Database not ready"),
        _ => (StatusCode::OK, "Ready"),
    }
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateUserInput>,
) -> Response {
    match state.users.create.execute(input).await {
        Ok(output) => (
            StatusCode::CREATED,
            Json(ApiResponse::success(output, "User created successfully")),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_user(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    match state.users.get.execute(id).await {
        Ok(user) => Json(ApiResponse::success(user, "User retrieved successfully")).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let (limit, offset) = page_bounds(query.limit.unwrap_or(0), query.offset.unwrap_or(0));

    match state.users.list.execute(limit, offset).await {
        Ok(users) => {
            let meta = PaginationMeta {
                limit,
                offset,
                count: users.len(),
            };
            Json(ApiResponse::success(users, "Users retrieved successfully").with_meta(meta))
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateUserBody>,
) -> Response {
    let input = UpdateUserInput {
        user_id: id,
        name: body.name,
    };

    match state.users.update.execute(input).await {
        Ok(user) => Json(ApiResponse::success(user, "User updated successfully")).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_user(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    match state.users.delete.execute(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

pub fn status_for(error: &UserError) -> StatusCode {
    match error {
        UserError::InvalidEmail | UserError::InvalidName | UserError::WeakPassword => {
            StatusCode::BAD_REQUEST
        }
        UserError::NotFound => StatusCode::NOT_FOUND,
        UserError::AlreadyExists => StatusCode::CONFLICT,
        UserError::CannotDelete(_) => StatusCode::FORBIDDEN,
        UserError::PasswordHash(_) | UserError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: UserError) -> Response {
    let status = status_for(&error);

    // Storage and hashing details stay in the logs.
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %error, "Request failed");
        "internal server error".to_string()
    } else {
        error.to_string()
    };

    (
        status,
        Json(ApiResponse::<()>::error(message, "Request failed")),
    )
        .into_response()
}
