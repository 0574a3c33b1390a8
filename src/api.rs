use crate::config::Config;
use crate::job::service::AlertJob;
use crate::notification::mailer::HttpMailer;
use crate::persistence::repo::Repository;
use crate::routes::{
    get_status, list_subscriptions, run_alert_job, subscribe, unsubscribe, upload_report,
};
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::Level;

pub type ProductionJob = AlertJob<Repository, Repository, HttpMailer>;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<Repository>,
    pub job: Arc<ProductionJob>,
}

pub async fn build_state(config: Arc<Config>) -> Result<AppState, AppError> {
    let repository = Arc::new(Repository::new().await);
    let mailer = HttpMailer::new(config.notification.mail_relay_url.clone())?;
    let job = AlertJob::new(
        Arc::clone(&repository),
        Arc::clone(&repository),
        Arc::new(mailer),
        config,
    );
    Ok(AppState {
        repository,
        job: Arc::new(job),
    })
}

pub fn build_api(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/jobs/alert", post(run_alert_job))
        .route("/modules/:module/status", get(get_status))
        .route("/modules/:module/reports", post(upload_report))
        .route(
            "/modules/:module/subscriptions",
            get(list_subscriptions).post(subscribe),
        )
        .route("/modules/:module/subscriptions/:email", delete(unsubscribe))
        .layer(cors)
        .layer(DefaultBodyLimit::max(5003944))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Micros),
                ),
        )
        .with_state(app_state)
}

pub struct ApiResponse<T>(pub T);

impl<T> ApiResponse<T> {
    pub fn from(result: Result<T, AppError>) -> Result<ApiResponse<T>, AppError> {
        result.map(ApiResponse)
    }

    pub fn from_option(result: Result<Option<T>, AppError>) -> Result<ApiResponse<T>, AppError> {
        match result? {
            None => Err(AppError::NotFound("Not found".to_string())),
            Some(val) => Ok(ApiResponse(val)),
        }
    }
}

impl<T> IntoResponse for ApiResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        match serde_json::to_string(&self.0) {
            Ok(json) => json_response(StatusCode::OK, json.into()),
            Err(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to serialize response",
            )
                .into_response(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("mail delivery failed: {0}")]
    Mail(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Deserialize, Serialize, Clone)]
pub struct ErrorBody {
    pub message: String,
}

impl From<ErrorBody> for Body {
    fn from(error_body: ErrorBody) -> Body {
        Body::from(serde_json::to_string(&error_body).unwrap_or_default())
    }
}

fn json_response(status: StatusCode, body: Body) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            other => {
                tracing::error!("{}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        json_response(status, ErrorBody { message }.into())
    }
}
