use crate::api::{ApiResponse, AppError, AppState};
use crate::job::service::{now_micros, JobSummary};
use crate::notification::compose::is_valid_email;
use crate::persistence::model::QueryResult;
use crate::report::model::{DeviceInfo, TestCase, TestReport};
use crate::status::model::StatusCheckpoint;
use crate::subscription::model::{SubscribeRequest, Subscription};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;

pub async fn run_alert_job(
    State(app_state): State<AppState>,
) -> Result<ApiResponse<JobSummary>, AppError> {
    let summary = app_state.job.run(now_micros()).await;
    Ok(ApiResponse(summary))
}

pub async fn get_status(
    Path(module): Path<String>,
    State(app_state): State<AppState>,
) -> Result<ApiResponse<StatusCheckpoint>, AppError> {
    let result = app_state.repository.checkpoints().get(&module).await;
    ApiResponse::from_option(result)
}

#[derive(Deserialize)]
pub struct UploadReportRequest {
    pub build_id: String,
    pub start_timestamp: i64,
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

impl UploadReportRequest {
    fn into_report(self, module: String) -> Result<TestReport, AppError> {
        if module.trim().is_empty() {
            return Err(AppError::Validation("module name is empty".to_string()));
        }
        if self.start_timestamp <= 0 {
            return Err(AppError::Validation(
                "start_timestamp must be a positive microsecond timestamp".to_string(),
            ));
        }
        if self.test_cases.iter().any(|test_case| test_case.name.trim().is_empty()) {
            return Err(AppError::Validation("test case without a name".to_string()));
        }
        Ok(TestReport {
            module,
            build_id: self.build_id,
            start_timestamp: self.start_timestamp,
            devices: self.devices,
            test_cases: self.test_cases,
        })
    }
}

pub async fn upload_report(
    Path(module): Path<String>,
    State(app_state): State<AppState>,
    Json(request): Json<UploadReportRequest>,
) -> Result<ApiResponse<TestReport>, AppError> {
    let report = request.into_report(module)?;
    let report = app_state.repository.reports().create(report).await?;
    app_state
        .repository
        .modules()
        .record_upload(&report.module, report.start_timestamp)
        .await?;
    info!(module = %report.module, build = %report.build_id, "report stored");
    Ok(ApiResponse(report))
}

#[derive(Deserialize)]
pub struct PageParams {
    pub next_page_key: Option<String>,
}

pub async fn list_subscriptions(
    Path(module): Path<String>,
    Query(params): Query<PageParams>,
    State(app_state): State<AppState>,
) -> Result<ApiResponse<QueryResult<Subscription>>, AppError> {
    let result = app_state
        .repository
        .subscriptions()
        .list(&module, params.next_page_key)
        .await;
    ApiResponse::from(result)
}

impl SubscribeRequest {
    fn into_subscription(self, module: String) -> Result<Subscription, AppError> {
        let email = self.email.trim().to_string();
        if !is_valid_email(&email) {
            return Err(AppError::Validation(format!("{:?} is not an email address", email)));
        }
        Ok(Subscription { module, email })
    }
}

pub async fn subscribe(
    Path(module): Path<String>,
    State(app_state): State<AppState>,
    Json(request): Json<SubscribeRequest>,
) -> Result<ApiResponse<Subscription>, AppError> {
    let subscription = request.into_subscription(module)?;
    let result = app_state.repository.subscriptions().create(subscription).await;
    ApiResponse::from(result)
}

pub async fn unsubscribe(
    Path((module, email)): Path<(String, String)>,
    State(app_state): State<AppState>,
) -> Result<ApiResponse<Subscription>, AppError> {
    let result = app_state
        .repository
        .subscriptions()
        .delete(&module, &email)
        .await;
    ApiResponse::from_option(result)
}
