use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Extension, Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{self, JwtSecret, Requester};
use crate::delivery;
use crate::error::{ReportError, Result};
use crate::logging;
use crate::models::{CostLine, QuestionData};
use crate::report::ReportService;

#[derive(Clone)]
pub struct AppState {
    pub reports: ReportService,
    pub jwt: JwtSecret,
}

/// Error body returned by every route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub error: String,
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "report request failed");
            if matches!(self, ReportError::DataSource(_)) {
                "survey data is unavailable".to_string()
            } else {
                "report generation failed".to_string()
            }
        } else {
            self.to_string()
        };
        let body = ApiError {
            code: self.kind().to_string(),
            error,
        };
        (status, Json(body)).into_response()
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/reports/surveys/:file", get(student_document))
        .route(
            "/reports/surveys/school/:school_id",
            get(read_export).post(write_export),
        )
        .route("/reports/school/:school_id", get(school_bundle))
        .route("/reports/costs/:school_id", get(cost_breakdown))
        .layer(middleware::from_fn_with_state(
            state.jwt.clone(),
            auth::require_bearer,
        ))
        .with_state(state)
        .layer(middleware::from_fn(logging::request_logging))
}

/// Accepts `<uuid>` or `<uuid>.pdf`.
fn parse_survey_file(file: &str) -> Result<Uuid> {
    let id = file.strip_suffix(".pdf").unwrap_or(file);
    Uuid::parse_str(id)
        .map_err(|_| ReportError::Validation(format!("{file} is not a survey id")))
}

fn parse_school_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ReportError::Validation(format!("{raw} is not a school id")))
}

async fn student_document(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(file): Path<String>,
) -> Result<Response> {
    let survey_id = parse_survey_file(&file)?;
    tracing::info!(%requester, %survey_id, "student report requested");
    let artifact = state.reports.student_document(survey_id).await?;
    Ok(delivery::document_response(artifact))
}

async fn school_bundle(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(school_id): Path<String>,
) -> Result<Response> {
    let school_id = parse_school_id(&school_id)?;
    tracing::info!(%requester, %school_id, "school bundle requested");
    let bundle = state.reports.school_bundle(school_id).await?;
    delivery::archive_response(bundle.archive).await
}

#[derive(Debug, Serialize)]
struct ExportAccepted {
    school: String,
    rows: usize,
}

async fn write_export(
    State(state): State<AppState>,
    Extension(requester): Extension<Requester>,
    Path(school_id): Path<String>,
    body: std::result::Result<Json<QuestionData>, JsonRejection>,
) -> Result<(StatusCode, Json<ExportAccepted>)> {
    let school_id = parse_school_id(&school_id)?;
    let Json(data) = body.map_err(|e| ReportError::Validation(e.body_text()))?;
    tracing::info!(%requester, %school_id, "tabular export requested");
    let receipt = state.reports.export_school(school_id, data.questions).await?;
    Ok((
        StatusCode::CREATED,
        Json(ExportAccepted {
            school: receipt.school.name,
            rows: receipt.rows,
        }),
    ))
}

async fn read_export(
    State(state): State<AppState>,
    Path(school_id): Path<String>,
) -> Result<Response> {
    let school_id = parse_school_id(&school_id)?;
    let archive = state.reports.open_export(school_id).await?;
    delivery::archive_response(archive).await
}

#[derive(Debug, Deserialize)]
struct CostRange {
    start: NaiveDate,
    end: NaiveDate,
}

async fn cost_breakdown(
    State(state): State<AppState>,
    Path(school_id): Path<String>,
    Query(range): Query<CostRange>,
) -> Result<Json<Vec<CostLine>>> {
    let school_id = parse_school_id(&school_id)?;
    let lines = state
        .reports
        .cost_breakdown(school_id, range.start, range.end)
        .await?;
    Ok(Json(lines))
}
