//! HTTP request handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sandbox::SandboxJob;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::RunnerError;
use crate::registry::LanguageInfo;
use crate::server::AppState;

/// Client-facing message for every failure other than an unknown language.
/// Host paths and engine output stay in the logs.
const INTERNAL_FAILURE: &str = "execution environment error";

#[derive(Debug, Deserialize)]
pub struct CompileRequest {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub stdin: String,
}

#[derive(Debug, Serialize)]
pub struct CompileResponse {
    pub output: String,
    pub langid: String,
    pub code: String,
    pub errors: String,
    pub time: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

impl IntoResponse for RunnerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            RunnerError::UnknownLanguage(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_FAILURE.to_string()),
        };
        (status, Json(ErrorBody::new(message))).into_response()
    }
}

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

pub async fn languages(State(state): State<AppState>) -> Json<Vec<LanguageInfo>> {
    Json(state.registry.list())
}

/// `POST /compile`: run the submitted code and return its output.
///
/// Timeouts are a normal result (200, `time: null`); only orchestration
/// failures produce 500.
pub async fn compile(
    State(state): State<AppState>,
    Json(request): Json<CompileRequest>,
) -> Result<Json<CompileResponse>, RunnerError> {
    let compiler = state.registry.get(&request.language)?.clone();
    let job = SandboxJob::new(
        request.language,
        request.code,
        request.stdin,
        state.job_timeout,
    );
    let job_id = job.id.clone();

    // Own task, so a client hanging up cannot abort the job between launch
    // and cleanup.
    let supervisor = Arc::clone(&state.supervisor);
    let report = tokio::spawn(async move { supervisor.run(job, &compiler).await })
        .await
        .map_err(|e| {
            error!(job_id = %job_id, error = %e, "job task failed");
            RunnerError::Server(format!("job task failed: {e}"))
        })?;

    let output = report.result?;
    Ok(Json(CompileResponse {
        output: output.output,
        langid: report.job.language,
        code: report.job.source,
        errors: output.errors,
        time: output.time,
    }))
}
