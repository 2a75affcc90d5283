//! Analysis endpoints
//!
//! All routes require a session. Ownership is checked per analysis.

use axum::{
    Json, Router,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use super::dto::{
    AnalysisEnvelope, AnalysisListResponse, AnalysisResponse, AnalysisSummaryResponse,
    AnalyzeTextRequest, CompareParams, CompareResponse, EstimateParams, ExportParams,
    SaveAnalysisRequest, SavedAnalysisResponse, SuccessResponse,
};
use crate::AppState;
use crate::analysis::document::extract_text;
use crate::analysis::pdf;
use crate::analysis::report::{self, DEFAULT_HOURLY_RATE};
use crate::analysis::{Estimate, ExportFormat, Statistics};
use crate::auth::CurrentUser;
use crate::config::UploadConfig;
use crate::error::AppError;
use crate::service::{AnalysisService, AnalyzeInput};

/// Multipart field carrying the uploaded document
const FILE_FIELD: &str = "file";

/// Create analyses router, mounted under `/api`
pub fn analyses_router() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/analyses", get(list_analyses).post(save_analysis))
        .route("/analyses/compare", get(compare_analyses))
        .route("/analyses/:id", get(get_analysis).delete(delete_analysis))
        .route("/analyses/:id/export", get(export_analysis))
        .route("/analyses/:id/statistics", get(analysis_statistics))
        .route("/analyses/:id/estimate", get(analysis_estimate))
}

fn analysis_service(state: &AppState) -> AnalysisService {
    AnalysisService::new(state.db.clone(), state.llm.clone())
}

/// GET /api/analyses
async fn list_analyses(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<AnalysisListResponse>, AppError> {
    let analyses = analysis_service(&state).list(&user.id).await?;

    Ok(Json(AnalysisListResponse {
        analyses: analyses
            .into_iter()
            .map(AnalysisSummaryResponse::from)
            .collect(),
    }))
}

/// POST /api/analyses
///
/// Stores a result computed elsewhere and counts it as one AI call.
async fn save_analysis(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<SaveAnalysisRequest>,
) -> Result<Json<AnalysisEnvelope<SavedAnalysisResponse>>, AppError> {
    let analysis = analysis_service(&state)
        .save(&user, &req.document_name, &req.document_text, req.requirements)
        .await?;

    Ok(Json(AnalysisEnvelope {
        analysis: SavedAnalysisResponse {
            id: analysis.id,
            document_name: analysis.document_name,
            created_at: analysis.created_at,
        },
    }))
}

/// POST /api/analyze
///
/// Accepts a multipart upload (`file`) or a JSON body
/// `{documentName, text}`.
async fn analyze(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    request: Request,
) -> Result<Json<AnalysisEnvelope<AnalysisResponse>>, AppError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("multipart/form-data"))
        .unwrap_or(false);

    let input = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        read_upload(multipart, &state.config.upload).await?
    } else {
        let Json(body) = Json::<AnalyzeTextRequest>::from_request(request, &state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        AnalyzeInput {
            document_name: body.document_name,
            document_text: body.text,
        }
    };

    let (analysis, requirements) = analysis_service(&state).analyze(&user, input).await?;

    Ok(Json(AnalysisEnvelope {
        analysis: AnalysisResponse::analyzed(analysis, requirements),
    }))
}

/// Pull the document out of a multipart body and extract its text
async fn read_upload(
    mut multipart: Multipart,
    limits: &UploadConfig,
) -> Result<AnalyzeInput, AppError> {
    let max_bytes = limits.max_bytes;
    let mut document_name: Option<String> = None;
    let mut upload: Option<(String, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        match field.name() {
            Some(FILE_FIELD) => {
                let file_name = field.file_name().unwrap_or("document").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(e.body_text()))?;
                if bytes.len() > max_bytes {
                    return Err(AppError::Validation(format!(
                        "File too large (max {} bytes)",
                        max_bytes
                    )));
                }
                upload = Some((file_name, content_type, bytes.to_vec()));
            }
            Some("documentName") => {
                let name = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(e.body_text()))?;
                document_name = Some(name);
            }
            _ => {}
        }
    }

    let (file_name, content_type, bytes) =
        upload.ok_or_else(|| AppError::Validation("No file provided".to_string()))?;
    tracing::debug!(file_name = %file_name, size = bytes.len(), "Document uploaded");

    let document_text = extract_text(
        &file_name,
        content_type.as_deref(),
        bytes,
        limits.max_extracted_bytes,
    )
    .await?;
    let document_name = document_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or(file_name);

    Ok(AnalyzeInput {
        document_name,
        document_text,
    })
}

/// GET /api/analyses/:id
async fn get_analysis(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<AnalysisEnvelope<AnalysisResponse>>, AppError> {
    let analysis = analysis_service(&state).get_owned(&user.id, &id).await?;
    let requirements = AnalysisService::requirements_of(&analysis)?;

    Ok(Json(AnalysisEnvelope {
        analysis: AnalysisResponse::full(analysis, requirements),
    }))
}

/// DELETE /api/analyses/:id
async fn delete_analysis(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    analysis_service(&state).delete(&user.id, &id).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// `requirements_<name>.<ext>` with only filename-safe characters
fn export_file_name(document_name: &str, format: ExportFormat) -> String {
    let stem = document_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(document_name);
    let safe: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe = if safe.is_empty() {
        "analysis".to_string()
    } else {
        safe
    };
    format!("requirements_{}.{}", safe, format.extension())
}

/// GET /api/analyses/:id/export?format=json|csv|markdown|pdf
async fn export_analysis(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Query(params): Query<ExportParams>,
) -> Result<Response, AppError> {
    let format = match params.format.as_deref() {
        None | Some("") => ExportFormat::Json,
        Some(raw) => ExportFormat::parse(raw).ok_or_else(|| {
            AppError::Validation(format!(
                "Unsupported export format: {}. Use json, csv, markdown or pdf.",
                raw
            ))
        })?,
    };

    let analysis = analysis_service(&state).get_owned(&user.id, &id).await?;
    let requirements = AnalysisService::requirements_of(&analysis)?;

    let body: Vec<u8> = match format {
        ExportFormat::Json => serde_json::to_vec_pretty(&requirements)
            .map_err(|e| AppError::Internal(e.into()))?,
        ExportFormat::Csv => report::to_csv(&requirements).into_bytes(),
        ExportFormat::Markdown => report::to_markdown(&requirements).into_bytes(),
        ExportFormat::Pdf => tokio::task::spawn_blocking(move || pdf::to_pdf(&requirements))
            .await
            .map_err(|e| AppError::Internal(e.into()))??,
    };

    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_file_name(&analysis.document_name, format)
    );
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// GET /api/analyses/:id/statistics
async fn analysis_statistics(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Statistics>, AppError> {
    let analysis = analysis_service(&state).get_owned(&user.id, &id).await?;
    let requirements = AnalysisService::requirements_of(&analysis)?;
    Ok(Json(Statistics::compute(&requirements)))
}

/// GET /api/analyses/:id/estimate?hourlyRate=50
async fn analysis_estimate(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Query(params): Query<EstimateParams>,
) -> Result<Json<Estimate>, AppError> {
    let hourly_rate = params.hourly_rate.unwrap_or(DEFAULT_HOURLY_RATE);
    if !hourly_rate.is_finite() || hourly_rate < 0.0 {
        return Err(AppError::Validation(
            "hourlyRate must be a non-negative number".to_string(),
        ));
    }

    let analysis = analysis_service(&state).get_owned(&user.id, &id).await?;
    let requirements = AnalysisService::requirements_of(&analysis)?;
    Ok(Json(Estimate::compute(&requirements, hourly_rate)))
}

/// GET /api/analyses/compare?ids=a,b,c
async fn compare_analyses(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<CompareParams>,
) -> Result<Json<CompareResponse>, AppError> {
    let ids: Vec<String> = params
        .ids
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::to_string)
        .collect();

    let analyses = analysis_service(&state).compare(&user.id, &ids).await?;
    Ok(Json(CompareResponse { analyses }))
}
