use axum::{
    extract::{Multipart, State, multipart::MultipartRejection},
    response::Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use super::validation::{IMAGE_FIELDS, REPORT_TYPE_FIELDS, validate_image_bytes, validate_report_type};
use crate::{
    AppState,
    error::AnalyzeError,
    processing::{AnalysisResult, build_prompt, decode_image_blocking, reconcile},
};

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub result: AnalysisResult,
}

#[derive(Debug)]
struct AnalysisRequest {
    report_type: String,
    image: Bytes,
}

pub async fn analyze_report(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisResponse>, AnalyzeError> {
    let span = tracing::info_span!(
        "analyze_report",
        request_id = %Uuid::new_v4(),
        report_type = tracing::field::Empty,
    );

    process_report(state, multipart).instrument(span).await
}

async fn process_report(
    state: AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisResponse>, AnalyzeError> {
    let mut multipart = multipart.map_err(|rejection| AnalyzeError::validation(rejection.body_text()))?;
    let request = read_analysis_request(&mut multipart, state.max_upload_bytes).await?;
    tracing::Span::current().record("report_type", request.report_type.as_str());

    let image = decode_image_blocking(request.image).await?;
    tracing::debug!("Decoded {} image {}x{}", image.mime_type, image.width, image.height);

    let prompt = build_prompt(&request.report_type);

    state.request_counter.log_generate_request(&format!(
        "{} | Report type: {}",
        state.model.model_name(),
        request.report_type.chars().take(50).collect::<String>()
    ));

    let raw = state
        .model
        .generate(&prompt, &image)
        .await
        .inspect_err(|_| {
            state.request_counter.record_failure();
        })?;

    let result = reconcile(&raw);
    tracing::info!("Report analysis completed");

    Ok(Json(AnalysisResponse { result }))
}

async fn read_analysis_request(
    multipart: &mut Multipart,
    max_upload_bytes: usize,
) -> Result<AnalysisRequest, AnalyzeError> {
    let mut report_type = None;
    let mut file_data = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AnalyzeError::validation(format!("Failed to read multipart: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();

        if REPORT_TYPE_FIELDS.contains(&name.as_str()) {
            let text = field.text().await.map_err(|e| {
                AnalyzeError::validation(format!("Failed to read {}: {}", name, e))
            })?;
            report_type = Some(text);
        } else if IMAGE_FIELDS.contains(&name.as_str()) {
            let data = field.bytes().await.map_err(|e| {
                AnalyzeError::validation(format!("Failed to read file: {}", e))
            })?;
            file_data = Some(data);
        }
    }

    Ok(AnalysisRequest {
        report_type: validate_report_type(report_type)?,
        image: validate_image_bytes(file_data, max_upload_bytes)?,
    })
}
