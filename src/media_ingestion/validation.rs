use bytes::Bytes;

use crate::error::AnalyzeError;

/// Accepted multipart names for the report label, in no particular priority.
pub const REPORT_TYPE_FIELDS: &[&str] = &["report_type", "type"];
/// Accepted multipart names for the uploaded image.
pub const IMAGE_FIELDS: &[&str] = &["file", "image"];

pub fn validate_report_type(report_type: Option<String>) -> Result<String, AnalyzeError> {
    let report_type = report_type.ok_or_else(|| AnalyzeError::validation("Missing report_type field"))?;

    if report_type.trim().is_empty() {
        return Err(AnalyzeError::validation("report_type must not be empty"));
    }

    Ok(report_type.trim().to_string())
}

pub fn validate_image_bytes(file_data: Option<Bytes>, max_size: usize) -> Result<Bytes, AnalyzeError> {
    let file_data = file_data.ok_or_else(|| AnalyzeError::validation("No file provided"))?;

    if file_data.is_empty() {
        return Err(AnalyzeError::validation("File is empty"));
    }

    if file_data.len() > max_size {
        return Err(AnalyzeError::validation(format!(
            "File size exceeds maximum allowed size of {} bytes",
            max_size
        )));
    }

    Ok(file_data)
}
