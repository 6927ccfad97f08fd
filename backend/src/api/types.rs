//! REST API types for frontend integration.

use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{CsvError, PipelineError, ServerError};
use crate::models::TablePreview;
use crate::parser::LoadedTable;
use crate::profile::TableProfile;
use crate::report::{Analysis, Report};

/// Response sent after an upload has been analyzed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    /// Unique job identifier
    pub job_id: String,

    /// "ready" when no rule was violated, "warning" otherwise
    pub status: String,

    pub csv_info: CsvMetadata,

    pub report: Report,

    /// First rows of the cleaned table
    pub preview: TablePreview,
}

/// Response of `POST /api/profile`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub job_id: String,
    pub csv_info: CsvMetadata,
    pub profiles: TableProfile,
}

/// Uploaded file metadata (CSV or workbook)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub file_name: Option<String>,
    pub encoding: String,
    pub delimiter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl CsvMetadata {
    pub fn new(file_name: Option<String>, loaded: &LoadedTable) -> Self {
        Self {
            file_name,
            encoding: loaded.encoding.clone(),
            delimiter: format_delimiter(loaded.delimiter),
            sheet: loaded.sheet.clone(),
            row_count: loaded.table.row_count(),
            columns: loaded.table.column_names(),
        }
    }
}

impl AnalysisResponse {
    pub fn new(csv_info: CsvMetadata, analysis: Analysis, preview_rows: usize) -> Self {
        let status = if analysis.report.violations.is_empty() { "ready" } else { "warning" };
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: status.to_string(),
            csv_info,
            preview: analysis.cleaned.preview(preview_rows),
            report: analysis.report,
        }
    }
}

/// Printable delimiter; tab becomes `\t`.
pub fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

/// Stable machine-readable name for an error, sent as `errorKind`.
pub fn error_kind(error: &ServerError) -> &'static str {
    match error {
        ServerError::Pipeline(e) => e.kind(),
        ServerError::Csv(CsvError::EmptyFile | CsvError::NoHeaders) => "empty_input_error",
        ServerError::Csv(CsvError::EncodingError(_)) => "encoding_error",
        ServerError::Csv(CsvError::WorkbookError(_)) => "workbook_error",
        ServerError::Csv(_) => "csv_error",
        ServerError::Config(_) => "configuration_error",
        ServerError::BadRequest(_) => "bad_request_error",
        ServerError::PayloadTooLarge { .. } => "payload_too_large_error",
        ServerError::Internal(_) => "internal_error",
    }
}

/// Create an error response
pub fn error_response(error: &ServerError) -> Value {
    let mut body = json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "errorKind": error_kind(error),
        "error": error.to_string(),
    });
    if let ServerError::Pipeline(PipelineError::Cancelled { completed }) = error {
        body["completedSteps"] = json!(completed);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorSite;
    use crate::models::{CellValue, Column, Table};
    use crate::report::analyze;
    use crate::transform::PipelineSpec;
    use tokio_util::sync::CancellationToken;

    fn loaded() -> LoadedTable {
        LoadedTable {
            table: Table::new(vec![Column::new("a", vec!["1".into(), "2".into(), CellValue::Null])]).unwrap(),
            encoding: "utf-8".to_string(),
            delimiter: '\t',
            sheet: None,
        }
    }

    #[test]
    fn test_analysis_response_shape() {
        let loaded = loaded();
        let analysis = analyze(&loaded.table, &PipelineSpec::default(), &CancellationToken::new()).unwrap();
        let response = AnalysisResponse::new(CsvMetadata::new(Some("a.csv".into()), &loaded), analysis, 2);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["csvInfo"]["delimiter"], "\\t");
        assert_eq!(json["csvInfo"]["fileName"], "a.csv");
        assert!(json["csvInfo"].get("sheet").is_none());
        assert_eq!(json["preview"]["rows"].as_array().unwrap().len(), 2);
        assert_eq!(json["preview"]["totalRows"], 3);
        assert!(json["report"]["cleaningLog"].is_array());
    }

    #[test]
    fn test_error_response() {
        let err = ServerError::Pipeline(PipelineError::unknown_column(ErrorSite::Stage(2), "x"));
        let body = error_response(&err);
        assert_eq!(body["status"], "error");
        assert_eq!(body["errorKind"], "schema_error");
        assert!(body["error"].as_str().unwrap().contains("stage #2"));

        let cancelled = error_response(&ServerError::Pipeline(PipelineError::Cancelled { completed: 3 }));
        assert_eq!(cancelled["completedSteps"], 3);
    }
}
