use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use core_types::CoreError;
use exporter::ExportError;
use index_engine::IndexError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    InvalidInput(#[from] CoreError),
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

/// Converts our custom `AppError` into an HTTP response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidInput(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            AppError::Index(index_err) => {
                tracing::error!(error = ?index_err, "Index error.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred while processing the index".to_string(),
                )
            }
            AppError::Export(ExportError::UnknownSheet(sheet)) => (
                StatusCode::BAD_REQUEST,
                format!("Unknown export sheet '{sheet}'"),
            ),
            AppError::Export(export_err) => {
                tracing::error!(error = ?export_err, "Export error.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An error occurred while exporting data".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errors_to_status_codes() {
        let bad_date = AppError::from(CoreError::UnsupportedDate("01/02/2024".to_string()));
        assert_eq!(bad_date.into_response().status(), StatusCode::BAD_REQUEST);

        let bad_sheet = AppError::from(ExportError::UnknownSheet("xlsx".to_string()));
        assert_eq!(bad_sheet.into_response().status(), StatusCode::BAD_REQUEST);

        let db = AppError::from(IndexError::Database(database::DbError::ConnectionConfigError(
            "down".to_string(),
        )));
        assert_eq!(db.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
