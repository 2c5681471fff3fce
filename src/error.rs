use axum::http::StatusCode;

/// Errors raised by the report pipeline.
///
/// Chart rendering failures never surface through this type to callers of
/// the document composer: they are logged and the chart is left out.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Caller input was rejected before any work was done.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A survey, school or export archive does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// More than one row matched where exactly one was expected.
    #[error("ambiguous result: {0}")]
    Ambiguous(String),

    /// Chart or document composition failed.
    #[error("render failed: {0}")]
    Render(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The survey database (or another collaborator) failed to answer.
    #[error("data source error: {0}")]
    DataSource(#[from] sqlx::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),
}

impl ReportError {
    /// Coarse HTTP status reported to callers.
    pub fn status(&self) -> StatusCode {
        match self {
            ReportError::Validation(_) => StatusCode::BAD_REQUEST,
            ReportError::NotFound(_) => StatusCode::NOT_FOUND,
            ReportError::DataSource(_) => StatusCode::BAD_GATEWAY,
            ReportError::Ambiguous(_)
            | ReportError::Render(_)
            | ReportError::Io(_)
            | ReportError::Csv(_)
            | ReportError::Archive(_)
            | ReportError::Spreadsheet(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable kind, used in logs and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ReportError::Validation(_) => "validation",
            ReportError::NotFound(_) => "not_found",
            ReportError::Ambiguous(_) => "ambiguous_result",
            ReportError::Render(_) => "render",
            ReportError::Io(_) | ReportError::Csv(_) | ReportError::Archive(_) => "io",
            ReportError::Spreadsheet(_) => "io",
            ReportError::DataSource(_) => "data_source",
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_distinguished_from_missing_rows() {
        assert_eq!(
            ReportError::Validation("bad id".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ReportError::NotFound("survey".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ReportError::Ambiguous("survey".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn io_family_shares_a_kind() {
        let err: ReportError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("disk"));
    }
}
