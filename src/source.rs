use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::{ReportError, Result};
use crate::models::{CostLine, School, SchoolSurveyEntry, SurveyMetrics, SurveyRow};

/// Read-only queries the report pipeline needs from the survey database.
///
/// Lookups that should match a single row return every match so the caller
/// can tell a missing survey from an ambiguous one.
#[async_trait]
pub trait SurveySource: Send + Sync {
    async fn survey_metrics(&self, survey_id: Uuid) -> Result<Vec<SurveyMetrics>>;

    /// Surveys of every student in a school, in database order.
    async fn school_surveys(&self, school_id: Uuid) -> Result<Vec<SchoolSurveyEntry>>;

    async fn school_survey_rows(&self, school_id: Uuid) -> Result<Vec<SurveyRow>>;

    async fn school(&self, school_id: Uuid) -> Result<Option<School>>;

    /// Unit costs summed per action for surveys dated in `[start, end)`.
    async fn cost_breakdown(
        &self,
        school_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CostLine>>;
}

/// Fetches the metrics of exactly one survey.
pub async fn fetch_single(source: &dyn SurveySource, survey_id: Uuid) -> Result<SurveyMetrics> {
    let mut rows = source.survey_metrics(survey_id).await?;
    match rows.len() {
        0 => Err(ReportError::NotFound(format!("survey {survey_id}"))),
        1 => Ok(rows.remove(0)),
        n => Err(ReportError::Ambiguous(format!(
            "survey {survey_id} matched {n} rows"
        ))),
    }
}
