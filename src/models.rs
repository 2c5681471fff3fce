use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of free-text questions carried by one survey.
pub const QUESTION_COUNT: usize = 16;

#[derive(Debug, Clone)]
pub struct SurveyMetrics {
    pub student_name: String,
    pub school_name: String,
    pub surveyed_on: NaiveDate,
    /// Subjective caries-risk score, nominally 0-100.
    pub subjective_score: f64,
    pub upper_d: f64,
    pub upper_m: f64,
    pub upper_f: f64,
}

#[derive(Debug, Clone)]
pub struct SchoolSurveyEntry {
    pub student_id: Uuid,
    pub student_name: String,
    pub survey_id: Uuid,
    pub surveyed_on: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct School {
    pub id: Uuid,
    pub name: String,
}

/// Raw survey row for the tabular export. Every column may be missing in the
/// underlying join, in which case it is exported as an empty cell.
#[derive(Debug, Clone, Default)]
pub struct SurveyRow {
    pub student_name: Option<String>,
    pub answers: Vec<Option<String>>,
    pub lower_d: Option<String>,
    pub lower_e: Option<String>,
    pub lower_f: Option<String>,
    pub upper_d: Option<String>,
    pub upper_m: Option<String>,
    pub upper_f: Option<String>,
    pub subjective_score: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

/// Body of the tabular export request: the 16 question labels, in column order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionData {
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLine {
    pub description: String,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
