use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CostLine, School, SchoolSurveyEntry, SurveyMetrics, SurveyRow};
use crate::source::SurveySource;

/// Survey answer columns, section one then section two.
const ANSWER_ARRAY: &str = "ARRAY[\
    s.s1q1::text, s.s1q2::text, s.s1q3::text, s.s1q4::text, s.s1q5::text, s.s1q6::text, s.s1q7::text, \
    s.s2q1::text, s.s2q2::text, s.s2q3::text, s.s2q4::text, s.s2q5::text, s.s2q6::text, s.s2q7::text, \
    s.s2q8::text, s.s2q9::text]";

pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

#[derive(Clone)]
pub struct PgSurveySource {
    pool: PgPool,
}

impl PgSurveySource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SurveySource for PgSurveySource {
    async fn survey_metrics(&self, survey_id: Uuid) -> Result<Vec<SurveyMetrics>> {
        let rows = sqlx::query(
            r#"
            SELECT COALESCE(student.name, '') AS student_name,
                   COALESCE(school.name, '') AS school_name,
                   s.date::date AS surveyed_on,
                   COALESCE(s.subjective_score, 0)::float8 AS subjective_score,
                   COALESCE(s.upper_d, 0)::float8 AS upper_d,
                   COALESCE(s.upper_m, 0)::float8 AS upper_m,
                   COALESCE(s.upper_f, 0)::float8 AS upper_f
            FROM surveys s
            LEFT JOIN students student ON s.student_id = student.id
            LEFT JOIN schools school ON student.school_id = school.id
            WHERE s.id = $1
            "#,
        )
        .bind(survey_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(metrics_from_row).collect()
    }

    async fn school_surveys(&self, school_id: Uuid) -> Result<Vec<SchoolSurveyEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT st.id AS student_id, st.name AS student_name,
                   s.id AS survey_id, s.date::date AS surveyed_on
            FROM students st
            JOIN surveys s ON st.id = s.student_id
            WHERE st.school_id = $1
            ORDER BY st.name, s.date
            "#,
        )
        .bind(school_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(SchoolSurveyEntry {
                student_id: row.try_get("student_id")?,
                student_name: row.try_get("student_name")?,
                survey_id: row.try_get("survey_id")?,
                surveyed_on: row.try_get("surveyed_on")?,
            });
        }
        Ok(entries)
    }

    async fn school_survey_rows(&self, school_id: Uuid) -> Result<Vec<SurveyRow>> {
        let query = format!(
            "SELECT student.name AS student_name, \
             {ANSWER_ARRAY} AS answers, \
             s.lower_d::text AS lower_d, s.lower_e::text AS lower_e, s.lower_f::text AS lower_f, \
             s.upper_d::text AS upper_d, s.upper_m::text AS upper_m, s.upper_f::text AS upper_f, \
             s.subjective_score::text AS subjective_score, s.created_at::timestamp AS created_at \
             FROM surveys s \
             LEFT JOIN students student ON s.student_id = student.id \
             LEFT JOIN schools school ON student.school_id = school.id \
             WHERE school.id = $1 \
             ORDER BY s.created_at"
        );

        let rows = sqlx::query(&query)
            .bind(school_id)
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(SurveyRow {
                student_name: row.try_get("student_name")?,
                answers: row.try_get("answers")?,
                lower_d: row.try_get("lower_d")?,
                lower_e: row.try_get("lower_e")?,
                lower_f: row.try_get("lower_f")?,
                upper_d: row.try_get("upper_d")?,
                upper_m: row.try_get("upper_m")?,
                upper_f: row.try_get("upper_f")?,
                subjective_score: row.try_get("subjective_score")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(records)
    }

    async fn school(&self, school_id: Uuid) -> Result<Option<School>> {
        let row = sqlx::query("SELECT id, name FROM schools WHERE id = $1")
            .bind(school_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(School {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
            })),
            None => Ok(None),
        }
    }

    async fn cost_breakdown(
        &self,
        school_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CostLine>> {
        let rows = sqlx::query(
            r#"
            SELECT COALESCE(d.action, '') AS description,
                   COALESCE(SUM(d.unit_cost), 0)::float8 AS cost
            FROM cases c
            LEFT JOIN surveys s ON c.survey_id = s.id
            LEFT JOIN students st ON s.student_id = st.id
            LEFT JOIN diagnosis_and_actions d ON c.diagnosis_and_action_id = d.id
            WHERE st.school_id = $1
              AND s.date >= $2
              AND s.date < $3
            GROUP BY d.action
            ORDER BY d.action
            "#,
        )
        .bind(school_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            lines.push(CostLine {
                description: row.try_get("description")?,
                cost: row.try_get("cost")?,
            });
        }
        Ok(lines)
    }
}

fn metrics_from_row(row: &PgRow) -> Result<SurveyMetrics> {
    Ok(SurveyMetrics {
        student_name: row.try_get("student_name")?,
        school_name: row.try_get("school_name")?,
        surveyed_on: row.try_get("surveyed_on")?,
        subjective_score: row.try_get("subjective_score")?,
        upper_d: row.try_get("upper_d")?,
        upper_m: row.try_get("upper_m")?,
        upper_f: row.try_get("upper_f")?,
    })
}
