use std::fmt::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::archive;
use crate::batch::{BatchOrchestrator, BatchOutcome};
use crate::document;
use crate::error::{ReportError, Result};
use crate::export;
use crate::models::{CostLine, RiskTier, School};
use crate::risk::{self, GuidanceTable};
use crate::source::{fetch_single, SurveySource};
use crate::staging::{sanitize_component, StagingArea, StagingRoot};

pub const TOTAL_LABEL: &str = "Total";

/// One student's composed document.
#[derive(Debug, Clone)]
pub struct StudentReportArtifact {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub tier: RiskTier,
}

/// A finished archive on disk. The file lives inside `staging`, so it is
/// removed together with the staging area once this value is dropped.
#[derive(Debug)]
pub struct PreparedArchive {
    pub staging: StagingArea,
    pub path: PathBuf,
    pub file_name: String,
}

#[derive(Debug)]
pub struct SchoolReportBundle {
    pub archive: PreparedArchive,
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone)]
pub struct ExportReceipt {
    pub school: School,
    pub rows: usize,
}

/// Entry point for every report operation, shared by the HTTP routes and
/// the CLI.
#[derive(Clone)]
pub struct ReportService {
    source: Arc<dyn SurveySource>,
    staging: StagingRoot,
    workers: usize,
    guidance: &'static GuidanceTable,
}

impl ReportService {
    pub fn new(
        source: Arc<dyn SurveySource>,
        staging: StagingRoot,
        workers: usize,
        guidance: &'static GuidanceTable,
    ) -> Self {
        Self {
            source,
            staging,
            workers: workers.max(1),
            guidance,
        }
    }

    pub async fn student_document(&self, survey_id: Uuid) -> Result<StudentReportArtifact> {
        let metrics = fetch_single(self.source.as_ref(), survey_id).await?;
        let file_name = format!(
            "{}-{}.pdf",
            sanitize_component(&metrics.student_name),
            metrics.surveyed_on.format("%Y-%m-%d")
        );
        let guidance = self.guidance;

        let (tier, bytes) = tokio::task::spawn_blocking(move || {
            let assessment = risk::assess(&metrics, guidance);
            document::compose(&assessment, &metrics).map(|bytes| (assessment.tier, bytes))
        })
        .await
        .map_err(|e| ReportError::Render(format!("composition task failed: {e}")))??;

        tracing::debug!(%survey_id, %tier, size = bytes.len(), "student document ready");
        Ok(StudentReportArtifact {
            bytes,
            file_name,
            tier,
        })
    }

    /// Runs the whole-school pipeline: resolve surveys, generate every
    /// document into a fresh staging area, then pack it.
    pub async fn school_bundle(&self, school_id: Uuid) -> Result<SchoolReportBundle> {
        let school = self.school(school_id).await?;
        let entries = self.source.school_surveys(school_id).await?;
        if entries.is_empty() {
            return Err(ReportError::NotFound(format!(
                "no surveys recorded for school {school_id}"
            )));
        }

        let staging = self.staging.begin_run(&school.name)?;
        let orchestrator =
            BatchOrchestrator::new(Arc::clone(&self.source), self.guidance, self.workers);
        let outcome = orchestrator.run(school_id, &entries, &staging).await?;

        let path = staging.scratch_path("bundle.zip");
        let packed = pack_blocking(staging.content_dir().to_path_buf(), path.clone()).await?;
        tracing::info!(
            %school_id,
            run_id = %staging.run_id(),
            entries = packed,
            "school bundle packed"
        );

        Ok(SchoolReportBundle {
            archive: PreparedArchive {
                staging,
                path,
                file_name: format!("{}-PDF.zip", school.name),
            },
            outcome,
        })
    }

    /// Write step of the tabular export: produces CSV and XLSX for the
    /// school and leaves the packed archive waiting for [`Self::open_export`].
    pub async fn export_school(
        &self,
        school_id: Uuid,
        labels: Vec<String>,
    ) -> Result<ExportReceipt> {
        export::validate_labels(&labels)?;
        let school = self.school(school_id).await?;
        let rows = self.source.school_survey_rows(school_id).await?;

        let staging = self.staging.begin_run(&school.name)?;
        let target = self.export_path(school_id)?;
        let content = staging.content_dir().to_path_buf();
        let stem = sanitize_component(&school.name);

        let row_count = tokio::task::spawn_blocking(move || -> Result<usize> {
            let written = export::export_school(&content, &stem, &labels, &rows)?;
            archive::pack(&content, &target)?;
            Ok(written.rows)
        })
        .await
        .map_err(|e| ReportError::Render(format!("export task failed: {e}")))??;

        tracing::info!(%school_id, rows = row_count, "tabular export ready");
        Ok(ExportReceipt {
            school,
            rows: row_count,
        })
    }

    /// Read step of the tabular export. The prepared archive is claimed by
    /// moving it into a fresh staging area, so it is served at most once.
    pub async fn open_export(&self, school_id: Uuid) -> Result<PreparedArchive> {
        let school = self.school(school_id).await?;
        let prepared = self.export_path(school_id)?;
        let staging = self.staging.begin_run("export")?;
        let path = staging.scratch_path(&format!("{school_id}.zip"));

        match tokio::fs::rename(&prepared, &path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReportError::NotFound(format!(
                    "no export prepared for school {school_id}"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(PreparedArchive {
            staging,
            path,
            file_name: format!("{}-EXCEL.zip", school.name),
        })
    }

    /// Summed unit cost per action for surveys dated in `[start, end)`,
    /// followed by a `Total` line.
    pub async fn cost_breakdown(
        &self,
        school_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CostLine>> {
        if start >= end {
            return Err(ReportError::Validation(format!(
                "start {start} must be before end {end}"
            )));
        }
        let lines = self.source.cost_breakdown(school_id, start, end).await?;
        Ok(with_total(lines))
    }

    pub async fn school(&self, school_id: Uuid) -> Result<School> {
        self.source
            .school(school_id)
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("school {school_id}")))
    }

    fn export_path(&self, school_id: Uuid) -> Result<PathBuf> {
        Ok(self.staging.exports_dir()?.join(format!("{school_id}.zip")))
    }
}

async fn pack_blocking(source: PathBuf, target: PathBuf) -> Result<usize> {
    tokio::task::spawn_blocking(move || archive::pack(&source, &target))
        .await
        .map_err(|e| ReportError::Render(format!("packing task failed: {e}")))?
}

pub fn with_total(mut lines: Vec<CostLine>) -> Vec<CostLine> {
    let total = lines.iter().map(|line| line.cost).sum();
    lines.push(CostLine {
        description: TOTAL_LABEL.to_string(),
        cost: total,
    });
    lines
}

/// Markdown summary of a cost breakdown. `lines` is expected to end with the
/// `Total` line produced by [`with_total`].
pub fn build_cost_report(
    school_name: &str,
    start: NaiveDate,
    end: NaiveDate,
    lines: &[CostLine],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Cost Breakdown Report");
    let _ = writeln!(
        output,
        "Generated for {} (surveys from {} until {})",
        school_name, start, end
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Actions");

    let (total, actions) = match lines.split_last() {
        Some((last, rest)) if last.description == TOTAL_LABEL => (last.cost, rest),
        _ => (lines.iter().map(|l| l.cost).sum(), lines),
    };

    if actions.is_empty() {
        let _ = writeln!(output, "No actions recorded for this window.");
    } else {
        for line in actions {
            let description = if line.description.is_empty() {
                "(unspecified)"
            } else {
                line.description.as_str()
            };
            let _ = writeln!(output, "- {}: {:.2}", description, line.cost);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## {}", TOTAL_LABEL);
    let _ = writeln!(output, "{:.2}", total);

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SurveyRow;
    use crate::risk::INDONESIAN;
    use crate::source::memory::MemorySource;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn service(source: MemorySource, root: &std::path::Path) -> ReportService {
        ReportService::new(Arc::new(source), StagingRoot::new(root), 4, &INDONESIAN)
    }

    fn labels(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("Q{i}")).collect()
    }

    #[tokio::test]
    async fn school_bundle_holds_one_document_per_student() {
        let (mut source, school_id) = MemorySource::with_school("SchoolName");
        source.add_student(school_id, "Budi", 20.0, day(14));
        source.add_student(school_id, "Siti", 80.0, day(15));
        let tmp = tempfile::tempdir().unwrap();
        let service = service(source, tmp.path());

        let bundle = service.school_bundle(school_id).await.unwrap();
        assert_eq!(bundle.archive.file_name, "SchoolName-PDF.zip");
        let tiers: Vec<String> = bundle
            .outcome
            .results
            .iter()
            .map(|r| match &r.status {
                crate::batch::ArtifactStatus::Written { tier } => tier.to_string(),
                crate::batch::ArtifactStatus::Failed { error } => error.clone(),
            })
            .collect();
        assert_eq!(tiers, vec!["low", "high"]);

        let names = archive::entry_names(&bundle.archive.path).unwrap();
        let pdfs: Vec<&String> = names.iter().filter(|n| n.ends_with(".pdf")).collect();
        assert_eq!(pdfs.len(), 2);
        assert!(names.contains(&"SchoolName/Budi/2024-03-14.pdf".to_string()));
        assert!(names.contains(&"SchoolName/Siti/2024-03-15.pdf".to_string()));
        assert!(names.contains(&"SchoolName/manifest.csv".to_string()));

        let run_dir = bundle.archive.staging.scratch_path("");
        drop(bundle);
        assert!(!run_dir.exists());
    }

    #[tokio::test]
    async fn school_without_surveys_is_not_found() {
        let (source, school_id) = MemorySource::with_school("SD Kosong");
        let tmp = tempfile::tempdir().unwrap();
        let service = service(source, tmp.path());

        let err = service.school_bundle(school_id).await.unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));
        let err = service.school_bundle(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));
    }

    #[tokio::test]
    async fn student_document_is_named_after_student_and_date() {
        let (mut source, school_id) = MemorySource::with_school("SD Negeri 1");
        let survey_id = source.add_student(school_id, "Budi", 50.0, day(14));
        let tmp = tempfile::tempdir().unwrap();
        let service = service(source, tmp.path());

        let artifact = service.student_document(survey_id).await.unwrap();
        assert_eq!(artifact.file_name, "Budi-2024-03-14.pdf");
        assert_eq!(artifact.tier, RiskTier::Medium);
        assert!(artifact.bytes.starts_with(b"%PDF"));

        let err = service.student_document(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));
    }

    #[tokio::test]
    async fn wrong_label_count_writes_nothing() {
        let (mut source, school_id) = MemorySource::with_school("SD Negeri 1");
        source.rows.insert(school_id, vec![SurveyRow::default()]);
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("staging");
        let service = service(source, &root);

        let err = service.export_school(school_id, labels(15)).await.unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn export_is_served_once() {
        let (mut source, school_id) = MemorySource::with_school("SD Negeri 1");
        source.rows.insert(
            school_id,
            vec![
                SurveyRow {
                    student_name: Some("Budi".to_string()),
                    ..Default::default()
                },
                SurveyRow {
                    student_name: Some("Siti".to_string()),
                    ..Default::default()
                },
            ],
        );
        let tmp = tempfile::tempdir().unwrap();
        let service = service(source, tmp.path());

        let err = service.open_export(school_id).await.unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));

        let receipt = service.export_school(school_id, labels(16)).await.unwrap();
        assert_eq!(receipt.rows, 2);

        let prepared = service.open_export(school_id).await.unwrap();
        assert_eq!(prepared.file_name, "SD Negeri 1-EXCEL.zip");
        let names = archive::entry_names(&prepared.path).unwrap();
        assert!(names.contains(&"SD Negeri 1/SD Negeri 1.csv".to_string()));
        assert!(names.contains(&"SD Negeri 1/SD Negeri 1.xlsx".to_string()));

        let err = service.open_export(school_id).await.unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));
    }

    #[tokio::test]
    async fn cost_breakdown_appends_total() {
        let (mut source, school_id) = MemorySource::with_school("SD Negeri 1");
        source.costs = vec![
            CostLine {
                description: "Fissure sealant".to_string(),
                cost: 150_000.0,
            },
            CostLine {
                description: "Topical fluoride".to_string(),
                cost: 50_000.0,
            },
        ];
        let tmp = tempfile::tempdir().unwrap();
        let service = service(source, tmp.path());

        let lines = service
            .cost_breakdown(school_id, day(1), day(31))
            .await
            .unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2].description, TOTAL_LABEL);
        assert_eq!(lines[2].cost, 200_000.0);

        let err = service
            .cost_breakdown(school_id, day(31), day(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
    }

    #[test]
    fn cost_report_lists_actions_and_total() {
        let lines = with_total(vec![
            CostLine {
                description: "Fissure sealant".to_string(),
                cost: 150_000.0,
            },
            CostLine {
                description: String::new(),
                cost: 25_000.0,
            },
        ]);
        let report = build_cost_report("SD Negeri 1", day(1), day(31), &lines);
        assert!(report.starts_with("# Cost Breakdown Report"));
        assert!(report.contains("- Fissure sealant: 150000.00"));
        assert!(report.contains("- (unspecified): 25000.00"));
        assert!(report.contains("## Total\n175000.00"));
    }

    #[test]
    fn empty_cost_report_says_so() {
        let report = build_cost_report("SD Negeri 1", day(1), day(31), &with_total(Vec::new()));
        assert!(report.contains("No actions recorded for this window."));
        assert!(report.contains("## Total\n0.00"));
    }
}
