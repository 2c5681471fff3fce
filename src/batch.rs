use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::document;
use crate::error::{ReportError, Result};
use crate::models::{RiskTier, SchoolSurveyEntry};
use crate::risk::{self, GuidanceTable};
use crate::source::{fetch_single, SurveySource};
use crate::staging::{sanitize_component, ArtifactWriter, StagingArea};

pub const MANIFEST_FILE: &str = "manifest.csv";

/// Where one survey's document lands inside the bundle folder.
#[derive(Debug, Clone)]
pub struct ArtifactPlan {
    pub entry: SchoolSurveyEntry,
    pub relative: PathBuf,
}

#[derive(Debug, Clone)]
pub enum ArtifactStatus {
    Written { tier: RiskTier },
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct ArtifactResult {
    pub plan: ArtifactPlan,
    pub status: ArtifactStatus,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub run_id: Uuid,
    /// One result per planned survey, in plan order.
    pub results: Vec<ArtifactResult>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, ArtifactStatus::Written { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Assigns every survey a distinct relative path `<student>/<date>.pdf`.
///
/// Students whose names sanitize to the same folder, or to the manifest's
/// file name, get the survey id appended to the folder. Two surveys of one
/// student on the same day keep the folder and get the survey id appended to
/// the file name.
pub fn plan_artifacts(entries: &[SchoolSurveyEntry]) -> Vec<ArtifactPlan> {
    let mut owners: HashMap<String, HashSet<Uuid>> = HashMap::new();
    for entry in entries {
        owners
            .entry(sanitize_component(&entry.student_name))
            .or_default()
            .insert(entry.student_id);
    }

    let mut taken = HashSet::new();
    let mut plans = Vec::with_capacity(entries.len());
    for entry in entries {
        let base = sanitize_component(&entry.student_name);
        let shared = owners.get(&base).map_or(0, HashSet::len) > 1;
        let folder = if shared || base.eq_ignore_ascii_case(MANIFEST_FILE) {
            format!("{base}-{}", entry.survey_id)
        } else {
            base
        };
        let date = entry.surveyed_on.format("%Y-%m-%d");
        let mut relative = Path::new(&folder).join(format!("{date}.pdf"));
        if !taken.insert(relative.clone()) {
            relative = Path::new(&folder).join(format!("{date}-{}.pdf", entry.survey_id));
            taken.insert(relative.clone());
        }
        plans.push(ArtifactPlan {
            entry: entry.clone(),
            relative,
        });
    }
    plans
}

/// Generates one document per survey on a bounded pool of workers.
pub struct BatchOrchestrator {
    source: Arc<dyn SurveySource>,
    guidance: &'static GuidanceTable,
    workers: usize,
}

enum TaskError {
    /// Absorbed: the student is reported as failed.
    Student(ReportError),
    /// The staging area could not take the artifact; aborts the run.
    Staging(ReportError),
}

impl BatchOrchestrator {
    pub fn new(
        source: Arc<dyn SurveySource>,
        guidance: &'static GuidanceTable,
        workers: usize,
    ) -> Self {
        Self {
            source,
            guidance,
            workers: workers.max(1),
        }
    }

    /// Writes every planned document into `staging` and waits for all of
    /// them before returning. A manifest of the run is written last.
    pub async fn run(
        &self,
        school_id: Uuid,
        entries: &[SchoolSurveyEntry],
        staging: &StagingArea,
    ) -> Result<BatchOutcome> {
        let begin = Instant::now();
        let run_id = staging.run_id();
        let plans = plan_artifacts(entries);
        tracing::info!(
            %school_id,
            %run_id,
            workers = self.workers,
            students = plans.len(),
            "starting batch"
        );

        let permits = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut task_index = HashMap::new();
        for (idx, plan) in plans.iter().enumerate() {
            let permits = Arc::clone(&permits);
            let source = Arc::clone(&self.source);
            let guidance = self.guidance;
            let writer = staging.writer();
            let survey_id = plan.entry.survey_id;
            let relative = plan.relative.clone();
            let handle = tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.map_err(|e| {
                    TaskError::Student(ReportError::Render(format!("worker pool closed: {e}")))
                })?;
                generate_one(source, guidance, writer, survey_id, relative).await
            });
            task_index.insert(handle.id(), idx);
        }

        let mut statuses: Vec<Option<ArtifactStatus>> = vec![None; plans.len()];
        while let Some(joined) = tasks.join_next_with_id().await {
            let (idx, result) = match joined {
                Ok((id, result)) => (task_index.get(&id).copied(), result),
                Err(err) => {
                    let message = format!("generation task ended abnormally: {err}");
                    (
                        task_index.get(&err.id()).copied(),
                        Err(TaskError::Student(ReportError::Render(message))),
                    )
                }
            };
            let Some(idx) = idx else { continue };
            let plan = &plans[idx];

            let status = match result {
                Ok(tier) => ArtifactStatus::Written { tier },
                Err(TaskError::Student(err)) => {
                    tracing::warn!(
                        %school_id,
                        %run_id,
                        survey_id = %plan.entry.survey_id,
                        student = %plan.entry.student_name,
                        error = %err,
                        "skipping student"
                    );
                    ArtifactStatus::Failed {
                        error: err.to_string(),
                    }
                }
                Err(TaskError::Staging(err)) => {
                    tracing::error!(%school_id, %run_id, error = %err, "staging write failed");
                    return Err(err);
                }
            };
            statuses[idx] = Some(status);
        }

        let results: Vec<ArtifactResult> = plans
            .into_iter()
            .zip(statuses)
            .map(|(plan, status)| ArtifactResult {
                plan,
                status: status.unwrap_or(ArtifactStatus::Failed {
                    error: "task did not report".to_string(),
                }),
            })
            .collect();
        let outcome = BatchOutcome { run_id, results };

        write_manifest(&staging.writer(), &outcome).await?;

        tracing::info!(
            %school_id,
            %run_id,
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            elapsed_ms = begin.elapsed().as_millis() as u64,
            "batch finished"
        );
        Ok(outcome)
    }
}

async fn generate_one(
    source: Arc<dyn SurveySource>,
    guidance: &'static GuidanceTable,
    writer: ArtifactWriter,
    survey_id: Uuid,
    relative: PathBuf,
) -> std::result::Result<RiskTier, TaskError> {
    let metrics = fetch_single(source.as_ref(), survey_id)
        .await
        .map_err(TaskError::Student)?;

    let (tier, bytes) = tokio::task::spawn_blocking(move || {
        let assessment = risk::assess(&metrics, guidance);
        document::compose(&assessment, &metrics).map(|bytes| (assessment.tier, bytes))
    })
    .await
    .map_err(|e| TaskError::Student(ReportError::Render(format!("composition panicked: {e}"))))?
    .map_err(TaskError::Student)?;

    writer
        .write(&relative, &bytes)
        .await
        .map_err(TaskError::Staging)?;
    Ok(tier)
}

async fn write_manifest(writer: &ArtifactWriter, outcome: &BatchOutcome) -> Result<()> {
    let mut csv = csv::Writer::from_writer(Vec::new());
    csv.write_record(["student name", "survey id", "date", "tier", "status", "error"])?;
    for result in &outcome.results {
        let entry = &result.plan.entry;
        let (tier, status, error) = match &result.status {
            ArtifactStatus::Written { tier } => (tier.as_str(), "ok", ""),
            ArtifactStatus::Failed { error } => ("", "failed", error.as_str()),
        };
        let survey_id = entry.survey_id.to_string();
        let date = entry.surveyed_on.format("%Y-%m-%d").to_string();
        csv.write_record([
            entry.student_name.as_str(),
            survey_id.as_str(),
            date.as_str(),
            tier,
            status,
            error,
        ])?;
    }
    let bytes = csv.into_inner().map_err(|e| ReportError::Io(e.into_error()))?;
    writer.write(Path::new(MANIFEST_FILE), &bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::INDONESIAN;
    use crate::source::memory::MemorySource;
    use crate::staging::StagingRoot;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn entry(student_id: Uuid, name: &str, date: NaiveDate) -> SchoolSurveyEntry {
        SchoolSurveyEntry {
            student_id,
            student_name: name.to_string(),
            survey_id: Uuid::new_v4(),
            surveyed_on: date,
        }
    }

    #[test]
    fn plans_use_student_folder_and_date() {
        let budi = entry(Uuid::new_v4(), "Budi", day(14));
        let plans = plan_artifacts(std::slice::from_ref(&budi));
        assert_eq!(plans[0].relative, PathBuf::from("Budi/2024-03-14.pdf"));
    }

    #[test]
    fn same_named_students_get_distinct_folders() {
        let first = entry(Uuid::new_v4(), "Siti", day(14));
        let second = entry(Uuid::new_v4(), "Siti", day(14));
        let plans = plan_artifacts(&[first.clone(), second.clone()]);
        assert_eq!(
            plans[0].relative,
            PathBuf::from(format!("Siti-{}/2024-03-14.pdf", first.survey_id))
        );
        assert_eq!(
            plans[1].relative,
            PathBuf::from(format!("Siti-{}/2024-03-14.pdf", second.survey_id))
        );
    }

    #[test]
    fn repeat_survey_on_same_day_keeps_folder() {
        let student = Uuid::new_v4();
        let first = entry(student, "Made", day(14));
        let second = entry(student, "Made", day(14));
        let third = entry(student, "Made", day(15));
        let plans = plan_artifacts(&[first, second.clone(), third]);
        assert_eq!(plans[0].relative, PathBuf::from("Made/2024-03-14.pdf"));
        assert_eq!(
            plans[1].relative,
            PathBuf::from(format!("Made/2024-03-14-{}.pdf", second.survey_id))
        );
        assert_eq!(plans[2].relative, PathBuf::from("Made/2024-03-15.pdf"));
    }

    #[tokio::test]
    async fn student_named_like_the_manifest_does_not_abort_the_run() {
        let (mut source, school_id) = MemorySource::with_school("SD Negeri 3");
        source.add_student(school_id, "Budi", 20.0, day(14));
        let clash = source.add_student(school_id, "manifest.csv", 80.0, day(14));
        let entries = source.entries[&school_id].clone();

        let plans = plan_artifacts(&entries);
        assert_eq!(
            plans[1].relative,
            PathBuf::from(format!("manifest.csv-{clash}/2024-03-14.pdf"))
        );

        let tmp = tempfile::tempdir().unwrap();
        let staging = StagingRoot::new(tmp.path()).begin_run("SD Negeri 3").unwrap();
        let orchestrator = BatchOrchestrator::new(Arc::new(source), &INDONESIAN, 2);
        let outcome = orchestrator.run(school_id, &entries, &staging).await.unwrap();

        assert_eq!(outcome.succeeded(), 2);
        assert!(staging.content_dir().join(MANIFEST_FILE).is_file());
    }

    #[tokio::test]
    async fn writes_every_document_and_manifest() {
        let (mut source, school_id) = MemorySource::with_school("SD Negeri 1");
        for (idx, name) in ["Budi", "Siti", "Made", "Ani", "Zaki"].iter().enumerate() {
            source.add_student(school_id, name, 20.0 * idx as f64, day(14));
        }
        let entries = source.entries[&school_id].clone();
        let tmp = tempfile::tempdir().unwrap();
        let staging = StagingRoot::new(tmp.path()).begin_run("SD Negeri 1").unwrap();

        let orchestrator = BatchOrchestrator::new(Arc::new(source), &INDONESIAN, 2);
        let outcome = orchestrator.run(school_id, &entries, &staging).await.unwrap();

        assert_eq!(outcome.succeeded(), 5);
        assert_eq!(outcome.failed(), 0);
        assert_eq!(outcome.run_id, staging.run_id());
        for result in &outcome.results {
            let path = staging.content_dir().join(&result.plan.relative);
            let bytes = std::fs::read(path).unwrap();
            assert!(bytes.starts_with(b"%PDF"));
        }
        let names: Vec<&str> = outcome
            .results
            .iter()
            .map(|r| r.plan.entry.student_name.as_str())
            .collect();
        assert_eq!(names, vec!["Budi", "Siti", "Made", "Ani", "Zaki"]);

        let mut reader =
            csv::Reader::from_path(staging.content_dir().join(MANIFEST_FILE)).unwrap();
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| &r[4] == "ok"));
        assert_eq!(&records[0][3], "low");
        assert_eq!(&records[2][3], "medium");
        assert_eq!(&records[4][3], "high");
    }

    #[tokio::test]
    async fn failed_students_are_skipped_and_recorded() {
        let (mut source, school_id) = MemorySource::with_school("SD Negeri 2");
        let mut ids = Vec::new();
        for idx in 0..6 {
            ids.push(source.add_student(school_id, &format!("Siswa {idx}"), 50.0, day(14)));
        }
        source.failing.insert(ids[1]);
        source.failing.insert(ids[4]);
        // Missing metrics surface as NotFound for that student only.
        source.metrics.remove(&ids[5]);
        let entries = source.entries[&school_id].clone();

        let tmp = tempfile::tempdir().unwrap();
        let staging = StagingRoot::new(tmp.path()).begin_run("SD Negeri 2").unwrap();
        let orchestrator = BatchOrchestrator::new(Arc::new(source), &INDONESIAN, 3);
        let outcome = orchestrator.run(school_id, &entries, &staging).await.unwrap();

        assert_eq!(outcome.succeeded(), 3);
        assert_eq!(outcome.failed(), 3);
        for (idx, result) in outcome.results.iter().enumerate() {
            let written = staging.content_dir().join(&result.plan.relative).exists();
            let failed = matches!(result.status, ArtifactStatus::Failed { .. });
            assert_eq!(failed, [1, 4, 5].contains(&idx));
            assert_eq!(written, !failed);
        }

        let mut reader =
            csv::Reader::from_path(staging.content_dir().join(MANIFEST_FILE)).unwrap();
        let failed_rows = reader
            .records()
            .map(|r| r.unwrap())
            .filter(|r| &r[4] == "failed" && !r[5].is_empty())
            .count();
        assert_eq!(failed_rows, 3);
    }

    #[tokio::test]
    async fn empty_school_still_produces_manifest() {
        let (source, school_id) = MemorySource::with_school("SD Kosong");
        let tmp = tempfile::tempdir().unwrap();
        let staging = StagingRoot::new(tmp.path()).begin_run("SD Kosong").unwrap();
        let orchestrator = BatchOrchestrator::new(Arc::new(source), &INDONESIAN, 0);
        assert_eq!(orchestrator.workers, 1);

        let outcome = orchestrator.run(school_id, &[], &staging).await.unwrap();
        assert!(outcome.results.is_empty());
        assert!(staging.content_dir().join(MANIFEST_FILE).exists());
    }
}
