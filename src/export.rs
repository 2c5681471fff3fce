use std::path::{Path, PathBuf};

use rust_xlsxwriter::Workbook;

use crate::error::{ReportError, Result};
use crate::models::{SurveyRow, QUESTION_COUNT};

const TRAILING_COLUMNS: [&str; 8] = [
    "lower_d",
    "lower_e",
    "lower_f",
    "upper_d",
    "upper_m",
    "upper_f",
    "subjective score",
    "date of survey",
];

/// Student name, the question columns, then the fixed trailing columns.
pub const COLUMN_COUNT: usize = 1 + QUESTION_COUNT + TRAILING_COLUMNS.len();

const SHEET_NAME: &str = "sheet1";

#[derive(Debug, Clone)]
pub struct TabularExport {
    pub csv_path: PathBuf,
    pub xlsx_path: PathBuf,
    pub rows: usize,
}

pub fn validate_labels(labels: &[String]) -> Result<()> {
    if labels.len() != QUESTION_COUNT {
        return Err(ReportError::Validation(format!(
            "expected {QUESTION_COUNT} question labels, got {}",
            labels.len()
        )));
    }
    Ok(())
}

/// Header plus one row per survey, in the order given.
pub fn build_table(labels: &[String], rows: &[SurveyRow]) -> Result<Vec<Vec<String>>> {
    validate_labels(labels)?;
    if rows.is_empty() {
        return Err(ReportError::NotFound("no survey rows for school".into()));
    }

    let mut table = Vec::with_capacity(rows.len() + 1);
    let mut header = Vec::with_capacity(COLUMN_COUNT);
    header.push("student name".to_string());
    header.extend(labels.iter().cloned());
    header.extend(TRAILING_COLUMNS.iter().map(|c| c.to_string()));
    table.push(header);

    for row in rows {
        table.push(table_row(row));
    }
    Ok(table)
}

fn table_row(row: &SurveyRow) -> Vec<String> {
    let cell = |value: &Option<String>| value.clone().unwrap_or_default();

    let mut out = Vec::with_capacity(COLUMN_COUNT);
    out.push(cell(&row.student_name));
    for idx in 0..QUESTION_COUNT {
        out.push(row.answers.get(idx).and_then(|a| a.clone()).unwrap_or_default());
    }
    out.push(cell(&row.lower_d));
    out.push(cell(&row.lower_e));
    out.push(cell(&row.lower_f));
    out.push(cell(&row.upper_d));
    out.push(cell(&row.upper_m));
    out.push(cell(&row.upper_f));
    out.push(cell(&row.subjective_score));
    out.push(
        row.created_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
    );
    out
}

pub fn write_csv(table: &[Vec<String>], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in table {
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the same table to a single-sheet workbook, cell for cell.
pub fn write_xlsx(table: &[Vec<String>], path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;
    for (row_idx, record) in table.iter().enumerate() {
        for (col_idx, value) in record.iter().enumerate() {
            sheet.write_string(row_idx as u32, col_idx as u16, value.as_str())?;
        }
    }
    workbook.save(path)?;
    Ok(())
}

/// Writes `<file_stem>.csv` and `<file_stem>.xlsx` into `dir`.
pub fn export_school(
    dir: &Path,
    file_stem: &str,
    labels: &[String],
    rows: &[SurveyRow],
) -> Result<TabularExport> {
    let table = build_table(labels, rows)?;
    let csv_path = dir.join(format!("{file_stem}.csv"));
    let xlsx_path = dir.join(format!("{file_stem}.xlsx"));

    write_csv(&table, &csv_path)?;
    write_xlsx(&table, &xlsx_path)?;

    Ok(TabularExport {
        csv_path,
        xlsx_path,
        rows: table.len() - 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn labels(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("Pertanyaan {i}")).collect()
    }

    fn row(name: &str) -> SurveyRow {
        SurveyRow {
            student_name: Some(name.to_string()),
            answers: (1..=16).map(|i| Some(format!("jawaban {i}"))).collect(),
            lower_d: Some("1".to_string()),
            lower_e: Some("0".to_string()),
            lower_f: Some("2".to_string()),
            upper_d: Some("3".to_string()),
            upper_m: Some("0".to_string()),
            upper_f: Some("1".to_string()),
            subjective_score: Some("45.5".to_string()),
            created_at: NaiveDate::from_ymd_opt(2024, 3, 14)
                .and_then(|d| d.and_hms_opt(9, 30, 0)),
        }
    }

    #[test]
    fn header_and_rows_share_column_count() {
        let rows = vec![row("Budi"), SurveyRow::default(), row("Siti")];
        let table = build_table(&labels(16), &rows).unwrap();
        assert_eq!(table.len(), 4);
        assert!(table.iter().all(|r| r.len() == COLUMN_COUNT));
        assert_eq!(table[0][0], "student name");
        assert_eq!(table[0][1], "Pertanyaan 1");
        assert_eq!(table[0][16], "Pertanyaan 16");
        assert_eq!(table[0][COLUMN_COUNT - 1], "date of survey");
        assert_eq!(table[1][COLUMN_COUNT - 1], "2024-03-14 09:30:00");
        assert_eq!(table[1][COLUMN_COUNT - 2], "45.5");
    }

    #[test]
    fn missing_values_become_empty_cells() {
        let table = build_table(&labels(16), &[SurveyRow::default()]).unwrap();
        assert!(table[1].iter().all(|cell| cell.is_empty()));
    }

    #[test]
    fn rows_keep_source_order() {
        let rows = vec![row("Zaki"), row("Ani"), row("Made")];
        let table = build_table(&labels(16), &rows).unwrap();
        let names: Vec<&str> = table[1..].iter().map(|r| r[0].as_str()).collect();
        assert_eq!(names, vec!["Zaki", "Ani", "Made"]);
    }

    #[test]
    fn wrong_label_count_is_rejected() {
        for count in [0, 15, 17] {
            let err = build_table(&labels(count), &[row("Budi")]).unwrap_err();
            assert!(matches!(err, ReportError::Validation(_)));
        }
    }

    #[test]
    fn empty_result_is_not_found() {
        let err = build_table(&labels(16), &[]).unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));
    }

    #[test]
    fn writes_csv_and_workbook() {
        let tmp = tempfile::tempdir().unwrap();
        let export =
            export_school(tmp.path(), "SD Negeri 1", &labels(16), &[row("Budi"), row("Siti")])
                .unwrap();
        assert_eq!(export.rows, 2);
        assert!(export.xlsx_path.exists());

        let mut reader = csv::Reader::from_path(&export.csv_path).unwrap();
        assert_eq!(reader.headers().unwrap().len(), COLUMN_COUNT);
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[1][0], "Siti");
    }
}
