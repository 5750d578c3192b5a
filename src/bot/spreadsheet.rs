//! Parsing and validation of uploaded question spreadsheets
//!
//! Uploads are parsed into a plain [`Table`] of strings, checked for a
//! `question` column and a question count within the configured limit,
//! and only then relayed downstream as the original bytes.

use crate::config::{EXCEL_SHEET_NAME, QUESTION_COLUMN, SECONDS_PER_QUESTION};
use bytes::Bytes;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;
use thiserror::Error;

/// File extensions accepted as spreadsheet uploads
pub const ACCEPTED_EXTENSIONS: &[&str] = &["xlsx", "xls", "csv"];

/// Reasons an upload is rejected before it is relayed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpreadsheetError {
    /// The bytes could not be read as a table
    #[error("{0}")]
    Parse(String),
    /// The table has no data rows
    #[error("file is empty")]
    Empty,
    /// No column is named `question`, in any case
    #[error("missing 'question' column (found: {})", found.join(", "))]
    MissingQuestionColumn {
        /// Header names that were present
        found: Vec<String>,
    },
    /// More questions than allowed
    #[error("{found} questions exceed the maximum of {max}")]
    TooManyQuestions {
        /// Non-empty questions in the file
        found: usize,
        /// Configured maximum
        max: usize,
    },
}

/// Input format, decided by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    /// Comma-separated values
    Csv,
    /// Excel workbook, read from the `rfp` sheet
    Workbook,
}

impl SheetFormat {
    /// `.csv` is read as CSV, every other accepted extension as a workbook.
    #[must_use]
    pub fn from_filename(filename: &str) -> Self {
        if filename.to_lowercase().ends_with(".csv") {
            Self::Csv
        } else {
            Self::Workbook
        }
    }
}

/// Returns `true` for file names with an accepted extension.
///
/// # Examples
///
/// ```
/// use rfp_responder_bot::bot::spreadsheet::is_accepted_filename;
///
/// assert!(is_accepted_filename("RFP.XLSX"));
/// assert!(!is_accepted_filename("notes.txt"));
/// ```
#[must_use]
pub fn is_accepted_filename(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ACCEPTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// A parsed sheet: header names plus data rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    /// Header row
    pub columns: Vec<String>,
    /// Data rows, padded to the header width
    pub rows: Vec<Vec<String>>,
}

impl Table {
    fn from_records(mut records: impl Iterator<Item = Vec<String>>) -> Self {
        let columns = records.next().unwrap_or_default();
        let width = columns.len();
        let rows = records
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .map(|mut row| {
                if row.len() < width {
                    row.resize(width, String::new());
                }
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Index of the question column, matched case-insensitively.
    #[must_use]
    pub fn question_column(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.trim().eq_ignore_ascii_case(QUESTION_COLUMN))
    }

    /// Number of non-empty cells in column `index`.
    #[must_use]
    pub fn non_empty_in(&self, index: usize) -> usize {
        self.rows
            .iter()
            .filter(|row| row.get(index).is_some_and(|cell| !cell.trim().is_empty()))
            .count()
    }
}

/// Parses an upload according to its file name.
///
/// # Errors
///
/// Returns [`SpreadsheetError::Parse`] when the bytes are not a readable
/// CSV file or the workbook has no `rfp` sheet.
pub fn parse(bytes: &[u8], filename: &str) -> Result<Table, SpreadsheetError> {
    match SheetFormat::from_filename(filename) {
        SheetFormat::Csv => parse_csv(bytes),
        SheetFormat::Workbook => parse_workbook(bytes),
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Table, SpreadsheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let records = reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect::<Vec<_>>())
                .map_err(|e| SpreadsheetError::Parse(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if records.is_empty() {
        return Err(SpreadsheetError::Parse(
            "No columns to parse from file".to_string(),
        ));
    }
    Ok(Table::from_records(records.into_iter()))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_workbook(bytes: &[u8]) -> Result<Table, SpreadsheetError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| SpreadsheetError::Parse(e.to_string()))?;
    let range = workbook
        .worksheet_range(EXCEL_SHEET_NAME)
        .map_err(|e| SpreadsheetError::Parse(format!("Worksheet named '{EXCEL_SHEET_NAME}' not found ({e})")))?;

    let records = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
    Ok(Table::from_records(records))
}

/// An upload that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    /// Data rows in the file
    pub rows: usize,
    /// Non-empty questions in the file
    pub questions: usize,
}

impl ValidatedUpload {
    /// Processing estimate: rows × 30 seconds, in minutes.
    ///
    /// # Examples
    ///
    /// ```
    /// use rfp_responder_bot::bot::spreadsheet::ValidatedUpload;
    ///
    /// let upload = ValidatedUpload { rows: 50, questions: 50 };
    /// assert_eq!(format!("{:.1}", upload.estimated_minutes()), "25.0");
    /// ```
    #[must_use]
    pub fn estimated_minutes(&self) -> f64 {
        let seconds = self.rows as u64 * SECONDS_PER_QUESTION;
        seconds as f64 / 60.0
    }
}

/// Checks a parsed table against the upload rules.
///
/// # Errors
///
/// Returns [`SpreadsheetError::Empty`], [`SpreadsheetError::MissingQuestionColumn`]
/// or [`SpreadsheetError::TooManyQuestions`], checked in that order.
pub fn validate(table: &Table, max_questions: usize) -> Result<ValidatedUpload, SpreadsheetError> {
    if table.rows.is_empty() || table.columns.is_empty() {
        return Err(SpreadsheetError::Empty);
    }

    let Some(index) = table.question_column() else {
        return Err(SpreadsheetError::MissingQuestionColumn {
            found: table.columns.clone(),
        });
    };

    let questions = table.non_empty_in(index);
    if questions > max_questions {
        return Err(SpreadsheetError::TooManyQuestions {
            found: questions,
            max: max_questions,
        });
    }

    Ok(ValidatedUpload {
        rows: table.rows.len(),
        questions,
    })
}

/// Parses and validates an upload in one step.
///
/// # Errors
///
/// Returns the first parse or validation failure.
pub fn inspect(
    bytes: &[u8],
    filename: &str,
    max_questions: usize,
) -> Result<ValidatedUpload, SpreadsheetError> {
    let table = parse(bytes, filename)?;
    tracing::info!("File read successfully. Columns found: {:?}", table.columns);
    validate(&table, max_questions)
}

/// Runs [`inspect`] on the blocking pool.
///
/// A panic inside the parser is reported as [`SpreadsheetError::Parse`].
///
/// # Errors
///
/// Returns the first parse or validation failure.
pub async fn inspect_off_thread(
    bytes: Bytes,
    filename: String,
    max_questions: usize,
) -> Result<ValidatedUpload, SpreadsheetError> {
    run_blocking(move || inspect(&bytes, &filename, max_questions)).await
}

async fn run_blocking<F>(task: F) -> Result<ValidatedUpload, SpreadsheetError>
where
    F: FnOnce() -> Result<ValidatedUpload, SpreadsheetError> + Send + 'static,
{
    tokio::task::spawn_blocking(task).await.unwrap_or_else(|e| {
        tracing::error!("Spreadsheet inspection aborted: {e}");
        Err(SpreadsheetError::Parse(e.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv_with_questions(count: usize, header: &str) -> Vec<u8> {
        let mut out = format!("id,{header}\n");
        for i in 0..count {
            out.push_str(&format!("{i},Question number {i}?\n"));
        }
        out.into_bytes()
    }

    #[test]
    fn test_accepted_extensions() {
        assert!(is_accepted_filename("rfp.xlsx"));
        assert!(is_accepted_filename("old.XLS"));
        assert!(is_accepted_filename("list.csv"));
        assert!(!is_accepted_filename("csv"));
        assert!(!is_accepted_filename("report.pdf"));
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let result = inspect(b"question\n", "rfp.csv", 100);
        assert_eq!(result, Err(SpreadsheetError::Empty));
    }

    #[test]
    fn test_zero_byte_csv_is_a_parse_error() {
        assert!(matches!(
            inspect(b"", "rfp.csv", 100),
            Err(SpreadsheetError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_question_column_lists_found_columns() {
        let result = inspect(b"id,text\n1,hello\n", "rfp.csv", 100);
        assert_eq!(
            result,
            Err(SpreadsheetError::MissingQuestionColumn {
                found: vec!["id".to_string(), "text".to_string()],
            })
        );
    }

    #[test]
    fn test_question_column_any_case_and_limit() {
        let bytes = csv_with_questions(101, "Question");
        assert_eq!(
            inspect(&bytes, "rfp.csv", 100),
            Err(SpreadsheetError::TooManyQuestions {
                found: 101,
                max: 100
            })
        );
    }

    #[test]
    fn test_valid_upload_estimate() {
        let bytes = csv_with_questions(50, "QUESTION");
        let upload = inspect(&bytes, "rfp.csv", 100).expect("valid upload");
        assert_eq!(upload.rows, 50);
        assert_eq!(upload.questions, 50);
        assert!((upload.estimated_minutes() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_blank_questions_do_not_count() {
        let bytes = b"question,notes\nFirst?,a\n,b\nSecond?,\n\n";
        let upload = inspect(bytes, "rfp.csv", 2).expect("valid upload");
        assert_eq!(upload.rows, 3);
        assert_eq!(upload.questions, 2);
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let table = parse(b"question,a,b\nonly?\n", "x.csv").expect("parses");
        assert_eq!(table.rows, vec![vec!["only?".to_string(), String::new(), String::new()]]);
    }

    #[test]
    fn test_garbage_workbook_is_a_parse_error() {
        assert!(matches!(
            inspect(b"definitely not a workbook", "rfp.xlsx", 100),
            Err(SpreadsheetError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_inspection_runs_off_thread() {
        let bytes = Bytes::from(csv_with_questions(3, "question"));
        let upload = inspect_off_thread(bytes, "rfp.csv".to_string(), 100).await;
        assert_eq!(upload.map(|u| u.questions), Ok(3));
    }

    #[tokio::test]
    async fn test_panicking_parser_becomes_parse_error() {
        let result = run_blocking(|| panic!("corrupt workbook")).await;
        assert!(
            matches!(&result, Err(SpreadsheetError::Parse(msg)) if msg.contains("panicked")),
            "got {result:?}"
        );
    }
}
