use std::io::Read;
use std::path::Path;

use thiserror::Error;

use crate::schemas::grading::{GradingConfig, QuestionAnswer, SubmissionRow, NO_ANSWER};

#[derive(Debug, Error)]
pub(crate) enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("invalid value in row {row}, column '{column}': '{value}'")]
    InvalidValue { row: usize, column: String, value: String },
}

pub(crate) fn load_submissions(
    path: &Path,
    config: &GradingConfig,
) -> Result<Vec<SubmissionRow>, LoadError> {
    let file = std::fs::File::open(path)
        .map_err(|source| LoadError::Io { path: path.display().to_string(), source })?;
    let rows = read_submissions(file, config)?;
    tracing::info!(path = %path.display(), students = rows.len(), "Loaded submissions");
    Ok(rows)
}

/// Reads and validates every row before returning; any problem fails the
/// whole load. `row` numbers in errors count data rows from 1.
pub(crate) fn read_submissions<R: Read>(
    reader: R,
    config: &GradingConfig,
) -> Result<Vec<SubmissionRow>, LoadError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::Headers).from_reader(reader);
    let headers = reader.headers()?.clone();

    let mut required = vec![GradingConfig::STUDENT_ID_COLUMN, GradingConfig::NAME_COLUMN];
    for question in config.questions() {
        required.push(question.response_column.as_str());
        required.push(question.score_column.as_str());
    }

    let missing: Vec<String> = required
        .iter()
        .filter(|column| !headers.iter().any(|header| header == **column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns(missing));
    }

    let index_of = |column: &str| headers.iter().position(|header| header == column).unwrap_or(0);
    let id_index = index_of(GradingConfig::STUDENT_ID_COLUMN);
    let name_index = index_of(GradingConfig::NAME_COLUMN);
    let question_indexes: Vec<(usize, usize)> = config
        .questions()
        .iter()
        .map(|question| (index_of(&question.response_column), index_of(&question.score_column)))
        .collect();

    let mut rows = Vec::new();
    for (position, record) in reader.records().enumerate() {
        let record = record?;
        let row_number = position + 1;
        let field = |index: usize| record.get(index).unwrap_or("").trim();

        let mut answers = Vec::with_capacity(config.questions().len());
        for (question, (response_index, score_index)) in
            config.questions().iter().zip(&question_indexes)
        {
            let sql_text = match field(*response_index) {
                "" => NO_ANSWER.to_string(),
                text => text.to_string(),
            };
            let human_score = parse_human_score(field(*score_index), question.max_score)
                .ok_or_else(|| LoadError::InvalidValue {
                    row: row_number,
                    column: question.score_column.clone(),
                    value: field(*score_index).to_string(),
                })?;

            answers.push(QuestionAnswer {
                question_id: question.id.clone(),
                sql_text,
                human_score,
            });
        }

        rows.push(SubmissionRow {
            student_id: field(id_index).to_string(),
            student_name: field(name_index).to_string(),
            answers,
        });
    }

    Ok(rows)
}

/// Empty cells count as 0; anything else must be a number within `[0, max]`.
fn parse_human_score(value: &str, max_score: f64) -> Option<f64> {
    if value.is_empty() {
        return Some(0.0);
    }
    value.parse::<f64>().ok().filter(|score| score.is_finite() && (0.0..=max_score).contains(score))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const HEADER: &str = "Student ID,Name,\
        Question 4.1 Response,Question 4.1 Score,\
        Question 4.2 Response,Question 4.2 Score,\
        Question 4.3 Response,Question 4.3 Score,\
        Question 4.4 Response,Question 4.4 Score,\
        Question 4.5 Response,Question 4.5 Score";

    fn load(body: &str) -> Result<Vec<SubmissionRow>, LoadError> {
        let csv = format!("{HEADER}\n{body}");
        read_submissions(csv.as_bytes(), &GradingConfig::sql_exam())
    }

    #[test]
    fn reads_rows_in_order() {
        let rows = load(
            "1001,Ada,SELECT 1,8,SELECT 2,9,SELECT 3,7,SELECT 4,10,SELECT 5,6\n\
             1002,Bob,\"SELECT a,\nb FROM t\",5.5,q,1,q,2,q,3,q,4\n",
        )
        .expect("rows");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].student_id, "1001");
        assert_eq!(rows[0].student_name, "Ada");
        let scores: Vec<f64> = rows[0].answers.iter().map(|answer| answer.human_score).collect();
        assert_eq!(scores, vec![8.0, 9.0, 7.0, 10.0, 6.0]);
        let first = rows[1].answer("4.1").expect("answer");
        assert_eq!(first.sql_text, "SELECT a,\nb FROM t");
        assert_eq!(first.human_score, 5.5);
    }

    #[test]
    fn blank_cells_become_placeholder_and_zero() {
        let rows = load("7,Cy,,,SELECT 2,9,SELECT 3,7,   ,10,SELECT 5,6\n").expect("rows");
        let first = rows[0].answer("4.1").expect("answer");
        assert_eq!(first.sql_text, NO_ANSWER);
        assert_eq!(first.human_score, 0.0);
        assert_eq!(rows[0].answer("4.4").expect("answer").sql_text, NO_ANSWER);
    }

    #[test]
    fn missing_columns_are_reported_together() {
        let csv = "Student ID,Question 4.1 Response,Question 4.1 Score\n1,SELECT 1,5\n";
        let err = read_submissions(csv.as_bytes(), &GradingConfig::sql_exam())
            .expect_err("missing columns");
        let LoadError::MissingColumns(missing) = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(missing.len(), 1 + 4 * 2);
        assert_eq!(missing[0], "Name");
        assert!(missing.contains(&"Question 4.5 Score".to_string()));
    }

    #[test]
    fn out_of_range_or_non_numeric_scores_are_rejected() {
        let err = load("1,A,q,8,q,9,q,7,q,10,q,6\n2,B,q,8,q,11,q,7,q,10,q,6\n")
            .expect_err("out of range");
        assert!(matches!(
            err,
            LoadError::InvalidValue { row: 2, ref column, ref value }
                if column == "Question 4.2 Score" && value == "11"
        ));

        let err = load("1,A,q,eight,q,9,q,7,q,10,q,6\n").expect_err("non-numeric");
        assert!(matches!(err, LoadError::InvalidValue { row: 1, .. }));

        let err = load("1,A,q,-1,q,9,q,7,q,10,q,6\n").expect_err("negative");
        assert!(matches!(err, LoadError::InvalidValue { row: 1, .. }));
    }

    #[test]
    fn header_whitespace_is_ignored() {
        let csv = HEADER.replace("Name", " Name ");
        let csv = format!("{csv}\n1,A,q,1,q,2,q,3,q,4,q,5\n");
        let rows = read_submissions(csv.as_bytes(), &GradingConfig::sql_exam()).expect("rows");
        assert_eq!(rows[0].student_name, "A");
    }

    #[test]
    fn load_from_file_reports_missing_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent.csv");
        let err = load_submissions(&missing, &GradingConfig::sql_exam()).expect_err("io");
        assert!(matches!(err, LoadError::Io { .. }));

        let present = dir.path().join("input.csv");
        let mut file = std::fs::File::create(&present).expect("create");
        writeln!(file, "{HEADER}").expect("header");
        writeln!(file, "1,A,q,1,q,2,q,3,q,4,q,5").expect("row");
        drop(file);
        assert_eq!(load_submissions(&present, &GradingConfig::sql_exam()).expect("rows").len(), 1);
    }
}
