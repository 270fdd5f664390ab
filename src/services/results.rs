use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::schemas::grading::{GradingConfig, StudentGradingResult};
use crate::schemas::results::{
    QuestionRecord, ResultRecord, NEEDS_REVIEW, TOTAL_GRADER_SCORE, TOTAL_LLM_SCORE,
    TOTAL_SCORE_DIFFERENCE,
};

pub(crate) fn write_results(
    path: &Path,
    config: &GradingConfig,
    results: &[StudentGradingResult],
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(ResultRecord::headers(config))?;
    for result in results {
        writer.write_record(ResultRecord::from_result(result).to_fields())?;
    }
    writer.flush().with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!(path = %path.display(), students = results.len(), "Results written");
    Ok(())
}

/// Reads a results file back in row order. Position in the returned vector
/// is the original row index.
pub(crate) fn read_results(path: &Path, config: &GradingConfig) -> Result<Vec<ResultRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(path)
        .with_context(|| format!("Failed to open results file {}", path.display()))?;

    let headers: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(index, name)| (name.to_string(), index))
        .collect();

    let missing: Vec<String> = ResultRecord::headers(config)
        .into_iter()
        .filter(|name| !headers.contains_key(name))
        .collect();
    if !missing.is_empty() {
        return Err(anyhow!("Results file is missing columns: {}", missing.join(", ")));
    }

    let mut records = Vec::new();
    for (position, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("Malformed results row {}", position + 1))?;
        let cells = Cells { headers: &headers, row: &row, row_number: position + 1 };

        let questions = config
            .questions()
            .iter()
            .map(|question| {
                let prefix = question.column_prefix();
                Ok(QuestionRecord {
                    question_id: question.id.clone(),
                    query: cells.text(&format!("{prefix}_query")),
                    grader_score: cells.number(&format!("{prefix}_grader_score"))?,
                    llm_score: cells.number(&format!("{prefix}_llm_score"))?,
                    score_difference: cells.number(&format!("{prefix}_score_difference"))?,
                    feedback: cells.text(&format!("{prefix}_feedback")),
                    needs_review: cells.flag(&format!("{prefix}_needs_review"))?,
                    grading_error: cells.flag(&format!("{prefix}_grading_error"))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        records.push(ResultRecord {
            student_id: cells.text("student_id"),
            student_name: cells.text("student_name"),
            questions,
            total_llm_score: cells.number(TOTAL_LLM_SCORE)?,
            total_grader_score: cells.number(TOTAL_GRADER_SCORE)?,
            total_score_difference: cells.number(TOTAL_SCORE_DIFFERENCE)?,
            needs_review: cells.flag(NEEDS_REVIEW)?,
        });
    }

    Ok(records)
}

struct Cells<'a> {
    headers: &'a HashMap<String, usize>,
    row: &'a csv::StringRecord,
    row_number: usize,
}

impl Cells<'_> {
    fn raw(&self, column: &str) -> &str {
        self.headers
            .get(column)
            .and_then(|index| self.row.get(*index))
            .map(str::trim)
            .unwrap_or("")
    }

    fn text(&self, column: &str) -> String {
        self.raw(column).to_string()
    }

    fn number(&self, column: &str) -> Result<f64> {
        let value = self.raw(column);
        value.parse::<f64>().map_err(|_| {
            anyhow!("Row {}: column '{column}' is not a number: '{value}'", self.row_number)
        })
    }

    fn flag(&self, column: &str) -> Result<bool> {
        match self.raw(column).to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            other => Err(anyhow!(
                "Row {}: column '{column}' is not a boolean: '{other}'",
                self.row_number
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::grading::QuestionGradeResult;
    use crate::test_support;

    #[test]
    fn written_results_read_back_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("grading_results.csv");
        let config = GradingConfig::sql_exam();

        let first = StudentGradingResult::finalize(
            &test_support::submission(&config, "s1", [8.0, 9.0, 7.0, 10.0, 6.0]),
            vec![QuestionGradeResult::graded(8.0, "uses, commas \"and quotes\"".to_string()); 5],
        );
        let mut grades = vec![QuestionGradeResult::graded(10.0, "ok".to_string()); 5];
        grades[4] = QuestionGradeResult::exhausted(3, "timeout error: slow");
        let second = StudentGradingResult::finalize(
            &test_support::submission(&config, "s2", [10.0; 5]),
            grades,
        );

        write_results(&path, &config, &[first, second]).expect("write");
        let records = read_results(&path, &config).expect("read");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].student_id, "s1");
        assert_eq!(records[0].total_llm_score, 40.0);
        assert_eq!(records[0].question("4.1").expect("q").feedback, "uses, commas \"and quotes\"");
        assert!(records[0].is_valid());

        assert_eq!(records[1].student_id, "s2");
        assert!(!records[1].is_valid());
        assert!(records[1].needs_review);
        let failed = records[1].question("4.5").expect("q");
        assert!(failed.grading_error);
        assert_eq!(failed.score_difference, -10.0);
    }

    #[test]
    fn missing_columns_are_named() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results.csv");
        std::fs::write(&path, "student_id,student_name\n1,A\n").expect("write");

        let err = read_results(&path, &GradingConfig::sql_exam()).expect_err("missing");
        assert!(err.to_string().contains("q4_1_llm_score"));
    }
}
