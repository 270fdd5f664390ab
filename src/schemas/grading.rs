use crate::services::prompts::{self, QuestionRubric};

/// Placeholder sent to the model when a student left a question blank.
pub(crate) const NO_ANSWER: &str = "[NO ANSWER PROVIDED]";

#[derive(Debug, Clone)]
pub(crate) struct QuestionSpec {
    pub(crate) id: String,
    pub(crate) response_column: String,
    pub(crate) score_column: String,
    pub(crate) max_score: f64,
    pub(crate) rubric: &'static QuestionRubric,
}

impl QuestionSpec {
    /// Column prefix used in the results file, e.g. `q4_1` for question `4.1`.
    pub(crate) fn column_prefix(&self) -> String {
        format!("q{}", self.id.replace('.', "_"))
    }
}

/// Immutable description of the exam being graded.
#[derive(Debug, Clone)]
pub(crate) struct GradingConfig {
    questions: Vec<QuestionSpec>,
}

impl GradingConfig {
    pub(crate) const STUDENT_ID_COLUMN: &'static str = "Student ID";
    pub(crate) const NAME_COLUMN: &'static str = "Name";

    /// The five-question SQL exam (questions 4.1 to 4.5, 10 points each).
    pub(crate) fn sql_exam() -> Self {
        let questions = prompts::SQL_EXAM_RUBRICS
            .iter()
            .map(|rubric| QuestionSpec {
                id: rubric.question_id.to_string(),
                response_column: format!("Question {} Response", rubric.question_id),
                score_column: format!("Question {} Score", rubric.question_id),
                max_score: rubric.max_score,
                rubric,
            })
            .collect();

        Self { questions }
    }

    pub(crate) fn questions(&self) -> &[QuestionSpec] {
        &self.questions
    }

    pub(crate) fn question(&self, id: &str) -> Option<&QuestionSpec> {
        self.questions.iter().find(|question| question.id == id)
    }

    pub(crate) fn total_points(&self) -> f64 {
        self.questions.iter().map(|question| question.max_score).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QuestionAnswer {
    pub(crate) question_id: String,
    pub(crate) sql_text: String,
    pub(crate) human_score: f64,
}

/// One student's row from the submissions file.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SubmissionRow {
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) answers: Vec<QuestionAnswer>,
}

#[cfg(test)]
impl SubmissionRow {
    pub(crate) fn answer(&self, question_id: &str) -> Option<&QuestionAnswer> {
        self.answers.iter().find(|answer| answer.question_id == question_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QuestionGradeResult {
    pub(crate) score: f64,
    pub(crate) feedback: String,
    pub(crate) needs_review: bool,
    pub(crate) error: bool,
    pub(crate) attempts: u32,
}

impl QuestionGradeResult {
    pub(crate) fn graded(score: f64, feedback: String) -> Self {
        Self { score, feedback, needs_review: false, error: false, attempts: 1 }
    }

    /// Result recorded after every attempt failed. The placeholder score of 0
    /// is never a real grade; `error` marks it for the statistics filter.
    pub(crate) fn exhausted(attempts: u32, reason: &str) -> Self {
        Self {
            score: 0.0,
            feedback: format!(
                "Automatic grading failed after {attempts} attempt(s): {reason}. Requires manual review."
            ),
            needs_review: true,
            error: true,
            attempts,
        }
    }

    pub(crate) fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QuestionOutcome {
    pub(crate) question_id: String,
    pub(crate) sql_text: String,
    pub(crate) human_score: f64,
    pub(crate) grade: QuestionGradeResult,
}

impl QuestionOutcome {
    pub(crate) fn score_difference(&self) -> f64 {
        round_tenth(self.grade.score - self.human_score)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StudentGradingResult {
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) questions: Vec<QuestionOutcome>,
    pub(crate) total_human_score: f64,
    pub(crate) total_llm_score: f64,
    pub(crate) needs_review: bool,
}

impl StudentGradingResult {
    /// Pairs each answer with its grade (same order) and derives the totals.
    pub(crate) fn finalize(row: &SubmissionRow, grades: Vec<QuestionGradeResult>) -> Self {
        let questions: Vec<QuestionOutcome> = row
            .answers
            .iter()
            .zip(grades)
            .map(|(answer, grade)| QuestionOutcome {
                question_id: answer.question_id.clone(),
                sql_text: answer.sql_text.clone(),
                human_score: answer.human_score,
                grade,
            })
            .collect();

        let total_human_score = questions.iter().map(|outcome| outcome.human_score).sum();
        let total_llm_score =
            round_tenth(questions.iter().map(|outcome| outcome.grade.score).sum());
        let needs_review = questions.iter().any(|outcome| outcome.grade.needs_review);

        Self {
            student_id: row.student_id.clone(),
            student_name: row.student_name.clone(),
            questions,
            total_human_score,
            total_llm_score,
            needs_review,
        }
    }

    pub(crate) fn total_difference(&self) -> f64 {
        round_tenth(self.total_llm_score - self.total_human_score)
    }

    pub(crate) fn has_errors(&self) -> bool {
        self.questions.iter().any(|outcome| outcome.grade.error)
    }
}

pub(crate) fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
