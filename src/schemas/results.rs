use crate::schemas::grading::{GradingConfig, StudentGradingResult};

pub(crate) const TOTAL_LLM_SCORE: &str = "total_llm_score";
pub(crate) const TOTAL_GRADER_SCORE: &str = "total_grader_score";
pub(crate) const TOTAL_SCORE_DIFFERENCE: &str = "total_score_difference";
pub(crate) const NEEDS_REVIEW: &str = "needs_review";

const QUESTION_FIELDS: [&str; 7] = [
    "query",
    "grader_score",
    "llm_score",
    "score_difference",
    "feedback",
    "needs_review",
    "grading_error",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QuestionRecord {
    pub(crate) question_id: String,
    pub(crate) query: String,
    pub(crate) grader_score: f64,
    pub(crate) llm_score: f64,
    pub(crate) score_difference: f64,
    pub(crate) feedback: String,
    pub(crate) needs_review: bool,
    pub(crate) grading_error: bool,
}

/// Flat, one-row-per-student view consumed by the results file, the
/// statistics reports and the distribution charts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResultRecord {
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) questions: Vec<QuestionRecord>,
    pub(crate) total_llm_score: f64,
    pub(crate) total_grader_score: f64,
    pub(crate) total_score_difference: f64,
    pub(crate) needs_review: bool,
}

impl ResultRecord {
    pub(crate) fn headers(config: &GradingConfig) -> Vec<String> {
        let mut headers = vec!["student_id".to_string(), "student_name".to_string()];
        for question in config.questions() {
            let prefix = question.column_prefix();
            headers.extend(QUESTION_FIELDS.iter().map(|field| format!("{prefix}_{field}")));
        }
        headers.extend(
            [TOTAL_LLM_SCORE, TOTAL_GRADER_SCORE, TOTAL_SCORE_DIFFERENCE, NEEDS_REVIEW]
                .iter()
                .map(|name| name.to_string()),
        );
        headers
    }

    pub(crate) fn from_result(result: &StudentGradingResult) -> Self {
        let questions = result
            .questions
            .iter()
            .map(|outcome| QuestionRecord {
                question_id: outcome.question_id.clone(),
                query: outcome.sql_text.clone(),
                grader_score: outcome.human_score,
                llm_score: outcome.grade.score,
                score_difference: outcome.score_difference(),
                feedback: outcome.grade.feedback.clone(),
                needs_review: outcome.grade.needs_review,
                grading_error: outcome.grade.error,
            })
            .collect();

        Self {
            student_id: result.student_id.clone(),
            student_name: result.student_name.clone(),
            questions,
            total_llm_score: result.total_llm_score,
            total_grader_score: result.total_human_score,
            total_score_difference: result.total_difference(),
            needs_review: result.needs_review,
        }
    }

    /// Field values in the same order as [`ResultRecord::headers`].
    pub(crate) fn to_fields(&self) -> Vec<String> {
        let mut fields = vec![self.student_id.clone(), self.student_name.clone()];
        for question in &self.questions {
            fields.push(question.query.clone());
            fields.push(question.grader_score.to_string());
            fields.push(question.llm_score.to_string());
            fields.push(question.score_difference.to_string());
            fields.push(question.feedback.clone());
            fields.push(question.needs_review.to_string());
            fields.push(question.grading_error.to_string());
        }
        fields.push(self.total_llm_score.to_string());
        fields.push(self.total_grader_score.to_string());
        fields.push(self.total_score_difference.to_string());
        fields.push(self.needs_review.to_string());
        fields
    }

    /// A record is usable for LLM/human comparison only if every question
    /// was actually graded.
    pub(crate) fn is_valid(&self) -> bool {
        !self.questions.iter().any(|question| question.grading_error)
    }

    pub(crate) fn question(&self, question_id: &str) -> Option<&QuestionRecord> {
        self.questions.iter().find(|question| question.question_id == question_id)
    }
}
