use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::Instrument;

use crate::core::config::RetryPolicy;
use crate::schemas::grading::{
    GradingConfig, QuestionAnswer, QuestionGradeResult, StudentGradingResult, SubmissionRow,
};
use crate::services::prompts;
use crate::services::provider::{GradingProvider, ProviderError};
use crate::services::response_parser::parse_grade;

use super::retry::{call_with_retry, GradingError};

/// A fatal provider error stopped the run. Students graded before it are
/// kept so the caller can still persist them.
#[derive(Debug, Error)]
#[error("grading aborted after {} completed student(s): {source}", completed.len())]
pub(crate) struct GradingAborted {
    #[source]
    pub(crate) source: ProviderError,
    pub(crate) completed: Vec<StudentGradingResult>,
}

/// Spaces successive question calls at least `interval` apart.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    interval: Duration,
    last_call: Option<Instant>,
}

impl RateLimiter {
    pub(crate) fn new(interval: Duration) -> Self {
        Self { interval, last_call: None }
    }

    pub(crate) async fn wait(&self) {
        if let Some(last_call) = self.last_call {
            tokio::time::sleep_until(last_call + self.interval).await;
        }
    }

    pub(crate) fn mark(&mut self) {
        self.last_call = Some(Instant::now());
    }
}

/// Sequential students x questions loop over one provider.
pub(crate) struct GradingOrchestrator<'a> {
    config: &'a GradingConfig,
    provider: &'a dyn GradingProvider,
    policy: RetryPolicy,
    limiter: RateLimiter,
}

impl<'a> GradingOrchestrator<'a> {
    pub(crate) fn new(
        config: &'a GradingConfig,
        provider: &'a dyn GradingProvider,
        policy: RetryPolicy,
        rate_limit: Duration,
    ) -> Self {
        Self { config, provider, policy, limiter: RateLimiter::new(rate_limit) }
    }

    /// Grades students in input order, truncated to `max_students` first.
    pub(crate) async fn grade(
        &mut self,
        submissions: &[SubmissionRow],
        max_students: Option<usize>,
    ) -> Result<Vec<StudentGradingResult>, GradingAborted> {
        let selected = match max_students {
            Some(limit) => &submissions[..limit.min(submissions.len())],
            None => submissions,
        };

        tracing::info!(
            students = selected.len(),
            provider = self.provider.name(),
            model = self.provider.model(),
            "Starting grading run"
        );

        let mut completed = Vec::with_capacity(selected.len());
        for (position, row) in selected.iter().enumerate() {
            tracing::info!(
                student_id = %row.student_id,
                position = position + 1,
                total = selected.len(),
                "Grading student"
            );

            match self.grade_student(row).await {
                Ok(result) => {
                    metrics::counter!("grading_students_total").increment(1);
                    completed.push(result);
                }
                Err(source) => {
                    tracing::error!(
                        student_id = %row.student_id,
                        error = %source,
                        "Fatal provider error, aborting run"
                    );
                    return Err(GradingAborted { source, completed });
                }
            }
        }

        Ok(completed)
    }

    async fn grade_student(
        &mut self,
        row: &SubmissionRow,
    ) -> Result<StudentGradingResult, ProviderError> {
        let mut grades = Vec::with_capacity(row.answers.len());
        for answer in &row.answers {
            let span = tracing::info_span!(
                "grade_question",
                student_id = %row.student_id,
                question_id = %answer.question_id
            );
            let grade = self.grade_question(answer).instrument(span).await?;
            grades.push(grade);
        }

        let result = StudentGradingResult::finalize(row, grades);
        tracing::info!(
            student_id = %result.student_id,
            llm_total = result.total_llm_score,
            human_total = result.total_human_score,
            needs_review = result.needs_review,
            "Student graded"
        );
        Ok(result)
    }

    async fn grade_question(
        &mut self,
        answer: &QuestionAnswer,
    ) -> Result<QuestionGradeResult, ProviderError> {
        let Some(question) = self.config.question(&answer.question_id) else {
            return Ok(QuestionGradeResult::exhausted(0, "question is not part of this exam"));
        };

        let prompt = prompts::build_grading_prompt(&question.id, question.rubric, &answer.sql_text);
        let provider = self.provider;
        let max_score = question.max_score;

        self.limiter.wait().await;
        let outcome = call_with_retry(
            |attempt| {
                let prompt = prompt.as_str();
                async move {
                    tracing::debug!(attempt, "Requesting grade");
                    let raw = provider.generate(prompt).await.map_err(GradingError::Provider)?;
                    parse_grade(&raw, max_score).map_err(GradingError::Parse)
                }
            },
            self.policy.max_retries,
            self.policy.retry_delay,
        )
        .await;
        self.limiter.mark();

        let grade = outcome?;
        let status = if grade.error { "failed" } else { "graded" };
        metrics::counter!("grading_questions_total", "status" => status).increment(1);
        metrics::histogram!("grading_attempts").record(f64::from(grade.attempts));
        tracing::debug!(score = grade.score, attempts = grade.attempts, status, "Question graded");

        Ok(grade)
    }
}

pub(crate) async fn grade(
    submissions: &[SubmissionRow],
    config: &GradingConfig,
    provider: &dyn GradingProvider,
    max_students: Option<usize>,
    rate_limit: Duration,
    policy: RetryPolicy,
) -> Result<Vec<StudentGradingResult>, GradingAborted> {
    GradingOrchestrator::new(config, provider, policy, rate_limit)
        .grade(submissions, max_students)
        .await
}
