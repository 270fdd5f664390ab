use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::schemas::grading::QuestionGradeResult;
use crate::services::provider::ProviderError;
use crate::services::response_parser::ParseError;

/// Why a single grading attempt failed.
#[derive(Debug, Clone, Error)]
pub(crate) enum GradingError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl GradingError {
    fn kind_label(&self) -> &'static str {
        match self {
            Self::Provider(err) => err.kind.as_str(),
            Self::Parse(_) => "parse_error",
        }
    }
}

#[derive(Debug)]
enum RetryState {
    Attempting(u32),
    Retrying { attempt: u32, error: GradingError },
    Exhausted { attempts: u32, error: GradingError },
}

/// Runs `attempt_fn` until it yields a grade or the attempt budget is spent.
///
/// `max_retries` counts every attempt including the first (0 behaves like 1)
/// and attempts are separated by a flat `retry_delay`. A fatal provider
/// error is returned immediately; any other failure on the last attempt
/// becomes an error-flagged result instead of an `Err`.
pub(crate) async fn call_with_retry<F, Fut>(
    mut attempt_fn: F,
    max_retries: u32,
    retry_delay: Duration,
) -> Result<QuestionGradeResult, ProviderError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<QuestionGradeResult, GradingError>>,
{
    let max_attempts = max_retries.max(1);
    let mut state = RetryState::Attempting(1);

    loop {
        state = match state {
            RetryState::Attempting(attempt) => match attempt_fn(attempt).await {
                Ok(result) => return Ok(result.with_attempts(attempt)),
                Err(GradingError::Provider(err)) if err.is_fatal() => {
                    metrics::counter!("grading_provider_errors_total", "kind" => err.kind.as_str())
                        .increment(1);
                    return Err(err);
                }
                Err(error) => {
                    metrics::counter!("grading_provider_errors_total", "kind" => error.kind_label())
                        .increment(1);
                    if attempt < max_attempts {
                        RetryState::Retrying { attempt, error }
                    } else {
                        RetryState::Exhausted { attempts: attempt, error }
                    }
                }
            },
            RetryState::Retrying { attempt, error } => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    error = %error,
                    "Grading attempt failed, retrying"
                );
                tokio::time::sleep(retry_delay).await;
                RetryState::Attempting(attempt + 1)
            }
            RetryState::Exhausted { attempts, error } => {
                tracing::error!(attempts, error = %error, "Grading attempts exhausted");
                return Ok(QuestionGradeResult::exhausted(attempts, &error.to_string()));
            }
        };
    }
}
