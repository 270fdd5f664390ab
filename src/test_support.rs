use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

use async_trait::async_trait;

use crate::schemas::grading::{
    GradingConfig, QuestionAnswer, QuestionGradeResult, StudentGradingResult, SubmissionRow,
};
use crate::schemas::results::ResultRecord;
use crate::services::provider::{GradingProvider, ProviderError};

const ENV_PREFIXES: [&str; 3] = ["AUTOGRADER_", "GEMINI_", "OLLAMA_"];

/// Serializes tests that touch process environment variables.
pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears every setting the crate reads so defaults apply.
pub(crate) fn set_test_env() {
    let keys: Vec<String> = std::env::vars()
        .map(|(key, _)| key)
        .filter(|key| ENV_PREFIXES.iter().any(|prefix| key.starts_with(prefix)))
        .collect();
    for key in keys {
        std::env::remove_var(key);
    }
}

pub(crate) fn submission(
    config: &GradingConfig,
    student_id: &str,
    scores: [f64; 5],
) -> SubmissionRow {
    let answers = config
        .questions()
        .iter()
        .zip(scores)
        .map(|(question, human_score)| QuestionAnswer {
            question_id: question.id.clone(),
            sql_text: format!("SELECT answer_{} FROM part;", question.column_prefix()),
            human_score,
        })
        .collect();

    SubmissionRow {
        student_id: student_id.to_string(),
        student_name: format!("Student {student_id}"),
        answers,
    }
}

pub(crate) fn result_record(
    config: &GradingConfig,
    student_id: &str,
    human: [f64; 5],
    llm: [f64; 5],
) -> ResultRecord {
    let grades =
        llm.iter().map(|score| QuestionGradeResult::graded(*score, "ok".to_string())).collect();
    let row = submission(config, student_id, human);
    ResultRecord::from_result(&StudentGradingResult::finalize(&row, grades))
}

pub(crate) fn failed_record(
    config: &GradingConfig,
    student_id: &str,
    human: [f64; 5],
) -> ResultRecord {
    let grades = vec![QuestionGradeResult::exhausted(3, "timeout error: no response"); 5];
    let row = submission(config, student_id, human);
    ResultRecord::from_result(&StudentGradingResult::finalize(&row, grades))
}

type Responder = Box<dyn Fn(usize, &str) -> Result<String, ProviderError> + Send + Sync>;

/// Scripted provider: answers each call from a closure that sees the
/// 1-based call number and the prompt.
pub(crate) struct StubProvider {
    respond: Responder,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl StubProvider {
    pub(crate) fn new<F>(respond: F) -> Self
    where
        F: Fn(&str) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self::scripted(move |_, prompt| respond(prompt))
    }

    pub(crate) fn scripted<F>(respond: F) -> Self
    where
        F: Fn(usize, &str) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn always(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Succeeds for the first `successes` calls, then fails every call.
    pub(crate) fn failing_after<E>(successes: usize, text: &str, error: E) -> Self
    where
        E: Fn() -> ProviderError + Send + Sync + 'static,
    {
        let text = text.to_string();
        Self::scripted(
            move |call, _| if call <= successes { Ok(text.clone()) } else { Err(error()) },
        )
    }

    /// Fails the first `failures` calls, then succeeds.
    pub(crate) fn failing_first<E>(failures: usize, text: &str, error: E) -> Self
    where
        E: Fn() -> ProviderError + Send + Sync + 'static,
    {
        let text = text.to_string();
        Self::scripted(
            move |call, _| if call <= failures { Err(error()) } else { Ok(text.clone()) },
        )
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|prompts| prompts.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GradingProvider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-model"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        (self.respond)(call, prompt)
    }
}
