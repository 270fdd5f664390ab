use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::tempdir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HEADER: &str = "Student ID,Name,\
    Question 4.1 Response,Question 4.1 Score,\
    Question 4.2 Response,Question 4.2 Score,\
    Question 4.3 Response,Question 4.3 Score,\
    Question 4.4 Response,Question 4.4 Score,\
    Question 4.5 Response,Question 4.5 Score";

const SETTINGS_VARS: [&str; 11] = [
    "AUTOGRADER_PROVIDER",
    "AUTOGRADER_RATE_LIMIT_SECONDS",
    "AUTOGRADER_METRICS_FILE",
    "AUTOGRADER_LOG_JSON",
    "GEMINI_API_KEY",
    "GEMINI_MODEL",
    "GEMINI_BASE_URL",
    "OLLAMA_BASE_URL",
    "OLLAMA_MODEL",
    "OLLAMA_MAX_RETRIES",
    "RUST_LOG",
];

fn write_input(dir: &Path) -> std::path::PathBuf {
    let input = dir.join("submissions.csv");
    let body = format!(
        "{HEADER}\n\
         1001,Ada,SELECT COUNT(*) FROM PART WHERE P_SIZE = 1 OR P_SIZE = 4;,8,SELECT DISTINCT p_brand FROM Part,9,q,7,q,10,q,6\n\
         1002,Bob,,0,q,5,q,5,q,5,q,5\n"
    );
    std::fs::write(&input, body).expect("write input");
    input
}

fn autograder(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("sql-autograder");
    cmd.current_dir(dir).env("AUTOGRADER_OUTPUT_DIR", dir.join("output"));
    for var in SETTINGS_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn grade_without_api_key_fails_before_grading() {
    let dir = tempdir().expect("tempdir");
    let input = write_input(dir.path());

    autograder(dir.path())
        .args(["grade", input.to_str().expect("utf8 path"), "--provider", "gemini"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GEMINI_API_KEY"));

    assert!(!dir.path().join("output").join("grading_results.csv").exists());
}

#[test]
fn grade_rejects_input_with_missing_columns() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("broken.csv");
    std::fs::write(&input, "Student ID,Name\n1,Ada\n").expect("write input");

    autograder(dir.path())
        .env("GEMINI_API_KEY", "unused")
        .args(["grade", input.to_str().expect("utf8 path")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required columns"))
        .stderr(predicate::str::contains("Question 4.5 Score"));
}

#[test]
fn unknown_provider_is_rejected_by_cli() {
    let dir = tempdir().expect("tempdir");
    let input = write_input(dir.path());

    autograder(dir.path())
        .args(["grade", input.to_str().expect("utf8 path"), "--provider", "claude"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value 'claude'"));
}

#[test]
fn oversized_rate_limit_is_a_fatal_error() {
    let dir = tempdir().expect("tempdir");
    let input = write_input(dir.path());

    autograder(dir.path())
        .env("GEMINI_API_KEY", "unused")
        .args(["grade", input.to_str().expect("utf8 path"), "--rate-limit", "1e20"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("sql-autograder fatal"))
        .stderr(predicate::str::contains("--rate-limit must be between 0 and 86400 seconds"));
}

#[test]
fn oversized_retry_delay_setting_is_a_fatal_error() {
    let dir = tempdir().expect("tempdir");
    let input = write_input(dir.path());

    autograder(dir.path())
        .env("GEMINI_API_KEY", "unused")
        .env("GEMINI_RETRY_DELAY_SECONDS", "1e20")
        .args(["grade", input.to_str().expect("utf8 path")])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid value for GEMINI_RETRY_DELAY_SECONDS: 1e20"));
}

fn gemini_reply(text: &str) -> serde_json::Value {
    json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_failure_mid_run_saves_completed_students() {
    let server = MockServer::start().await;
    let generate = "/models/gemini-2.5-flash:generateContent";
    Mock::given(method("POST"))
        .and(path(generate))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(gemini_reply(r#"{"score": 8, "feedback": "Mostly correct"}"#)),
        )
        .up_to_n_times(5)
        .with_priority(1)
        .expect(5)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(generate))
        .respond_with(ResponseTemplate::new(401).set_body_string("API key revoked"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().expect("tempdir");
    let input = write_input(dir.path());
    let output = dir.path().join("graded.csv");

    let (dir_path, input_arg, output_arg, base_url) = (
        dir.path().to_path_buf(),
        input.to_string_lossy().to_string(),
        output.to_string_lossy().to_string(),
        server.uri(),
    );
    let assert = tokio::task::spawn_blocking(move || {
        autograder(&dir_path)
            .env("GEMINI_API_KEY", "test-key")
            .env("GEMINI_BASE_URL", base_url)
            .args([
                "grade",
                &input_arg,
                "--provider",
                "gemini",
                "--rate-limit",
                "0",
                "--output",
                &output_arg,
            ])
            .assert()
    })
    .await
    .expect("join");

    assert
        .code(1)
        .stdout(predicate::str::contains("Students graded: 1"))
        .stderr(predicate::str::contains(
            "Grading aborted; results for 1 completed student(s) were saved",
        ))
        .stderr(predicate::str::contains("auth_failure error"));

    let results = std::fs::read_to_string(&output).expect("results file");
    let rows: Vec<&str> = results.lines().collect();
    assert_eq!(rows.len(), 2, "header plus one student: {results}");
    assert!(rows[1].starts_with("1001,Ada,"));
}

#[tokio::test(flavor = "multi_thread")]
async fn grade_against_local_server_writes_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "<think>compare with rubric</think>{\"score\": 8, \"feedback\": \"Mostly correct\"}",
            "done": true
        })))
        .expect(10)
        .mount(&server)
        .await;

    let dir = tempdir().expect("tempdir");
    let input = write_input(dir.path());
    let output = dir.path().join("results").join("graded.csv");
    let metrics = dir.path().join("metrics.prom");
    let base_url = server.uri();

    let (dir_path, input_arg, output_arg, metrics_path) = (
        dir.path().to_path_buf(),
        input.to_string_lossy().to_string(),
        output.to_string_lossy().to_string(),
        metrics.clone(),
    );
    let assert = tokio::task::spawn_blocking(move || {
        autograder(&dir_path)
            .env("OLLAMA_BASE_URL", base_url)
            .env("AUTOGRADER_METRICS_FILE", metrics_path)
            .args([
                "grade",
                &input_arg,
                "--provider",
                "ollama",
                "--rate-limit",
                "0",
                "--output",
                &output_arg,
            ])
            .assert()
    })
    .await
    .expect("join");

    assert
        .success()
        .stdout(predicate::str::contains("Students graded: 2"))
        .stdout(predicate::str::contains("Without grading errors: 2"))
        .stdout(predicate::str::contains("1001 (Ada): LLM 40.0/50, Grader 40.0/50, Diff +0.0"))
        .stdout(predicate::str::contains("1002 (Bob): LLM 40.0/50, Grader 20.0/50, Diff +20.0"));

    let results = std::fs::read_to_string(&output).expect("results file");
    let mut lines = results.lines();
    let columns = lines.next().expect("header");
    assert!(columns.starts_with("student_id,student_name,q4_1_query,q4_1_grader_score"));
    assert!(columns
        .ends_with("total_llm_score,total_grader_score,total_score_difference,needs_review"));
    assert_eq!(lines.count(), 2);
    assert!(results.contains("[NO ANSWER PROVIDED]"));
    assert!(results.contains("Mostly correct"));

    let snapshot = std::fs::read_to_string(&metrics).expect("metrics file");
    assert!(snapshot.contains("grading_questions_total"));
}
