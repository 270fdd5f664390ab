use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::cli::Commands;
use crate::core::config::{is_valid_delay, Settings, MAX_DELAY_SECONDS};
use crate::core::{metrics, shutdown, time};
use crate::schemas::grading::{GradingConfig, StudentGradingResult};
use crate::services::{distribution, provider, results, statistics, submission_loader};
use crate::tasks::grading::{self, GradingAborted};

const RESULTS_FILE: &str = "grading_results.csv";
const STATISTICS_FILE: &str = "statistics_report.txt";
const GRADER_STATISTICS_FILE: &str = "per_grader_statistics.txt";
const OVERALL_DISTRIBUTION_FILE: &str = "overall_distribution.txt";
const GRADER_DISTRIBUTION_FILE: &str = "per_grader_distributions.txt";

pub(crate) async fn dispatch(command: Commands, settings: Settings) -> Result<()> {
    let config = GradingConfig::sql_exam();
    match command {
        Commands::Grade { input, output, max_students, rate_limit, model, provider } => {
            let mut settings = settings;
            if let Some(provider) = provider {
                settings = settings.with_provider(provider.into());
            }
            if let Some(model) = model {
                settings = settings.with_model(&model);
            }
            let request = GradeRequest { input, output, max_students, rate_limit };
            grade(&settings, &config, request).await
        }
        Commands::Stats { results, output } => {
            let path = output.unwrap_or_else(|| default_path(&settings, STATISTICS_FILE));
            report(&results, &path, &config, statistics::render_report)
        }
        Commands::GraderStats { results, output } => {
            let path = output.unwrap_or_else(|| default_path(&settings, GRADER_STATISTICS_FILE));
            report(&results, &path, &config, statistics::render_grader_report)
        }
        Commands::Visualize { results, output_dir } => {
            let dir = output_dir.unwrap_or_else(|| PathBuf::from(&settings.run().output_dir));
            visualize(&results, &dir, &config)
        }
    }
}

struct GradeRequest {
    input: PathBuf,
    output: Option<PathBuf>,
    max_students: Option<usize>,
    rate_limit: Option<f64>,
}

async fn grade(settings: &Settings, config: &GradingConfig, request: GradeRequest) -> Result<()> {
    let rate_limit =
        rate_limit_interval(request.rate_limit.unwrap_or(settings.run().rate_limit_seconds))?;
    let output = request.output.unwrap_or_else(|| default_path(settings, RESULTS_FILE));

    let submissions = submission_loader::load_submissions(&request.input, config)
        .with_context(|| format!("Failed to load submissions from {}", request.input.display()))?;

    let provider = provider::build_provider(settings).context("Failed to configure provider")?;
    provider.ensure_ready().await.context("Provider is not ready")?;

    let clock = time::RunClock::start();
    tracing::info!(
        input = %request.input.display(),
        output = %output.display(),
        provider = settings.provider().as_str(),
        model = settings.model(),
        started_at = %clock.started_at(),
        "Grading run configured"
    );

    let run = grading::grade(
        &submissions,
        config,
        provider.as_ref(),
        request.max_students,
        rate_limit,
        settings.retry_policy(),
    );

    let outcome = tokio::select! {
        outcome = run => outcome,
        signal = shutdown::interrupt_signal() => {
            bail!("grading interrupted by {signal}; no results were written");
        }
    };

    let (graded, aborted) = match outcome {
        Ok(graded) => (graded, None),
        Err(GradingAborted { source, completed }) => (completed, Some(source)),
    };

    results::write_results(&output, config, &graded)
        .with_context(|| format!("Failed to write results to {}", output.display()))?;
    print!("{}", render_grading_summary(&graded, config));
    println!("Run window: {}", clock.describe_until_now());
    println!("Results saved to {}", output.display());

    if let Some(path) = &settings.telemetry().metrics_file {
        metrics::write_snapshot(Path::new(path))?;
    }

    match aborted {
        None => Ok(()),
        Some(source) => Err(anyhow!(source)).context(format!(
            "Grading aborted; results for {} completed student(s) were saved",
            graded.len()
        )),
    }
}

fn report(
    results_path: &Path,
    output: &Path,
    config: &GradingConfig,
    render: fn(&[crate::schemas::results::ResultRecord], &GradingConfig) -> String,
) -> Result<()> {
    let records = results::read_results(results_path, config)?;
    let text = render(&records, config);
    print!("{text}");
    write_text(output, &text)?;
    println!("Report saved to {}", output.display());
    Ok(())
}

fn visualize(results_path: &Path, dir: &Path, config: &GradingConfig) -> Result<()> {
    let records = results::read_results(results_path, config)?;

    let overall = dir.join(OVERALL_DISTRIBUTION_FILE);
    write_text(&overall, &distribution::render_overall(&records, config))?;
    println!("Overall distribution saved to {}", overall.display());

    let per_grader = dir.join(GRADER_DISTRIBUTION_FILE);
    write_text(&per_grader, &distribution::render_per_grader(&records, config))?;
    println!("Per-grader distributions saved to {}", per_grader.display());
    Ok(())
}

fn rate_limit_interval(seconds: f64) -> Result<Duration> {
    if !is_valid_delay(seconds) {
        bail!("--rate-limit must be between 0 and {MAX_DELAY_SECONDS} seconds, got {seconds}");
    }
    Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("--rate-limit {seconds} is not a valid duration"))
}

fn default_path(settings: &Settings, file_name: &str) -> PathBuf {
    Path::new(&settings.run().output_dir).join(file_name)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "Report written");
    Ok(())
}

pub(crate) fn render_grading_summary(
    results: &[StudentGradingResult],
    config: &GradingConfig,
) -> String {
    let total_points = config.total_points();
    let with_errors = results.iter().filter(|result| result.has_errors()).count();
    let flagged = results.iter().filter(|result| result.needs_review).count();

    let mut out = String::new();
    let rule = "=".repeat(80);
    let _ = writeln!(out, "{rule}\nGRADING SUMMARY\n{rule}");
    let _ = writeln!(out, "Students graded: {}", results.len());
    let _ = writeln!(out, "Without grading errors: {}", results.len() - with_errors);
    let _ = writeln!(out, "With grading errors: {with_errors}");
    let _ = writeln!(out, "Flagged for review: {flagged}");
    let _ = writeln!(out);

    for result in results {
        let marker = if result.needs_review { " [REVIEW]" } else { "" };
        let _ = writeln!(
            out,
            "  {} ({}): LLM {:.1}/{total_points}, Grader {:.1}/{total_points}, Diff {:+.1}{marker}",
            result.student_id,
            result.student_name,
            result.total_llm_score,
            result.total_human_score,
            result.total_difference()
        );
    }
    out
}
