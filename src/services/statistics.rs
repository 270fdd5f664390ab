use std::fmt::Write as _;

use crate::schemas::grading::GradingConfig;
use crate::schemas::results::{QuestionRecord, ResultRecord};

/// Totals within this distance count as agreement.
const TOTAL_AGREEMENT: f64 = 0.5;
/// Per-question differences up to this value count as agreement.
const QUESTION_AGREEMENT: f64 = 0.1;
const EPSILON: f64 = 1e-9;

/// Rows are split between human graders in consecutive blocks; the last
/// grader takes every remaining row.
const GRADER_BLOCK: usize = 55;
const GRADER_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Spread {
    pub(crate) mean: f64,
    pub(crate) std: f64,
}

impl Spread {
    pub(crate) fn of(values: &[f64]) -> Self {
        Self { mean: mean(values), std: sample_std(values) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SummaryStats {
    pub(crate) total_students: usize,
    pub(crate) valid_students: usize,
    pub(crate) human: Spread,
    pub(crate) llm: Spread,
    pub(crate) mean_difference: f64,
    pub(crate) overall_agreement: f64,
    pub(crate) question_agreement: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QuestionStats {
    pub(crate) question_id: String,
    pub(crate) students: usize,
    pub(crate) llm: Spread,
    pub(crate) human: Spread,
    pub(crate) mean_difference: f64,
    pub(crate) agreement_rate: f64,
    pub(crate) llm_higher: usize,
    pub(crate) llm_lower: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GraderStats {
    pub(crate) grader: String,
    pub(crate) students: usize,
    pub(crate) human: Spread,
    pub(crate) llm: Spread,
    pub(crate) mean_difference: f64,
    pub(crate) questions: Vec<QuestionStats>,
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1); 0.0 for fewer than two values.
pub(crate) fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean(values);
    let variance =
        values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Grader label (`G1`..`G6`) for a 0-based row index of the results file.
pub(crate) fn grader_for_index(index: usize) -> usize {
    (index / GRADER_BLOCK).min(GRADER_COUNT - 1) + 1
}

pub(crate) fn grader_label(grader: usize) -> String {
    format!("G{grader}")
}

fn grader_range(grader: usize) -> String {
    let first = (grader - 1) * GRADER_BLOCK + 1;
    if grader == GRADER_COUNT {
        format!("Students {first}+")
    } else {
        format!("Students {first}-{}", first + GRADER_BLOCK - 1)
    }
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 / total as f64 * 100.0
}

fn question_agrees(difference: f64) -> bool {
    difference.abs() <= QUESTION_AGREEMENT + EPSILON
}

/// Records paired with their original row index, keeping only fully graded
/// students.
pub(crate) fn valid_records(records: &[ResultRecord]) -> Vec<(usize, &ResultRecord)> {
    records.iter().enumerate().filter(|(_, record)| record.is_valid()).collect()
}

pub(crate) fn summarize(records: &[ResultRecord], config: &GradingConfig) -> SummaryStats {
    let valid: Vec<&ResultRecord> =
        valid_records(records).into_iter().map(|(_, record)| record).collect();

    let human: Vec<f64> = valid.iter().map(|record| record.total_grader_score).collect();
    let llm: Vec<f64> = valid.iter().map(|record| record.total_llm_score).collect();
    let differences: Vec<f64> = valid.iter().map(|record| record.total_score_difference).collect();
    let agreeing = differences.iter().filter(|diff| diff.abs() < TOTAL_AGREEMENT).count();

    let question_agreement = config
        .questions()
        .iter()
        .map(|question| {
            let agreeing = valid
                .iter()
                .filter_map(|record| record.question(&question.id))
                .filter(|outcome| question_agrees(outcome.score_difference))
                .count();
            (question.id.clone(), percent(agreeing, valid.len()))
        })
        .collect();

    SummaryStats {
        total_students: records.len(),
        valid_students: valid.len(),
        human: Spread::of(&human),
        llm: Spread::of(&llm),
        mean_difference: mean(&differences),
        overall_agreement: percent(agreeing, valid.len()),
        question_agreement,
    }
}

fn question_stats(question_id: &str, records: &[&ResultRecord]) -> QuestionStats {
    let outcomes: Vec<&QuestionRecord> =
        records.iter().filter_map(|record| record.question(question_id)).collect();

    let llm: Vec<f64> = outcomes.iter().map(|outcome| outcome.llm_score).collect();
    let human: Vec<f64> = outcomes.iter().map(|outcome| outcome.grader_score).collect();
    let differences: Vec<f64> = outcomes.iter().map(|outcome| outcome.score_difference).collect();

    let agreeing = differences.iter().filter(|diff| question_agrees(**diff)).count();
    let llm_higher =
        differences.iter().filter(|diff| **diff > QUESTION_AGREEMENT + EPSILON).count();
    let llm_lower =
        differences.iter().filter(|diff| **diff < -(QUESTION_AGREEMENT + EPSILON)).count();

    QuestionStats {
        question_id: question_id.to_string(),
        students: records.len(),
        llm: Spread::of(&llm),
        human: Spread::of(&human),
        mean_difference: mean(&differences),
        agreement_rate: percent(agreeing, records.len()),
        llm_higher,
        llm_lower,
    }
}

pub(crate) fn per_question(records: &[ResultRecord], config: &GradingConfig) -> Vec<QuestionStats> {
    let valid: Vec<&ResultRecord> =
        valid_records(records).into_iter().map(|(_, record)| record).collect();
    config.questions().iter().map(|question| question_stats(&question.id, &valid)).collect()
}

/// Graders with no valid students are omitted.
pub(crate) fn per_grader(records: &[ResultRecord], config: &GradingConfig) -> Vec<GraderStats> {
    let valid = valid_records(records);

    (1..=GRADER_COUNT)
        .filter_map(|grader| {
            let assigned: Vec<&ResultRecord> = valid
                .iter()
                .filter(|(index, _)| grader_for_index(*index) == grader)
                .map(|(_, record)| *record)
                .collect();
            if assigned.is_empty() {
                return None;
            }

            let human: Vec<f64> = assigned.iter().map(|record| record.total_grader_score).collect();
            let llm: Vec<f64> = assigned.iter().map(|record| record.total_llm_score).collect();
            let differences: Vec<f64> =
                assigned.iter().map(|record| record.total_score_difference).collect();

            Some(GraderStats {
                grader: grader_label(grader),
                students: assigned.len(),
                human: Spread::of(&human),
                llm: Spread::of(&llm),
                mean_difference: mean(&differences),
                questions: config
                    .questions()
                    .iter()
                    .map(|question| question_stats(&question.id, &assigned))
                    .collect(),
            })
        })
        .collect()
}

fn banner(out: &mut String, title: &str) {
    let rule = "=".repeat(80);
    let _ = writeln!(out, "{rule}\n{title}\n{rule}\n");
}

pub(crate) fn render_report(records: &[ResultRecord], config: &GradingConfig) -> String {
    let summary = summarize(records, config);
    let mut out = String::new();

    banner(&mut out, "SQL AUTOGRADING STATISTICS REPORT");
    let _ = writeln!(out, "SUMMARY\n{}", "-".repeat(80));
    let _ = writeln!(out, "Total students: {}", summary.total_students);
    let _ = writeln!(out, "Valid comparisons: {}", summary.valid_students);
    let _ = writeln!(out, "Human average: {:.1}±{:.1}", summary.human.mean, summary.human.std);
    let _ = writeln!(out, "LLM average: {:.1}±{:.1}", summary.llm.mean, summary.llm.std);
    let _ = writeln!(out, "Average difference: {:.1}", summary.mean_difference);
    let _ = writeln!(out, "Overall agreement: {:.1}%", summary.overall_agreement);
    let _ = writeln!(out);
    let _ = writeln!(out, "Question-level agreement:");
    for (question_id, rate) in &summary.question_agreement {
        let _ = writeln!(out, "  Q{question_id}: {rate:.1}%");
    }
    let _ = writeln!(out);

    banner(&mut out, "PER-QUESTION STATISTICS");
    for (stats, question) in per_question(records, config).iter().zip(config.questions()) {
        let _ = writeln!(out, "QUESTION {} (Out of {})", stats.question_id, question.max_score);
        let _ = writeln!(out, "{}", "-".repeat(80));
        let _ = writeln!(out, "Average LLM score: {:.1}±{:.1}", stats.llm.mean, stats.llm.std);
        let _ =
            writeln!(out, "Average Human score: {:.1}±{:.1}", stats.human.mean, stats.human.std);
        let _ = writeln!(out, "Average difference: {:.1}", stats.mean_difference);
        let _ = writeln!(out, "Agreement rate: {:.1}%", stats.agreement_rate);
        let _ = writeln!(
            out,
            "LLM scored higher: {} ({:.1}%)",
            stats.llm_higher,
            percent(stats.llm_higher, stats.students)
        );
        let _ = writeln!(
            out,
            "LLM scored lower: {} ({:.1}%)",
            stats.llm_lower,
            percent(stats.llm_lower, stats.students)
        );
        let _ = writeln!(out);
    }

    out
}

pub(crate) fn render_grader_report(records: &[ResultRecord], config: &GradingConfig) -> String {
    let graders = per_grader(records, config);
    let mut out = String::new();

    banner(&mut out, "PER-GRADER STATISTICS REPORT");
    let _ = writeln!(out, "Grader Assignments:");
    for grader in 1..=GRADER_COUNT {
        let _ = writeln!(out, "  {}: {}", grader_label(grader), grader_range(grader));
    }
    let _ = writeln!(out);

    banner(&mut out, &format!("TOTAL SCORES (Out of {})", config.total_points()));
    let _ = writeln!(out, "Grader | #Students | Human: avg±std | LLM: avg±std   | Avg Diff");
    let _ = writeln!(out, "{}", "-".repeat(80));
    for stats in &graders {
        let _ = writeln!(
            out,
            "{:>6} | {:>9} | {:>5.1}±{:>4.1}   | {:>5.1}±{:>4.1}   | {:>+8.1}",
            stats.grader,
            stats.students,
            stats.human.mean,
            stats.human.std,
            stats.llm.mean,
            stats.llm.std,
            stats.mean_difference
        );
    }
    let _ = writeln!(out);

    for (position, question) in config.questions().iter().enumerate() {
        banner(&mut out, &format!("QUESTION {} (Out of {})", question.id, question.max_score));
        let _ =
            writeln!(out, "Grader |  N  | Human: avg±std | LLM: avg±std | Avg Diff | Agreement");
        let _ = writeln!(out, "{}", "-".repeat(80));
        for stats in &graders {
            let Some(q) = stats.questions.get(position) else {
                continue;
            };
            let _ = writeln!(
                out,
                "{:>6} | {:>3} | {:>4.1}±{:>3.1}     | {:>4.1}±{:>3.1}    | {:>+8.1} | {:>8.1}%",
                stats.grader,
                stats.students,
                q.human.mean,
                q.human.std,
                q.llm.mean,
                q.llm.std,
                q.mean_difference,
                q.agreement_rate
            );
        }
        let _ = writeln!(out);
    }

    out
}
