use std::fmt::Write as _;

use crate::schemas::grading::GradingConfig;
use crate::schemas::results::ResultRecord;
use crate::services::statistics::{grader_for_index, grader_label, valid_records, Spread};

const BIN_WIDTH: f64 = 5.0;
const BAR_WIDTH: usize = 40;

/// Counts of total scores over fixed-width bins from 0 to the exam maximum.
/// The last bin is closed so a perfect score lands in it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Histogram {
    pub(crate) edges: Vec<f64>,
    pub(crate) counts: Vec<usize>,
    pub(crate) spread: Spread,
    pub(crate) samples: usize,
}

impl Histogram {
    pub(crate) fn build(values: &[f64], max_score: f64) -> Self {
        let bins = (max_score / BIN_WIDTH).ceil().max(1.0) as usize;
        let edges: Vec<f64> = (0..=bins).map(|index| index as f64 * BIN_WIDTH).collect();
        let mut counts = vec![0; bins];

        for value in values.iter().filter(|value| value.is_finite()) {
            let index = (value.max(0.0) / BIN_WIDTH).floor() as usize;
            counts[index.min(bins - 1)] += 1;
        }

        Self { edges, counts, spread: Spread::of(values), samples: values.len() }
    }

    fn render(&self, title: &str, out: &mut String) {
        let _ = writeln!(
            out,
            "{title} (N={}, mean={:.1}, std={:.1})",
            self.samples, self.spread.mean, self.spread.std
        );
        let peak = self.counts.iter().copied().max().unwrap_or(0);

        for (index, count) in self.counts.iter().enumerate() {
            let low = self.edges[index];
            let high = self.edges[index + 1];
            let close = if index + 1 == self.counts.len() { ']' } else { ')' };
            let bar = if peak == 0 { 0 } else { (count * BAR_WIDTH).div_ceil(peak) };
            let _ = writeln!(
                out,
                "  [{low:>4.0}, {high:>4.0}{close} | {:<width$} {count}",
                "#".repeat(bar),
                width = BAR_WIDTH
            );
        }
        let _ = writeln!(out);
    }
}

/// Human and LLM histograms for one group of students.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DistributionPair {
    pub(crate) label: String,
    pub(crate) human: Histogram,
    pub(crate) llm: Histogram,
}

impl DistributionPair {
    fn from_records(label: String, records: &[&ResultRecord], max_score: f64) -> Self {
        let human: Vec<f64> = records.iter().map(|record| record.total_grader_score).collect();
        let llm: Vec<f64> = records.iter().map(|record| record.total_llm_score).collect();
        Self {
            label,
            human: Histogram::build(&human, max_score),
            llm: Histogram::build(&llm, max_score),
        }
    }

    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "{}\n{}", self.label, "-".repeat(80));
        self.human.render("Human grader", out);
        self.llm.render("LLM", out);
    }
}

pub(crate) fn overall(records: &[ResultRecord], config: &GradingConfig) -> DistributionPair {
    let valid: Vec<&ResultRecord> =
        valid_records(records).into_iter().map(|(_, record)| record).collect();
    DistributionPair::from_records(
        "Overall total scores".to_string(),
        &valid,
        config.total_points(),
    )
}

pub(crate) fn per_grader(
    records: &[ResultRecord],
    config: &GradingConfig,
) -> Vec<DistributionPair> {
    let valid = valid_records(records);
    let mut groups: Vec<(usize, Vec<&ResultRecord>)> = Vec::new();

    for (index, record) in valid {
        let grader = grader_for_index(index);
        match groups.iter_mut().find(|(existing, _)| *existing == grader) {
            Some((_, members)) => members.push(record),
            None => groups.push((grader, vec![record])),
        }
    }
    groups.sort_by_key(|(grader, _)| *grader);

    groups
        .into_iter()
        .map(|(grader, members)| {
            DistributionPair::from_records(
                format!("Grader {}", grader_label(grader)),
                &members,
                config.total_points(),
            )
        })
        .collect()
}

pub(crate) fn render_overall(records: &[ResultRecord], config: &GradingConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "TOTAL SCORE DISTRIBUTION (Out of {})\n", config.total_points());
    overall(records, config).render(&mut out);
    out
}

pub(crate) fn render_per_grader(records: &[ResultRecord], config: &GradingConfig) -> String {
    let mut out = String::new();
    let _ =
        writeln!(out, "TOTAL SCORE DISTRIBUTION BY GRADER (Out of {})\n", config.total_points());
    for pair in per_grader(records, config) {
        pair.render(&mut out);
    }
    out
}
