use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::core::config::ProviderKind;

#[derive(Debug, Parser)]
#[command(
    name = "sql-autograder",
    author,
    version,
    about = "Grade SQL exam answers with an LLM and compare against human scores",
    long_about = None
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Grade every submission in a CSV file
    Grade {
        /// Submissions CSV (Student ID, Name, Question 4.x Response/Score columns)
        input: PathBuf,

        /// Results CSV path (default: <output dir>/grading_results.csv)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Only grade the first N students
        #[arg(long)]
        max_students: Option<usize>,

        /// Minimum seconds between LLM calls
        #[arg(long)]
        rate_limit: Option<f64>,

        /// Model name for the selected provider
        #[arg(long)]
        model: Option<String>,

        /// LLM backend to use
        #[arg(long, value_enum)]
        provider: Option<ProviderArg>,
    },
    /// Print and save the overall statistics report
    Stats {
        /// Results CSV produced by `grade`
        results: PathBuf,

        /// Report path (default: <output dir>/statistics_report.txt)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Print and save the per-grader statistics report
    GraderStats {
        /// Results CSV produced by `grade`
        results: PathBuf,

        /// Report path (default: <output dir>/per_grader_statistics.txt)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Render score distributions as text charts
    Visualize {
        /// Results CSV produced by `grade`
        results: PathBuf,

        /// Directory for the chart files (default: <output dir>)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ProviderArg {
    Gemini,
    Ollama,
}

impl From<ProviderArg> for ProviderKind {
    fn from(value: ProviderArg) -> Self {
        match value {
            ProviderArg::Gemini => ProviderKind::Gemini,
            ProviderArg::Ollama => ProviderKind::Ollama,
        }
    }
}
