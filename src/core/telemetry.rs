use std::io::IsTerminal;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

/// Logs go to stderr so that reports printed on stdout stay clean.
///
/// `grade_question` spans are closed with a timing event at debug level, which
/// gives per-question latency without extra instrumentation.
pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let telemetry = settings.telemetry();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(telemetry.log_level.as_str()));
    let span_events =
        if telemetry.log_level.contains("debug") || telemetry.log_level.contains("trace") {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(span_events)
        .with_writer(std::io::stderr);

    let installed = if telemetry.json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.with_ansi(std::io::stderr().is_terminal()).try_init()
    };
    installed.map_err(|err| anyhow::anyhow!("failed to install log subscriber: {err}"))
}
