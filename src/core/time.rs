use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

pub(crate) fn format_rfc3339(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
}

/// Wall-clock start of a grading run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunClock {
    started_at: OffsetDateTime,
}

impl RunClock {
    pub(crate) fn start() -> Self {
        Self { started_at: OffsetDateTime::now_utc() }
    }

    pub(crate) fn started_at(&self) -> String {
        format_rfc3339(self.started_at)
    }

    /// One-line description of the run window, e.g.
    /// `2025-01-02T10:20:30Z -> 2025-01-02T10:21:35Z (1m 05s)`.
    pub(crate) fn describe_until_now(&self) -> String {
        let finished_at = OffsetDateTime::now_utc();
        format!(
            "{} -> {} ({})",
            self.started_at(),
            format_rfc3339(finished_at),
            format_elapsed(finished_at - self.started_at)
        )
    }
}

pub(crate) fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.whole_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, total % 3600 / 60, total % 60);
    match (hours, minutes) {
        (0, 0) => format!("{:.1}s", elapsed.as_seconds_f64().max(0.0)),
        (0, _) => format!("{minutes}m {seconds:02}s"),
        _ => format!("{hours}h {minutes:02}m {seconds:02}s"),
    }
}
