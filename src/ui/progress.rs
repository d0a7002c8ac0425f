//! Run progress bar and time formatting.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use super::ProgressHandle;

/// Progress bar over the steps of one subject.
///
/// Lines printed through [`ProgressHandle::println`] appear above the bar
/// so per-step output does not tear it.
pub struct RunProgressBar {
    bar: ProgressBar,
}

impl RunProgressBar {
    /// Create a visible bar for `total` steps.
    pub fn new(label: &str, total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{prefix:.bold} [{bar:24.cyan/dim}] {pos}/{len} {elapsed:>4} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░");
        bar.set_style(style);
        bar.set_prefix(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(200));
        Self { bar }
    }

    /// A bar that draws nothing (quiet mode, non-TTY).
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl ProgressHandle for RunProgressBar {
    fn set_message(&mut self, msg: &str) {
        self.bar.set_message(msg.to_string());
    }

    fn println(&mut self, line: &str) {
        if self.bar.is_hidden() {
            println!("{}", line);
        } else {
            self.bar.println(line);
        }
    }

    fn advance(&mut self) {
        self.bar.inc(1);
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}

/// Format a timestamp as a relative time string (e.g., "2 minutes ago").
pub fn format_relative_time(timestamp: chrono::DateTime<chrono::Utc>) -> String {
    let seconds = chrono::Utc::now()
        .signed_duration_since(timestamp)
        .num_seconds();

    if seconds < 60 {
        return "just now".to_string();
    }

    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {} ago", unit)
        } else {
            format!("{} {}s ago", n, unit)
        }
    };

    let minutes = seconds / 60;
    if minutes < 60 {
        return plural(minutes, "minute");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return plural(hours, "hour");
    }
    let days = hours / 24;
    if days == 1 {
        return "yesterday".to_string();
    }
    if days < 30 {
        return plural(days, "day");
    }
    plural(days / 30, "month")
}

/// Format a duration for display.
///
/// Preprocessing steps range from milliseconds (conform) to hours
/// (recon-all), so hours get their own unit.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", d.as_millis())
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        let total = d.as_secs();
        format!("{}h{:02}m", total / 3600, (total % 3600) / 60)
    }
}
