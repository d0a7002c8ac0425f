//! Visual theme and styling.

use console::Style;

use crate::state::StepStatus;

/// Terminal styles for run output.
#[derive(Debug, Clone)]
pub struct AnatprepTheme {
    /// Success messages and done steps (green).
    pub success: Style,
    /// Warnings (orange).
    pub warning: Style,
    /// Errors and failed steps (red bold).
    pub error: Style,
    /// Running steps (cyan).
    pub info: Style,
    /// Secondary text.
    pub dim: Style,
    /// Important text (bold).
    pub highlight: Style,
    /// Headers (cyan bold).
    pub header: Style,
    /// Durations and timestamps (dim).
    pub duration: Style,
    /// Keys in key-value listings (bold).
    pub key: Style,
    /// Blocked steps (orange).
    pub blocked: Style,
}

impl Default for AnatprepTheme {
    fn default() -> Self {
        Self::new()
    }
}

impl AnatprepTheme {
    /// The colored theme.
    pub fn new() -> Self {
        Self {
            success: Style::new().green(),
            warning: Style::new().color256(208),
            error: Style::new().red().bold(),
            info: Style::new().cyan(),
            dim: Style::new().dim(),
            highlight: Style::new().bold(),
            header: Style::new().bold().cyan(),
            duration: Style::new().dim(),
            key: Style::new().bold(),
            blocked: Style::new().color256(208),
        }
    }

    /// A theme without colors (for non-TTY or --no-color).
    pub fn plain() -> Self {
        Self {
            success: Style::new(),
            warning: Style::new(),
            error: Style::new(),
            info: Style::new(),
            dim: Style::new(),
            highlight: Style::new(),
            header: Style::new(),
            duration: Style::new(),
            key: Style::new(),
            blocked: Style::new(),
        }
    }

    /// The theme matching the current terminal.
    pub fn detect() -> Self {
        if should_use_colors() {
            Self::new()
        } else {
            Self::plain()
        }
    }

    pub fn format_success(&self, msg: &str) -> String {
        format!("{}", self.success.apply_to(format!("✓ {}", msg)))
    }

    pub fn format_warning(&self, msg: &str) -> String {
        format!("{}", self.warning.apply_to(format!("⚠ {}", msg)))
    }

    pub fn format_error(&self, msg: &str) -> String {
        format!("{}", self.error.apply_to(format!("✗ {}", msg)))
    }

    /// Format a header banner.
    pub fn format_header(&self, title: &str) -> String {
        format!(
            "{} {}",
            self.header.apply_to("◆"),
            self.highlight.apply_to(title)
        )
    }

    /// Icon for a step status.
    pub fn status_icon(status: StepStatus) -> &'static str {
        match status {
            StepStatus::Pending => "·",
            StepStatus::Ready => "◇",
            StepStatus::Running => "▶",
            StepStatus::Done => "✓",
            StepStatus::Skipped => "○",
            StepStatus::Failed => "✗",
            StepStatus::Blocked => "⊘",
        }
    }

    /// Styled `<icon> <status>` label.
    pub fn format_status(&self, status: StepStatus) -> String {
        let label = format!("{} {}", Self::status_icon(status), status);
        let style = match status {
            StepStatus::Done => &self.success,
            StepStatus::Skipped | StepStatus::Pending => &self.dim,
            StepStatus::Ready | StepStatus::Running => &self.info,
            StepStatus::Failed => &self.error,
            StepStatus::Blocked => &self.blocked,
        };
        format!("{}", style.apply_to(label))
    }

    /// Styled line for a step that reached `status`.
    pub fn format_step_line(&self, step: &str, status: StepStatus, detail: &str) -> String {
        if detail.is_empty() {
            format!("{} {}", self.format_status(status), step)
        } else {
            format!(
                "{} {} {}",
                self.format_status(status),
                step,
                self.dim.apply_to(detail)
            )
        }
    }
}

/// Check if colors should be enabled.
pub fn should_use_colors() -> bool {
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    console::Term::stdout().is_term()
}
