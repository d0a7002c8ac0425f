//! Output verbosity.

use std::str::FromStr;

/// Output verbosity mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Per-step lines for every transition, including skips.
    Verbose,
    /// Progress bar plus failures and the final summary.
    #[default]
    Normal,
    /// Final summary and errors only.
    Quiet,
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "verbose" => Ok(Self::Verbose),
            "normal" => Ok(Self::Normal),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("unknown output mode: {}", s)),
        }
    }
}

impl OutputMode {
    /// Whether skipped and dispatched steps get their own line.
    pub fn shows_step_detail(&self) -> bool {
        matches!(self, Self::Verbose)
    }

    /// Whether a progress bar is drawn.
    pub fn shows_progress(&self) -> bool {
        matches!(self, Self::Verbose | Self::Normal)
    }

    /// Whether informational messages are printed.
    pub fn shows_status(&self) -> bool {
        !matches!(self, Self::Quiet)
    }
}
