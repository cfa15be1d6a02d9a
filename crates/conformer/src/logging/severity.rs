use super::result::Status;
use std::cmp::Ordering;

/// Severity of a log entry; a case's status is the worst severity it logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogSeverity {
    /// Informational (also debug)
    Pass,
    /// Skip signal
    Skip,
    /// Warning; does not fail the case
    Warn,
    /// An expectation did not hold
    ExpectFailed,
    /// An API validation error was observed
    ValidationFailed,
    /// Unexpected error or panic
    ThrewException,
}

impl LogSeverity {
    /// Position in the total order, `Pass` lowest
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Pass => 0,
            Self::Skip => 1,
            Self::Warn => 2,
            Self::ExpectFailed => 3,
            Self::ValidationFailed => 4,
            Self::ThrewException => 5,
        }
    }

    /// Status reported for a case whose worst severity is this.
    ///
    /// Everything above `Warn` collapses to `Fail`.
    #[must_use]
    pub const fn status(self) -> Status {
        match self {
            Self::Pass => Status::Pass,
            Self::Skip => Status::Skip,
            Self::Warn => Status::Warn,
            Self::ExpectFailed | Self::ValidationFailed | Self::ThrewException => Status::Fail,
        }
    }
}

impl PartialOrd for LogSeverity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogSeverity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}
