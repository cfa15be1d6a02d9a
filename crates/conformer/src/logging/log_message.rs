use crate::result::TestError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One recorded log line with its (possibly hidden) stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessageWithStack {
    /// Severity label, e.g. `EXCEPTION`
    pub name: String,
    /// Error message
    pub message: String,
    /// Captured stack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Whether the stack is elided when rendered
    #[serde(default)]
    pub stack_hidden: bool,
    /// How many times an identical stack was logged
    pub times_seen: u32,
}

impl LogMessageWithStack {
    /// Wrap an error under a severity label
    #[must_use]
    pub fn new(name: impl Into<String>, error: TestError) -> Self {
        Self {
            name: name.into(),
            message: error.message().to_string(),
            stack: error.stack().map(str::to_string),
            stack_hidden: false,
            times_seen: 1,
        }
    }

    /// Elide the stack when rendered
    pub fn set_stack_hidden(&mut self) {
        self.stack_hidden = true;
    }

    /// Count one more occurrence of the same stack
    pub fn increment_times_seen(&mut self) {
        self.times_seen += 1;
    }
}

impl fmt::Display for LogMessageWithStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(stack) = &self.stack {
            if self.stack_hidden {
                f.write_str("\n    at (elided)")?;
            } else {
                // The first line of a stack repeats the message
                for line in stack.lines().skip(1) {
                    write!(f, "\n{line}")?;
                }
            }
        }
        if self.times_seen > 1 {
            write!(f, "\n(seen {} times with identical stack)", self.times_seen)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_stack() {
        let msg = LogMessageWithStack::new("EXCEPTION", TestError::new("boom"));
        let text = msg.to_string();
        assert!(text.starts_with("EXCEPTION: boom\n    at "));
        assert!(text.contains("log_message.rs"));
    }

    #[test]
    fn test_display_hidden_and_seen() {
        let mut msg = LogMessageWithStack::new("WARN", TestError::new("w"));
        msg.set_stack_hidden();
        msg.increment_times_seen();
        assert_eq!(
            msg.to_string(),
            "WARN: w\n    at (elided)\n(seen 2 times with identical stack)"
        );
    }

    #[test]
    fn test_display_without_stack() {
        let msg = LogMessageWithStack::new("INFO", TestError::without_stack("note"));
        assert_eq!(msg.to_string(), "INFO: note");
    }
}
