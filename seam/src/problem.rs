use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tracing::warn;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    Warn,
    Error,
}

/// A structured diagnostic raised while processing a patch. `Warn` problems
/// are reported and processing continues; a single `Error` problem aborts
/// the pipeline before CFG construction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub severity: Severity,
    pub message: String,
    /// Patch line the problem was detected on, when known
    pub line: Option<usize>,
}

impl Display for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.severity {
            Severity::Warn => write!(f, "warning")?,
            Severity::Error => write!(f, "error")?,
        }
        if let Some(line) = self.line {
            write!(f, " at line {line}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Collects [`Problem`]s raised across the pipeline
#[derive(Debug, Default)]
pub struct ProblemSink {
    problems: Vec<Problem>,
}

impl ProblemSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn<T: Into<String>>(&mut self, message: T, line: Option<usize>) {
        let p = Problem {
            severity: Severity::Warn,
            message: message.into(),
            line,
        };
        warn!(problem = %p, "patch problem");
        self.problems.push(p);
    }

    pub fn error<T: Into<String>>(&mut self, message: T, line: Option<usize>) {
        self.problems.push(Problem {
            severity: Severity::Error,
            message: message.into(),
            line,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.problems
            .iter()
            .any(|p| p.severity == Severity::Error)
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn into_problems(self) -> Vec<Problem> {
        self.problems
    }
}
