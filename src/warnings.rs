use std::fmt;

use log::warn;

/// Position of a statement in the upstream source, reported by the tokenizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

impl SourcePosition {
    pub fn new(line: u32, column: u32) -> Self {
        Self {
            line,
            column,
        }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub pos: SourcePosition,
    pub message: String,
}

/// Append-only log of recoverable conditions, ordered by emission. Everything short of a
/// duplicate unit declaration ends up here instead of aborting the run.
#[derive(Debug, Default)]
pub struct WarningCollector {
    pub warnings: Vec<Warning>,
}

impl WarningCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pos: SourcePosition, message: impl Into<String>) {
        let message = message.into();
        warn!("{}: {}", pos, message);
        self.warnings.push(Warning {
            pos,
            message,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }
}

impl fmt::Display for WarningCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.warnings.is_empty() {
            return write!(f, "No warnings");
        }
        for warning in &self.warnings {
            writeln!(f, "{}: {}", warning.pos, warning.message)?;
        }
        Ok(())
    }
}
