use std::fmt;
use std::str::FromStr;

use crate::core::PersistenceError;

/// When pending context changes are written to the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Flush before every query so results reflect pending changes.
    #[default]
    Auto,
    /// Flush only on explicit request; queries see flushed state only.
    Commit,
}

impl FromStr for FlushMode {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "commit" => Ok(Self::Commit),
            other => Err(PersistenceError::InvalidConfig(format!(
                "unknown flush mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for FlushMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unit-of-work name, attached to log events
    pub name: String,

    /// Flush behaviour before queries
    pub flush_mode: FlushMode,

    /// Keep every executed query for later inspection
    pub record_queries: bool,
}

impl SessionConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            flush_mode: FlushMode::Auto,
            record_queries: false,
        }
    }

    pub fn flush_mode(mut self, flush_mode: FlushMode) -> Self {
        self.flush_mode = flush_mode;
        self
    }

    pub fn record_queries(mut self, record: bool) -> Self {
        self.record_queries = record;
        self
    }

    pub fn validate(&self) -> Result<(), PersistenceError> {
        if self.name.trim().is_empty() {
            return Err(PersistenceError::InvalidConfig(
                "session name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new("default")
    }
}
