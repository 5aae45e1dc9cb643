//! Error handling module for ansible-step
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Configuration and materialization errors are raised before the tool is
//! launched; execution failures are reported after it exits.

use thiserror::Error;

/// Main error type for building and executing an invocation
#[derive(Error, Debug)]
pub enum InvocationError {
    /// Invalid or incomplete step configuration (raised before launch)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential could not be resolved or has the wrong type
    #[error("Credential error: {0}")]
    Credential(String),

    /// A temporary credential or inventory file could not be written
    #[error("Failed to materialize {what}: {source}")]
    Materialization {
        what: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and exited non-zero
    #[error("{tool} execution failed")]
    Execution { tool: String },

    /// The process runner could not launch or wait for the tool
    #[error("Process error: {0}")]
    Process(#[source] std::io::Error),

    /// The build was cancelled while the tool was running
    #[error("Execution cancelled by signal {signal}")]
    Cancelled { signal: i32 },

    /// `execute` was called on an invocation that already ran
    #[error("Invocation has already been executed")]
    AlreadyExecuted,

    /// IO errors outside of materialization (loading step files, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for invocation operations
pub type Result<T> = std::result::Result<T, InvocationError>;

// Convenient error constructors
impl InvocationError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a credential error
    pub fn credential(msg: impl Into<String>) -> Self {
        Self::Credential(msg.into())
    }

    /// Create a materialization error
    pub fn materialization(what: impl Into<String>, source: std::io::Error) -> Self {
        Self::Materialization {
            what: what.into(),
            source,
        }
    }

    /// Create an execution failure for the given tool
    pub fn execution(tool: impl Into<String>) -> Self {
        Self::Execution { tool: tool.into() }
    }

    /// Whether this error was raised before any process was launched
    pub fn is_pre_launch(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Credential(_) | Self::Materialization { .. }
        )
    }
}
