//! CLI-specific error types and exit code mapping

use cairn_core::error::CairnError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The named composite is not in the configured topology.
    #[error("composite not found: {0}")]
    UnknownComposite(String),

    /// The simulated cascade reported constituent failures.
    #[error("cascade finished with {0} failed constituent(s)")]
    CascadeFailures(usize),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from cairn-core / cairn-composite.
    #[error("{0}")]
    Core(#[from] CairnError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                         |
    /// |------|---------------------------------|
    /// | 0    | Success                         |
    /// | 1    | General / command error         |
    /// | 2    | Configuration error             |
    /// | 3    | Unknown composite               |
    /// | 4    | Cascade had failed constituents |
    /// | 10   | IO error                        |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(CairnError::Config(_)) => 2,
            Self::UnknownComposite(_) => 3,
            Self::CascadeFailures(_) => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}
