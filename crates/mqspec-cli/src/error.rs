//! Error types for the CLI

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Exit code for a run that failed before touching the control plane
pub const EXIT_CONFIGURATION: u8 = 2;

/// Exit code for any other failure
pub const EXIT_FAILURE: u8 = 1;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failure from configuration checks or provisioning
    #[error(transparent)]
    Provision(#[from] mqspec_common::Error),

    /// Failure writing output
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure serializing the report
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Provision(mqspec_common::Error::configuration(message))
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Provision(e) if e.is_configuration() => EXIT_CONFIGURATION,
            _ => EXIT_FAILURE,
        }
    }
}
