use thiserror::Error;

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Conflicting state: {0}")]
    ConflictingState(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("GPIO error: {0}")]
    Hardware(String),
}

/// Non-fatal diagnostics. Only produced while warnings are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GpioWarning {
    #[error(
        "No channels have been set up yet - nothing to clean up! \
         Try cleaning up at the end of your program instead!"
    )]
    NothingToCleanUp,
}
