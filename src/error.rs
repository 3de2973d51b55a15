use thiserror::Error;

/// Errors raised while configuring, fitting or querying a grouped forest.
#[derive(Debug, Error)]
pub enum LincsError {
    /// Invalid or infeasible configuration (e.g. not enough observed cell lines to fit)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A sub-ensemble could not be trained (e.g. no eligible rows)
    #[error("training error: {0}")]
    Training(String),

    /// Model not fit, or a query sample it cannot score
    #[error("inference error: {0}")]
    Inference(String),

    /// Malformed input tables
    #[error("data error: {0}")]
    Data(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LincsError>;
