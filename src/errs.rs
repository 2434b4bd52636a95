use thiserror::Error;

pub type GlomResult<T> = Result<T, GlomError>;

#[derive(Debug, Error)]
pub enum GlomError {
    /// Inconsistent invocation or inputs that don't line up with the
    /// requested run (e.g. wrong number of initial partitions).
    #[error("configuration error, {0}")]
    Config(String),
    /// Malformed data that indicates an upstream bug, such as
    /// unequal-length sequences or a duplicated query name in a merge.
    #[error("data error, {0}")]
    Data(String),
    #[error("io error, {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error, {0}")]
    Csv(#[from] csv::Error),
}
