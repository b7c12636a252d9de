use thiserror::Error;

/// Errors raised while assembling or driving a simulated machine.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("symbol `{0}` is already defined")]
    DuplicateSymbol(String),
    #[error("unknown program `{0}`")]
    UnknownProgram(String),
    #[error("data area exhausted: {requested} bytes requested")]
    DataFull { requested: usize },
    #[error("invalid memory layout: {0}")]
    Layout(&'static str),
    #[error("kernel refused: {0}")]
    Kernel(#[from] amt_kernel::Error),
    #[error("machine has not been booted")]
    NotBooted,
}
