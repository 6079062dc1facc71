use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Invalid argument: {0}")]
    Argument(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Binary format error: {0}")]
    BinaryFormat(#[from] shadowtrace_symbols::SymbolError),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("No record for thread 0x{0:x}")]
    UnknownThread(u64),

    #[error("Tracer is already initialized")]
    AlreadyInitialized,

    #[error("Tracer is not initialized")]
    Uninitialized,

    #[error("Internal error: {0}")]
    Logic(String),
}

pub type Result<T> = std::result::Result<T, TraceError>;
