pub(crate) mod demangle;
pub mod module;
pub mod symbol;

pub use module::ModuleSymbols;
pub use symbol::Symbol;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object parsing error: {0}")]
    Object(#[from] object::Error),

    #[error("File is stripped: {0}")]
    Stripped(PathBuf),
}

pub type Result<T> = std::result::Result<T, SymbolError>;
