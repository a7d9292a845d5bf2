use thiserror::Error;

use crate::{AssembleError, CompileError};

/// Unified error type covering assembly, compilation, and I/O.
///
/// Every phase keeps its own error enum; this one lets callers that drive
/// several phases use `?` throughout.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Assemble(#[from] AssembleError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "binary-cache")]
    #[error(transparent)]
    Serialize(#[from] crate::SerializeError),

    #[cfg(feature = "binary-cache")]
    #[error(transparent)]
    Deserialize(#[from] crate::DeserializeError),
}
