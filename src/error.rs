use std::path::PathBuf;

use thiserror::Error;

/// The interpreter's single error type. Every fatal condition described by
/// the opcode table and the loader is a variant here; `exit_code` is the
/// one place that maps a variant to the process exit status, so the CLI
/// binary never has to duplicate the table.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Cli(String),

    #[error("could not open '{path}': {source}")]
    IoMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write '{path}': {source}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML: {0}")]
    XmlMalformed(String),

    #[error("structurally invalid program: {0}")]
    Structure(String),

    #[error("semantic error: {0}")]
    Semantic(String),

    #[error("operand type mismatch in instruction {order} ({opcode}): {detail}")]
    TypeError {
        order: u32,
        opcode: String,
        detail: String,
    },

    #[error("variable '{name}' is not defined in frame {frame}")]
    VarUndefined { frame: String, name: String },

    #[error("frame {0} is missing")]
    FrameMissing(String),

    #[error("missing value: {0}")]
    ValueMissing(String),

    #[error("bad operand value: {0}")]
    OperandValue(String),

    #[error("string operation error: {0}")]
    StringError(String),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Cli(_) => 10,
            Error::IoMissing { .. } => 11,
            Error::IoWrite { .. } => 12,
            Error::XmlMalformed(_) => 31,
            Error::Structure(_) => 32,
            Error::Semantic(_) => 52,
            Error::TypeError { .. } => 53,
            Error::VarUndefined { .. } => 54,
            Error::FrameMissing(_) => 55,
            Error::ValueMissing(_) => 56,
            Error::OperandValue(_) => 57,
            Error::StringError(_) => 58,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
