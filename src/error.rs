use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection} record not found: {id}")]
    NotFound { collection: &'static str, id: String },

    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("an id is required for {0}")]
    MissingId(&'static str),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(String),

    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn decode(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Decode { path: path.into(), message: message.to_string() }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to read image {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not an image file: {0}")]
    NotImage(String),

    #[error("malformed data URL")]
    Malformed,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("failed to write render output {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("'typst' is not installed or not on PATH")]
    ToolMissing,

    #[error("typst failed to compile {0}")]
    Compile(PathBuf),

    #[error("print job for {0} was not accepted")]
    Print(PathBuf),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("export I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExportError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
