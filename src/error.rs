use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InputValidation(String),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("corrupt image: {0}")]
    CorruptImage(String),

    #[error("rewrite inconsistency: {0}")]
    RewriteInconsistency(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("xml error: {0}")]
    Xml(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Per-match failures leave the rest of the file processable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedImageFormat(_)
                | Error::CorruptImage(_)
                | Error::RewriteInconsistency(_)
                | Error::InvalidArgument(_)
        )
    }
}

impl From<roxmltree::Error> for Error {
    fn from(e: roxmltree::Error) -> Self {
        Error::MalformedDocument(format!("XML parse error: {e}"))
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        Error::MalformedDocument(format!("ZIP error: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
