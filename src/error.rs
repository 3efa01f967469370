//! Error taxonomy for the engine.
//!
//! Every internal function returns [`Result<T>`]. A C-shaped FFI binding
//! layer built on top of this crate would collapse these into 0 / NULL /
//! -1 and documented sentinel values; a binding layer should match each
//! variant to the corresponding sentinel rather than re-deriving the
//! mapping.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds, one variant per conceptual failure mode a caller needs to
/// distinguish.
#[derive(Debug, Error)]
pub enum Error {
    /// Null handle, negative index, zero-size buffer, stride not a
    /// multiple of 4. Maps to 0 / NULL / -1 at the public boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocation or pixmap construction failure. Maps to 0.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// An exception surfaced from the underlying PDF/rasterization
    /// library, caught at the outermost component function. Maps to 0.
    #[error("library failure: {0}")]
    Library(String),

    /// The operation requires PDF specifics (annotations, widgets,
    /// alerts, incremental save) but the open document is not a PDF.
    /// Maps to 0 / NULL.
    #[error("document is not a PDF")]
    NotAPdf,

    /// Cooperative cancellation observed. `cookie_aborted` stays true
    /// until `cookie_reset`. Maps to 0.
    #[error("operation aborted")]
    Aborted,

    /// Mutate-by-object-id found no matching annotation/widget on the
    /// target page. Maps to 0, silently.
    #[error("object id not found on page")]
    NotFound,
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn library(msg: impl Into<String>) -> Self {
        Error::Library(msg.into())
    }

    /// True for the subset of errors that are expected, routine outcomes
    /// (no warning log warranted) rather than noisy failures.
    pub fn is_silent(&self) -> bool {
        matches!(self, Error::NotFound | Error::Aborted)
    }
}

impl From<lopdf::Error> for Error {
    fn from(e: lopdf::Error) -> Self {
        Error::Library(e.to_string())
    }
}

impl From<pdfium_render::error::PdfiumError> for Error {
    fn from(e: pdfium_render::error::PdfiumError) -> Self {
        Error::Library(e.to_string())
    }
}
