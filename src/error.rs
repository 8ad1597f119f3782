//! Defines [`GeoArrowError`], representing all errors returned by this crate.

use std::borrow::Cow;
use std::fmt::Debug;

use arrow_schema::ArrowError;
use thiserror::Error;

/// Numeric error codes, reusing the POSIX `errno` values as a lightweight taxonomy.
pub mod code {
    /// Success.
    pub const OK: i32 = 0;
    /// Allocation failure.
    pub const ENOMEM: i32 = 12;
    /// Invalid input.
    pub const EINVAL: i32 = 22;
    /// Offsets do not fit in the output offset type.
    pub const EOVERFLOW: i32 = 75;
    /// Recognized but unimplemented combination.
    pub const ENOTSUP: i32 = 95;
}

/// Enum with all errors in this crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GeoArrowError {
    /// A scratch buffer could not be grown.
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// Invalid input: unsupported kind, dimension, layout, schema or encoding.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Incorrect geometry type for operation
    #[error("Incorrect geometry type for operation: {0}")]
    IncorrectGeometryType(Cow<'static, str>),

    /// Invalid data not conforming to GeoArrow specification
    #[error("Data not conforming to GeoArrow specification: {0}")]
    InvalidGeoArrow(String),

    /// A geometry engine primitive reported failure.
    #[error("{operation}() failed{}: {message}", fmt_row(.row))]
    Engine {
        /// The engine operation that failed.
        operation: &'static str,
        /// The row of the batch being processed, if any.
        row: Option<usize>,
        /// The message reported by the engine.
        message: String,
    },

    /// Returned when functionality is not yet available.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Whenever pushing to a container fails because it does not support more entries.
    ///
    /// The solution is usually to use a higher-capacity container-backing type.
    #[error("Overflow: data does not fit in i32 offsets.")]
    Overflow,

    /// WKB Error
    #[error("WKB error: {0}")]
    Wkb(String),

    /// WKT Error
    #[error("WKT error: {0}")]
    Wkt(String),

    /// [ArrowError]
    #[error(transparent)]
    Arrow(#[from] ArrowError),

    /// [std::io::Error]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// [serde_json::Error]
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

fn fmt_row(row: &Option<usize>) -> String {
    match row {
        Some(i) => format!(" at row {i}"),
        None => String::new(),
    }
}

impl GeoArrowError {
    /// The `errno`-style code of this error. Never returns [`code::OK`].
    pub fn code(&self) -> i32 {
        match self {
            GeoArrowError::OutOfMemory(_) | GeoArrowError::Engine { .. } => code::ENOMEM,
            GeoArrowError::NotSupported(_) => code::ENOTSUP,
            GeoArrowError::Overflow => code::EOVERFLOW,
            GeoArrowError::InvalidArgument(_)
            | GeoArrowError::IncorrectGeometryType(_)
            | GeoArrowError::InvalidGeoArrow(_)
            | GeoArrowError::Wkb(_)
            | GeoArrowError::Wkt(_)
            | GeoArrowError::Arrow(_)
            | GeoArrowError::IOError(_)
            | GeoArrowError::SerdeJsonError(_) => code::EINVAL,
        }
    }

    /// Attach a row index to an engine failure that does not carry one yet.
    pub(crate) fn at_row(self, i: usize) -> Self {
        match self {
            GeoArrowError::Engine {
                operation,
                row: None,
                message,
            } => GeoArrowError::Engine {
                operation,
                row: Some(i),
                message,
            },
            err => err,
        }
    }
}

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, GeoArrowError>;

impl From<GeoArrowError> for ArrowError {
    /// Many APIs where we pass in a callback into the Arrow crate require the returned error type
    /// to be ArrowError, so implementing this `From` makes the conversion less verbose there.
    fn from(err: GeoArrowError) -> Self {
        match err {
            GeoArrowError::Arrow(err) => err,
            _ => ArrowError::ExternalError(Box::new(err)),
        }
    }
}

/// Returned by [`ArrayWriter::append`][crate::writer::ArrayWriter::append] when a feature fails
/// partway through a batch.
///
/// `n_appended` features were fully written before the failure.
#[derive(Error, Debug)]
#[error("{source} (after appending {n_appended} features)")]
pub struct AppendError {
    /// The number of features fully appended before the failure.
    pub n_appended: usize,
    /// The failure.
    #[source]
    pub source: GeoArrowError,
}

impl From<AppendError> for GeoArrowError {
    fn from(err: AppendError) -> Self {
        err.source
    }
}

/// Holds the message of the most recent failure of a writer or reader.
///
/// Cleared at the start of every operation and overwritten by the next failure.
#[derive(Debug, Default, Clone)]
pub(crate) struct LastError(String);

impl LastError {
    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }

    pub(crate) fn set(&mut self, err: &impl std::fmt::Display) {
        self.0 = err.to_string();
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn engine_error_message() {
        let err = GeoArrowError::Engine {
            operation: "create_polygon",
            row: None,
            message: "shell is not a linear ring".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "create_polygon() failed: shell is not a linear ring"
        );

        let err = err.at_row(3);
        assert_eq!(
            err.to_string(),
            "create_polygon() failed at row 3: shell is not a linear ring"
        );
        assert_eq!(err.code(), code::ENOMEM);
    }

    #[test]
    fn codes() {
        assert_eq!(
            GeoArrowError::InvalidArgument("x".to_string()).code(),
            code::EINVAL
        );
        assert_eq!(
            GeoArrowError::NotSupported("x".to_string()).code(),
            code::ENOTSUP
        );
        assert_eq!(
            GeoArrowError::OutOfMemory("x".to_string()).code(),
            code::ENOMEM
        );
        assert_eq!(GeoArrowError::Overflow.code(), code::EOVERFLOW);
    }

    #[test]
    fn append_error_keeps_count() {
        let err = AppendError {
            n_appended: 2,
            source: GeoArrowError::InvalidArgument("Unexpected geometry type id: 42".to_string()),
        };
        assert!(err.to_string().ends_with("(after appending 2 features)"));
        let err: GeoArrowError = err.into();
        assert_eq!(err.code(), code::EINVAL);
    }
}
