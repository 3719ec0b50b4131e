//! Error types for the query engines

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// User-visible hint attached to archive encoding failures.
pub(crate) const REPAIR_HINT: &str =
    "archive contains invalid string data; run `vaultq archive --rebuild` to repair it";

/// Substring DuckDB reports when a Parquet string column holds bytes that
/// are not valid UTF-8.
const ENCODING_NEEDLE: &str = "invalid string encoding";

/// Failure value returned by every engine operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad input caught before touching a backend: malformed time periods,
    /// unparsable enum names, or an engine invoked on a path it is not
    /// configured for.
    #[error("{0}")]
    Validation(String),

    /// A backend query, scan, or row-mapping failure, labeled with the
    /// operation that issued it.
    #[error("{op}: {source}")]
    Backend {
        op: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// The columnar backend rejected stored string data. The original cause
    /// stays reachable through the source chain.
    #[error("{hint}")]
    Encoding {
        hint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// The caller's cancellation handle fired.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn backend(
        op: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Backend {
            op,
            source: Box::new(source),
        }
    }

    /// Wrap a columnar backend error, upgrading encoding failures to
    /// [`Error::Encoding`] with the repair hint.
    pub(crate) fn columnar(
        op: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        if chain_contains(&source, ENCODING_NEEDLE) {
            return Error::Encoding {
                hint: REPAIR_HINT.to_string(),
                source: Box::new(source),
            };
        }
        Error::backend(op, source)
    }
}

/// Check the error and its whole source chain for a substring.
fn chain_contains(err: &(dyn std::error::Error + 'static), needle: &str) -> bool {
    if err.to_string().contains(needle) {
        return true;
    }
    let mut current = err.source();
    while let Some(cause) = current {
        if cause.to_string().contains(needle) {
            return true;
        }
        current = cause.source();
    }
    false
}
