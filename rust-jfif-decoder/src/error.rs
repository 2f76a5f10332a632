use thiserror::Error;

/// Result type used throughout the decoder
pub type Result<T> = core::result::Result<T, Error>;

/// Describes an error encountered while reading or writing an image.
#[derive(Error, Debug)]
pub enum Error {
    /// The image is malformed in some way. The string describes how.
    #[error("Malformed JPEG: {0}")]
    Malformed(&'static str),
    /// A feature is not supported by the decoder
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(&'static str),
    /// More tables were defined than the decoder keeps
    #[error("Too many {table} tables, at most {max} may be defined")]
    CapacityExceeded {
        /// Which kind of table overflowed
        table: &'static str,
        /// The capacity of the table set
        max: usize,
    },
    /// A component refers to a table that was never defined
    #[error("No {kind} table with id {id} was defined")]
    MissingTable {
        /// Which kind of table is missing
        kind: &'static str,
        /// The id the component refers to
        id: u8,
    },
    /// The entropy-coded data could not be decoded
    #[error("Decode error: {0}")]
    Decode(&'static str),
    /// The entropy-coded data ran out before the end of image marker
    #[error("Entropy-coded data ended before the end of image marker")]
    StreamExhausted,
    /// There was an error writing the image
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Broad classes of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The container or one of its segments is invalid or unsupported
    Format,
    /// The entropy-coded data is invalid
    Decode,
    /// The entropy-coded data is truncated
    StreamExhaustion,
    /// Reading or writing failed
    Io,
}

impl Error {
    /// Returns the class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Malformed(_)
            | Error::UnsupportedFeature(_)
            | Error::CapacityExceeded { .. }
            | Error::MissingTable { .. } => ErrorKind::Format,
            Error::Decode(_) => ErrorKind::Decode,
            Error::StreamExhausted => ErrorKind::StreamExhaustion,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}
