use thiserror::Error;

/// The flat, sentinel-comparable error taxonomy every driver operation
/// returns through. There is no exception machinery on the public surface;
/// callers match on the variant they care about (`BadConnection` to trigger
/// a retry, `Eof` to stop iterating, and so on).
#[derive(Debug, Error)]
pub enum Error {
    /// End of rows / end of stream.
    #[error("end of rows")]
    Eof,

    /// The physical sub-connection is no longer usable. Triggers pool
    /// eviction and at most one retry on a fresh sub-connection.
    #[error("connection is no longer usable: {0}")]
    BadConnection(String),

    /// A codec needs more bytes than are currently available. Internal to
    /// decoders; should not normally escape to application code.
    #[error("need more data to continue decoding")]
    NeedMoreData,

    /// The driver does not implement this operation; the caller may fall
    /// back to an alternative code path (e.g. Prepare+Exec instead of a
    /// direct Exec).
    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("key violation: {0}")]
    KeyViolation(String),

    #[error("relation already exists: {0}")]
    RelationAlreadyExists(String),

    /// The enclosing transaction has been aborted by the server; the
    /// application must roll back and start again.
    #[error("transaction aborted")]
    TransactionAborted,

    #[error("database busy")]
    DatabaseBusy,

    /// Credentials or host were rejected while opening a sub-connection.
    #[error("failed to connect: {0}")]
    ConnectFailed(String),

    #[error("invalid number of parameters: expected {expected}, got {got}")]
    InvalidNumberOfParameters { expected: usize, got: usize },

    /// `CrudOps::query_row`-style helpers expect exactly one row.
    #[error("expected exactly one result row")]
    NotOneResult,

    /// Geometry decoder ran off the end of the input buffer.
    #[error("geometry decode overrun")]
    Overrun,

    /// Geometry decoder found an unknown type tag or malformed structure.
    #[error("invalid geometry input")]
    InvalidInput,

    #[error("too many parts in geometry: max is {max}")]
    TooManyParts { max: u32 },

    #[error("too many vertices in one part: max is {max}")]
    TooManyVertices { max: u32 },

    /// Driver-native error with no more specific mapping.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the caller may transparently retry the operation. Only
    /// `BadConnection` qualifies; every other kind is surfaced as-is.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::BadConnection(_))
    }

    pub fn bad_connection(msg: impl Into<String>) -> Self {
        Self::BadConnection(msg.into())
    }

    pub fn connect_failed(msg: impl Into<String>) -> Self {
        Self::ConnectFailed(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
