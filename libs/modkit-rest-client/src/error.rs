use crate::response::Response;
use std::time::Duration;
use thiserror::Error;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// REST client error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Invalid URL (base address at construction, or the final request URL)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Invalid URL scheme for transport security configuration
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme {
        /// The URL scheme that was rejected
        scheme: String,
        /// Reason the scheme was rejected
        reason: String,
    },

    /// Malformed request method
    #[error("Invalid method: {0}")]
    InvalidMethod(#[from] http::method::InvalidMethod),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Structured body could not be encoded as JSON
    #[error("JSON encoding failed: {0}")]
    JsonEncode(#[source] serde_json::Error),

    /// Structured body could not be encoded as XML
    #[error("XML encoding failed: {0}")]
    XmlEncode(#[from] quick_xml::SeError),

    /// Form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// A multipart field could not be encoded
    #[error("Multipart field '{param}' could not be encoded: {source}")]
    Multipart {
        /// Parameter name of the failing field
        param: String,
        #[source]
        source: std::io::Error,
    },

    /// Single request attempt timed out (default transport)
    #[error("Request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The caller's cancellation token fired before the call completed
    #[error("Request cancelled")]
    Cancelled,

    /// Transport error (network, connection, decorator failure, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Response body stream failed while reading
    #[error("Failed to read response body: {0}")]
    BodyRead(#[source] std::io::Error),

    /// JSON decoding error
    #[error("JSON decoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// XML decoding error
    #[error("XML decoding failed: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// Error status with a `text/plain` body
    #[error("The server returned {status}: {text}")]
    ServerText { status: http::StatusCode, text: String },

    /// Success status with a body that is neither JSON nor XML
    #[error("Unexpected content type {content_type:?} for success status {status}")]
    UnexpectedContentType {
        status: http::StatusCode,
        content_type: Option<String>,
    },

    /// Error status with a body that is neither JSON, XML nor plain text
    #[error("Unhandled content type {content_type:?} for error status {status}")]
    UnhandledErrorContentType {
        status: http::StatusCode,
        content_type: Option<String>,
    },
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

/// Failure of a full call (build, chain, read, decode).
///
/// Carries the partial [`Response`] next to the error: the built request is
/// present once construction succeeded, and the buffered raw response is
/// present once the transport returned one.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct CallError {
    #[source]
    error: HttpError,
    response: Response,
}

impl CallError {
    pub(crate) fn new(error: HttpError, response: Response) -> Self {
        Self { error, response }
    }

    /// The underlying error
    #[must_use]
    pub fn error(&self) -> &HttpError {
        &self.error
    }

    /// Whatever the call produced before failing
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Split into the error and the partial response
    #[must_use]
    pub fn into_parts(self) -> (HttpError, Response) {
        (self.error, self.response)
    }
}

impl From<CallError> for HttpError {
    fn from(err: CallError) -> Self {
        err.error
    }
}
