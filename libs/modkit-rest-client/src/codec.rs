//! Content-negotiated response decoding.
//!
//! The decode target is picked from the status range and the declared
//! `Content-Type`:
//!
//! | status      | JSON / XML content type      | `text/plain`          | other                         |
//! |-------------|------------------------------|-----------------------|-------------------------------|
//! | 204         | nothing decoded              | nothing decoded       | nothing decoded               |
//! | 200..=299   | decode into the result       | `UnexpectedContentType` | `UnexpectedContentType`     |
//! | >= 400      | decode into the error target | `ServerText`          | `UnhandledErrorContentType`   |
//! | otherwise   | nothing decoded              | nothing decoded       | nothing decoded               |
//!
//! An empty payload is never decoded. On an error status it still goes through
//! the table: an empty `text/plain` body is a `ServerText` with empty text, an
//! empty body of unknown type is `UnhandledErrorContentType`, and an empty
//! JSON/XML body leaves the error target untouched.

use crate::error::HttpError;
use http::StatusCode;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static JSON_CONTENT_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:(application|text)/(.*json.*)(;|$))").expect("static regex should not panic")
});

#[allow(clippy::expect_used)]
static XML_CONTENT_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:(application|text)/(.*xml.*)(;|$))").expect("static regex should not panic")
});

/// Payload family of a declared content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// `application/json`, `application/problem+json`, `text/json; charset=...`
    Json,
    /// `application/xml`, `text/xml`, `application/atom+xml`
    Xml,
    /// `text/plain`
    PlainText,
    /// Anything else, including a missing header
    Other,
}

impl ContentKind {
    /// Classify a `Content-Type` header value (case-insensitive).
    #[must_use]
    pub fn detect(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return Self::Other;
        };
        if JSON_CONTENT_TYPE.is_match(content_type) {
            Self::Json
        } else if XML_CONTENT_TYPE.is_match(content_type) {
            Self::Xml
        } else if content_type.to_ascii_lowercase().contains("text/plain") {
            Self::PlainText
        } else {
            Self::Other
        }
    }
}

/// Decode `payload` into `result` or `error` according to status and content type.
///
/// Targets are only written when decoding succeeds; on 204, on redirects and
/// on empty payloads neither target is touched. An empty payload on an error
/// status still fails unless it is declared JSON or XML.
///
/// # Errors
///
/// - `HttpError::Json` / `HttpError::Xml` when the payload does not decode into the target
/// - `HttpError::ServerText` for error statuses with a plain-text body
/// - `HttpError::UnexpectedContentType` for success statuses with an unknown body type
/// - `HttpError::UnhandledErrorContentType` for error statuses with an unknown body type
pub fn decode_response<R, E>(
    status: StatusCode,
    content_type: Option<&str>,
    payload: &[u8],
    result: &mut R,
    error: &mut E,
) -> Result<(), HttpError>
where
    R: DeserializeOwned,
    E: DeserializeOwned,
{
    if status == StatusCode::NO_CONTENT {
        return Ok(());
    }

    let kind = ContentKind::detect(content_type);
    tracing::trace!(
        status = status.as_u16(),
        ?kind,
        bytes = payload.len(),
        "decoding response payload"
    );

    if status.is_success() {
        if payload.is_empty() {
            return Ok(());
        }
        return match kind {
            ContentKind::Json => decode_json(payload, result),
            ContentKind::Xml => decode_xml(payload, result),
            ContentKind::PlainText | ContentKind::Other => Err(HttpError::UnexpectedContentType {
                status,
                content_type: content_type.map(str::to_owned),
            }),
        };
    }

    if status.is_client_error() || status.is_server_error() {
        return match kind {
            ContentKind::Json | ContentKind::Xml if payload.is_empty() => Ok(()),
            ContentKind::Json => decode_json(payload, error),
            ContentKind::Xml => decode_xml(payload, error),
            ContentKind::PlainText => Err(HttpError::ServerText {
                status,
                text: String::from_utf8_lossy(payload).into_owned(),
            }),
            ContentKind::Other => Err(HttpError::UnhandledErrorContentType {
                status,
                content_type: content_type.map(str::to_owned),
            }),
        };
    }

    // 1xx/3xx: redirects belong to the transport
    Ok(())
}

fn decode_json<T: DeserializeOwned>(payload: &[u8], target: &mut T) -> Result<(), HttpError> {
    *target = serde_json::from_slice(payload)?;
    Ok(())
}

fn decode_xml<T: DeserializeOwned>(payload: &[u8], target: &mut T) -> Result<(), HttpError> {
    *target = quick_xml::de::from_reader(payload)?;
    Ok(())
}
