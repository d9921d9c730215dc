use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use std::convert::Infallible;

/// Type alias for the boxed response body produced by invokers.
///
/// The body is type-erased so that the default transport (with its
/// decompression layer), injected transports and decorators all agree on a
/// single response type.
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Wrap in-memory bytes as a [`ResponseBody`].
///
/// Handy for custom transports and decorators that synthesize responses.
#[must_use]
pub fn full_body(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into())
        .map_err(|never: Infallible| -> Box<dyn std::error::Error + Send + Sync> { match never {} })
        .boxed()
}

/// Outcome of a call: the request that was sent and the buffered response.
///
/// Both sides stay readable after decoding, so callers can inspect the raw
/// status, headers and payload even when the typed decode failed. On failure
/// (see [`CallError`](crate::CallError)) only the parts produced before the
/// failure are present.
#[derive(Debug, Default)]
pub struct Response {
    pub(crate) request: Option<Request<Bytes>>,
    pub(crate) raw_response: Option<http::Response<Bytes>>,
}

impl Response {
    /// The request as built and handed to the decorator chain
    #[must_use]
    pub fn request(&self) -> Option<&Request<Bytes>> {
        self.request.as_ref()
    }

    /// The response with its body fully buffered
    #[must_use]
    pub fn raw_response(&self) -> Option<&http::Response<Bytes>> {
        self.raw_response.as_ref()
    }

    /// Response status, if a response was received
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.raw_response.as_ref().map(http::Response::status)
    }

    /// Response headers, if a response was received
    #[must_use]
    pub fn headers(&self) -> Option<&HeaderMap> {
        self.raw_response.as_ref().map(http::Response::headers)
    }

    /// Buffered response payload, if a response was received
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.raw_response.as_ref().map(http::Response::body)
    }

    /// Response payload decoded as UTF-8 (lossy)
    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.body()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Consume and return the request/response pair
    #[must_use]
    pub fn into_parts(self) -> (Option<Request<Bytes>>, Option<http::Response<Bytes>>) {
        (self.request, self.raw_response)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_body_collects() {
        let body = full_body("payload");
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"payload");
    }

    #[test]
    fn test_response_accessors() {
        let raw = http::Response::builder()
            .status(StatusCode::CREATED)
            .header("content-type", "text/plain")
            .body(Bytes::from_static(b"created"))
            .unwrap();
        let response = Response {
            request: Some(Request::new(Bytes::new())),
            raw_response: Some(raw),
        };

        assert_eq!(response.status(), Some(StatusCode::CREATED));
        assert_eq!(
            response.headers().unwrap().get("content-type").unwrap(),
            "text/plain"
        );
        assert_eq!(response.text().as_deref(), Some("created"));
        assert!(response.request().is_some());
    }

    #[test]
    fn test_default_response_is_empty() {
        let response = Response::default();
        assert!(response.status().is_none());
        assert!(response.body().is_none());
        let (request, raw) = response.into_parts();
        assert!(request.is_none() && raw.is_none());
    }
}
