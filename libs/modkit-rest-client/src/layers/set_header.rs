use crate::error::HttpError;
use http::{HeaderName, HeaderValue, Request, Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that sets a header on every request
///
/// Typical use is authentication:
///
/// ```ignore
/// let auth = Decorator::from_layer(SetHeaderLayer::bearer_auth(&token)?);
/// let client = RestClient::builder("https://api.example.com").decorator(auth).build()?;
/// ```
///
/// A header the request already carries is left untouched.
#[derive(Clone)]
pub struct SetHeaderLayer {
    name: HeaderName,
    value: HeaderValue,
}

impl SetHeaderLayer {
    /// Create a layer setting `name: value`
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderName` / `HttpError::InvalidHeaderValue`
    /// if either part is not a valid header component
    pub fn try_new(name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self, HttpError> {
        let name = HeaderName::try_from(name.as_ref())?;
        let value = HeaderValue::from_str(value.as_ref())?;
        Ok(Self { name, value })
    }

    /// `Authorization: Bearer <token>`, marked sensitive so it is redacted in debug output
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if the token contains invalid characters
    pub fn bearer_auth(token: impl AsRef<str>) -> Result<Self, HttpError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.as_ref()))?;
        value.set_sensitive(true);
        Ok(Self {
            name: http::header::AUTHORIZATION,
            value,
        })
    }
}

impl<S> Layer<S> for SetHeaderLayer {
    type Service = SetHeaderService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SetHeaderService {
            inner,
            name: self.name.clone(),
            value: self.value.clone(),
        }
    }
}

/// Service that sets a header on requests
#[derive(Clone)]
pub struct SetHeaderService<S> {
    inner: S,
    name: HeaderName,
    value: HeaderValue,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for SetHeaderService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        if !req.headers().contains_key(&self.name) {
            req.headers_mut()
                .insert(self.name.clone(), self.value.clone());
        }
        self.inner.call(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Method, StatusCode};
    use http_body_util::Full;
    use tower::ServiceExt;

    /// Test service that asserts a header matches the expected value.
    #[derive(Clone)]
    struct CheckHeaderService {
        name: HeaderName,
        expected: HeaderValue,
    }

    impl Service<Request<Full<Bytes>>> for CheckHeaderService {
        type Response = Response<Full<Bytes>>;
        type Error = Box<dyn std::error::Error + Send + Sync>;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            assert_eq!(req.headers().get(&self.name), Some(&self.expected));
            std::future::ready(Ok(Response::builder()
                .status(StatusCode::OK)
                .body(Full::new(Bytes::new()))
                .unwrap()))
        }
    }

    fn request() -> http::request::Builder {
        Request::builder().method(Method::GET).uri("http://example.com")
    }

    #[tokio::test]
    async fn test_header_added() {
        let check = CheckHeaderService {
            name: HeaderName::from_static("x-api-key"),
            expected: HeaderValue::from_static("k-123"),
        };
        let mut service = SetHeaderLayer::try_new("X-Api-Key", "k-123")
            .unwrap()
            .layer(check);

        let req = request().body(Full::new(Bytes::new())).unwrap();
        service.ready().await.unwrap().call(req).await.unwrap();
    }

    #[tokio::test]
    async fn test_existing_header_not_overwritten() {
        let check = CheckHeaderService {
            name: http::header::AUTHORIZATION,
            expected: HeaderValue::from_static("Bearer per-request"),
        };
        let mut service = SetHeaderLayer::bearer_auth("client-wide")
            .unwrap()
            .layer(check);

        let req = request()
            .header(http::header::AUTHORIZATION, "Bearer per-request")
            .body(Full::new(Bytes::new()))
            .unwrap();
        service.ready().await.unwrap().call(req).await.unwrap();
    }

    #[tokio::test]
    async fn test_bearer_auth_value() {
        let check = CheckHeaderService {
            name: http::header::AUTHORIZATION,
            expected: HeaderValue::from_static("Bearer abc"),
        };
        let mut service = SetHeaderLayer::bearer_auth("abc").unwrap().layer(check);

        let req = request().body(Full::new(Bytes::new())).unwrap();
        service.ready().await.unwrap().call(req).await.unwrap();
    }

    #[test]
    fn test_invalid_components_rejected() {
        assert!(matches!(
            SetHeaderLayer::try_new("bad header", "v"),
            Err(HttpError::InvalidHeaderName(_))
        ));
        assert!(matches!(
            SetHeaderLayer::try_new("x-ok", "invalid\x00value"),
            Err(HttpError::InvalidHeaderValue(_))
        ));
    }
}
