use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};

/// Tower layer that wraps outbound requests in a `tracing` span
///
/// Creates an `outgoing_http` span for each request with:
/// - `http.method`: The HTTP method
/// - `http.url`: The URL without its query string
/// - `http.request.content_type`: The payload type picked by the request builder
/// - `rest_client`: The name given with [`TraceLayer::named`], if any
///
/// Records `http.status_code` on response and sets `error=true` for 4xx/5xx
/// and for failed attempts. `cancelled=true` is recorded when the call's
/// [`CancellationToken`] fired before the inner invoker finished.
#[derive(Clone, Default)]
pub struct TraceLayer {
    name: Option<Arc<str>>,
}

impl TraceLayer {
    /// Create a new tracing layer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracing layer whose spans carry `rest_client = name`
    #[must_use]
    pub fn named(name: impl AsRef<str>) -> Self {
        Self {
            name: Some(Arc::from(name.as_ref())),
        }
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceService {
            inner,
            name: self.name.clone(),
        }
    }
}

/// Service that wraps requests with tracing spans
#[derive(Clone)]
pub struct TraceService<S> {
    inner: S,
    name: Option<Arc<str>>,
}

impl<S, ResBody> Service<Request<Full<Bytes>>> for TraceService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: std::fmt::Display + Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        use tracing::{Instrument, Level};

        let method = req.method().clone();
        let url = sanitized_url(req.uri());
        let content_type = req
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let token = req.extensions().get::<CancellationToken>().cloned();
        let name = self.name.clone();

        // Swap so we call the instance that was poll_ready'd, leaving a fresh clone
        // for the next poll_ready cycle.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let span = tracing::span!(
                Level::INFO, "outgoing_http",
                http.method = %method,
                http.url = %url,
                http.request.content_type = content_type.as_deref(),
                rest_client = name.as_deref(),
                http.status_code = tracing::field::Empty,
                error = tracing::field::Empty,
                cancelled = tracing::field::Empty,
            );

            let result = inner.call(req).instrument(span.clone()).await;

            if token.as_ref().is_some_and(CancellationToken::is_cancelled) {
                span.record("cancelled", true);
            }

            match &result {
                Ok(response) => {
                    span.record("http.status_code", response.status().as_u16());
                    if response.status().is_client_error() || response.status().is_server_error() {
                        span.record("error", true);
                    }
                    tracing::debug!(parent: &span, status = response.status().as_u16(), "response received");
                }
                Err(e) => {
                    span.record("error", true);
                    tracing::debug!(parent: &span, error = %e, "request failed");
                }
            }

            result
        })
    }
}

/// `scheme://authority/path`; the query string may carry secrets.
pub(crate) fn sanitized_url(uri: &http::Uri) -> String {
    format!(
        "{}://{}{}",
        uri.scheme_str().unwrap_or("https"),
        uri.authority().map_or("", http::uri::Authority::as_str),
        uri.path()
    )
}
