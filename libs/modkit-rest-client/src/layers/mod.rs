//! Decorator chain around the transport invoker
//!
//! An [`Invoker`] is the single-method capability "execute a request, return a
//! response or fail". A [`Decorator`] turns one invoker into another with the
//! same shape and added behavior (logging, auth, retries, ...).
//!
//! ## Available Layers
//!
//! - [`TraceLayer`] - Wraps each request in a `tracing` span
//! - [`SetHeaderLayer`] - Sets a header on every request (auth tokens, API keys)
//!
//! Any tower [`Layer`] producing an invoker-shaped service can be turned into a
//! decorator with [`Decorator::from_layer`].

mod set_header;
mod trace;

pub use set_header::{SetHeaderLayer, SetHeaderService};
pub use trace::{TraceLayer, TraceService};
pub(crate) use trace::sanitized_url;

use crate::error::HttpError;
use crate::response::ResponseBody;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use std::fmt;
use std::sync::Arc;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

/// Type-erased request executor: the transport, optionally wrapped by decorators.
pub type Invoker = BoxCloneSyncService<Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

/// Transform from one [`Invoker`] to another.
///
/// Cheap to clone; a client keeps its decorators in a fixed order for its
/// whole lifetime.
///
/// # Example
///
/// ```ignore
/// // Short-circuit every DELETE before it reaches the network
/// let read_only = Decorator::new(|inner: Invoker| {
///     Invoker::new(tower::service_fn(move |req: http::Request<_>| {
///         let mut inner = inner.clone();
///         async move {
///             if req.method() == http::Method::DELETE {
///                 return Err(HttpError::Transport("read-only client".into()));
///             }
///             inner.ready().await?.call(req).await
///         }
///     }))
/// });
/// ```
#[derive(Clone)]
pub struct Decorator(Arc<dyn Fn(Invoker) -> Invoker + Send + Sync>);

impl Decorator {
    /// Decorator from a plain function
    pub fn new<F>(wrap: F) -> Self
    where
        F: Fn(Invoker) -> Invoker + Send + Sync + 'static,
    {
        Self(Arc::new(wrap))
    }

    /// Decorator from a tower layer
    pub fn from_layer<L>(layer: L) -> Self
    where
        L: Layer<Invoker> + Send + Sync + 'static,
        L::Service: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<Request<Full<Bytes>>>>::Future: Send + 'static,
    {
        Self::new(move |inner| BoxCloneSyncService::new(layer.layer(inner)))
    }

    /// Apply this decorator to `inner`
    #[must_use]
    pub fn wrap(&self, inner: Invoker) -> Invoker {
        (self.0)(inner)
    }
}

impl fmt::Debug for Decorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decorator").finish_non_exhaustive()
    }
}

/// Compose `decorators` around `endpoint`.
///
/// `decorators[0]` is the outermost layer: it sees the request first and the
/// response last. The endpoint is innermost. With no decorators the endpoint
/// is returned as is.
#[must_use]
pub fn chain(endpoint: Invoker, decorators: &[Decorator]) -> Invoker {
    decorators
        .iter()
        .rev()
        .fold(endpoint, |inner, decorator| decorator.wrap(inner))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::response::full_body;
    use http::StatusCode;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    type Log = Arc<Mutex<Vec<String>>>;

    fn terminal(log: Log) -> Invoker {
        Invoker::new(tower::service_fn(move |_req: Request<Full<Bytes>>| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push("terminal".to_owned());
                Ok::<_, HttpError>(Response::new(full_body("done")))
            }
        }))
    }

    fn recording(name: &'static str, log: Log) -> Decorator {
        Decorator::new(move |inner: Invoker| {
            let log = Arc::clone(&log);
            Invoker::new(tower::service_fn(move |req: Request<Full<Bytes>>| {
                let inner = inner.clone();
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push(format!("{name}:request"));
                    let response = inner.oneshot(req).await;
                    log.lock().unwrap().push(format!("{name}:response"));
                    response
                }
            }))
        })
    }

    fn request() -> Request<Full<Bytes>> {
        Request::builder()
            .uri("http://example.com/")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_decorator_is_outermost() {
        let log: Log = Arc::default();
        let decorators = vec![
            recording("d0", Arc::clone(&log)),
            recording("d1", Arc::clone(&log)),
            recording("d2", Arc::clone(&log)),
        ];

        let invoker = chain(terminal(Arc::clone(&log)), &decorators);
        invoker.oneshot(request()).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "d0:request",
                "d1:request",
                "d2:request",
                "terminal",
                "d2:response",
                "d1:response",
                "d0:response",
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_chain_is_the_endpoint() {
        let log: Log = Arc::default();
        let invoker = chain(terminal(Arc::clone(&log)), &[]);
        let response = invoker.oneshot(request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*log.lock().unwrap(), vec!["terminal"]);
    }

    #[tokio::test]
    async fn test_decorator_can_short_circuit() {
        let log: Log = Arc::default();
        let deny = Decorator::new(|_inner: Invoker| {
            Invoker::new(tower::service_fn(|_req: Request<Full<Bytes>>| async {
                Err::<Response<ResponseBody>, _>(HttpError::Transport("denied".into()))
            }))
        });

        let invoker = chain(terminal(Arc::clone(&log)), &[deny]);
        let result = invoker.oneshot(request()).await;

        assert!(matches!(result, Err(HttpError::Transport(_))));
        assert!(log.lock().unwrap().is_empty(), "terminal must not run");
    }

    #[tokio::test]
    async fn test_decorator_can_retry() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let flaky = {
            let attempts = Arc::clone(&attempts);
            Invoker::new(tower::service_fn(move |_req: Request<Full<Bytes>>| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(HttpError::Transport("connection reset".into()))
                    } else {
                        Ok(Response::new(full_body("ok")))
                    }
                }
            }))
        };

        let retry_once = Decorator::new(|inner: Invoker| {
            Invoker::new(tower::service_fn(move |req: Request<Full<Bytes>>| {
                let inner = inner.clone();
                async move {
                    let (parts, body) = req.into_parts();
                    let first = Request::from_parts(parts.clone(), body.clone());
                    match inner.clone().oneshot(first).await {
                        Ok(response) => Ok(response),
                        Err(_) => inner.oneshot(Request::from_parts(parts, body)).await,
                    }
                }
            }))
        });

        let invoker = chain(flaky, &[retry_once]);
        let response = invoker.oneshot(request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_decorator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Decorator>();
        assert_send_sync::<Invoker>();
    }
}
