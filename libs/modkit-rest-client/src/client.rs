use crate::builder::{RestClientBuilder, validate_base_url};
use crate::codec::decode_response;
use crate::error::{CallError, HttpError};
use crate::layers::{Decorator, Invoker, chain, sanitized_url};
use crate::limit::read_body_with_limit;
use crate::request::{Body, FORM_CONTENT_TYPE, RequestConfig, RequestOption, build_request};
use crate::response::{Response, ResponseBody};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Request};
use http_body_util::Full;
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// REST client bound to one base address.
///
/// A call builds the request, runs it through the decorator chain, reads the
/// body up to the size limit and decodes it into the caller's result or error
/// target according to status and content type.
///
/// # Thread Safety
///
/// `RestClient` is `Clone + Send + Sync` and immutable once built: base
/// address, transport, decorator order, size limit and user agent never change.
/// Concurrent calls share nothing mutable.
///
/// # Example
///
/// ```ignore
/// let client = RestClient::builder("https://api.example.com").build()?;
/// let ctx = CancellationToken::new();
///
/// let mut user = User::default();
/// let mut problem = Problem::default();
/// match client.get(&ctx, "/users/42", &mut user, &mut problem, []).await {
///     Ok(resp) if resp.status() == Some(StatusCode::NOT_FOUND) => println!("{}", problem.title),
///     Ok(_) => println!("hello {}", user.name),
///     Err(e) => eprintln!("call failed: {e}"),
/// }
/// ```
#[derive(Clone)]
pub struct RestClient {
    pub(crate) base_url: Arc<str>,
    pub(crate) transport: Invoker,
    pub(crate) decorators: Arc<[Decorator]>,
    pub(crate) max_body_size: usize,
    pub(crate) user_agent: HeaderValue,
    pub(crate) tls_only: bool,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("decorators", &self.decorators.len())
            .field("max_body_size", &self.max_body_size)
            .field("user_agent", &self.user_agent)
            .field("tls_only", &self.tls_only)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Client with the default configuration and transport
    ///
    /// # Errors
    /// Same as [`RestClientBuilder::build`].
    pub fn new(base_url: impl Into<String>) -> Result<Self, HttpError> {
        RestClientBuilder::new(base_url).build()
    }

    /// Create a builder for configuring the client
    pub fn builder(base_url: impl Into<String>) -> RestClientBuilder {
        RestClientBuilder::new(base_url)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// A client for another base address sharing everything else
    ///
    /// # Errors
    /// Returns `HttpError::InvalidUri` / `HttpError::InvalidScheme` under the
    /// same rules as [`RestClientBuilder::build`].
    pub fn with_base_url(&self, base_url: impl Into<String>) -> Result<Self, HttpError> {
        let base_url = base_url.into();
        validate_base_url(&base_url, self.tls_only)?;
        Ok(Self {
            base_url: Arc::from(base_url),
            ..self.clone()
        })
    }

    /// `GET path`
    ///
    /// # Errors
    /// See [`RestClient::execute`].
    pub async fn get<R, E>(
        &self,
        ctx: &CancellationToken,
        path: &str,
        result: &mut R,
        error: &mut E,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response, CallError>
    where
        R: DeserializeOwned,
        E: DeserializeOwned,
    {
        self.execute(ctx, path, "GET", Body::Empty, result, error, options)
            .await
    }

    /// `HEAD path`; only an error payload can be decoded
    ///
    /// # Errors
    /// See [`RestClient::execute`].
    pub async fn head<E>(
        &self,
        ctx: &CancellationToken,
        path: &str,
        error: &mut E,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response, CallError>
    where
        E: DeserializeOwned,
    {
        let mut ignored = IgnoredAny;
        self.execute(ctx, path, "HEAD", Body::Empty, &mut ignored, error, options)
            .await
    }

    /// `POST path`
    ///
    /// # Errors
    /// See [`RestClient::execute`].
    pub async fn post<'b, R, E>(
        &self,
        ctx: &CancellationToken,
        path: &str,
        body: impl Into<Body<'b>>,
        result: &mut R,
        error: &mut E,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response, CallError>
    where
        R: DeserializeOwned,
        E: DeserializeOwned,
    {
        self.execute(ctx, path, "POST", body, result, error, options)
            .await
    }

    /// `POST path` with `form` as an `application/x-www-form-urlencoded` body
    ///
    /// # Errors
    /// `HttpError::FormEncode` if `form` is not a flat list of pairs, otherwise
    /// see [`RestClient::execute`].
    pub async fn post_form<F, R, E>(
        &self,
        ctx: &CancellationToken,
        path: &str,
        form: &F,
        result: &mut R,
        error: &mut E,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response, CallError>
    where
        F: Serialize + ?Sized,
        R: DeserializeOwned,
        E: DeserializeOwned,
    {
        let body = Body::form(form).map_err(|e| CallError::new(e, Response::default()))?;
        let mut form_header = HeaderMap::new();
        form_header.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        let options = options
            .into_iter()
            .chain(std::iter::once(RequestOption::Headers(form_header)));
        self.execute(ctx, path, "POST", body, result, error, options)
            .await
    }

    /// `PUT path`
    ///
    /// # Errors
    /// See [`RestClient::execute`].
    pub async fn put<'b, R, E>(
        &self,
        ctx: &CancellationToken,
        path: &str,
        body: impl Into<Body<'b>>,
        result: &mut R,
        error: &mut E,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response, CallError>
    where
        R: DeserializeOwned,
        E: DeserializeOwned,
    {
        self.execute(ctx, path, "PUT", body, result, error, options)
            .await
    }

    /// `PATCH path`
    ///
    /// # Errors
    /// See [`RestClient::execute`].
    pub async fn patch<'b, R, E>(
        &self,
        ctx: &CancellationToken,
        path: &str,
        body: impl Into<Body<'b>>,
        result: &mut R,
        error: &mut E,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response, CallError>
    where
        R: DeserializeOwned,
        E: DeserializeOwned,
    {
        self.execute(ctx, path, "PATCH", body, result, error, options)
            .await
    }

    /// `DELETE path`
    ///
    /// # Errors
    /// See [`RestClient::execute`].
    pub async fn delete<'b, R, E>(
        &self,
        ctx: &CancellationToken,
        path: &str,
        body: impl Into<Body<'b>>,
        result: &mut R,
        error: &mut E,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response, CallError>
    where
        R: DeserializeOwned,
        E: DeserializeOwned,
    {
        self.execute(ctx, path, "DELETE", body, result, error, options)
            .await
    }

    /// Run a full call with any method.
    ///
    /// An HTTP error status is not a call failure: a JSON or XML error payload
    /// is decoded into `error` and the call succeeds. Inspect the returned
    /// [`Response`] for the status.
    ///
    /// # Errors
    /// Returns a [`CallError`] carrying whatever was produced before the
    /// failure:
    /// - request build errors (method, URL, body encoding): empty response
    /// - transport, decorator and cancellation errors: request only
    /// - size limit, body read and cancellation errors while reading: request
    ///   plus the response status and headers with an empty body
    /// - decode errors: request and buffered response
    #[allow(clippy::too_many_arguments)]
    pub async fn execute<'b, R, E>(
        &self,
        ctx: &CancellationToken,
        path: &str,
        method: &str,
        body: impl Into<Body<'b>>,
        result: &mut R,
        error: &mut E,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Response, CallError>
    where
        R: DeserializeOwned,
        E: DeserializeOwned,
    {
        let request = self
            .new_request(ctx, path, method, body, options)
            .await
            .map_err(|e| CallError::new(e, Response::default()))?;

        let mut response = Response {
            request: Some(request.clone()),
            raw_response: None,
        };

        tracing::debug!(
            method = %request.method(),
            url = %sanitized_url(request.uri()),
            "sending request"
        );

        let raw = match self.dispatch(ctx, request).await {
            Ok(raw) => raw,
            Err(e) => return Err(CallError::new(e, response)),
        };

        let (parts, body) = raw.into_parts();
        let payload = match cancellable(ctx, read_body_with_limit(body, self.max_body_size)).await
        {
            Ok(payload) => payload,
            Err(e) => {
                response.raw_response = Some(http::Response::from_parts(parts, Bytes::new()));
                return Err(CallError::new(e, response));
            }
        };
        let raw = http::Response::from_parts(parts, payload);

        let content_type = raw
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        tracing::debug!(
            status = raw.status().as_u16(),
            content_type = content_type.as_deref().unwrap_or(""),
            bytes = raw.body().len(),
            "response received"
        );

        let decoded = decode_response(
            raw.status(),
            content_type.as_deref(),
            raw.body(),
            result,
            error,
        );
        response.raw_response = Some(raw);

        match decoded {
            Ok(()) => Ok(response),
            Err(e) => Err(CallError::new(e, response)),
        }
    }

    /// Build a request without sending it.
    ///
    /// The request carries `ctx` in its extensions; [`RestClient::send`]
    /// honours it.
    ///
    /// # Errors
    /// `HttpError::InvalidMethod`, `HttpError::InvalidUri`, body encoding
    /// errors (`JsonEncode`, `XmlEncode`, `Multipart`) and invalid header errors.
    pub async fn new_request<'b>(
        &self,
        ctx: &CancellationToken,
        path: &str,
        method: &str,
        body: impl Into<Body<'b>>,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Result<Request<Bytes>, HttpError> {
        build_request(
            &self.base_url,
            &self.user_agent,
            ctx,
            path,
            method,
            body.into(),
            RequestConfig::from_options(options),
        )
        .await
    }

    /// Run `request` through the decorator chain and return the streaming response.
    ///
    /// No size limit or decoding is applied. A [`CancellationToken`] in the
    /// request extensions cancels the exchange.
    ///
    /// # Errors
    /// Transport and decorator errors, or `HttpError::Cancelled`.
    pub async fn send(
        &self,
        request: Request<Bytes>,
    ) -> Result<http::Response<ResponseBody>, HttpError> {
        let ctx = request
            .extensions()
            .get::<CancellationToken>()
            .cloned()
            .unwrap_or_default();
        self.dispatch(&ctx, request).await
    }

    async fn dispatch(
        &self,
        ctx: &CancellationToken,
        request: Request<Bytes>,
    ) -> Result<http::Response<ResponseBody>, HttpError> {
        let invoker = chain(self.transport.clone(), &self.decorators);
        cancellable(ctx, invoker.oneshot(request.map(Full::new))).await
    }
}

pub(crate) async fn cancellable<T, F>(ctx: &CancellationToken, fut: F) -> Result<T, HttpError>
where
    F: Future<Output = Result<T, HttpError>>,
{
    tokio::select! {
        biased;
        () = ctx.cancelled() => Err(HttpError::Cancelled),
        result = fut => result,
    }
}
