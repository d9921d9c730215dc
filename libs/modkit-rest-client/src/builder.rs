use crate::client::RestClient;
use crate::config::{RestClientConfig, TlsRootConfig, TransportSecurity};
use crate::error::{HttpError, InvalidUriKind};
use crate::layers::{Decorator, Invoker};
use crate::transport::default_transport;
use http::HeaderValue;
use std::sync::Arc;
use std::time::Duration;

/// Builder for a [`RestClient`].
///
/// Everything set here is fixed for the lifetime of the built client.
///
/// # Example
///
/// ```ignore
/// let client = RestClient::builder("https://api.example.com/v1")
///     .user_agent("billing-sync/2.3")
///     .decorator(Decorator::from_layer(TraceLayer::new()))
///     .decorator(Decorator::from_layer(SetHeaderLayer::bearer_auth(&token)?))
///     .max_body_size(1024 * 1024)
///     .build()?;
/// ```
#[must_use = "RestClientBuilder does nothing until .build() is called"]
pub struct RestClientBuilder {
    base_url: String,
    config: RestClientConfig,
    transport: Option<Invoker>,
    decorators: Vec<Decorator>,
}

impl RestClientBuilder {
    /// Builder with the default configuration
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_config(base_url, RestClientConfig::default())
    }

    /// Builder with a specific configuration
    pub fn with_config(base_url: impl Into<String>, config: RestClientConfig) -> Self {
        Self {
            base_url: base_url.into(),
            config,
            transport: None,
            decorators: Vec::new(),
        }
    }

    /// Use `transport` as the terminal invoker instead of the default pooled client.
    ///
    /// Timeout, TLS, pool and transport security settings only configure the
    /// default transport and are ignored once a transport is injected.
    pub fn transport(mut self, transport: Invoker) -> Self {
        self.transport = Some(transport);
        self
    }

    /// User-Agent forced on every request
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Replace the decorator list. `decorators[0]` is outermost.
    pub fn decorators(mut self, decorators: Vec<Decorator>) -> Self {
        self.decorators = decorators;
        self
    }

    /// Append a decorator inside the ones already added
    pub fn decorator(mut self, decorator: Decorator) -> Self {
        self.decorators.push(decorator);
        self
    }

    /// Maximum response body size in bytes; `0` reads bodies unbounded
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Per-attempt timeout of the default transport
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// TLS root certificate strategy of the default transport
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Transport security mode of the default transport
    ///
    /// Use `TransportSecurity::AllowInsecureHttp` only for testing with mock servers.
    pub fn transport_security(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Allow plain `http://` base addresses (for testing only)
    ///
    /// Equivalent to `.transport_security(TransportSecurity::AllowInsecureHttp)`.
    /// Only available in debug builds or with the `allow-insecure-http` feature.
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "modkit_rest_client::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    /// Idle timeout of pooled connections (`None` keeps hyper-util's default)
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Maximum idle pooled connections per host; `0` disables reuse
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Validate the configuration and build the client
    ///
    /// # Errors
    /// - `HttpError::InvalidUri` if the base address is empty, malformed, or
    ///   lacks a scheme or host
    /// - `HttpError::InvalidScheme` if the default transport is `TlsOnly` and
    ///   the base address is not `https://`
    /// - `HttpError::InvalidHeaderValue` if the user agent is not a valid header value
    /// - `HttpError::Tls` if the default transport cannot set up TLS
    pub fn build(self) -> Result<RestClient, HttpError> {
        let tls_only =
            self.transport.is_none() && self.config.transport == TransportSecurity::TlsOnly;
        if self.transport.is_none() && !tls_only {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        validate_base_url(&self.base_url, tls_only)?;
        let user_agent = HeaderValue::from_str(&self.config.user_agent)?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(&self.config)?,
        };

        Ok(RestClient {
            base_url: Arc::from(self.base_url),
            transport,
            decorators: Arc::from(self.decorators),
            max_body_size: self.config.max_body_size,
            user_agent,
            tls_only,
        })
    }
}

/// Check that `url` is an absolute `http(s)` address.
///
/// With `tls_only` set, only `https://` passes.
pub(crate) fn validate_base_url(url: &str, tls_only: bool) -> Result<(), HttpError> {
    let uri: http::Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;

    if uri.authority().is_none() {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }

    match uri.scheme_str() {
        Some("https") => Ok(()),
        Some("http") if !tls_only => Ok(()),
        Some("http") => Err(HttpError::InvalidScheme {
            scheme: "http".to_owned(),
            reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
        }),
        Some(scheme) => Err(HttpError::InvalidScheme {
            scheme: scheme.to_owned(),
            reason: "only http:// and https:// schemes are supported".to_owned(),
        }),
        None => Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingScheme,
            reason: "missing scheme".to_owned(),
        }),
    }
}
