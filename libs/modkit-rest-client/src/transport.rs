//! Default transport: pooled hyper client over rustls.
//!
//! Stack (outer to inner): Timeout -> Decompression -> hyper client.
//! The limit applied by the client's bounded read therefore counts
//! decompressed bytes. Redirects are not followed.

use crate::config::{RestClientConfig, TlsRootConfig, TransportSecurity};
use crate::error::HttpError;
use crate::layers::Invoker;
use crate::response::ResponseBody;
use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls_pki_types::CertificateDer;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tower::timeout::TimeoutLayer;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

/// Build the default terminal invoker from `config`.
///
/// # Errors
/// Returns `HttpError::Tls` if the TLS connector cannot be set up (for example
/// no native roots are available with `TlsRootConfig::Native`).
pub fn default_transport(config: &RestClientConfig) -> Result<Invoker, HttpError> {
    let timeout = config.request_timeout;
    let https = build_https_connector(config.tls_roots, config.transport)?;

    let mut client_builder = Client::builder(TokioExecutor::new());
    // pool_timer is required for pool_idle_timeout to take effect
    client_builder
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .http2_only(false);
    if let Some(idle_timeout) = config.pool_idle_timeout {
        client_builder.pool_idle_timeout(idle_timeout);
    }
    let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

    let service = ServiceBuilder::new()
        .layer(TimeoutLayer::new(timeout))
        .layer(DecompressionLayer::new())
        .service(hyper_client)
        .map_response(map_decompression_response)
        .map_err(move |e: tower::BoxError| map_tower_error(e, timeout));

    Ok(Invoker::new(service))
}

/// Map tower errors to `HttpError`, keeping typed errors raised further in.
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }

    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

/// Box the decompression body into [`ResponseBody`].
fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let boxed_body: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed_body)
}

/// HTTPS connector with ALPN for h2 and http/1.1.
fn build_https_connector(
    tls_roots: TlsRootConfig,
    transport: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let allow_http = transport == TransportSecurity::AllowInsecureHttp;

    let builder = match tls_roots {
        TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(crypto_provider())
            .map_err(|e| HttpError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => {
            let client_config =
                native_roots_client_config().map_err(|e| HttpError::Tls(e.into()))?;
            hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(client_config)
        }
    };

    let connector = if allow_http {
        builder.https_or_http().enable_all_versions().build()
    } else {
        builder.https_only().enable_all_versions().build()
    };
    Ok(connector)
}

/// Native roots, loaded once per process. Empty means none were found.
static NATIVE_ROOTS: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS
        .get_or_init(|| {
            let result = rustls_native_certs::load_native_certs();
            for err in &result.errors {
                tracing::warn!(error = %err, "error loading native root certificate");
            }
            if result.certs.is_empty() {
                tracing::warn!("no native root CA certificates found");
            } else {
                tracing::debug!(count = result.certs.len(), "loaded native root certificates");
            }
            result.certs
        })
        .as_slice()
}

/// Globally installed provider if any, aws-lc-rs otherwise (not installed globally).
fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn native_roots_client_config() -> Result<rustls::ClientConfig, String> {
    let certs = native_root_certs();
    if certs.is_empty() {
        return Err("no native root CA certificates found in OS certificate store".to_owned());
    }

    let mut root_store = rustls::RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(certs.iter().cloned());
    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }
    if added == 0 {
        return Err(format!(
            "no valid native root CA certificates parsed (found {}, all {ignored} failed to parse)",
            certs.len()
        ));
    }

    let config = rustls::ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| format!("failed to set TLS protocol versions: {e}"))?
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(config)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_map_tower_error_timeout() {
        let err: tower::BoxError = Box::new(tower::timeout::error::Elapsed::new());
        assert!(matches!(
            map_tower_error(err, Duration::from_secs(3)),
            HttpError::Timeout(d) if d == Duration::from_secs(3)
        ));
    }

    #[test]
    fn test_map_tower_error_keeps_http_error() {
        let err: tower::BoxError = Box::new(HttpError::Cancelled);
        assert!(matches!(
            map_tower_error(err, Duration::from_secs(1)),
            HttpError::Cancelled
        ));
    }

    #[test]
    fn test_map_tower_error_wraps_other() {
        let err: tower::BoxError = "connection refused".into();
        assert!(matches!(
            map_tower_error(err, Duration::from_secs(1)),
            HttpError::Transport(_)
        ));
    }

    #[tokio::test]
    async fn test_default_transport_builds_with_webpki_roots() {
        let config = RestClientConfig::for_testing();
        assert!(default_transport(&config).is_ok());
    }

    #[test]
    fn test_native_roots_cached() {
        let first = native_root_certs();
        let second = native_root_certs();
        assert!(std::ptr::eq(first, second), "should return same slice");
    }
}
