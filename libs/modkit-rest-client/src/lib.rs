#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! REST client for `ModKit`
//!
//! A thin call layer over an injectable transport:
//! - Requests built from a base address, a path, a method and a body (empty,
//!   raw bytes, text, `multipart/form-data`, or any `serde` value as JSON/XML)
//! - Per-call options: JSON/XML encoding, extra headers, query parameters
//! - An ordered decorator chain around the transport (tracing, auth, retries)
//! - Size-bounded response reads
//! - Content-negotiated decoding into a success target or an error target
//!
//! The default transport is a pooled hyper client over rustls (HTTPS only by
//! default) with transparent gzip/brotli/deflate decompression.
//!
//! # Status handling
//!
//! An HTTP error status is not a call failure. A JSON or XML error payload is
//! decoded into the caller's error target and the call returns `Ok`; the
//! status is on the returned [`Response`]. Calls fail ([`CallError`]) for
//! build, transport, cancellation, size-limit and decode errors, and for
//! payloads whose content type cannot be decoded.
//!
//! # Example
//!
//! ```ignore
//! use modkit_rest_client::{Body, RequestOption, RestClient};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = RestClient::builder("https://api.example.com")
//!     .user_agent("inventory/1.4")
//!     .build()?;
//!
//! let ctx = CancellationToken::new();
//! let mut created = Item::default();
//! let mut problem = Problem::default();
//! let resp = client
//!     .post(&ctx, "/items", Body::structured(&new_item), &mut created, &mut problem, [
//!         RequestOption::Xml,
//!         RequestOption::queries([("dry_run", "false")]),
//!     ])
//!     .await?;
//! ```

mod builder;
mod client;
mod codec;
mod config;
mod error;
mod layers;
mod limit;
mod multipart;
mod request;
mod response;
mod transport;

pub use builder::RestClientBuilder;
pub use client::RestClient;
pub use codec::{ContentKind, decode_response};
pub use config::{
    DEFAULT_MAX_BODY_SIZE, DEFAULT_USER_AGENT, RestClientConfig, TlsRootConfig, TransportSecurity,
};
pub use error::{CallError, HttpError, InvalidUriKind};
pub use layers::{
    Decorator, Invoker, SetHeaderLayer, SetHeaderService, TraceLayer, TraceService, chain,
};
pub use limit::{READ_CHUNK_SIZE, read_all_with_limit, read_body_with_limit};
pub use multipart::{
    EncodedMultipart, MULTIPART_FORM_DATA, MultipartBody, MultipartField, PartSource,
    encode_multipart,
};
pub use request::{
    Body, DEFAULT_CONTENT_TYPE, FORM_CONTENT_TYPE, JSON_CONTENT_TYPE, PayloadFormat,
    RequestConfig, RequestOption, StructuredBody, XML_CONTENT_TYPE,
};
pub use response::{Response, ResponseBody, full_body};
pub use transport::default_transport;
pub use tokio_util::sync::CancellationToken;
