use crate::client::cancellable;
use crate::error::{HttpError, InvalidUriKind};
use crate::multipart::{MultipartBody, encode_multipart};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Content type used when the request carries no structured payload
pub const DEFAULT_CONTENT_TYPE: &str = "application/text";
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const XML_CONTENT_TYPE: &str = "application/xml";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Wire encoding of a structured body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Json,
    Xml,
}

impl PayloadFormat {
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => JSON_CONTENT_TYPE,
            Self::Xml => XML_CONTENT_TYPE,
        }
    }
}

/// Per-call option.
///
/// Options are applied in order: `Json` / `Xml` are last-writer-wins, headers
/// are merged with later values overwriting earlier ones (names are
/// case-insensitive), queries are merged by name.
#[derive(Debug, Clone)]
pub enum RequestOption {
    /// Encode structured bodies as JSON
    Json,
    /// Encode structured bodies as indented XML
    Xml,
    /// Extra request headers
    Headers(HeaderMap),
    /// Extra query parameters, one value per name
    Queries(BTreeMap<String, String>),
}

impl RequestOption {
    /// Headers from string pairs
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderName` / `HttpError::InvalidHeaderValue`
    /// for the first pair that is not a valid header.
    pub fn headers<I, K, V>(pairs: I) -> Result<Self, HttpError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::try_from(name.as_ref())?,
                HeaderValue::from_str(value.as_ref())?,
            );
        }
        Ok(Self::Headers(map))
    }

    /// Single header
    ///
    /// # Errors
    /// Same as [`RequestOption::headers`].
    pub fn header(name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self, HttpError> {
        Self::headers([(name, value)])
    }

    /// Query parameters from string pairs
    pub fn queries<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Queries(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Options folded into their effective values for one call
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub format: Option<PayloadFormat>,
    pub headers: HeaderMap,
    pub queries: BTreeMap<String, String>,
}

impl RequestConfig {
    #[must_use]
    pub fn from_options(options: impl IntoIterator<Item = RequestOption>) -> Self {
        let mut config = Self::default();
        for option in options {
            config.apply(option);
        }
        config
    }

    pub fn apply(&mut self, option: RequestOption) {
        match option {
            RequestOption::Json => self.format = Some(PayloadFormat::Json),
            RequestOption::Xml => self.format = Some(PayloadFormat::Xml),
            RequestOption::Headers(headers) => overwrite_headers(&mut self.headers, headers),
            RequestOption::Queries(queries) => self.queries.extend(queries),
        }
    }
}

/// Copy `src` into `dst`, one value per name, the last value of a name winning.
///
/// `HeaderMap` iteration yields `None` for every value after the first of a name.
fn overwrite_headers(dst: &mut HeaderMap, src: HeaderMap) {
    let mut current: Option<HeaderName> = None;
    for (name, value) in src {
        if let Some(name) = name {
            current = Some(name);
        }
        if let Some(name) = &current {
            dst.insert(name.clone(), value);
        }
    }
}

type EncodeFn<'a> = Box<dyn FnOnce(PayloadFormat) -> Result<Bytes, HttpError> + Send + 'a>;

/// A borrowed serializable value, encoded once the format is known
pub struct StructuredBody<'a>(EncodeFn<'a>);

impl StructuredBody<'_> {
    fn encode(self, format: PayloadFormat) -> Result<Bytes, HttpError> {
        (self.0)(format)
    }
}

/// Request payload.
///
/// Raw bytes and text go out verbatim. Multipart bodies are encoded with a
/// fresh boundary. Structured values are serialized as JSON or XML according
/// to the call's options (JSON when no format is selected).
#[derive(Default)]
pub enum Body<'a> {
    #[default]
    Empty,
    Bytes(Bytes),
    Text(String),
    Multipart(MultipartBody<'a>),
    Structured(StructuredBody<'a>),
}

impl<'a> Body<'a> {
    /// Structured body borrowing `value` until the request is built
    pub fn structured<T>(value: &'a T) -> Self
    where
        T: Serialize + Sync + ?Sized,
    {
        Self::Structured(StructuredBody(Box::new(move |format| match format {
            PayloadFormat::Json => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(HttpError::JsonEncode),
            PayloadFormat::Xml => to_indented_xml(value).map(Bytes::from),
        })))
    }

    /// `application/x-www-form-urlencoded` payload
    ///
    /// # Errors
    /// Returns `HttpError::FormEncode` if `form` is not a flat map or sequence
    /// of pairs.
    pub fn form<T: Serialize + ?Sized>(form: &T) -> Result<Self, HttpError> {
        Ok(Self::Text(serde_urlencoded::to_string(form)?))
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "text",
            Self::Multipart(_) => "multipart",
            Self::Structured(_) => "structured",
        }
    }
}

impl fmt::Debug for Body<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Text(t) => f.debug_tuple("Text").field(&t.len()).finish(),
            Self::Multipart(m) => f.debug_tuple("Multipart").field(m).finish(),
            Self::Empty | Self::Structured(_) => f.write_str(self.kind()),
        }
    }
}

impl From<Bytes> for Body<'_> {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body<'_> {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for Body<'_> {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Body<'_> {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl<'a> From<MultipartBody<'a>> for Body<'a> {
    fn from(body: MultipartBody<'a>) -> Self {
        Self::Multipart(body)
    }
}

fn to_indented_xml<T: Serialize + ?Sized>(value: &T) -> Result<String, HttpError> {
    let mut out = String::new();
    let mut serializer = quick_xml::se::Serializer::new(&mut out);
    serializer.indent(' ', 1);
    value.serialize(serializer)?;
    Ok(out)
}

/// Build the outgoing request.
///
/// `path` is appended to `base_url` verbatim. Headers are assembled in this
/// order, each step overwriting the previous one: default content type (or the
/// structured format's), multipart content type with boundary, caller headers.
/// The user agent is always the client's. `ctx` travels in the request
/// extensions and aborts reading multipart sources with `HttpError::Cancelled`.
pub(crate) async fn build_request(
    base_url: &str,
    user_agent: &HeaderValue,
    ctx: &CancellationToken,
    path: &str,
    method: &str,
    body: Body<'_>,
    config: RequestConfig,
) -> Result<Request<Bytes>, HttpError> {
    let method = Method::from_bytes(method.as_bytes())?;

    let mut url = format!("{base_url}{path}");
    if !config.queries.is_empty() {
        let query = serde_urlencoded::to_string(&config.queries)?;
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&query);
    }
    let uri = http::Uri::try_from(url.as_str()).map_err(|e| HttpError::InvalidUri {
        url: url.clone(),
        kind: InvalidUriKind::ParseError,
        reason: e.to_string(),
    })?;

    let structured = matches!(body, Body::Structured(_));
    let format = config
        .format
        .or(structured.then_some(PayloadFormat::Json));

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(format.map_or(DEFAULT_CONTENT_TYPE, PayloadFormat::content_type)),
    );

    let payload = match body {
        Body::Empty => Bytes::new(),
        Body::Bytes(bytes) => bytes,
        Body::Text(text) => Bytes::from(text),
        Body::Multipart(multipart) => {
            let encoded = cancellable(ctx, encode_multipart(multipart)).await?;
            headers.insert(CONTENT_TYPE, HeaderValue::try_from(encoded.content_type)?);
            encoded.body
        }
        Body::Structured(value) => value.encode(format.unwrap_or(PayloadFormat::Json))?,
    };

    overwrite_headers(&mut headers, config.headers);
    headers.insert(USER_AGENT, user_agent.clone());

    let mut request = Request::builder().method(method).uri(uri).body(payload)?;
    *request.headers_mut() = headers;
    request.extensions_mut().insert(ctx.clone());
    Ok(request)
}
