//! `multipart/form-data` request bodies.
//!
//! Parts are written in insertion order. Each source is read exactly once,
//! sequentially, while the body is encoded; encoding consumes the fields.

use crate::error::HttpError;
use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default media type of a multipart body
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// Byte source of a multipart field
pub type PartSource<'a> = Box<dyn AsyncRead + Send + Unpin + 'a>;

/// One named part of a multipart body.
///
/// # Example
///
/// ```ignore
/// let manifest = MultipartField::new("uploadManifest1", r#"{"input": {"name": "doc"}}"#)
///     .filename("upload-file-1.json")
///     .content_type("application/json");
///
/// let attachment = MultipartField::from_reader("attachment", tokio::fs::File::open(path).await?)
///     .content_id("up");
/// ```
pub struct MultipartField<'a> {
    param: String,
    filename: Option<String>,
    content_type: Option<String>,
    content_id: Option<String>,
    source: PartSource<'a>,
}

impl<'a> MultipartField<'a> {
    /// Field backed by in-memory data
    #[must_use]
    pub fn new(param: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::from_reader(param, std::io::Cursor::new(data.into()))
    }

    /// Field streamed from any async reader
    #[must_use]
    pub fn from_reader<R>(param: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'a,
    {
        Self {
            param: param.into(),
            filename: None,
            content_type: None,
            content_id: None,
            source: Box::new(reader),
        }
    }

    /// Adds `filename="..."` to the part's `Content-Disposition`
    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Sets the part's `Content-Type` header
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the part's `Content-ID` header
    #[must_use]
    pub fn content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    /// The form parameter name
    #[must_use]
    pub fn param(&self) -> &str {
        &self.param
    }

    fn header_block(&self) -> Result<String, HttpError> {
        for value in [
            Some(self.param.as_str()),
            self.filename.as_deref(),
            self.content_type.as_deref(),
            self.content_id.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            if value.contains(['\r', '\n']) {
                return Err(HttpError::Multipart {
                    param: self.param.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "line break in part header",
                    ),
                });
            }
        }

        let mut block = format!(
            "Content-Disposition: form-data; name=\"{}\"",
            escape_quotes(&self.param)
        );
        if let Some(filename) = &self.filename {
            block.push_str("; filename=\"");
            block.push_str(&escape_quotes(filename));
            block.push('"');
        }
        block.push_str("\r\n");
        if let Some(content_type) = &self.content_type {
            block.push_str("Content-Type: ");
            block.push_str(content_type);
            block.push_str("\r\n");
        }
        if let Some(content_id) = &self.content_id {
            block.push_str("Content-ID: ");
            block.push_str(content_id);
            block.push_str("\r\n");
        }
        block.push_str("\r\n");
        Ok(block)
    }
}

impl fmt::Debug for MultipartField<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartField")
            .field("param", &self.param)
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("content_id", &self.content_id)
            .finish_non_exhaustive()
    }
}

/// Ordered list of multipart fields.
///
/// Insertion order is the wire order. Duplicate parameter names are allowed
/// and encoded as separate parts.
#[derive(Debug)]
pub struct MultipartBody<'a> {
    media_type: String,
    fields: Vec<MultipartField<'a>>,
}

impl Default for MultipartBody<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> MultipartBody<'a> {
    /// Empty `multipart/form-data` body
    #[must_use]
    pub fn new() -> Self {
        Self {
            media_type: MULTIPART_FORM_DATA.to_owned(),
            fields: Vec::new(),
        }
    }

    /// Use another multipart media type (e.g. `multipart/related`)
    #[must_use]
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    /// Append a field
    #[must_use]
    pub fn field(mut self, field: MultipartField<'a>) -> Self {
        self.fields.push(field);
        self
    }

    /// Append a field in place
    pub fn push(&mut self, field: MultipartField<'a>) {
        self.fields.push(field);
    }

    /// Declared media type (without boundary)
    #[must_use]
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Fields in wire order
    #[must_use]
    pub fn fields(&self) -> &[MultipartField<'a>] {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<'a> Extend<MultipartField<'a>> for MultipartBody<'a> {
    fn extend<I: IntoIterator<Item = MultipartField<'a>>>(&mut self, iter: I) {
        self.fields.extend(iter);
    }
}

/// Encoded multipart payload
#[derive(Debug, Clone)]
pub struct EncodedMultipart {
    /// Boundary token separating the parts
    pub boundary: String,
    /// `Content-Type` header value: media type plus boundary parameter
    pub content_type: String,
    /// The complete body
    pub body: Bytes,
}

/// Encode `body` with a freshly generated boundary.
///
/// # Errors
///
/// Returns `HttpError::Multipart` if a field's source fails or a part header
/// value contains a line break.
pub async fn encode_multipart(body: MultipartBody<'_>) -> Result<EncodedMultipart, HttpError> {
    let boundary = random_boundary();
    let MultipartBody { media_type, fields } = body;

    let mut out = BytesMut::new();
    for (index, mut field) in fields.into_iter().enumerate() {
        let header = field.header_block()?;
        if index > 0 {
            out.put_slice(b"\r\n");
        }
        out.put_slice(b"--");
        out.put_slice(boundary.as_bytes());
        out.put_slice(b"\r\n");
        out.put_slice(header.as_bytes());

        let mut data = Vec::new();
        field
            .source
            .read_to_end(&mut data)
            .await
            .map_err(|source| HttpError::Multipart {
                param: field.param.clone(),
                source,
            })?;
        out.put_slice(&data);
    }
    if !out.is_empty() {
        out.put_slice(b"\r\n");
    }
    out.put_slice(b"--");
    out.put_slice(boundary.as_bytes());
    out.put_slice(b"--\r\n");

    Ok(EncodedMultipart {
        content_type: format!("{media_type}; boundary={boundary}"),
        boundary,
        body: out.freeze(),
    })
}

/// 30 random bytes, hex encoded
fn random_boundary() -> String {
    let mut raw = [0u8; 30];
    rand::rng().fill(&mut raw[..]);
    hex::encode(raw)
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    #[test]
    fn test_escape_quotes() {
        assert_eq!(escape_quotes(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape_quotes("plain.txt"), "plain.txt");
    }

    #[test]
    fn test_boundary_is_fresh_hex() {
        let a = random_boundary();
        let b = random_boundary();
        assert_eq!(a.len(), 60);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_header_block_minimal() {
        let field = MultipartField::new("name", "value");
        assert_eq!(
            field.header_block().unwrap(),
            "Content-Disposition: form-data; name=\"name\"\r\n\r\n"
        );
    }

    #[test]
    fn test_header_block_full() {
        let field = MultipartField::new("doc", "{}")
            .filename("my \"file\".json")
            .content_type("application/json")
            .content_id("42");
        assert_eq!(
            field.header_block().unwrap(),
            "Content-Disposition: form-data; name=\"doc\"; filename=\"my \\\"file\\\".json\"\r\n\
             Content-Type: application/json\r\n\
             Content-ID: 42\r\n\r\n"
        );
    }

    #[test]
    fn test_header_block_rejects_line_breaks() {
        let field = MultipartField::new("doc", "x").filename("evil\r\nX-Injected: 1");
        assert!(matches!(
            field.header_block(),
            Err(HttpError::Multipart { .. })
        ));
    }

    #[tokio::test]
    async fn test_encode_exact_layout() {
        let body = MultipartBody::new()
            .field(MultipartField::new("a", "1"))
            .field(MultipartField::new("b", "22").content_type("text/plain"));

        let encoded = encode_multipart(body).await.unwrap();
        let b = &encoded.boundary;
        let expected = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\
             \r\n--{b}\r\nContent-Disposition: form-data; name=\"b\"\r\nContent-Type: text/plain\r\n\r\n22\
             \r\n--{b}--\r\n"
        );
        assert_eq!(String::from_utf8(encoded.body.to_vec()).unwrap(), expected);
        assert_eq!(encoded.content_type, format!("multipart/form-data; boundary={b}"));
    }

    #[tokio::test]
    async fn test_encode_empty_body() {
        let encoded = encode_multipart(MultipartBody::new()).await.unwrap();
        assert_eq!(
            String::from_utf8(encoded.body.to_vec()).unwrap(),
            format!("--{}--\r\n", encoded.boundary)
        );
    }

    #[tokio::test]
    async fn test_custom_media_type() {
        let body = MultipartBody::new()
            .with_media_type("multipart/related")
            .field(MultipartField::new("a", "1"));
        let encoded = encode_multipart(body).await.unwrap();
        assert!(encoded.content_type.starts_with("multipart/related; boundary="));
    }

    #[test]
    fn test_push_and_extend_keep_order() {
        let mut body = MultipartBody::new();
        assert!(body.is_empty());
        body.push(MultipartField::new("first", "1"));
        body.extend([
            MultipartField::new("second", "2"),
            MultipartField::new("third", "3"),
        ]);

        let params: Vec<_> = body.fields().iter().map(MultipartField::param).collect();
        assert_eq!(params, ["first", "second", "third"]);
        assert_eq!(body.len(), 3);
    }

    struct BrokenSource;

    impl AsyncRead for BrokenSource {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::other("disk gone")))
        }
    }

    #[tokio::test]
    async fn test_failing_source_names_the_field() {
        let body = MultipartBody::new()
            .field(MultipartField::new("ok", "1"))
            .field(MultipartField::from_reader("broken", BrokenSource));

        match encode_multipart(body).await {
            Err(HttpError::Multipart { param, .. }) => assert_eq!(param, "broken"),
            other => panic!("expected Multipart error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_borrowed_reader_source() {
        let data = b"borrowed bytes".to_vec();
        let mut reader = &data[..];
        let body = MultipartBody::new().field(MultipartField::from_reader("r", &mut reader));
        let encoded = encode_multipart(body).await.unwrap();
        let text = String::from_utf8(encoded.body.to_vec()).unwrap();
        assert!(text.contains("\r\n\r\nborrowed bytes\r\n--"));
    }
}
