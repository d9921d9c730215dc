//! Size-bounded body reading.
//!
//! The limit is enforced while streaming: reading stops as soon as the running
//! total passes the limit, so a misbehaving server cannot make the client
//! buffer more than `limit + READ_CHUNK_SIZE` bytes.

use crate::error::HttpError;
use crate::response::ResponseBody;
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use http_body_util::BodyDataStream;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;

/// Number of bytes requested from the source per read.
pub const READ_CHUNK_SIZE: usize = 512;

/// Read `reader` to completion, failing with [`HttpError::BodyTooLarge`] once
/// more than `limit` bytes have been read.
///
/// A `limit` of `0` means unbounded.
///
/// # Errors
///
/// Returns `HttpError::BodyTooLarge` when the limit is exceeded and
/// `HttpError::BodyRead` when the source fails.
pub async fn read_all_with_limit<R>(mut reader: R, limit: usize) -> Result<Bytes, HttpError>
where
    R: AsyncRead + Unpin,
{
    if limit == 0 {
        let mut collected = Vec::new();
        reader
            .read_to_end(&mut collected)
            .await
            .map_err(HttpError::BodyRead)?;
        return Ok(Bytes::from(collected));
    }

    let mut chunk = [0u8; READ_CHUNK_SIZE];
    let mut collected = BytesMut::with_capacity(READ_CHUNK_SIZE);
    loop {
        let n = reader.read(&mut chunk).await.map_err(HttpError::BodyRead)?;
        if n == 0 {
            break;
        }

        let total = collected.len() + n;
        if total > limit {
            tracing::warn!(limit, read = total, "response body exceeds size limit");
            return Err(HttpError::BodyTooLarge {
                limit,
                actual: total,
            });
        }
        collected.extend_from_slice(&chunk[..n]);
    }

    Ok(collected.freeze())
}

/// Read a response body with [`read_all_with_limit`].
///
/// # Errors
///
/// Same as [`read_all_with_limit`]; body stream errors surface as
/// `HttpError::BodyRead`.
pub async fn read_body_with_limit(body: ResponseBody, limit: usize) -> Result<Bytes, HttpError> {
    let stream = BodyDataStream::new(body).map_err(std::io::Error::other);
    read_all_with_limit(StreamReader::new(stream), limit).await
}
