use std::future::Future;

use bytes::Bytes;

use super::delegate::TransportDelegate;
use super::encoder::ChunkedBody;
use crate::error::Result;

/// The transport's write side for a request body.
pub trait BodyWriter: Send {
    fn write(&mut self, chunk: Bytes) -> impl Future<Output = Result<()>> + Send;
}

/// Streams `body` through `writer`, reporting each chunk to `delegate`.
///
/// A write failure is reported through
/// [`request_failed`](TransportDelegate::request_failed) and returned. An
/// empty body completes immediately.
pub async fn write_body<W, D>(body: &ChunkedBody, writer: &mut W, delegate: &mut D) -> Result<()>
where
    W: BodyWriter,
    D: TransportDelegate,
{
    let mut sent = 0usize;
    for chunk in body {
        let len = chunk.len();
        if let Err(err) = writer.write(chunk).await {
            tracing::warn!(%err, sent, "body write failed");
            delegate.request_failed(err.clone());
            return Err(err);
        }
        sent += len;
        delegate.part_sent(len);
    }

    tracing::debug!(sent, chunk_size = body.chunk_size(), "request body sent");
    delegate.request_sent();
    Ok(())
}
