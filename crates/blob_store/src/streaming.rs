//! Length-bounded streaming helpers shared by every backend.
//!
//! All large-object transfers go through here so that every adapter honors
//! the same contract: exactly the declared number of bytes is consumed from
//! a source, partial reads are accumulated, nothing past the declared length
//! is ever read, and a source that runs dry early is a
//! [`BlobError::LengthMismatch`].

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf, Take};

use crate::{BlobError, BlobResult};

/// Transfer chunk size.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// A boxed byte source handed to or returned by the adapters.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Copies exactly `content_length` bytes from `reader` to `writer` in
/// [`CHUNK_SIZE`] chunks and flushes the writer.
pub async fn copy_exact<R, W>(reader: &mut R, writer: &mut W, content_length: u64) -> BlobResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = vec![0u8; buffer_len(content_length)];
    let mut remaining = content_length;
    while remaining > 0 {
        let want = remaining.min(buffer.len() as u64) as usize;
        let read = reader.read(&mut buffer[..want]).await?;
        if read == 0 {
            return Err(BlobError::LengthMismatch {
                expected: content_length,
                actual: content_length - remaining,
            });
        }
        writer.write_all(&buffer[..read]).await?;
        remaining -= read as u64;
    }
    writer.flush().await?;
    Ok(content_length)
}

/// Turns `reader` into a stream of chunks totalling exactly `content_length`
/// bytes. Every chunk is [`CHUNK_SIZE`] long except possibly the last.
pub fn read_chunks(reader: BlobReader, content_length: u64) -> BoxStream<'static, BlobResult<Bytes>> {
    let state = ChunkState {
        reader,
        remaining: content_length,
        total: content_length,
    };
    futures::stream::try_unfold(state, |mut state| async move {
        let chunk = state.next_chunk().await?;
        Ok::<_, BlobError>(chunk.map(|chunk| (chunk, state)))
    })
    .boxed()
}

/// Reads exactly `content_length` bytes into memory.
pub async fn read_exact_bytes(reader: BlobReader, content_length: u64) -> BlobResult<Bytes> {
    let mut buffer = BytesMut::with_capacity(content_length as usize);
    let mut chunks = read_chunks(reader, content_length);
    while let Some(chunk) = chunks.try_next().await? {
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

fn buffer_len(content_length: u64) -> usize {
    content_length.min(CHUNK_SIZE as u64) as usize
}

struct ChunkState {
    reader: BlobReader,
    remaining: u64,
    total: u64,
}

impl ChunkState {
    async fn next_chunk(&mut self) -> BlobResult<Option<Bytes>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let want = buffer_len(self.remaining);
        let mut chunk = BytesMut::zeroed(want);
        let mut filled = 0;
        while filled < want {
            let read = self.reader.read(&mut chunk[filled..]).await?;
            if read == 0 {
                return Err(BlobError::LengthMismatch {
                    expected: self.total,
                    actual: self.total - self.remaining + filled as u64,
                });
            }
            filled += read;
        }
        self.remaining -= want as u64;
        Ok(Some(chunk.freeze()))
    }
}

/// Blob content exposed as a reader paired with its declared length.
///
/// The reader never yields more than `content_length` bytes. The caller owns
/// the underlying resource (file handle, HTTP response) until this value is
/// dropped.
pub struct BlobStream {
    content_length: u64,
    reader: Take<BlobReader>,
}

impl BlobStream {
    pub fn new(content_length: u64, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        let reader: BlobReader = Box::new(reader);
        Self {
            content_length,
            reader: reader.take(content_length),
        }
    }

    /// Wraps a stream of byte chunks, e.g. an HTTP body or an object store
    /// download.
    pub fn from_stream<S, E>(content_length: u64, stream: S) -> Self
    where
        S: futures::Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let stream = stream.map_err(io::Error::other);
        Self::new(content_length, tokio_util::io::StreamReader::new(stream))
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn into_reader(self) -> BlobReader {
        Box::new(self.reader)
    }

    /// Copies the whole blob into `writer`.
    pub async fn copy_to<W>(mut self, writer: &mut W) -> BlobResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let content_length = self.content_length;
        copy_exact(&mut self.reader, writer, content_length).await
    }

    /// Materializes the whole blob.
    pub async fn bytes(self) -> BlobResult<Bytes> {
        let content_length = self.content_length;
        read_exact_bytes(Box::new(self.reader), content_length).await
    }
}

impl AsyncRead for BlobStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl std::fmt::Debug for BlobStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStream")
            .field("content_length", &self.content_length)
            .field("reader", &"<hidden>")
            .finish()
    }
}
