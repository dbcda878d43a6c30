//! Byte counting, parsing and batched delivery of an uploaded quiz.

use std::io;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::error::{ChannelClosed, IngestError};
use super::protocol::WorkerResponse;
use crate::quiz::{validate_document, QuizDocument, ValidationConfig};

/// Maximum number of questions in a single `chunk` message.
pub const CHUNK_SIZE: usize = 500;

/// Read buffer size for [`reader_stream`].
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// An owned, sendable stream of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Vec<u8>>> + Send>>;

/// Adapt any async reader (a file, a socket) into a [`ByteStream`].
pub fn reader_stream<R>(reader: R) -> ByteStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    Box::pin(stream::try_unfold(reader, read_chunk))
}

async fn read_chunk<R>(mut reader: R) -> io::Result<Option<(Vec<u8>, R)>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let read = reader.read(&mut buffer).await?;
    if read == 0 {
        return Ok(None);
    }
    buffer.truncate(read);
    Ok(Some((buffer, reader)))
}

/// Collect a stream into memory, failing as soon as it grows past `limit`.
///
/// A limit of `None` or `Some(0)` means unlimited. Once the limit is
/// crossed no further chunks are read.
pub async fn read_limited<S, B>(mut stream: S, limit: Option<u64>) -> Result<Vec<u8>, IngestError>
where
    S: Stream<Item = io::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    let limit = limit.filter(|&bytes| bytes > 0);
    let mut buffer = Vec::new();
    let mut received: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let bytes = chunk.as_ref();
        received += bytes.len() as u64;

        if let Some(limit) = limit {
            if received > limit {
                warn!(limit, received, "Upload exceeded size limit, aborting read");
                return Err(IngestError::SizeLimitExceeded { limit });
            }
        }

        buffer.extend_from_slice(bytes);
    }

    debug!(bytes = received, "Upload fully received");
    Ok(buffer)
}

/// Read, parse and validate an upload.
///
/// The size limit is checked while reading, so an oversized upload is
/// reported as such even when the bytes received so far would parse.
pub async fn ingest<S, B>(
    stream: S,
    limit: Option<u64>,
    config: &ValidationConfig,
) -> Result<QuizDocument, IngestError>
where
    S: Stream<Item = io::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    let bytes = read_limited(stream, limit).await?;
    let value = serde_json::from_slice(&bytes)?;
    drop(bytes);

    let document = validate_document(value, config)?;
    Ok(document)
}

/// Run one upload end to end, reporting to the host over `tx`.
///
/// Emits `meta`, then `chunk` batches of at most [`CHUNK_SIZE`] questions,
/// then `done`; or a single `error`. Returns `Err` only when the host has
/// hung up.
pub async fn process_stream<S, B>(
    stream: S,
    limit: Option<u64>,
    config: ValidationConfig,
    tx: &mpsc::Sender<WorkerResponse>,
) -> Result<(), ChannelClosed>
where
    S: Stream<Item = io::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    let document = match ingest(stream, limit, &config).await {
        Ok(document) => document,
        Err(e) => {
            warn!(error = %e, "Rejected quiz upload");
            return send(tx, WorkerResponse::Error { message: e.to_string() }).await;
        }
    };

    let (meta, questions) = document.into_parts();
    let total = questions.len();
    send(tx, WorkerResponse::Meta { data: meta }).await?;

    let mut remaining = questions.into_iter();
    let mut batches = 0usize;
    loop {
        let batch: Vec<_> = remaining.by_ref().take(CHUNK_SIZE).collect();
        if batch.is_empty() {
            break;
        }
        send(tx, WorkerResponse::Chunk { data: batch }).await?;
        batches += 1;
        // Let the host interleave other work between batches
        tokio::task::yield_now().await;
    }

    info!(questions = total, batches, "Quiz upload processed");
    send(tx, WorkerResponse::Done).await
}

async fn send(tx: &mpsc::Sender<WorkerResponse>, response: WorkerResponse) -> Result<(), ChannelClosed> {
    tx.send(response).await.map_err(|_| ChannelClosed)
}

// ============================================================================
// Tests
// ============================================================================
