//! Background worker that ingests uploaded quiz files.
//!
//! The host hands the worker a byte stream, an optional size ceiling and a
//! [`ValidationConfig`](crate::quiz::ValidationConfig). The worker reads and
//! counts the bytes, parses them as JSON, validates the result and streams it
//! back as one `meta` message, batches of questions, and a final `done`.
//! Any failure produces exactly one `error` message instead.
//!
//! The worker runs in its own Tokio task and talks to the host only through
//! channels, so nothing is shared between the two sides.

pub mod channel;
pub mod error;
pub mod protocol;
pub mod stream;

pub use channel::{spawn_worker, WorkerHandle};
pub use error::{ChannelClosed, IngestError};
pub use protocol::{WorkerRequest, WorkerResponse};
pub use stream::{ingest, process_stream, read_limited, reader_stream, ByteStream, CHUNK_SIZE};
