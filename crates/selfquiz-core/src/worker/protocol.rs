//! Messages exchanged between the host and the worker.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::stream::ByteStream;
use crate::quiz::{Question, ValidationConfig};

/// Host to worker. The stream moves into the worker with the request.
pub enum WorkerRequest {
    ProcessStream {
        stream: ByteStream,
        /// Byte ceiling; `None` or `Some(0)` disables the check.
        limit: Option<u64>,
        config: ValidationConfig,
    },
}

impl fmt::Debug for WorkerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerRequest::ProcessStream { limit, config, .. } => f
                .debug_struct("ProcessStream")
                .field("limit", limit)
                .field("config", config)
                .finish_non_exhaustive(),
        }
    }
}

/// Worker to host, serialized as `{"type": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerResponse {
    /// Every top-level field of the upload except `questions`.
    Meta { data: Map<String, Value> },
    /// Up to [`CHUNK_SIZE`](super::CHUNK_SIZE) questions, in upload order.
    Chunk { data: Vec<Question> },
    Done,
    Error { message: String },
}

impl WorkerResponse {
    /// `done` and `error` end a request; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerResponse::Done | WorkerResponse::Error { .. })
    }
}
