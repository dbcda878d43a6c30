//! Message-passing boundary between the host and the worker task.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::ChannelClosed;
use super::protocol::{WorkerRequest, WorkerResponse};
use super::stream::process_stream;

/// Buffer size for host requests.
/// Uploads are handled one at a time, so a small queue is plenty.
const REQUEST_BUFFER_SIZE: usize = 4;

/// Buffer size for worker responses.
/// Bounds how many question batches can be in flight before the worker
/// waits for the host to catch up.
const RESPONSE_BUFFER_SIZE: usize = 8;

/// Host-side handle to a running worker.
///
/// Dropping the handle closes the request channel, which stops the worker
/// once its current upload is finished.
pub struct WorkerHandle {
    requests: mpsc::Sender<WorkerRequest>,
    responses: mpsc::Receiver<WorkerResponse>,
    task: JoinHandle<()>,
}

/// Start a worker in its own Tokio task.
pub fn spawn_worker() -> WorkerHandle {
    let (request_tx, request_rx) = mpsc::channel(REQUEST_BUFFER_SIZE);
    let (response_tx, response_rx) = mpsc::channel(RESPONSE_BUFFER_SIZE);

    let task = tokio::spawn(run_worker(request_rx, response_tx));

    WorkerHandle {
        requests: request_tx,
        responses: response_rx,
        task,
    }
}

async fn run_worker(
    mut requests: mpsc::Receiver<WorkerRequest>,
    responses: mpsc::Sender<WorkerResponse>,
) {
    info!("Quiz worker started");

    while let Some(request) = requests.recv().await {
        debug!(?request, "Worker received request");
        match request {
            WorkerRequest::ProcessStream {
                stream,
                limit,
                config,
            } => {
                if process_stream(stream, limit, config, &responses).await.is_err() {
                    warn!("Host stopped listening, discarding worker output");
                }
            }
        }
    }

    info!("Quiz worker stopped");
}

impl WorkerHandle {
    /// Queue a request for the worker.
    pub async fn send(&self, request: WorkerRequest) -> Result<(), ChannelClosed> {
        self.requests.send(request).await.map_err(|_| {
            error!("Failed to send request - worker has stopped");
            ChannelClosed
        })
    }

    /// Next message from the worker, or `None` once it has stopped.
    pub async fn recv(&mut self) -> Option<WorkerResponse> {
        self.responses.recv().await
    }

    /// Collect messages up to and including the next `done` or `error`.
    pub async fn collect_until_terminal(&mut self) -> Vec<WorkerResponse> {
        let mut messages = Vec::new();
        while let Some(message) = self.recv().await {
            let terminal = message.is_terminal();
            messages.push(message);
            if terminal {
                break;
            }
        }
        messages
    }

    /// Close the request channel and wait for the worker task to exit.
    pub async fn shutdown(self) {
        let WorkerHandle {
            requests,
            responses,
            task,
        } = self;
        drop(requests);
        drop(responses);
        if let Err(e) = task.await {
            error!(error = %e, "Worker task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::ValidationConfig;
    use crate::worker::stream::ByteStream;
    use futures::stream;
    use serde_json::json;

    fn byte_stream(value: serde_json::Value) -> ByteStream {
        let bytes = serde_json::to_vec(&value).expect("serialize upload");
        Box::pin(stream::iter(vec![Ok::<_, std::io::Error>(bytes)]))
    }

    fn upload(questions: usize) -> serde_json::Value {
        let questions: Vec<_> = (0..questions)
            .map(|i| {
                json!({
                    "questionText": format!("Q{i}"),
                    "choices": ["a", "b", "c"],
                    "correctAnswer": 2,
                    "explanation": "c is right",
                    "time": 30
                })
            })
            .collect();
        json!({"topic": "Worker", "questions": questions})
    }

    #[tokio::test]
    async fn test_worker_round_trip() {
        let mut worker = spawn_worker();
        worker
            .send(WorkerRequest::ProcessStream {
                stream: byte_stream(upload(3)),
                limit: Some(1024 * 1024),
                config: ValidationConfig::with_min_choices(3),
            })
            .await
            .expect("worker accepts request");

        let messages = worker.collect_until_terminal().await;
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0], WorkerResponse::Meta { .. }));
        match &messages[1] {
            WorkerResponse::Chunk { data } => {
                assert_eq!(data.len(), 3);
                assert_eq!(data[2].question_text, "Q2");
                assert_eq!(data[2].time_seconds(), Some(30.0));
            }
            other => panic!("expected chunk, got {other:?}"),
        }
        assert_eq!(messages[2], WorkerResponse::Done);

        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_worker_handles_requests_in_sequence() {
        let mut worker = spawn_worker();

        worker
            .send(WorkerRequest::ProcessStream {
                stream: byte_stream(json!({"questions": "broken"})),
                limit: None,
                config: ValidationConfig::default(),
            })
            .await
            .expect("first request");
        worker
            .send(WorkerRequest::ProcessStream {
                stream: byte_stream(upload(1)),
                limit: None,
                config: ValidationConfig::default(),
            })
            .await
            .expect("second request");

        let first = worker.collect_until_terminal().await;
        assert_eq!(
            first,
            vec![WorkerResponse::Error {
                message: "Invalid JSON: \"questions\" must be an array.".to_string()
            }]
        );

        let second = worker.collect_until_terminal().await;
        assert_eq!(second.last(), Some(&WorkerResponse::Done));

        worker.shutdown().await;
    }
}
