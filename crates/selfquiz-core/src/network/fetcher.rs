//! Fetching resources from the network.

use std::future::Future;

use reqwest::{header, Client};
use tracing::debug;

use super::error::FetchError;
use super::request::{Request, Response};

/// Anything that can turn a [`Request`] into a [`Response`].
///
/// The returned future must be `Send` so fetches can run in background
/// revalidation tasks.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, FetchError>> + Send;
}

/// Fetcher backed by a shared `reqwest` client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
///
/// No request timeout is set: a hung request stalls only its own response.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let response = self.client.get(&request.url).send().await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        debug!(url = %request.url, status, bytes = body.len(), "Fetched from network");

        Ok(Response {
            url: request.url.clone(),
            status,
            content_type,
            body,
        })
    }
}
