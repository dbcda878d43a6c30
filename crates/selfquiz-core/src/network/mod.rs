//! Network seam used by the cache manager.
//!
//! Requests and responses are plain owned values so they can be cloned into
//! caches and background tasks. The [`Fetcher`] trait is the only way the
//! cache layer reaches the network; [`HttpFetcher`] implements it with
//! `reqwest`.

pub mod error;
pub mod fetcher;
pub mod request;

pub use error::FetchError;
pub use fetcher::{Fetcher, HttpFetcher};
pub use request::{Destination, Request, RequestMode, Response};
