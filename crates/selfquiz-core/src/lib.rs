//! Core library for SelfQuiz offline infrastructure.
//!
//! This crate contains the two background halves of the quiz application:
//!
//! - [`worker`]: reads an uploaded quiz from a byte stream, enforces a size
//!   ceiling, validates it, and streams it back to the host in batches.
//! - [`cache`]: versioned cache namespaces and the request interception
//!   strategies that keep the application usable offline.
//!
//! Supporting modules hold the quiz data model ([`quiz`]), the network seam
//! ([`network`]), and application configuration ([`config`]).

pub mod cache;
pub mod config;
pub mod network;
pub mod quiz;
pub mod worker;

pub use cache::{CacheError, CacheManager, CacheStorage};
pub use config::Config;
pub use network::{Fetcher, HttpFetcher, Request, Response};
pub use quiz::{Question, QuizDocument, ValidationConfig, ValidationError};
pub use worker::{spawn_worker, WorkerHandle, WorkerRequest, WorkerResponse};
