//! Client for the external video generation service.
//!
//! The service is an opaque asynchronous collaborator: submit a prompt,
//! get a job id back, poll it until it reports done, then download the
//! produced asset from a short-lived URL. This crate provides the
//! `GenerationClient` trait the pipeline is written against plus the HTTP
//! implementation.

pub mod client;
pub mod error;
pub mod types;

pub use client::{GenClientConfig, GenerationClient, HttpGenerationClient};
pub use error::{GenError, GenResult};
pub use types::{PollResponse, RemoteJobState, SubmitRequest, SubmitResponse};
