//! Client side of the chunked, content-addressed upload protocol.
//!
//! This crate drives one file from disk to a merged server-side object.
//! It carries no HTTP assumptions in its core: the coordinator talks to a
//! [`Transport`], and [`HttpTransport`] is the reqwest-backed one.
//!
//! # Pipeline
//!
//! 1. **Digest**: stream every block through MD5, strictly in order
//! 2. **Transmit**: re-read the file and upload each block, bounded fan-out
//! 3. **Gate**: wait for every block to settle; any failure stops here
//! 4. **Merge**: ask the server to assemble the blocks named by the digest

pub mod block;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod transport;
pub mod types;

// Re-export primary types for convenience.
pub use block::BlockUploader;
pub use config::{RetryPolicy, UploadConfig};
pub use coordinator::UploadCoordinator;
pub use error::{RequestFailure, UploadError};
pub use transport::{
    HttpTransport, Method, Part, Request, RequestBody, Response, Transport, TransportError,
    send_with_timeout,
};
pub use types::{UploadEvent, UploadState};
