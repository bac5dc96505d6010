//! Error types for the reporting engine client.
//!
//! # Design
//! Two layers. `ApiError` is the cause: what went wrong on the wire or while
//! decoding. `ClientError` is what every public operation returns: the cause
//! wrapped with an `Operation` tag whose message names the failed call.
//! A file upload nests the data upload's `ClientError` as its cause.
//! Timeouts, refused connections and TLS rejections all arrive as
//! `ApiError::Transport`; the client does not tell them apart.

use std::fmt;

use thiserror::Error;

/// Underlying cause of a failed round-trip.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, DNS, TLS or timeout failure reported by the HTTP stack.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Local I/O failure, e.g. reading a file scheduled for upload.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered with a non-2xx status. `description` holds the
    /// full response dump.
    #[error("{description}")]
    Http { status: u16, description: String },

    /// The health endpoint answered with a non-2xx status; carries only the
    /// reason phrase.
    #[error("{0}")]
    Unavailable(String),

    /// The response body is not the expected JSON value.
    #[error("deserialization failed: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The response body is not valid UTF-8 text.
    #[error("response body is not valid UTF-8: {0}")]
    InvalidText(#[from] std::string::FromUtf8Error),

    /// The TLS configuration could not be assembled.
    #[error("TLS configuration failed: {0}")]
    Tls(#[from] rustls::Error),

    /// Failure of an inner operation, e.g. the data upload behind a file
    /// upload. Display and source pass through to it.
    #[error(transparent)]
    Nested(Box<ClientError>),
}

/// Public operations of the client, each with a fixed context message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    UploadFile,
    UploadData,
    DownloadData,
    Delete,
    RunTask,
    StopTask,
    GetStatus,
    GetAllStatus,
    HealthStatus,
}

impl Operation {
    pub fn message(self) -> &'static str {
        match self {
            Operation::UploadFile => "The data file to rest api failed.",
            Operation::UploadData => "The data upload to rest api failed.",
            Operation::DownloadData => "The file download from rest api failed.",
            Operation::Delete => "The folder deletion on rest api failed.",
            Operation::RunTask => "The task run on rest api failed.",
            Operation::StopTask => "The task stopping on rest api failed.",
            Operation::GetStatus => "The task get request from rest api failed.",
            Operation::GetAllStatus => "The task get request from rest api failed.",
            Operation::HealthStatus => "The health status request to rest api failed.",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Error returned by every `ReportingClient` operation.
#[derive(Debug, Error)]
#[error("{operation}")]
pub struct ClientError {
    pub operation: Operation,
    pub source: ApiError,
}

impl ClientError {
    pub fn new(operation: Operation, source: ApiError) -> Self {
        Self { operation, source }
    }
}
