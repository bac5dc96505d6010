//! Blocking client for the reporting engine REST service.
//!
//! # Overview
//! Uploads input files, starts and stops report tasks, polls their status,
//! downloads results and deletes server-side folders. Each call is one HTTP
//! round-trip; nothing is retried, cached or queued.
//!
//! # Design
//! - `ReportingClient` splits every endpoint into `build_*` (produces an
//!   `HttpRequest`) and `parse_*` (consumes an `HttpResponse`); the public
//!   operations run them through a `Transport`.
//! - `BlockingTransport` wraps one reqwest client configured with the clamped
//!   timeout and the `PinningVerifier` trust policy.
//! - Every public operation returns `Result<_, ClientError>`, naming the
//!   failed operation and keeping the cause.
//!
//! ```no_run
//! use reporting_core::{ClientConfig, ReportingClient};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new("https://reports.local:40263")
//!     .with_thumbprint("https://reports.local:40263", "A9993E364706816ABA3E25717850C26C9CD0D89D");
//! let client = ReportingClient::new(&config)?;
//! let folder = client.upload_data(b"a;b\n".to_vec(), "input.csv", None)?;
//! let task = client.run_task(r#"{"tasks":[]}"#, None)?;
//! println!("{folder} {task}: {}", client.get_status(task)?);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod id;
pub mod transport;
pub mod trust;

pub use client::ReportingClient;
pub use config::{ClientConfig, ConfigError};
pub use error::{ApiError, ClientError, Operation};
pub use http::{FilePart, HttpMethod, HttpRequest, HttpResponse, RequestBody};
pub use transport::{BlockingTransport, Transport};
pub use trust::{CertificatePin, CertificatePins, PinningVerifier, TrustDecision, TrustPolicy};
