//! A small blocking client for dataset export services.
//!
//! The service prepares exports asynchronously, so fetching one is a
//! three-step flow: request the export, poll the export URL until the
//! artifact is ready, then stream the gzip-compressed CSV to disk.
//!
//! ## Quick start
//! - Configure the service via environment variables (`EXPORTAPI_URL`,
//!   `EXPORTAPI_KEY`) or a `.exportapirc` file (current directory or home).
//! - Build [`ExportParams`] and call [`Client::export`].
//!
//! ```no_run
//! use anyhow::Result;
//! use exportapi::{Client, ExportParams, PollLimit, Sort};
//! use std::time::Duration;
//!
//! fn main() -> Result<()> {
//!     let client = Client::from_env()?
//!         .with_poll_interval(Duration::from_secs(2))
//!         .with_poll_limit(PollLimit::Deadline(Duration::from_secs(600)));
//!     let params = ExportParams::builder()
//!         .select(["species", "height"])
//!         .where_clause("height > 20")
//!         .sort(Sort::descending("height"))
//!         .build()?;
//!     let handle = client.export("us.gov.trees", &params, None)?;
//!     println!("{}", handle);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod cancel;
mod client;
mod config;
mod error;
mod handle;
mod interpret;
mod params;
mod paths;
mod poller;
mod requester;
#[cfg(test)]
mod testing;
mod transport;
mod util;

pub use cancel::CancelToken;
pub use client::{Client, ClientConfig, DEFAULT_POLL_DEADLINE};
pub use error::{ErrorDetail, ErrorKind, ExportError};
pub use handle::ExportHandle;
pub use interpret::interpret_response;
pub use params::{Conjunction, ExportParams, ExportParamsBuilder, Sort};
pub use paths::{DestinationResolver, DirResolver, HomeDirResolver};
pub use poller::{ExportOutcome, PollLimit, PollPolicy, PollStatus, Poller, classify_status};
pub use requester::{ExportJob, request_export};
pub use transport::{HttpResponse, HttpTransport, Transport};
