//! `wallarm-api` is an async HTTP client core for the Wallarm Cloud API.
//!
//! Every resource endpoint goes through [`WallarmClient::execute`], which:
//! - serializes the [`RequestBody`] (JSON, raw bytes or a query string)
//! - retries transport failures, 429 and 5xx responses with exponential backoff
//! - classifies the final response into bytes or a [`WallarmError`], including
//!   [`WallarmError::ExistingResource`] for objects created earlier

mod body;
pub mod classify;
mod client;
mod error;
mod logger;
mod options;

pub use body::RequestBody;
pub use client::{ClientBuilder, WallarmClient, DEFAULT_API_URL};
pub use error::WallarmError;
#[cfg(feature = "tracing")]
pub use logger::TracingLogger;
pub use logger::{DiscardLogger, Logger};
pub use options::RetryPolicy;

pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, WallarmError>;
