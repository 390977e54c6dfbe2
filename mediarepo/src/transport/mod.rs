//! Concurrent HTTP batch transport.
//!
//! Executes many independent `GET` requests in one concurrent round trip
//! over a pooled, multiplexed connection set. See [`BatchTransport`].
//!
//! # Example
//!
//! ```ignore
//! use mediarepo::transport::{BatchTransport, Request, TransportConfig};
//!
//! let mut transport = BatchTransport::new(TransportConfig::default())?;
//! transport.start_async(vec![
//!     Request::get("https://commons.wikimedia.org/w/api.php")
//!         .query("action", "query")
//!         .build(),
//! ])?;
//! // ... do other work ...
//! let responses = transport.finish_async()?;
//! ```

mod batch;
mod config;
mod error;
mod request;
mod response;

pub use batch::BatchTransport;
pub use config::{
    TransportConfig, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT_REQUESTS,
    DEFAULT_REQUEST_TIMEOUT_SECS, MIN_IDLE_WAIT,
};
pub use error::BatchError;
pub use request::{Method, Request, RequestBuilder};
pub use response::{Response, ResponseHeaders, TRANSPORT_FAILURE_CODE};
