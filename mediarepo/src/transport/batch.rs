//! Concurrent batch executor.
//!
//! [`BatchTransport`] owns a Tokio runtime and a pooled `reqwest::Client`.
//! Every request in a batch is issued concurrently over the shared pool
//! (HTTP/2 multiplexes requests to the same host over one connection), and
//! the caller gets back one [`Response`] per request, in request order.
//!
//! # Execution modes
//!
//! ```text
//! run_batch(reqs) ──────────────────────────────► Vec<Response>   (blocking)
//!
//! start_async(reqs) ──► Idle → InFlight
//!         ... caller keeps working, I/O proceeds on the runtime ...
//! finish_async() ──────► InFlight → Idle ───────► Vec<Response>
//! ```
//!
//! Only one async batch may be in flight per transport. Starting a second
//! one, or finishing when none was started, returns a protocol error.
//!
//! # Shutdown
//!
//! Call [`BatchTransport::shutdown`] to drain an outstanding batch before
//! the pool and runtime are released. Dropping a transport with a batch in
//! flight abandons those requests and logs an error.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use reqwest::Client;
use tokio::runtime::Runtime;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use super::config::TransportConfig;
use super::error::BatchError;
use super::request::Request;
use super::response::{Response, ResponseHeaders};

/// Async batch lifecycle.
enum BatchState {
    Idle,
    InFlight {
        requests: Arc<[Request]>,
        handle: JoinHandle<Vec<Response>>,
        started: Instant,
    },
}

/// Concurrent HTTP executor with blocking and two-phase async modes.
pub struct BatchTransport {
    config: TransportConfig,
    client: Client,
    runtime: Runtime,
    state: BatchState,
}

impl fmt::Debug for BatchTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchTransport")
            .field("config", &self.config)
            .field("in_flight", &self.is_in_flight())
            .finish_non_exhaustive()
    }
}

impl BatchTransport {
    /// Create a transport with its own I/O runtime and connection pool.
    pub fn new(config: TransportConfig) -> Result<Self, BatchError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.io_threads.max(1))
            .thread_name("mediarepo-io")
            .enable_all()
            .build()?;

        let client = {
            let _guard = runtime.enter();
            Client::builder()
                .connect_timeout(config.connect_timeout)
                .timeout(config.request_timeout)
                .pool_max_idle_per_host(config.max_idle_per_host)
                .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
                .user_agent(config.user_agent.clone())
                .build()
                .map_err(|e| BatchError::Client(e.to_string()))?
        };

        debug!(
            connect_timeout_ms = config.connect_timeout.as_millis() as u64,
            request_timeout_ms = config.request_timeout.as_millis() as u64,
            max_concurrent = config.max_concurrent_requests,
            "Batch transport created"
        );

        Ok(Self {
            config,
            client,
            runtime,
            state: BatchState::Idle,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Execute `requests` concurrently and block until all have completed.
    ///
    /// Must not be called from inside an async context.
    pub fn run_batch(&self, requests: Vec<Request>) -> Vec<Response> {
        if requests.is_empty() {
            return Vec::new();
        }
        let count = requests.len();
        let start = Instant::now();
        let responses = self.runtime.block_on(execute_batch(
            self.client.clone(),
            requests.into(),
            self.config.max_concurrent_requests,
        ));
        debug!(
            requests = count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Batch completed"
        );
        responses
    }

    /// Begin executing `requests` without waiting for them.
    pub fn start_async(&mut self, requests: Vec<Request>) -> Result<(), BatchError> {
        if let BatchState::InFlight { requests, .. } = &self.state {
            return Err(BatchError::AlreadyInFlight {
                pending: requests.len(),
            });
        }

        let requests: Arc<[Request]> = requests.into();
        let handle = self.runtime.spawn(execute_batch(
            self.client.clone(),
            Arc::clone(&requests),
            self.config.max_concurrent_requests,
        ));
        debug!(requests = requests.len(), "Async batch started");

        self.state = BatchState::InFlight {
            requests,
            handle,
            started: Instant::now(),
        };
        Ok(())
    }

    /// Wait for the in-flight batch and return its responses.
    pub fn finish_async(&mut self) -> Result<Vec<Response>, BatchError> {
        let (requests, mut handle, started) =
            match std::mem::replace(&mut self.state, BatchState::Idle) {
                BatchState::Idle => return Err(BatchError::NotInFlight),
                BatchState::InFlight {
                    requests,
                    handle,
                    started,
                } => (requests, handle, started),
            };

        let idle_wait = self.config.idle_wait();
        let pending = requests.len();
        let joined = self.runtime.block_on(async {
            loop {
                tokio::select! {
                    joined = &mut handle => break joined,
                    _ = tokio::time::sleep(idle_wait) => {
                        trace!(
                            pending,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Waiting on async batch"
                        );
                    }
                }
            }
        });

        let responses = joined.map_err(|e| BatchError::TaskFailed(e.to_string()))?;
        debug!(
            requests = pending,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Async batch finished"
        );
        Ok(responses)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, BatchState::InFlight { .. })
    }

    /// Requests of the in-flight batch, if any.
    pub fn in_flight_requests(&self) -> Option<&[Request]> {
        match &self.state {
            BatchState::InFlight { requests, .. } => Some(&requests[..]),
            BatchState::Idle => None,
        }
    }

    /// Drain any in-flight batch, then release the pool and runtime.
    ///
    /// Returns the drained responses, if a batch was outstanding.
    pub fn shutdown(mut self) -> Result<Option<Vec<Response>>, BatchError> {
        let drained = if self.is_in_flight() {
            Some(self.finish_async()?)
        } else {
            None
        };
        debug!(drained = drained.is_some(), "Batch transport shut down");
        Ok(drained)
    }
}

impl Drop for BatchTransport {
    fn drop(&mut self) {
        if let BatchState::InFlight { requests, .. } = &self.state {
            error!(
                pending = requests.len(),
                "Batch transport dropped with an async batch in flight; responses are lost"
            );
        }
    }
}

/// Issue all requests concurrently, bounded by `max_concurrent`.
async fn execute_batch(
    client: Client,
    requests: Arc<[Request]>,
    max_concurrent: usize,
) -> Vec<Response> {
    let permits = Semaphore::new(max_concurrent.max(1));
    let pending = requests.iter().map(|request| {
        let client = &client;
        let permits = &permits;
        async move {
            // The semaphore is never closed.
            let _permit = permits.acquire().await.ok();
            execute_one(client, request).await
        }
    });
    join_all(pending).await
}

async fn execute_one(client: &Client, request: &Request) -> Response {
    let mut builder = client.get(request.url());
    if !request.query().is_empty() {
        builder = builder.query(request.query());
    }
    for (name, value) in request.headers() {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => {
            trace!(request = %request, error = %e, "Request failed");
            return Response::transport_failure(describe_error(&e));
        }
    };

    let status = response.status();
    let headers = ResponseHeaders::from_header_map(response.headers());
    match response.bytes().await {
        Ok(body) => Response {
            code: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            error: String::new(),
        },
        Err(e) => {
            trace!(request = %request, error = %e, "Reading body failed");
            Response::transport_failure(describe_error(&e))
        }
    }
}

fn describe_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timed out: {}", e)
    } else if e.is_connect() {
        format!("connect failed: {}", e)
    } else if e.is_redirect() {
        format!("redirect limit exceeded: {}", e)
    } else {
        e.to_string()
    }
}
