//! Resource limits for JavaScript execution.
//!
//! This module provides the per-app configuration that bounds how long a
//! handler may run and how much data its streams may buffer.

use std::time::Duration;

use nano_common::error::{NanoError, Result};

use crate::runtime::DrainMode;
use crate::streams::{DEFAULT_MAX_BUFFER_SIZE, EmptyReadPolicy, StreamConfig};

/// Default cap on an incoming request body (10 MiB).
pub const DEFAULT_MAX_REQUEST_BODY: usize = 10 * 1024 * 1024;

/// Resource limits for one app.
///
/// # Fields
///
/// - `execution_timeout` - Wall-clock budget per request (default: 30 seconds)
/// - `drain_iterations` - When set, replaces the wall-clock budget with a
///   fixed number of drain cycles
/// - `max_buffer_size` - Byte ceiling for any single stream queue (default: 64 MiB)
/// - `empty_read_policy` - What `read()` does on an empty stream
/// - `max_request_body` - Largest request body accepted (default: 10 MiB)
///
/// # Example
///
/// ```
/// use nano_server::ResourceLimits;
/// use std::time::Duration;
///
/// let limits = ResourceLimits::new()
///     .with_execution_timeout(Duration::from_secs(5))
///     .with_max_buffer_size(1024 * 1024);
/// assert!(limits.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLimits {
    /// Maximum wall-clock time a request may take to settle
    pub execution_timeout: Duration,
    /// Fixed drain-cycle ceiling, overriding `execution_timeout`
    pub drain_iterations: Option<u32>,
    /// Maximum bytes buffered by one stream
    pub max_buffer_size: usize,
    /// Behaviour of `read()` when nothing is queued
    pub empty_read_policy: EmptyReadPolicy,
    /// Maximum request body accepted by the HTTP layer
    pub max_request_body: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_secs(30),
            drain_iterations: None,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            empty_read_policy: EmptyReadPolicy::Wait,
            max_request_body: DEFAULT_MAX_REQUEST_BODY,
        }
    }
}

impl ResourceLimits {
    /// Creates a new ResourceLimits with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the wall-clock budget per request.
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// Switches the drainer to a fixed iteration ceiling.
    pub fn with_drain_iterations(mut self, iterations: u32) -> Self {
        self.drain_iterations = Some(iterations);
        self
    }

    pub fn with_max_buffer_size(mut self, bytes: usize) -> Self {
        self.max_buffer_size = bytes;
        self
    }

    pub fn with_empty_read_policy(mut self, policy: EmptyReadPolicy) -> Self {
        self.empty_read_policy = policy;
        self
    }

    pub fn with_max_request_body(mut self, bytes: usize) -> Self {
        self.max_request_body = bytes;
        self
    }

    /// The drain budget each request starts with.
    pub fn drain_mode(&self) -> DrainMode {
        match self.drain_iterations {
            Some(iterations) => DrainMode::Iterations(iterations),
            None => DrainMode::Deadline(self.execution_timeout),
        }
    }

    /// The stream settings installed into the app's realm.
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::new(self.max_buffer_size).with_empty_read_policy(self.empty_read_policy)
    }

    /// Validates the resource limits configuration.
    ///
    /// # Errors
    ///
    /// Returns [`NanoError::Config`] if:
    /// - Execution timeout is below one millisecond or above one hour
    /// - The drain iteration ceiling is zero
    /// - The buffer ceiling is zero
    /// - The request body cap is larger than the buffer ceiling, so the
    ///   request stream itself could never hold it
    pub fn validate(&self) -> Result<()> {
        if self.execution_timeout < Duration::from_millis(1) {
            return Err(NanoError::Config(
                "execution timeout must be at least 1 millisecond".to_string(),
            ));
        }

        if self.execution_timeout > Duration::from_secs(3600) {
            return Err(NanoError::Config(format!(
                "execution timeout must be <= 1 hour (got {} seconds)",
                self.execution_timeout.as_secs()
            )));
        }

        if self.drain_iterations == Some(0) {
            return Err(NanoError::Config("drain iterations must be greater than zero".to_string()));
        }

        if self.max_buffer_size == 0 {
            return Err(NanoError::Config("max buffer size must be greater than zero".to_string()));
        }

        if self.max_request_body > self.max_buffer_size {
            return Err(NanoError::Config(format!(
                "max request body ({} bytes) exceeds max buffer size ({} bytes)",
                self.max_request_body, self.max_buffer_size
            )));
        }

        Ok(())
    }
}
