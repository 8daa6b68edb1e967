//! Fluent builder for [`Poller`] construction.

use crate::runtime::Poller;

use std::io;

/// Readiness events fetched per wait unless configured otherwise.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Builder for constructing [`Poller`] instances with a fluent API.
///
/// # Example
/// ```ignore
/// let poller = PollerBuilder::new().event_capacity(256).build()?;
/// ```
pub struct PollerBuilder {
    event_capacity: usize,
}

impl Default for PollerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PollerBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Sets how many readiness events one wait may return.
    ///
    /// More ready descriptors than this are simply reported by the next wait.
    /// Zero is treated as one.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Builds the poller.
    ///
    /// # Returns
    /// A new [`Poller`], or the error from creating the OS readiness queue
    pub fn build(self) -> io::Result<Poller> {
        Poller::with_capacity(self.event_capacity)
    }
}
