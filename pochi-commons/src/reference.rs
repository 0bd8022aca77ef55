//! In-memory adapters for the shared traits. Tests and the simulator use
//! them to inspect what the layout engine reported.

use std::sync::Arc;

use anyhow::{Error, Result};
use parking_lot::Mutex;

use crate::{ErrorReporter, TelemetrySink};

/// Collects telemetry events in memory.
#[derive(Debug)]
pub struct MemoryTelemetry<Event> {
    events: Arc<Mutex<Vec<Event>>>,
}

impl<Event> MemoryTelemetry<Event> {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Drain every recorded event.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl<Event> Default for MemoryTelemetry<Event> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Event> Clone for MemoryTelemetry<Event> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<Event> TelemetrySink<Event> for MemoryTelemetry<Event>
where
    Event: Clone + Send + 'static,
{
    fn record(&self, event: &Event) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Keeps the rendered message of every captured error.
#[derive(Debug, Default, Clone)]
pub struct MemoryErrorReporter {
    messages: Arc<Mutex<Vec<String>>>,
}

impl MemoryErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl ErrorReporter for MemoryErrorReporter {
    fn capture(&self, error: &Error) -> Result<()> {
        self.messages.lock().push(format!("{error:#}"));
        Ok(())
    }
}
