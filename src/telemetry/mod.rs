//! Telemetry for ingestion and query runs
//!
//! Collects pipeline events and keeps running totals that the CLI prints
//! at the end of a run. Cheap to clone; clones share the same buffers.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::errors::Dependency;

/// Telemetry event types
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    // Ingestion events
    RecordRejected {
        line: usize,
        field: String,
        timestamp: Instant,
    },
    BatchEmbedded {
        passages: usize,
        duration_ms: u64,
        timestamp: Instant,
    },
    BatchIndexed {
        written: usize,
        failed: usize,
        duration_ms: u64,
        timestamp: Instant,
    },

    // External call events
    RetryAttempt {
        dependency: Dependency,
        attempt: u32,
        timestamp: Instant,
    },

    // Query events
    QueryCompleted {
        results: usize,
        duration_ms: u64,
        timestamp: Instant,
    },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default)]
pub struct TelemetryStats {
    pub records_rejected: usize,
    pub batches_embedded: usize,
    pub passages_embedded: usize,
    pub embed_time_ms: u64,
    pub batches_indexed: usize,
    pub entries_written: usize,
    pub entries_failed: usize,
    pub retry_attempts: usize,
    pub queries_completed: usize,
}

/// Telemetry collector
#[derive(Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

impl TelemetryCollector {
    /// Create a new telemetry collector
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            match &event {
                TelemetryEvent::RecordRejected { .. } => {
                    stats.records_rejected += 1;
                }
                TelemetryEvent::BatchEmbedded {
                    passages,
                    duration_ms,
                    ..
                } => {
                    stats.batches_embedded += 1;
                    stats.passages_embedded += passages;
                    stats.embed_time_ms += duration_ms;
                }
                TelemetryEvent::BatchIndexed { written, failed, .. } => {
                    stats.batches_indexed += 1;
                    stats.entries_written += written;
                    stats.entries_failed += failed;
                }
                TelemetryEvent::RetryAttempt { .. } => {
                    stats.retry_attempts += 1;
                }
                TelemetryEvent::QueryCompleted { .. } => {
                    stats.queries_completed += 1;
                }
            }
        }

        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.push(event);
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get event count
    pub fn event_count(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<TelemetryEvent> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let start = events.len().saturating_sub(n);
        events[start..].to_vec()
    }

    /// Passages embedded per second of embedding time
    pub fn embed_throughput(&self) -> f64 {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        if stats.embed_time_ms == 0 {
            0.0
        } else {
            stats.passages_embedded as f64 * 1000.0 / stats.embed_time_ms as f64
        }
    }

    /// Fraction of attempted index writes that succeeded
    pub fn write_success_rate(&self) -> f64 {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let total = stats.entries_written + stats.entries_failed;
        if total == 0 {
            1.0
        } else {
            stats.entries_written as f64 / total as f64
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}
