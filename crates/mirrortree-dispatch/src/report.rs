//! Delivery and cycle reports.

use std::time::Duration;

use chrono::{DateTime, Utc};
use strum::Display;

use mirrortree_core::{Changeset, Destination};

use crate::error::DispatchError;

/// What one successful delivery transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Bytes written to the connection.
    pub bytes_sent: u64,
}

/// Outcome of sending a frame to one destination.
#[derive(Debug)]
pub struct DeliveryReport {
    /// The destination as configured.
    pub destination: Destination,
    /// Address that was dialled.
    pub address: String,
    /// Result of the delivery.
    pub result: Result<DeliveryStats, DispatchError>,
    /// Wall time spent on this destination.
    pub elapsed: Duration,
}

impl DeliveryReport {
    /// Check if the frame was delivered.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcome of sending a frame to every destination, in configured order.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// One report per destination.
    pub reports: Vec<DeliveryReport>,
}

impl DispatchOutcome {
    /// Number of destinations that received the frame.
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.is_success()).count()
    }

    /// Number of destinations that did not.
    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded()
    }

    /// Check if every destination received the frame.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Total bytes written across all destinations.
    pub fn bytes_sent(&self) -> u64 {
        self.reports
            .iter()
            .filter_map(|r| r.result.as_ref().ok())
            .map(|s| s.bytes_sent)
            .sum()
    }

    /// Get a human-readable summary of the dispatch.
    pub fn summary(&self) -> String {
        if self.failed() == 0 {
            format!("Delivered to {} destinations", self.succeeded())
        } else {
            format!(
                "Delivered to {} of {} destinations, {} failed",
                self.succeeded(),
                self.reports.len(),
                self.failed()
            )
        }
    }
}

/// Whether a cycle sent the full tree or only changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum CycleKind {
    /// First cycle; everything is sent.
    Initial,
    /// Changes since the baseline.
    Incremental,
}

/// Summary of one replication cycle.
#[derive(Debug)]
pub struct CycleReport {
    /// Initial or incremental.
    pub kind: CycleKind,
    /// When the cycle began.
    pub started_at: DateTime<Utc>,
    /// Time spent on the whole cycle.
    pub duration: Duration,
    /// Directories created.
    pub created_dirs: usize,
    /// Files created.
    pub created_files: usize,
    /// Paths deleted.
    pub deleted: usize,
    /// Files modified.
    pub modified: usize,
    /// Payload bytes in the frame.
    pub payload_bytes: u64,
    /// Entries skipped while building the snapshot.
    pub warnings: usize,
    /// Delivery results, if a frame was sent.
    pub dispatch: Option<DispatchOutcome>,
}

impl CycleReport {
    pub(crate) fn new(kind: CycleKind, started_at: DateTime<Utc>, changes: &Changeset) -> Self {
        Self {
            kind,
            started_at,
            duration: Duration::ZERO,
            created_dirs: changes.created_dirs.len(),
            created_files: changes.created_files.len(),
            deleted: changes.deleted.len(),
            modified: changes.modified.len(),
            payload_bytes: changes.payload_bytes(),
            warnings: 0,
            dispatch: None,
        }
    }

    /// Total number of changed entries.
    pub fn change_count(&self) -> usize {
        self.created_dirs + self.created_files + self.deleted + self.modified
    }

    /// Whether a frame was sent this cycle.
    pub fn sent(&self) -> bool {
        self.dispatch.is_some()
    }
}
