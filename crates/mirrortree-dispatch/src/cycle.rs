//! Snapshot, diff and dispatch, repeated on a schedule.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mirrortree_core::{ReplicaConfig, Snapshot, SnapshotError};
use mirrortree_diff::{diff, initial};
use mirrortree_scan::TreeBuilder;
use mirrortree_wire::Frame;

use crate::dispatcher::Dispatcher;
use crate::error::CycleError;
use crate::report::{CycleKind, CycleReport};

/// The snapshot a cycle produced, to be used as the next baseline.
#[derive(Debug)]
pub struct CycleResult {
    /// Snapshot taken this cycle.
    pub snapshot: Snapshot,
    /// What happened.
    pub report: CycleReport,
}

/// Drives replication cycles for one root directory.
#[derive(Debug, Clone)]
pub struct Replicator {
    config: ReplicaConfig,
    dispatcher: Dispatcher,
}

impl Replicator {
    /// Create a replicator for a validated configuration.
    pub fn new(config: ReplicaConfig) -> Self {
        let dispatcher = Dispatcher::from_config(&config);
        Self { config, dispatcher }
    }

    /// Replace the dispatcher.
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    /// Create the root directory if it does not exist yet.
    pub fn ensure_root(&self) -> Result<(), CycleError> {
        let root = &self.config.root;
        match std::fs::metadata(root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(SnapshotError::NotADirectory { path: root.clone() }.into()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                std::fs::create_dir_all(root).map_err(|source| CycleError::Bootstrap {
                    path: root.clone(),
                    source,
                })?;
                info!(root = %root.display(), "created root directory");
                Ok(())
            }
            Err(err) => Err(SnapshotError::io(root, err).into()),
        }
    }

    /// Build a snapshot of the root on the blocking pool.
    pub async fn snapshot(&self, cancel: &CancellationToken) -> Result<Snapshot, CycleError> {
        let scan = self.config.scan_config();
        let cancel = cancel.clone();

        let snapshot = tokio::task::spawn_blocking(move || {
            TreeBuilder::new().build_cancellable(&scan, &cancel)
        })
        .await
        .map_err(|e| CycleError::TaskFailed {
            message: e.to_string(),
        })??;

        for warning in &snapshot.warnings {
            debug!(path = %warning.path.display(), kind = %warning.kind, "skipped");
        }
        Ok(snapshot)
    }

    /// Run one cycle against `baseline`.
    ///
    /// Without a baseline the whole tree is sent as an initial sync. With
    /// one, only the differences are sent, and nothing at all when there
    /// are none. Delivery failures are reported, not returned, and the new
    /// snapshot becomes the baseline regardless. A delivery cut short by
    /// `cancel` returns [`CycleError::Cancelled`] instead.
    pub async fn run_cycle(
        &self,
        baseline: Option<&Snapshot>,
        cancel: &CancellationToken,
    ) -> Result<CycleResult, CycleError> {
        let started_at = Utc::now();
        let start = Instant::now();

        let snapshot = self.snapshot(cancel).await?;
        let (kind, changes) = match baseline {
            None => (CycleKind::Initial, initial(&snapshot)),
            Some(previous) => (CycleKind::Incremental, diff(previous, &snapshot)?),
        };

        let mut report = CycleReport::new(kind, started_at, &changes);
        report.warnings = snapshot.warnings.len();

        if kind == CycleKind::Initial || !changes.is_empty() {
            let frame = Arc::new(Frame {
                initial: kind == CycleKind::Initial,
                root_name: snapshot.root_name(),
                changeset: changes,
            });
            let outcome = self
                .dispatcher
                .send(frame, &self.config.destinations, cancel)
                .await;
            if cancel.is_cancelled() {
                info!(%kind, "delivery cancelled, baseline not advanced");
                return Err(CycleError::Cancelled);
            }
            if !outcome.is_success() {
                warn!(%kind, "{}", outcome.summary());
            }
            report.dispatch = Some(outcome);
        } else {
            debug!("no changes since last cycle");
        }

        report.duration = start.elapsed();
        info!(
            %kind,
            created_dirs = report.created_dirs,
            created_files = report.created_files,
            deleted = report.deleted,
            modified = report.modified,
            skipped = report.warnings,
            elapsed_ms = report.duration.as_millis() as u64,
            "cycle complete"
        );

        Ok(CycleResult { snapshot, report })
    }

    /// Run cycles until `cancel` fires.
    ///
    /// The initial sync runs immediately, the first incremental cycle after
    /// the initial delay, and every later one after the interval. A failed
    /// cycle keeps the previous baseline, so its changes are picked up by
    /// the next one.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<(), CycleError> {
        self.ensure_root()?;

        let mut baseline: Option<Snapshot> = None;
        let mut wait = self.config.initial_delay();

        loop {
            match self.run_cycle(baseline.as_ref(), cancel).await {
                Ok(result) => baseline = Some(result.snapshot),
                Err(err) if err.is_cancelled() => break,
                Err(err) => warn!(error = %err, "cycle failed, keeping previous baseline"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
            wait = self.config.interval();
        }

        info!("replication stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrortree_core::Destination;
    use tempfile::TempDir;

    fn config(root: impl Into<std::path::PathBuf>) -> ReplicaConfig {
        ReplicaConfig::builder()
            .root(root)
            .destinations(vec![Destination::new("127.0.0.1")])
            .build()
            .unwrap()
    }

    #[test]
    fn test_ensure_root_creates_missing_directory() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("a/b");

        Replicator::new(config(&root)).ensure_root().unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_ensure_root_rejects_file() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("file");
        std::fs::write(&root, "x").unwrap();

        let err = Replicator::new(config(&root)).ensure_root().unwrap_err();
        assert!(matches!(
            err,
            CycleError::Snapshot(SnapshotError::NotADirectory { .. })
        ));
    }

    #[tokio::test]
    async fn test_unchanged_incremental_sends_nothing() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), "hello").unwrap();
        let replicator = Replicator::new(config(temp.path()));
        let cancel = CancellationToken::new();

        let baseline = replicator.snapshot(&cancel).await.unwrap();
        let result = replicator.run_cycle(Some(&baseline), &cancel).await.unwrap();

        assert_eq!(result.report.kind, CycleKind::Incremental);
        assert_eq!(result.report.change_count(), 0);
        assert!(!result.report.sent());
    }

    #[tokio::test]
    async fn test_cancelled_cycle() {
        let temp = TempDir::new().unwrap();
        let replicator = Replicator::new(config(temp.path()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = replicator.run_cycle(None, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(replicator.run(&cancel).await.is_ok());
    }
}
