//! Changeset delivery for mirrortree.
//!
//! [`Dispatcher`] sends one encoded frame to every destination over TCP,
//! concurrently and independently. [`Replicator`] ties the pieces together:
//! each cycle builds a snapshot, diffs it against the baseline from the
//! previous cycle and dispatches the result.
//!
//! ```rust,ignore
//! use mirrortree_core::ReplicaConfig;
//! use mirrortree_dispatch::Replicator;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ReplicaConfig::from_toml_file("mirrortree.toml".as_ref())?;
//! let cancel = CancellationToken::new();
//! Replicator::new(config).run(&cancel).await?;
//! ```

mod cycle;
mod dispatcher;
mod error;
mod report;

pub use cycle::{CycleResult, Replicator};
pub use dispatcher::Dispatcher;
pub use error::{CycleError, DispatchError, Phase};
pub use report::{CycleKind, CycleReport, DeliveryReport, DeliveryStats, DispatchOutcome};
