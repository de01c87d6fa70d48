//! Concurrent delivery of a frame to every destination.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mirrortree_core::{DEFAULT_PORT, Destination, ReplicaConfig};
use mirrortree_wire::{Frame, FrameEncoder, ProtocolError};

use crate::error::{DispatchError, Phase};
use crate::report::{DeliveryReport, DeliveryStats, DispatchOutcome};

/// Sends frames to destinations over TCP, one connection per destination.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    port: u16,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(30),
        }
    }
}

impl Dispatcher {
    /// Create a dispatcher with default port and timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dispatcher from replication settings.
    pub fn from_config(config: &ReplicaConfig) -> Self {
        Self {
            port: config.port,
            connect_timeout: config.connect_timeout(),
            write_timeout: config.write_timeout(),
        }
    }

    /// Set the port used for destinations that do not name one.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, limit: Duration) -> Self {
        self.connect_timeout = limit;
        self
    }

    /// Set the timeout for each write.
    pub fn with_write_timeout(mut self, limit: Duration) -> Self {
        self.write_timeout = limit;
        self
    }

    /// Default port for destinations.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Send `frame` to every destination concurrently.
    ///
    /// Each destination is handled independently: a refused connection or a
    /// stalled peer only fails that destination's report. Reports come back
    /// in the order of `destinations`.
    pub async fn send(
        &self,
        frame: Arc<Frame>,
        destinations: &[Destination],
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        let mut tasks = JoinSet::new();

        for (index, destination) in destinations.iter().enumerate() {
            let dispatcher = *self;
            let frame = Arc::clone(&frame);
            let destination = destination.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let start = Instant::now();
                let address = destination.address(dispatcher.port);
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(DispatchError::Cancelled),
                    result = dispatcher.deliver(&address, &frame) => result,
                };
                let report = DeliveryReport {
                    destination,
                    address,
                    result,
                    elapsed: start.elapsed(),
                };
                (index, report)
            });
        }

        let mut slots: Vec<Option<DeliveryReport>> =
            std::iter::repeat_with(|| None).take(destinations.len()).collect();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => {
                    match &report.result {
                        Ok(stats) => info!(
                            destination = %report.destination,
                            bytes = stats.bytes_sent,
                            elapsed_ms = report.elapsed.as_millis() as u64,
                            "changeset delivered"
                        ),
                        Err(err) => warn!(
                            destination = %report.destination,
                            phase = ?err.phase(),
                            error = %err,
                            "delivery failed"
                        ),
                    }
                    slots[index] = Some(report);
                }
                Err(err) => warn!(error = %err, "delivery task failed"),
            }
        }

        let reports = slots
            .into_iter()
            .zip(destinations)
            .map(|(slot, destination)| {
                slot.unwrap_or_else(|| DeliveryReport {
                    destination: destination.clone(),
                    address: destination.address(self.port),
                    result: Err(DispatchError::TaskFailed {
                        message: "delivery task did not complete".to_string(),
                    }),
                    elapsed: Duration::ZERO,
                })
            })
            .collect();

        DispatchOutcome { reports }
    }

    /// Connect, encode, flush and shut down one connection.
    async fn deliver(&self, address: &str, frame: &Frame) -> Result<DeliveryStats, DispatchError> {
        debug!(%address, "connecting");
        let stream = timeout(self.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| DispatchError::Timeout {
                phase: Phase::Connect,
                after: self.connect_timeout,
            })?
            .map_err(|source| DispatchError::Connect {
                address: address.to_string(),
                source,
            })?;

        debug!(%address, "sending frame");
        let mut encoder =
            FrameEncoder::new(BufWriter::new(stream)).with_io_timeout(self.write_timeout);
        let bytes_sent = encoder.encode(frame).await.map_err(|err| match err {
            ProtocolError::Timeout(after) => DispatchError::Timeout {
                phase: Phase::Send,
                after,
            },
            other => DispatchError::Protocol(other),
        })?;

        debug!(%address, "closing connection");
        let mut stream = encoder.into_inner();
        timeout(self.write_timeout, stream.shutdown())
            .await
            .map_err(|_| DispatchError::Timeout {
                phase: Phase::Close,
                after: self.write_timeout,
            })?
            .map_err(|source| DispatchError::Shutdown { source })?;

        Ok(DeliveryStats { bytes_sent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = ReplicaConfig::builder()
            .root("/srv/data")
            .destinations(vec![Destination::new("a")])
            .port(7000u16)
            .connect_timeout_ms(250u64)
            .build()
            .unwrap();

        let dispatcher = Dispatcher::from_config(&config);
        assert_eq!(dispatcher.port(), 7000);
        assert_eq!(dispatcher.connect_timeout, Duration::from_millis(250));
        assert_eq!(dispatcher.write_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_no_destinations() {
        let frame = Arc::new(Frame::initial("r", Default::default()));
        let outcome = Dispatcher::new()
            .send(frame, &[], &CancellationToken::new())
            .await;
        assert!(outcome.reports.is_empty());
        assert!(outcome.is_success());
    }
}
