use std::fs;
use std::sync::Arc;
use std::time::Duration;

use mirrortree_core::{Changeset, Destination, FileChange, Payload, RelativePath, ReplicaConfig};
use mirrortree_dispatch::{CycleError, CycleKind, DispatchError, Dispatcher, Phase, Replicator};
use mirrortree_wire::{Frame, FrameDecoder};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Accept connections forever, decoding one frame from each.
async fn receiver() -> (u16, mpsc::UnboundedReceiver<Frame>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Ok(frame) = FrameDecoder::new(stream).decode().await {
                    let _ = tx.send(frame);
                }
            });
        }
    });

    (port, rx)
}

/// A loopback port with nothing listening on it.
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn local(port: u16) -> Destination {
    Destination::new("127.0.0.1").with_port(port)
}

fn sample_frame() -> Arc<Frame> {
    let mut changes = Changeset::new();
    changes.created_files.push(FileChange::in_memory(
        RelativePath::parse("a.txt").unwrap(),
        b"hello".to_vec(),
    ));
    Arc::new(Frame::initial("root", changes))
}

#[tokio::test]
async fn test_frame_reaches_destination() {
    let (port, mut rx) = receiver().await;

    let outcome = Dispatcher::new()
        .send(sample_frame(), &[local(port)], &CancellationToken::new())
        .await;

    assert!(outcome.is_success());
    let frame = rx.recv().await.unwrap();
    assert!(frame.initial);
    assert_eq!(frame.root_name, "root");
    assert_eq!(
        frame.changeset.created_files[0].payload,
        Payload::Bytes(b"hello".to_vec())
    );
}

#[tokio::test]
async fn test_unreachable_destination_is_isolated() {
    let (good, mut rx) = receiver().await;
    let bad = closed_port().await;

    let outcome = Dispatcher::new()
        .with_connect_timeout(Duration::from_secs(2))
        .send(
            sample_frame(),
            &[local(bad), local(good)],
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.reports.len(), 2);
    assert_eq!(outcome.succeeded(), 1);
    assert_eq!(outcome.reports[0].destination, local(bad));
    let err = outcome.reports[0].result.as_ref().unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Connect));
    assert!(outcome.reports[1].is_success());
    assert!(rx.recv().await.is_some());
}

#[tokio::test]
async fn test_cancelled_dispatch() {
    let (port, _rx) = receiver().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = Dispatcher::new()
        .send(sample_frame(), &[local(port)], &cancel)
        .await;

    assert!(matches!(
        outcome.reports[0].result,
        Err(DispatchError::Cancelled)
    ));
}

#[tokio::test]
async fn test_cycles_against_live_receiver() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("data");
    let (port, mut rx) = receiver().await;

    let config = ReplicaConfig::builder()
        .root(&root)
        .destinations(vec![local(port)])
        .build()
        .unwrap();
    let replicator = Replicator::new(config);
    let cancel = CancellationToken::new();

    replicator.ensure_root().unwrap();
    fs::write(root.join("a.txt"), "hello").unwrap();

    let first = replicator.run_cycle(None, &cancel).await.unwrap();
    assert_eq!(first.report.kind, CycleKind::Initial);
    assert_eq!(first.report.created_files, 1);

    let frame = rx.recv().await.unwrap();
    assert!(frame.initial);
    assert_eq!(frame.root_name, "data");
    assert_eq!(
        frame.changeset.created_files[0].payload,
        Payload::Bytes(b"hello".to_vec())
    );

    fs::create_dir(root.join("b")).unwrap();
    fs::write(root.join("b/c.txt"), "x").unwrap();
    fs::remove_file(root.join("a.txt")).unwrap();

    let second = replicator
        .run_cycle(Some(&first.snapshot), &cancel)
        .await
        .unwrap();
    assert!(second.report.sent());

    let frame = rx.recv().await.unwrap();
    assert!(!frame.initial);
    let dirs: Vec<&str> = frame.changeset.created_dirs.iter().map(|p| p.as_str()).collect();
    assert_eq!(dirs, vec!["b"]);
    assert_eq!(frame.changeset.created_files[0].path.as_str(), "b/c.txt");
    assert_eq!(frame.changeset.deleted[0].as_str(), "a.txt");
    assert!(frame.changeset.modified.is_empty());

    let third = replicator
        .run_cycle(Some(&second.snapshot), &cancel)
        .await
        .unwrap();
    assert!(!third.report.sent());
}

#[tokio::test]
async fn test_initial_sync_of_empty_root_is_still_sent() {
    let temp = TempDir::new().unwrap();
    let (port, mut rx) = receiver().await;

    let config = ReplicaConfig::builder()
        .root(temp.path())
        .destinations(vec![local(port)])
        .build()
        .unwrap();
    let result = Replicator::new(config)
        .run_cycle(None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.report.sent());
    let frame = rx.recv().await.unwrap();
    assert!(frame.initial);
    assert!(frame.changeset.is_empty());
}

#[tokio::test]
async fn test_cancelled_delivery_fails_the_cycle() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("big.bin"), vec![7u8; 32 * 1024 * 1024]).unwrap();

    // Accept but never read, so the sender stalls once socket buffers fill.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (accepted_tx, accepted_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ = accepted_tx.send(());
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(stream);
    });

    let config = ReplicaConfig::builder()
        .root(temp.path())
        .destinations(vec![local(port)])
        .build()
        .unwrap();
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        if accepted_rx.await.is_ok() {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        }
    });

    let err = Replicator::new(config)
        .run_cycle(None, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CycleError::Cancelled));
    assert!(err.is_cancelled());
}
