//! Bounded hand-off from traversal to the scheduler.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::discovery::FileDiscovery;
use crate::types::MediaFile;

/// Create a bounded channel pair with the configured buffer size.
///
/// When the buffer is full, the sender will block, providing backpressure
/// so traversal of a huge tree never runs far ahead of conversion.
pub fn bounded_channel<T>(capacity: usize) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
    mpsc::channel(capacity.max(1))
}

/// Walk the tree on the blocking pool, streaming files into a bounded channel.
///
/// The task ends early if the receiver is dropped. Returns the number of
/// files sent.
pub fn spawn_traversal(
    discovery: FileDiscovery,
    capacity: usize,
) -> (JoinHandle<usize>, mpsc::Receiver<MediaFile>) {
    let (tx, rx) = bounded_channel(capacity);
    let handle = tokio::task::spawn_blocking(move || {
        let mut sent = 0;
        for file in discovery.iter() {
            if tx.blocking_send(file).is_err() {
                tracing::debug!("Dispatcher stopped; ending traversal after {} files", sent);
                break;
            }
            sent += 1;
        }
        sent
    });
    (handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_bounded_channel() {
        let (tx, mut rx) = bounded_channel::<i32>(10);
        tx.send(42).await.unwrap();
        assert_eq!(rx.recv().await, Some(42));
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let (tx, mut rx) = bounded_channel::<i32>(0);
        tx.send(1).await.unwrap();
        assert_eq!(rx.recv().await, Some(1));
    }

    #[tokio::test]
    async fn test_traversal_streams_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.jpg", "a.jpg", "b/x.mov"] {
            let path = dir.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, b"").unwrap();
        }

        // Capacity 1 forces traversal to wait on the consumer
        let (handle, mut rx) = spawn_traversal(FileDiscovery::new(dir.path()), 1);
        let mut seen = Vec::new();
        while let Some(file) = rx.recv().await {
            seen.push(file.relative_path);
        }
        assert_eq!(handle.await.unwrap(), 3);
        assert_eq!(
            seen,
            vec![
                PathBuf::from("a.jpg"),
                PathBuf::from("b/x.mov"),
                PathBuf::from("c.jpg")
            ]
        );
    }

    #[tokio::test]
    async fn test_traversal_stops_when_receiver_dropped() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..20 {
            std::fs::write(dir.path().join(format!("{i:02}.png")), b"").unwrap();
        }
        let (handle, rx) = spawn_traversal(FileDiscovery::new(dir.path()), 1);
        drop(rx);
        assert!(handle.await.unwrap() < 20);
    }
}
