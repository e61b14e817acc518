//! Shutdown signal shared by every long-running loop.

use tokio::sync::watch;

/// Resolves once `true` has been sent on the shutdown channel.
///
/// A dropped sender means nobody can ask for shutdown any more, so this
/// never resolves in that case.
pub async fn signalled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn resolves_when_signalled() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        signalled(&mut rx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sender_never_signals() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let waited = tokio::time::timeout(Duration::from_secs(60), signalled(&mut rx)).await;
        assert!(waited.is_err());
    }
}
