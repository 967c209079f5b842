//! Cancellation signal threaded through every client call.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{ClientError, ClientResult};

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal every token derived from this handle.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Another token observing this handle.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        CancelToken {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Observer side of a cancellation signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
}

/// Create a linked handle/token pair.
#[must_use]
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (sender, receiver) = watch::channel(false);
    (CancelHandle { sender }, CancelToken { receiver })
}

impl CancelToken {
    /// A token that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        cancel_pair().1
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once cancellation is requested; pends forever if the handle is
    /// dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cancelled`] tagged with `operation` on cancellation.
    pub async fn sleep(&self, operation: &'static str, duration: Duration) -> ClientResult<()> {
        self.run(operation, async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }

    /// Drive `future` to completion unless cancelled first.
    ///
    /// # Errors
    ///
    /// Propagates the future's error, or [`ClientError::Cancelled`] on cancellation.
    pub async fn run<T, F>(&self, operation: &'static str, future: F) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>>,
    {
        if self.is_cancelled() {
            return Err(ClientError::Cancelled { operation });
        }
        tokio::select! {
            biased;
            () = self.cancelled() => Err(ClientError::Cancelled { operation }),
            result = future => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn never_token_lets_work_finish() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
        let value = token.run("op", async { Ok(7) }).await;
        assert!(matches!(value, Ok(7)));
    }

    #[tokio::test]
    async fn cancelled_sleep_reports_the_operation() {
        let (handle, token) = cancel_pair();
        let sleeper = tokio::spawn({
            let token = token.clone();
            async move { token.sleep("reannounce_wait", Duration::from_secs(3600)).await }
        });
        handle.cancel();
        let result = sleeper.await.expect("join");
        assert!(matches!(
            result,
            Err(ClientError::Cancelled {
                operation: "reannounce_wait"
            })
        ));
        assert!(token.is_cancelled());
        assert!(handle.token().is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_tokens_skip_the_future() {
        let (handle, token) = cancel_pair();
        handle.cancel();
        let result: ClientResult<()> = token
            .run("pause_torrents", async {
                Err(ClientError::Unsupported {
                    operation: "pause_torrents",
                })
            })
            .await;
        assert!(matches!(result, Err(ClientError::Cancelled { .. })));
    }
}
