//! Background decode/encode jobs.
//!
//! A job runs on its own thread and reports one `Result` over a channel.
//! Cancellation is cooperative: the worker checks its [`CancelToken`]
//! before starting and between pipeline phases.  Nothing here touches a
//! [`Session`](crate::session::Session); the caller applies the result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;

use tracing::debug;

use crate::container::BlockCodec;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::keymap::KeyMapping;
use crate::pipeline::{self, DecodedSave};

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

pub struct Job<T> {
    rx: mpsc::Receiver<Result<T>>,
    token: CancelToken,
}

impl<T> Job<T> {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Non-blocking poll.  `None` while the job is still running.
    pub fn try_wait(&self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Error::WorkerLost)),
        }
    }

    pub fn wait(self) -> Result<T> {
        self.rx.recv().unwrap_or(Err(Error::WorkerLost))
    }
}

pub fn spawn<T, F>(f: F) -> Job<T>
where
    T: Send + 'static,
    F: FnOnce(&CancelToken) -> Result<T> + Send + 'static,
{
    spawn_with_token(CancelToken::new(), f)
}

/// Like [`spawn`], sharing an existing token so several jobs can be
/// cancelled together.
pub fn spawn_with_token<T, F>(token: CancelToken, f: F) -> Job<T>
where
    T: Send + 'static,
    F: FnOnce(&CancelToken) -> Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let worker_token = token.clone();
    std::thread::spawn(move || {
        let result = worker_token.check().and_then(|()| f(&worker_token));
        if matches!(result, Err(Error::Cancelled)) {
            debug!("background job cancelled");
        }
        // The receiver may already be gone; nobody is left to tell.
        let _ = tx.send(result);
    });
    Job { rx, token }
}

pub fn spawn_decode(raw: Vec<u8>, codec: BlockCodec, mapping: Arc<KeyMapping>) -> Job<DecodedSave> {
    spawn(move |token| pipeline::decode_save_cancellable(&raw, &codec, &mapping, token))
}

pub fn spawn_encode(
    header: Option<Header>,
    document: Document,
    codec: BlockCodec,
    mapping: Arc<KeyMapping>,
) -> Job<Vec<u8>> {
    spawn(move |token| {
        pipeline::encode_save_cancellable(header.as_ref(), &document, &codec, &mapping, token)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    #[test]
    fn delivers_result() {
        let job = spawn(|_| Ok(21 * 2));
        assert_eq!(job.wait().unwrap(), 42);
    }

    #[test]
    fn cancelled_before_start() {
        let token = CancelToken::new();
        token.cancel();
        let job = spawn_with_token(token, |_| -> Result<()> { panic!("must not run") });
        assert!(matches!(job.wait(), Err(Error::Cancelled)));
    }

    #[test]
    fn cancelled_between_phases() {
        let gate = Arc::new(Barrier::new(2));
        let worker_gate = Arc::clone(&gate);
        let job = spawn(move |token| {
            worker_gate.wait();
            worker_gate.wait();
            token.check()?;
            Ok("finished")
        });
        gate.wait();
        job.cancel();
        gate.wait();
        assert!(matches!(job.wait(), Err(Error::Cancelled)));
    }

    #[test]
    fn panicking_worker_is_lost() {
        let job = spawn(|_| -> Result<u8> { panic!("worker died") });
        assert!(matches!(job.wait(), Err(Error::WorkerLost)));
    }

    #[test]
    fn try_wait_eventually_reports() {
        let job = spawn(|_| Ok(7u8));
        let result = loop {
            if let Some(r) = job.try_wait() {
                break r;
            }
            std::thread::yield_now();
        };
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn background_decode_matches_inline() {
        let mapping = Arc::new(KeyMapping::from_iter([("F2P", "Version")]));
        let codec = BlockCodec::default();
        let raw = codec
            .encode(Some(&Header::default()), br#"{"F2P":"1.0"}"#)
            .unwrap();
        let decoded = spawn_decode(raw, codec, Arc::clone(&mapping)).wait().unwrap();
        assert_eq!(decoded.document.tree, serde_json::json!({"Version": "1.0"}));

        let again = spawn_encode(decoded.header, decoded.document, codec, mapping)
            .wait()
            .unwrap();
        assert_eq!(codec.decode(&again).unwrap().stream, br#"{"F2P":"1.0"}"#.to_vec());
    }
}
