/// poller.rs – Independent, cancellable refresh loops.
///
/// Each source runs in its own tokio task: fetch, forward the result to the
/// main loop over a channel, sleep, repeat. Failures are logged and the loop
/// keeps its schedule. A loop never blocks another one.
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A fetched value tagged with the liveness token of the loop that produced
/// it. The consumer must check `is_live()` before applying: a result that was
/// already queued when its loop got cancelled is stale.
#[derive(Debug)]
pub struct Polled<T> {
    pub source: &'static str,
    pub value: T,
    token: CancellationToken,
}

impl<T> Polled<T> {
    pub fn is_live(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// The value if its loop is still alive.
    pub fn into_live(self) -> Option<T> {
        if self.is_live() {
            Some(self.value)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

pub struct PollHandle {
    pub source: &'static str,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Stop the loop. No further fetch is issued and any in-flight result is
    /// discarded. Idempotent.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            debug!("Cancelling poll loop {}", self.source);
            self.token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// All loops started by the composition root, torn down together.
#[derive(Default)]
pub struct PollerGroup {
    handles: Vec<PollHandle>,
}

impl PollerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: PollHandle) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn cancel_all(&self) {
        for h in &self.handles {
            h.cancel();
        }
        info!("Stopped {} poll loop(s)", self.handles.len());
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Start polling `fetch` every `interval` and forward each success to `tx`.
///
/// The delay starts after a fetch has been fully handled, so fetches for one
/// source never overlap. The loop ends when cancelled or when the receiver
/// is dropped.
pub fn start_polling<T, F, Fut>(
    source: &'static str,
    interval: Duration,
    tx: mpsc::Sender<Polled<T>>,
    mut fetch: F,
) -> PollHandle
where
    T: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let token = CancellationToken::new();
    let alive = token.clone();

    let task = tokio::spawn(async move {
        let mut failing = false;
        loop {
            if alive.is_cancelled() {
                break;
            }

            let result = fetch().await;

            if alive.is_cancelled() {
                debug!("Discarding in-flight {source} result after cancel");
                break;
            }

            match result {
                Ok(value) => {
                    if failing {
                        info!("{source} poll recovered");
                        failing = false;
                    }
                    let polled = Polled {
                        source,
                        value,
                        token: alive.clone(),
                    };
                    if tx.send(polled).await.is_err() {
                        debug!("{source} receiver dropped – stopping loop");
                        break;
                    }
                }
                Err(e) => {
                    if !failing {
                        warn!("{source} poll failing: {e:#}");
                        failing = true;
                    } else {
                        debug!("{source} poll failed: {e:#}");
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = alive.cancelled() => break,
            }
        }
        debug!("{source} poll loop exited");
    });

    PollHandle {
        source,
        token,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    const TICK: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn forwards_results_in_order() {
        let (tx, mut rx) = mpsc::channel(16);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let handle = start_polling("counter", TICK, tx, move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move { Ok(n) }
        });

        let mut seen = Vec::new();
        for _ in 0..3 {
            let p = rx.recv().await.expect("value");
            assert!(p.is_live());
            seen.push(p.value);
        }
        handle.cancel();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_loop() {
        let (tx, mut rx) = mpsc::channel(16);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let handle = start_polling("flaky", TICK, tx, move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                if n % 2 == 0 {
                    anyhow::bail!("transient failure {n}")
                }
                Ok(n)
            }
        });

        let first = rx.recv().await.expect("value").value;
        let second = rx.recv().await.expect("value").value;
        handle.cancel();
        assert_eq!((first, second), (1, 3));
    }

    #[tokio::test]
    async fn in_flight_result_is_discarded_after_cancel() {
        let (tx, mut rx) = mpsc::channel::<Polled<u32>>(16);
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let (e, r) = (Arc::clone(&entered), Arc::clone(&release));
        let handle = start_polling("slow", TICK, tx, move || {
            let (e, r) = (Arc::clone(&e), Arc::clone(&r));
            async move {
                e.notify_one();
                r.notified().await;
                Ok(7)
            }
        });

        entered.notified().await;
        handle.cancel();
        release.notify_one();

        let next = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        match next {
            Ok(None) => {}
            Ok(Some(p)) => assert!(p.into_live().is_none()),
            Err(_) => panic!("loop did not exit after cancel"),
        }
        tokio::time::sleep(TICK).await;
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn queued_result_is_stale_once_cancelled() {
        let (tx, mut rx) = mpsc::channel(16);
        let handle = start_polling("queued", Duration::from_secs(60), tx, || async { Ok(1u8) });

        // Let the first value land in the channel, then cancel before reading.
        tokio::time::sleep(TICK * 3).await;
        handle.cancel();
        let p = rx.recv().await.expect("queued value");
        assert!(!p.is_live());
        assert_eq!(p.into_live(), None);
    }

    #[tokio::test]
    async fn cancel_interrupts_the_delay() {
        let (tx, mut rx) = mpsc::channel(16);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let handle = start_polling("sleepy", Duration::from_secs(3600), tx, move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });

        rx.recv().await.expect("first value");
        handle.cancel();
        tokio::time::sleep(TICK * 3).await;
        assert!(handle.is_finished());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn group_cancels_every_loop() {
        let (tx, _rx) = mpsc::channel::<Polled<()>>(16);
        let mut group = PollerGroup::new();
        group.push(start_polling("a", TICK, tx.clone(), || async { Ok(()) }));
        group.push(start_polling("b", TICK, tx, || async { Ok(()) }));
        assert_eq!(group.len(), 2);
        group.cancel_all();
        assert!(group.handles.iter().all(|h| h.is_cancelled()));
    }
}
