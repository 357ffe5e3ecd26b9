//! Priority refresh queue with a single background drain task.
//!
//! [`RefreshQueue::enqueue`] pushes a [`RefreshRequest`] and, if the queue is
//! [`QueueState::Idle`], flips it to [`QueueState::Draining`] and spawns the
//! drain task, all under one lock. The drain task pops entries by priority
//! (FIFO within a priority), resolves the live item through a
//! [`RefreshWorker`], waits out the throttle and refreshes it. When it finds
//! the queue empty it returns to `Idle` under the same lock it popped with, so
//! a concurrent enqueue either sees `Draining` and has its entry picked up, or
//! sees `Idle` and starts a fresh task.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use curator_common::{
    BaseItem, Error, ItemId, ItemKind, MetadataRefreshOptions, RefreshPriority, Result,
};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A pending refresh.
#[derive(Debug, Clone)]
pub struct RefreshRequest {
    pub item_id: ItemId,
    pub options: MetadataRefreshOptions,
    pub priority: RefreshPriority,
}

struct QueuedRefresh {
    request: RefreshRequest,
    sequence: u64, // For stable ordering within a priority
}

impl PartialEq for QueuedRefresh {
    fn eq(&self, other: &Self) -> bool {
        self.request.priority == other.request.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedRefresh {}

impl PartialOrd for QueuedRefresh {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedRefresh {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: lower priority value first, then earlier sequence
        other
            .request
            .priority
            .cmp(&self.request.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Whether a drain task is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Draining,
}

struct Inner {
    pending: BinaryHeap<QueuedRefresh>,
    next_sequence: u64,
    state: QueueState,
    closed: bool,
}

/// What the drain task needs from its owner.
#[async_trait]
pub trait RefreshWorker: Send + Sync + 'static {
    /// Resolve a queued id to the live item, or `None` if it is gone.
    fn resolve(&self, item_id: ItemId) -> Option<BaseItem>;

    async fn refresh_item(
        &self,
        item: &BaseItem,
        options: &MetadataRefreshOptions,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn refresh_artist(
        &self,
        item: &BaseItem,
        options: &MetadataRefreshOptions,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

pub struct RefreshQueue {
    inner: Arc<Mutex<Inner>>,
    throttle: Duration,
    cancel: CancellationToken,
}

impl RefreshQueue {
    /// Create an idle queue that pauses `throttle` before each refresh.
    pub fn new(throttle: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                pending: BinaryHeap::new(),
                next_sequence: 0,
                state: QueueState::Idle,
                closed: false,
            })),
            throttle,
            cancel: CancellationToken::new(),
        }
    }

    /// Queue a refresh, starting the drain task if none is running.
    ///
    /// Never blocks and never fails; does nothing after [`shutdown`](Self::shutdown).
    pub fn enqueue<W: RefreshWorker>(
        &self,
        item_id: ItemId,
        options: MetadataRefreshOptions,
        priority: RefreshPriority,
        worker: Arc<W>,
    ) {
        let mut inner = self.inner.lock();
        if inner.closed {
            debug!(item_id = %item_id, "Refresh queue is shut down; dropping request");
            return;
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.pending.push(QueuedRefresh {
            request: RefreshRequest {
                item_id,
                options,
                priority,
            },
            sequence,
        });
        debug!(item_id = %item_id, priority = %priority, "Queued refresh");

        if inner.state == QueueState::Draining {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                inner.state = QueueState::Draining;
                handle.spawn(drain(
                    Arc::clone(&self.inner),
                    self.throttle,
                    self.cancel.clone(),
                    worker,
                ));
            }
            Err(e) => {
                warn!(error = %e, "No async runtime available; refresh stays queued");
            }
        }
    }

    pub fn state(&self) -> QueueState {
        self.inner.lock().state
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }

    /// Pending item ids, each mapped to itself.
    pub fn snapshot(&self) -> HashMap<ItemId, ItemId> {
        let inner = self.inner.lock();
        inner
            .pending
            .iter()
            .map(|q| (q.request.item_id, q.request.item_id))
            .collect()
    }

    /// Token observed by the drain task and everything it calls.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop accepting requests and stop the drain task after its current item.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.cancel.cancel();
        info!(pending = inner.pending.len(), "Refresh queue shut down");
    }
}

/// Returns the queue to `Idle` if the drain task exits without doing so itself
/// (cancellation, or a panic inside a refresh).
struct DrainGuard {
    inner: Arc<Mutex<Inner>>,
    armed: bool,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if self.armed {
            self.inner.lock().state = QueueState::Idle;
        }
    }
}

async fn drain<W: RefreshWorker>(
    inner: Arc<Mutex<Inner>>,
    throttle: Duration,
    cancel: CancellationToken,
    worker: Arc<W>,
) {
    let mut guard = DrainGuard {
        inner: Arc::clone(&inner),
        armed: true,
    };
    debug!("Refresh queue drain started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let request = {
            let mut inner = inner.lock();
            match inner.pending.pop() {
                Some(queued) => queued.request,
                None => {
                    inner.state = QueueState::Idle;
                    guard.armed = false;
                    break;
                }
            }
        };

        let Some(item) = worker.resolve(request.item_id) else {
            debug!(item_id = %request.item_id, "Queued item no longer exists; skipping");
            continue;
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(throttle) => {}
        }

        let refresh = async {
            if item.kind == ItemKind::MusicArtist {
                worker.refresh_artist(&item, &request.options, &cancel).await
            } else {
                worker.refresh_item(&item, &request.options, &cancel).await
            }
        };

        match AssertUnwindSafe(refresh).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(Error::Cancelled)) => break,
            Err(_) => {
                error!(item_id = %item.id, item = %item.name, "Refresh panicked");
            }
            Ok(Err(e)) => {
                error!(
                    item_id = %item.id,
                    item = %item.name,
                    error = %e,
                    "Error refreshing item"
                );
            }
        }
    }

    debug!("Refresh queue drain stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use tokio::sync::mpsc;

    /// Records refreshed ids on a channel.
    struct RecordingWorker {
        items: HashMap<ItemId, BaseItem>,
        done: mpsc::UnboundedSender<ItemId>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail: Option<ItemId>,
        panic_on: Option<ItemId>,
    }

    impl RecordingWorker {
        fn new(items: &[BaseItem]) -> (Arc<Self>, mpsc::UnboundedReceiver<ItemId>) {
            let (done, rx) = mpsc::unbounded_channel();
            let worker = Self {
                items: items.iter().map(|i| (i.id, i.clone())).collect(),
                done,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                fail: None,
                panic_on: None,
            };
            (Arc::new(worker), rx)
        }

        async fn record(&self, item: &BaseItem) -> Result<()> {
            let now = self.in_flight.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, AtomicOrdering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, AtomicOrdering::SeqCst);
            let _ = self.done.send(item.id);
            if self.panic_on == Some(item.id) {
                panic!("refresh blew up");
            }
            if self.fail == Some(item.id) {
                return Err(Error::provider("stub", "refresh failed"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RefreshWorker for RecordingWorker {
        fn resolve(&self, item_id: ItemId) -> Option<BaseItem> {
            self.items.get(&item_id).cloned()
        }

        async fn refresh_item(
            &self,
            item: &BaseItem,
            _options: &MetadataRefreshOptions,
            _cancel: &CancellationToken,
        ) -> Result<()> {
            self.record(item).await
        }

        async fn refresh_artist(
            &self,
            item: &BaseItem,
            options: &MetadataRefreshOptions,
            cancel: &CancellationToken,
        ) -> Result<()> {
            assert_eq!(item.kind, ItemKind::MusicArtist);
            self.refresh_item(item, options, cancel).await
        }
    }

    fn movies(n: usize) -> Vec<BaseItem> {
        (0..n)
            .map(|i| BaseItem::new(ItemKind::Movie, format!("Movie {i}")))
            .collect()
    }

    async fn collect(rx: &mut mpsc::UnboundedReceiver<ItemId>, n: usize) -> Vec<ItemId> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let id = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for refresh")
                .expect("worker dropped");
            out.push(id);
        }
        out
    }

    async fn wait_idle(queue: &RefreshQueue) {
        for _ in 0..100 {
            if queue.state() == QueueState::Idle {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue never returned to idle");
    }

    #[tokio::test(start_paused = true)]
    async fn high_before_low_fifo_within_priority() {
        let items = movies(3);
        let (a, b, c) = (items[0].id, items[1].id, items[2].id);
        let (worker, mut rx) = RecordingWorker::new(&items);
        let queue = RefreshQueue::new(Duration::from_millis(100));

        for (id, priority) in [
            (a, RefreshPriority::High),
            (b, RefreshPriority::Low),
            (c, RefreshPriority::High),
        ] {
            queue.enqueue(
                id,
                MetadataRefreshOptions::default(),
                priority,
                Arc::clone(&worker),
            );
        }

        assert_eq!(collect(&mut rx, 3).await, vec![a, c, b]);
        wait_idle(&queue).await;
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn priorities_are_non_decreasing() {
        let items = movies(9);
        let (worker, mut rx) = RecordingWorker::new(&items);
        let queue = RefreshQueue::new(Duration::from_millis(100));
        let priorities = [
            RefreshPriority::Low,
            RefreshPriority::Normal,
            RefreshPriority::High,
        ];

        let mut expected: Vec<(RefreshPriority, usize, ItemId)> = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let priority = priorities[i % 3];
            expected.push((priority, i, item.id));
            queue.enqueue(
                item.id,
                MetadataRefreshOptions::default(),
                priority,
                Arc::clone(&worker),
            );
        }
        expected.sort();
        let expected: Vec<ItemId> = expected.into_iter().map(|(_, _, id)| id).collect();

        assert_eq!(collect(&mut rx, 9).await, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_items_and_failures_do_not_stall() {
        let mut items = movies(2);
        let artist = BaseItem::new(ItemKind::MusicArtist, "Nina Simone");
        items.push(artist.clone());
        let (done, mut rx) = mpsc::unbounded_channel();
        let worker = Arc::new(RecordingWorker {
            items: items.iter().map(|i| (i.id, i.clone())).collect(),
            done,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            fail: Some(items[0].id),
            panic_on: None,
        });
        let queue = RefreshQueue::new(Duration::from_millis(100));

        let ghost = ItemId::new();
        for id in [items[0].id, ghost, items[1].id, artist.id] {
            queue.enqueue(
                id,
                MetadataRefreshOptions::default(),
                RefreshPriority::Normal,
                Arc::clone(&worker),
            );
        }

        assert_eq!(
            collect(&mut rx, 3).await,
            vec![items[0].id, items[1].id, artist.id]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_refresh_does_not_stall_the_queue() {
        let items = movies(2);
        let (a, b) = (items[0].id, items[1].id);
        let (done, mut rx) = mpsc::unbounded_channel();
        let worker = Arc::new(RecordingWorker {
            items: items.iter().map(|i| (i.id, i.clone())).collect(),
            done,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            fail: None,
            panic_on: Some(a),
        });
        let queue = RefreshQueue::new(Duration::from_millis(100));

        queue.enqueue(
            a,
            MetadataRefreshOptions::default(),
            RefreshPriority::High,
            Arc::clone(&worker),
        );
        queue.enqueue(
            b,
            MetadataRefreshOptions::default(),
            RefreshPriority::Low,
            Arc::clone(&worker),
        );

        assert_eq!(collect(&mut rx, 2).await, vec![a, b]);
        wait_idle(&queue).await;
        assert!(queue.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_enqueue_runs_one_drain() {
        let items = movies(64);
        let (worker, mut rx) = RecordingWorker::new(&items);
        let queue = Arc::new(RefreshQueue::new(Duration::ZERO));

        let mut handles = Vec::new();
        for chunk in items.chunks(8) {
            let queue = Arc::clone(&queue);
            let worker = Arc::clone(&worker);
            let ids: Vec<ItemId> = chunk.iter().map(|i| i.id).collect();
            handles.push(tokio::spawn(async move {
                for id in ids {
                    queue.enqueue(
                        id,
                        MetadataRefreshOptions::default(),
                        RefreshPriority::Normal,
                        Arc::clone(&worker),
                    );
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut seen = collect(&mut rx, 64).await;
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 64);
        assert_eq!(worker.max_in_flight.load(AtomicOrdering::SeqCst), 1);
        wait_idle(&queue).await;
    }

    #[tokio::test(start_paused = true)]
    async fn restarts_after_going_idle() {
        let items = movies(2);
        let (worker, mut rx) = RecordingWorker::new(&items);
        let queue = RefreshQueue::new(Duration::from_millis(100));

        queue.enqueue(
            items[0].id,
            MetadataRefreshOptions::default(),
            RefreshPriority::Normal,
            Arc::clone(&worker),
        );
        assert_eq!(collect(&mut rx, 1).await, vec![items[0].id]);
        wait_idle(&queue).await;

        queue.enqueue(
            items[1].id,
            MetadataRefreshOptions::default(),
            RefreshPriority::Normal,
            Arc::clone(&worker),
        );
        assert_eq!(queue.state(), QueueState::Draining);
        assert_eq!(collect(&mut rx, 1).await, vec![items[1].id]);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_and_shutdown() {
        let items = movies(2);
        let (worker, mut rx) = RecordingWorker::new(&items);
        let queue = RefreshQueue::new(Duration::from_secs(60));

        for item in &items {
            queue.enqueue(
                item.id,
                MetadataRefreshOptions::default(),
                RefreshPriority::Normal,
                Arc::clone(&worker),
            );
        }
        let snapshot = queue.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(&items[0].id), Some(&items[0].id));

        // Let the drain task pop the first item and start its throttle wait.
        tokio::task::yield_now().await;
        queue.shutdown();
        wait_idle(&queue).await;

        let pending = queue.len();
        queue.enqueue(
            ItemId::new(),
            MetadataRefreshOptions::default(),
            RefreshPriority::High,
            Arc::clone(&worker),
        );
        assert_eq!(queue.len(), pending);
        assert_eq!(queue.state(), QueueState::Idle);
        assert!(queue.cancellation_token().is_cancelled());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn enqueue_without_runtime_keeps_request() {
        let items = movies(1);
        let (worker, _rx) = RecordingWorker::new(&items);
        let queue = RefreshQueue::new(Duration::ZERO);
        queue.enqueue(
            items[0].id,
            MetadataRefreshOptions::default(),
            RefreshPriority::Normal,
            worker,
        );
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.state(), QueueState::Idle);
    }
}
