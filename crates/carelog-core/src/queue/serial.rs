//! SerialWriteQueue - store への read-modify-write を直列化するキュー
//!
//! key-value store の API は「配列を読む → push → 書き戻す」を atomic に実行できません。
//! 複数の呼び出し元が同時に保存すると、後から書いた側が先の書き込みを上書きして
//! 更新が静かに失われます。このキューを通した operation は一度に一つずつ、
//! 投入順（FIFO）に実行されます。
//!
//! # 保証
//! - 同時に実行される operation は高々一つ（mutual exclusion）
//! - 投入順に開始し、前の operation が settle してから次が始まる
//! - operation の結果・エラーはそのまま呼び出し元に返る（ラップしない）
//! - 失敗した operation はキューを止めない
//!
//! # 制約
//! - operation が settle しないとキュー全体が止まる（watchdog は無い）
//! - キューを通さずに store を書き換えるコードからは守れない
//! - queued operation の中から同じキューに投入して await するとデッドロックする

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot};

use super::QueueState;
use crate::error::QueueError;
use crate::observability::QueueStats;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Object-safe view of a queued operation together with its reply channel.
trait PendingOp: Send {
    /// Run the operation and deliver its outcome to the waiting caller.
    fn run(self: Box<Self>) -> BoxFuture;

    /// Settle the caller without running the operation.
    fn abandon(self: Box<Self>, reason: QueueError);
}

struct Pending<F, T, E> {
    operation: F,
    reply: oneshot::Sender<Result<T, E>>,
}

impl<F, Fut, T, E> PendingOp for Pending<F, T, E>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<QueueError> + Send + 'static,
{
    fn run(self: Box<Self>) -> BoxFuture {
        let Pending { operation, reply } = *self;
        Box::pin(async move {
            let outcome = operation().await;
            // the caller may have dropped its ticket; the operation still ran
            let _ = reply.send(outcome);
        })
    }

    fn abandon(self: Box<Self>, reason: QueueError) {
        let _ = self.reply.send(Err(E::from(reason)));
    }
}

#[derive(Default)]
struct QueueInner {
    pending: VecDeque<Box<dyn PendingOp>>,
    state: QueueState,
    in_flight: bool,
    settled: u64,
    panicked: u64,
    cleared: u64,
}

#[derive(Default)]
struct Shared {
    inner: Mutex<QueueInner>,
    idle: Notify,
}

impl Shared {
    // critical sections never await and never call user code, so a poisoned lock
    // still holds consistent bookkeeping
    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// FIFO, single-flight executor for asynchronous store operations.
///
/// Cloning is cheap and yields another handle to the same queue.
///
/// # 使用例
/// ```ignore
/// let queue = SerialWriteQueue::new();
/// let count = queue
///     .enqueue(move || async move {
///         let mut items = store.read().await?;
///         items.push(item);
///         store.write(&items).await?;
///         Ok::<_, StoreError>(items.len())
///     })
///     .await?;
/// ```
#[derive(Clone, Default)]
pub struct SerialWriteQueue {
    shared: Arc<Shared>,
    handle: Option<Handle>,
}

impl SerialWriteQueue {
    /// Create an idle, empty queue that spawns its drain loop on the ambient Tokio runtime.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue whose drain loop always runs on `handle`.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            shared: Arc::default(),
            handle: Some(handle),
        }
    }

    /// Schedule `operation` for exclusive execution and return a future mirroring its outcome.
    ///
    /// The append is synchronous: two calls made one after another are ordered by call order,
    /// even if neither ticket has been polled yet. The operation runs even if the returned
    /// ticket is dropped.
    ///
    /// The queue's own errors reach the caller through `E: From<QueueError>`; the
    /// operation's errors come back exactly as produced.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime on a queue built with [`SerialWriteQueue::new`].
    pub fn enqueue<F, Fut, T, E>(&self, operation: F) -> Ticket<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<QueueError> + Send + 'static,
    {
        // resolved before the queue is touched: outside a runtime this panics with the
        // queue still consistent
        let handle = self.handle.clone().unwrap_or_else(Handle::current);
        let (reply, receiver) = oneshot::channel();

        let start_drain = {
            let mut inner = self.shared.lock();
            inner.pending.push_back(Box::new(Pending { operation, reply }));
            if inner.state.is_draining() {
                false
            } else {
                inner.state = QueueState::Draining;
                true
            }
        };

        if start_drain {
            tracing::debug!("serial queue: idle -> draining");
            handle.spawn(drain(Arc::clone(&self.shared), handle.clone()));
        }

        Ticket { receiver }
    }

    /// Number of operations waiting to run. The operation in flight is not counted.
    pub fn size(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether a drain loop is currently active.
    pub fn is_draining(&self) -> bool {
        self.shared.lock().state.is_draining()
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.shared.lock();
        QueueStats {
            state: inner.state,
            pending: inner.pending.len(),
            in_flight: inner.in_flight,
            settled: inner.settled,
            panicked: inner.panicked,
            cleared: inner.cleared,
        }
    }

    /// Resolve once the queue is idle (no drain loop, nothing pending).
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_draining() {
                return;
            }
            notified.await;
        }
    }

    /// Discard every pending operation without running it.
    ///
    /// Escape hatch for test teardown or a catastrophic reset; never call it in normal
    /// operation. Discarded callers are settled with [`QueueError::Cleared`]. The operation in
    /// flight, if any, is not affected and the queue keeps accepting work afterwards.
    ///
    /// Returns the number of discarded operations.
    pub fn clear(&self) -> usize {
        let discarded: Vec<_> = {
            let mut inner = self.shared.lock();
            let discarded: Vec<_> = inner.pending.drain(..).collect();
            inner.cleared += discarded.len() as u64;
            discarded
        };

        let count = discarded.len();
        if count > 0 {
            tracing::warn!(discarded = count, "serial queue cleared with pending operations");
        }
        for op in discarded {
            op.abandon(QueueError::Cleared);
        }
        count
    }
}

impl std::fmt::Debug for SerialWriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialWriteQueue")
            .field("stats", &self.stats())
            .finish()
    }
}

async fn drain(shared: Arc<Shared>, handle: Handle) {
    loop {
        let next = {
            let mut inner = shared.lock();
            match inner.pending.pop_front() {
                Some(op) => {
                    inner.in_flight = true;
                    op
                }
                None => {
                    inner.state = QueueState::Idle;
                    inner.in_flight = false;
                    break;
                }
            }
        };

        // 各 operation は専用タスクで実行する: panic してもこのループは生き残る
        let result = handle.spawn(next.run()).await;

        {
            let mut inner = shared.lock();
            inner.in_flight = false;
            match result {
                Ok(()) => inner.settled += 1,
                Err(err) => {
                    inner.panicked += 1;
                    tracing::error!(error = %err, "serial queue: operation aborted before settling");
                }
            }
        }
    }

    tracing::debug!("serial queue: draining -> idle");
    shared.idle.notify_waiters();
}

/// Future returned by [`SerialWriteQueue::enqueue`].
///
/// Resolves with the operation's own `Result`. Dropping it does not cancel the operation.
#[must_use = "the operation runs anyway, but its outcome is lost unless the ticket is awaited"]
pub struct Ticket<T, E> {
    receiver: oneshot::Receiver<Result<T, E>>,
}

impl<T, E: From<QueueError>> Future for Ticket<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // the reply sender was dropped without a value: the operation never settled
            Poll::Ready(Err(_)) => Poll::Ready(Err(E::from(QueueError::Panicked))),
            Poll::Pending => Poll::Pending,
        }
    }
}
