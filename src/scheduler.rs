//! Admission-control scheduler for outbound actions.
//!
//! Every outbound effect an agent produces goes through [`Scheduler::enqueue`]. A single
//! background dispatch loop pops requests in priority order, holds them back while the
//! sliding-window quota is exhausted, sleeps a jittered pacing delay, and only then runs the
//! action. Exactly one action is in flight at any time.
//!
//! ```rust
//! use pacekeeper::{Scheduler, SchedulerConfig};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let config = SchedulerConfig::new(
//!     2,
//!     Duration::from_secs(1),
//!     Duration::from_millis(100),
//!     Duration::from_millis(100),
//! )
//! .unwrap();
//! let scheduler = Scheduler::builder(config).build();
//!
//! let reply = scheduler
//!     .enqueue(|| async { Ok::<_, std::io::Error>("sent") }, "chat-1", 1)
//!     .await;
//! assert_eq!(reply.unwrap(), "sent");
//! # }
//! ```

pub mod queue;
pub mod window;

pub use queue::{Priority, PriorityQueue, QueuedRequest, DEFAULT_PRIORITY};
pub use window::{SlidingWindowCounter, WindowVerdict};

use crate::clock::{Clock, TokioClock};
use crate::config::SchedulerConfig;
use crate::error::DispatchError;
use crate::jitter::PacingJitter;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::telemetry::{emit_best_effort, DispatchOutcome, SchedulerEvent, TelemetrySink};
use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{oneshot, watch, Notify};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, DispatchOutcome> + Send>;
type EmitFn = dyn Fn(SchedulerEvent) -> BoxFuture<'static, ()> + Send + Sync;

/// Point-in-time view of scheduler load. Eventually consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerStats {
    /// Requests waiting in the queue (excludes the one being dispatched).
    pub queued_requests: usize,
    /// Dispatches inside the current quota window.
    pub active_requests: usize,
    /// `true` while the loop holds a request; `false` while it waits for work.
    pub is_processing: bool,
}

struct QueueState {
    queue: PriorityQueue<Job>,
    closed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    window: Mutex<SlidingWindowCounter>,
    queued: AtomicUsize,
    processing: AtomicBool,
    notify: Notify,
    shutdown: watch::Sender<bool>,
    stopped: watch::Sender<bool>,
    clock: Arc<dyn Clock>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn window(&self) -> MutexGuard<'_, SlidingWindowCounter> {
        self.window.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stop accepting work and wake the loop. Idempotent.
    fn close(&self) -> bool {
        let first = {
            let mut state = self.state();
            !std::mem::replace(&mut state.closed, true)
        };
        self.shutdown.send_replace(true);
        first
    }

    fn stats(&self) -> SchedulerStats {
        let now = self.clock.now_millis();
        SchedulerStats {
            queued_requests: self.queued.load(Ordering::Acquire),
            active_requests: self.window().active_at(now),
            is_processing: self.processing.load(Ordering::Acquire),
        }
    }

    fn pop(&self) -> Option<QueuedRequest<Job>> {
        let req = self.state().queue.pop()?;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        self.processing.store(true, Ordering::Release);
        Some(req)
    }

    async fn next_request(&self) -> QueuedRequest<Job> {
        loop {
            if let Some(req) = self.pop() {
                return req;
            }
            self.processing.store(false, Ordering::Release);
            // `notify_one` stores a permit, so a push between `pop` and here is not lost.
            self.notify.notified().await;
        }
    }

    fn drain(&self) -> usize {
        let abandoned = self.state().queue.drain();
        self.queued.store(0, Ordering::Release);
        self.processing.store(false, Ordering::Release);
        // Dropping a job drops its result sender, which rejects the ticket.
        abandoned.len()
    }
}

/// Stops the loop when the last [`Scheduler`] handle goes away.
struct HandleGuard {
    shared: Arc<Shared>,
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        if self.shared.close() {
            tracing::debug!("last scheduler handle dropped; stopping dispatch loop");
        }
    }
}

/// Stats-only view of a scheduler, from [`Scheduler::monitor`].
///
/// Holding one does not count as a handle: once every [`Scheduler`] clone is dropped the loop
/// stops and the monitor reports it as shut down.
#[derive(Clone)]
pub struct SchedulerMonitor {
    shared: Arc<Shared>,
}

impl SchedulerMonitor {
    pub fn stats(&self) -> SchedulerStats {
        self.shared.stats()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state().closed
    }
}

impl fmt::Debug for SchedulerMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerMonitor").field("stats", &self.stats()).finish()
    }
}

/// Cloneable handle to a running dispatch loop.
///
/// All clones feed the same queue and share one quota window. Dropping the last clone stops
/// the loop and rejects whatever is still queued.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
    _guard: Arc<HandleGuard>,
    config: SchedulerConfig,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Scheduler {
    /// Start configuring a scheduler.
    pub fn builder(config: SchedulerConfig) -> SchedulerBuilder {
        SchedulerBuilder::new(config)
    }

    /// Start a scheduler with tokio time, tokio sleeps and no telemetry.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: SchedulerConfig) -> Self {
        SchedulerBuilder::new(config).build()
    }

    /// Queue `op` for dispatch and return a [`Ticket`] that resolves with its outcome.
    ///
    /// Never waits: the request is inserted and the loop is woken. Dropping the ticket does not
    /// cancel the request; it still consumes a quota slot when its turn comes.
    pub fn enqueue<T, E, Op, Fut>(
        &self,
        op: Op,
        target: impl Into<String>,
        priority: Priority,
    ) -> Ticket<T, E>
    where
        Op: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || -> BoxFuture<'static, DispatchOutcome> {
            Box::pin(async move {
                let result = op().await;
                let outcome = match result {
                    Ok(_) => DispatchOutcome::Succeeded,
                    Err(_) => DispatchOutcome::Failed,
                };
                let _ = tx.send(result);
                outcome
            })
        });

        let target = target.into();
        let now = self.shared.clock.now_millis();
        let seq = {
            let mut state = self.shared.state();
            if state.closed {
                tracing::debug!(dest = %target, "enqueue after shutdown rejected");
                return Ticket::rejected();
            }
            let seq = state.queue.push(job, target.as_str(), priority, now);
            self.shared.queued.fetch_add(1, Ordering::AcqRel);
            seq
        };
        self.shared.notify.notify_one();
        tracing::trace!(seq, priority, dest = %target, "request enqueued");
        Ticket { rx: Some(rx) }
    }

    /// Snapshot of queue depth, window occupancy and loop state. Never waits on dispatch.
    pub fn stats(&self) -> SchedulerStats {
        self.shared.stats()
    }

    /// Read-only view for observers. It does not keep the loop alive.
    pub fn monitor(&self) -> SchedulerMonitor {
        SchedulerMonitor { shared: self.shared.clone() }
    }

    /// Configuration this scheduler was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// `true` once [`Scheduler::shutdown`] ran or the loop otherwise stopped accepting work.
    pub fn is_shut_down(&self) -> bool {
        self.shared.state().closed
    }

    /// Stop the loop, reject every pending ticket with [`DispatchError::ShuttingDown`], and wait
    /// for the loop to exit.
    ///
    /// Shutdown cancels whatever the loop is suspended on: the quota wait, the pacing delay, or
    /// an action still in flight. Its ticket resolves to `ShuttingDown` as well.
    pub async fn shutdown(&self) {
        if self.shared.close() {
            tracing::info!("scheduler shutdown requested");
        }
        let mut stopped = self.shared.stopped.subscribe();
        let _ = stopped.wait_for(|done| *done).await;
    }
}

/// Future returned by [`Scheduler::enqueue`].
///
/// Resolves to the action's own result, `ActionFailed` when the action returned an error, or
/// `ShuttingDown` when the scheduler stopped first.
#[must_use = "a ticket does nothing unless awaited; the request is dispatched either way"]
pub struct Ticket<T, E> {
    rx: Option<oneshot::Receiver<Result<T, E>>>,
}

impl<T, E> Ticket<T, E> {
    fn rejected() -> Self {
        Self { rx: None }
    }
}

impl<T, E> fmt::Debug for Ticket<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket").field("rejected", &self.rx.is_none()).finish()
    }
}

impl<T, E> Future for Ticket<T, E> {
    type Output = Result<T, DispatchError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(rx) = this.rx.as_mut() else {
            return Poll::Ready(Err(DispatchError::ShuttingDown));
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok(value)),
            Poll::Ready(Ok(Err(e))) => Poll::Ready(Err(DispatchError::ActionFailed(e))),
            Poll::Ready(Err(_)) => Poll::Ready(Err(DispatchError::ShuttingDown)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Builder for [`Scheduler`].
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    clock: Option<Arc<dyn Clock>>,
    sleeper: Arc<dyn Sleeper>,
    emit: Option<Arc<EmitFn>>,
    seed: Option<u64>,
}

impl SchedulerBuilder {
    fn new(config: SchedulerConfig) -> Self {
        Self { config, clock: None, sleeper: Arc::new(TokioSleeper), emit: None, seed: None }
    }

    /// Time source for the quota window. Defaults to [`TokioClock`].
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// How the loop waits for quota and pacing. Defaults to [`TokioSleeper`].
    pub fn sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Send scheduler events to `sink`. Emission is best-effort and in dispatch order.
    pub fn sink<S>(mut self, sink: S) -> Self
    where
        S: TelemetrySink + Sync,
        S::Future: Send + 'static,
    {
        let emit: Arc<EmitFn> = Arc::new(move |event: SchedulerEvent| -> BoxFuture<'static, ()> {
            Box::pin(emit_best_effort(sink.clone(), event))
        });
        self.emit = Some(emit);
        self
    }

    /// Draw pacing delays from a seeded RNG instead of the thread RNG.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Spawn the dispatch loop and return the first handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Scheduler {
        let clock = self.clock.unwrap_or_else(|| Arc::new(TokioClock::default()));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (stopped, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState { queue: PriorityQueue::new(), closed: false }),
            window: Mutex::new(SlidingWindowCounter::new(
                self.config.window(),
                self.config.max_requests(),
            )),
            queued: AtomicUsize::new(0),
            processing: AtomicBool::new(false),
            notify: Notify::new(),
            shutdown,
            stopped,
            clock,
        });

        let dispatcher = DispatchLoop {
            shared: shared.clone(),
            sleeper: self.sleeper,
            jitter: self.config.jitter(),
            rng: self.seed.map(StdRng::seed_from_u64),
            emit: self.emit,
        };
        tokio::spawn(dispatcher.run(shutdown_rx));

        Scheduler { _guard: Arc::new(HandleGuard { shared: shared.clone() }), shared, config: self.config }
    }
}

struct DispatchLoop {
    shared: Arc<Shared>,
    sleeper: Arc<dyn Sleeper>,
    jitter: PacingJitter,
    rng: Option<StdRng>,
    emit: Option<Arc<EmitFn>>,
}

impl DispatchLoop {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let dispatched = tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => break,
                event = self.step() => event,
            };
            self.emit(dispatched).await;
        }

        let abandoned = self.shared.drain();
        if abandoned > 0 {
            tracing::info!(abandoned, "dispatch loop stopped; pending requests rejected");
        } else {
            tracing::debug!("dispatch loop stopped");
        }
        self.emit(SchedulerEvent::Drained { abandoned }).await;
        self.shared.stopped.send_replace(true);
    }

    /// One dispatch: next request, free quota slot, pacing delay, then the action itself.
    /// Cancelling this future drops the request, which rejects its ticket.
    async fn step(&mut self) -> SchedulerEvent {
        let req = self.shared.next_request().await;
        self.wait_for_slot().await;

        let pacing = match self.rng.as_mut() {
            Some(rng) => self.jitter.sample_with_rng(rng),
            None => self.jitter.sample(),
        };
        self.sleeper.sleep(pacing).await;

        let started = self.shared.clock.now_millis();
        self.shared.window().record(started);
        let queued_for = Duration::from_millis(started.saturating_sub(req.enqueued_at_ms));
        tracing::debug!(seq = req.seq, priority = req.priority, dest = %req.target, "dispatching");

        let outcome = (req.action)().await;
        if outcome == DispatchOutcome::Failed {
            tracing::warn!(seq = req.seq, dest = %req.target, "dispatched action failed");
        }
        SchedulerEvent::Dispatched { target: req.target, priority: req.priority, queued_for, outcome }
    }

    /// Suspend until the window has a free slot. Wakes exactly when the oldest record expires.
    async fn wait_for_slot(&self) {
        loop {
            let now = self.shared.clock.now_millis();
            let verdict = self.shared.window().check(now);
            match verdict {
                WindowVerdict::Open { .. } => return,
                WindowVerdict::Full { active, wait } => {
                    tracing::debug!(active, wait_ms = wait.as_millis() as u64, "quota window full");
                    self.emit(SchedulerEvent::Throttled { active, wait }).await;
                    self.sleeper.sleep(wait).await;
                }
            }
        }
    }

    async fn emit(&self, event: SchedulerEvent) {
        if let Some(emit) = &self.emit {
            emit(event).await;
        }
    }
}
