//! Thread-affinity executor.
//!
//! Every call into a thread-sensitive provider goes through one dedicated
//! worker thread. Callers on any thread submit work; the worker drains the
//! queue in order. Work submitted from the worker itself runs inline unless
//! `Dispatch::Enqueue` is requested.

mod queue;
mod task;
mod wake;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::error::{BoxError, ExecutorError};
use queue::{task_queue, QueueReceiver, QueueSender};
use task::{panic_message, run_guarded};
use wake::{Signal, WakeSignal};

pub use task::TaskHandle;

/// Default worker thread name.
pub const DEFAULT_THREAD_NAME: &str = "affinity-worker";
/// Default bound on an idle wait, so the loop stays observable.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
/// Default bound on joining the worker during shutdown.
pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 1000;

/// Lifecycle of the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecutorState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl ExecutorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ExecutorState::Created,
            1 => ExecutorState::Running,
            2 => ExecutorState::Stopping,
            _ => ExecutorState::Stopped,
        }
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutorState::Created => "created",
            ExecutorState::Running => "running",
            ExecutorState::Stopping => "stopping",
            ExecutorState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// How a submission behaves when the caller is already the worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// Run immediately on the worker thread, bypassing the queue.
    #[default]
    Inline,
    /// Always go through the queue, behind already queued items.
    Enqueue,
}

/// Result of a shutdown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The worker exited and was joined.
    Joined,
    /// The join timed out; the worker was left to finish its current task.
    Detached,
}

/// Executor tuning.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub thread_name: String,
    /// Upper bound on one idle wait of the worker loop.
    pub poll_interval: Duration,
    /// Join bound used when the executor is dropped while running.
    pub join_timeout: Duration,
    /// Minimum interval between two delivered wakes. Zero disables debouncing.
    pub wake_debounce: Duration,
    /// Execute still-queued items on the worker before it exits.
    pub drain_on_shutdown: bool,
    /// Let loop-level panics kill the worker instead of being swallowed.
    pub diagnostics: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            join_timeout: Duration::from_millis(DEFAULT_JOIN_TIMEOUT_MS),
            wake_debounce: Duration::ZERO,
            drain_on_shutdown: false,
            diagnostics: false,
        }
    }
}

/// State shared by the executor, its handles and the worker thread.
struct Shared {
    state: AtomicU8,
    worker: OnceLock<ThreadId>,
    queue: QueueSender,
    wake: WakeSignal,
    last_drain: Mutex<Option<Instant>>,
}

impl Shared {
    fn state(&self) -> ExecutorState {
        ExecutorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ExecutorState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn transition(&self, from: ExecutorState, to: ExecutorState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn is_worker(&self) -> bool {
        self.worker.get() == Some(&thread::current().id())
    }

    /// Execute queued jobs until the queue is empty. A pass that has begun
    /// runs to completion through `Stopping`; only a detached shutdown
    /// (`Stopped`) cuts it short. Returns the number of jobs executed.
    fn drain(&self, queue: &mut QueueReceiver) -> usize {
        let mut executed = 0;
        while self.state() != ExecutorState::Stopped {
            let Some(job) = queue.pop() else {
                break;
            };
            *self
                .last_drain
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
            job();
            executed += 1;
        }
        executed
    }
}

/// Cloneable submission handle; this is what collaborators hold.
#[derive(Clone)]
pub struct ExecutorHandle {
    shared: Arc<Shared>,
}

impl fmt::Debug for ExecutorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorHandle")
            .field("state", &self.state())
            .field("queue_len", &self.queue_len())
            .finish()
    }
}

impl ExecutorHandle {
    /// Run `work` on the worker thread and block until it completes.
    pub fn submit<T, F>(&self, work: F) -> Result<T, ExecutorError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.submit_with(Dispatch::Inline, work)
    }

    /// Blocking submit with an explicit dispatch mode.
    ///
    /// `Dispatch::Enqueue` from the worker thread is refused: it would wait
    /// for a task queued behind the caller.
    pub fn submit_with<T, F>(&self, dispatch: Dispatch, work: F) -> Result<T, ExecutorError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_on_worker_thread() {
            return match dispatch {
                Dispatch::Inline => run_guarded(work),
                Dispatch::Enqueue => Err(ExecutorError::WouldDeadlock),
            };
        }

        let (tx, rx) = std_mpsc::sync_channel(1);
        self.enqueue(Box::new(move || {
            let _ = tx.send(run_guarded(work));
        }))?;
        rx.recv().unwrap_or(Err(ExecutorError::Stopped))
    }

    /// Run `work` on the worker thread without blocking the caller.
    pub fn submit_async<T, F>(&self, work: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.submit_async_with(Dispatch::Inline, work)
    }

    /// Non-blocking submit with an explicit dispatch mode.
    pub fn submit_async_with<T, F>(&self, dispatch: Dispatch, work: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if dispatch == Dispatch::Inline && self.is_on_worker_thread() {
            return TaskHandle::ready(run_guarded(work));
        }

        let (tx, rx) = oneshot::channel();
        match self.enqueue(Box::new(move || {
            let _ = tx.send(run_guarded(work));
        })) {
            Ok(()) => TaskHandle::pending(rx),
            Err(err) => TaskHandle::ready(Err(err)),
        }
    }

    /// Fire-and-forget submission. Panics inside `work` are logged.
    pub fn post<F>(&self, work: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_with(Dispatch::Inline, work)
    }

    pub fn post_with<F>(&self, dispatch: Dispatch, work: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        let job = move || {
            if let Err(err) = run_guarded(work) {
                tracing::error!(%err, "posted task failed");
            }
        };
        if dispatch == Dispatch::Inline && self.is_on_worker_thread() {
            job();
            return Ok(());
        }
        self.enqueue(Box::new(job))
    }

    fn enqueue(&self, job: queue::Job) -> Result<(), ExecutorError> {
        let state = self.state();
        if state != ExecutorState::Running {
            return Err(ExecutorError::NotRunning(state));
        }
        self.shared.queue.push(job)?;
        self.request_wake();
        Ok(())
    }

    /// Whether the calling thread is the worker thread.
    pub fn is_on_worker_thread(&self) -> bool {
        self.shared.is_worker()
    }

    /// Guard for thread-affine resources: fails loudly off the worker thread.
    pub fn ensure_on_worker(&self, operation: &'static str) -> Result<(), ExecutorError> {
        if self.is_on_worker_thread() {
            return Ok(());
        }
        tracing::error!(
            operation,
            thread = ?thread::current().name(),
            "thread affinity violation"
        );
        Err(ExecutorError::AffinityViolation { operation })
    }

    /// Signal the worker that new work may be present (debounced).
    pub fn request_wake(&self) -> bool {
        self.shared.wake.request_wake()
    }

    /// Number of wake signals actually delivered to the worker.
    pub fn wakes_delivered(&self) -> u64 {
        self.shared.wake.delivered()
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn state(&self) -> ExecutorState {
        self.shared.state()
    }

    /// When the worker last dequeued a task.
    pub fn last_drain(&self) -> Option<Instant> {
        *self
            .shared
            .last_drain
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

struct WorkerThread {
    join: JoinHandle<()>,
    done: std_mpsc::Receiver<()>,
}

/// Owner of the worker thread.
///
/// Dropping a running executor shuts it down with the configured join timeout.
pub struct AffinityExecutor {
    shared: Arc<Shared>,
    config: ExecutorConfig,
    receiver: Mutex<Option<QueueReceiver>>,
    worker: Mutex<Option<WorkerThread>>,
}

impl AffinityExecutor {
    /// Create an executor in the `Created` state. No thread is spawned yet.
    pub fn new(config: ExecutorConfig) -> Self {
        let (sender, receiver) = task_queue();
        let shared = Arc::new(Shared {
            state: AtomicU8::new(ExecutorState::Created as u8),
            worker: OnceLock::new(),
            queue: sender,
            wake: WakeSignal::new(config.wake_debounce),
            last_drain: Mutex::new(None),
        });
        Self {
            shared,
            config,
            receiver: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> ExecutorHandle {
        ExecutorHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.shared.state()
    }

    /// Spawn the worker thread.
    ///
    /// `configurator` runs once on the new thread before the loop starts; an
    /// error (or panic) aborts startup and the executor ends up `Stopped`.
    /// Blocks until the worker reports the outcome.
    pub fn start<F>(&self, configurator: F) -> Result<ExecutorHandle, ExecutorError>
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ExecutorError::AlreadyStarted)?;

        let (startup_tx, startup_rx) = std_mpsc::channel();
        let (done_tx, done_rx) = std_mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();

        let join = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || {
                worker_main(shared, config, receiver, configurator, startup_tx);
                let _ = done_tx.send(());
            })
            .map_err(|err| {
                self.shared.set_state(ExecutorState::Stopped);
                ExecutorError::Spawn(err)
            })?;

        match startup_rx.recv() {
            Ok(Ok(())) => {
                *self.worker.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(WorkerThread {
                        join,
                        done: done_rx,
                    });
                Ok(self.handle())
            }
            Ok(Err(reason)) => {
                let _ = join.join();
                Err(ExecutorError::StartupAborted(reason))
            }
            Err(_) => {
                let _ = join.join();
                self.shared.set_state(ExecutorState::Stopped);
                Err(ExecutorError::StartupAborted(
                    "worker exited during startup".to_string(),
                ))
            }
        }
    }

    /// Stop the worker and join it for at most `join_timeout`.
    ///
    /// A drain pass already in progress on the worker finishes. Items still
    /// queued once the worker sees the stop are executed when
    /// `drain_on_shutdown` is set and discarded otherwise. A task still
    /// running when the timeout elapses is abandoned, not aborted; no further
    /// task starts after this returns.
    pub fn shutdown(&self, join_timeout: Duration) -> Result<ShutdownOutcome, ExecutorError> {
        if self.shared.is_worker() {
            return Err(ExecutorError::ShutdownFromWorker);
        }

        if self
            .shared
            .transition(ExecutorState::Created, ExecutorState::Stopped)
        {
            return Ok(ShutdownOutcome::Joined);
        }
        if !self
            .shared
            .transition(ExecutorState::Running, ExecutorState::Stopping)
        {
            return Err(ExecutorError::AlreadyStopped);
        }

        tracing::debug!(queued = self.shared.queue.len(), "executor stopping");
        self.shared.wake.stop();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let outcome = match worker {
            Some(worker) => match worker.done.recv_timeout(join_timeout) {
                Err(std_mpsc::RecvTimeoutError::Timeout) => {
                    tracing::warn!(?join_timeout, "worker did not exit in time, detaching");
                    ShutdownOutcome::Detached
                }
                Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                    let _ = worker.join.join();
                    ShutdownOutcome::Joined
                }
            },
            None => ShutdownOutcome::Joined,
        };

        self.shared.set_state(ExecutorState::Stopped);
        tracing::info!(?outcome, "executor stopped");
        Ok(outcome)
    }
}

impl Drop for AffinityExecutor {
    fn drop(&mut self) {
        if self.shared.state() == ExecutorState::Running {
            let _ = self.shutdown(self.config.join_timeout);
        }
    }
}

fn worker_main<F>(
    shared: Arc<Shared>,
    config: ExecutorConfig,
    mut queue: QueueReceiver,
    configurator: F,
    startup: std_mpsc::Sender<Result<(), String>>,
) where
    F: FnOnce() -> Result<(), BoxError>,
{
    let _ = shared.worker.set(thread::current().id());

    let configured = match run_guarded(configurator) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(err) => Err(err.to_string()),
    };
    if let Err(reason) = configured {
        tracing::warn!(%reason, "worker configurator refused to start");
        shared.set_state(ExecutorState::Stopped);
        queue.discard();
        let _ = startup.send(Err(reason));
        return;
    }

    if !shared.transition(ExecutorState::Created, ExecutorState::Running) {
        // Shut down while the configurator was running.
        queue.discard();
        let _ = startup.send(Err("shut down during startup".to_string()));
        return;
    }
    tracing::info!(thread = %config.thread_name, id = ?thread::current().id(), "worker started");
    let _ = startup.send(Ok(()));

    if config.diagnostics {
        run_loop(&shared, &config, &mut queue);
    } else {
        loop {
            match panic::catch_unwind(AssertUnwindSafe(|| run_loop(&shared, &config, &mut queue)))
            {
                Ok(()) => break,
                Err(payload) => {
                    tracing::error!(
                        fault = %panic_message(payload.as_ref()),
                        "worker loop fault, continuing"
                    );
                }
            }
        }
    }

    if config.drain_on_shutdown {
        shared.drain(&mut queue);
    }
    let discarded = queue.discard();
    tracing::debug!(discarded, "worker exiting");
}

fn run_loop(shared: &Shared, config: &ExecutorConfig, queue: &mut QueueReceiver) {
    loop {
        shared.drain(queue);
        if shared.wake.wait(config.poll_interval) == Signal::Stop {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn started(config: ExecutorConfig) -> (AffinityExecutor, ExecutorHandle) {
        let executor = AffinityExecutor::new(config);
        let handle = executor.start(|| Ok(())).unwrap();
        (executor, handle)
    }

    #[test]
    fn configurator_runs_on_worker_before_loop() {
        let executor = AffinityExecutor::new(ExecutorConfig::default());
        let inner = executor.handle();
        let (tx, rx) = std_mpsc::channel();
        let handle = executor
            .start(move || {
                tx.send((inner.is_on_worker_thread(), inner.state())).unwrap();
                Ok(())
            })
            .unwrap();

        let (on_worker, state) = rx.recv().unwrap();
        assert!(on_worker);
        assert_eq!(state, ExecutorState::Created);
        assert_eq!(handle.state(), ExecutorState::Running);
        assert!(!handle.is_on_worker_thread());
    }

    #[test]
    fn failed_configurator_aborts_startup() {
        let executor = AffinityExecutor::new(ExecutorConfig::default());
        let err = executor
            .start(|| Err("apartment unavailable".into()))
            .unwrap_err();
        assert!(matches!(err, ExecutorError::StartupAborted(ref m) if m == "apartment unavailable"));
        assert_eq!(executor.state(), ExecutorState::Stopped);
        assert!(matches!(
            executor.handle().submit(|| 1),
            Err(ExecutorError::NotRunning(ExecutorState::Stopped))
        ));
    }

    #[test]
    fn start_twice_is_rejected() {
        let (executor, _handle) = started(ExecutorConfig::default());
        assert!(matches!(
            executor.start(|| Ok(())),
            Err(ExecutorError::AlreadyStarted)
        ));
    }

    #[test]
    fn submit_before_start_is_rejected() {
        let executor = AffinityExecutor::new(ExecutorConfig::default());
        assert!(matches!(
            executor.handle().submit(|| 1),
            Err(ExecutorError::NotRunning(ExecutorState::Created))
        ));
    }

    #[test]
    fn submit_runs_on_worker_thread() {
        let (_executor, handle) = started(ExecutorConfig::default());
        let inner = handle.clone();
        let outcome = handle
            .submit(move || inner.ensure_on_worker("lookup").is_ok())
            .unwrap();
        assert!(outcome);
        assert!(matches!(
            handle.ensure_on_worker("lookup"),
            Err(ExecutorError::AffinityViolation { operation: "lookup" })
        ));
    }

    #[test]
    fn task_panic_is_captured_and_loop_survives() {
        let (_executor, handle) = started(ExecutorConfig::default());
        let err = handle.submit(|| -> u32 { panic!("bad task") }).unwrap_err();
        assert!(matches!(err, ExecutorError::TaskPanicked(ref m) if m == "bad task"));
        assert_eq!(handle.submit(|| 41 + 1).unwrap(), 42);
    }

    #[test]
    fn per_producer_order_is_preserved() {
        let (_executor, handle) = started(ExecutorConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));

        let producers: Vec<_> = (0..4)
            .map(|producer| {
                let handle = handle.clone();
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for seq in 0..200 {
                        let log = Arc::clone(&log);
                        handle
                            .post(move || log.lock().unwrap().push((producer, seq)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        // Barrier: queued behind every post above.
        handle.submit(|| ()).unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 800);
        for producer in 0..4 {
            let seqs: Vec<_> = log
                .iter()
                .filter(|(p, _)| *p == producer)
                .map(|(_, s)| *s)
                .collect();
            assert_eq!(seqs, (0..200).collect::<Vec<_>>());
        }
    }

    #[test]
    fn inline_submit_from_worker_bypasses_queue() {
        let (_executor, handle) = started(ExecutorConfig::default());
        let inner = handle.clone();
        let (before, after, ran_inline) = handle
            .submit(move || {
                let before = inner.queue_len();
                let flag = Arc::new(AtomicUsize::new(0));
                let seen = Arc::clone(&flag);
                inner
                    .submit(move || seen.store(1, Ordering::SeqCst))
                    .unwrap();
                (before, inner.queue_len(), flag.load(Ordering::SeqCst) == 1)
            })
            .unwrap();
        assert_eq!(before, after);
        assert!(ran_inline);
    }

    #[test]
    fn forced_enqueue_runs_after_current_task() {
        let (_executor, handle) = started(ExecutorConfig::default());
        let order = Arc::new(Mutex::new(Vec::new()));
        let inner = handle.clone();
        let outer_order = Arc::clone(&order);
        handle
            .submit(move || {
                let queued = Arc::clone(&outer_order);
                inner
                    .post_with(Dispatch::Enqueue, move || {
                        queued.lock().unwrap().push("forced")
                    })
                    .unwrap();
                outer_order.lock().unwrap().push("outer");
            })
            .unwrap();
        handle.submit(|| ()).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["outer", "forced"]);
    }

    #[test]
    fn blocking_forced_enqueue_from_worker_is_refused() {
        let (_executor, handle) = started(ExecutorConfig::default());
        let inner = handle.clone();
        let nested = handle
            .submit(move || inner.submit_with(Dispatch::Enqueue, || 1))
            .unwrap();
        assert!(matches!(nested, Err(ExecutorError::WouldDeadlock)));
    }

    #[test]
    fn wake_burst_within_debounce_delivers_once() {
        let (_executor, handle) = started(ExecutorConfig {
            wake_debounce: Duration::from_secs(30),
            ..ExecutorConfig::default()
        });
        let before = handle.wakes_delivered();
        for _ in 0..100 {
            handle.request_wake();
        }
        assert!(handle.wakes_delivered() - before <= 1);
    }

    #[test]
    fn debounced_submissions_still_run_on_poll() {
        let (_executor, handle) = started(ExecutorConfig {
            wake_debounce: Duration::from_secs(30),
            poll_interval: Duration::from_millis(20),
            ..ExecutorConfig::default()
        });
        for i in 0..5 {
            assert_eq!(handle.submit(move || i * 2).unwrap(), i * 2);
        }
    }

    #[test]
    fn no_submission_accepted_after_shutdown() {
        let (executor, handle) = started(ExecutorConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));
        assert_eq!(
            executor.shutdown(Duration::from_secs(2)).unwrap(),
            ShutdownOutcome::Joined
        );
        assert_eq!(handle.state(), ExecutorState::Stopped);

        let c = Arc::clone(&counter);
        assert!(matches!(
            handle.post(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            Err(ExecutorError::NotRunning(ExecutorState::Stopped))
        ));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shutdown_twice_is_lifecycle_misuse() {
        let (executor, _handle) = started(ExecutorConfig::default());
        executor.shutdown(Duration::from_secs(2)).unwrap();
        assert!(matches!(
            executor.shutdown(Duration::from_secs(2)),
            Err(ExecutorError::AlreadyStopped)
        ));
    }

    fn queue_behind_blocker(handle: &ExecutorHandle, counter: &Arc<AtomicUsize>, block: Duration) {
        let (started_tx, started_rx) = std_mpsc::channel();
        handle
            .post(move || {
                started_tx.send(()).unwrap();
                thread::sleep(block);
            })
            .unwrap();
        started_rx.recv().unwrap();
        for _ in 0..5 {
            let c = Arc::clone(counter);
            handle
                .post(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
    }

    #[test]
    fn shutdown_lets_the_running_drain_pass_finish() {
        let (executor, handle) = started(ExecutorConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));
        queue_behind_blocker(&handle, &counter, Duration::from_millis(100));

        let pending = handle.submit_async_with(Dispatch::Enqueue, || 1);
        executor.shutdown(Duration::from_secs(2)).unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(handle.queue_len(), 0);
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        assert_eq!(rt.block_on(pending).unwrap(), 1);
    }

    /// Park five items behind a worker that is idle and will not be woken:
    /// the first post uses up the debounce window, the rest are coalesced.
    fn queue_while_idle(handle: &ExecutorHandle, counter: &Arc<AtomicUsize>) {
        let (ran_tx, ran_rx) = std_mpsc::channel();
        handle
            .post(move || {
                ran_tx.send(()).unwrap();
            })
            .unwrap();
        ran_rx.recv().unwrap();
        // Let the worker finish the pass and go back to waiting.
        thread::sleep(Duration::from_millis(50));
        for _ in 0..5 {
            let c = Arc::clone(counter);
            handle
                .post(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
    }

    fn idle_config(drain_on_shutdown: bool) -> ExecutorConfig {
        ExecutorConfig {
            wake_debounce: Duration::from_secs(30),
            poll_interval: Duration::from_secs(30),
            drain_on_shutdown,
            ..ExecutorConfig::default()
        }
    }

    #[test]
    fn shutdown_discards_leftovers_by_default() {
        let (executor, handle) = started(idle_config(false));
        let counter = Arc::new(AtomicUsize::new(0));
        queue_while_idle(&handle, &counter);

        let pending = handle.submit_async_with(Dispatch::Enqueue, || 1);
        assert_eq!(handle.queue_len(), 6);
        executor.shutdown(Duration::from_secs(2)).unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(handle.queue_len(), 0);
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        assert!(matches!(rt.block_on(pending), Err(ExecutorError::Stopped)));
    }

    #[test]
    fn shutdown_drains_leftovers_when_configured() {
        let (executor, handle) = started(idle_config(true));
        let counter = Arc::new(AtomicUsize::new(0));
        queue_while_idle(&handle, &counter);

        executor.shutdown(Duration::from_secs(2)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn join_timeout_detaches_and_nothing_runs_after_stop() {
        let (executor, handle) = started(ExecutorConfig {
            drain_on_shutdown: true,
            ..ExecutorConfig::default()
        });
        let counter = Arc::new(AtomicUsize::new(0));
        queue_behind_blocker(&handle, &counter, Duration::from_millis(300));

        assert_eq!(
            executor.shutdown(Duration::from_millis(20)).unwrap(),
            ShutdownOutcome::Detached
        );
        assert_eq!(handle.state(), ExecutorState::Stopped);
        thread::sleep(Duration::from_millis(500));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shutdown_from_worker_is_refused() {
        let executor = Arc::new(AffinityExecutor::new(ExecutorConfig::default()));
        let handle = executor.start(|| Ok(())).unwrap();
        let inner = Arc::clone(&executor);
        let outcome = handle
            .submit(move || matches!(inner.shutdown(Duration::ZERO), Err(ExecutorError::ShutdownFromWorker)))
            .unwrap();
        assert!(outcome);
    }

    #[tokio::test]
    async fn submit_async_resolves_with_value() {
        let (_executor, handle) = started(ExecutorConfig::default());
        assert_eq!(handle.submit_async(|| 2 + 2).await.unwrap(), 4);
    }

    #[test]
    fn last_drain_is_recorded() {
        let (_executor, handle) = started(ExecutorConfig::default());
        assert!(handle.last_drain().is_none());
        handle.submit(|| ()).unwrap();
        assert!(handle.last_drain().is_some());
    }
}
