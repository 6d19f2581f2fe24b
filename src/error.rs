use thiserror::Error;

use crate::executor::ExecutorState;
use crate::provider::identity::CanonicalId;

/// Application-wide result type alias.
pub type Result<T> = std::result::Result<T, AppError>;

/// Boxed error returned by a worker thread configurator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the thread-affinity executor.
///
/// Affinity violations and lifecycle misuse are caller bugs and are surfaced
/// as-is; a panicking task only poisons its own outcome.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// A thread-affine resource was touched off the worker thread.
    #[error("{operation} must run on the executor worker thread")]
    AffinityViolation { operation: &'static str },

    /// Work was submitted while the executor was not running.
    #[error("executor is not running (state: {0})")]
    NotRunning(ExecutorState),

    #[error("executor was already started")]
    AlreadyStarted,

    /// Second shutdown request.
    #[error("executor is already stopped or stopping")]
    AlreadyStopped,

    /// The task was dropped without running because the executor stopped.
    #[error("executor stopped before the task completed")]
    Stopped,

    /// The worker thread configurator refused to start.
    #[error("worker startup aborted: {0}")]
    StartupAborted(String),

    /// `shutdown` was called from the worker thread, which cannot join itself.
    #[error("shutdown cannot be requested from the worker thread")]
    ShutdownFromWorker,

    /// A blocking, force-enqueued submit from the worker would wait on itself.
    #[error("blocking enqueue from the worker thread would deadlock")]
    WouldDeadlock,

    /// The task panicked; the worker loop survived.
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Errors raised by a tree provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The element no longer exists on the provider side.
    #[error("element {0} vanished")]
    Vanished(CanonicalId),

    #[error("access denied to element {0}")]
    AccessDenied(CanonicalId),

    /// The provider has never handed out this identity.
    #[error("unknown element {0}")]
    Unknown(CanonicalId),

    #[error("element {0} already exists")]
    Duplicate(CanonicalId),

    #[error(transparent)]
    Affinity(#[from] ExecutorError),

    /// Change subscription could not be installed.
    #[error("watch error: {0}")]
    Watch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the tree node cache.
///
/// Provider faults never show up here: they degrade the affected node to
/// "no children" instead.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// The provider root has no usable runtime identifier.
    #[error("provider root has no identity")]
    NoRootIdentity,

    #[error("provider root unavailable: {0}")]
    RootUnavailable(#[source] ProviderError),
}

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// I/O errors from terminal or log file handling.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Terminal initialization or rendering errors.
    #[error("Terminal error: {0}")]
    Terminal(String),

    /// Invalid path provided by the user.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}
