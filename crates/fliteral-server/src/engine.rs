//! Execution Engine
//!
//! Races a handler against the request deadline. Each request owns one
//! [`Invocation`], a commit slot that moves from `Pending` to either
//! `Completed` or `TimedOut` exactly once. Whoever wins the compare-and-swap
//! delivers the outcome; every later attempt is a no-op.
//!
//! Module loading happens inside the race, so a slow load counts against the
//! same deadline as the handler itself.
//!
//! Handler code runs on the blocking pool in a fresh Boa context. A handler
//! that outlives its deadline is not interrupted: the engine stops waiting,
//! the client gets its 504, and the blocking thread finishes on its own.

use fliteral_common::{Failure, Outcome};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::cache::{LoadedModule, ModuleCache};
use crate::resolver::ResolvedFunction;
use crate::runtime::CompletionHook;

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const TIMED_OUT: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Pending,
    Completed,
    TimedOut,
}

/// Per-request commit slot shared by the handler and the deadline timer.
#[derive(Debug)]
pub struct Invocation {
    state: AtomicU8,
    sender: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl Invocation {
    pub fn new() -> (Arc<Self>, oneshot::Receiver<Outcome>) {
        let (sender, receiver) = oneshot::channel();
        let invocation = Arc::new(Self {
            state: AtomicU8::new(PENDING),
            sender: Mutex::new(Some(sender)),
        });
        (invocation, receiver)
    }

    pub fn state(&self) -> InvocationState {
        match self.state.load(Ordering::Acquire) {
            PENDING => InvocationState::Pending,
            COMPLETED => InvocationState::Completed,
            _ => InvocationState::TimedOut,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.state() != InvocationState::Pending
    }

    /// Commits a handler outcome. Returns `false` if the invocation had
    /// already settled.
    pub fn complete(&self, outcome: Outcome) -> bool {
        self.commit(COMPLETED, outcome)
    }

    /// Commits a timeout. Returns `false` if the handler got there first.
    pub fn time_out(&self) -> bool {
        self.commit(TIMED_OUT, Failure::timeout("deadline elapsed before the handler completed").into())
    }

    fn commit(&self, terminal: u8, outcome: Outcome) -> bool {
        if self
            .state
            .compare_exchange(PENDING, terminal, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(sender) = sender {
            // The receiver is gone only if the request itself was dropped
            let _ = sender.send(outcome);
        }
        true
    }
}

/// Evaluates the module in a fresh context and calls its handler.
///
/// Runs on a blocking thread. Returns once the handler has returned and its
/// timers are drained or cut off at `deadline`; the outcome itself arrives
/// through `hook`.
pub fn run_handler(
    module: &LoadedModule,
    event: &JsonValue,
    hook: CompletionHook,
    deadline: std::time::Instant,
) -> Result<(), Failure> {
    module.instantiate()?.with_deadline(deadline).invoke(event, hook)
}

#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    cache: Arc<ModuleCache>,
}

impl ExecutionEngine {
    pub fn new(cache: Arc<ModuleCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    /// Loads `function` and runs its handler with `event`, committing
    /// whichever comes first: the handler's outcome or the deadline.
    pub async fn execute(&self, function: ResolvedFunction, event: JsonValue, deadline: Instant) -> Outcome {
        let (invocation, receiver) = Invocation::new();

        let timer = {
            let invocation = Arc::clone(&invocation);
            let key = function.key.clone();
            tokio::spawn(async move {
                sleep_until(deadline).await;
                if invocation.time_out() {
                    warn!(key = %key.display(), "handler timed out");
                }
            })
        };

        let cache = Arc::clone(&self.cache);
        let worker = Arc::clone(&invocation);
        tokio::spawn(async move {
            let module = match cache.get_or_load(&function).await {
                Ok(module) => module,
                Err(failure) => {
                    worker.complete(failure.into());
                    return;
                }
            };

            if worker.is_settled() {
                debug!(key = %function.key.display(), "deadline passed during load, skipping handler");
                return;
            }

            let hook_invocation = Arc::clone(&worker);
            let hook: CompletionHook = Arc::new(move |outcome| {
                if !hook_invocation.complete(outcome) {
                    debug!("late completion ignored");
                }
            });

            let until = deadline.into_std();
            let ran = tokio::task::spawn_blocking(move || run_handler(&module, &event, hook, until)).await;
            match ran {
                Ok(Ok(())) => {}
                Ok(Err(failure)) => {
                    worker.complete(failure.into());
                }
                Err(e) => {
                    warn!(key = %function.key.display(), error = %e, "handler task failed");
                    worker.complete(Failure::handler_execution("handler panicked").into());
                }
            }
        });

        let outcome = receiver
            .await
            .unwrap_or_else(|_| Failure::handler_execution("invocation dropped without an outcome").into());
        timer.abort();
        outcome
    }
}
