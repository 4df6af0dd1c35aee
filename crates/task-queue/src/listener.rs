//! # Task Listener
//!
//! Callee side of the queue. One dispatch loop reads the task channel:
//!
//! - `call` envelopes run every handler registered for the function, each
//!   as its own Tokio task, so a slow handler never holds up the loop.
//! - `result` and `exception` envelopes go to the dispatcher's pending table.
//!
//! ## Lifecycle
//!
//! ```text
//! Stopped ──start()──→ Starting ──→ Running ──stop()──→ Stopping ──→ Stopped
//! ```
//!
//! `stop(soft = true)` lets in-flight handlers finish and publish their
//! outcome; `stop(soft = false)` cancels them. Either way the loop exits and
//! the shared connection is closed afterwards.

use crate::config::TaskQueueConfig;
use crate::correlation::TaskId;
use crate::dispatcher::{TaskDispatcher, TaskHandle};
use crate::envelope::{TaskEnvelope, TaskMessage};
use crate::errors::EnvelopeError;
use crate::handler::{
    wait_for_cancel, HandlerRegistry, RegisteredRoute, TaskArgs, TaskContext, TaskFailure,
    TaskHandler,
};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use shared_bus::{BusError, PubSubConnection, Subscription};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Delay before the dispatch loop retries after an error, and between
/// attempts to publish an outcome.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Listener lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct InFlight {
    task_id: TaskId,
    function: String,
    handle: JoinHandle<()>,
}

struct ListenerInner {
    dispatcher: TaskDispatcher,
    registry: HandlerRegistry,
    state: Mutex<ListenerState>,
    /// Bumped under the state lock by every `start()` and `stop()`. A
    /// `start()` only spawns the loop if its epoch is still current.
    epoch: AtomicU64,
    /// Set for the whole of `stop()`. New calls are refused and handler
    /// failures are no longer reported.
    shutting_down: AtomicBool,
    /// Hard-stop signal for running handlers.
    hard_cancel: watch::Sender<bool>,
    /// Tells the dispatch loop to exit.
    close_loop: watch::Sender<bool>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    /// Running handler executions, by execution number.
    in_flight: Mutex<HashMap<u64, InFlight>>,
    next_execution: AtomicU64,
}

/// Serves task calls from the channel and routes outcomes to the dispatcher.
///
/// Cheap to clone; clones control the same listener.
#[derive(Clone)]
pub struct TaskListener {
    inner: Arc<ListenerInner>,
}

impl TaskListener {
    /// Create a stopped listener on `connection`.
    pub fn new(connection: Arc<dyn PubSubConnection>, config: &TaskQueueConfig) -> Self {
        let (hard_cancel, _) = watch::channel(false);
        let (close_loop, _) = watch::channel(false);

        Self {
            inner: Arc::new(ListenerInner {
                dispatcher: TaskDispatcher::new(connection, config.channel.clone()),
                registry: HandlerRegistry::new(),
                state: Mutex::new(ListenerState::Stopped),
                epoch: AtomicU64::new(0),
                shutting_down: AtomicBool::new(false),
                hard_cancel,
                close_loop,
                loop_handle: Mutex::new(None),
                in_flight: Mutex::new(HashMap::new()),
                next_execution: AtomicU64::new(0),
            }),
        }
    }

    /// The dispatcher whose calls this listener resolves.
    pub fn dispatcher(&self) -> &TaskDispatcher {
        &self.inner.dispatcher
    }

    /// Shorthand for [`TaskDispatcher::call_task`].
    pub fn call_task(&self, function: &str, args: Vec<Value>) -> TaskHandle {
        self.inner.dispatcher.call_task(function, args)
    }

    /// Register the functions served by `H`, built with `options` per call.
    pub fn add_task_handler<H: TaskHandler>(&self, options: H::Options) -> &Self {
        let added = self.inner.registry.add::<H>(options);
        info!(
            handler = std::any::type_name::<H>(),
            functions = added,
            "Task handler registered"
        );
        self
    }

    pub fn registered_functions(&self) -> Vec<String> {
        self.inner.registry.functions()
    }

    pub fn state(&self) -> ListenerState {
        *self.inner.state.lock()
    }

    /// IDs of the calls currently executing.
    pub fn in_flight(&self) -> Vec<TaskId> {
        self.inner
            .in_flight
            .lock()
            .values()
            .map(|run| run.task_id.clone())
            .collect()
    }

    /// Connect, subscribe and spawn the dispatch loop.
    ///
    /// Never fails: connection problems are logged and the loop keeps
    /// retrying in the background. A no-op unless stopped. A `stop()` that
    /// lands while connecting wins and the loop is never spawned.
    pub async fn start(&self) {
        let epoch = {
            let mut state = self.inner.state.lock();
            if *state != ListenerState::Stopped {
                debug!(state = ?*state, "Task listener already started");
                return;
            }
            *state = ListenerState::Starting;
            self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1
        };

        self.inner.shutting_down.store(false, Ordering::SeqCst);
        self.inner.hard_cancel.send_replace(false);
        self.inner.close_loop.send_replace(false);

        let connection = self.inner.dispatcher.connection();
        let channel = self.inner.dispatcher.channel();

        if let Err(e) = connection.connect().await {
            error!(error = %e, "Failed to connect task listener");
        }

        let subscription = match connection.subscribe(channel).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                error!(channel, error = %e, "Failed to subscribe to task channel");
                None
            }
        };

        let superseded = {
            let mut state = self.inner.state.lock();
            let current = self.inner.epoch.load(Ordering::SeqCst) == epoch;
            if *state == ListenerState::Starting && current {
                let inner = Arc::clone(&self.inner);
                let handle = tokio::spawn(dispatch_loop(inner, subscription));
                *self.inner.loop_handle.lock() = Some(handle);
                *state = ListenerState::Running;
                None
            } else {
                Some(*state)
            }
        };

        if let Some(state) = superseded {
            debug!(state = ?state, "Task listener stopped while starting");
            // A running stop() closes the connection itself
            if state == ListenerState::Stopped {
                connection.close().await;
            }
            return;
        }

        info!(channel, "Task listener started");
    }

    /// Stop the listener.
    ///
    /// With `soft` set, in-flight handlers run to completion and publish
    /// their outcome; otherwise they are cancelled. Returns once every
    /// handler has finished, the loop has exited and the connection is
    /// closed.
    pub async fn stop(&self, soft: bool) {
        {
            let mut state = self.inner.state.lock();
            if matches!(*state, ListenerState::Stopped | ListenerState::Stopping) {
                return;
            }
            *state = ListenerState::Stopping;
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        }

        info!(soft, "Stopping task listener");
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        if !soft {
            self.inner.hard_cancel.send_replace(true);
        }

        let runs: Vec<InFlight> = self
            .inner
            .in_flight
            .lock()
            .drain()
            .map(|(_, run)| run)
            .collect();
        for run in runs {
            if let Err(e) = run.handle.await {
                error!(
                    task_id = %run.task_id,
                    function = %run.function,
                    error = %e,
                    "Task execution ended abnormally"
                );
            }
        }

        self.inner.close_loop.send_replace(true);
        let loop_handle = self.inner.loop_handle.lock().take();
        if let Some(handle) = loop_handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatch loop ended abnormally");
            }
        }

        self.inner.dispatcher.connection().close().await;
        *self.inner.state.lock() = ListenerState::Stopped;
        info!("Task listener stopped");
    }
}

async fn dispatch_loop(inner: Arc<ListenerInner>, mut subscription: Option<Box<dyn Subscription>>) {
    let mut close = inner.close_loop.subscribe();
    let channel = inner.dispatcher.channel().to_string();

    loop {
        if *close.borrow_and_update() {
            break;
        }

        let mut sub = match subscription.take() {
            Some(sub) => sub,
            None => match inner.dispatcher.connection().subscribe(&channel).await {
                Ok(sub) => sub,
                Err(e) => {
                    if !inner.shutting_down.load(Ordering::SeqCst) {
                        warn!(channel = %channel, error = %e, "Cannot subscribe to task channel, retrying");
                    }
                    backoff(&mut close).await;
                    continue;
                }
            },
        };

        // Messages first, so outcomes published while draining are still
        // delivered before the loop exits.
        let next = tokio::select! {
            biased;

            message = sub.next_message() => Some(message),
            _ = close.changed() => None,
        };

        match next {
            Some(Ok(payload)) => {
                inner.handle_message(&payload);
                subscription = Some(sub);
            }
            Some(Err(e)) => {
                if !inner.shutting_down.load(Ordering::SeqCst) {
                    error!(channel = %channel, error = %e, "Task dispatch loop error, restarting");
                }
                backoff(&mut close).await;
            }
            None => subscription = Some(sub),
        }
    }

    if let Some(mut sub) = subscription {
        sub.unsubscribe();
    }
    debug!(channel = %channel, "Task dispatch loop exited");
}

/// Sleep for the retry backoff, waking early if the loop is told to close.
async fn backoff(close: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(RETRY_BACKOFF) => {}
        _ = close.changed() => {}
    }
}

impl ListenerInner {
    fn handle_message(self: &Arc<Self>, payload: &[u8]) {
        let envelope = match TaskEnvelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(EnvelopeError::UnknownAction { task_id, action }) => {
                error!(task_id = %task_id, action = %action, "Unknown task message action");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Dropping invalid task message");
                return;
            }
        };

        match envelope.message {
            TaskMessage::Call { function, args } => {
                self.spawn_calls(envelope.task_id, &function, args);
            }
            message => {
                self.dispatcher.handle_response(TaskEnvelope {
                    task_id: envelope.task_id,
                    message,
                });
            }
        }
    }

    fn spawn_calls(self: &Arc<Self>, task_id: TaskId, function: &str, args: Vec<Value>) {
        let routes = self.registry.lookup(function);
        if routes.is_empty() {
            debug!(task_id = %task_id, function, "No handler for task function");
            return;
        }

        for route in routes {
            let mut in_flight = self.in_flight.lock();
            if self.shutting_down.load(Ordering::SeqCst) {
                debug!(task_id = %task_id, function, "Listener stopping, call not started");
                return;
            }

            let execution = self.next_execution.fetch_add(1, Ordering::Relaxed);
            let ctx = TaskContext::new(
                task_id.clone(),
                self.dispatcher.clone(),
                self.hard_cancel.subscribe(),
            );
            debug!(task_id = %task_id, function, handler = route.handler, "Starting task");

            let handle = tokio::spawn(run_handler(
                Arc::clone(self),
                execution,
                ctx,
                route,
                function.to_string(),
                TaskArgs::new(args.clone()),
            ));
            in_flight.insert(
                execution,
                InFlight {
                    task_id: task_id.clone(),
                    function: function.to_string(),
                    handle,
                },
            );
        }
    }

    /// Publish an outcome, retrying until it goes out or the connection is
    /// closed.
    async fn publish_outcome(&self, envelope: TaskEnvelope, function: &str) {
        let payload = match envelope.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!(task_id = %envelope.task_id, function, error = %e, "Cannot encode task outcome");
                return;
            }
        };

        loop {
            match self.dispatcher.publish(payload.clone()).await {
                Ok(_) => return,
                Err(BusError::ConnectionClosed) => {
                    if !self.shutting_down.load(Ordering::SeqCst) {
                        warn!(
                            task_id = %envelope.task_id,
                            function,
                            "Task finished after connection closed"
                        );
                    }
                    return;
                }
                Err(e) => {
                    error!(task_id = %envelope.task_id, function, error = %e, "Error sending task outcome");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }

    async fn report_failure(&self, task_id: TaskId, function: &str, failure: TaskFailure) {
        if self.shutting_down.load(Ordering::SeqCst) {
            debug!(task_id = %task_id, function, error = %failure, "Task failed during shutdown");
            return;
        }
        if self.dispatcher.connection().is_closed() {
            error!(task_id = %task_id, function, error = %failure, "Task failed after connection closed");
            return;
        }

        error!(task_id = %task_id, function, error = %failure, "Task call failed");
        self.publish_outcome(TaskEnvelope::exception(task_id, failure.into_remote()), function)
            .await;
    }
}

async fn run_handler(
    inner: Arc<ListenerInner>,
    execution: u64,
    ctx: TaskContext,
    route: RegisteredRoute,
    function: String,
    args: TaskArgs,
) {
    let task_id = ctx.task_id().clone();
    let mut cancel = inner.hard_cancel.subscribe();
    let invoke = route.invoke;
    let call = AssertUnwindSafe(async move { invoke(ctx, args).await }).catch_unwind();

    let outcome = tokio::select! {
        biased;

        _ = wait_for_cancel(&mut cancel) => None,
        outcome = call => Some(outcome),
    };

    match outcome {
        None => debug!(task_id = %task_id, function = %function, "Task cancelled"),
        Some(Ok(Ok(value))) => {
            inner
                .publish_outcome(TaskEnvelope::result(task_id, value), &function)
                .await;
        }
        Some(Ok(Err(failure))) => inner.report_failure(task_id, &function, failure).await,
        Some(Err(panic)) => {
            inner
                .report_failure(task_id, &function, TaskFailure::from_panic(panic))
                .await;
        }
    }

    inner.in_flight.lock().remove(&execution);
}
