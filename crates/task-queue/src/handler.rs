//! # Task Handlers
//!
//! Callee-side registration. A [`TaskHandler`] type lists the functions it
//! serves as [`TaskRoute`]s; the listener builds a fresh handler for every
//! call, passing the call's [`TaskContext`] and the options given at
//! registration.
//!
//! ```ignore
//! struct MathHandler;
//!
//! impl TaskHandler for MathHandler {
//!     type Options = ();
//!
//!     fn new(_ctx: TaskContext, _options: &()) -> Self {
//!         MathHandler
//!     }
//!
//!     fn routes() -> Vec<TaskRoute<Self>> {
//!         vec![TaskRoute::new("add", |_h, args| async move {
//!             Ok::<_, TaskFailure>(args.get::<i64>(0)? + args.get::<i64>(1)?)
//!         })]
//!     }
//! }
//! ```

use crate::correlation::TaskId;
use crate::dispatcher::TaskDispatcher;
use crate::errors::RemoteTaskError;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Future returned by a route invocation.
pub type TaskFuture = BoxFuture<'static, Result<Value, TaskFailure>>;

/// Type name reported for handlers that panicked.
pub const PANIC_TYPE_NAME: &str = "panic";

/// Type name reported for bad or missing arguments.
pub const TYPE_ERROR: &str = "TypeError";

/// A handler failure, reported back to the caller as an `exception`.
///
/// Any `std::error::Error` converts into one, so handlers can use `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub type_name: String,
    pub message: String,
    pub traceback: String,
}

impl TaskFailure {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            traceback: String::new(),
        }
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = traceback.into();
        self
    }

    /// Build a failure from a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        Self::new(PANIC_TYPE_NAME, message)
    }

    pub fn into_remote(self) -> RemoteTaskError {
        RemoteTaskError {
            exc_type_name: self.type_name,
            exc_message: self.message,
            formatted_traceback: self.traceback,
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

/// Last path segment of a type name, generics stripped.
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

impl<E> From<E> for TaskFailure
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        let full_type = std::any::type_name::<E>();
        let mut traceback = format!("{full_type}: {error}");
        let mut source = error.source();
        while let Some(cause) = source {
            traceback.push_str(&format!("\nCaused by: {cause}"));
            source = cause.source();
        }

        Self {
            type_name: short_type_name(full_type).to_string(),
            message: error.to_string(),
            traceback,
        }
    }
}

/// Positional arguments of a call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskArgs(Vec<Value>);

impl TaskArgs {
    pub fn new(args: Vec<Value>) -> Self {
        Self(args)
    }

    /// Deserialize the argument at `index`.
    ///
    /// A missing or mistyped argument fails with a `TypeError`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, TaskFailure> {
        let value = self.0.get(index).ok_or_else(|| {
            TaskFailure::new(
                TYPE_ERROR,
                format!("missing positional argument {index}"),
            )
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            TaskFailure::new(TYPE_ERROR, format!("argument {index}: {e}"))
        })
    }

    /// Like [`get`](Self::get), but a missing argument is `None`.
    pub fn get_opt<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>, TaskFailure> {
        if index >= self.0.len() {
            return Ok(None);
        }
        self.get(index).map(Some)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn raw(&self) -> &[Value] {
        &self.0
    }
}

/// Per-call context handed to [`TaskHandler::new`].
#[derive(Clone)]
pub struct TaskContext {
    task_id: TaskId,
    dispatcher: TaskDispatcher,
    cancel: watch::Receiver<bool>,
}

impl TaskContext {
    pub(crate) fn new(
        task_id: TaskId,
        dispatcher: TaskDispatcher,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            task_id,
            dispatcher,
            cancel,
        }
    }

    /// ID of the call being served.
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Dispatcher for calling further tasks.
    pub fn dispatcher(&self) -> &TaskDispatcher {
        &self.dispatcher
    }

    /// Whether the listener is hard-stopping.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once the listener hard-stops.
    ///
    /// Work the handler spawned outside its own future can watch this to
    /// stop with it.
    pub async fn cancelled(&self) {
        let mut cancel = self.cancel.clone();
        wait_for_cancel(&mut cancel).await;
    }
}

/// Wait until the flag is set. Returns early if the sender is gone.
pub(crate) async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

/// A type serving one or more task functions.
pub trait TaskHandler: Sized + Send + Sync + 'static {
    /// Registration-time options, cloned into every instance.
    type Options: Clone + Send + Sync + 'static;

    /// Build the handler for one call.
    fn new(ctx: TaskContext, options: &Self::Options) -> Self;

    /// The functions this handler serves.
    fn routes() -> Vec<TaskRoute<Self>>;
}

type RouteFn<H> = Arc<dyn Fn(Arc<H>, TaskArgs) -> TaskFuture + Send + Sync>;

/// One function served by handler `H`.
pub struct TaskRoute<H> {
    name: String,
    call: RouteFn<H>,
}

impl<H: TaskHandler> TaskRoute<H> {
    /// Serve `name` with `f`. The returned value is serialized into the
    /// `result` envelope.
    pub fn new<F, Fut, R>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arc<H>, TaskArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, TaskFailure>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        let call: RouteFn<H> = Arc::new(move |handler: Arc<H>, args: TaskArgs| -> TaskFuture {
            let fut = f(handler, args);
            Box::pin(async move {
                let value = fut.await?;
                serde_json::to_value(value).map_err(TaskFailure::from)
            })
        });
        Self {
            name: name.into(),
            call,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builds a handler and runs one of its routes.
pub(crate) type Invoker = Arc<dyn Fn(TaskContext, TaskArgs) -> TaskFuture + Send + Sync>;

#[derive(Clone)]
pub(crate) struct RegisteredRoute {
    pub(crate) handler: &'static str,
    pub(crate) invoke: Invoker,
}

/// Function name to the handlers serving it.
///
/// Several handlers may serve the same function; a call then runs each of
/// them. Registration is append-only.
#[derive(Default)]
pub struct HandlerRegistry {
    routes: RwLock<HashMap<String, Vec<RegisteredRoute>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every route of `H`. Returns how many were added.
    pub fn add<H: TaskHandler>(&self, options: H::Options) -> usize {
        let handler = std::any::type_name::<H>();
        let routes = H::routes();
        let count = routes.len();

        let mut table = self.routes.write();
        for route in routes {
            let options = options.clone();
            let call = route.call;
            let invoke: Invoker = Arc::new(move |ctx: TaskContext, args: TaskArgs| -> TaskFuture {
                let instance = Arc::new(H::new(ctx, &options));
                call(instance, args)
            });

            debug!(function = %route.name, handler, "Registered task function");
            table
                .entry(route.name)
                .or_default()
                .push(RegisteredRoute { handler, invoke });
        }
        count
    }

    pub(crate) fn lookup(&self, function: &str) -> Vec<RegisteredRoute> {
        self.routes
            .read()
            .get(function)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains(&self, function: &str) -> bool {
        self.routes.read().contains_key(function)
    }

    /// Registered function names, sorted.
    pub fn functions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.read().keys().cloned().collect();
        names.sort();
        names
    }
}
