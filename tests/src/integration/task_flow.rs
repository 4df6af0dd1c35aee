//! # Task Flow
//!
//! A caller and a worker, each with its own connection to one broker, talk
//! only through the shared task channel.
//!
//! ```text
//! caller listener ──call──→ bus ──→ worker listener ──→ handler
//!        ↑                                                 │
//!        └──────────────── result / exception ─────────────┘
//! ```

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::future::join_all;
    use serde_json::{json, Value};
    use shared_bus::{InMemoryBroker, PubSubConnection};
    use std::sync::Arc;
    use std::time::Duration;
    use task_queue::{
        ListenerState, TaskContext, TaskEnvelope, TaskError, TaskFailure, TaskHandler, TaskId,
        TaskListener, TaskQueueConfig, TaskRoute,
    };
    use tokio::time::timeout;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const WAIT: Duration = Duration::from_secs(2);

    /// Worker-side handler.
    struct InventoryHandler {
        ctx: TaskContext,
        warehouse: String,
    }

    impl TaskHandler for InventoryHandler {
        type Options = String;

        fn new(ctx: TaskContext, warehouse: &String) -> Self {
            Self {
                ctx,
                warehouse: warehouse.clone(),
            }
        }

        fn routes() -> Vec<TaskRoute<Self>> {
            vec![
                TaskRoute::new("stock", |h: Arc<Self>, args| async move {
                    let item: String = args.get(0)?;
                    Ok::<_, TaskFailure>(json!({"warehouse": h.warehouse, "item": item, "count": 3}))
                }),
                TaskRoute::new("delayed_echo", |_h: Arc<Self>, args| async move {
                    let delay_ms: u64 = args.get(0)?;
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Ok::<_, TaskFailure>(args.get::<Value>(1)?)
                }),
                TaskRoute::new("reserve", |h: Arc<Self>, args| async move {
                    let item: String = args.get(0)?;
                    // Chain a second call through the same queue.
                    let stock = h
                        .ctx
                        .dispatcher()
                        .call_task("stock", vec![json!(item)])
                        .await?;
                    Ok::<_, TaskFailure>(json!({"reserved": item, "available": stock["count"]}))
                }),
                TaskRoute::new("out_of_stock", |_h: Arc<Self>, args| async move {
                    let item: String = args.get(0)?;
                    Err::<(), _>(TaskFailure::new("LookupError", format!("no {item} left")))
                }),
            ]
        }
    }

    struct Deployment {
        broker: Arc<InMemoryBroker>,
        caller: TaskListener,
        worker: TaskListener,
    }

    impl Deployment {
        async fn start() -> Self {
            let broker = Arc::new(InMemoryBroker::new());
            let config = TaskQueueConfig::default();

            let caller_conn: Arc<dyn PubSubConnection> = Arc::new(broker.connection());
            let caller = TaskListener::new(caller_conn, &config);

            let worker_conn: Arc<dyn PubSubConnection> = Arc::new(broker.connection());
            let worker = TaskListener::new(worker_conn, &config);
            worker.add_task_handler::<InventoryHandler>("north".to_string());

            caller.start().await;
            worker.start().await;
            Self {
                broker,
                caller,
                worker,
            }
        }

        async fn stop(self) {
            self.caller.stop(true).await;
            self.worker.stop(true).await;
        }
    }

    // =============================================================================
    // CALLS ACROSS CONNECTIONS
    // =============================================================================

    #[tokio::test]
    async fn test_call_crosses_connections() {
        let deployment = Deployment::start().await;

        let result = timeout(
            WAIT,
            deployment.caller.call_task("stock", vec![json!("bolts")]),
        )
        .await
        .unwrap();
        assert_eq!(
            result,
            Ok(json!({"warehouse": "north", "item": "bolts", "count": 3}))
        );
        assert!(deployment.caller.registered_functions().is_empty());

        deployment.stop().await;
    }

    #[tokio::test]
    async fn test_handler_chains_calls() {
        let deployment = Deployment::start().await;

        let result = timeout(
            WAIT,
            deployment.caller.call_task("reserve", vec![json!("nuts")]),
        )
        .await
        .unwrap();
        assert_eq!(result, Ok(json!({"reserved": "nuts", "available": 3})));

        deployment.stop().await;
    }

    #[tokio::test]
    async fn test_remote_exception_reaches_caller() {
        let deployment = Deployment::start().await;

        let outcome = timeout(
            WAIT,
            deployment.caller.call_task("out_of_stock", vec![json!("gears")]),
        )
        .await
        .unwrap();
        match outcome {
            Err(TaskError::Remote(e)) => {
                assert_eq!(e.exc_type_name, "LookupError");
                assert_eq!(e.exc_message, "no gears left");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        deployment.stop().await;
    }

    #[tokio::test]
    async fn test_delayed_call() {
        let deployment = Deployment::start().await;
        let started = tokio::time::Instant::now();

        let handle = deployment.caller.dispatcher().call_task_delayed(
            "delayed_echo",
            vec![json!(0), json!("later")],
            Some(Duration::from_millis(50)),
        );
        let result = timeout(WAIT, handle).await.unwrap();
        assert_eq!(result, Ok(json!("later")));
        assert!(started.elapsed() >= Duration::from_millis(50));

        deployment.stop().await;
    }

    // =============================================================================
    // CORRELATION
    // =============================================================================

    #[tokio::test]
    async fn test_concurrent_calls_resolve_to_their_own_values() {
        let deployment = Deployment::start().await;

        // Later calls finish first.
        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                deployment
                    .caller
                    .call_task("delayed_echo", vec![json!((8 - i) * 10), json!(i)])
            })
            .collect();
        let results = timeout(WAIT, join_all(handles)).await.unwrap();

        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result, Ok(json!(i)));
        }

        deployment.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_task_id_dropped() {
        let deployment = Deployment::start().await;
        let pending = deployment.caller.call_task("delayed_echo", vec![json!(100), json!("mine")]);

        // An outcome nobody waits for.
        let stray = TaskEnvelope::result(TaskId::new(), json!("stray"));
        deployment
            .caller
            .dispatcher()
            .publish(stray.encode().unwrap())
            .await
            .unwrap();

        let result = timeout(WAIT, pending).await.unwrap();
        assert_eq!(result, Ok(json!("mine")));

        deployment.stop().await;
    }

    #[tokio::test]
    async fn test_garbage_on_channel_ignored() {
        let deployment = Deployment::start().await;
        let publisher = deployment.broker.connection();
        publisher.connect().await.unwrap();
        publisher
            .publish("task-queue", Bytes::from_static(b"not an envelope"))
            .await
            .unwrap();

        let result = timeout(
            WAIT,
            deployment.caller.call_task("stock", vec![json!("washers")]),
        )
        .await
        .unwrap();
        assert!(result.is_ok());

        deployment.stop().await;
    }

    // =============================================================================
    // SHUTDOWN
    // =============================================================================

    #[tokio::test]
    async fn test_soft_stop_lets_worker_finish() {
        let deployment = Deployment::start().await;
        let handle = deployment
            .caller
            .call_task("delayed_echo", vec![json!(100), json!("done")]);

        // Let the worker pick the call up.
        timeout(WAIT, async {
            while deployment.worker.in_flight().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let worker = deployment.worker.clone();
        let stopping = tokio::spawn(async move { worker.stop(true).await });

        assert_eq!(timeout(WAIT, handle).await.unwrap(), Ok(json!("done")));
        stopping.await.unwrap();
        assert_eq!(deployment.worker.state(), ListenerState::Stopped);

        deployment.stop().await;
    }

    #[tokio::test]
    async fn test_call_after_worker_stopped_stays_pending() {
        let deployment = Deployment::start().await;
        deployment.worker.stop(false).await;

        let handle = deployment.caller.call_task("stock", vec![json!("bolts")]);
        assert!(timeout(Duration::from_millis(200), handle).await.is_err());

        deployment.stop().await;
    }
}
