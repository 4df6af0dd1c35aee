//! # Gateway Flow
//!
//! Signed HTTP requests through the gateway router into a worker on the
//! task queue.
//!
//! ```text
//! client ──signed POST──→ ApiGatewayService ──call──→ bus ──→ worker
//!   ↑                          │    ↑                          │
//!   └──── {"result": ...} ─────┘    └────────── result ────────┘
//! ```

#[cfg(test)]
mod tests {
    use api_gateway::{ApiGatewayService, GatewayConfig, HttpsMode};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use axum::Router;
    use k256::ecdsa::SigningKey;
    use request_auth::{private_key_to_address, unix_now, RequestBody, SignedHeaders};
    use serde_json::{json, Value};
    use shared_bus::{InMemoryBroker, PubSubConnection};
    use std::sync::Arc;
    use task_queue::{
        TaskContext, TaskFailure, TaskHandler, TaskListener, TaskQueueConfig, TaskRoute,
    };
    use tower::ServiceExt;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct AccountHandler;

    impl TaskHandler for AccountHandler {
        type Options = ();

        fn new(_ctx: TaskContext, _options: &()) -> Self {
            Self
        }

        fn routes() -> Vec<TaskRoute<Self>> {
            vec![
                TaskRoute::new("balance", |_h: Arc<Self>, args| async move {
                    let address: String = args.get(0)?;
                    Ok::<_, TaskFailure>(json!({"address": address, "balance": "0x0"}))
                }),
                TaskRoute::new("close_account", |_h: Arc<Self>, _args| async move {
                    Err::<(), _>(
                        TaskFailure::new("PermissionError", "account is locked")
                            .with_traceback("at close_account"),
                    )
                }),
                TaskRoute::new("drop_tables", |_h: Arc<Self>, _args| async move {
                    Ok::<_, TaskFailure>("dropped")
                }),
            ]
        }
    }

    struct Stack {
        _broker: Arc<InMemoryBroker>,
        caller: TaskListener,
        worker: TaskListener,
        gateway: ApiGatewayService,
    }

    impl Stack {
        async fn start(config: GatewayConfig) -> Self {
            let broker = Arc::new(InMemoryBroker::new());
            let queue = TaskQueueConfig::default();

            let worker_conn: Arc<dyn PubSubConnection> = Arc::new(broker.connection());
            let worker = TaskListener::new(worker_conn, &queue);
            worker.add_task_handler::<AccountHandler>(());
            worker.start().await;

            let caller_conn: Arc<dyn PubSubConnection> = Arc::new(broker.connection());
            let caller = TaskListener::new(caller_conn, &queue);
            caller.start().await;

            let gateway = ApiGatewayService::new(config, caller.dispatcher().clone()).unwrap();
            Self {
                _broker: broker,
                caller,
                worker,
                gateway,
            }
        }

        fn router(&self) -> Router {
            self.gateway.router()
        }

        async fn stop(self) {
            self.caller.stop(true).await;
            self.worker.stop(true).await;
        }
    }

    fn config() -> GatewayConfig {
        GatewayConfig {
            callable_tasks: vec!["balance".into(), "close_account".into()],
            ..Default::default()
        }
    }

    fn signed_request(
        key: &SigningKey,
        method: &str,
        path: &str,
        body: &str,
        timestamp: i64,
    ) -> Request<Body> {
        let headers = SignedHeaders::new(
            key,
            method,
            path,
            timestamp,
            RequestBody::Raw(body.as_bytes()),
        )
        .unwrap();
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers.iter("Dgas") {
            builder = builder.header(name, value);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn random_key() -> SigningKey {
        SigningKey::random(&mut rand::thread_rng())
    }

    // =============================================================================
    // END TO END
    // =============================================================================

    #[tokio::test]
    async fn test_signed_task_call_round_trip() {
        let stack = Stack::start(config()).await;
        let key = random_key();
        let address = private_key_to_address(&key).to_string();
        let body = json!({"args": [address]}).to_string();

        let response = stack
            .router()
            .oneshot(signed_request(&key, "POST", "/v1/tasks/balance", &body, unix_now()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"result": {"address": address, "balance": "0x0"}})
        );

        stack.stop().await;
    }

    #[tokio::test]
    async fn test_whoami_reports_signer() {
        let stack = Stack::start(config()).await;
        let key = random_key();

        let response = stack
            .router()
            .oneshot(signed_request(&key, "GET", "/v1/whoami", "", unix_now()))
            .await
            .unwrap();
        assert_eq!(
            json_body(response).await,
            json!({"address": private_key_to_address(&key).to_string()})
        );

        stack.stop().await;
    }

    #[tokio::test]
    async fn test_registered_but_not_allow_listed() {
        let stack = Stack::start(config()).await;
        assert!(stack
            .worker
            .registered_functions()
            .contains(&"drop_tables".to_string()));

        let response = stack
            .router()
            .oneshot(signed_request(
                &random_key(),
                "POST",
                "/v1/tasks/drop_tables",
                "{}",
                unix_now(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(response).await,
            json!({"errors": [{"id": "unknown_task", "message": "Unknown task: drop_tables"}]})
        );

        stack.stop().await;
    }

    #[tokio::test]
    async fn test_remote_failure_maps_to_500() {
        let stack = Stack::start(GatewayConfig {
            debug: true,
            ..config()
        })
        .await;

        let response = stack
            .router()
            .oneshot(signed_request(
                &random_key(),
                "POST",
                "/v1/tasks/close_account",
                "",
                unix_now(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            json!({
                "errors": [{"id": "task_failed", "message": "PermissionError: account is locked"}],
                "exc_info": ["PermissionError: account is locked", "at close_account"]
            })
        );

        stack.stop().await;
    }

    // =============================================================================
    // REJECTIONS
    // =============================================================================

    #[tokio::test]
    async fn test_stale_request_rejected() {
        let stack = Stack::start(config()).await;

        let response = stack
            .router()
            .oneshot(signed_request(
                &random_key(),
                "GET",
                "/v1/whoami",
                "",
                unix_now() - 600,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["errors"][0]["id"], "invalid_timestamp");

        stack.stop().await;
    }

    #[tokio::test]
    async fn test_signature_bound_to_path() {
        let stack = Stack::start(config()).await;
        let mut request = signed_request(&random_key(), "GET", "/v1/whoami", "", unix_now());
        *request.uri_mut() = "/v1/tasks/balance".parse().unwrap();
        *request.method_mut() = axum::http::Method::POST;

        let response = stack.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["errors"][0]["id"], "invalid_signature");

        stack.stop().await;
    }

    #[tokio::test]
    async fn test_redirect_before_auth() {
        let stack = Stack::start(GatewayConfig {
            enforce_https: Some(HttpsMode::Redirect),
            ..config()
        })
        .await;

        let request = Request::get("/v1/whoami")
            .header(header::HOST, "api.dgas.io")
            .body(Body::empty())
            .unwrap();
        let response = stack.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://api.dgas.io/v1/whoami"
        );

        stack.stop().await;
    }
}
