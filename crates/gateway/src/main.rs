//! Chronoscope API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Authentication and authorization
//! - Rate limiting
//! - Request routing
//! - The background dispatch worker
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;

use axum::{
    extract::FromRef,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use chronoscope_common::{
    auth::{fingerprint, CallbackCredential, JwtManager, SharedSecret},
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, MemoryStore, Repository, Store},
    dispatch::{DispatchQueue, DispatchReceiver, DispatchStats, DispatchWorker, HttpChronoClient},
    errors::AppError,
    ingestion::ResultIngestion,
    lifecycle::RequestLifecycle,
    metrics as app_metrics,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use handlers::{chrono, health, layers};
use middleware::{metrics::track_metrics, rate_limit};

/// `database.url` value that selects the in-process store
const MEMORY_DATABASE_URL: &str = "memory";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub lifecycle: Arc<RequestLifecycle>,
    pub ingestion: Arc<ResultIngestion>,
    pub jwt: Arc<JwtManager>,
    pub db: Option<DbPool>,
    pub dispatch_stats: Option<Arc<DispatchStats>>,
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

/// Worker half of the dispatch queue, present when completion delegates
pub struct DispatchHandle {
    pub worker: DispatchWorker,
    pub receiver: DispatchReceiver,
}

impl AppState {
    /// Wire the core components over `store`
    pub fn build(
        config: Arc<AppConfig>,
        store: Arc<dyn Store>,
        db: Option<DbPool>,
    ) -> Result<(Self, Option<DispatchHandle>), AppError> {
        let jwt_secret = config
            .auth
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "auth.jwt_secret is required".to_string(),
            })?;
        let jwt = Arc::new(JwtManager::new(jwt_secret, config.auth.jwt_expiration_secs));

        let secret = config.callback.shared_secret.clone().unwrap_or_default();
        if secret.is_empty() {
            warn!("callback.shared_secret is unset; async results will be rejected");
        } else {
            info!(fingerprint = %fingerprint(&secret), "Callback secret configured");
        }
        let credential: Arc<dyn CallbackCredential> = Arc::new(SharedSecret::new(secret));

        let strategy = config.completion.strategy;
        let mut lifecycle = RequestLifecycle::new(store.clone(), strategy);
        let mut dispatch = None;
        let mut dispatch_stats = None;

        if strategy.delegates() {
            let (queue, receiver) = DispatchQueue::new(config.callback.queue_capacity);
            let client = Arc::new(HttpChronoClient::new(
                &config.callback.service_url,
                config.dispatch_timeout(),
            )?);
            let worker = DispatchWorker::new(
                store.clone(),
                client,
                credential.clone(),
                &queue,
                config.callback.concurrency,
            );

            dispatch_stats = Some(queue.stats());
            dispatch = Some(DispatchHandle { worker, receiver });
            lifecycle = lifecycle.with_dispatcher(queue);
        }

        let state = Self {
            ingestion: Arc::new(ResultIngestion::new(store.clone(), credential)),
            lifecycle: Arc::new(lifecycle),
            config,
            store,
            jwt,
            db,
            dispatch_stats,
        };

        Ok((state, dispatch))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config.observability);
    info!("Starting Chronoscope API Gateway v{}", chronoscope_common::VERSION);

    // Initialize metrics
    init_metrics(&config.observability)?;
    app_metrics::register_metrics();

    // Initialize storage
    let (store, db): (Arc<dyn Store>, Option<DbPool>) =
        if config.database.url == MEMORY_DATABASE_URL {
            warn!("Using in-memory store; data is lost on restart");
            (Arc::new(MemoryStore::new()), None)
        } else {
            info!("Connecting to database...");
            let db = DbPool::new(&config.database).await?;
            (Arc::new(Repository::new(db.clone())), Some(db))
        };

    let (state, dispatch) = AppState::build(config.clone(), store, db)?;
    info!(
        strategy = config.completion.strategy.as_str(),
        "Completion strategy configured"
    );

    let worker = dispatch.map(|handle| tokio::spawn(handle.worker.run(handle.receiver)));

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router, and with it the last queue sender, is gone; let the worker drain
    if let Some(worker) = worker {
        info!("Draining dispatch queue...");
        if tokio::time::timeout(config.shutdown_timeout(), worker).await.is_err() {
            warn!("Dispatch queue not drained before shutdown timeout");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.metrics_port)))
        .add_global_label("service", config.service_name.clone())
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", app_metrics::METRICS_PREFIX)),
            app_metrics::LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_dispatch_duration_seconds", app_metrics::METRICS_PREFIX)),
            app_metrics::DISPATCH_BUCKETS,
        )?
        .install()?;

    info!(port = config.metrics_port, "Prometheus exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        // Layer catalogue
        .route("/layers", get(layers::list_layers).post(layers::create_layer))
        .route(
            "/layers/{id}",
            get(layers::get_layer)
                .put(layers::update_layer)
                .delete(layers::delete_layer),
        )
        // Research requests
        .route("/chrono", get(chrono::list_requests))
        .route("/chrono/cart", get(chrono::cart))
        .route("/chrono/async-result", post(chrono::async_result))
        .route("/chrono/draft/layers/{layer_id}", post(chrono::add_layer_to_draft))
        .route(
            "/chrono/{id}",
            get(chrono::get_request)
                .put(chrono::update_draft)
                .delete(chrono::delete_request),
        )
        .route("/chrono/{id}/form", put(chrono::form_request))
        .route("/chrono/{id}/complete", put(chrono::complete_request))
        .route(
            "/chrono/{id}/layers/{layer_id}",
            put(chrono::comment_layer).delete(chrono::remove_layer),
        )
        .route_layer(from_fn(track_metrics));

    let mut app = Router::new().nest("/api", api_routes);

    if state.config.rate_limit.enabled {
        let limiter = rate_limit::create_rate_limiter(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        app = app.layer(from_fn_with_state(limiter, rate_limit::rate_limit_middleware));
    }

    // Compose the app
    app.layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tokio_test::{assert_err, assert_ok};
    use tower::ServiceExt;

    const MODERATOR: i64 = 1;
    const USER: i64 = 2;
    const OTHER_USER: i64 = 3;

    struct TestApp {
        router: Router,
        jwt: Arc<JwtManager>,
    }

    impl TestApp {
        fn new() -> Self {
            let mut config = AppConfig::default();
            config.auth.jwt_secret = Some("test-secret".to_string());
            config.callback.shared_secret = Some("111517".to_string());

            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            let (state, dispatch) = AppState::build(Arc::new(config), store, None).unwrap();
            assert!(dispatch.is_none());

            Self {
                jwt: state.jwt.clone(),
                router: create_router(state),
            }
        }

        fn token(&self, user_id: i64, is_moderator: bool) -> String {
            self.jwt
                .generate_token(user_id, &format!("user-{}", user_id), is_moderator)
                .unwrap()
        }

        async fn send(
            &self,
            method: &str,
            uri: &str,
            user: Option<(i64, bool)>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some((user_id, is_moderator)) = user {
                builder = builder.header(
                    "authorization",
                    format!("Bearer {}", self.token(user_id, is_moderator)),
                );
            }
            let body = match body {
                Some(value) => {
                    builder = builder.header("content-type", "application/json");
                    Body::from(value.to_string())
                }
                None => Body::empty(),
            };

            let response = self
                .router
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }

        async fn create_layer(&self, name: &str, year_from: i32, year_to: i32, words: &str) -> i64 {
            let (status, body) = self
                .send(
                    "POST",
                    "/api/layers",
                    Some((MODERATOR, true)),
                    Some(json!({
                        "name": name,
                        "year_from": year_from,
                        "year_to": year_to,
                        "words": words,
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{}", body);
            body["id"].as_i64().unwrap()
        }

        /// Draft with one layer and the given text, formed by USER
        async fn formed_request(&self, layer_id: i64, text: &str) -> i64 {
            let user = Some((USER, false));
            let (status, cart) = self
                .send("POST", &format!("/api/chrono/draft/layers/{}", layer_id), user, None)
                .await;
            assert_eq!(status, StatusCode::OK);
            let id = cart["request_id"].as_i64().unwrap();

            let (status, _) = self
                .send(
                    "PUT",
                    &format!("/api/chrono/{}", id),
                    user,
                    Some(json!({ "text_for_analysis": text, "purpose": "курсовая" })),
                )
                .await;
            assert_eq!(status, StatusCode::OK);

            let (status, body) = self
                .send("PUT", &format!("/api/chrono/{}/form", id), user, None)
                .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "formed");
            id
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new();
        let (status, body) = app.send("GET", "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = app.send("GET", "/api/ready", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test]
    async fn test_complete_flow() {
        let app = TestApp::new();
        let a = app.create_layer("Древнерусский", 1450, 1600, "вещати, чудо").await;
        let b = app.create_layer("Советский", 1800, 1917, "социализм").await;
        let id = app.formed_request(a, "вещати о социализм новом").await;

        let (status, body) = app
            .send("PUT", &format!("/api/chrono/{}/complete", id), Some((MODERATOR, true)), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");

        let (status, detail) = app
            .send("GET", &format!("/api/chrono/{}", id), Some((USER, false)), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["status"], "completed");
        assert_eq!(detail["result_year_from"], 1450);
        assert_eq!(detail["result_year_to"], 1917);
        assert_eq!(detail["matched_layer_count"], 2);
        assert_eq!(detail["moderator_id"], MODERATOR);

        let layer_ids: Vec<i64> = detail["layers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["layer_id"].as_i64().unwrap())
            .collect();
        assert_eq!(layer_ids, vec![a, b]);
    }

    #[tokio::test]
    async fn test_guard_failures_map_to_status_codes() {
        let app = TestApp::new();
        let layer = app.create_layer("Слой", 1000, 1100, "чудо").await;
        let id = app.formed_request(layer, "чудо").await;

        // Wrong status
        let (status, body) = app
            .send("PUT", &format!("/api/chrono/{}/form", id), Some((USER, false)), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_STATE");

        // Not a moderator
        let (status, body) = app
            .send("PUT", &format!("/api/chrono/{}/complete", id), Some((USER, false)), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        // No bearer token
        let (status, _) = app
            .send("PUT", &format!("/api/chrono/{}/complete", id), None, None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Unknown request
        let (status, body) = app
            .send("PUT", "/api/chrono/9999/complete", Some((MODERATOR, true)), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "REQUEST_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_complete_without_text_is_validation_error() {
        let app = TestApp::new();
        let layer = app.create_layer("Слой", 1000, 1100, "чудо").await;
        let id = app.formed_request(layer, "  ").await;

        let (status, body) = app
            .send("PUT", &format!("/api/chrono/{}/complete", id), Some((MODERATOR, true)), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "MISSING_TEXT");
    }

    #[tokio::test]
    async fn test_async_result_ingestion() {
        let app = TestApp::new();
        let layer = app.create_layer("Слой", 1000, 1100, "чудо").await;
        let id = app.formed_request(layer, "чудо").await;

        let result = json!({
            "research_request_id": id,
            "result_from_year": 1450,
            "result_to_year": 1600,
            "matched_layers": 1,
            "auth_token": "111517",
        });

        let (status, body) = app
            .send("POST", "/api/chrono/async-result", None, Some(result.clone()))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "updated", "request_id": id }));

        // Replay yields the same answer
        let (status, _) = app
            .send("POST", "/api/chrono/async-result", None, Some(result))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, detail) = app
            .send("GET", &format!("/api/chrono/{}", id), Some((MODERATOR, true)), None)
            .await;
        assert_eq!(detail["status"], "formed");
        assert_eq!(detail["result_year_from"], 1450);
        assert_eq!(detail["matched_layer_count"], 1);
    }

    #[tokio::test]
    async fn test_async_result_rejections() {
        let app = TestApp::new();

        let (status, body) = app
            .send(
                "POST",
                "/api/chrono/async-result",
                None,
                Some(json!({ "research_request_id": 1, "auth_token": "nope" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_CALLBACK_TOKEN");

        // A bad token wins over a bad field
        let (status, body) = app
            .send(
                "POST",
                "/api/chrono/async-result",
                None,
                Some(json!({ "research_request_id": 1, "matched_layers": -1, "auth_token": "nope" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_CALLBACK_TOKEN");

        let (status, body) = app
            .send(
                "POST",
                "/api/chrono/async-result",
                None,
                Some(json!({ "research_request_id": "one", "auth_token": "111517" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_FORMAT");

        let (status, body) = app
            .send(
                "POST",
                "/api/chrono/async-result",
                None,
                Some(json!({ "research_request_id": 1, "matched_layers": -1, "auth_token": "111517" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["field"], "matched_layers");

        let (status, _) = app
            .send(
                "POST",
                "/api/chrono/async-result",
                None,
                Some(json!({ "research_request_id": 777, "auth_token": "111517" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cart_and_listing() {
        let app = TestApp::new();
        let layer = app.create_layer("Слой", 1000, 1100, "чудо").await;

        let (_, cart) = app.send("GET", "/api/chrono/cart", Some((USER, false)), None).await;
        assert_eq!(cart, json!({ "request_id": null, "count": 0 }));

        let id = app.formed_request(layer, "чудо").await;
        app.send(
            "POST",
            &format!("/api/chrono/draft/layers/{}", layer),
            Some((OTHER_USER, false)),
            None,
        )
        .await;

        let (_, own) = app.send("GET", "/api/chrono", Some((USER, false)), None).await;
        assert_eq!(own.as_array().unwrap().len(), 1);
        assert_eq!(own[0]["id"], id);

        let (_, others) = app.send("GET", "/api/chrono", Some((OTHER_USER, false)), None).await;
        assert!(others.as_array().unwrap().is_empty());

        let (status, _) = app
            .send("GET", &format!("/api/chrono/{}", id), Some((OTHER_USER, false)), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .send("GET", "/api/chrono?status=bogus", Some((MODERATOR, true)), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, formed) = app
            .send("GET", "/api/chrono?status=formed", Some((MODERATOR, true)), None)
            .await;
        assert_eq!(formed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_layer_catalogue() {
        let app = TestApp::new();

        let (status, _) = app
            .send(
                "POST",
                "/api/layers",
                Some((USER, false)),
                Some(json!({ "name": "x", "year_from": 1, "year_to": 2 })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .send(
                "POST",
                "/api/layers",
                Some((MODERATOR, true)),
                Some(json!({ "name": "x", "year_from": 20, "year_to": 2 })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["field"], "year_from");

        let id = app.create_layer("Петровский", 1700, 1750, "Виктория; ассамблея, ассамблея").await;
        let (status, layer) = app.send("GET", &format!("/api/layers/{}", id), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(layer["lexicon"], json!(["ассамблея", "виктория"]));

        let (status, updated) = app
            .send(
                "PUT",
                &format!("/api/layers/{}", id),
                Some((MODERATOR, true)),
                Some(json!({ "year_to": 1760 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["year_to"], 1760);
        assert_eq!(updated["year_from"], 1700);

        let (status, _) = app
            .send("DELETE", &format!("/api/layers/{}", id), Some((MODERATOR, true)), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app.send("GET", &format!("/api/layers/{}", id), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // The deleted layer's name is free again, but only once
        let recreated = app.create_layer("Петровский", 1700, 1725, "ассамблея").await;
        assert_ne!(recreated, id);
        let (status, body) = app
            .send(
                "POST",
                "/api/layers",
                Some((MODERATOR, true)),
                Some(json!({ "name": "Петровский", "year_from": 1700, "year_to": 1725 })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "LAYER_NAME_TAKEN");
        assert!(app
            .send("DELETE", &format!("/api/layers/{}", recreated), Some((MODERATOR, true)), None)
            .await
            .0
            .is_success());

        let (_, all) = app.send("GET", "/api/layers", None, None).await;
        assert!(all.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_requires_jwt_secret() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let err = assert_err!(AppState::build(Arc::new(AppConfig::default()), store, None).map(|_| ()));
        assert!(matches!(err, AppError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_build_delegating_spawns_worker() {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = Some("k".to_string());
        config.callback.shared_secret = Some("s".to_string());
        config.completion.strategy = chronoscope_common::config::CompletionStrategy::Delegated;

        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (state, dispatch) = assert_ok!(AppState::build(Arc::new(config), store, None));
        assert!(dispatch.is_some());
        assert!(state.dispatch_stats.is_some());
    }
}
