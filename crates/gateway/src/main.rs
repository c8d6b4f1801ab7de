//! IdeaForge API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Idea submission, transform, combine and chat endpoints
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    error_handling::HandleErrorLayer,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    BoxError, Router,
};
use ideaforge_common::{
    config::{AppConfig, ObservabilityConfig, SubmissionStrategy},
    db::create_store,
    errors::AppError,
    llm::create_generator,
    metrics,
    SubmissionPipeline,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::middleware::rate_limit::{create_rate_limiter, rate_limit_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<SubmissionPipeline>,
    pub strategy: SubmissionStrategy,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    init_tracing(&config.observability);

    info!("Starting IdeaForge API Gateway v{}", ideaforge_common::VERSION);

    config.validate().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;
    let strategy = config.submission_strategy()?;
    let config = Arc::new(config);

    // Initialize metrics
    init_metrics_exporter(&config.observability)?;
    metrics::register_metrics();

    // Store and text service
    let store = create_store(&config).await?;
    let generator = create_generator(&config.llm)?;
    info!(
        store = store.backend_name(),
        model = generator.model_name(),
        strategy = ?strategy,
        "Pipeline ready"
    );

    let pipeline = Arc::new(SubmissionPipeline::from_config(&config, store, generator));

    // Create app state
    let state = AppState {
        config: config.clone(),
        pipeline,
        strategy,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.server.host, config.server.port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.shutdown_timeout()))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins over `observability.log_level`
fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Prometheus scrape endpoint on its own port; 0 disables it
fn init_metrics_exporter(observability: &ObservabilityConfig) -> anyhow::Result<()> {
    if observability.metrics_port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], observability.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_generation_duration_seconds", metrics::METRICS_PREFIX)),
            metrics::GENERATION_BUCKETS,
        )?
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics exporter listening on {}", addr);
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

    // Health endpoints (never throttled)
    let probes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready));

    // API routes
    let mut api_routes = Router::new()
        .route("/transform", post(handlers::prompts::transform))
        .route("/combine", post(handlers::prompts::combine))
        .route("/chat", post(handlers::chat::chat))
        .route(
            "/submissions",
            post(handlers::submissions::create_submission)
                .get(handlers::submissions::list_submissions),
        )
        .route("/system-prompt", get(handlers::prompts::system_prompt));

    let rate_limit = &state.config.rate_limit;
    if rate_limit.enabled {
        let limiter = create_rate_limiter(rate_limit.requests_per_second, rate_limit.burst);
        api_routes = api_routes.route_layer(from_fn_with_state(limiter, rate_limit_middleware));
    }

    let timeout = state.config.request_timeout();

    // Compose the app
    Router::new()
        .merge(probes)
        .merge(api_routes)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .fallback(handlers::not_found)
        .layer(from_fn(middleware::metrics::track_requests))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(timeout)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

async fn handle_middleware_error(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::Internal {
            message: "request timed out".to_string(),
        }
    } else {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

/// Graceful shutdown signal handler; in-flight requests get `grace` to finish
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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

    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!(grace_secs = grace.as_secs(), "Graceful shutdown timed out, exiting");
        std::process::exit(1);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use ideaforge_common::{
        db::MemoryStore,
        llm::{GenerationError, ScriptedGenerator},
        retry::RetryPolicy,
        IdeaStore,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        store: Arc<MemoryStore>,
        generator: Arc<ScriptedGenerator>,
    }

    fn test_app_with(config: AppConfig, strategy: SubmissionStrategy) -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(ScriptedGenerator::new());
        let pipeline = SubmissionPipeline::new(store.clone(), generator.clone())
            .with_retry_policy(RetryPolicy::for_generation(3, Duration::ZERO));

        let state = AppState {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            strategy,
        };

        TestApp {
            router: create_router(state),
            store,
            generator,
        }
    }

    fn test_app(strategy: SubmissionStrategy) -> TestApp {
        let mut config = AppConfig::default();
        config.rate_limit.enabled = false;
        test_app_with(config, strategy)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(SubmissionStrategy::Fragments);
        let (status, body) = send(&app.router, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app.router, get("/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["store"]["backend"], "memory");
    }

    #[tokio::test]
    async fn test_transform_returns_prompt() {
        let app = test_app(SubmissionStrategy::Fragments);
        app.generator.push_text("  Always be kind.  ").await;

        let (status, body) = send(&app.router, post_json("/transform", r#"{"idea":"be kind"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "prompt": "Always be kind." }));
        // Transform alone stores nothing
        assert!(app.store.list_submissions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transform_missing_idea() {
        let app = test_app(SubmissionStrategy::Fragments);
        let (status, body) = send(&app.router, post_json("/transform", "{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MISSING_FIELD");
        assert!(body["error"].as_str().unwrap().contains("idea"));
        assert_eq!(app.generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let app = test_app(SubmissionStrategy::Fragments);
        let (status, body) = send(&app.router, post_json("/transform", "{\"idea\":")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_FORMAT");
    }

    #[tokio::test]
    async fn test_wrong_method_and_unknown_path() {
        let app = test_app(SubmissionStrategy::Fragments);

        let (status, body) = send(&app.router, get("/transform")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(body["error"].is_string());

        let (status, body) = send(&app.router, get("/nowhere")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_combine() {
        let app = test_app(SubmissionStrategy::Fragments);
        app.generator.push_text("Be kind and cite sources.").await;

        let (status, body) = send(
            &app.router,
            post_json("/combine", r#"{"ideas":["be kind"," ","cite sources"]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["combinedPrompt"], "Be kind and cite sources.");
        assert_eq!(app.generator.calls().await[0].1, "- be kind\n- cite sources");

        let (status, _) = send(&app.router, post_json("/combine", r#"{"ideas":[]}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_submission_flow() {
        let app = test_app(SubmissionStrategy::Fragments);
        app.generator.push_text("Be kind.").await;
        app.generator.push_text("Be kind.").await;

        let (status, body) = send(&app.router, post_json("/submissions", r#"{"idea":"kindness"}"#)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["submission"]["idea"], "kindness");
        assert!(body["submission"]["createdAt"].is_string());
        assert_eq!(body["promptFragment"], json!({ "promptText": "Be kind.", "appended": true }));
        assert!(body.get("combinedPrompt").is_none());

        let (_, body) = send(&app.router, post_json("/submissions", r#"{"idea":"be nice"}"#)).await;
        assert_eq!(body["promptFragment"]["appended"], false);

        let (status, body) = send(&app.router, get("/system-prompt")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "systemPrompt": "Be kind.", "fragmentCount": 1 }));

        let (status, body) = send(&app.router, get("/submissions")).await;
        assert_eq!(status, StatusCode::OK);
        let ideas: Vec<&str> = body["submissions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["idea"].as_str().unwrap())
            .collect();
        assert_eq!(ideas, vec!["kindness", "be nice"]);
    }

    #[tokio::test]
    async fn test_submission_combine_strategy() {
        let app = test_app(SubmissionStrategy::Combine);
        app.generator.push_text("Merged.").await;

        let (status, body) = send(&app.router, post_json("/submissions", r#"{"idea":"be kind"}"#)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["combinedPrompt"], "Merged.");
        assert!(body.get("promptFragment").is_none());
    }

    #[tokio::test]
    async fn test_upstream_rate_limit_after_save() {
        let app = test_app(SubmissionStrategy::Fragments);
        for _ in 0..3 {
            app.generator
                .push_error(GenerationError::RateLimited { message: "slow down".into() })
                .await;
        }

        let (status, body) = send(&app.router, post_json("/submissions", r#"{"idea":"be kind"}"#)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "PROMPT_UPDATE_FAILED");
        assert_eq!(body["cause"], "RATE_LIMITED");

        let saved = app.store.list_submissions().await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(body["submissionId"], saved[0].id.to_string());
    }

    #[tokio::test]
    async fn test_blank_idea_is_rejected() {
        let app = test_app(SubmissionStrategy::Fragments);
        let (status, body) = send(&app.router, post_json("/submissions", r#"{"idea":"   "}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(app.store.list_submissions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat() {
        let app = test_app(SubmissionStrategy::Fragments);
        app.store.insert_prompt_fragment("Be kind.").await.unwrap();
        app.generator.push_text("Hello there!").await;
        app.generator.push_text("Arr!").await;

        let (status, body) = send(&app.router, post_json("/chat", r#"{"message":"hi"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "Hello there!");

        let (_, body) = send(
            &app.router,
            post_json("/chat", r#"{"message":"hi","systemPrompt":"Talk like a pirate."}"#),
        )
        .await;
        assert_eq!(body["response"], "Arr!");

        let calls = app.generator.calls().await;
        assert_eq!(calls[0].0, "Be kind.");
        assert_eq!(calls[1].0, "Talk like a pirate.");
    }

    #[tokio::test]
    async fn test_inbound_rate_limit() {
        let mut config = AppConfig::default();
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 1;
        let app = test_app_with(config, SubmissionStrategy::Fragments);

        let (status, _) = send(&app.router, get("/system-prompt")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app.router, get("/system-prompt")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["code"], "THROTTLED");

        // Probes bypass the limiter
        let (status, _) = send(&app.router, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
