use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tower::BoxError;
use tower::ServiceBuilder;
use tower_slide::LimitError;
use tower_slide::LimiterConfig;
use tower_slide::RateLimitLayer;
use tower_slide::spawn_sweeper;
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"
global_request_limit = 10
global_limit_period_secs = 60
sweep_interval_secs = 30

[[rules]]
route = "/login"
request_limit = 3
limit_period_secs = 300

[[rules]]
route = "/health"
"#;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 1. Load the limits
    let config = LimiterConfig::from_toml_str(CONFIG)?;
    let sweep_every = config.sweep_interval();
    let layer = RateLimitLayer::<Request>::new(config.into_rule_set()?);
    let _sweeper = spawn_sweeper(Arc::clone(layer.admission()), sweep_every);

    // 2. Build the Router
    let app = Router::new()
        .route("/", get(|| async { "Hello, Slide!" }))
        .route("/login", get(|| async { "Welcome back" }))
        .route("/health", get(|| async { "ok" }))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_limit_error))
                .layer(layer)
                .map_err(BoxError::from),
        );

    // 3. Serve, exposing the peer address to the limiter
    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    println!("📡 Listening on http://127.0.0.1:3000");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn handle_limit_error(err: BoxError) -> impl IntoResponse {
    if let Some(limit_err) = err.downcast_ref::<LimitError>() {
        limit_err.clone().into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Service Error").into_response()
    }
}
