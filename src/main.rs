use assessment_backend::services::proctoring_service;
use assessment_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    middleware, routes, AppState,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let (events, mut event_rx) = proctoring_service::event_channel(config.event_queue_capacity);
    let app_state = AppState::new(pool, events);

    {
        let svc = app_state.proctoring_service.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if let Err(e) = svc.record_event(&event).await {
                    tracing::warn!(
                        attempt_id = %event.attempt_id,
                        error = ?e,
                        "proctoring event not recorded"
                    );
                }
            }
        });
    }

    let base_routes = Router::new().route("/health", get(routes::health::health));

    let student_api = Router::new()
        .route(
            "/api/student/tests/:test_id/start-or-resume",
            post(routes::student::start_or_resume),
        )
        .route(
            "/api/student/attempts/:attempt_id/answers/:question_id",
            put(routes::student::save_answer),
        )
        .route(
            "/api/student/attempts/:attempt_id/events",
            post(routes::student::report_event),
        )
        .route(
            "/api/student/attempts/:attempt_id/submit",
            post(routes::student::submit_test),
        )
        .route(
            "/api/student/attempts/:attempt_id/result",
            get(routes::student::get_result),
        )
        .route(
            "/api/student/attempts/:attempt_id/session",
            get(routes::student::get_session),
        )
        .layer(axum::middleware::from_fn(
            middleware::auth::require_take_tests,
        ))
        .layer(axum::middleware::from_fn(middleware::auth::authenticate))
        .layer(axum::middleware::from_fn_with_state(
            middleware::rate_limit::RequestBudget::per_second(config.student_rps),
            middleware::rate_limit::throttle,
        ));

    let manage_api = Router::new()
        .route("/api/manage/tests", post(routes::manage::create_test))
        .route("/api/manage/tests/:id", get(routes::manage::get_test))
        .route(
            "/api/manage/tests/:id/publish",
            post(routes::manage::publish_test),
        )
        .route(
            "/api/manage/attempts/:id/result",
            get(routes::manage::get_attempt_result),
        )
        .layer(axum::middleware::from_fn(
            middleware::auth::require_manage_tests,
        ))
        .layer(axum::middleware::from_fn(middleware::auth::authenticate))
        .layer(axum::middleware::from_fn_with_state(
            middleware::rate_limit::RequestBudget::per_second(config.manage_rps),
            middleware::rate_limit::throttle,
        ));

    let app = base_routes
        .merge(student_api)
        .merge(manage_api)
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
