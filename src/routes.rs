// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, session, tests as student_tests},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, tests, sessions, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (repository + config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .merge(
            Router::new()
                .route("/session", get(auth::current_session))
                .layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        );

    let test_routes = Router::new()
        .route("/", get(student_tests::list_published_tests))
        .route("/{id}/start", post(student_tests::start_test));

    let session_routes = Router::new()
        .route(
            "/{token}",
            get(session::get_session).delete(session::reset_session),
        )
        .route("/{token}/answers", post(session::select_answer))
        .route("/{token}/next", post(session::next_question))
        .route("/{token}/previous", post(session::previous_question))
        .route("/{token}/jump", post(session::jump_to_question))
        .route("/{token}/submit", post(session::submit))
        .route("/{token}/result", get(session::get_result));

    let admin_routes = Router::new()
        .route(
            "/questions",
            get(admin::list_questions).post(admin::create_question),
        )
        .route("/questions/import", post(admin::import_questions))
        .route(
            "/questions/{id}",
            get(admin::get_question)
                .put(admin::update_question)
                .delete(admin::delete_question),
        )
        .route("/tests", get(admin::list_tests).post(admin::create_test))
        .route(
            "/tests/{id}",
            put(admin::update_test).delete(admin::delete_test),
        )
        .route("/tests/{id}/questions", put(admin::assign_questions))
        .route("/tests/{id}/results", get(admin::list_results))
        // Auth runs first, then the admin role check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/tests", test_routes)
        .nest("/api/sessions", session_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
