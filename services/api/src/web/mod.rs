pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_auth;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use state::AppState;

/// The API routes. Body limits, CORS and the Swagger UI are layered on in `main`.
pub fn router(state: Arc<AppState>) -> Router {
    // Public routes (no session required)
    let public_routes = Router::new()
        .route("/", get(rest::landing_handler))
        .route("/signup", post(auth::signup_handler))
        .route("/signin", post(auth::signin_handler))
        .route("/signout", post(auth::signout_handler));

    // Guarded routes
    let protected_routes = Router::new()
        .route("/dashboard", get(rest::dashboard_handler))
        .route(
            "/profile",
            get(rest::get_profile_handler).put(rest::save_profile_handler),
        )
        .route("/profile/avatar", post(rest::upload_avatar_handler))
        .route(
            "/visits",
            get(rest::list_visits_handler).post(rest::create_visit_handler),
        )
        .route("/visits/{id}", delete(rest::delete_visit_handler))
        .route("/visits/{id}/download", get(rest::download_visit_handler))
        .route("/visits/{id}/translate", post(rest::translate_visit_handler))
        .route("/visits/{id}/toggle", post(rest::toggle_visit_handler))
        .route("/summary", get(rest::get_summary_handler))
        .route("/summary/translate", post(rest::translate_summary_handler))
        .route("/summary/toggle", post(rest::toggle_summary_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
