pub mod auth;
pub mod chat_task;
pub mod content;
pub mod counter;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use middleware::{attach_user, require_auth, CurrentUser};
pub use state::AppState;
pub use ws_handler::chat_ws_handler;

/// Builds every API route with its auth layer. CORS and the Swagger UI are
/// added by the binary.
pub fn api_router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/phone/start", post(auth::phone_start_handler))
        .route("/auth/phone/verify", post(auth::phone_verify_handler))
        .route("/auth/federated", post(auth::federated_handler))
        .route("/quotes", get(rest::top_quotes_handler))
        .route("/resources", get(content::list_resources_handler))
        .route("/resources/{id}", get(content::get_resource_handler))
        .route("/support/cards", get(content::support_cards_handler))
        .route("/warning", get(content::warning_handler));

    // Routes that serve anonymous visitors but know the user when signed in
    let session_routes = Router::new()
        .route("/counter", get(counter::get_counter_handler))
        .route("/counter/reset", post(counter::reset_counter_handler))
        .route("/chat/ws", get(chat_ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            attach_user,
        ));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route("/auth/link", post(auth::link_handler))
        .route("/quotes", post(rest::create_quote_handler))
        .route("/quotes/{id}/vote", post(rest::vote_quote_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .merge(protected_routes)
        .with_state(app_state)
}
