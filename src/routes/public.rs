use crate::{AppState, handlers, routes};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints reachable without a session: the listing, article and profile
/// pages, and the account gateway (registration, login, logout).
///
/// The article detail page still resolves the optional session so it can tell
/// the viewer whether they may edit or comment.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for monitoring and load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /?page=N
        // Newest articles first, five per page. A bad `page` never errors.
        .route(routes::HOME, get(handlers::home))
        // GET/POST /inscription/
        // Registration. A valid POST logs the new account in.
        .route(
            routes::REGISTER,
            get(handlers::register_form).post(handlers::register),
        )
        // GET/POST /connexion/
        .route(routes::LOGIN, get(handlers::login_form).post(handlers::login))
        // GET/POST /deconnexion/
        // Both methods end the session; there is no confirmation page.
        .route(routes::LOGOUT, get(handlers::logout).post(handlers::logout))
        // GET /article/{id}/
        .route(routes::ARTICLE_DETAIL, get(handlers::article_detail))
        // GET /profil/{username}/
        .route(routes::PROFILE, get(handlers::profile))
}
