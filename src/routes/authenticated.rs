use crate::{AppState, handlers, routes};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Routes that need a logged-in actor. The layer above this router redirects
/// anonymous requests to the login page, and each handler also takes an
/// `AuthUser` so the actor is explicit in its signature.
///
/// Ownership (edit, delete) and the self-comment ban are enforced inside the
/// handlers, before any GET/POST branching; a refused actor is silently sent
/// back to the article page.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/POST /article/creer/
        // The author is always the session's actor.
        .route(
            routes::CREATE_ARTICLE,
            get(handlers::create_article_form).post(handlers::create_article),
        )
        // GET/POST /article/{id}/modifier/
        // Owner only.
        .route(
            routes::EDIT_ARTICLE,
            get(handlers::edit_article_form).post(handlers::edit_article),
        )
        // GET/POST /article/{id}/supprimer/
        // Owner only. GET asks for confirmation, POST deletes.
        .route(
            routes::DELETE_ARTICLE,
            get(handlers::delete_article_confirm).post(handlers::delete_article),
        )
        // GET/POST /article/{id}/ajouter_commentaire/
        // Anyone but the article's author.
        .route(
            routes::ADD_COMMENT,
            get(handlers::comment_form).post(handlers::add_comment),
        )
}
