use axum::{
    Router,
    extract::{FromRef, RawPathParams, Request, rejection::RawPathParamsRejection},
    http::HeaderName,
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod models;
pub mod pagination;
pub mod password;
pub mod repository;
pub mod views;

// Routing, split by access level (public / authenticated).
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for every page handler and view model, served at
/// `/api-docs/openapi.json` and browsable under `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::home, handlers::profile, handlers::register_form, handlers::register,
        handlers::login_form, handlers::login, handlers::logout, handlers::article_detail,
        handlers::create_article_form, handlers::create_article, handlers::edit_article_form,
        handlers::edit_article, handlers::delete_article_confirm, handlers::delete_article,
        handlers::comment_form, handlers::add_comment
    ),
    components(
        schemas(
            models::User, models::Article, models::Comment,
            forms::ArticleInput, forms::CommentInput, forms::RegisterInput, forms::LoginInput,
            forms::FieldErrors, views::View, views::ArticlePage, views::EditorAction,
        )
    ),
    tags(
        (name = "blogapp", description = "Blog pages: articles, comments, profiles and accounts")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, immutable container holding the application's services and
/// configuration, shared by every request.
#[derive(Clone)]
pub struct AppState {
    /// Persistence layer (Postgres in production, in-memory in tests).
    pub repo: RepositoryState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        Self { repo, config }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Guards the `authenticated_routes`. Extracting `AuthUser` either succeeds or
/// rejects with a redirect to the login page, so the handler never runs for an
/// anonymous request.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// reject_malformed_article_id
///
/// An `{id}` segment that is not an integer names no article: answer 404 before
/// any other layer runs, so even anonymous requests to owner-only pages get
/// "not found" rather than the login redirect or an extractor's 400.
async fn reject_malformed_article_id(
    params: Result<RawPathParams, RawPathParamsRejection>,
    request: Request,
    next: Next,
) -> Response {
    if let Ok(params) = params {
        for (key, value) in &params {
            if key == "id" && value.parse::<i64>().is_err() {
                return AppError::NotFound {
                    entity: "Article",
                    key: value.to_string(),
                }
                .into_response();
            }
        }
    }
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware, and
/// registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Outermost route layer: runs before the authentication check.
        .route_layer(middleware::from_fn(reject_malformed_article_id))
        .with_state(state);

    // Observability and correlation layers, applied outermost.
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer`: method, URI and the `x-request-id` generated above, so
/// every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
