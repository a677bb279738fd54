use crate::{
    AppState,
    auth::{self, AuthUser},
    error::{AppError, AppResult},
    forms::{
        self, ArticleInput, CommentInput, FieldErrors, INVALID_LOGIN, LoginInput, NON_FIELD_ERRORS,
        RegisterInput,
    },
    models::{Article, User},
    pagination::{ARTICLES_PER_PAGE, Paginator},
    password,
    repository::RepositoryError,
    routes::Route,
    views::{
        AccountForm, AccountView, ArticleDetailView, ArticleEditorView, ArticlePage,
        ConfirmDeleteView, EditorAction, HomeView, ProfileView, Reply, View,
    },
};
use axum::{
    Form,
    extract::{Path, Query, State},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

const USERNAME_TAKEN: &str = "A user with that username already exists.";
const ALL_FIELDS_REQUIRED: &str = "All fields are required.";

// --- Query Structs ---

/// ListingParams
///
/// `page` is kept as a raw string: a malformed value must fall back to the first
/// page instead of being rejected by the extractor.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ListingParams {
    /// 1-based page number. Invalid values resolve to page 1, values past the end to the last page.
    pub page: Option<String>,
}

// --- Shared lookups ---

/// Fetches an article or fails with NotFound.
async fn find_article(state: &AppState, id: i64) -> AppResult<Article> {
    state
        .repo
        .get_article(id)
        .await?
        .ok_or_else(|| AppError::article_not_found(id))
}

/// Fetches an article the actor owns. Non-owners fall back to the detail page,
/// whatever the method: this check runs before any GET/POST branching.
async fn owned_article(state: &AppState, id: i64, actor: &AuthUser) -> AppResult<Article> {
    let article = find_article(state, id).await?;
    if !article.is_authored_by(actor.id) {
        tracing::warn!(article_id = id, actor = %actor.username, "Non-owner tried to modify article");
        return Err(AppError::Denied {
            fallback: Route::ArticleDetail(id),
        });
    }
    Ok(article)
}

/// Fetches an article the actor may comment on: anyone but its author.
async fn commentable_article(state: &AppState, id: i64, actor: &AuthUser) -> AppResult<Article> {
    let article = find_article(state, id).await?;
    if article.is_authored_by(actor.id) {
        tracing::debug!(article_id = id, actor = %actor.username, "Author cannot comment own article");
        return Err(AppError::Denied {
            fallback: Route::ArticleDetail(id),
        });
    }
    Ok(article)
}

async fn detail_view(
    state: &AppState,
    article: Article,
    comment_form: CommentInput,
    errors: FieldErrors,
    viewer: Option<&AuthUser>,
) -> AppResult<View> {
    let comments = state.repo.comments_for_article(article.id).await?;
    let can_edit = viewer.is_some_and(|v| article.is_authored_by(v.id));
    let can_comment = viewer.is_some_and(|v| !article.is_authored_by(v.id));
    Ok(View::ArticleDetail(ArticleDetailView {
        article,
        comments,
        comment_form,
        errors,
        can_edit,
        can_comment,
    }))
}

fn account_view(username: &str, errors: FieldErrors) -> AccountView {
    AccountView {
        form: AccountForm {
            username: username.to_string(),
        },
        errors,
    }
}

fn editor_view(
    action: EditorAction,
    form: ArticleInput,
    article: Option<Article>,
    errors: FieldErrors,
    error: Option<String>,
) -> View {
    View::ArticleEditor(ArticleEditorView {
        action,
        form,
        article,
        errors,
        error,
    })
}

// --- Listing Handlers ---

/// home
///
/// [Public Route] All articles, newest first, five per page.
#[utoipa::path(
    get,
    path = "/",
    params(ListingParams),
    responses((status = 200, description = "Paginated article listing", body = View))
)]
pub async fn home(
    State(state): State<AppState>,
    Query(params): Query<ListingParams>,
) -> AppResult<Reply> {
    let count = state.repo.count_articles().await?;
    let window = Paginator::new(count, ARTICLES_PER_PAGE).page(params.page.as_deref());
    let articles = state.repo.list_articles(window.limit, window.offset).await?;

    Ok(Reply::render(View::Home(HomeView {
        page: ArticlePage::new(articles, window),
    })))
}

/// profile
///
/// [Public Route] A user's articles, newest first, without pagination.
#[utoipa::path(
    get,
    path = "/profil/{username}/",
    params(("username" = String, Path, description = "User handle")),
    responses(
        (status = 200, description = "Profile", body = View),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Reply> {
    let profile: User = state
        .repo
        .find_user_by_username(&username)
        .await?
        .ok_or_else(|| AppError::user_not_found(&username))?;
    let articles = state.repo.articles_by_author(profile.id).await?;

    Ok(Reply::render(View::Profile(ProfileView { profile, articles })))
}

// --- Authentication Handlers ---

/// register_form
///
/// [Public Route] An empty registration form. Logged-in visitors get it too; a
/// new registration simply replaces their session.
#[utoipa::path(
    get,
    path = "/inscription/",
    responses((status = 200, description = "Empty registration form", body = View))
)]
pub async fn register_form() -> Reply {
    Reply::render(View::Register(AccountView::default()))
}

/// register
///
/// [Public Route] Creates the account, logs it in and goes home. Any validation
/// failure (including a taken username) re-renders the form with the submitted
/// username; passwords are never echoed back.
///
/// 1. Field rules (handle charset, password strength, confirmation).
/// 2. Uniqueness pre-check, backed by the `uq_users_username` constraint.
/// 3. Argon2 hash, insert, then a fresh session.
#[utoipa::path(
    post,
    path = "/inscription/",
    request_body(content = RegisterInput, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Registered and logged in, redirect home"),
        (status = 200, description = "Form with errors", body = View)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(input): Form<RegisterInput>,
) -> AppResult<(CookieJar, Reply)> {
    let rerender = |errors: FieldErrors| {
        Reply::render(View::Register(account_view(input.username.trim(), errors)))
    };

    let account = match forms::validate_registration(&input) {
        Ok(account) => account,
        Err(errors) => return Ok((jar, rerender(errors))),
    };

    let mut taken = FieldErrors::new();
    taken.add("username", USERNAME_TAKEN);

    if state
        .repo
        .find_user_by_username(&account.username)
        .await?
        .is_some()
    {
        return Ok((jar, rerender(taken)));
    }

    let password_hash = password::hash_password(&account.password)?;
    let user = match state.repo.create_user(&account.username, &password_hash).await {
        Ok(user) => user,
        // Lost a race with a concurrent registration of the same handle.
        Err(RepositoryError::Conflict(_)) => return Ok((jar, rerender(taken))),
        Err(e) => return Err(e.into()),
    };

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");
    let jar = auth::start_session(jar, &user, &state.repo, &state.config).await?;
    Ok((jar, Reply::redirect(Route::Home)))
}

/// login_form
///
/// [Public Route] An empty login form.
#[utoipa::path(
    get,
    path = "/connexion/",
    responses((status = 200, description = "Empty login form", body = View))
)]
pub async fn login_form() -> Reply {
    Reply::render(View::Login(AccountView::default()))
}

/// login
///
/// [Public Route] Unknown usernames and wrong passwords produce the same
/// non-field error.
#[utoipa::path(
    post,
    path = "/connexion/",
    request_body(content = LoginInput, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Logged in, redirect home"),
        (status = 200, description = "Form with errors", body = View)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(input): Form<LoginInput>,
) -> AppResult<(CookieJar, Reply)> {
    let rerender = |errors: FieldErrors| {
        Reply::render(View::Login(account_view(input.username.trim(), errors)))
    };

    let credentials = match forms::validate_login(&input) {
        Ok(credentials) => credentials,
        Err(errors) => return Ok((jar, rerender(errors))),
    };

    let stored = state.repo.find_credentials(&credentials.username).await?;
    let user = match stored {
        Some(stored) if password::verify_password(&credentials.password, &stored.password_hash)? => {
            User::from(stored)
        }
        _ => {
            tracing::info!(username = %credentials.username, "Failed login attempt");
            let mut errors = FieldErrors::new();
            errors.add(NON_FIELD_ERRORS, INVALID_LOGIN);
            return Ok((jar, rerender(errors)));
        }
    };

    let jar = auth::start_session(jar, &user, &state.repo, &state.config).await?;
    Ok((jar, Reply::redirect(Route::Home)))
}

/// logout
///
/// [Public Route] GET and POST both end the session, no confirmation step.
/// The session is revoked server-side before the cookie is dropped, so a copy
/// of the old cookie stops working too. Anonymous callers just go home.
#[utoipa::path(
    post,
    path = "/deconnexion/",
    responses((status = 303, description = "Session ended, redirect home"))
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Reply)> {
    let jar = auth::end_session(jar, &state.repo, &state.config).await?;
    Ok((jar, Reply::redirect(Route::Home)))
}

// --- Article Handlers ---

/// article_detail
///
/// [Public Route] The article, its comments and an empty comment form. Never
/// mutates anything.
#[utoipa::path(
    get,
    path = "/article/{id}/",
    params(("id" = i64, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Article detail", body = View),
        (status = 404, description = "Not Found")
    )
)]
pub async fn article_detail(
    viewer: Option<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Reply> {
    let article = find_article(&state, id).await?;
    let view = detail_view(
        &state,
        article,
        CommentInput::default(),
        FieldErrors::new(),
        viewer.as_ref(),
    )
    .await?;
    Ok(Reply::render(view))
}

/// create_article_form
///
/// [Authenticated Route] An empty editor in `create` mode. The `AuthUser`
/// argument is unused but keeps the handler unreachable anonymously even
/// without the router layer.
#[utoipa::path(
    get,
    path = "/article/creer/",
    responses(
        (status = 200, description = "Empty article form", body = View),
        (status = 303, description = "Not logged in, redirect to login")
    )
)]
pub async fn create_article_form(_actor: AuthUser) -> Reply {
    Reply::render(editor_view(
        EditorAction::Create,
        ArticleInput::default(),
        None,
        FieldErrors::new(),
        None,
    ))
}

/// create_article
///
/// [Authenticated Route] The author is always the current actor, never a
/// submitted value.
#[utoipa::path(
    post,
    path = "/article/creer/",
    request_body(content = ArticleInput, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Created, redirect to the article"),
        (status = 200, description = "Form with errors", body = View)
    )
)]
pub async fn create_article(
    actor: AuthUser,
    State(state): State<AppState>,
    Form(input): Form<ArticleInput>,
) -> AppResult<Reply> {
    let new_article = match forms::validate_article(&input) {
        Ok(article) => article,
        Err(errors) => {
            return Ok(Reply::render(editor_view(
                EditorAction::Create,
                input,
                None,
                errors,
                None,
            )));
        }
    };

    let article = state.repo.create_article(actor.id, new_article).await?;
    tracing::info!(article_id = article.id, author = %actor.username, "Article created");
    Ok(Reply::redirect(Route::ArticleDetail(article.id)))
}

/// edit_article_form
///
/// [Authenticated Route, owner only] The editor pre-filled with the stored
/// title and body. Non-owners are sent back to the article.
#[utoipa::path(
    get,
    path = "/article/{id}/modifier/",
    params(("id" = i64, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Pre-filled editor", body = View),
        (status = 303, description = "Not the owner, redirect to the article"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn edit_article_form(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Reply> {
    let article = owned_article(&state, id, &actor).await?;
    Ok(Reply::render(editor_view(
        EditorAction::Edit,
        ArticleInput::from(&article),
        Some(article),
        FieldErrors::new(),
        None,
    )))
}

/// edit_article
///
/// [Authenticated Route, owner only] Overwrites title and body. A submission
/// missing either field re-renders the editor with the stored values.
///
/// 1. Ownership, before looking at the submission at all.
/// 2. Validation. A blank field adds the form-level "All fields are required."
/// 3. Update. `author_id` and `created_at` are never part of the write.
#[utoipa::path(
    post,
    path = "/article/{id}/modifier/",
    params(("id" = i64, Path, description = "Article ID")),
    request_body(content = ArticleInput, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Updated (or not the owner), redirect to the article"),
        (status = 200, description = "Editor with an error message", body = View),
        (status = 404, description = "Not Found")
    )
)]
pub async fn edit_article(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(input): Form<ArticleInput>,
) -> AppResult<Reply> {
    let article = owned_article(&state, id, &actor).await?;

    let changes = match forms::validate_article(&input) {
        Ok(changes) => changes,
        Err(errors) => {
            let missing = ["title", "body"].iter().any(|field| {
                errors
                    .get(field)
                    .iter()
                    .any(|message| message == forms::REQUIRED_MESSAGE)
            });
            let error = missing.then(|| ALL_FIELDS_REQUIRED.to_string());
            return Ok(Reply::render(editor_view(
                EditorAction::Edit,
                ArticleInput::from(&article),
                Some(article),
                errors,
                error,
            )));
        }
    };

    // Deleted between the ownership check and the write.
    if state.repo.update_article(id, changes).await?.is_none() {
        return Err(AppError::article_not_found(id));
    }
    tracing::info!(article_id = id, author = %actor.username, "Article updated");
    Ok(Reply::redirect(Route::ArticleDetail(id)))
}

/// delete_article_confirm
///
/// [Authenticated Route, owner only] Asks for confirmation. Nothing is deleted
/// on GET.
#[utoipa::path(
    get,
    path = "/article/{id}/supprimer/",
    params(("id" = i64, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Deletion confirmation", body = View),
        (status = 303, description = "Not the owner, redirect to the article"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_article_confirm(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Reply> {
    let article = owned_article(&state, id, &actor).await?;
    Ok(Reply::render(View::ConfirmDelete(ConfirmDeleteView {
        article,
    })))
}

/// delete_article
///
/// [Authenticated Route, owner only] Deletes the article and its comments.
#[utoipa::path(
    post,
    path = "/article/{id}/supprimer/",
    params(("id" = i64, Path, description = "Article ID")),
    responses(
        (status = 303, description = "Deleted (redirect home) or not the owner (redirect to the article)"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_article(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Reply> {
    owned_article(&state, id, &actor).await?;
    if state.repo.delete_article(id).await? {
        tracing::info!(article_id = id, author = %actor.username, "Article deleted");
    }
    Ok(Reply::redirect(Route::Home))
}

// --- Comment Handlers ---

/// comment_form
///
/// [Authenticated Route, non-author only] The article page with an empty
/// comment form. The author is silently sent back to the article.
#[utoipa::path(
    get,
    path = "/article/{id}/ajouter_commentaire/",
    params(("id" = i64, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Article detail with an empty comment form", body = View),
        (status = 303, description = "Own article, redirect to it"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn comment_form(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Reply> {
    let article = commentable_article(&state, id, &actor).await?;
    let view = detail_view(
        &state,
        article,
        CommentInput::default(),
        FieldErrors::new(),
        Some(&actor),
    )
    .await?;
    Ok(Reply::render(view))
}

/// add_comment
///
/// [Authenticated Route, non-author only] The article and author of the new
/// comment come from the URL and the session, never from the form.
///
/// 1. The article must exist and not belong to the actor.
/// 2. An empty body re-renders the detail page with the form errors.
/// 3. The insert; an article deleted meanwhile surfaces as a 404.
#[utoipa::path(
    post,
    path = "/article/{id}/ajouter_commentaire/",
    params(("id" = i64, Path, description = "Article ID")),
    request_body(content = CommentInput, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Comment added (or own article), redirect to the article"),
        (status = 200, description = "Article detail with comment errors", body = View),
        (status = 404, description = "Not Found")
    )
)]
pub async fn add_comment(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(input): Form<CommentInput>,
) -> AppResult<Reply> {
    let article = commentable_article(&state, id, &actor).await?;

    let new_comment = match forms::validate_comment(&input) {
        Ok(comment) => comment,
        Err(errors) => {
            let view = detail_view(&state, article, input, errors, Some(&actor)).await?;
            return Ok(Reply::render(view));
        }
    };

    let comment = match state.repo.create_comment(id, actor.id, new_comment).await {
        Ok(comment) => comment,
        // The article vanished after the lookup.
        Err(RepositoryError::MissingReference(_)) => return Err(AppError::article_not_found(id)),
        Err(e) => return Err(e.into()),
    };
    tracing::info!(comment_id = comment.id, article_id = id, author = %actor.username, "Comment added");
    Ok(Reply::redirect(Route::ArticleDetail(id)))
}
